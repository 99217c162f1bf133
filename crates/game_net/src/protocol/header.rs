//! Fixed message header that precedes every payload on the wire.

use crate::error::ProtocolError;

/// Size of an encoded [`MessageHeader`] in bytes.
pub const HEADER_LEN: usize = 8;

/// Header of one framed message.
///
/// Encoded big-endian as `command: u16`, `length: u32`, `flags: u16`, where
/// `length` counts payload bytes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHeader {
    pub command: u16,
    pub length: u32,
    pub flags: u16,
}

impl MessageHeader {
    pub fn new(command: u16, length: u32, flags: u16) -> Self {
        Self {
            command,
            length,
            flags,
        }
    }

    /// Parses the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                needed: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            command: u16::from_be_bytes([bytes[0], bytes[1]]),
            length: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            flags: u16::from_be_bytes([bytes[6], bytes[7]]),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.command.to_be_bytes());
        out[2..6].copy_from_slice(&self.length.to_be_bytes());
        out[6..8].copy_from_slice(&self.flags.to_be_bytes());
        out
    }
}

/// Builds a complete frame from a command, flags and raw payload.
pub fn frame(command: u16, flags: u16, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let length = u32::try_from(payload.len()).map_err(|_| ProtocolError::Oversized {
        length: payload.len(),
        limit: u32::MAX as usize,
    })?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MessageHeader::new(command, length, flags).encode());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Returns the payload of a complete frame, as declared by its header.
pub fn payload(message: &[u8]) -> Result<&[u8], ProtocolError> {
    let header = MessageHeader::parse(message)?;
    let end = HEADER_LEN + header.length as usize;
    message
        .get(HEADER_LEN..end)
        .ok_or(ProtocolError::Truncated {
            needed: end,
            actual: message.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_is_big_endian() {
        let header = MessageHeader::new(0x0102, 0x0304_0506, 0x0708);
        assert_eq!(header.encode(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(MessageHeader::parse(&header.encode()).unwrap(), header);
    }

    #[test]
    fn test_short_header_is_rejected() {
        let err = MessageHeader::parse(&[0, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                needed: HEADER_LEN,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_frame_and_payload() {
        let message = frame(150, 2, b"ping").unwrap();
        assert_eq!(message.len(), HEADER_LEN + 4);

        let header = MessageHeader::parse(&message).unwrap();
        assert_eq!(header, MessageHeader::new(150, 4, 2));
        assert_eq!(payload(&message).unwrap(), b"ping");
    }

    #[test]
    fn test_payload_shorter_than_declared() {
        let mut message = frame(150, 0, b"ping").unwrap();
        message.truncate(HEADER_LEN + 2);
        assert!(payload(&message).is_err());
    }
}
