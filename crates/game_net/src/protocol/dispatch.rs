//! Command range validation and table-driven dispatch.
//!
//! Every connection role owns a contiguous range of command codes. A frame's
//! command is range-checked before it is used as an index into the role's
//! handler table, so a hostile peer can never reach memory outside the table.

use super::header::MessageHeader;
use crate::connection::Connection;
use crate::error::ProtocolError;
use std::fmt;
use std::ops::Range;
use tracing::{debug, error};

/// Handler invoked with the connection and the complete frame, header
/// included.
pub type Handler = Box<dyn Fn(&Connection, &[u8]) + Send + Sync>;

/// Half-open range `[begin, end)` of command codes owned by one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandRange {
    begin: u16,
    end: u16,
}

impl CommandRange {
    /// Creates a range, rejecting empty or inverted bounds.
    pub fn new(begin: u16, end: u16) -> Result<Self, ProtocolError> {
        if begin >= end {
            return Err(ProtocolError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    pub fn begin(&self) -> u16 {
        self.begin
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn len(&self) -> usize {
        usize::from(self.end - self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn contains(&self, command: u16) -> bool {
        command >= self.begin && command < self.end
    }

    /// Table index of `command`, or `None` when it falls outside the range.
    pub fn offset(&self, command: u16) -> Option<usize> {
        self.contains(command)
            .then(|| usize::from(command - self.begin))
    }

    pub fn as_range(&self) -> Range<u16> {
        self.begin..self.end
    }
}

impl fmt::Display for CommandRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// What a role does when a peer sends a command outside its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// Log and discard the message; the connection stays open.
    #[default]
    DropMessage,
    /// Log and close the connection.
    DropConnection,
}

/// Result of dispatching one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran.
    Handled,
    /// The command is in range but has no handler; silently ignored.
    Unregistered,
    /// The command is outside the range; the violation policy was applied.
    OutOfRange,
    /// The frame is too short to carry a header.
    Malformed,
}

/// Fixed table mapping `command - begin` to an optional handler.
pub struct CommandTable {
    name: String,
    range: CommandRange,
    policy: ViolationPolicy,
    handlers: Vec<Option<Handler>>,
}

impl CommandTable {
    /// Creates an empty table covering `range`.
    pub fn new(name: impl Into<String>, range: CommandRange, policy: ViolationPolicy) -> Self {
        let mut handlers = Vec::with_capacity(range.len());
        handlers.resize_with(range.len(), || None);
        Self {
            name: name.into(),
            range,
            policy,
            handlers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> CommandRange {
        self.range
    }

    pub fn policy(&self) -> ViolationPolicy {
        self.policy
    }

    /// Installs `handler` for `command`, replacing any previous one.
    pub fn register(&mut self, command: u16, handler: Handler) -> Result<(), ProtocolError> {
        let index = self
            .range
            .offset(command)
            .ok_or(ProtocolError::OutOfRange {
                command,
                range: self.range.as_range(),
            })?;
        self.handlers[index] = Some(handler);
        Ok(())
    }

    pub fn is_registered(&self, command: u16) -> bool {
        self.range
            .offset(command)
            .is_some_and(|index| self.handlers[index].is_some())
    }

    /// Routes one complete frame to its handler.
    ///
    /// Out-of-range commands are logged with the role name and header fields,
    /// then handled according to the table's [`ViolationPolicy`].
    pub fn dispatch(&self, conn: &Connection, message: &[u8]) -> DispatchOutcome {
        let header = match MessageHeader::parse(message) {
            Ok(header) => header,
            Err(e) => {
                error!("{}: conn {} sent malformed frame: {}", self.name, conn.id(), e);
                return DispatchOutcome::Malformed;
            }
        };

        debug!(
            "{}: conn {} cmd {} len {} flags {}",
            self.name,
            conn.id(),
            header.command,
            header.length,
            header.flags
        );

        let Some(index) = self.range.offset(header.command) else {
            error!(
                "{}: invalid cmd:{} len:{} flags:{} outside {}",
                self.name, header.command, header.length, header.flags, self.range
            );
            if self.policy == ViolationPolicy::DropConnection {
                conn.shutdown();
            }
            return DispatchOutcome::OutOfRange;
        };

        match &self.handlers[index] {
            Some(handler) => {
                handler(conn, message);
                DispatchOutcome::Handled
            }
            None => DispatchOutcome::Unregistered,
        }
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("name", &self.name)
            .field("range", &self.range)
            .field("policy", &self.policy)
            .field(
                "registered",
                &self.handlers.iter().filter(|h| h.is_some()).count(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Callbacks, ConnState};
    use crate::protocol::frame;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Silent;

    impl Callbacks for Silent {
        fn on_message(&self, _conn: &Connection, _message: &[u8]) {}
    }

    fn detached() -> Connection {
        Connection::detached(Arc::new(Silent))
    }

    fn counting_table(policy: ViolationPolicy, hits: Arc<AtomicUsize>) -> CommandTable {
        let mut table = CommandTable::new("test", CommandRange::new(100, 200).unwrap(), policy);
        table
            .register(
                150,
                Box::new(move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("150 is in range");
        table
    }

    #[test]
    fn test_range_rejects_empty_or_inverted() {
        assert!(CommandRange::new(10, 10).is_err());
        assert!(CommandRange::new(20, 10).is_err());

        let range = CommandRange::new(100, 200).unwrap();
        assert_eq!(range.len(), 100);
        assert!(range.contains(100));
        assert!(range.contains(199));
        assert!(!range.contains(200));
        assert!(!range.contains(99));
        assert_eq!(range.offset(150), Some(50));
    }

    #[test]
    fn test_register_outside_range_fails() {
        let mut table = CommandTable::new(
            "test",
            CommandRange::new(100, 200).unwrap(),
            ViolationPolicy::DropMessage,
        );
        assert!(table.register(200, Box::new(|_, _| {})).is_err());
        assert!(table.register(199, Box::new(|_, _| {})).is_ok());
        assert!(table.is_registered(199));
        assert!(!table.is_registered(150));
    }

    #[test]
    fn test_dispatch_routes_by_command() {
        let hits = Arc::new(AtomicUsize::new(0));
        let table = counting_table(ViolationPolicy::DropMessage, hits.clone());
        let conn = detached();

        let outcome = table.dispatch(&conn, &frame(150, 0, b"").unwrap());
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let outcome = table.dispatch(&conn, &frame(151, 0, b"").unwrap());
        assert_eq!(outcome, DispatchOutcome::Unregistered);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_receives_full_frame_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let mut table = CommandTable::new(
            "test",
            CommandRange::new(100, 200).unwrap(),
            ViolationPolicy::DropMessage,
        );
        table
            .register(
                150,
                Box::new(move |_: &Connection, message: &[u8]| {
                    captured.lock().unwrap().push(message.to_vec())
                }),
            )
            .unwrap();
        let conn = detached();

        let ping = frame(150, 0, b"ping").unwrap();
        assert_eq!(table.dispatch(&conn, &ping), DispatchOutcome::Handled);
        assert_eq!(*seen.lock().unwrap(), vec![ping]);

        assert_eq!(
            table.dispatch(&conn, &frame(9999, 0, b"ping").unwrap()),
            DispatchOutcome::OutOfRange
        );
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(conn.state(), ConnState::Connected);
    }

    #[test]
    fn test_out_of_range_with_drop_message_keeps_connection() {
        let hits = Arc::new(AtomicUsize::new(0));
        let table = counting_table(ViolationPolicy::DropMessage, hits.clone());
        let conn = detached();

        let outcome = table.dispatch(&conn, &frame(250, 0, b"").unwrap());
        assert_eq!(outcome, DispatchOutcome::OutOfRange);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(conn.state(), ConnState::Connected);
    }

    #[test]
    fn test_out_of_range_with_drop_connection_closes() {
        let hits = Arc::new(AtomicUsize::new(0));
        let table = counting_table(ViolationPolicy::DropConnection, hits.clone());
        let conn = detached();

        let outcome = table.dispatch(&conn, &frame(99, 0, b"").unwrap());
        assert_eq!(outcome, DispatchOutcome::OutOfRange);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(conn.state(), ConnState::Closed);
    }

    #[test]
    fn test_malformed_frame() {
        let table = counting_table(ViolationPolicy::DropConnection, Arc::new(AtomicUsize::new(0)));
        let conn = detached();
        assert_eq!(table.dispatch(&conn, &[0, 1]), DispatchOutcome::Malformed);
        assert_eq!(conn.state(), ConnState::Connected);
    }
}
