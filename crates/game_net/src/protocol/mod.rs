//! Framed command protocol.
//!
//! Every message is an 8-byte header followed by `length` payload bytes. The
//! command code in the header selects a handler from the receiving role's
//! [`CommandTable`], after a range check against that role's
//! [`CommandRange`].

pub mod codec;
pub mod dispatch;
pub mod header;
pub mod role;

pub use codec::{decode_body, encode};
pub use dispatch::{CommandRange, CommandTable, DispatchOutcome, Handler, ViolationPolicy};
pub use header::{frame, payload, MessageHeader, HEADER_LEN};
pub use role::{Role, RoleBuilder};
