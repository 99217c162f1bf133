use super::Connection;

/// Application hooks invoked by the engine for one connection.
///
/// Implementations are shared by every connection created from the same
/// listener or connector, and are called from worker threads, so they must be
/// `Send + Sync`. Calls for any single connection never overlap.
///
/// # Ordering
///
/// For each connection: `on_connect` fires once, then zero or more
/// `on_message` calls, then `on_disconnect` exactly once. A failed outbound
/// attempt reports `on_connect(conn, false)` and nothing else.
pub trait Callbacks: Send + Sync + 'static {
    /// A complete frame arrived. `message` includes the 8-byte header.
    fn on_message(&self, conn: &Connection, message: &[u8]);

    /// The connection came up (`ok == true`) or an outbound attempt failed.
    fn on_connect(&self, conn: &Connection, ok: bool) {
        let _ = (conn, ok);
    }

    /// The connection went down after a successful connect.
    fn on_disconnect(&self, conn: &Connection) {
        let _ = conn;
    }
}
