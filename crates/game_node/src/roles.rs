//! Role tables for the services this node can run.
//!
//! Each service declares the command range it accepts and how it reacts to
//! a peer that steps outside it. The center accepts login traffic and
//! tolerates stray commands; the client trusts its upstream less and drops
//! the link on the first violation.

use game_net::protocol::{CommandRange, Role, ViolationPolicy};
use game_net::{Connection, ProtocolError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Command codes shared by the services.
pub mod cmd {
    /// login -> center
    pub const LE_BEGIN: u16 = 2000;
    pub const LE_USER_LOGIN_REQUEST: u16 = 2001;
    pub const LE_END: u16 = 2100;

    /// server -> client
    pub const SC_BEGIN: u16 = 1000;
    pub const LC_LOGIN_REPLY: u16 = 1001;
    pub const GC_CONNECT_REPLY: u16 = 1002;
    pub const SC_END: u16 = 1100;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLoginRequest {
    pub tempid: u32,
    pub uid: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginReply {
    pub err: u32,
    pub uid: u64,
    pub session_key: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectReply {
    pub err: u32,
}

/// Builds the center's table for connections from login servers.
///
/// Every login request is answered with a fresh session key on the same
/// connection.
pub fn center_role() -> Result<Role, ProtocolError> {
    let next_session = Arc::new(AtomicU32::new(1));

    Role::builder("center", CommandRange::new(cmd::LE_BEGIN, cmd::LE_END)?)
        .policy(ViolationPolicy::DropMessage)
        .on_typed(cmd::LE_USER_LOGIN_REQUEST, move |conn: &Connection, req: UserLoginRequest| {
            let session_key = next_session.fetch_add(1, Ordering::Relaxed);
            debug!("center: login request tempid {} uid {}", req.tempid, req.uid);
            let reply = LoginReply {
                err: 0,
                uid: req.uid,
                session_key,
            };
            if let Err(e) = conn.send(cmd::LC_LOGIN_REPLY, &reply) {
                warn!("center: reply to conn {} failed: {}", conn.id(), e);
            }
        })
        .on_connect(|conn, ok| {
            if ok {
                info!("center: login server connected from {}", conn.peer_addr());
            }
        })
        .on_disconnect(|conn| info!("center: login server {} disconnected", conn.peer_addr()))
        .build()
}

/// What the client has learned from its upstream.
#[derive(Debug, Default)]
pub struct ClientSession {
    logged_in: AtomicBool,
    session_key: AtomicU32,
}

impl ClientSession {
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    pub fn session_key(&self) -> Option<u32> {
        self.is_logged_in()
            .then(|| self.session_key.load(Ordering::Acquire))
    }
}

/// Builds the client's table for messages from its upstream.
///
/// On connect the client sends a login request for `uid`.
pub fn client_role(uid: u64, session: Arc<ClientSession>) -> Result<Role, ProtocolError> {
    let on_reply = session.clone();
    let on_lost = session;

    Role::builder("client", CommandRange::new(cmd::SC_BEGIN, cmd::SC_END)?)
        .policy(ViolationPolicy::DropConnection)
        .on_typed(cmd::LC_LOGIN_REPLY, move |_conn: &Connection, reply: LoginReply| {
            if reply.err != 0 {
                error!("client: login rejected with err {}", reply.err);
                return;
            }
            info!("client: logged in as {} with session {}", reply.uid, reply.session_key);
            on_reply.session_key.store(reply.session_key, Ordering::Release);
            on_reply.logged_in.store(true, Ordering::Release);
        })
        .on_typed(cmd::GC_CONNECT_REPLY, |_conn: &Connection, reply: ConnectReply| {
            debug!("client: gate connect reply err {}", reply.err);
        })
        .on_connect(move |conn, ok| {
            if !ok {
                warn!("client: upstream {} unreachable", conn.peer_addr());
                return;
            }
            let request = UserLoginRequest { tempid: 1, uid };
            if let Err(e) = conn.send(cmd::LE_USER_LOGIN_REQUEST, &request) {
                warn!("client: login request failed: {}", e);
            }
        })
        .on_disconnect(move |conn| {
            on_lost.logged_in.store(false, Ordering::Release);
            warn!("client: lost upstream {}", conn.peer_addr());
        })
        .build()
}
