//! Per-connection handle submitted to the hub.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use parchment_common::id::prefix;
use parchment_common::PrefixedId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Identifier of one accepted socket (`conn_` prefixed ULID).
///
/// Only minted by [`Client::new`], so two live handles never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnId(String);

impl PrefixedId for ConnId {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl ConnId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One live client session.
///
/// Holds the sending half of the connection's outbound buffer. Once handed to
/// the hub, the hub is the only writer; dropping the `Client` closes the
/// buffer, which the transport observes as the end of its outbound stream.
pub struct Client {
    conn_id: ConnId,
    /// Stable user identifier used as the presence key.
    pub user_id: String,
    /// Display name, used when the user record is first created.
    pub username: String,
    sender: mpsc::Sender<Bytes>,
}

impl Client {
    /// Create a handle and the receiving half of its outbound buffer.
    ///
    /// `capacity` is clamped to at least one slot.
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let client = Self {
            conn_id: ConnId(ConnId::generate()),
            user_id: user_id.into(),
            username: username.into(),
            sender,
        };
        (client, receiver)
    }

    pub fn conn_id(&self) -> &ConnId {
        &self.conn_id
    }

    /// Non-blocking enqueue onto the outbound buffer.
    pub(crate) fn try_deliver(&self, payload: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.sender.try_send(payload)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("conn_id", &self.conn_id)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .finish()
    }
}

// Identity is the connection, not the user: one user may hold several
// connections at once.
impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.conn_id == other.conn_id
    }
}

impl Eq for Client {}

impl Hash for Client {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.conn_id.hash(state);
    }
}

impl Borrow<ConnId> for Client {
    fn borrow(&self) -> &ConnId {
        &self.conn_id
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn conn_ids_are_prefixed_and_unique() {
        let (a, _rx_a) = Client::new("u1", "alice", 1);
        let (b, _rx_b) = Client::new("u1", "alice", 1);
        assert!(a.conn_id().as_str().starts_with("conn_"));
        assert_ne!(a.conn_id(), b.conn_id());
        assert_ne!(a, b);
    }

    #[test]
    fn set_lookup_by_conn_id() {
        let (a, _rx) = Client::new("u1", "alice", 1);
        let id = a.conn_id().clone();
        let mut set = HashSet::new();
        set.insert(a);

        assert!(set.contains(&id));
        let taken = set.take(&id).unwrap();
        assert_eq!(taken.user_id, "u1");
        assert!(set.is_empty());
    }

    #[test]
    fn try_deliver_reports_full_buffer() {
        let (client, mut rx) = Client::new("u1", "alice", 1);
        client.try_deliver(Bytes::from_static(b"one")).unwrap();
        assert!(matches!(
            client.try_deliver(Bytes::from_static(b"two")),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"one"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (client, _rx) = Client::new("u1", "alice", 0);
        assert!(client.try_deliver(Bytes::from_static(b"x")).is_ok());
    }

    #[test]
    fn dropping_client_closes_buffer() {
        let (client, mut rx) = Client::new("u1", "alice", 1);
        client.try_deliver(Bytes::from_static(b"last")).unwrap();
        drop(client);
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"last"));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
