//! Keyed cache of live channels, at most one idle channel per endpoint.
//!
//! Channels are checked out for the duration of one RPC: `get` hands the
//! caller exclusive ownership, `put` returns a healthy channel, and dropping
//! a checked-out channel without `put` is the eviction path. Since a broken
//! channel is dropped where the I/O error surfaced, eviction always happens
//! before any retry can acquire a channel again. The pool itself never
//! retries.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::connection::Connection;
use crate::node::Node;

#[derive(Debug)]
pub struct ConnectionPool {
    idle: Mutex<HashMap<Node, Connection>>,
    connect_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            connect_timeout,
        }
    }

    /// Check out a channel for `endpoint`, opening one on a cache miss.
    /// Returns `None` when the endpoint is unreachable; surfacing that as an
    /// error is the caller's job.
    pub async fn get(&self, endpoint: &Node) -> Option<Connection> {
        if let Some(conn) = self.idle.lock().remove(endpoint) {
            debug!(%endpoint, idle_for = ?conn.idle_for(), "reusing pooled channel");
            return Some(conn);
        }
        match Connection::connect(endpoint, self.connect_timeout).await {
            Ok(conn) => Some(conn),
            Err(e) => {
                debug!(%endpoint, "connect failed: {e}");
                None
            }
        }
    }

    /// Check out any idle channel without opening new ones. Used by the
    /// meta-plane fast path to stick with an already-working replica.
    pub fn get_any_existing(&self) -> Option<Connection> {
        let mut idle = self.idle.lock();
        let endpoint = idle.keys().next().cloned()?;
        idle.remove(&endpoint)
    }

    /// Return a healthy channel. If another channel to the same endpoint was
    /// cached in the meantime, the older one is dropped.
    pub fn put(&self, conn: Connection) {
        self.idle.lock().insert(conn.endpoint().clone(), conn);
    }

    /// Number of idle channels.
    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.lock().is_empty()
    }

    /// Whether an idle channel to `endpoint` is cached.
    pub fn contains(&self, endpoint: &Node) -> bool {
        self.idle.lock().contains_key(endpoint)
    }
}
