//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::node::Node;

fn default_connect_timeout_ms() -> u64 {
    1_000
}

fn default_rpc_timeout_ms() -> u64 {
    5_000
}

/// Options for building a [`Cluster`](crate::Cluster).
///
/// `meta_addr` lists the meta-service replicas and must be non-empty; the
/// client fails over between them. Timeouts bound a single TCP connect and a
/// single request/response exchange respectively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Meta service replicas.
    pub meta_addr: Vec<Node>,

    /// TCP connect timeout, milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-RPC send+receive timeout, milliseconds.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

impl Options {
    pub fn new(meta_addr: Vec<Node>) -> Self {
        Self {
            meta_addr,
            ..Default::default()
        }
    }

    /// Convenience constructor for a single meta endpoint.
    pub fn single(ip: impl Into<String>, port: u16) -> Self {
        Self::new(vec![Node::new(ip, port)])
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            meta_addr: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
        }
    }
}
