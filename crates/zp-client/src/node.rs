//! Endpoint addressing for meta and data nodes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zp_proto::meta::NodeAddr;

use crate::error::Error;

/// A cluster endpoint, identified by `(ip, port)`.
///
/// Value-equal and orderable; used as the key of connection pools, routing
/// tables and worker registries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    pub ip: String,
    pub port: u16,
}

impl Node {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for Node {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidArgument(format!("malformed endpoint '{s}'")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("malformed port in '{s}'")))?;
        if ip.is_empty() || port == 0 {
            return Err(Error::InvalidArgument(format!("malformed endpoint '{s}'")));
        }
        Ok(Node::new(ip, port))
    }
}

impl From<&Node> for NodeAddr {
    fn from(node: &Node) -> Self {
        NodeAddr {
            ip: node.ip.clone(),
            port: u32::from(node.port),
        }
    }
}

impl TryFrom<&NodeAddr> for Node {
    type Error = Error;

    fn try_from(addr: &NodeAddr) -> Result<Self, Self::Error> {
        let port = u16::try_from(addr.port)
            .map_err(|_| Error::Corruption(format!("node port {} out of range", addr.port)))?;
        if port == 0 {
            return Err(Error::Corruption(format!("node {} has port 0", addr.ip)));
        }
        Ok(Node::new(addr.ip.clone(), port))
    }
}
