//! Client library for the ZP sharded, replicated key-value cluster.
//!
//! A [`Cluster`] routes point and batched key operations to the data node
//! mastering each key's partition, and exposes the cluster-administration
//! surface (table lifecycle, replica management, node listings, statistics)
//! served by the meta service.
//!
//! The hard parts live in three cooperating layers:
//! - a cached topology snapshot (`(table, key) -> master`), refreshed from
//!   the meta service on miss or staleness and swapped in atomically;
//! - two connection pools (meta and data) with bounded retry, eviction on
//!   I/O error, and random-start failover across meta replicas;
//! - a dispatcher that retries stale single-key routes after one topology
//!   pull, and fans multi-key operations out to one long-lived worker per
//!   master node.
//!
//! [`Client`] is a thin per-table facade over a [`Cluster`] for the common
//! single-table case:
//!
//! ```no_run
//! use zp_client::{Client, Result};
//!
//! # async fn demo() -> Result<()> {
//! let client = Client::from_addr("127.0.0.1", 9221, "books")?;
//! client.connect().await?;
//! client.set("dune", "herbert", None).await?;
//! let value = client.get("dune").await?;
//! # let _ = value; Ok(())
//! # }
//! ```

pub mod client;
pub mod cluster;
pub mod config;
pub mod connection;
pub mod error;
pub mod node;
pub mod pool;
pub mod table;
mod worker;

pub use client::Client;
pub use cluster::{BinlogOffset, Cluster, NodeState, QpsInfo, SpaceInfo};
pub use config::Options;
pub use error::{Error, Result};
pub use node::Node;
pub use table::{Partition, Table};
