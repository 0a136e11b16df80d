//! Per-table partition topology.
//!
//! A [`Table`] is an immutable snapshot built from one pulled topology
//! description. Key routing is a pure function of `(key, snapshot)`:
//! repeated lookups without an intervening pull return identical results.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use crc::{Crc, CRC_16_XMODEM};
use zp_proto::meta::TableInfo;

use crate::error::{Error, Result};
use crate::node::Node;

/// CRC16 calculator matching the cluster-wide key-to-partition hash.
static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// One shard of a table: the unit of replication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub id: u32,
    pub master: Node,
    pub slaves: Vec<Node>,
}

/// Partition topology of one table.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    partition_count: u32,
    partitions: HashMap<u32, Partition>,
}

impl Table {
    /// Build a snapshot from one pulled table description.
    ///
    /// Rejects snapshots that violate the topology invariants: at least one
    /// partition, a master on every partition, and partition ids covering
    /// exactly `0..partition_count`.
    pub fn from_pull_info(info: &TableInfo) -> Result<Self> {
        if info.partitions.is_empty() {
            return Err(Error::Corruption(format!(
                "table {} has no partitions",
                info.name
            )));
        }
        let partition_count = info.partitions.len() as u32;
        let mut partitions = HashMap::with_capacity(info.partitions.len());
        for p in &info.partitions {
            let master = p.master.as_ref().ok_or_else(|| {
                Error::Corruption(format!(
                    "table {} partition {} has no master",
                    info.name, p.id
                ))
            })?;
            let partition = Partition {
                id: p.id,
                master: Node::try_from(master)?,
                slaves: p
                    .slaves
                    .iter()
                    .map(Node::try_from)
                    .collect::<Result<Vec<_>>>()?,
            };
            if p.id >= partition_count || partitions.insert(p.id, partition).is_some() {
                return Err(Error::Corruption(format!(
                    "table {} has an invalid partition id {}",
                    info.name, p.id
                )));
            }
        }
        Ok(Self {
            name: info.name.clone(),
            partition_count,
            partitions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Partition id owning `key`: CRC16/XMODEM of the key bytes modulo the
    /// partition count. Must stay in lockstep with the server-side hash.
    pub fn key_partition_id(&self, key: &[u8]) -> u32 {
        u32::from(CRC16.checksum(key)) % self.partition_count
    }

    /// Master node of the partition owning `key`.
    pub fn key_master(&self, key: &[u8]) -> &Node {
        &self.partition_for_key(key).master
    }

    /// Full partition record for `key`.
    pub fn partition_for_key(&self, key: &[u8]) -> &Partition {
        // Construction guarantees every id in 0..partition_count is present.
        &self.partitions[&self.key_partition_id(key)]
    }

    /// Partition record by id.
    pub fn partition(&self, id: u32) -> Option<&Partition> {
        self.partitions.get(&id)
    }

    /// Union of all masters and slaves across partitions, sorted.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes = BTreeSet::new();
        for partition in self.partitions.values() {
            nodes.insert(partition.master.clone());
            nodes.extend(partition.slaves.iter().cloned());
        }
        nodes.into_iter().collect()
    }

    /// Human-readable topology dump for operator tooling.
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "table {}: {} partitions",
            self.name, self.partition_count
        );
        for id in 0..self.partition_count {
            if let Some(p) = self.partitions.get(&id) {
                let slaves: Vec<String> = p.slaves.iter().map(Node::to_string).collect();
                let _ = writeln!(
                    out,
                    "  {:>4}: master {} slaves [{}]",
                    id,
                    p.master,
                    slaves.join(", ")
                );
            }
        }
        out
    }
}
