//! Per-table convenience facade.

use std::collections::HashMap;

use crate::cluster::Cluster;
use crate::config::Options;
use crate::error::Result;

/// A [`Cluster`] bound to one table, for the common single-table case.
pub struct Client {
    cluster: Cluster,
    table: String,
}

impl Client {
    pub fn new(options: Options, table: impl Into<String>) -> Result<Self> {
        Ok(Self {
            cluster: Cluster::new(options)?,
            table: table.into(),
        })
    }

    /// Convenience constructor for a single meta endpoint.
    pub fn from_addr(ip: impl Into<String>, port: u16, table: impl Into<String>) -> Result<Self> {
        Self::new(Options::single(ip, port), table)
    }

    /// Connect to the meta service and pull the bound table's topology.
    pub async fn connect(&self) -> Result<()> {
        self.cluster.connect().await?;
        self.cluster.pull(&self.table).await
    }

    pub async fn set(&self, key: &str, value: impl Into<Vec<u8>>, ttl: Option<i32>) -> Result<()> {
        self.cluster.set(&self.table, key, value, ttl).await
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.cluster.get(&self.table, key).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.cluster.delete(&self.table, key).await
    }

    pub async fn mget(
        &self,
        keys: &[String],
        values: &mut HashMap<String, Vec<u8>>,
    ) -> Result<()> {
        self.cluster.mget(&self.table, keys, values).await
    }

    /// The bound table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The underlying cluster handle, for administration calls.
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }
}
