//! Cluster coordinator: routing, pooling, dispatch and administration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use zp_proto::data::{self, CmdRequest, CmdResponse, CmdType, StatusCode};
use zp_proto::meta::{self, MetaCmd, MetaResponse, MetaStatusCode, MetaType, PullResponse};

use crate::config::Options;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::pool::ConnectionPool;
use crate::table::{Partition, Table};
use crate::worker::{CmdTask, WorkerRegistry};

/// Transport attempts per data RPC.
pub const DATA_ATTEMPT: usize = 2;
/// Transport attempts per meta RPC.
pub const META_ATTEMPT: usize = 3;

/// Binlog replication position of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinlogOffset {
    pub filenum: u32,
    pub offset: u64,
}

/// Disk usage reported by one data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceInfo {
    pub used: u64,
    pub remain: u64,
}

/// Query counters aggregated across a table's nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QpsInfo {
    pub qps: u64,
    pub total_query: u64,
}

/// Liveness of a data node as reported by the meta service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Up,
    Down,
}

/// Topology snapshot: epoch plus per-table partition maps. Replaced
/// wholesale on every installed pull; never mutated in place.
#[derive(Default, Debug)]
struct ClusterMap {
    epoch: u64,
    tables: HashMap<String, Arc<Table>>,
}

/// State shared between API callers and fan-out workers.
#[derive(Debug)]
pub(crate) struct ClusterCore {
    options: Options,
    meta_pool: ConnectionPool,
    data_pool: ConnectionPool,
    map: RwLock<ClusterMap>,
}

/// Entry point to a ZP cluster.
///
/// One `Cluster` may be shared by any number of concurrent callers; every
/// method is reentrant. Data commands route to the master of the key's
/// partition using the cached topology, refreshing it from the meta service
/// at most once per logical call when routing looks stale.
#[derive(Debug)]
pub struct Cluster {
    core: Arc<ClusterCore>,
    workers: WorkerRegistry,
}

impl Cluster {
    pub fn new(options: Options) -> Result<Self> {
        if options.meta_addr.is_empty() {
            return Err(Error::InvalidArgument("empty meta address list".into()));
        }
        let connect_timeout = options.connect_timeout();
        Ok(Self {
            core: Arc::new(ClusterCore {
                meta_pool: ConnectionPool::new(connect_timeout),
                data_pool: ConnectionPool::new(connect_timeout),
                map: RwLock::new(ClusterMap::default()),
                options,
            }),
            workers: WorkerRegistry::new(),
        })
    }

    /// Convenience constructor for a single meta endpoint.
    pub fn from_addr(ip: impl Into<String>, port: u16) -> Result<Self> {
        Self::new(Options::single(ip, port))
    }

    /// Verify that at least one meta replica accepts connections.
    pub async fn connect(&self) -> Result<()> {
        let conn = self
            .core
            .get_meta_conn()
            .await
            .ok_or_else(|| Error::Io("can't connect meta server".into()))?;
        debug!(meta = %conn.endpoint(), "connected to meta service");
        self.core.meta_pool.put(conn);
        Ok(())
    }

    /// Store `value` under `key`. A `ttl` of `None` (or a negative value)
    /// means the key never expires.
    pub async fn set(
        &self,
        table: &str,
        key: &str,
        value: impl Into<Vec<u8>>,
        ttl: Option<i32>,
    ) -> Result<()> {
        let request = CmdRequest {
            cmd_type: CmdType::Set as i32,
            set: Some(data::SetCmd {
                table_name: table.to_string(),
                key: key.to_string(),
                value: value.into(),
                ttl: ttl.filter(|t| *t >= 0),
            }),
            ..Default::default()
        };
        let response = self.core.submit_data_cmd(table, key, request).await?;
        match response.code() {
            StatusCode::Ok => Ok(()),
            _ => Err(Error::Corruption(response.msg)),
        }
    }

    /// Fetch the value stored under `key`.
    pub async fn get(&self, table: &str, key: &str) -> Result<Vec<u8>> {
        let request = CmdRequest {
            cmd_type: CmdType::Get as i32,
            get: Some(data::GetCmd {
                table_name: table.to_string(),
                key: key.to_string(),
            }),
            ..Default::default()
        };
        let response = self.core.submit_data_cmd(table, key, request).await?;
        match response.code() {
            StatusCode::Ok => Ok(response.get.map(|g| g.value).unwrap_or_default()),
            StatusCode::NotFound => Err(Error::NotFound("key do not exist".into())),
            _ => Err(Error::Corruption(response.msg)),
        }
    }

    /// Remove `key`.
    pub async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let request = CmdRequest {
            cmd_type: CmdType::Del as i32,
            del: Some(data::DelCmd {
                table_name: table.to_string(),
                key: key.to_string(),
            }),
            ..Default::default()
        };
        let response = self.core.submit_data_cmd(table, key, request).await?;
        match response.code() {
            StatusCode::Ok => Ok(()),
            _ => Err(Error::Corruption(response.msg)),
        }
    }

    /// Fetch many keys at once, merging results into `values`.
    ///
    /// Keys are bucketed per master node and each bucket runs as one
    /// sub-request on that master's dedicated worker. Like
    /// [`Read::read_to_end`](std::io::Read::read_to_end), output produced
    /// before a failure stays in `values`: entries from successful
    /// sub-requests are merged even when the call returns an error.
    pub async fn mget(
        &self,
        table: &str,
        keys: &[String],
        values: &mut HashMap<String, Vec<u8>>,
    ) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        // Group keys by master; at most one topology refresh while resolving.
        let mut buckets: HashMap<Node, CmdRequest> = HashMap::new();
        for key in keys {
            let master = self.core.get_data_master(table, key).await?;
            let request = buckets.entry(master).or_insert_with(|| CmdRequest {
                cmd_type: CmdType::Mget as i32,
                mget: Some(data::MgetCmd {
                    table_name: table.to_string(),
                    keys: Vec::new(),
                }),
                ..Default::default()
            });
            if let Some(mget) = request.mget.as_mut() {
                mget.keys.push(key.clone());
            }
        }

        // One sub-request per distinct master, on its dedicated worker.
        let mut pending = Vec::with_capacity(buckets.len());
        for (master, request) in buckets {
            let key = request
                .mget
                .as_ref()
                .and_then(|m| m.keys.first())
                .cloned()
                .unwrap_or_default();
            let (done, rx) = oneshot::channel();
            let task = CmdTask {
                table: table.to_string(),
                key,
                request,
                done,
            };
            self.workers.submit(master, task, Arc::clone(&self.core));
            pending.push(rx);
        }

        let mut failed = false;
        for rx in pending {
            match rx.await {
                Ok(Ok(response)) => {
                    if response.code() != StatusCode::Ok {
                        failed = true;
                    }
                    for entry in response.mget {
                        values.insert(entry.key, entry.value);
                    }
                }
                Ok(Err(e)) => {
                    warn!(table, "mget sub-request failed: {e}");
                    failed = true;
                }
                // Worker dropped the task without completing it.
                Err(_) => failed = true,
            }
        }
        if failed {
            return Err(Error::Corruption("mget error happened".into()));
        }
        Ok(())
    }

    /// Create `table` with a fixed number of partitions.
    pub async fn create_table(&self, table: &str, partition_count: u32) -> Result<()> {
        if table.is_empty() {
            return Err(Error::InvalidArgument("empty table name".into()));
        }
        if partition_count == 0 {
            return Err(Error::InvalidArgument(
                "partition count must be positive".into(),
            ));
        }
        let cmd = MetaCmd {
            cmd_type: MetaType::Init as i32,
            init: Some(meta::InitCmd {
                name: table.to_string(),
                partition_num: partition_count,
            }),
            ..Default::default()
        };
        check_meta_ok(self.core.submit_meta_cmd(cmd).await?).map(|_| ())
    }

    pub async fn drop_table(&self, table: &str) -> Result<()> {
        let cmd = MetaCmd {
            cmd_type: MetaType::DropTable as i32,
            drop_table: Some(meta::DropTableCmd {
                name: table.to_string(),
            }),
            ..Default::default()
        };
        check_meta_ok(self.core.submit_meta_cmd(cmd).await?).map(|_| ())
    }

    /// Refresh the cached topology for `table` from the meta service.
    pub async fn pull(&self, table: &str) -> Result<()> {
        self.core.pull(table).await
    }

    /// Promote `node` to master of `table`'s partition `partition`.
    pub async fn set_master(&self, table: &str, partition: u32, node: &Node) -> Result<()> {
        self.replica_cmd(MetaType::SetMaster, table, partition, node)
            .await
    }

    /// Attach `node` as a slave of `table`'s partition `partition`.
    pub async fn add_slave(&self, table: &str, partition: u32, node: &Node) -> Result<()> {
        self.replica_cmd(MetaType::AddSlave, table, partition, node)
            .await
    }

    /// Detach `node` from `table`'s partition `partition`.
    pub async fn remove_slave(&self, table: &str, partition: u32, node: &Node) -> Result<()> {
        self.replica_cmd(MetaType::RemoveSlave, table, partition, node)
            .await
    }

    async fn replica_cmd(
        &self,
        cmd_type: MetaType,
        table: &str,
        partition: u32,
        node: &Node,
    ) -> Result<()> {
        let basic = meta::BasicCmd {
            name: table.to_string(),
            partition,
            node: Some(node.into()),
        };
        let mut cmd = MetaCmd {
            cmd_type: cmd_type as i32,
            ..Default::default()
        };
        match cmd_type {
            MetaType::SetMaster => cmd.set_master = Some(basic),
            MetaType::AddSlave => cmd.add_slave = Some(basic),
            MetaType::RemoveSlave => cmd.remove_slave = Some(basic),
            _ => return Err(Error::InvalidArgument("not a replica command".into())),
        }
        check_meta_ok(self.core.submit_meta_cmd(cmd).await?).map(|_| ())
    }

    /// The meta quorum's leader and followers.
    pub async fn list_meta(&self) -> Result<(Node, Vec<Node>)> {
        let cmd = MetaCmd {
            cmd_type: MetaType::ListMeta as i32,
            ..Default::default()
        };
        let response = check_meta_ok(self.core.submit_meta_cmd(cmd).await?)?;
        let info = response
            .list_meta
            .ok_or_else(|| Error::Corruption("list_meta response missing payload".into()))?;
        let leader = info
            .leader
            .as_ref()
            .ok_or_else(|| Error::Corruption("meta service reported no leader".into()))?;
        let followers = info
            .followers
            .iter()
            .map(Node::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((Node::try_from(leader)?, followers))
    }

    /// All data nodes known to the meta service, with their liveness.
    pub async fn list_node(&self) -> Result<Vec<(Node, NodeState)>> {
        let cmd = MetaCmd {
            cmd_type: MetaType::ListNode as i32,
            ..Default::default()
        };
        let response = check_meta_ok(self.core.submit_meta_cmd(cmd).await?)?;
        let info = response
            .list_node
            .ok_or_else(|| Error::Corruption("list_node response missing payload".into()))?;
        let mut nodes = Vec::with_capacity(info.nodes.len());
        for status in &info.nodes {
            let addr = status
                .node
                .as_ref()
                .ok_or_else(|| Error::Corruption("node listing entry missing address".into()))?;
            let state = if status.status == 0 {
                NodeState::Up
            } else {
                NodeState::Down
            };
            nodes.push((Node::try_from(addr)?, state));
        }
        Ok(nodes)
    }

    /// Names of all tables known to the meta service.
    pub async fn list_table(&self) -> Result<Vec<String>> {
        let cmd = MetaCmd {
            cmd_type: MetaType::ListTable as i32,
            ..Default::default()
        };
        let response = check_meta_ok(self.core.submit_meta_cmd(cmd).await?)?;
        Ok(response.list_table.map(|t| t.names).unwrap_or_default())
    }

    /// Sum query counters for `table` across its nodes. Nodes that fail to
    /// answer are skipped; partial results are acceptable.
    pub async fn info_qps(&self, table: &str) -> Result<QpsInfo> {
        let table_map = self.refreshed_table(table).await?;
        let request = CmdRequest {
            cmd_type: CmdType::InfoStats as i32,
            ..Default::default()
        };
        let mut out = QpsInfo::default();
        for node in table_map.nodes() {
            let response = match self.core.try_data_rpc(&node, &request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(%node, "skipping stats from unreachable node: {e}");
                    continue;
                }
            };
            for stats in response.info_stats {
                if stats.table_name == table {
                    out.qps += stats.qps;
                    out.total_query += stats.total_query;
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Binlog offsets of `table`'s partitions on one node. An unreachable
    /// node or an unknown table yields an empty result; partial results are
    /// acceptable.
    pub async fn info_offset(&self, node: &Node, table: &str) -> Result<Vec<(u32, BinlogOffset)>> {
        if let Err(e) = self.core.pull(table).await {
            debug!(table, "refresh before info command failed: {e}");
        }
        let request = CmdRequest {
            cmd_type: CmdType::InfoPartition as i32,
            ..Default::default()
        };
        let response = match self.core.try_data_rpc(node, &request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(%node, "skipping offsets from unreachable node: {e}");
                return Ok(Vec::new());
            }
        };
        let mut offsets = Vec::new();
        for info in response.info_partition {
            if info.table_name != table {
                continue;
            }
            for sync in info.sync_offset {
                offsets.push((
                    sync.partition,
                    BinlogOffset {
                        filenum: sync.filenum,
                        offset: sync.offset,
                    },
                ));
            }
            break;
        }
        Ok(offsets)
    }

    /// Disk usage of `table` on each of its nodes. Nodes that fail to
    /// answer are skipped; partial results are acceptable.
    pub async fn info_space(&self, table: &str) -> Result<Vec<(Node, SpaceInfo)>> {
        let table_map = self.refreshed_table(table).await?;
        let request = CmdRequest {
            cmd_type: CmdType::InfoCapacity as i32,
            ..Default::default()
        };
        let mut spaces = Vec::new();
        for node in table_map.nodes() {
            let response = match self.core.try_data_rpc(&node, &request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(%node, "skipping capacity from unreachable node: {e}");
                    continue;
                }
            };
            for capacity in response.info_capacity {
                if capacity.table_name == table {
                    spaces.push((
                        node.clone(),
                        SpaceInfo {
                            used: capacity.used,
                            remain: capacity.remain,
                        },
                    ));
                    break;
                }
            }
        }
        Ok(spaces)
    }

    /// The partition record owning `key`, from the cached topology.
    pub fn get_partition(&self, table: &str, key: &str) -> Option<Partition> {
        self.core
            .table(table)
            .map(|t| t.partition_for_key(key.as_bytes()).clone())
    }

    /// Human-readable dump of the cached topology for `table`.
    pub fn debug_dump_table(&self, table: &str) -> Result<String> {
        let map = self.core.map.read();
        let t = map
            .tables
            .get(table)
            .ok_or_else(|| Error::NotFound("don't have this table's info".into()))?;
        Ok(format!("epoch:{}\n{}", map.epoch, t.debug_dump()))
    }

    /// Epoch of the cached topology snapshot.
    pub fn epoch(&self) -> u64 {
        self.core.map.read().epoch
    }

    /// Drain and join the fan-out workers. Further `mget` calls respawn
    /// workers on demand.
    pub async fn shutdown(&self) {
        self.workers.shutdown().await;
    }

    /// Pull a fresh topology for `table` and return its map. The info
    /// commands tolerate a failed refresh as long as a snapshot is cached.
    async fn refreshed_table(&self, table: &str) -> Result<Arc<Table>> {
        if let Err(e) = self.core.pull(table).await {
            debug!(table, "refresh before info command failed: {e}");
        }
        self.core
            .table(table)
            .ok_or_else(|| Error::NotFound("this table does not exist".into()))
    }
}

fn check_meta_ok(response: MetaResponse) -> Result<MetaResponse> {
    if response.code() == MetaStatusCode::Ok {
        Ok(response)
    } else {
        Err(Error::Corruption(response.msg))
    }
}

impl ClusterCore {
    fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.map.read().tables.get(name).cloned()
    }

    /// Master of `key` from the cached topology only.
    fn try_get_data_master(&self, table: &str, key: &str) -> Result<Node> {
        self.table(table)
            .map(|t| t.key_master(key.as_bytes()).clone())
            .ok_or_else(|| Error::NotFound("table does not exist".into()))
    }

    /// Master of `key`, refreshing the topology once on a miss.
    async fn get_data_master(&self, table: &str, key: &str) -> Result<Node> {
        match self.try_get_data_master(table, key) {
            Ok(master) => Ok(master),
            Err(_) => {
                self.pull(table).await?;
                self.try_get_data_master(table, key)
            }
        }
    }

    /// Route one data command and execute it, refreshing the topology and
    /// retrying at most once when the route fails or the response signals a
    /// non-OK status (stale routing included).
    pub(crate) async fn submit_data_cmd(
        &self,
        table: &str,
        key: &str,
        request: CmdRequest,
    ) -> Result<CmdResponse> {
        let mut pulled = false;
        loop {
            let outcome = match self.try_get_data_master(table, key) {
                Ok(master) => self.try_data_rpc(&master, &request).await,
                Err(e) => Err(e),
            };
            match &outcome {
                Ok(response) if response.code() == StatusCode::Ok => return outcome,
                _ if pulled => return outcome,
                Ok(response) => {
                    debug!(table, key, code = response.code, "refreshing stale route")
                }
                Err(e) => debug!(table, key, "refreshing route after failure: {e}"),
            }
            self.pull(table).await?;
            pulled = true;
        }
    }

    /// One data RPC with bounded transport retry. A failed channel is
    /// dropped (evicted) before the next attempt acquires one.
    pub(crate) async fn try_data_rpc(
        &self,
        master: &Node,
        request: &CmdRequest,
    ) -> Result<CmdResponse> {
        let mut last_err = Error::Incomplete("data rpc not attempted".into());
        for attempt in 0..DATA_ATTEMPT {
            let Some(mut conn) = self.data_pool.get(master).await else {
                return Err(Error::Io(format!("failed to reach data node {master}")));
            };
            match conn.call(request, self.options.rpc_timeout()).await {
                Ok(response) => {
                    self.data_pool.put(conn);
                    return Ok(response);
                }
                Err(e) => {
                    warn!(%master, attempt, "data rpc failed: {e}");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// One meta RPC with bounded retry and failover across replicas.
    pub(crate) async fn submit_meta_cmd(&self, request: MetaCmd) -> Result<MetaResponse> {
        let mut last_err = Error::Incomplete("meta rpc not attempted".into());
        for attempt in 0..META_ATTEMPT {
            let Some(mut conn) = self.get_meta_conn().await else {
                return Err(Error::Io("can't connect meta server".into()));
            };
            match conn.call(&request, self.options.rpc_timeout()).await {
                Ok(response) => {
                    self.meta_pool.put(conn);
                    return Ok(response);
                }
                Err(e) => {
                    warn!(meta = %conn.endpoint(), attempt, "meta rpc failed: {e}");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// An existing pooled meta channel if any; otherwise scan the configured
    /// replicas circularly from a uniformly random start, so cold connects
    /// spread across the quorum instead of hammering the first address.
    async fn get_meta_conn(&self) -> Option<crate::connection::Connection> {
        if let Some(conn) = self.meta_pool.get_any_existing() {
            return Some(conn);
        }
        let addrs = &self.options.meta_addr;
        let start = rand::rng().random_range(0..addrs.len());
        for i in 0..addrs.len() {
            let endpoint = &addrs[(start + i) % addrs.len()];
            if let Some(conn) = self.meta_pool.get(endpoint).await {
                return Some(conn);
            }
        }
        None
    }

    /// Pull the topology for `table` and install the returned snapshot.
    pub(crate) async fn pull(&self, table: &str) -> Result<()> {
        let cmd = MetaCmd {
            cmd_type: MetaType::Pull as i32,
            pull: Some(meta::PullCmd {
                name: table.to_string(),
            }),
            ..Default::default()
        };
        let response = self.submit_meta_cmd(cmd).await?;
        if response.code() != MetaStatusCode::Ok {
            return Err(Error::Corruption(response.msg));
        }
        let snapshot = response
            .pull
            .ok_or_else(|| Error::Corruption("pull response missing payload".into()))?;
        self.reset_cluster_map(snapshot)
    }

    /// Replace the cached map with `snapshot`, all-or-nothing. Readers see
    /// either the whole old snapshot or the whole new one. A snapshot older
    /// than the cached epoch (a lagging meta follower) is discarded.
    fn reset_cluster_map(&self, snapshot: PullResponse) -> Result<()> {
        let mut tables = HashMap::with_capacity(snapshot.info.len());
        for info in &snapshot.info {
            let table = Table::from_pull_info(info)?;
            tables.insert(table.name().to_string(), Arc::new(table));
        }
        let mut map = self.map.write();
        if snapshot.version < map.epoch {
            warn!(
                cached = map.epoch,
                pulled = snapshot.version,
                "discarding stale topology snapshot"
            );
            return Ok(());
        }
        debug!(
            epoch = snapshot.version,
            tables = tables.len(),
            "installed topology snapshot"
        );
        map.epoch = snapshot.version;
        map.tables = tables;
        Ok(())
    }
}
