//! In-process mock meta and data servers speaking the framed wire protocol.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use zp_client::{Cluster, Node};
use zp_proto::data::{self, CmdRequest, CmdResponse, CmdType, StatusCode};
use zp_proto::meta::{self, MetaCmd, MetaResponse, MetaStatusCode, MetaType};

/// Install a subscriber once so `RUST_LOG=debug` shows client traces.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn read_frame<M: Message + Default>(stream: &mut TcpStream) -> Result<Option<M>> {
    let len = match stream.read_u32().await {
        Ok(len) => len,
        Err(_) => return Ok(None),
    };
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok(Some(M::decode(body.as_slice())?))
}

pub async fn write_frame<M: Message>(stream: &mut TcpStream, message: &M) -> Result<()> {
    let body = message.encode_to_vec();
    stream.write_u32(body.len() as u32).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

fn node_of(addr: SocketAddr) -> Node {
    Node::new(addr.ip().to_string(), addr.port())
}

/// Allocate a port with nothing listening on it.
pub async fn dead_endpoint() -> Node {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = node_of(listener.local_addr().unwrap());
    drop(listener);
    endpoint
}

// ---------------------------------------------------------------------------
// Meta service mock
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MetaState {
    pub version: u64,
    pub tables: HashMap<String, Vec<meta::PartitionInfo>>,
    pub data_nodes: Vec<Node>,
    pub leader: Option<Node>,
    pub followers: Vec<Node>,
    pub pull_count: usize,
}

impl MetaState {
    /// Reassign one partition's master, bumping the topology version.
    pub fn move_master(&mut self, table: &str, partition: u32, master: &Node) {
        if let Some(partitions) = self.tables.get_mut(table) {
            if let Some(p) = partitions.iter_mut().find(|p| p.id == partition) {
                p.master = Some(master.into());
            }
        }
        self.version += 1;
    }
}

pub struct MockMetaServer {
    pub addr: Node,
    pub state: Arc<Mutex<MetaState>>,
    handle: JoinHandle<()>,
}

impl MockMetaServer {
    pub async fn start(state: Arc<Mutex<MetaState>>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = node_of(listener.local_addr()?);
        {
            let mut st = state.lock();
            if st.leader.is_none() {
                st.leader = Some(addr.clone());
            }
        }
        let conn_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let state = conn_state.clone();
                tokio::spawn(async move {
                    while let Ok(Some(cmd)) = read_frame::<MetaCmd>(&mut stream).await {
                        let response = handle_meta(&state, cmd);
                        if write_frame(&mut stream, &response).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

fn ok_response() -> MetaResponse {
    MetaResponse {
        code: MetaStatusCode::Ok as i32,
        ..Default::default()
    }
}

fn error_response(msg: &str) -> MetaResponse {
    MetaResponse {
        code: MetaStatusCode::Error as i32,
        msg: msg.to_string(),
        ..Default::default()
    }
}

fn handle_meta(state: &Mutex<MetaState>, cmd: MetaCmd) -> MetaResponse {
    let mut state = state.lock();
    match MetaType::try_from(cmd.cmd_type) {
        Ok(MetaType::Init) => {
            let Some(init) = cmd.init else {
                return error_response("missing init payload");
            };
            if state.data_nodes.is_empty() {
                return error_response("no data nodes registered");
            }
            if state.tables.contains_key(&init.name) {
                return error_response("table already exists");
            }
            let nodes = state.data_nodes.clone();
            let partitions = (0..init.partition_num)
                .map(|id| meta::PartitionInfo {
                    id,
                    master: Some((&nodes[id as usize % nodes.len()]).into()),
                    slaves: Vec::new(),
                })
                .collect();
            state.tables.insert(init.name, partitions);
            state.version += 1;
            ok_response()
        }
        Ok(MetaType::DropTable) => {
            let Some(drop) = cmd.drop_table else {
                return error_response("missing drop_table payload");
            };
            if state.tables.remove(&drop.name).is_none() {
                return error_response("table does not exist");
            }
            state.version += 1;
            ok_response()
        }
        Ok(MetaType::Pull) => {
            state.pull_count += 1;
            let Some(pull) = cmd.pull else {
                return error_response("missing pull payload");
            };
            let info = state
                .tables
                .get(&pull.name)
                .map(|partitions| {
                    vec![meta::TableInfo {
                        name: pull.name.clone(),
                        partitions: partitions.clone(),
                    }]
                })
                .unwrap_or_default();
            MetaResponse {
                code: MetaStatusCode::Ok as i32,
                pull: Some(meta::PullResponse {
                    version: state.version,
                    info,
                }),
                ..Default::default()
            }
        }
        Ok(MetaType::SetMaster) => {
            let Some(basic) = cmd.set_master else {
                return error_response("missing set_master payload");
            };
            let Some(node) = basic.node else {
                return error_response("missing node");
            };
            match state.tables.get_mut(&basic.name) {
                Some(partitions) => {
                    let Some(p) = partitions.iter_mut().find(|p| p.id == basic.partition) else {
                        return error_response("partition does not exist");
                    };
                    p.master = Some(node);
                    state.version += 1;
                    ok_response()
                }
                None => error_response("table does not exist"),
            }
        }
        Ok(MetaType::AddSlave) => {
            let Some(basic) = cmd.add_slave else {
                return error_response("missing add_slave payload");
            };
            let Some(node) = basic.node else {
                return error_response("missing node");
            };
            match state.tables.get_mut(&basic.name) {
                Some(partitions) => {
                    let Some(p) = partitions.iter_mut().find(|p| p.id == basic.partition) else {
                        return error_response("partition does not exist");
                    };
                    p.slaves.push(node);
                    state.version += 1;
                    ok_response()
                }
                None => error_response("table does not exist"),
            }
        }
        Ok(MetaType::RemoveSlave) => {
            let Some(basic) = cmd.remove_slave else {
                return error_response("missing remove_slave payload");
            };
            let Some(node) = basic.node else {
                return error_response("missing node");
            };
            match state.tables.get_mut(&basic.name) {
                Some(partitions) => {
                    let Some(p) = partitions.iter_mut().find(|p| p.id == basic.partition) else {
                        return error_response("partition does not exist");
                    };
                    p.slaves.retain(|s| *s != node);
                    state.version += 1;
                    ok_response()
                }
                None => error_response("table does not exist"),
            }
        }
        Ok(MetaType::ListMeta) => MetaResponse {
            code: MetaStatusCode::Ok as i32,
            list_meta: Some(meta::MetaNodes {
                leader: state.leader.as_ref().map(Into::into),
                followers: state.followers.iter().map(Into::into).collect(),
            }),
            ..Default::default()
        },
        Ok(MetaType::ListNode) => MetaResponse {
            code: MetaStatusCode::Ok as i32,
            list_node: Some(meta::ListNodeInfo {
                nodes: state
                    .data_nodes
                    .iter()
                    .map(|node| meta::NodeStatus {
                        node: Some(node.into()),
                        status: 0,
                    })
                    .collect(),
            }),
            ..Default::default()
        },
        Ok(MetaType::ListTable) => MetaResponse {
            code: MetaStatusCode::Ok as i32,
            list_table: Some(meta::ListTableInfo {
                names: state.tables.keys().cloned().collect(),
            }),
            ..Default::default()
        },
        Err(_) => error_response("unknown meta command"),
    }
}

// ---------------------------------------------------------------------------
// Data node mock
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct DataState {
    pub store: HashMap<(String, String), Vec<u8>>,
    /// Answer the next command with `Move` (stale routing), then recover.
    pub move_next: bool,
    /// Answer every command with `Error`.
    pub fail_always: bool,
    /// Close the connection after reading the next command, without replying.
    pub drop_next: bool,
}

pub struct MockDataServer {
    pub addr: Node,
    pub state: Arc<Mutex<DataState>>,
    /// Data commands received.
    pub requests: Arc<AtomicUsize>,
    /// Mget sub-requests received.
    pub mget_requests: Arc<AtomicUsize>,
    /// Connections accepted.
    pub accepted: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockDataServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = node_of(listener.local_addr()?);
        let state = Arc::new(Mutex::new(DataState::default()));
        let requests = Arc::new(AtomicUsize::new(0));
        let mget_requests = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        let conn_state = state.clone();
        let conn_requests = requests.clone();
        let conn_mgets = mget_requests.clone();
        let conn_accepted = accepted.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                conn_accepted.fetch_add(1, Ordering::SeqCst);
                let state = conn_state.clone();
                let requests = conn_requests.clone();
                let mgets = conn_mgets.clone();
                tokio::spawn(async move {
                    while let Ok(Some(request)) = read_frame::<CmdRequest>(&mut stream).await {
                        requests.fetch_add(1, Ordering::SeqCst);
                        if request.cmd_type == CmdType::Mget as i32 {
                            mgets.fetch_add(1, Ordering::SeqCst);
                        }
                        let dropped = {
                            let mut st = state.lock();
                            if st.drop_next {
                                st.drop_next = false;
                                true
                            } else {
                                false
                            }
                        };
                        if dropped {
                            break;
                        }
                        let response = handle_data(&state, request);
                        if write_frame(&mut stream, &response).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Ok(Self {
            addr,
            state,
            requests,
            mget_requests,
            accepted,
            handle,
        })
    }

    /// Stop accepting new connections. Established connections live on, so
    /// tests that need a hard failure must avoid earlier traffic to this
    /// node (nothing pooled means the next request has to dial).
    pub fn stop(&self) {
        self.handle.abort();
    }

    /// Seed a value without going through the cluster.
    pub fn insert(&self, table: &str, key: &str, value: &[u8]) {
        self.state
            .lock()
            .store
            .insert((table.to_string(), key.to_string()), value.to_vec());
    }
}

fn data_ok() -> CmdResponse {
    CmdResponse {
        code: StatusCode::Ok as i32,
        ..Default::default()
    }
}

fn data_error(code: StatusCode, msg: &str) -> CmdResponse {
    CmdResponse {
        code: code as i32,
        msg: msg.to_string(),
        ..Default::default()
    }
}

fn handle_data(state: &Mutex<DataState>, request: CmdRequest) -> CmdResponse {
    let mut state = state.lock();
    if state.move_next {
        state.move_next = false;
        return data_error(StatusCode::Move, "partition moved");
    }
    if state.fail_always {
        return data_error(StatusCode::Error, "injected failure");
    }
    match CmdType::try_from(request.cmd_type) {
        Ok(CmdType::Set) => {
            let Some(set) = request.set else {
                return data_error(StatusCode::Error, "missing set payload");
            };
            state.store.insert((set.table_name, set.key), set.value);
            data_ok()
        }
        Ok(CmdType::Get) => {
            let Some(get) = request.get else {
                return data_error(StatusCode::Error, "missing get payload");
            };
            match state.store.get(&(get.table_name, get.key)) {
                Some(value) => CmdResponse {
                    code: StatusCode::Ok as i32,
                    get: Some(data::GetResult {
                        value: value.clone(),
                    }),
                    ..Default::default()
                },
                None => data_error(StatusCode::NotFound, "key do not exist"),
            }
        }
        Ok(CmdType::Del) => {
            let Some(del) = request.del else {
                return data_error(StatusCode::Error, "missing del payload");
            };
            state.store.remove(&(del.table_name, del.key));
            data_ok()
        }
        Ok(CmdType::Mget) => {
            let Some(mget) = request.mget else {
                return data_error(StatusCode::Error, "missing mget payload");
            };
            let mut entries = Vec::new();
            for key in mget.keys {
                if let Some(value) = state.store.get(&(mget.table_name.clone(), key.clone())) {
                    entries.push(data::KvEntry {
                        key,
                        value: value.clone(),
                    });
                }
            }
            CmdResponse {
                code: StatusCode::Ok as i32,
                mget: entries,
                ..Default::default()
            }
        }
        Ok(CmdType::InfoStats) => CmdResponse {
            code: StatusCode::Ok as i32,
            info_stats: stored_tables(&state)
                .into_iter()
                .map(|table_name| data::InfoStats {
                    table_name,
                    qps: 5,
                    total_query: 10,
                })
                .collect(),
            ..Default::default()
        },
        Ok(CmdType::InfoPartition) => CmdResponse {
            code: StatusCode::Ok as i32,
            info_partition: stored_tables(&state)
                .into_iter()
                .map(|table_name| data::InfoPartition {
                    table_name,
                    sync_offset: vec![data::SyncOffset {
                        partition: 0,
                        filenum: 1,
                        offset: 42,
                    }],
                })
                .collect(),
            ..Default::default()
        },
        Ok(CmdType::InfoCapacity) => CmdResponse {
            code: StatusCode::Ok as i32,
            info_capacity: stored_tables(&state)
                .into_iter()
                .map(|table_name| data::InfoCapacity {
                    table_name,
                    used: 100,
                    remain: 900,
                })
                .collect(),
            ..Default::default()
        },
        Err(_) => data_error(StatusCode::Error, "unknown data command"),
    }
}

fn stored_tables(state: &DataState) -> BTreeSet<String> {
    state
        .store
        .keys()
        .map(|(table, _)| table.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Test choreography helpers
// ---------------------------------------------------------------------------

/// A meta server plus `data_nodes` data servers, wired together.
pub struct TestCluster {
    pub meta: MockMetaServer,
    pub data: Vec<MockDataServer>,
}

impl TestCluster {
    pub async fn start(data_nodes: usize) -> Result<Self> {
        init_tracing();
        let mut data = Vec::with_capacity(data_nodes);
        for _ in 0..data_nodes {
            data.push(MockDataServer::start().await?);
        }
        let state = Arc::new(Mutex::new(MetaState {
            data_nodes: data.iter().map(|d| d.addr.clone()).collect(),
            ..Default::default()
        }));
        let meta = MockMetaServer::start(state).await?;
        Ok(Self { meta, data })
    }

    pub fn meta_addr(&self) -> Node {
        self.meta.addr.clone()
    }

    /// Total pulls observed by the meta server.
    pub fn pull_count(&self) -> usize {
        self.meta.state.lock().pull_count
    }

    /// The mock serving `node`.
    pub fn data_server(&self, node: &Node) -> &MockDataServer {
        self.data
            .iter()
            .find(|d| &d.addr == node)
            .expect("no mock data server for node")
    }
}

/// Group `count` generated keys by the master the cluster routes them to.
pub fn keys_by_master(cluster: &Cluster, table: &str, count: usize) -> HashMap<Node, Vec<String>> {
    let mut groups: HashMap<Node, Vec<String>> = HashMap::new();
    for i in 0..count {
        let key = format!("key-{i}");
        let master = cluster
            .get_partition(table, &key)
            .expect("table not cached")
            .master;
        groups.entry(master).or_default().push(key);
    }
    groups
}
