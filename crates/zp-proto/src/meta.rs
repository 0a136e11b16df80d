//! Control-plane messages served by the meta service.

/// Command selector for [`MetaCmd`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MetaType {
    Init = 0,
    DropTable = 1,
    Pull = 2,
    SetMaster = 3,
    AddSlave = 4,
    RemoveSlave = 5,
    ListMeta = 6,
    ListNode = 7,
    ListTable = 8,
}

/// Outcome code carried by every [`MetaResponse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MetaStatusCode {
    Ok = 0,
    Error = 1,
}

/// Endpoint of a meta or data node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeAddr {
    #[prost(string, tag = "1")]
    pub ip: String,
    #[prost(uint32, tag = "2")]
    pub port: u32,
}

/// Payload for `Init`: create a table with a fixed partition count.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitCmd {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub partition_num: u32,
}

/// Payload for `DropTable`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DropTableCmd {
    #[prost(string, tag = "1")]
    pub name: String,
}

/// Payload for `Pull`: fetch the topology snapshot for one table.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PullCmd {
    #[prost(string, tag = "1")]
    pub name: String,
}

/// Shared payload for the replica-management commands
/// (`SetMaster`, `AddSlave`, `RemoveSlave`).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BasicCmd {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub partition: u32,
    #[prost(message, optional, tag = "3")]
    pub node: Option<NodeAddr>,
}

/// One request to the meta service. `cmd_type` selects which payload is set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetaCmd {
    #[prost(enumeration = "MetaType", tag = "1")]
    pub cmd_type: i32,
    #[prost(message, optional, tag = "2")]
    pub init: Option<InitCmd>,
    #[prost(message, optional, tag = "3")]
    pub drop_table: Option<DropTableCmd>,
    #[prost(message, optional, tag = "4")]
    pub pull: Option<PullCmd>,
    #[prost(message, optional, tag = "5")]
    pub set_master: Option<BasicCmd>,
    #[prost(message, optional, tag = "6")]
    pub add_slave: Option<BasicCmd>,
    #[prost(message, optional, tag = "7")]
    pub remove_slave: Option<BasicCmd>,
}

/// One partition of a pulled table: id, master and replication followers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PartitionInfo {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(message, optional, tag = "2")]
    pub master: Option<NodeAddr>,
    #[prost(message, repeated, tag = "3")]
    pub slaves: Vec<NodeAddr>,
}

/// Full topology of one table inside a pull snapshot.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub partitions: Vec<PartitionInfo>,
}

/// Payload of a successful `Pull`: topology version plus table snapshots.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PullResponse {
    #[prost(uint64, tag = "1")]
    pub version: u64,
    #[prost(message, repeated, tag = "2")]
    pub info: Vec<TableInfo>,
}

/// Payload of `ListMeta`: the meta quorum's leader and followers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetaNodes {
    #[prost(message, optional, tag = "1")]
    pub leader: Option<NodeAddr>,
    #[prost(message, repeated, tag = "2")]
    pub followers: Vec<NodeAddr>,
}

/// One data node and its liveness as tracked by the meta service.
/// `status != 0` means the node is considered down.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeStatus {
    #[prost(message, optional, tag = "1")]
    pub node: Option<NodeAddr>,
    #[prost(uint32, tag = "2")]
    pub status: u32,
}

/// Payload of `ListNode`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListNodeInfo {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<NodeStatus>,
}

/// Payload of `ListTable`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListTableInfo {
    #[prost(string, repeated, tag = "1")]
    pub names: Vec<String>,
}

/// One response from the meta service. Non-`Ok` responses carry a
/// server-provided message in `msg`; payload fields are set per request type.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetaResponse {
    #[prost(enumeration = "MetaStatusCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub msg: String,
    #[prost(message, optional, tag = "3")]
    pub pull: Option<PullResponse>,
    #[prost(message, optional, tag = "4")]
    pub list_meta: Option<MetaNodes>,
    #[prost(message, optional, tag = "5")]
    pub list_node: Option<ListNodeInfo>,
    #[prost(message, optional, tag = "6")]
    pub list_table: Option<ListTableInfo>,
}
