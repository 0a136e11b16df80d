//! Key-value commands served by data nodes.

/// Command selector for [`CmdRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CmdType {
    Set = 0,
    Get = 1,
    Del = 2,
    Mget = 3,
    InfoStats = 4,
    InfoPartition = 5,
    InfoCapacity = 6,
}

/// Outcome code carried by every [`CmdResponse`].
///
/// `Move` means the node no longer masters the key's partition and the
/// client's routing is stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    NotFound = 1,
    Move = 2,
    Wait = 3,
    Error = 4,
}

/// Payload for `Set`. A negative or absent `ttl` means the key never expires.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetCmd {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(string, tag = "2")]
    pub key: String,
    #[prost(bytes = "vec", tag = "3")]
    pub value: Vec<u8>,
    #[prost(int32, optional, tag = "4")]
    pub ttl: Option<i32>,
}

/// Payload for `Get`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCmd {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(string, tag = "2")]
    pub key: String,
}

/// Payload for `Del`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DelCmd {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(string, tag = "2")]
    pub key: String,
}

/// Payload for `Mget`. All keys must route to the receiving node's
/// partitions; the dispatcher buckets keys per master before sending.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MgetCmd {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(string, repeated, tag = "2")]
    pub keys: Vec<String>,
}

/// One request to a data node. `cmd_type` selects which payload is set;
/// the info commands carry no payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CmdRequest {
    #[prost(enumeration = "CmdType", tag = "1")]
    pub cmd_type: i32,
    #[prost(message, optional, tag = "2")]
    pub set: Option<SetCmd>,
    #[prost(message, optional, tag = "3")]
    pub get: Option<GetCmd>,
    #[prost(message, optional, tag = "4")]
    pub del: Option<DelCmd>,
    #[prost(message, optional, tag = "5")]
    pub mget: Option<MgetCmd>,
}

/// Payload of a successful `Get`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResult {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
}

/// One key-value pair of an `Mget` response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KvEntry {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// Binlog replication position of one partition.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncOffset {
    #[prost(uint32, tag = "1")]
    pub partition: u32,
    #[prost(uint32, tag = "2")]
    pub filenum: u32,
    #[prost(uint64, tag = "3")]
    pub offset: u64,
}

/// Per-table query counters reported by `InfoStats`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoStats {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(uint64, tag = "2")]
    pub qps: u64,
    #[prost(uint64, tag = "3")]
    pub total_query: u64,
}

/// Per-table replication offsets reported by `InfoPartition`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoPartition {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(message, repeated, tag = "2")]
    pub sync_offset: Vec<SyncOffset>,
}

/// Per-table disk usage reported by `InfoCapacity`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoCapacity {
    #[prost(string, tag = "1")]
    pub table_name: String,
    #[prost(uint64, tag = "2")]
    pub used: u64,
    #[prost(uint64, tag = "3")]
    pub remain: u64,
}

/// One response from a data node. Non-`Ok` responses carry a server-provided
/// message in `msg`; payload fields are set per request type.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CmdResponse {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub msg: String,
    #[prost(message, optional, tag = "3")]
    pub get: Option<GetResult>,
    #[prost(message, repeated, tag = "4")]
    pub mget: Vec<KvEntry>,
    #[prost(message, repeated, tag = "5")]
    pub info_stats: Vec<InfoStats>,
    #[prost(message, repeated, tag = "6")]
    pub info_partition: Vec<InfoPartition>,
    #[prost(message, repeated, tag = "7")]
    pub info_capacity: Vec<InfoCapacity>,
}
