//! One framed RPC channel to a single endpoint.
//!
//! Wire format: a 4-byte big-endian body length, then one protobuf message.
//! The same framing is used for both the meta and data planes.

use std::time::{Duration, Instant};

use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::node::Node;

/// Frames above this size are rejected as corrupt length headers.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// A live channel to `endpoint`, owned exclusively by one in-flight RPC.
#[derive(Debug)]
pub struct Connection {
    endpoint: Node,
    stream: TcpStream,
    last_used: Instant,
}

impl Connection {
    /// Open a channel to `endpoint`, bounded by `connect_timeout`.
    pub async fn connect(endpoint: &Node, connect_timeout: Duration) -> Result<Self> {
        let addr = format!("{}:{}", endpoint.ip, endpoint.port);
        let stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Io(format!("timeout connecting to {endpoint}")))?
            .map_err(|e| Error::Io(format!("connect {endpoint}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            endpoint: endpoint.clone(),
            stream,
            last_used: Instant::now(),
        })
    }

    pub fn endpoint(&self) -> &Node {
        &self.endpoint
    }

    /// How long this channel has been idle.
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Send one request and receive its response, bounded by `rpc_timeout`.
    ///
    /// Any error leaves the stream in an unknown state; the caller must drop
    /// the connection instead of returning it to a pool.
    pub async fn call<Req, Resp>(&mut self, request: &Req, rpc_timeout: Duration) -> Result<Resp>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let endpoint = self.endpoint.clone();
        timeout(rpc_timeout, async {
            self.send(request).await?;
            self.recv().await
        })
        .await
        .map_err(|_| Error::Io(format!("timeout talking to {endpoint}")))?
    }

    /// Write one framed message.
    pub async fn send<M: Message>(&mut self, message: &M) -> Result<()> {
        let body = message.encode_to_vec();
        self.stream.write_u32(body.len() as u32).await?;
        self.stream.write_all(&body).await?;
        self.stream.flush().await?;
        self.last_used = Instant::now();
        Ok(())
    }

    /// Read one framed message.
    pub async fn recv<M: Message + Default>(&mut self) -> Result<M> {
        let len = self.stream.read_u32().await?;
        if len > MAX_FRAME_BYTES {
            return Err(Error::Corruption(format!(
                "oversized frame ({len} bytes) from {}",
                self.endpoint
            )));
        }
        let mut body = vec![0u8; len as usize];
        self.stream.read_exact(&mut body).await?;
        self.last_used = Instant::now();
        Ok(M::decode(body.as_slice())?)
    }
}
