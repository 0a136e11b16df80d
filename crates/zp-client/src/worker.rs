//! Per-master fan-out workers.
//!
//! Each distinct master node gets one long-lived worker task, spawned on
//! first use. A worker drains its queue in FIFO order, so sub-requests to
//! the same master never reorder, and in-flight concurrency per backend
//! shard stays bounded at one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use zp_proto::data::{CmdRequest, CmdResponse};

use crate::cluster::ClusterCore;
use crate::error::Result;
use crate::node::Node;

/// One queued sub-request. `done` is signaled exactly once by the worker
/// that executes the task.
pub(crate) struct CmdTask {
    pub table: String,
    /// Representative key, used for routing retries.
    pub key: String,
    pub request: CmdRequest,
    pub done: oneshot::Sender<Result<CmdResponse>>,
}

#[derive(Debug)]
struct CmdWorker {
    tx: mpsc::UnboundedSender<CmdTask>,
    handle: JoinHandle<()>,
}

/// Registry of per-master workers. Workers outlive individual requests and
/// are only torn down with the cluster.
#[derive(Default, Debug)]
pub(crate) struct WorkerRegistry {
    workers: Mutex<HashMap<Node, CmdWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` on `master`'s worker, spawning the worker on first use.
    pub fn submit(&self, master: Node, task: CmdTask, core: Arc<ClusterCore>) {
        let mut workers = self.workers.lock();
        let worker = workers
            .entry(master.clone())
            .or_insert_with(|| spawn_worker(master, core));
        // Sending only fails after shutdown; the dropped `done` sender then
        // surfaces as an incomplete sub-request at the join point.
        let _ = worker.tx.send(task);
    }

    /// Drain all queues and join the workers.
    pub async fn shutdown(&self) {
        let drained: Vec<CmdWorker> = self
            .workers
            .lock()
            .drain()
            .map(|(_, worker)| worker)
            .collect();
        for CmdWorker { tx, handle } in drained {
            drop(tx);
            let _ = handle.await;
        }
    }
}

fn spawn_worker(master: Node, core: Arc<ClusterCore>) -> CmdWorker {
    let (tx, mut rx) = mpsc::unbounded_channel::<CmdTask>();
    let handle = tokio::spawn(async move {
        debug!(%master, "command worker started");
        while let Some(task) = rx.recv().await {
            let CmdTask {
                table,
                key,
                request,
                done,
            } = task;
            let result = core.submit_data_cmd(&table, &key, request).await;
            let _ = done.send(result);
        }
        debug!(%master, "command worker stopped");
    });
    CmdWorker { tx, handle }
}
