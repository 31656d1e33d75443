//! Cluster lifecycle as seen by the harness.
//!
//! A cluster is a bootstrap-local set of nodes the harness talks through
//! (`resize`/`get`/`front`) plus a number of node-processes, each running a
//! share of the remaining nodes. Processes are addressed by index.

use std::sync::Arc;

use churnbench_lib::stats::MessageStats;
pub use churnbench_lib::workbench_messages::NodesRequestKind;
use churnbench_lib::{InfoHash, NodeId};
use thiserror::Error;

use crate::peer::DhtPeer;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("no local node at slot {slot} (cluster has {size})")]
    NoSuchNode { slot: usize, size: usize },

    #[error("no node-process {process} (cluster has {count})")]
    NoSuchProcess { process: usize, count: usize },

    #[error("cluster has no processes to act on")]
    NoProcesses,

    #[error("workbench call failed: {0}")]
    Transport(String),

    #[error("workbench replied with an error: {0}")]
    Remote(String),

    #[error("unexpected workbench reply: {0}")]
    UnexpectedReply(String),
}

pub trait ClusterController: Send + Sync {
    /// Grows or shrinks the bootstrap-local node set to `n` nodes.
    fn resize(&self, n: usize) -> Result<(), ClusterError>;

    /// Current number of bootstrap-local nodes.
    fn size(&self) -> usize;

    fn get(&self, slot: usize) -> Result<Arc<dyn DhtPeer>, ClusterError>;

    fn front(&self) -> Result<Arc<dyn DhtPeer>, ClusterError> {
        self.get(0)
    }

    /// Total number of nodes across all processes.
    fn node_num(&self) -> usize;

    fn process_count(&self) -> usize;

    fn stop_process(&self, process: usize) -> Result<(), ClusterError>;

    /// Restarts a stopped process. Its nodes come back with fresh identities.
    fn start_process(&self, process: usize) -> Result<(), ClusterError>;

    /// Graceful shutdown of every node in `process`.
    fn send_shutdown(&self, process: usize) -> Result<(), ClusterError>;

    fn send_nodes_request(
        &self,
        process: usize,
        kind: NodesRequestKind,
        ids: &[NodeId],
    ) -> Result<(), ClusterError>;

    fn send_get_message_stats(&self, process: usize) -> Result<MessageStats, ClusterError>;

    /// Starts an extra node with a chosen id, outside of every process.
    fn spawn_node_with_id(&self, id: InfoHash) -> Result<Arc<dyn DhtPeer>, ClusterError>;

    fn send_dump_storage(&self, process: usize, ids: &[NodeId]) -> Result<(), ClusterError>;
}
