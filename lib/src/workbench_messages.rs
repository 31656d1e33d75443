use serde::{Deserialize, Serialize};

use crate::hash::{InfoHash, NodeId, Value};

/// What a node-process should do with the nodes named in a `NodesRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodesRequestKind {
    // Graceful shutdown: the node hands its storage off before leaving
    ShutdownNode,
    // Abrupt removal, no hand-off
    RemoveNode,
}

/// A node that answered a lookup, with its expiry as seen by the asking peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondingNode {
    pub id: NodeId,
    pub expired: bool,
}

impl RespondingNode {
    pub fn new(id: NodeId, expired: bool) -> Self {
        Self { id, expired }
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkbenchMessage {
    // Ask for the shape of the running cluster
    Topology,
    // Response to Topology
    TopologyInfo {
        local_nodes: usize,
        node_num: usize,
        processes: usize,
    },
    // Grow or shrink the bootstrap-local node set
    Resize {
        count: usize,
    },
    // Identity of local node `slot`
    NodeInfo {
        slot: usize,
    },
    // Response to NodeInfo and SpawnNode
    NodeInfoReply {
        slot: usize,
        id: NodeId,
    },
    // Store a value through local node `slot`
    Put {
        slot: usize,
        key: InfoHash,
        value: Value,
    },
    // Response to Put
    PutDone {
        ok: bool,
        nodes: Vec<NodeId>,
    },
    // Exhaustive lookup through local node `slot`
    Get {
        slot: usize,
        key: InfoHash,
    },
    // Response to Get
    GetDone {
        ok: bool,
        values: Vec<Value>,
        nodes: Vec<RespondingNode>,
    },
    // Kill node-process `process`
    StopProcess {
        process: usize,
    },
    // Restart node-process `process` with fresh identities
    StartProcess {
        process: usize,
    },
    // Graceful shutdown of every node in `process`
    Shutdown {
        process: usize,
    },
    // Shut down or remove the named nodes if `process` runs them
    NodesRequest {
        process: usize,
        kind: NodesRequestKind,
        ids: Vec<NodeId>,
    },
    // Per message-type counters of `process`
    GetMessageStats {
        process: usize,
    },
    // Response to GetMessageStats
    MessageStats {
        counts: Vec<u64>,
    },
    // Run an extra local node with a chosen id
    SpawnNode {
        id: InfoHash,
    },
    // Have `process` log the storage of the named nodes
    DumpStorage {
        process: usize,
        ids: Vec<NodeId>,
    },
    Ack,
    Error {
        message: String,
    },
}
