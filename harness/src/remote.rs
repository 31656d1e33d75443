//! A cluster driven through a workbench agent over TCP.
//!
//! The agent owns the node-processes and the bootstrap-local nodes; every
//! controller call is one request/response exchange. Control calls block the
//! driver thread on the runtime, peer operations are spawned onto it so their
//! callbacks fire from runtime worker threads.

use async_trait::async_trait;
use log::{debug, error, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::time::timeout;

use churnbench_lib::stats::MessageStats;
use churnbench_lib::workbench_messages::WorkbenchMessage;
use churnbench_lib::{InfoHash, NodeId, Value};

use crate::cluster::{ClusterController, ClusterError, NodesRequestKind};
use crate::peer::{DhtPeer, GetDoneCallback, PutDoneCallback, ValueCallback};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkbenchClient: Send + Sync + 'static {
    async fn call(
        &self,
        message: WorkbenchMessage,
    ) -> Result<WorkbenchMessage, Box<dyn std::error::Error + Send + Sync>>;
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How a request may be sent without changing what the agent does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Read-only control queries: bounded wait, retried on failure.
    Retry,
    /// State-changing control requests: bounded wait, sent once.
    Once,
    /// DHT operations: sent once and awaited until the agent answers or
    /// drops the connection.
    Unbounded,
}

impl Delivery {
    fn of(message: &WorkbenchMessage) -> Self {
        match message {
            WorkbenchMessage::Topology
            | WorkbenchMessage::NodeInfo { .. }
            | WorkbenchMessage::GetMessageStats { .. } => Delivery::Retry,
            WorkbenchMessage::Put { .. } | WorkbenchMessage::Get { .. } => Delivery::Unbounded,
            _ => Delivery::Once,
        }
    }
}

pub struct TcpWorkbenchClient {
    address: String,
    // Control replies wait on process start/stop, not just a socket.
    read_timeout: Duration,
}

impl TcpWorkbenchClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            read_timeout: DEFAULT_TIMEOUT * 12,
        }
    }

    async fn call_with_retry(
        &self,
        message: WorkbenchMessage,
    ) -> Result<WorkbenchMessage, Box<dyn std::error::Error + Send + Sync>> {
        let mut delay = INITIAL_RETRY_DELAY;
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!(
                    "Retrying workbench call to {} (attempt {}/{})",
                    self.address,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }

            match self.call_once(&message, Some(self.read_timeout)).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("Workbench call to {} failed: {}", self.address, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| "Unknown error".into()))
    }

    async fn call_once(
        &self,
        message: &WorkbenchMessage,
        read_timeout: Option<Duration>,
    ) -> Result<WorkbenchMessage, Box<dyn std::error::Error + Send + Sync>> {
        let mut stream = match timeout(DEFAULT_TIMEOUT, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", self.address, e);
                return Err(Box::new(e));
            }
            Err(_) => {
                error!(
                    "Connection to {} timed out after {:?}",
                    self.address, DEFAULT_TIMEOUT
                );
                return Err("Connection timeout".into());
            }
        };

        let encoded = bincode::serialize(message)?;
        debug!("Sending message to {}: {:?}", self.address, message);

        match timeout(DEFAULT_TIMEOUT, stream.write_all(&encoded)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(Box::new(e)),
            Err(_) => return Err("Write timeout".into()),
        }

        // The agent reads a request to EOF before answering.
        match timeout(Duration::from_secs(1), stream.shutdown()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Shutdown error (non-critical): {}", e),
            Err(_) => debug!("Shutdown timed out (non-critical)"),
        }

        let mut buffer = Vec::new();
        match read_timeout {
            Some(limit) => match timeout(limit, stream.read_to_end(&mut buffer)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(Box::new(e)),
                Err(_) => return Err("Read timeout".into()),
            },
            None => {
                stream.read_to_end(&mut buffer).await?;
            }
        }
        if buffer.is_empty() {
            return Err("Connection closed without a reply".into());
        }

        let response = bincode::deserialize(&buffer)?;
        debug!("Received response from {}: {:?}", self.address, response);
        Ok(response)
    }
}

#[async_trait]
impl WorkbenchClient for TcpWorkbenchClient {
    async fn call(
        &self,
        message: WorkbenchMessage,
    ) -> Result<WorkbenchMessage, Box<dyn std::error::Error + Send + Sync>> {
        match Delivery::of(&message) {
            Delivery::Retry => self.call_with_retry(message).await,
            Delivery::Once => self.call_once(&message, Some(self.read_timeout)).await,
            Delivery::Unbounded => self.call_once(&message, None).await,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Topology {
    local_nodes: usize,
    node_num: usize,
    processes: usize,
}

pub struct RemoteCluster<C: WorkbenchClient> {
    client: Arc<C>,
    handle: Handle,
    topology: Mutex<Topology>,
}

impl<C: WorkbenchClient> RemoteCluster<C> {
    /// Fetches the cluster's shape. Must not be called from inside the
    /// runtime behind `handle`.
    pub fn connect(client: C, handle: Handle) -> Result<Self, ClusterError> {
        let cluster = Self {
            client: Arc::new(client),
            handle,
            topology: Mutex::new(Topology::default()),
        };
        cluster.refresh_topology()?;
        Ok(cluster)
    }

    fn request(&self, message: WorkbenchMessage) -> Result<WorkbenchMessage, ClusterError> {
        let client = self.client.clone();
        match self.handle.block_on(async move { client.call(message).await }) {
            Ok(WorkbenchMessage::Error { message }) => Err(ClusterError::Remote(message)),
            Ok(reply) => Ok(reply),
            Err(e) => Err(ClusterError::Transport(e.to_string())),
        }
    }

    fn request_ack(&self, message: WorkbenchMessage) -> Result<(), ClusterError> {
        match self.request(message)? {
            WorkbenchMessage::Ack => Ok(()),
            other => Err(ClusterError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    fn topology(&self) -> Topology {
        *self.topology.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh_topology(&self) -> Result<(), ClusterError> {
        match self.request(WorkbenchMessage::Topology)? {
            WorkbenchMessage::TopologyInfo {
                local_nodes,
                node_num,
                processes,
            } => {
                debug!(
                    "topology: {} local nodes, {} nodes over {} processes",
                    local_nodes, node_num, processes
                );
                *self.topology.lock().unwrap_or_else(PoisonError::into_inner) = Topology {
                    local_nodes,
                    node_num,
                    processes,
                };
                Ok(())
            }
            other => Err(ClusterError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    fn check_process(&self, process: usize) -> Result<(), ClusterError> {
        let count = self.topology().processes;
        if process < count {
            Ok(())
        } else {
            Err(ClusterError::NoSuchProcess { process, count })
        }
    }

    fn peer(&self, slot: usize, id: NodeId) -> Arc<dyn DhtPeer> {
        Arc::new(RemotePeer {
            client: self.client.clone(),
            handle: self.handle.clone(),
            slot,
            id,
        })
    }
}

impl<C: WorkbenchClient> ClusterController for RemoteCluster<C> {
    fn resize(&self, n: usize) -> Result<(), ClusterError> {
        self.request_ack(WorkbenchMessage::Resize { count: n })?;
        self.refresh_topology()
    }

    fn size(&self) -> usize {
        self.topology().local_nodes
    }

    fn get(&self, slot: usize) -> Result<Arc<dyn DhtPeer>, ClusterError> {
        let size = self.size();
        if slot >= size {
            return Err(ClusterError::NoSuchNode { slot, size });
        }
        match self.request(WorkbenchMessage::NodeInfo { slot })? {
            WorkbenchMessage::NodeInfoReply { slot, id } => Ok(self.peer(slot, id)),
            other => Err(ClusterError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    fn node_num(&self) -> usize {
        self.topology().node_num
    }

    fn process_count(&self) -> usize {
        self.topology().processes
    }

    fn stop_process(&self, process: usize) -> Result<(), ClusterError> {
        self.check_process(process)?;
        self.request_ack(WorkbenchMessage::StopProcess { process })?;
        self.refresh_topology()
    }

    fn start_process(&self, process: usize) -> Result<(), ClusterError> {
        self.check_process(process)?;
        self.request_ack(WorkbenchMessage::StartProcess { process })?;
        self.refresh_topology()
    }

    fn send_shutdown(&self, process: usize) -> Result<(), ClusterError> {
        self.check_process(process)?;
        self.request_ack(WorkbenchMessage::Shutdown { process })
    }

    fn send_nodes_request(
        &self,
        process: usize,
        kind: NodesRequestKind,
        ids: &[NodeId],
    ) -> Result<(), ClusterError> {
        self.check_process(process)?;
        self.request_ack(WorkbenchMessage::NodesRequest {
            process,
            kind,
            ids: ids.to_vec(),
        })
    }

    fn send_get_message_stats(&self, process: usize) -> Result<MessageStats, ClusterError> {
        self.check_process(process)?;
        match self.request(WorkbenchMessage::GetMessageStats { process })? {
            WorkbenchMessage::MessageStats { counts } => Ok(MessageStats::new(counts)),
            other => Err(ClusterError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    fn spawn_node_with_id(&self, id: InfoHash) -> Result<Arc<dyn DhtPeer>, ClusterError> {
        match self.request(WorkbenchMessage::SpawnNode { id })? {
            WorkbenchMessage::NodeInfoReply { slot, id } => Ok(self.peer(slot, id)),
            other => Err(ClusterError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    fn send_dump_storage(&self, process: usize, ids: &[NodeId]) -> Result<(), ClusterError> {
        self.check_process(process)?;
        self.request_ack(WorkbenchMessage::DumpStorage {
            process,
            ids: ids.to_vec(),
        })
    }
}

/// A node living on the workbench, addressed by its slot.
pub struct RemotePeer<C: WorkbenchClient> {
    client: Arc<C>,
    handle: Handle,
    slot: usize,
    id: NodeId,
}

impl<C: WorkbenchClient> DhtPeer for RemotePeer<C> {
    fn id(&self) -> NodeId {
        self.id.clone()
    }

    fn put(&self, key: &InfoHash, value: Value, on_done: PutDoneCallback) {
        let client = self.client.clone();
        let message = WorkbenchMessage::Put {
            slot: self.slot,
            key: *key,
            value,
        };
        self.handle.spawn(async move {
            match client.call(message).await {
                Ok(WorkbenchMessage::PutDone { ok, nodes }) => on_done(ok, nodes),
                Ok(other) => {
                    warn!("[PUT]: unexpected reply {:?}", other);
                    on_done(false, Vec::new());
                }
                Err(e) => {
                    warn!("[PUT]: {}", e);
                    on_done(false, Vec::new());
                }
            }
        });
    }

    fn get(&self, key: &InfoHash, on_value: ValueCallback, on_done: GetDoneCallback) {
        let client = self.client.clone();
        let message = WorkbenchMessage::Get {
            slot: self.slot,
            key: *key,
        };
        self.handle.spawn(async move {
            match client.call(message).await {
                Ok(WorkbenchMessage::GetDone { ok, values, nodes }) => {
                    for value in &values {
                        if !on_value(value) {
                            break;
                        }
                    }
                    on_done(ok, nodes);
                }
                Ok(other) => {
                    warn!("[GET]: unexpected reply {:?}", other);
                    on_done(false, Vec::new());
                }
                Err(e) => {
                    warn!("[GET]: {}", e);
                    on_done(false, Vec::new());
                }
            }
        });
    }
}
