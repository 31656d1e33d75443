//! Disruptive cluster events run between two observations of a key.

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use churnbench_lib::{offset_hash, InfoHash, NodeId};

use crate::cluster::{ClusterController, ClusterError, NodesRequestKind};
use crate::error::ScenarioError;
use crate::peer::DhtPeer;
use crate::timer::{TimerOutcome, Timers};
use crate::verifier::HostingSet;

/// Operation volume seen across the cluster during one disruption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChurnReport {
    pub total_ops: u64,
    pub ops_per_node: f64,
}

pub struct ChurnSimulator<'a> {
    cluster: &'a dyn ClusterController,
    timers: Timers,
    settle_delay: Duration,
    track_ops: bool,
}

impl<'a> ChurnSimulator<'a> {
    pub fn new(
        cluster: &'a dyn ClusterController,
        timers: Timers,
        settle_delay: Duration,
        track_ops: bool,
    ) -> Self {
        Self {
            cluster,
            timers,
            settle_delay,
            track_ops,
        }
    }

    /// One targeted-shutdown round per 32 nodes, at least one.
    pub fn shutdown_rounds(node_num: usize) -> usize {
        (node_num / 32).max(1)
    }

    /// Gracefully shuts down every node in `hosting`, letting the cluster
    /// settle after each process has been told.
    pub fn targeted_shutdown(&self, hosting: &HostingSet) -> Result<ChurnReport, ScenarioError> {
        info!("Removing all nodes hosting target values...");
        let ids = hosting.to_vec();
        // Cluster size as of the round's start, whatever the controller
        // reports once nodes begin leaving.
        let node_num = self.cluster.node_num().max(1);
        let mut total_ops = 0;

        for process in 0..self.cluster.process_count() {
            info!("[REMOVE]: sending shutdown request to process {}", process);
            self.cluster
                .send_nodes_request(process, NodesRequestKind::ShutdownNode, &ids)?;
            if self.track_ops {
                debug!("sending message stats request");
                total_ops += self.cluster.send_get_message_stats(process)?.operations();
            }
            self.sleep("settle after shutdown", self.settle_delay)?;
        }

        let ops_per_node = total_ops as f64 / node_num as f64;
        Ok(ChurnReport {
            total_ops,
            ops_per_node,
        })
    }

    /// Sends a nodes request to every process without waiting for the
    /// cluster to settle.
    pub fn request_nodes(&self, kind: NodesRequestKind, ids: &[NodeId]) -> Result<(), ScenarioError> {
        for process in 0..self.cluster.process_count() {
            info!("[REMOVE]: sending {:?} request to process {}", kind, process);
            self.cluster.send_nodes_request(process, kind, ids)?;
        }
        Ok(())
    }

    /// Abruptly removes the named nodes, with no storage hand-off.
    pub fn remove_nodes(&self, ids: &[NodeId]) -> Result<(), ScenarioError> {
        self.request_nodes(NodesRequestKind::RemoveNode, ids)
    }

    /// Shuts down a uniformly random process and restarts it with fresh
    /// identities, `rounds` times. Returns the replaced process indices.
    pub fn replace_processes(&self, rounds: usize) -> Result<Vec<usize>, ScenarioError> {
        let count = self.cluster.process_count();
        if count == 0 {
            return Err(ClusterError::NoProcesses.into());
        }

        let mut replaced = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            let process = rand::thread_rng().gen_range(0..count);
            info!("[REPLACE]: replacing process {}", process);
            self.cluster.send_shutdown(process)?;
            self.cluster.stop_process(process)?;
            self.cluster.start_process(process)?;
            replaced.push(process);
        }
        Ok(replaced)
    }

    /// Starts `2 * radius + 1` nodes with ids `key - radius ..= key + radius`
    /// so the key's neighbourhood is populated with listening peers.
    pub fn create_nodes_around(
        &self,
        key: &InfoHash,
        radius: u16,
    ) -> Result<Vec<Arc<dyn DhtPeer>>, ScenarioError> {
        let radius = i64::from(radius);
        let mut nodes = Vec::new();
        for delta in -radius..=radius {
            let id = offset_hash(key, delta);
            debug!("Spawning neighbour {} of {}", id, key);
            nodes.push(self.cluster.spawn_node_with_id(id)?);
        }
        Ok(nodes)
    }

    /// Populates every key's neighbourhood, then waits for the DHT's own
    /// storage maintenance. The returned handles must outlive the wait.
    pub fn storage_maintenance_wait(
        &self,
        keys: &[InfoHash],
        radius: u16,
        wait: Duration,
    ) -> Result<Vec<Arc<dyn DhtPeer>>, ScenarioError> {
        info!(
            "Creating {} nodes around each of {} keys...",
            2 * usize::from(radius) + 1,
            keys.len()
        );
        let mut flood = Vec::new();
        for key in keys {
            flood.extend(self.create_nodes_around(key, radius)?);
        }

        info!("Waiting for normal storage maintenance.");
        self.sleep("storage maintenance", wait)?;
        Ok(flood)
    }

    pub fn sleep(&self, name: &'static str, nominal: Duration) -> Result<(), ScenarioError> {
        match self.timers.sleep(name, nominal) {
            TimerOutcome::Elapsed => Ok(()),
            TimerOutcome::Cancelled => Err(ScenarioError::Cancelled(name)),
        }
    }
}
