use churnbench_lib::workbench_messages::RespondingNode;
use churnbench_lib::{xor_distance, InfoHash, NodeId, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Indices into a process's message counters. Pings are not operations.
pub const PING: usize = 0;
pub const FIND: usize = 1;
pub const GET: usize = 2;
pub const PUT: usize = 3;
pub const MESSAGE_TYPES: usize = 4;

/// Who runs a simulated node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Bootstrap-local node the harness talks through
    Local,
    /// Node of node-process `n`
    Process(usize),
    /// Extra node started with a chosen id
    Spawned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Running,
    /// Left gracefully; nobody routes to it any more
    Departed,
    /// Vanished without notice; still listed by others, answers nothing
    Stale,
}

#[derive(Debug)]
struct SimNode {
    owner: Owner,
    /// Client-mode nodes search and store through the network but hold no storage
    client_mode: bool,
    state: NodeState,
    storage: HashMap<InfoHash, Vec<Value>>,
}

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<InfoHash, SimNode>,
    counters: HashMap<usize, Vec<u64>>,
}

impl NetworkState {
    fn count(&mut self, id: &InfoHash, message: usize) {
        let Some(Owner::Process(process)) = self.nodes.get(id).map(|n| n.owner) else {
            return;
        };
        let counters = self
            .counters
            .entry(process)
            .or_insert_with(|| vec![0; MESSAGE_TYPES]);
        if let Some(counter) = counters.get_mut(message) {
            *counter += 1;
        }
    }

    fn is_running(&self, id: &InfoHash) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| n.state == NodeState::Running)
    }

    /// The `count` storage nodes closest to `key`, optionally including
    /// nodes that vanished without notice.
    fn closest(&self, key: &InfoHash, count: usize, include_stale: bool) -> Vec<InfoHash> {
        let mut candidates: Vec<InfoHash> = self
            .nodes
            .iter()
            .filter(|(_, n)| !n.client_mode)
            .filter(|(_, n)| {
                n.state == NodeState::Running || (include_stale && n.state == NodeState::Stale)
            })
            .map(|(id, _)| *id)
            .collect();
        candidates.sort_by_key(|id| xor_distance(id, key));
        candidates.truncate(count);
        candidates
    }

    /// Stores `values` on the `replication` closest running nodes that miss
    /// them. Returns the nodes that now hold them.
    fn replicate(&mut self, key: &InfoHash, values: &[Value], replication: usize) -> Vec<InfoHash> {
        let targets = self.closest(key, replication, false);
        for target in &targets {
            let mut stored = false;
            if let Some(node) = self.nodes.get_mut(target) {
                let slot = node.storage.entry(*key).or_default();
                for value in values {
                    if !slot.contains(value) {
                        slot.push(value.clone());
                        stored = true;
                    }
                }
            }
            if stored {
                self.count(target, PUT);
            }
        }
        targets
    }
}

struct DeliveryController {
    latency: Duration,
    /// Drop rate for operations (0.0 to 1.0)
    drop_rate: f64,
}

impl Default for DeliveryController {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(1),
            drop_rate: 0.0,
        }
    }
}

/// In-process model of a DHT: XOR-closest replication, graceful hand-off on
/// shutdown, periodic storage maintenance and per-process message counters.
#[derive(Clone)]
pub struct NetworkSimulator {
    state: Arc<Mutex<NetworkState>>,
    delivery: Arc<RwLock<DeliveryController>>,
    replication: usize,
}

impl Default for NetworkSimulator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl NetworkSimulator {
    pub fn new(replication: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState::default())),
            delivery: Arc::new(RwLock::new(DeliveryController::default())),
            replication: replication.max(1),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap()
    }

    pub fn replication(&self) -> usize {
        self.replication
    }

    /// Set simulated per-operation latency
    pub fn set_latency(&self, latency: Duration) {
        self.delivery.write().unwrap().latency = latency;
    }

    /// Set operation drop rate (0.0 = no drops, 1.0 = drop all)
    pub fn set_drop_rate(&self, drop_rate: f64) {
        self.delivery.write().unwrap().drop_rate = drop_rate.clamp(0.0, 1.0);
    }

    pub(crate) async fn delay(&self) {
        let latency = self.delivery.read().unwrap().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub(crate) fn should_drop(&self) -> bool {
        let drop_rate = self.delivery.read().unwrap().drop_rate;
        drop_rate > 0.0 && rand::random::<f64>() < drop_rate
    }

    pub fn add_node(&self, id: InfoHash, owner: Owner, client_mode: bool) {
        self.state().nodes.insert(
            id,
            SimNode {
                owner,
                client_mode,
                state: NodeState::Running,
                storage: HashMap::new(),
            },
        );
    }

    pub fn is_running(&self, id: &InfoHash) -> bool {
        self.state().is_running(id)
    }

    pub fn node_state(&self, id: &InfoHash) -> Option<NodeState> {
        self.state().nodes.get(id).map(|n| n.state)
    }

    pub fn owner(&self, id: &InfoHash) -> Option<Owner> {
        self.state().nodes.get(id).map(|n| n.owner)
    }

    /// Running nodes of `owner`
    pub fn nodes_of(&self, owner: Owner) -> Vec<InfoHash> {
        let mut nodes: Vec<InfoHash> = self
            .state()
            .nodes
            .iter()
            .filter(|(_, n)| n.owner == owner && n.state == NodeState::Running)
            .map(|(id, _)| *id)
            .collect();
        nodes.sort();
        nodes
    }

    pub fn running_count(&self) -> usize {
        self.state()
            .nodes
            .values()
            .filter(|n| n.state == NodeState::Running)
            .count()
    }

    /// Stores through `origin`. None if `origin` is not running.
    pub fn store(&self, origin: &InfoHash, key: &InfoHash, value: Value) -> Option<Vec<NodeId>> {
        let mut state = self.state();
        if !state.is_running(origin) {
            return None;
        }
        state.count(origin, FIND);
        let targets = state.replicate(key, &[value], self.replication);
        Some(targets.into_iter().map(NodeId::from).collect())
    }

    /// Exhaustive lookup through `origin`: every value held by the closest
    /// running nodes, and the nodes that claim to store `key`. Vanished
    /// nodes are reported as expired. None if `origin` is not running.
    pub fn lookup(
        &self,
        origin: &InfoHash,
        key: &InfoHash,
    ) -> Option<(Vec<Value>, Vec<RespondingNode>)> {
        let mut state = self.state();
        if !state.is_running(origin) {
            return None;
        }
        state.count(origin, FIND);

        let mut values: Vec<Value> = Vec::new();
        let mut nodes = Vec::new();
        for id in state.closest(key, self.replication, true) {
            let Some(node) = state.nodes.get(&id) else {
                continue;
            };
            let Some(stored) = node.storage.get(key) else {
                continue;
            };
            let expired = node.state == NodeState::Stale;
            if !expired {
                for value in stored {
                    if !values.contains(value) {
                        values.push(value.clone());
                    }
                }
            }
            nodes.push(RespondingNode::new(NodeId::from(id), expired));
            if !expired {
                state.count(&id, GET);
            }
        }
        Some((values, nodes))
    }

    /// Graceful shutdown: storage is handed off to the next closest
    /// running nodes before the node leaves.
    pub fn shutdown_node(&self, id: &InfoHash) -> bool {
        let mut state = self.state();
        let storage = match state.nodes.get_mut(id) {
            Some(node) if node.state == NodeState::Running => {
                node.state = NodeState::Departed;
                std::mem::take(&mut node.storage)
            }
            _ => return false,
        };
        for (key, values) in storage {
            state.replicate(&key, &values, self.replication);
        }
        true
    }

    /// Abrupt removal, no hand-off. Other nodes keep listing it until the
    /// next maintenance pass.
    pub fn remove_node(&self, id: &InfoHash) -> bool {
        let mut state = self.state();
        match state.nodes.get_mut(id) {
            Some(node) if node.state == NodeState::Running => {
                node.state = NodeState::Stale;
                true
            }
            _ => false,
        }
    }

    /// One storage maintenance pass: every stored key is brought back to its
    /// closest running nodes, and vanished nodes are forgotten.
    pub fn maintain(&self) {
        let mut state = self.state();
        let mut stored: HashMap<InfoHash, Vec<Value>> = HashMap::new();
        for node in state.nodes.values_mut() {
            if node.state == NodeState::Stale {
                node.state = NodeState::Departed;
                node.storage.clear();
                continue;
            }
            if node.state != NodeState::Running {
                continue;
            }
            for (key, values) in &node.storage {
                let slot = stored.entry(*key).or_default();
                for value in values {
                    if !slot.contains(value) {
                        slot.push(value.clone());
                    }
                }
            }
        }
        for (key, values) in stored {
            state.replicate(&key, &values, self.replication);
        }
    }

    /// Running nodes that hold `key`
    pub fn storing_nodes(&self, key: &InfoHash) -> Vec<InfoHash> {
        let mut nodes: Vec<InfoHash> = self
            .state()
            .nodes
            .iter()
            .filter(|(_, n)| n.state == NodeState::Running && n.storage.contains_key(key))
            .map(|(id, _)| *id)
            .collect();
        nodes.sort();
        nodes
    }

    pub fn counters(&self, process: usize) -> Vec<u64> {
        self.state()
            .counters
            .get(&process)
            .cloned()
            .unwrap_or_else(|| vec![0; MESSAGE_TYPES])
    }

    /// Pings exchanged by the nodes of `process`, as a keep-alive would.
    pub fn ping(&self, process: usize) {
        let nodes = self.nodes_of(Owner::Process(process));
        let mut state = self.state();
        for id in &nodes {
            state.count(id, PING);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_with(ids: &[u8]) -> NetworkSimulator {
        let network = NetworkSimulator::new(2);
        for id in ids {
            network.add_node(InfoHash::new([*id; 20]), Owner::Process(0), false);
        }
        network
    }

    #[test]
    fn test_store_picks_xor_closest() {
        let network = network_with(&[0x01, 0x02, 0x80, 0xf0]);
        let client = InfoHash::new([0xaa; 20]);
        network.add_node(client, Owner::Local, true);

        let key = InfoHash::new([0x00; 20]);
        let nodes = network.store(&client, &key, Value::from("foo")).unwrap();
        assert_eq!(
            nodes,
            vec![
                NodeId::from(InfoHash::new([0x01; 20])),
                NodeId::from(InfoHash::new([0x02; 20]))
            ]
        );
        // Client-mode nodes never store.
        assert!(!network.storing_nodes(&key).contains(&client));
    }

    #[test]
    fn test_shutdown_hands_off_but_remove_does_not() {
        let network = network_with(&[0x01, 0x02, 0x03, 0x04]);
        let key = InfoHash::new([0x00; 20]);
        let origin = InfoHash::new([0x04; 20]);
        network.store(&origin, &key, Value::from("foo")).unwrap();

        assert!(network.shutdown_node(&InfoHash::new([0x01; 20])));
        assert_eq!(
            network.storing_nodes(&key),
            vec![InfoHash::new([0x02; 20]), InfoHash::new([0x03; 20])]
        );

        assert!(network.remove_node(&InfoHash::new([0x02; 20])));
        assert_eq!(network.storing_nodes(&key), vec![InfoHash::new([0x03; 20])]);

        let (values, nodes) = network.lookup(&origin, &key).unwrap();
        assert_eq!(values, vec![Value::from("foo")]);
        assert!(nodes
            .iter()
            .any(|n| n.id == NodeId::from(InfoHash::new([0x02; 20])) && n.expired));
    }

    #[test]
    fn test_maintenance_restores_replication() {
        let network = network_with(&[0x01, 0x02, 0x03]);
        let key = InfoHash::new([0x00; 20]);
        let origin = InfoHash::new([0x03; 20]);
        network.store(&origin, &key, Value::from("foo")).unwrap();
        network.remove_node(&InfoHash::new([0x01; 20]));

        network.maintain();
        assert_eq!(
            network.storing_nodes(&key),
            vec![InfoHash::new([0x02; 20]), InfoHash::new([0x03; 20])]
        );
        assert_eq!(
            network.node_state(&InfoHash::new([0x01; 20])),
            Some(NodeState::Departed)
        );
    }

    #[test]
    fn test_counters_skip_pings_in_operation_totals() {
        let network = network_with(&[0x01, 0x02]);
        network.ping(0);
        let origin = InfoHash::new([0x01; 20]);
        network.store(&origin, &InfoHash::random(), Value::from("x")).unwrap();

        let counters = network.counters(0);
        assert_eq!(counters[PING], 2);
        assert_eq!(counters[FIND], 1);
        assert_eq!(counters[PUT], 2);
    }

    #[test]
    fn test_stopped_origin_cannot_operate() {
        let network = network_with(&[0x01]);
        let origin = InfoHash::new([0x01; 20]);
        network.remove_node(&origin);
        assert!(network.store(&origin, &InfoHash::random(), Value::from("x")).is_none());
        assert!(network.lookup(&origin, &InfoHash::random()).is_none());
    }
}
