//! Issues puts and gets against a peer and turns their callbacks into
//! synchronous rounds for the scenario driver.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use churnbench_lib::{InfoHash, NodeId, Value};

use crate::gate::CompletionGate;
use crate::peer::{DhtPeer, RespondingNode, ValueCallback};
use crate::verifier::HostingSet;

/// Round-scoped accumulators, only touched under the gate's lock.
#[derive(Debug, Default)]
struct Accumulators {
    values: Vec<Value>,
    hosting: HostingSet,
    lookup_ok: bool,
    stored: usize,
    failed: usize,
}

/// Result of one completed lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub ok: bool,
    pub values: Vec<Value>,
    pub hosting: HostingSet,
}

impl Observation {
    /// Logs how many of `expected` values came back; true if all of them did.
    pub fn log_transfer(&self, expected: usize) -> bool {
        if self.values.len() == expected {
            return true;
        }
        if self.values.is_empty() {
            warn!("[GET]: 0 values successfully put");
        } else {
            warn!(
                "[GET]: Only {} on {} values successfully put.",
                self.values.len(),
                expected
            );
        }
        false
    }

    pub fn log_hosting(&self) {
        info!("Values are found on:");
        for node in &self.hosting {
            info!("{}", node);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutReport {
    pub stored: usize,
    pub failed: usize,
}

/// Per-scenario synchronization context. Nothing is shared between two
/// coordinators, so scenarios can run side by side.
#[derive(Debug, Default)]
pub struct OperationCoordinator {
    sync: Arc<CompletionGate<Accumulators>>,
}

impl OperationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores every value under `key`, one round per value so the logged
    /// order matches the issue order. A failed put does not stop the batch.
    pub fn put(&self, peer: &dyn DhtPeer, key: &InfoHash, values: &[Value]) -> PutReport {
        self.sync.update(|acc| *acc = Accumulators::default());

        for value in values {
            info!("[PUT]: {:?}", value);
            let round = self.sync.begin(1);
            let sync = self.sync.clone();
            peer.put(
                key,
                value.clone(),
                Box::new(move |ok: bool, nodes: Vec<NodeId>| {
                    if ok {
                        debug!("[PUT]: acknowledged by {} nodes", nodes.len());
                    } else {
                        warn!("[PUT]: failed!");
                    }
                    sync.complete(round, |acc| {
                        if ok {
                            acc.stored += 1;
                        } else {
                            acc.failed += 1;
                        }
                    });
                }),
            );
            self.sync.wait();
        }

        let acc = self.sync.take();
        PutReport {
            stored: acc.stored,
            failed: acc.failed,
        }
    }

    /// Exhaustive lookup of `key`. The returned observation reflects exactly
    /// this lookup: accumulators are reset first and only read once the
    /// lookup has completed.
    pub fn get(&self, peer: &dyn DhtPeer, key: &InfoHash) -> Observation {
        self.sync.update(|acc| *acc = Accumulators::default());
        let round = self.sync.begin(1);

        let on_value: ValueCallback = {
            let sync = self.sync.clone();
            Arc::new(move |value: &Value| {
                debug!("[GET]: {:?}", value);
                sync.record(round, |acc| acc.values.push(value.clone()));
                // Keep searching: every replica is of interest, not just the first.
                true
            })
        };

        let sync = self.sync.clone();
        let on_done = Box::new(move |ok: bool, nodes: Vec<RespondingNode>| {
            sync.complete(round, |acc| {
                if !ok {
                    warn!("[GET]: failed!");
                    return;
                }
                acc.lookup_ok = true;
                acc.hosting.extend(
                    nodes
                        .into_iter()
                        .filter(|node| !node.is_expired())
                        .map(|node| node.id),
                );
            });
        });

        peer.get(key, on_value, on_done);
        self.sync.wait();

        let acc = self.sync.take();
        Observation {
            ok: acc.lookup_ok,
            values: acc.values,
            hosting: acc.hosting,
        }
    }
}
