use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use churnbench_lib::{NodeId, Value};

/// Nodes believed to store a key's values, as of one lookup. Rebuilt on every
/// lookup, never merged across lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostingSet(BTreeSet<NodeId>);

impl HostingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.0.iter()
    }

    pub fn is_disjoint(&self, other: &HostingSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn to_vec(&self) -> Vec<NodeId> {
        self.0.iter().cloned().collect()
    }

    /// `self − before`: nodes hosting now that were not hosting then.
    pub fn newly_hosting(&self, before: &HostingSet) -> HostingSet {
        HostingSet(self.0.difference(&before.0).cloned().collect())
    }
}

impl FromIterator<NodeId> for HostingSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        HostingSet(iter.into_iter().collect())
    }
}

impl Extend<NodeId> for HostingSet {
    fn extend<I: IntoIterator<Item = NodeId>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl<'a> IntoIterator for &'a HostingSet {
    type Item = &'a NodeId;
    type IntoIter = std::collections::btree_set::Iter<'a, NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Values were found on nodes that did not host them before.
    Migrated,
    /// Values were found, but only on nodes already known to host them.
    Stationary,
    /// No value could be fetched at all.
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub expected: usize,
    pub observed: usize,
    /// Cardinality check only: as many values came back as were stored.
    pub transfer_complete: bool,
    pub new_nodes: HostingSet,
    pub outcome: Outcome,
}

impl Verdict {
    pub fn persisted(&self) -> bool {
        self.outcome == Outcome::Migrated
    }
}

/// Draws a persistence verdict from two hosting snapshots around a
/// disruption. Never retries; the scenario decides whether to run again.
pub struct PersistenceVerifier;

impl PersistenceVerifier {
    pub fn verify(
        expected: &[Value],
        observed: &[Value],
        before: &HostingSet,
        after: &HostingSet,
    ) -> Verdict {
        let transfer_complete = observed.len() == expected.len();
        if transfer_complete {
            info!("[GET]: All values successfully persisted.");
        } else {
            warn!(
                "[GET]: Only {} on {} values persisted.",
                observed.len(),
                expected.len()
            );
        }

        let new_nodes = after.newly_hosting(before);
        let outcome = if observed.is_empty() {
            warn!("[GET]: No value could be fetched after the disruption.");
            Outcome::Lost
        } else if new_nodes.is_empty() {
            warn!("Values didn't reach new hosting nodes after shutdown.");
            Outcome::Stationary
        } else {
            info!("Values are newly found on:");
            for node in &new_nodes {
                info!("{}", node);
            }
            Outcome::Migrated
        };

        Verdict {
            expected: expected.len(),
            observed: observed.len(),
            transfer_complete,
            new_nodes,
            outcome,
        }
    }
}
