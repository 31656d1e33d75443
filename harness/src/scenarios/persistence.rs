use log::{info, warn};

use churnbench_lib::{InfoHash, Value};

use crate::churn::ChurnSimulator;
use crate::cluster::ClusterController;
use crate::config::ScenarioOptions;
use crate::coordinator::OperationCoordinator;
use crate::error::ScenarioError;
use crate::peer::DhtPeer;
use crate::timer::Timers;
use crate::verifier::{HostingSet, PersistenceVerifier, Verdict};

use super::{conclude, sample_values, PersistenceKind, RoundReport, Scenario, ScenarioReport};

/// Checks whether values stored in the DHT survive the loss of the nodes
/// hosting them.
pub struct PersistenceTest<'a> {
    kind: PersistenceKind,
    cluster: &'a dyn ClusterController,
    options: ScenarioOptions,
    timers: Timers,
    coordinator: OperationCoordinator,
}

impl<'a> PersistenceTest<'a> {
    pub fn new(
        kind: PersistenceKind,
        cluster: &'a dyn ClusterController,
        options: ScenarioOptions,
        timers: Timers,
    ) -> Self {
        Self {
            kind,
            cluster,
            options,
            timers,
            coordinator: OperationCoordinator::new(),
        }
    }

    pub fn run(&self) -> ScenarioReport {
        let mut report = ScenarioReport::new(Scenario::Persistence(self.kind));
        let result = match self.kind {
            PersistenceKind::Delete => self.delete_test(&mut report),
            PersistenceKind::Replace => self.replace_cluster_test(&mut report),
            PersistenceKind::MultTime => self.mult_time_test(&mut report),
        };
        conclude(self.cluster, &mut report, result);
        report
    }

    fn churn(&self) -> ChurnSimulator<'a> {
        ChurnSimulator::new(
            self.cluster,
            self.timers.clone(),
            self.options.settle_delay,
            self.options.track_ops,
        )
    }

    fn verdict(
        &self,
        expected: &[Value],
        observed: &[Value],
        before: &HostingSet,
        after: &HostingSet,
    ) -> Result<Verdict, ScenarioError> {
        let verdict = PersistenceVerifier::verify(expected, observed, before, after);
        if self.options.dump_storage && verdict.persisted() {
            info!("Dumping all storage log from hosting nodes.");
            let ids = after.to_vec();
            for process in 0..self.cluster.process_count() {
                self.cluster.send_dump_storage(process, &ids)?;
            }
        }
        Ok(verdict)
    }

    /// Gracefully shuts down the nodes hosting a key, one round per 32
    /// nodes, each round aiming at wherever the values moved to.
    fn delete_test(&self, report: &mut ScenarioReport) -> Result<(), ScenarioError> {
        self.cluster.resize(3)?;
        let consumer = self.cluster.get(1)?;
        let producer = self.cluster.get(2)?;

        let key = InfoHash::random();
        let values = sample_values();
        report.keys.push(key);

        self.coordinator.put(producer.as_ref(), &key, &values);

        let mut observation = self.coordinator.get(consumer.as_ref(), &key);
        observation.log_transfer(values.len());
        report.initial = Some(observation.hosting.clone());

        if observation.values.is_empty() || observation.hosting.is_empty() {
            warn!("[GET]: either couldn't fetch values or nodes hosting values...");
            return Ok(());
        }
        observation.log_hosting();

        let churn = self.churn();
        for round in 0..ChurnSimulator::shutdown_rounds(self.cluster.node_num()) {
            let churn_report = churn.targeted_shutdown(&observation.hosting)?;

            let before = std::mem::take(&mut observation.hosting);
            info!("[GET]: trying to fetch persistent values");
            observation = self.coordinator.get(consumer.as_ref(), &key);

            let verdict =
                self.verdict(&values, &observation.values, &before, &observation.hosting)?;
            report.rounds.push(RoundReport {
                round,
                observed: observation.values.len(),
                hosting: observation.hosting.clone(),
                verdict: Some(verdict),
                churn: Some(churn_report),
            });
        }
        Ok(())
    }

    /// Replaces random processes one after the other, unrelated to where
    /// the key lives, then looks for the key again.
    fn replace_cluster_test(&self, report: &mut ScenarioReport) -> Result<(), ScenarioError> {
        self.cluster.resize(3)?;
        let consumer = self.cluster.get(1)?;
        let producer = self.cluster.get(2)?;

        let key = InfoHash::random();
        let values = sample_values();
        report.keys.push(key);

        self.coordinator.put(producer.as_ref(), &key, &values);
        let initial = self.coordinator.get(consumer.as_ref(), &key);
        report.initial = Some(initial.hosting.clone());

        info!(
            "Replacing {} random processes successively...",
            self.options.replace_rounds
        );
        self.churn().replace_processes(self.options.replace_rounds)?;

        info!("[GET]: trying to fetch persistent values");
        let observation = self.coordinator.get(consumer.as_ref(), &key);
        let verdict = self.verdict(
            &values,
            &observation.values,
            &initial.hosting,
            &observation.hosting,
        )?;
        report.rounds.push(RoundReport {
            round: 0,
            observed: observation.values.len(),
            hosting: observation.hosting,
            verdict: Some(verdict),
            churn: None,
        });
        Ok(())
    }

    /// Many producers each store one value under their own key. Synthetic
    /// neighbours are placed around every key, storage maintenance gets
    /// time to run, the original hosting nodes are removed, and a fresh
    /// consumer looks for every key.
    fn mult_time_test(&self, report: &mut ScenarioReport) -> Result<(), ScenarioError> {
        let producers = self.options.producers;
        let values = vec![Value::from("foo")];

        self.cluster.resize(producers + 2)?;
        let consumer = self.cluster.get(1)?;
        for slot in 2..producers + 2 {
            let producer = self.cluster.get(slot)?;
            let key = InfoHash::random();
            self.coordinator.put(producer.as_ref(), &key, &values);
            report.keys.push(key);
        }

        let (_, nodes) = self.poke_all(consumer.as_ref(), &report.keys);
        info!("Values are found on:");
        for node in &nodes {
            info!("{}", node);
        }
        report.initial = Some(nodes.clone());

        let churn = self.churn();
        // Keep the neighbours alive until the final lookups are done.
        let _flood = churn.storage_maintenance_wait(
            &report.keys,
            self.options.flood_radius,
            self.options.maintenance_wait,
        )?;

        info!("Deleting old nodes from previous search.");
        churn.remove_nodes(&nodes.to_vec())?;

        // A new consumer, so nothing comes from a warm search cache.
        self.cluster.resize(producers + 3)?;
        let consumer = self.cluster.get(producers + 2)?;

        let (observed, nodes_after) = self.poke_all(consumer.as_ref(), &report.keys);
        let expected: Vec<Value> = report
            .keys
            .iter()
            .flat_map(|_| values.iter().cloned())
            .collect();
        let verdict = self.verdict(&expected, &observed, &nodes, &nodes_after)?;
        report.rounds.push(RoundReport {
            round: 0,
            observed: observed.len(),
            hosting: nodes_after,
            verdict: Some(verdict),
            churn: None,
        });
        Ok(())
    }

    /// Looks up every key; returns all values found and the union of the
    /// hosting sets.
    fn poke_all(
        &self,
        consumer: &dyn DhtPeer,
        keys: &[InfoHash],
    ) -> (Vec<Value>, HostingSet) {
        let mut values = Vec::new();
        let mut nodes = HostingSet::new();
        for key in keys {
            let observation = self.coordinator.get(consumer, key);
            values.extend(observation.values);
            nodes.extend(observation.hosting.iter().cloned());
        }
        (values, nodes)
    }
}
