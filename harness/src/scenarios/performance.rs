use log::info;

use churnbench_lib::InfoHash;

use crate::churn::ChurnSimulator;
use crate::cluster::{ClusterController, NodesRequestKind};
use crate::config::ScenarioOptions;
use crate::coordinator::OperationCoordinator;
use crate::error::ScenarioError;
use crate::sampler::PerformanceSampler;
use crate::timer::Timers;

use super::{
    conclude, sample_values, LatencyReport, PerformanceKind, RoundReport, Scenario, ScenarioReport,
};

/// Measures how the DHT's operations behave while the cluster churns.
pub struct PerformanceTest<'a> {
    kind: PerformanceKind,
    cluster: &'a dyn ClusterController,
    options: ScenarioOptions,
    timers: Timers,
}

impl<'a> PerformanceTest<'a> {
    pub fn new(
        kind: PerformanceKind,
        cluster: &'a dyn ClusterController,
        options: ScenarioOptions,
        timers: Timers,
    ) -> Self {
        Self {
            kind,
            cluster,
            options,
            timers,
        }
    }

    pub fn run(&self) -> ScenarioReport {
        let mut report = ScenarioReport::new(Scenario::Performance(self.kind));
        let result = match self.kind {
            PerformanceKind::Gets => self.gets_times_test(&mut report),
            PerformanceKind::Delete => self.delete_test(&mut report),
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

    /// Random-key lookups from the front node, one batch after each
    /// process replacement.
    fn gets_times_test(&self, report: &mut ScenarioReport) -> Result<(), ScenarioError> {
        let churn = self.churn();
        churn.sleep("network stabilisation", self.options.stabilize_wait)?;

        let sampler = PerformanceSampler::new();
        for round in 0..self.options.get_rounds {
            churn.replace_processes(1)?;
            churn.sleep("settle after replacement", self.options.churn_settle)?;

            info!(
                "Getting {} random hashes successively.",
                self.options.get_trials
            );
            let front = self.cluster.front()?;
            let batch = sampler.sample(front.as_ref(), self.options.get_trials, round);
            let summary = batch.summary();
            report.latency.push(LatencyReport { batch, summary });
        }

        info!("GET calls timings benchmark test : DONE.");
        Ok(())
    }

    /// Lookup, wait, put, lookup again, then shut down whatever hosts the
    /// key. Repeated once per 32 nodes.
    fn delete_test(&self, report: &mut ScenarioReport) -> Result<(), ScenarioError> {
        self.cluster.resize(3)?;
        let consumer = self.cluster.get(1)?;
        let producer = self.cluster.get(2)?;

        let key = InfoHash::random();
        let values = sample_values();
        report.keys.push(key);

        let coordinator = OperationCoordinator::new();
        let churn = self.churn();
        for round in 0..ChurnSimulator::shutdown_rounds(self.cluster.node_num()) {
            coordinator.get(consumer.as_ref(), &key);
            churn.sleep("before re-put", self.options.reput_wait)?;

            coordinator.put(producer.as_ref(), &key, &values);

            let observation = coordinator.get(consumer.as_ref(), &key);
            observation.log_hosting();
            observation.log_transfer(values.len());
            if round == 0 {
                report.initial = Some(observation.hosting.clone());
            }

            info!("Removing all nodes hosting target values...");
            churn.request_nodes(NodesRequestKind::ShutdownNode, &observation.hosting.to_vec())?;

            report.rounds.push(RoundReport {
                round,
                observed: observation.values.len(),
                hosting: observation.hosting,
                verdict: None,
                churn: None,
            });
        }
        Ok(())
    }
}
