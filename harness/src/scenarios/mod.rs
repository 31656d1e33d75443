//! Named experiments composed from the coordinator, churn simulator,
//! verifier and sampler.

pub mod performance;
pub mod persistence;

use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use churnbench_lib::stats::LatencySummary;
use churnbench_lib::{InfoHash, Value};

use crate::churn::ChurnReport;
use crate::cluster::ClusterController;
use crate::config::ScenarioOptions;
use crate::error::{ConfigError, ScenarioError};
use crate::sampler::LatencyBatch;
use crate::timer::Timers;
use crate::verifier::{HostingSet, Verdict};

pub use performance::PerformanceTest;
pub use persistence::PersistenceTest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceKind {
    /// Gracefully shut down the nodes hosting a key, round after round.
    Delete,
    /// Replace random processes, then look for the key again.
    Replace,
    /// Wait for storage maintenance around many keys.
    MultTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceKind {
    /// Latency of random lookups under process replacement.
    Gets,
    /// Put/get rounds interleaved with targeted shutdowns.
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    Persistence(PersistenceKind),
    Performance(PerformanceKind),
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario::Persistence(PersistenceKind::Delete)
    }
}

impl FromStr for Scenario {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let scenario = match s.trim() {
            "persistence:delete" => Scenario::Persistence(PersistenceKind::Delete),
            "persistence:replace" => Scenario::Persistence(PersistenceKind::Replace),
            "persistence:mult_time" => Scenario::Persistence(PersistenceKind::MultTime),
            "performance:gets" => Scenario::Performance(PerformanceKind::Gets),
            "performance:delete" => Scenario::Performance(PerformanceKind::Delete),
            other => return Err(ConfigError::UnknownScenario(other.to_string())),
        };
        Ok(scenario)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::Persistence(PersistenceKind::Delete) => "persistence:delete",
            Scenario::Persistence(PersistenceKind::Replace) => "persistence:replace",
            Scenario::Persistence(PersistenceKind::MultTime) => "persistence:mult_time",
            Scenario::Performance(PerformanceKind::Gets) => "performance:gets",
            Scenario::Performance(PerformanceKind::Delete) => "performance:delete",
        };
        f.write_str(name)
    }
}

/// Values every single-key scenario stores.
pub fn sample_values() -> Vec<Value> {
    vec![Value::from("foo"), Value::from("bar"), Value::from("foobar")]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: usize,
    pub observed: usize,
    pub hosting: HostingSet,
    pub verdict: Option<Verdict>,
    pub churn: Option<ChurnReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub batch: LatencyBatch,
    pub summary: LatencySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub keys: Vec<InfoHash>,
    /// Hosting set observed right after the initial put.
    pub initial: Option<HostingSet>,
    pub rounds: Vec<RoundReport>,
    pub latency: Vec<LatencyReport>,
    /// Set when the run ended early on an unexpected error.
    pub error: Option<String>,
}

impl ScenarioReport {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            keys: Vec::new(),
            initial: None,
            rounds: Vec::new(),
            latency: Vec::new(),
            error: None,
        }
    }

    /// True if some round showed the values on nodes that did not host them before.
    pub fn persisted(&self) -> bool {
        self.rounds
            .iter()
            .any(|r| r.verdict.as_ref().is_some_and(Verdict::persisted))
    }
}

/// Records an early exit, then shrinks the cluster back to a single node
/// whatever happened.
pub(crate) fn conclude(
    cluster: &dyn ClusterController,
    report: &mut ScenarioReport,
    result: Result<(), ScenarioError>,
) {
    if let Err(e) = result {
        error!("{} aborted: {}", report.scenario, e);
        report.error = Some(e.to_string());
    }
    if let Err(e) = cluster.resize(1) {
        error!("Failed to restore cluster size: {}", e);
    }
    info!("{} finished", report.scenario);
}

pub fn run_scenario(
    scenario: Scenario,
    cluster: &dyn ClusterController,
    options: &ScenarioOptions,
    timers: &Timers,
) -> ScenarioReport {
    match scenario {
        Scenario::Persistence(kind) => {
            PersistenceTest::new(kind, cluster, options.clone(), timers.clone()).run()
        }
        Scenario::Performance(kind) => {
            PerformanceTest::new(kind, cluster, options.clone(), timers.clone()).run()
        }
    }
}
