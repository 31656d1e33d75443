use crate::integration::{ClusterInvariants, InvariantViolation, TestHarness};
use churnbench::{PerformanceKind, PersistenceKind, Scenario, ScenarioReport};

/// Full scenario runs on a small simulated cluster, checked against the
/// cluster invariants
pub struct TestScenarios;

impl TestScenarios {
    fn checked(
        harness: &TestHarness,
        report: ScenarioReport,
    ) -> Result<ScenarioReport, Box<dyn std::error::Error>> {
        if let Some(error) = &report.error {
            return Err(format!("{} ended early: {}", report.scenario, error).into());
        }
        let mut violations: Vec<InvariantViolation> = ClusterInvariants::check_all(harness, &report);
        violations.extend(ClusterInvariants::check_data_availability(
            harness,
            &report.keys,
        ));
        if !violations.is_empty() {
            return Err(format!("Invariant violations: {:?}", violations).into());
        }
        Ok(report)
    }

    /// Targeted graceful shutdowns of the nodes hosting one key
    pub fn persistence_delete() -> Result<ScenarioReport, Box<dyn std::error::Error>> {
        let harness = TestHarness::new(3, 8);
        let report = harness.run(Scenario::Persistence(PersistenceKind::Delete));
        Self::checked(&harness, report)
    }

    /// Random process replacement unrelated to where the key lives
    pub fn persistence_replace() -> Result<ScenarioReport, Box<dyn std::error::Error>> {
        let harness = TestHarness::new(3, 8);
        let report = harness.run(Scenario::Persistence(PersistenceKind::Replace));
        Self::checked(&harness, report)
    }

    /// Many keys, neighbourhood flooding and a compressed maintenance wait
    pub fn persistence_mult_time() -> Result<ScenarioReport, Box<dyn std::error::Error>> {
        let harness = TestHarness::new(2, 8);
        let report = harness.run(Scenario::Persistence(PersistenceKind::MultTime));
        Self::checked(&harness, report)
    }

    /// Lookup latency under process replacement
    pub fn performance_gets() -> Result<ScenarioReport, Box<dyn std::error::Error>> {
        let harness = TestHarness::new(2, 8);
        let report = harness.run(Scenario::Performance(PerformanceKind::Gets));
        Self::checked(&harness, report)
    }

    /// Put/get rounds interleaved with targeted shutdowns
    pub fn performance_delete() -> Result<ScenarioReport, Box<dyn std::error::Error>> {
        let harness = TestHarness::new(2, 8);
        let report = harness.run(Scenario::Performance(PerformanceKind::Delete));
        Self::checked(&harness, report)
    }

    pub fn run_all() -> Result<(), Box<dyn std::error::Error>> {
        println!("Running persistence delete scenario...");
        Self::persistence_delete()?;
        println!("Running persistence replace scenario...");
        Self::persistence_replace()?;
        println!("Running persistence mult_time scenario...");
        Self::persistence_mult_time()?;
        println!("Running performance gets scenario...");
        Self::performance_gets()?;
        println!("Running performance delete scenario...");
        Self::performance_delete()?;
        println!("All scenarios passed!");
        Ok(())
    }
}
