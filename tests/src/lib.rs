//! Integration tests for the churn harness
//!
//! This module shows how to drive the harness's scenarios against the
//! simulated cluster and check the cluster invariants afterwards.


use churnbench::Outcome;
use integration::{ClusterInvariants, TestHarness, TestScenarios};

#[test]
fn test_persistence_delete() {
    let report = TestScenarios::persistence_delete().expect("Delete scenario should succeed");
    let round = report.rounds.first().expect("Delete scenario should run a round");
    assert_eq!(
        round.verdict.as_ref().map(|v| v.outcome),
        Some(Outcome::Migrated)
    );
}

#[test]
fn test_persistence_replace() {
    TestScenarios::persistence_replace().expect("Replace scenario should succeed");
}

#[test]
fn test_persistence_mult_time() {
    TestScenarios::persistence_mult_time().expect("Mult-time scenario should succeed");
}

#[test]
fn test_performance_gets() {
    TestScenarios::performance_gets().expect("Gets benchmark should succeed");
}

#[test]
fn test_performance_delete() {
    TestScenarios::performance_delete().expect("Delete benchmark should succeed");
}

#[test]
fn test_invariants_on_untouched_cluster() {
    let harness = TestHarness::new(2, 4);
    let violations = ClusterInvariants::check_data_availability(&harness, &[]);
    assert!(violations.is_empty());
    // Nothing ran, so the cluster was never restored explicitly.
    assert!(!ClusterInvariants::check_cluster_restored(&harness).is_empty());
}

/// Every scenario in sequence
#[test]
#[ignore] // Long-running test
fn all_scenarios() {
    TestScenarios::run_all().expect("All scenarios should pass");
}
