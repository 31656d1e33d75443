//! Churn and persistence test harness for a DHT.
//!
//! Drives a cluster of DHT nodes through disruptive events (targeted
//! shutdowns, process replacement, storage-maintenance waits) and checks
//! whether stored values survive, or measures lookup latency while the
//! cluster churns. The driver is synchronous; the peers it talks to report
//! back through callbacks that may fire on any thread.

pub mod churn;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod peer;
pub mod remote;
pub mod sampler;
pub mod scenarios;
pub mod timer;
pub mod verifier;

pub use churn::{ChurnReport, ChurnSimulator};
pub use cluster::{ClusterController, ClusterError, NodesRequestKind};
pub use config::{Config, ScenarioOptions};
pub use coordinator::{Observation, OperationCoordinator, PutReport};
pub use error::{ConfigError, ScenarioError};
pub use gate::{CompletionGate, Round};
pub use peer::{DhtPeer, GetDoneCallback, PutDoneCallback, RespondingNode, ValueCallback};
pub use remote::{RemoteCluster, TcpWorkbenchClient, WorkbenchClient};
pub use sampler::{LatencyBatch, LatencySample, PerformanceSampler};
pub use scenarios::{
    run_scenario, PerformanceKind, PersistenceKind, Scenario, ScenarioReport,
};
pub use timer::{CancelHandle, TimerOutcome, Timers};
pub use verifier::{HostingSet, Outcome, PersistenceVerifier, Verdict};

// Re-export from lib crate for convenience
pub use churnbench_lib::{InfoHash, NodeId, Value};
