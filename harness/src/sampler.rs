use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use churnbench_lib::stats::LatencySummary;
use churnbench_lib::{InfoHash, Value};

use crate::gate::CompletionGate;
use crate::peer::{DhtPeer, RespondingNode, ValueCallback};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    /// Offset from the sampler's creation to the moment the get was issued.
    #[serde(with = "humantime_serde")]
    pub issued_at: Duration,
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyBatch {
    pub round: usize,
    pub samples: Vec<LatencySample>,
}

impl LatencyBatch {
    pub fn summary(&self) -> LatencySummary {
        LatencySummary::from_durations(self.samples.iter().map(|s| &s.latency))
    }

    pub fn failures(&self) -> usize {
        self.samples.iter().filter(|s| !s.ok).count()
    }
}

/// Times lookups of fresh random keys, one at a time.
#[derive(Debug)]
pub struct PerformanceSampler {
    gate: Arc<CompletionGate<Vec<LatencySample>>>,
    epoch: Instant,
}

impl Default for PerformanceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceSampler {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(CompletionGate::default()),
            epoch: Instant::now(),
        }
    }

    pub fn sample(&self, peer: &dyn DhtPeer, trials: usize, round: usize) -> LatencyBatch {
        self.gate.update(Vec::clear);

        for _ in 0..trials {
            let ticket = self.gate.begin(1);
            let issued = Instant::now();
            let issued_at = issued.duration_since(self.epoch);

            let on_value: ValueCallback = Arc::new(|value: &Value| {
                debug!("found {:?}", value);
                true
            });
            let gate = self.gate.clone();
            let on_done = Box::new(move |ok: bool, _nodes: Vec<RespondingNode>| {
                let latency = issued.elapsed();
                if !ok {
                    warn!("[GET]: failed !");
                }
                gate.complete(ticket, |samples| {
                    samples.push(LatencySample {
                        issued_at,
                        latency,
                        ok,
                    })
                });
            });

            peer.get(&InfoHash::random(), on_value, on_done);
            self.gate.wait();
        }

        let batch = LatencyBatch {
            round,
            samples: self.gate.take(),
        };
        let summary = batch.summary();
        info!(
            "Took {:?} mean {:?} std {:?} min {:?} max {:?}",
            summary.total, summary.mean, summary.std_dev, summary.min, summary.max
        );
        batch
    }
}
