use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per message-type counters reported by one node-process.
///
/// Index 0 counts keep-alive pings, which are not operations; the operation
/// volume is the sum of the per-type counters that follow it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub counts: Vec<u64>,
}

impl MessageStats {
    pub fn new(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    /// Number of operations handled, pings excluded.
    pub fn operations(&self) -> u64 {
        self.counts.iter().skip(1).sum()
    }
}

/// Aggregate of one batch of lookup latencies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: usize,

    #[serde(with = "humantime_serde")]
    pub total: Duration,

    #[serde(with = "humantime_serde")]
    pub mean: Duration,

    /// Population standard deviation.
    #[serde(with = "humantime_serde")]
    pub std_dev: Duration,

    #[serde(with = "humantime_serde")]
    pub min: Duration,

    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for LatencySummary {
    fn default() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            mean: Duration::ZERO,
            std_dev: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }
}

impl LatencySummary {
    pub fn from_durations<'a>(durations: impl IntoIterator<Item = &'a Duration>) -> Self {
        let samples: Vec<Duration> = durations.into_iter().copied().collect();
        let (Some(min), Some(max)) = (samples.iter().min(), samples.iter().max()) else {
            return Self::default();
        };

        let total: Duration = samples.iter().sum();
        let mean = total / samples.len() as u32;
        let mean_secs = mean.as_secs_f64();
        let variance = samples
            .iter()
            .map(|s| (s.as_secs_f64() - mean_secs).powi(2))
            .sum::<f64>()
            / samples.len() as f64;

        Self {
            count: samples.len(),
            total,
            mean,
            std_dev: Duration::from_secs_f64(variance.sqrt()),
            min: *min,
            max: *max,
        }
    }
}
