use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::scenarios::Scenario;

/// Knobs of a scenario run. Durations are nominal; the timers scale them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOptions {
    /// Ask processes to log hosting nodes' storage after a migration.
    pub dump_storage: bool,
    /// Collect per-process message counters during targeted shutdowns.
    pub track_ops: bool,
    pub time_scale: f64,
    /// Wait after each shutdown request, before re-observing.
    pub settle_delay: Duration,
    /// Wait for the DHT's own storage maintenance to fire.
    pub maintenance_wait: Duration,
    /// Initial wait before latency sampling.
    pub stabilize_wait: Duration,
    /// Wait after each process replacement during latency sampling.
    pub churn_settle: Duration,
    /// Wait between the lookup and the re-put of a delete performance round.
    pub reput_wait: Duration,
    pub replace_rounds: usize,
    pub producers: usize,
    /// Synthetic neighbours spawned on each side of a key.
    pub flood_radius: u16,
    pub get_rounds: usize,
    pub get_trials: usize,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            dump_storage: false,
            track_ops: true,
            time_scale: 1.0,
            settle_delay: Duration::from_secs(3),
            maintenance_wait: Duration::from_secs(10 * 60),
            stabilize_wait: Duration::from_secs(60),
            churn_settle: Duration::from_secs(2),
            reput_wait: Duration::from_secs(15),
            replace_rounds: 5,
            producers: 16,
            flood_radius: 4,
            get_rounds: 10,
            get_trials: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub workbench_address: String,
    pub scenario: Scenario,
    pub options: ScenarioOptions,
    pub report_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ScenarioOptions::default();
        let secs = |var: &'static str, default: Duration| {
            parse_or(&lookup, var, default.as_secs()).map(Duration::from_secs)
        };

        let options = ScenarioOptions {
            dump_storage: parse_or(&lookup, "CHURNBENCH_DUMP_STORAGE", defaults.dump_storage)?,
            track_ops: parse_or(&lookup, "CHURNBENCH_TRACK_OPS", defaults.track_ops)?,
            time_scale: parse_or(&lookup, "CHURNBENCH_TIME_SCALE", defaults.time_scale)?,
            settle_delay: secs("CHURNBENCH_SETTLE_DELAY_SECS", defaults.settle_delay)?,
            maintenance_wait: secs("CHURNBENCH_MAINTENANCE_WAIT_SECS", defaults.maintenance_wait)?,
            stabilize_wait: secs("CHURNBENCH_STABILIZE_WAIT_SECS", defaults.stabilize_wait)?,
            churn_settle: secs("CHURNBENCH_CHURN_SETTLE_SECS", defaults.churn_settle)?,
            reput_wait: secs("CHURNBENCH_REPUT_WAIT_SECS", defaults.reput_wait)?,
            replace_rounds: parse_or(&lookup, "CHURNBENCH_REPLACE_ROUNDS", defaults.replace_rounds)?,
            producers: parse_or(&lookup, "CHURNBENCH_PRODUCERS", defaults.producers)?,
            flood_radius: flood_radius(&lookup, defaults.flood_radius)?,
            get_rounds: parse_or(&lookup, "CHURNBENCH_GET_ROUNDS", defaults.get_rounds)?,
            get_trials: parse_or(&lookup, "CHURNBENCH_GET_TRIALS", defaults.get_trials)?,
        };

        let scenario = match lookup("CHURNBENCH_SCENARIO") {
            Some(name) => name.parse()?,
            None => Scenario::default(),
        };

        Ok(Self {
            workbench_address: lookup("CHURNBENCH_WORKBENCH_ADDRESS")
                .unwrap_or_else(|| "127.0.0.1:5000".to_string()),
            scenario,
            options,
            report_path: lookup("CHURNBENCH_REPORT_PATH").map(PathBuf::from),
        })
    }
}

/// Widest neighbourhood worth flooding; each key costs `2 * radius + 1` nodes.
pub const MAX_FLOOD_RADIUS: u16 = 64;

fn flood_radius<F>(lookup: &F, default: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const VAR: &str = "CHURNBENCH_FLOOD_RADIUS";
    let radius = parse_or(lookup, VAR, default)?;
    if radius > MAX_FLOOD_RADIUS {
        return Err(ConfigError::Invalid {
            var: VAR,
            value: radius.to_string(),
            reason: format!("at most {} neighbours per side", MAX_FLOOD_RADIUS),
        });
    }
    Ok(radius)
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
