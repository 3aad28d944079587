// src/engine/config.rs
//
// Engine configuration: worker count, tile height and worker idle timeout.
//
// Environment overrides follow the same rule everywhere: a variable that is
// unset or does not parse leaves the default in place.

use crate::engine::common::EngineResult;
use crate::engine::pool::{detect_worker_count, MAX_WORKERS, MIN_WORKERS};
use crate::error::IpsError;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_WORKER_COUNT: &str = "IPS_WORKER_COUNT";
pub const ENV_ROWS_PER_TASK: &str = "IPS_ROWS_PER_TASK";
pub const ENV_IDLE_TIMEOUT_MS: &str = "IPS_IDLE_TIMEOUT_MS";

/// One row per task, as the interactive viewer schedules it.
pub const DEFAULT_ROWS_PER_TASK: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub worker_count: usize,
    pub rows_per_task: u32,
    pub idle_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: detect_worker_count(),
            rows_per_task: DEFAULT_ROWS_PER_TASK,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with the `IPS_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`; unparseable values are ignored.
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = parse::<usize>(&lookup, ENV_WORKER_COUNT) {
            self.worker_count = n;
        }
        if let Some(n) = parse::<u32>(&lookup, ENV_ROWS_PER_TASK) {
            self.rows_per_task = n;
        }
        if let Some(ms) = parse::<u64>(&lookup, ENV_IDLE_TIMEOUT_MS) {
            self.idle_timeout = Duration::from_millis(ms);
        }
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_rows_per_task(mut self, rows_per_task: u32) -> Self {
        self.rows_per_task = rows_per_task;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.worker_count < MIN_WORKERS || self.worker_count > MAX_WORKERS {
            return Err(IpsError::invalid_argument(
                "worker_count",
                self.worker_count.to_string(),
                format!("must be between {MIN_WORKERS} and {MAX_WORKERS}"),
            ));
        }
        if self.rows_per_task == 0 {
            return Err(IpsError::invalid_argument(
                "rows_per_task",
                "0",
                "tasks must cover at least one row",
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(IpsError::invalid_argument(
                "idle_timeout",
                "0ms",
                "workers would spin on an empty queue",
            ));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|raw| raw.trim().parse::<T>().ok())
}
