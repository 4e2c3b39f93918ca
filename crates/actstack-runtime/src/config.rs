#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! # Environment Variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `ACTSTACK_MAX_DEPTH` | `max_depth` | 32 |
//! | `ACTSTACK_MAX_REQUESTS` | `max_requests_per_turn` | 256 |
//! | `ACTSTACK_TASK_THREAD` | `task_thread_name` | `actstack-task` |
//! | `ACTSTACK_LOG` | `log_filter` | `info` |
//!
//! Unparsable values are ignored with a warning.

use std::env;

pub const ENV_MAX_DEPTH: &str = "ACTSTACK_MAX_DEPTH";
pub const ENV_MAX_REQUESTS: &str = "ACTSTACK_MAX_REQUESTS";
pub const ENV_TASK_THREAD: &str = "ACTSTACK_TASK_THREAD";
pub const ENV_LOG: &str = "ACTSTACK_LOG";

/// Tunables for a [`Runtime`](crate::Runtime) and its stacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of on-stack slots.
    pub max_depth: usize,
    /// Upper bound on context requests processed by one `poll` turn.
    pub max_requests_per_turn: usize,
    /// Name given to background task threads.
    pub task_thread_name: String,
    /// `tracing-subscriber` env-filter directive.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_requests_per_turn: 256,
            task_thread_name: "actstack-task".into(),
            log_filter: "info".into(),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Defaults overlaid with a custom lookup (for tests).
    #[must_use]
    pub fn from_env_with<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(n) = parse_positive(&get, ENV_MAX_DEPTH) {
            config.max_depth = n;
        }
        if let Some(n) = parse_positive(&get, ENV_MAX_REQUESTS) {
            config.max_requests_per_turn = n;
        }
        if let Some(name) = get(ENV_TASK_THREAD) {
            let name = name.trim();
            if name.is_empty() {
                tracing::warn!(var = ENV_TASK_THREAD, "empty thread name ignored");
            } else {
                config.task_thread_name = name.to_owned();
            }
        }
        if let Some(filter) = get(ENV_LOG) {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }
        config
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    #[must_use]
    pub fn with_max_requests_per_turn(mut self, n: usize) -> Self {
        self.max_requests_per_turn = n.max(1);
        self
    }

    #[must_use]
    pub fn with_task_thread_name(mut self, name: impl Into<String>) -> Self {
        self.task_thread_name = name.into();
        self
    }

    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }
}

fn parse_positive<F>(get: &F, var: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = get(var)?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(var, value = %raw, "expected positive integer, ignoring");
            None
        }
    }
}
