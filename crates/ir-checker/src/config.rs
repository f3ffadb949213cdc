//! Checker run configuration.

use core::time::Duration;
use std::env;

use crate::{arch::Arch, directive::DEFAULT_COMMENT_PREFIXES};

/// Architecture selection environment variable, e.g. `CHECKER_ARCH=arm64`.
pub const ENV_ARCH: &str = "CHECKER_ARCH";
/// Maximum number of groups evaluated concurrently.
pub const ENV_JOBS: &str = "CHECKER_JOBS";
/// Per-group time budget in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "CHECKER_TIMEOUT_MS";

/// Options for a checker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    arch: Option<Arch>,
    concurrency: usize,
    timeout: Option<Duration>,
    comment_prefixes: Vec<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckerConfig {
    /// No architecture, one worker per available CPU, no timeout, `///` and `##` comments.
    pub fn new() -> Self {
        Self {
            arch: None,
            concurrency: default_concurrency(),
            timeout: None,
            comment_prefixes: DEFAULT_COMMENT_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Defaults overridden by `CHECKER_ARCH`, `CHECKER_JOBS` and
    /// `CHECKER_TIMEOUT_MS`. Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Ok(value) = env::var(ENV_ARCH) {
            match value.parse::<Arch>() {
                Ok(arch) => config.arch = Some(arch),
                Err(e) => log::warn!("ignoring {}: {}", ENV_ARCH, e),
            }
        }

        if let Ok(value) = env::var(ENV_JOBS) {
            match value.trim().parse::<usize>() {
                Ok(jobs) if jobs > 0 => config.concurrency = jobs,
                _ => log::warn!("ignoring {}='{}': expected a positive integer", ENV_JOBS, value),
            }
        }

        if let Ok(value) = env::var(ENV_TIMEOUT_MS) {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.timeout = Some(Duration::from_millis(ms)),
                Err(_) => log::warn!(
                    "ignoring {}='{}': expected milliseconds",
                    ENV_TIMEOUT_MS,
                    value
                ),
            }
        }

        config
    }

    /// Select the target architecture, overriding the one the dump declares.
    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = Some(arch);
        self
    }

    /// Maximum number of groups evaluated at once. `1` evaluates on the calling thread.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Time budget for each group evaluation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Comment prefixes that introduce directives.
    pub fn with_comment_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.comment_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn arch(&self) -> Option<Arch> {
        self.arch
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn comment_prefixes(&self) -> &[String] {
        &self.comment_prefixes
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}
