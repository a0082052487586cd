//! Sandbox configuration with builder pattern.
//!
//! Read once at startup; immutable for the process lifetime.

use std::time::Duration;

use crate::sandbox::modules::ImportGate;

/// Default evaluation step budget. Generous enough that any fragment a
/// wall-clock deadline would accept finishes well within it, but finite so
/// an abandoned worker always terminates and recycles its pool slot.
pub const DEFAULT_MAX_FUEL: u64 = 100_000_000;

/// Configuration for the execution sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Wall-clock deadline for one submission.
    pub deadline: Duration,
    /// Number of concurrent evaluation workers.
    pub pool_size: usize,
    /// Importable module names (exact names or top-level packages).
    pub whitelist: Vec<String>,
    /// Evaluation step budget per submission. `None` disables the budget
    /// and lets a timed-out worker spin for as long as its fragment does.
    pub max_fuel: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(5),
            pool_size: 4,
            whitelist: ImportGate::default_whitelist(),
            max_fuel: Some(DEFAULT_MAX_FUEL),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    deadline: Option<Duration>,
    pool_size: Option<usize>,
    whitelist: Option<Vec<String>>,
    max_fuel: Option<u64>,
}

impl SandboxConfigBuilder {
    /// Set the wall-clock deadline for one submission.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the worker-pool size.
    pub fn pool_size(mut self, workers: usize) -> Self {
        self.pool_size = Some(workers.max(1));
        self
    }

    /// Set the import whitelist.
    pub fn whitelist<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    /// Set the evaluation step budget.
    pub fn max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = Some(fuel);
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            deadline: self.deadline.unwrap_or(default.deadline),
            pool_size: self.pool_size.unwrap_or(default.pool_size),
            whitelist: self.whitelist.unwrap_or(default.whitelist),
            max_fuel: self.max_fuel.or(default.max_fuel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.deadline, Duration::from_secs(5));
        assert_eq!(config.pool_size, 4);
        assert!(config.whitelist.contains(&"math".to_string()));
        // The default budget is finite so abandoned workers terminate.
        assert_eq!(config.max_fuel, Some(DEFAULT_MAX_FUEL));
    }

    #[test]
    fn test_builder() {
        let config = SandboxConfig::builder()
            .deadline(Duration::from_millis(250))
            .pool_size(2)
            .whitelist(["math", "json"])
            .max_fuel(10_000)
            .build();

        assert_eq!(config.deadline, Duration::from_millis(250));
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.whitelist, vec!["math", "json"]);
        assert_eq!(config.max_fuel, Some(10_000));
    }

    #[test]
    fn test_pool_size_is_at_least_one() {
        let config = SandboxConfig::builder().pool_size(0).build();
        assert_eq!(config.pool_size, 1);
    }
}
