//! Isolation and timeout layer.
//!
//! Dispatches compile+execute requests to a bounded pool of blocking
//! workers and races each one against a wall-clock deadline. A worker that
//! misses its deadline is abandoned, not cancelled: its partial environment
//! mutations are discarded and its pool slot is reclaimed when it finally
//! returns. Worker panics surface as runtime failures, never as a crash of
//! the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::SandboxError;
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::interp::Interpreter;
use crate::sandbox::modules::ImportGate;
use crate::sandbox::value::Environment;

/// An immutable execution request.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// The fragment to compile and run.
    pub code: String,
    /// Snapshot of the submitting session's environment.
    pub environment: Environment,
    /// Wall-clock deadline for the whole request, including the wait for
    /// a free worker slot.
    pub deadline: Duration,
}

/// The tagged result of one execution attempt. Exactly one variant is
/// produced per request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Normal completion: the mutated environment and captured output.
    Success {
        environment: Environment,
        output: String,
    },
    /// The fragment was rejected before execution.
    CompileFailure(String),
    /// The fragment failed during execution (including import rejections,
    /// fuel exhaustion, and worker panics).
    RuntimeFailure(String),
    /// The deadline elapsed before the worker produced a result.
    TimedOut,
}

impl Outcome {
    /// Check if this outcome carries a mutated environment.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    fn from_error(error: SandboxError) -> Self {
        match error {
            SandboxError::Compile(msg) => Outcome::CompileFailure(msg),
            SandboxError::Runtime(msg) => Outcome::RuntimeFailure(msg),
            SandboxError::Timeout(_) => Outcome::TimedOut,
            other => Outcome::RuntimeFailure(other.to_string()),
        }
    }
}

/// Bounded dispatcher in front of the sandbox interpreter.
pub struct Executor {
    interpreter: Arc<Interpreter>,
    permits: Arc<Semaphore>,
}

impl Executor {
    /// Build an executor (and its import gate) from configuration.
    pub fn new(config: &SandboxConfig) -> Self {
        let gate = Arc::new(ImportGate::new(config.whitelist.iter().cloned()));
        Self {
            interpreter: Arc::new(Interpreter::new(gate, config.max_fuel)),
            permits: Arc::new(Semaphore::new(config.pool_size)),
        }
    }

    /// The import gate shared with the interpreter, for whitelist dumps.
    pub fn gate(&self) -> &ImportGate {
        self.interpreter.gate()
    }

    /// Run one request to a single [`Outcome`].
    ///
    /// The deadline clock starts immediately and bounds the whole request:
    /// waiting for a worker slot counts against it, so a pool saturated by
    /// abandoned workers still yields `TimedOut` instead of parking the
    /// caller forever. On timeout the caller stops waiting immediately; the
    /// worker keeps running detached and releases its slot whenever it
    /// finishes.
    pub async fn submit(&self, request: ExecRequest) -> Outcome {
        let ExecRequest {
            code,
            environment,
            deadline,
        } = request;
        let expiry = tokio::time::sleep(deadline);
        tokio::pin!(expiry);

        let permit = tokio::select! {
            acquired = Arc::clone(&self.permits).acquire_owned() => match acquired {
                Ok(permit) => permit,
                Err(_) => return Outcome::RuntimeFailure("worker pool unavailable".to_string()),
            },
            _ = &mut expiry => {
                warn!(?deadline, "no worker slot freed before the deadline");
                return Outcome::TimedOut;
            }
        };
        debug!(bytes = code.len(), "dispatching fragment to worker");

        let interpreter = Arc::clone(&self.interpreter);
        let handle = tokio::task::spawn_blocking(move || {
            let result = interpreter.execute(&code, &environment);
            drop(permit);
            result
        });

        tokio::select! {
            joined = handle => match joined {
                Ok(Ok(execution)) => Outcome::Success {
                    environment: execution.environment,
                    output: execution.output,
                },
                Ok(Err(error)) => Outcome::from_error(error),
                Err(join_error) => {
                    warn!(%join_error, "evaluation worker panicked");
                    Outcome::RuntimeFailure(format!("worker panicked: {}", join_error))
                }
            },
            _ = &mut expiry => {
                warn!(?deadline, "fragment exceeded deadline, abandoning worker");
                Outcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(config: SandboxConfig) -> Executor {
        Executor::new(&config)
    }

    fn request(code: &str, deadline: Duration) -> ExecRequest {
        ExecRequest {
            code: code.to_string(),
            environment: Environment::new(),
            deadline,
        }
    }

    #[tokio::test]
    async fn test_success_outcome_carries_output() {
        let exec = executor(SandboxConfig::default());
        let outcome = exec
            .submit(request("print(1 + 1)", Duration::from_secs(5)))
            .await;
        match outcome {
            Outcome::Success { output, .. } => assert_eq!(output, "2\n"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        // Large fuel so the abandoned worker still terminates eventually;
        // the deadline fires long before the fuel runs out.
        let config = SandboxConfig::builder().max_fuel(50_000_000).build();
        let exec = executor(config);
        let started = std::time::Instant::now();
        let outcome = exec
            .submit(request("while true { pass }", Duration::from_millis(100)))
            .await;
        assert!(matches!(outcome, Outcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_compile_and_runtime_failures_are_distinct() {
        let exec = executor(SandboxConfig::default());
        let outcome = exec.submit(request("x = = 1", Duration::from_secs(5))).await;
        assert!(matches!(outcome, Outcome::CompileFailure(_)));

        let outcome = exec.submit(request("1 / 0", Duration::from_secs(5))).await;
        assert!(matches!(outcome, Outcome::RuntimeFailure(_)));
    }

    #[tokio::test]
    async fn test_fuel_exhaustion_is_runtime_failure() {
        let config = SandboxConfig::builder().max_fuel(100).build();
        let exec = executor(config);
        let outcome = exec
            .submit(request("while true { pass }", Duration::from_secs(5)))
            .await;
        match outcome {
            Outcome::RuntimeFailure(msg) => assert!(msg.contains("fuel")),
            other => panic!("expected runtime failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pool_survives_abandoned_workers() {
        // More timed-out submissions than pool slots; fuel makes the
        // abandoned workers finish quickly so their permits recycle.
        let config = SandboxConfig::builder()
            .pool_size(2)
            .max_fuel(2_000_000)
            .build();
        let exec = executor(config);
        for _ in 0..4 {
            let outcome = exec
                .submit(request("while true { pass }", Duration::from_millis(20)))
                .await;
            assert!(!outcome.is_success());
        }
        let outcome = exec.submit(request("print(9)", Duration::from_secs(5))).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_saturated_pool_times_out_instead_of_parking() {
        let config = SandboxConfig::builder()
            .pool_size(1)
            .max_fuel(50_000_000)
            .build();
        let exec = executor(config);

        // The only slot is now held by an abandoned worker.
        let outcome = exec
            .submit(request("while true { pass }", Duration::from_millis(50)))
            .await;
        assert!(matches!(outcome, Outcome::TimedOut));

        // The next submission must not wait for that worker beyond its own
        // deadline; it gets a TimedOut outcome, not an indefinite park.
        let started = std::time::Instant::now();
        let outcome = exec
            .submit(request("print(1)", Duration::from_millis(50)))
            .await;
        assert!(matches!(outcome, Outcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
