//! Escape-attempt tests for the sandbox.
//!
//! Every test submits code that tries to reach outside the sandbox (or
//! exhaust its resources) and asserts the attempt is rejected while the
//! caller's environment stays intact.

use std::time::Duration;

use replbot::sandbox::interp::Interpreter;
use replbot::{Environment, ExecRequest, Executor, ImportGate, Outcome, SandboxConfig, Value};

fn interpreter() -> Interpreter {
    Interpreter::new(std::sync::Arc::new(ImportGate::default()), None)
}

fn run_err(code: &str) -> String {
    interpreter()
        .execute(code, &Environment::new())
        .expect_err("expected rejection")
        .to_string()
}

#[test]
fn test_os_level_imports_are_rejected() {
    for module in ["os", "sys", "subprocess", "socket", "shutil"] {
        let err = run_err(&format!("import {}", module));
        assert!(err.contains("not whitelisted"), "{module}: {err}");
    }
}

#[test]
fn test_whitelist_narrowing_is_honored() {
    let gate = ImportGate::new(["json".to_string()]);
    let interp = Interpreter::new(std::sync::Arc::new(gate), None);

    let err = interp
        .execute("import math", &Environment::new())
        .expect_err("math should be gated off");
    assert!(err.to_string().contains("not whitelisted"));

    assert!(interp.execute("import json", &Environment::new()).is_ok());
}

#[test]
fn test_escape_hatch_builtins_do_not_exist() {
    for name in ["open", "eval", "exec", "compile", "getattr", "__import__"] {
        let err = run_err(&format!("{}(1)", name));
        assert!(err.contains("not defined"), "{name}: {err}");
    }
}

#[test]
fn test_dunder_attributes_are_unreachable() {
    let err = run_err("import math\nmath.__dict__");
    assert!(err.contains("restricted"));

    let err = run_err("import math\nmath._private");
    assert!(err.contains("restricted"));
}

#[test]
fn test_failed_submission_leaves_environment_untouched() {
    let interp = interpreter();
    let mut env = Environment::new();
    env.insert("x".to_string(), Value::Int(1));
    let before = env.clone();

    assert!(interp.execute("x = 2\nimport os", &env).is_err());
    assert_eq!(env, before);
}

#[test]
fn test_oversized_allocations_are_rejected() {
    let err = run_err("\"a\" * 100000000");
    assert!(err.contains("too large"), "{err}");

    let err = run_err("[0] * 100000000");
    assert!(err.contains("too large"), "{err}");

    let err = run_err("range(100000000)");
    assert!(err.contains("exceeds"), "{err}");
}

#[test]
fn test_integer_overflow_is_an_error_not_a_wrap() {
    let err = run_err("9223372036854775807 + 1");
    assert!(err.contains("overflow"), "{err}");
}

#[test]
fn test_deep_nesting_is_rejected_at_compile_time() {
    let bomb = format!("{}1{}", "(".repeat(200), ")".repeat(200));
    let interp = interpreter();
    let err = interp
        .execute(&bomb, &Environment::new())
        .expect_err("nesting bomb should not parse");
    assert!(err.is_compile());
}

#[test]
fn test_fuel_budget_stops_busy_loops() {
    let interp = Interpreter::new(std::sync::Arc::new(ImportGate::default()), Some(10_000));
    let err = interp
        .execute("while true { pass }", &Environment::new())
        .expect_err("loop should exhaust fuel");
    assert!(err.is_out_of_fuel());
}

#[tokio::test]
async fn test_wall_clock_deadline_is_the_outer_backstop() {
    // Fuel keeps the abandoned worker from outliving the test process.
    let config = SandboxConfig::builder().max_fuel(50_000_000).build();
    let exec = Executor::new(&config);
    let started = std::time::Instant::now();
    let outcome = exec
        .submit(ExecRequest {
            code: "while true { x = 1 }".to_string(),
            environment: Environment::new(),
            deadline: Duration::from_millis(100),
        })
        .await;
    assert!(matches!(outcome, Outcome::TimedOut));
    assert!(started.elapsed() < Duration::from_secs(2));
}
