//! Benchmarks for the scriptlet evaluator.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use replbot::sandbox::interp::Interpreter;
use replbot::{Environment, ExecRequest, Executor, ImportGate, SandboxConfig};

fn interpreter() -> Interpreter {
    Interpreter::new(Arc::new(ImportGate::default()), None)
}

/// Benchmark the compile step alone and small end-to-end fragments.
fn bench_evaluation(c: &mut Criterion) {
    let interp = interpreter();
    let env = Environment::new();

    let mut group = c.benchmark_group("evaluation");

    group.bench_function("simple_print", |b| {
        b.iter(|| {
            let execution = interp.execute("print(1 + 1)", &env).unwrap();
            black_box(execution)
        });
    });

    group.bench_function("loop_100", |b| {
        b.iter(|| {
            let execution = interp
                .execute("total = 0\nfor i in range(100) { total += i }\nprint(total)", &env)
                .unwrap();
            black_box(execution)
        });
    });

    group.bench_function("string_ops", |b| {
        b.iter(|| {
            let execution = interp
                .execute("s = \"hello\" * 100\nprint(len(s))", &env)
                .unwrap();
            black_box(execution)
        });
    });

    group.finish();
}

/// Benchmark execution against a pre-populated environment snapshot, the
/// shape every console submission takes.
fn bench_session_environment(c: &mut Criterion) {
    let interp = interpreter();

    let mut env = Environment::new();
    let seed = interp
        .execute("xs = range(1000)\ntotal = sum(xs)", &env)
        .unwrap();
    env = seed.environment;

    let mut group = c.benchmark_group("session");

    group.bench_function("read_large_binding", |b| {
        b.iter(|| {
            let execution = interp.execute("print(total + len(xs))", &env).unwrap();
            black_box(execution)
        });
    });

    group.finish();
}

/// Benchmark concurrent submissions through the bounded worker pool.
fn bench_concurrent_submissions(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("concurrent");
    group.sample_size(10);

    for concurrency in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(*concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("submissions", concurrency),
            concurrency,
            |b, &concurrency| {
                let exec = Arc::new(Executor::new(&SandboxConfig::default()));
                b.iter(|| {
                    rt.block_on(async {
                        let mut handles = Vec::new();
                        for _ in 0..concurrency {
                            let exec = Arc::clone(&exec);
                            handles.push(tokio::spawn(async move {
                                exec.submit(ExecRequest {
                                    code: "print(sum(range(100)))".to_string(),
                                    environment: Environment::new(),
                                    deadline: Duration::from_secs(5),
                                })
                                .await
                            }));
                        }
                        for handle in handles {
                            let outcome = handle.await.unwrap();
                            assert!(outcome.is_success());
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_evaluation,
    bench_session_environment,
    bench_concurrent_submissions
);
criterion_main!(benches);
