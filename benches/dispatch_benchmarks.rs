//! Benchmarks for mock dispatch and switchboard routing

use cmdexec::{ExecutionContext, MockCommand, MockExecutor};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Registry with `num_commands` distinct `git` invocations
fn create_registry(num_commands: usize) -> MockExecutor {
    MockExecutor::new((0..num_commands).map(|i| {
        MockCommand::new("git")
            .with_args(["log".to_string(), format!("--max-count={}", i)])
            .returns_stdout(format!("commit {}\n", i))
    }))
}

fn bench_registry_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");
    group
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(3));

    for size in [1, 100, 10_000] {
        let registry = create_registry(size);
        let args = vec!["log".to_string(), format!("--max-count={}", size / 2)];
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(registry.get("git", &args)));
        });
    }

    group.finish();
}

fn bench_registry_dispatch(c: &mut Criterion) {
    let registry = create_registry(100);
    let args = vec!["log".to_string(), "--max-count=50".to_string()];

    // Dispatch records every call; start each batch with an empty history
    c.bench_function("registry_dispatch", |b| {
        b.iter_batched(
            || registry.clear_calls(),
            |_| black_box(registry.dispatch("git", &args)),
            BatchSize::SmallInput,
        );
    });
}

fn bench_switchboard_command(c: &mut Criterion) {
    let ctx = ExecutionContext::new();
    let guard = ctx
        .install(create_registry(100))
        .expect("fresh context accepts a mock");

    c.bench_function("switchboard_command", |b| {
        b.iter_batched(
            || guard.mock().clear_calls(),
            |_| black_box(ctx.command("git", ["log", "--max-count=50"])),
            BatchSize::SmallInput,
        );
    });
}

fn bench_mock_output(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let ctx = ExecutionContext::new();
    let guard = ctx
        .install(create_registry(100))
        .expect("fresh context accepts a mock");

    c.bench_function("mock_output", |b| {
        b.to_async(&rt).iter_batched(
            || guard.mock().clear_calls(),
            |_| async {
                let out = ctx
                    .command("git", ["log", "--max-count=7"])
                    .output()
                    .await
                    .expect("scripted output");
                black_box(out)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_registry_lookup,
    bench_registry_dispatch,
    bench_switchboard_command,
    bench_mock_output
);
criterion_main!(benches);
