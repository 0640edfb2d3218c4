use criterion::{criterion_group, criterion_main, Criterion};
use shipwright_core::{OperationParams, OperationRegistry, OperationRunner};
use shipwright_executor::MockExecutor;
use std::hint::black_box;

fn build_params(i: usize) -> OperationParams {
    OperationParams::Build {
        component: format!("component-{i}"),
    }
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("registry_create", |b| {
        let registry = OperationRegistry::new();
        let mut i = 0;
        b.iter(|| {
            i += 1;
            black_box(registry.create(build_params(i)));
        });
    });
}

fn bench_get_populated(c: &mut Criterion) {
    c.bench_function("registry_get_10k", |b| {
        let registry = OperationRegistry::new();
        let ids: Vec<_> = (0..10_000).map(|i| registry.create(build_params(i))).collect();
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % ids.len();
            black_box(registry.get(&ids[i]).unwrap());
        });
    });
}

fn bench_update(c: &mut Criterion) {
    c.bench_function("registry_update_progress", |b| {
        let registry = OperationRegistry::new();
        let id = registry.create(OperationParams::BuildAndDeploy {
            components: (0..5).map(|i| format!("c{i}")).collect(),
            cloud_provider: "vultr".to_owned(),
        });
        b.iter(|| {
            registry
                .update(&id, |op| {
                    op.current_component = Some("c3".to_owned());
                    Ok(())
                })
                .unwrap();
        });
    });
}

fn bench_submit_and_wait(c: &mut Criterion) {
    c.bench_function("runner_build_mock", |b| {
        let runner = OperationRunner::new(Box::new(MockExecutor::new()));
        b.iter(|| {
            let id = runner.submit(build_params(0)).unwrap().id().clone();
            black_box(runner.wait(&id).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_get_populated,
    bench_update,
    bench_submit_and_wait
);
criterion_main!(benches);
