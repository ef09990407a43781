//! End-to-end engine benchmarks: cold builds, incremental single-file
//! batches, and no-op batches over trees of varying size.

use conveyor::{BuildOutput, Engine, FileChange};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn uppercase_engine() -> Engine {
    Engine::builder()
        .base("/src")
        .stage("upper", |ctx| Ok(BuildOutput::from(ctx.text().to_uppercase())))
        .build()
        .unwrap()
}

fn seed_changes(num_files: usize) -> Vec<FileChange> {
    (0..num_files)
        .map(|i| {
            FileChange::update(
                format!("/src/dir{}/file{}.txt", i / 100, i),
                format!("contents of file {}", i),
            )
        })
        .collect()
}

fn bench_cold_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_cold_build");

    for size in [100, 500, 1_000] {
        let changes = seed_changes(size);
        group.bench_with_input(BenchmarkId::new("files", size), &changes, |b, changes| {
            b.iter(|| {
                let engine = uppercase_engine();
                engine.batch(changes.clone(), []).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_incremental_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_incremental");

    for size in [100, 1_000] {
        let engine = uppercase_engine();
        engine.batch(seed_changes(size), []).unwrap();

        let mut toggle = 0u64;
        group.bench_with_input(BenchmarkId::new("one_of", size), &size, |b, _| {
            b.iter(|| {
                // alternate contents so every batch is a real change
                toggle += 1;
                engine
                    .batch(
                        [FileChange::update(
                            "/src/dir0/file0.txt",
                            format!("version {}", toggle),
                        )],
                        [],
                    )
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_noop_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_noop");

    for size in [100, 1_000] {
        let engine = uppercase_engine();
        let changes = seed_changes(size);
        engine.batch(changes.clone(), []).unwrap();

        group.bench_with_input(BenchmarkId::new("files", size), &changes, |b, changes| {
            b.iter(|| engine.batch(black_box(changes.clone()), []).unwrap())
        });
    }

    group.finish();
}

fn bench_dependency_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_fan_out");

    // every page imports the same shared snippet; one snippet change
    // rebuilds the whole set
    for pages in [10, 100] {
        let engine = Engine::builder()
            .base("/src")
            .stage("include", |ctx| {
                if ctx.rel_path() == "snippet.txt" {
                    return Ok(BuildOutput::Contents(ctx.contents().to_vec()));
                }
                let snippet = ctx.import_internal("snippet.txt")?;
                let mut out = ctx.contents().to_vec();
                out.extend_from_slice(&snippet.contents);
                Ok(BuildOutput::Contents(out))
            })
            .build()
            .unwrap();

        let mut seed: Vec<FileChange> = (0..pages)
            .map(|i| FileChange::update(format!("/src/page{}.txt", i), format!("page {} ", i)))
            .collect();
        seed.push(FileChange::update("/src/snippet.txt", *b"v0"));
        engine.batch(seed, []).unwrap();

        let mut version = 0u64;
        group.bench_with_input(BenchmarkId::new("pages", pages), &pages, |b, _| {
            b.iter(|| {
                version += 1;
                engine
                    .batch(
                        [FileChange::update(
                            "/src/snippet.txt",
                            format!("v{}", version),
                        )],
                        [],
                    )
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cold_build,
    bench_incremental_batch,
    bench_noop_batch,
    bench_dependency_fan_out
);
criterion_main!(benches);
