use criterion::{black_box, criterion_group, criterion_main, Criterion};
use request_chain::{Journal, PipelineBuilder, RecordingProcessor, Request, ShutdownMode};
use std::time::Duration;

fn run_chain(stages: usize, requests: usize) {
    let journal = Journal::new();
    let mut builder = PipelineBuilder::new().with_shutdown_mode(ShutdownMode::Wake);
    for index in 0..stages - 1 {
        builder = builder.stage_fn(format!("stage{index}"), |request| {
            black_box(request.name().len());
            Ok(())
        });
    }
    let mut pipeline = builder
        .stage("sink", RecordingProcessor::new("sink", journal.clone()))
        .build()
        .expect("Build failed");

    for i in 0..requests {
        pipeline.submit(Request::new(format!("req-{i}")));
    }

    journal.wait_for_count("sink", requests, Duration::from_secs(30));
    pipeline.shutdown();
    let _ = pipeline.await_termination(Duration::from_secs(5));
}

fn benchmark_single_stage_throughput(c: &mut Criterion) {
    c.bench_function("single_stage_1000_requests", |b| {
        b.iter(|| run_chain(1, 1000));
    });
}

fn benchmark_three_stage_throughput(c: &mut Criterion) {
    c.bench_function("three_stage_1000_requests", |b| {
        b.iter(|| run_chain(3, 1000));
    });
}

fn benchmark_long_chain(c: &mut Criterion) {
    c.bench_function("eight_stage_5000_requests", |b| {
        b.iter(|| run_chain(8, 5000));
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_single_stage_throughput, benchmark_three_stage_throughput, benchmark_long_chain
);
criterion_main!(benches);
