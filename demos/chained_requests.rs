//! Pre -> Print -> Save chain over a handful of requests
//!
//! Pipeline:
//! 1. Pre: logs each request
//! 2. Print: logs each request, rejects ones named "bad"
//! 3. Save: records each request into an in-memory journal
//!
//! Usage: RUST_LOG=debug cargo run --example chained_requests

use request_chain::{
    Journal, LogProcessor, PipelineBuilder, ProcessError, RecordingProcessor, ShutdownMode,
};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let saved = Journal::new();

    let mut pipeline = PipelineBuilder::new()
        .stage("pre", LogProcessor)
        .stage_fn("print", |request| {
            if request.name() == "bad" {
                return Err(ProcessError::rejected("print refuses bad requests"));
            }
            tracing::info!("{request}");
            Ok(())
        })
        .stage("save", RecordingProcessor::new("save", saved.clone()))
        .with_shutdown_mode(ShutdownMode::Wake)
        .build()?;

    for name in ["alpha", "bad", "gamma"] {
        pipeline.submit(name);
    }

    if !saved.wait_for_count("save", 2, Duration::from_secs(5)) {
        tracing::warn!("save stage did not observe every request in time");
    }

    pipeline.shutdown();
    pipeline.await_termination(Duration::from_secs(5))?;

    println!("{}", pipeline.metrics_summary());
    println!("Saved: {:?}", saved.names_at("save"));
    Ok(())
}
