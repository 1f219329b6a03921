use crate::config::{PipelineConfig, ShutdownMode};
use crate::error::{PipelineError, ProcessError, Result};
use crate::metrics::StageMetrics;
use crate::request::Request;
use crate::stage::{FnProcessor, Process, Stage, StageRunner};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A named processor, one entry of a pipeline description
pub struct StageSpec {
    name: String,
    processor: Box<dyn Process>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, processor: impl Process) -> Self {
        Self {
            name: name.into(),
            processor: Box::new(processor),
        }
    }

    /// Describe a stage whose processor is a closure
    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&Request) -> std::result::Result<(), ProcessError> + Send + 'static,
    {
        Self::new(name, FnProcessor::new(func))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for constructing pipelines
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<StageSpec>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage after the ones already added
    pub fn stage(mut self, name: impl Into<String>, processor: impl Process) -> Self {
        self.stages.push(StageSpec::new(name, processor));
        self
    }

    /// Append a stage backed by a closure
    pub fn stage_fn<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&Request) -> std::result::Result<(), ProcessError> + Send + 'static,
    {
        self.stages.push(StageSpec::from_fn(name, func));
        self
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Choose whether shutdown also wakes idle workers
    pub fn with_shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.config.shutdown_mode = mode;
        self
    }

    /// Set the prefix of worker thread names
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Wire and start the pipeline
    pub fn build(self) -> Result<Pipeline> {
        Pipeline::build_with_config(self.stages, self.config)
    }
}

/// Handle onto the head of a running pipeline, cloneable across producer threads
#[derive(Debug, Clone)]
pub struct Entry {
    head: Arc<Stage>,
}

impl Entry {
    /// Fire-and-forget submission to the head stage
    pub fn submit(&self, request: impl Into<Request>) {
        self.head.submit(request.into());
    }
}

/// Reports a worker's exit and marks the stage terminated, including on panic
struct ExitGuard {
    index: usize,
    stage: Arc<Stage>,
    exits: Sender<usize>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.stage.mark_terminated();
        let _ = self.exits.send(self.index);
    }
}

/// A linear chain of stages, each with its own worker thread.
///
/// The head is the entry point. Dropping the pipeline does not join the
/// workers; a worker still suspended on an empty inbox is abandoned.
pub struct Pipeline {
    stages: Vec<Arc<Stage>>,
    handles: Vec<Option<JoinHandle<()>>>,
    exits: Receiver<usize>,
    exited: Vec<bool>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Build and start a pipeline from an ordered list of stages using the default config
    pub fn build(specs: impl IntoIterator<Item = StageSpec>) -> Result<Self> {
        Self::build_with_config(specs, PipelineConfig::default())
    }

    pub fn build_with_config(
        specs: impl IntoIterator<Item = StageSpec>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let specs: Vec<StageSpec> = specs.into_iter().collect();
        if specs.is_empty() {
            return Err(PipelineError::NoStages);
        }

        // Tail first, so each stage can be wired to its successor
        let mut next: Option<Arc<Stage>> = None;
        let mut wired = Vec::with_capacity(specs.len());
        for spec in specs.into_iter().rev() {
            let stage = Arc::new(Stage::new(spec.name, next.take(), config.latency_window));
            next = Some(Arc::clone(&stage));
            wired.push((stage, spec.processor));
        }
        wired.reverse();

        let (exit_tx, exit_rx) = unbounded();
        let mut pipeline = Pipeline {
            stages: wired.iter().map(|(stage, _)| Arc::clone(stage)).collect(),
            handles: Vec::with_capacity(wired.len()),
            exits: exit_rx,
            exited: vec![false; wired.len()],
            config,
        };

        for (index, (stage, processor)) in wired.into_iter().enumerate() {
            let guard = ExitGuard {
                index,
                stage: Arc::clone(&stage),
                exits: exit_tx.clone(),
            };
            let runner = StageRunner::new(Arc::clone(&stage), processor);

            let spawned = thread::Builder::new()
                .name(pipeline.config.thread_name(stage.name()))
                .spawn(move || {
                    let _guard = guard;
                    runner.run();
                });

            match spawned {
                Ok(handle) => pipeline.handles.push(Some(handle)),
                Err(source) => {
                    tracing::error!(stage = %stage.name(), error = %source, "failed to spawn worker");
                    // Release the workers already started
                    pipeline.stages[0].shutdown();
                    for started in &pipeline.stages[..index] {
                        started.interrupt();
                    }
                    return Err(PipelineError::Spawn {
                        stage: stage.name().to_string(),
                        source,
                    });
                }
            }
        }

        tracing::debug!(stages = ?pipeline.stage_names(), "pipeline started");
        Ok(pipeline)
    }

    fn head(&self) -> &Arc<Stage> {
        &self.stages[0]
    }

    /// Fire-and-forget submission to the head stage. Accepted even after shutdown.
    pub fn submit(&self, request: impl Into<Request>) {
        self.head().submit(request.into());
    }

    /// A cloneable submission handle for producer threads
    pub fn entry(&self) -> Entry {
        Entry {
            head: Arc::clone(self.head()),
        }
    }

    /// Signal every stage, head to tail. Returns without waiting.
    ///
    /// With [`ShutdownMode::Wake`] idle workers are also interrupted so they exit
    /// promptly; otherwise a worker on an empty inbox stays suspended.
    pub fn shutdown(&self) {
        self.head().shutdown();
        if self.config.shutdown_mode == ShutdownMode::Wake {
            for stage in &self.stages {
                stage.interrupt();
            }
        }
        tracing::debug!(mode = ?self.config.shutdown_mode, "shutdown signalled");
    }

    pub fn is_shutdown(&self) -> bool {
        self.head().is_finished()
    }

    /// Wait for every worker to exit, then join them.
    ///
    /// Never implied by [`shutdown`](Self::shutdown). Fails with
    /// [`PipelineError::Timeout`] naming the stages still alive at the deadline.
    pub fn await_termination(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while self.exited.iter().any(|exited| !exited) {
            match self.exits.recv_deadline(deadline) {
                Ok(index) => self.exited[index] = true,
                Err(_) => {
                    let pending = self
                        .stages
                        .iter()
                        .zip(&self.exited)
                        .filter(|(_, exited)| !**exited)
                        .map(|(stage, _)| stage.name().to_string())
                        .collect();
                    return Err(PipelineError::Timeout { pending });
                }
            }
        }

        let mut panicked = None;
        for (stage, handle) in self.stages.iter().zip(self.handles.iter_mut()) {
            if let Some(handle) = handle.take() {
                if handle.join().is_err() && panicked.is_none() {
                    panicked = Some(stage.name().to_string());
                }
            }
        }
        match panicked {
            Some(stage) => Err(PipelineError::WorkerPanicked { stage }),
            None => Ok(()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of stages in the chain
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage at `index`, head is 0
    pub fn stage(&self, index: usize) -> Option<&Arc<Stage>> {
        self.stages.get(index)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Arc<Stage>> {
        self.stages.iter()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Get metrics for a specific stage
    pub fn stage_metrics(&self, index: usize) -> Option<&StageMetrics> {
        self.stages.get(index).map(|stage| stage.metrics())
    }

    /// Get a summary of all metrics
    pub fn metrics_summary(&self) -> String {
        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for stage in &self.stages {
            summary.push_str(&format!(
                "  {} ({:?}, {} pending): {}\n",
                stage.name(),
                stage.state(),
                stage.pending(),
                stage.metrics().snapshot().format()
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::LogProcessor;
    use crate::StageState;

    #[test]
    fn test_no_stages_error() {
        let result = PipelineBuilder::new().build();
        assert!(matches!(result, Err(PipelineError::NoStages)));
    }

    #[test]
    fn test_wired_head_to_tail() {
        let pipeline = PipelineBuilder::new()
            .stage("pre", LogProcessor)
            .stage("print", LogProcessor)
            .stage("save", LogProcessor)
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["pre", "print", "save"]);
        let pre = pipeline.stage(0).unwrap();
        let print = pipeline.stage(1).unwrap();
        let save = pipeline.stage(2).unwrap();
        assert!(Arc::ptr_eq(pre.next().unwrap(), print));
        assert!(Arc::ptr_eq(print.next().unwrap(), save));
        assert!(save.next().is_none());
    }

    #[test]
    fn test_wake_mode_terminates_idle_workers() {
        let mut pipeline = PipelineBuilder::new()
            .stage("pre", LogProcessor)
            .stage("save", LogProcessor)
            .with_shutdown_mode(ShutdownMode::Wake)
            .build()
            .unwrap();

        pipeline.shutdown();
        pipeline
            .await_termination(Duration::from_secs(5))
            .expect("idle workers should exit in wake mode");
        assert!(pipeline
            .stages()
            .all(|stage| stage.state() == StageState::Terminated));
        // A second wait has nothing left to join
        assert!(pipeline.await_termination(Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn test_metrics_summary_names_stages() {
        let pipeline = PipelineBuilder::new()
            .stage("pre", LogProcessor)
            .build()
            .unwrap();
        let summary = pipeline.metrics_summary();
        assert!(summary.starts_with("Pipeline Metrics Summary:\n"));
        assert!(summary.contains("  pre ("));
    }
}
