use crate::error::ProcessError;
use crate::inbox::{Inbox, Taken};
use crate::metrics::StageMetrics;
use crate::request::Request;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The local effect a stage applies to each request
pub trait Process: Send + 'static {
    /// Handle one request. An error drops the request at this stage.
    fn process(&mut self, request: &Request) -> Result<(), ProcessError>;

    /// Called on the worker thread before the first take
    fn on_start(&mut self) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Called on the worker thread after the loop exits
    fn on_shutdown(&mut self) -> Result<(), ProcessError> {
        Ok(())
    }
}

impl Process for Box<dyn Process> {
    fn process(&mut self, request: &Request) -> Result<(), ProcessError> {
        (**self).process(request)
    }

    fn on_start(&mut self) -> Result<(), ProcessError> {
        (**self).on_start()
    }

    fn on_shutdown(&mut self) -> Result<(), ProcessError> {
        (**self).on_shutdown()
    }
}

/// Logs every request at info level inside the stage's span
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProcessor;

impl Process for LogProcessor {
    fn process(&mut self, request: &Request) -> Result<(), ProcessError> {
        tracing::info!("{request}");
        Ok(())
    }
}

/// A processor backed by a closure
pub struct FnProcessor<F>
where
    F: FnMut(&Request) -> Result<(), ProcessError> + Send + 'static,
{
    func: F,
}

impl<F> FnProcessor<F>
where
    F: FnMut(&Request) -> Result<(), ProcessError> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Process for FnProcessor<F>
where
    F: FnMut(&Request) -> Result<(), ProcessError> + Send + 'static,
{
    fn process(&mut self, request: &Request) -> Result<(), ProcessError> {
        (self.func)(request)
    }
}

/// Lifecycle of a stage's worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StageState {
    /// Wired into the chain, worker not yet running
    Constructed = 0,
    /// Worker is taking and processing requests
    Running = 1,
    /// Shutdown flag set; worker exits after its current take completes
    ShutdownSignalled = 2,
    /// Worker loop has returned
    Terminated = 3,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StageState::Constructed,
            1 => StageState::Running,
            2 => StageState::ShutdownSignalled,
            _ => StageState::Terminated,
        }
    }
}

/// One link of the chain: an inbox, a shutdown flag and an optional successor.
///
/// Stages are peers owned by the pipeline; `next` is an association used for
/// forwarding and shutdown propagation only.
#[derive(Debug)]
pub struct Stage {
    name: String,
    inbox: Inbox,
    next: Option<Arc<Stage>>,
    finished: AtomicBool,
    state: AtomicU8,
    metrics: StageMetrics,
}

impl Stage {
    /// Create a stage wired to `next`
    pub fn new(name: impl Into<String>, next: Option<Arc<Stage>>, latency_window: usize) -> Self {
        Self {
            name: name.into(),
            inbox: Inbox::new(),
            next,
            finished: AtomicBool::new(false),
            state: AtomicU8::new(StageState::Constructed as u8),
            metrics: StageMetrics::with_window(latency_window),
        }
    }

    /// Diagnostic label of this stage
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The successor, if any
    pub fn next(&self) -> Option<&Arc<Stage>> {
        self.next.as_ref()
    }

    /// Counters and latency window for this stage
    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Requests waiting in the inbox
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Total requests ever accepted into the inbox
    pub fn accepted(&self) -> u64 {
        self.inbox.accepted()
    }

    /// Append a request to this stage's inbox.
    ///
    /// The shutdown flag is not consulted: a request submitted after shutdown is
    /// accepted and may be processed or stranded.
    pub fn submit(&self, request: Request) {
        self.inbox.push(request);
    }

    /// Signal this stage and every successor to stop.
    ///
    /// Returns immediately. Does not drain the inbox, wake the worker or wait for it.
    pub fn shutdown(&self) {
        self.finished.store(true, Ordering::Release);
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state != StageState::Terminated as u8)
                    .then_some(StageState::ShutdownSignalled as u8)
            });
        if let Some(next) = &self.next {
            next.shutdown();
        }
    }

    /// Wake the worker if it is suspended on an empty inbox
    pub fn interrupt(&self) {
        self.inbox.interrupt();
    }

    /// Whether the shutdown flag has been set
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Current lifecycle state of the worker
    pub fn state(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn mark_running(&self) {
        let _ = self.state.compare_exchange(
            StageState::Constructed as u8,
            StageState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn mark_terminated(&self) {
        self.state
            .store(StageState::Terminated as u8, Ordering::Release);
    }
}

/// Drives one stage: take, process, forward, until shutdown is observed
pub struct StageRunner {
    stage: Arc<Stage>,
    processor: Box<dyn Process>,
}

impl StageRunner {
    pub fn new(stage: Arc<Stage>, processor: Box<dyn Process>) -> Self {
        Self { stage, processor }
    }

    /// Run the worker loop on the current thread.
    /// Blocks until the shutdown flag is observed after a take completes.
    pub fn run(mut self) {
        let span = tracing::info_span!("stage", stage = %self.stage.name());
        let _enter = span.enter();

        self.stage.mark_running();
        tracing::debug!("worker starting");
        if let Err(err) = self.processor.on_start() {
            tracing::warn!(error = %err, "start hook failed");
        }

        while !self.stage.is_finished() {
            match self.stage.inbox.take() {
                Taken::Request(request) => self.handle(request),
                Taken::Interrupted => {
                    self.stage.metrics.record_interrupt();
                    if self.stage.is_finished() {
                        break;
                    }
                    tracing::debug!("interrupted while running, resuming take");
                }
            }
        }

        if let Err(err) = self.processor.on_shutdown() {
            tracing::warn!(error = %err, "shutdown hook failed");
        }
        self.stage.mark_terminated();
        tracing::debug!(pending = self.stage.pending(), "worker exiting");
    }

    fn handle(&mut self, request: Request) {
        let metrics = &self.stage.metrics;
        let processor = &mut self.processor;
        let start = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| processor.process(&request)))
            .unwrap_or_else(|payload| Err(ProcessError::Panicked(panic_message(&*payload))));

        match outcome {
            Ok(()) => {
                metrics.record_latency(start.elapsed().as_nanos() as u64);
                metrics.record_processed();
                if let Some(next) = &self.stage.next {
                    metrics.record_forwarded();
                    next.submit(request);
                }
            }
            Err(err) => {
                metrics.record_failed();
                tracing::warn!(request = %request, error = %err, "processing failed, request dropped");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn chain(names: &[&str]) -> Vec<Arc<Stage>> {
        let mut next = None;
        let mut stages = Vec::new();
        for name in names.iter().rev() {
            let stage = Arc::new(Stage::new(*name, next.take(), 16));
            next = Some(Arc::clone(&stage));
            stages.push(stage);
        }
        stages.reverse();
        stages
    }

    #[test]
    fn test_shutdown_propagates_tailward() {
        let stages = chain(&["pre", "print", "save"]);
        assert!(stages.iter().all(|s| !s.is_finished()));

        stages[1].shutdown();
        assert!(!stages[0].is_finished());
        assert!(stages[1].is_finished());
        assert!(stages[2].is_finished());
        assert_eq!(stages[2].state(), StageState::ShutdownSignalled);

        stages[0].shutdown();
        assert!(stages.iter().all(|s| s.is_finished()));
    }

    #[test]
    fn test_submit_after_shutdown_is_accepted() {
        let stages = chain(&["only"]);
        stages[0].shutdown();
        stages[0].submit(Request::new("late"));
        assert_eq!(stages[0].pending(), 1);
        assert_eq!(stages[0].accepted(), 1);
    }

    #[test]
    fn test_runner_forwards_and_drops_failures() {
        let stages = chain(&["first", "second"]);
        let processor = FnProcessor::new(|request: &Request| {
            if request.name() == "bad" {
                Err(ProcessError::rejected("bad input"))
            } else {
                Ok(())
            }
        });
        let runner = StageRunner::new(Arc::clone(&stages[0]), Box::new(processor));
        let handle = thread::spawn(move || runner.run());

        for name in ["a", "bad", "c"] {
            stages[0].submit(Request::new(name));
        }

        let downstream = &stages[1].inbox;
        assert_eq!(downstream.take(), Taken::Request(Request::new("a")));
        assert_eq!(downstream.take(), Taken::Request(Request::new("c")));

        let metrics = stages[0].metrics();
        assert_eq!(metrics.total_processed(), 2);
        assert_eq!(metrics.total_failed(), 1);
        assert_eq!(metrics.total_forwarded(), 2);

        stages[0].shutdown();
        stages[0].interrupt();
        handle.join().unwrap();
    }

    #[test]
    fn test_panicking_processor_does_not_kill_worker() {
        let stages = chain(&["fragile"]);
        let (tx, rx) = mpsc::channel();
        let processor = FnProcessor::new(move |request: &Request| {
            if request.name() == "boom" {
                panic!("boom");
            }
            tx.send(request.clone()).ok();
            Ok(())
        });
        let runner = StageRunner::new(Arc::clone(&stages[0]), Box::new(processor));
        let handle = thread::spawn(move || runner.run());

        stages[0].submit(Request::new("boom"));
        stages[0].submit(Request::new("after"));
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen.name(), "after");
        assert_eq!(stages[0].metrics().total_failed(), 1);

        stages[0].shutdown();
        stages[0].interrupt();
        handle.join().unwrap();
    }

    #[test]
    fn test_interrupt_without_shutdown_resumes() {
        let stages = chain(&["resilient"]);
        let (tx, rx) = mpsc::channel();
        let processor = FnProcessor::new(move |request: &Request| {
            tx.send(request.clone()).ok();
            Ok(())
        });
        let runner = StageRunner::new(Arc::clone(&stages[0]), Box::new(processor));
        let handle = thread::spawn(move || runner.run());

        stages[0].interrupt();
        stages[0].submit(Request::new("still-alive"));
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen.name(), "still-alive");
        assert_eq!(stages[0].state(), StageState::Running);
        assert_eq!(stages[0].metrics().total_interrupts(), 1);

        stages[0].shutdown();
        stages[0].interrupt();
        handle.join().unwrap();
    }

    #[test]
    fn test_state_terminated_once_run_returns() {
        let stages = chain(&["direct"]);
        let processor = FnProcessor::new(|_: &Request| Ok(()));
        let runner = StageRunner::new(Arc::clone(&stages[0]), Box::new(processor));
        let handle = thread::spawn(move || runner.run());

        stages[0].submit(Request::new("a"));
        stages[0].shutdown();
        stages[0].interrupt();
        handle.join().unwrap();
        assert_eq!(stages[0].state(), StageState::Terminated);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
    }
}
