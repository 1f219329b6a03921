//! Pipeline configuration.

/// How [`Pipeline::shutdown`](crate::Pipeline::shutdown) treats idle workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Set every stage's flag and return. A worker suspended on an empty
    /// inbox stays suspended until another request arrives.
    #[default]
    Signal,
    /// Set every flag, then interrupt every worker so idle stages exit promptly.
    Wake,
}

/// Settings shared by every stage of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Shutdown behaviour
    pub shutdown_mode: ShutdownMode,
    /// Worker threads are named `<prefix>-<stage name>`
    pub thread_name_prefix: String,
    /// Number of latency samples kept per stage
    pub latency_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shutdown_mode: ShutdownMode::Signal,
            thread_name_prefix: "stage".to_string(),
            latency_window: 1000,
        }
    }
}

impl PipelineConfig {
    pub(crate) fn thread_name(&self, stage: &str) -> String {
        format!("{}-{}", self.thread_name_prefix, stage)
    }
}
