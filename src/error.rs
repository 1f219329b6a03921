use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or tearing down a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No stages in pipeline
    #[error("Cannot build pipeline with no stages")]
    NoStages,

    /// The worker thread for a stage could not be spawned
    #[error("Failed to spawn worker for stage '{stage}': {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    /// Workers were still alive when the termination deadline passed
    #[error("Workers still running after timeout: {}", pending.join(", "))]
    Timeout { pending: Vec<String> },

    /// A worker thread died by panic outside of request processing
    #[error("Worker for stage '{stage}' panicked")]
    WorkerPanicked { stage: String },
}

/// Failure raised by a stage's processor for a single request.
///
/// The worker logs it and drops the request at that stage.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The processor refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The processor panicked while handling the request
    #[error("processor panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProcessError {
    /// Shorthand for [`ProcessError::Rejected`]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_lists_pending_stages() {
        let err = PipelineError::Timeout {
            pending: vec!["print".into(), "save".into()],
        };
        assert_eq!(
            err.to_string(),
            "Workers still running after timeout: print, save"
        );
    }

    #[test]
    fn test_process_error_from_boxed() {
        let boxed: Box<dyn std::error::Error + Send + Sync> = "disk full".into();
        let err = ProcessError::from(boxed);
        assert!(matches!(err, ProcessError::Other(_)));
        assert_eq!(err.to_string(), "disk full");
    }
}
