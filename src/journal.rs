//! An observable, in-memory sink for processed requests.
//!
//! [`Journal`] is shared between stages and observers. [`RecordingProcessor`]
//! appends to it, and observers block on [`Journal::wait_for`] instead of
//! sleeping for an arbitrary amount of time.

use crate::error::ProcessError;
use crate::request::Request;
use crate::stage::Process;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One observation: which stage saw which request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub stage: String,
    pub request: Request,
}

#[derive(Debug, Default)]
struct JournalInner {
    entries: Mutex<Vec<Entry>>,
    changed: Condvar,
}

/// Cloneable handle onto a shared list of observations
#[derive(Debug, Clone, Default)]
pub struct Journal {
    inner: Arc<JournalInner>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation and wake any waiters
    pub fn record(&self, stage: impl Into<String>, request: Request) {
        self.inner.entries.lock().push(Entry {
            stage: stage.into(),
            request,
        });
        self.inner.changed.notify_all();
    }

    /// All observations in recording order
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.entries.lock().clone()
    }

    /// Request names observed by one stage, in order
    pub fn names_at(&self, stage: &str) -> Vec<String> {
        self.inner
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.stage == stage)
            .map(|entry| entry.request.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until `predicate` holds over the entries or `timeout` elapses.
    /// Returns whether the predicate held.
    pub fn wait_for<P>(&self, timeout: Duration, mut predicate: P) -> bool
    where
        P: FnMut(&[Entry]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut entries = self.inner.entries.lock();
        loop {
            if predicate(&entries) {
                return true;
            }
            if self
                .inner
                .changed
                .wait_until(&mut entries, deadline)
                .timed_out()
            {
                return predicate(&entries);
            }
        }
    }

    /// Block until `stage` has recorded at least `count` requests
    pub fn wait_for_count(&self, stage: &str, count: usize, timeout: Duration) -> bool {
        self.wait_for(timeout, |entries| {
            entries.iter().filter(|entry| entry.stage == stage).count() >= count
        })
    }
}

/// Records every request it sees into a [`Journal`] under a fixed label
#[derive(Debug, Clone)]
pub struct RecordingProcessor {
    label: String,
    journal: Journal,
}

impl RecordingProcessor {
    pub fn new(label: impl Into<String>, journal: Journal) -> Self {
        Self {
            label: label.into(),
            journal,
        }
    }
}

impl Process for RecordingProcessor {
    fn process(&mut self, request: &Request) -> Result<(), ProcessError> {
        tracing::info!("{request}");
        self.journal.record(self.label.clone(), request.clone());
        Ok(())
    }
}
