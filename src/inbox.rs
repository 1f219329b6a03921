use crate::request::Request;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Item carried through an inbox channel
#[derive(Debug)]
enum Envelope {
    Request(Request),
    Wake,
}

/// Outcome of a blocking take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Taken {
    /// The next pending request
    Request(Request),
    /// The consumer was interrupted before a request arrived
    Interrupted,
}

/// An unbounded multi-producer FIFO with a blocking take.
///
/// Both channel ends live in the inbox, so the channel never disconnects and a
/// push always succeeds, even after the consumer has stopped taking.
#[derive(Debug)]
pub struct Inbox {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
    accepted: Arc<AtomicU64>,
    /// Requests enqueued but not yet taken; wake tokens are not counted
    pending: Arc<AtomicUsize>,
}

impl Clone for Inbox {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            accepted: Arc::clone(&self.accepted),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl Inbox {
    /// Create an empty inbox
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            accepted: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Append a request. Never blocks.
    pub fn push(&self, request: Request) {
        // Counted before the send so a take can never decrement below zero
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.enqueue(Envelope::Request(request));
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Wake the consumer. Requests already pending are taken first.
    pub fn interrupt(&self) {
        self.enqueue(Envelope::Wake);
    }

    fn enqueue(&self, envelope: Envelope) {
        // The inbox owns a receiver, so the channel cannot be disconnected.
        if let Err(err) = self.sender.send(envelope) {
            tracing::error!(item = ?err.into_inner(), "inbox channel disconnected");
        }
    }

    /// Block until a request is available or the consumer is interrupted
    pub fn take(&self) -> Taken {
        match self.receiver.recv() {
            Ok(envelope) => self.open(envelope),
            Err(_) => Taken::Interrupted,
        }
    }

    /// Take without blocking
    pub fn try_take(&self) -> Option<Taken> {
        self.receiver
            .try_recv()
            .ok()
            .map(|envelope| self.open(envelope))
    }

    fn open(&self, envelope: Envelope) -> Taken {
        match envelope {
            Envelope::Request(request) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                Taken::Request(request)
            }
            Envelope::Wake => Taken::Interrupted,
        }
    }

    /// Number of requests waiting to be taken. Wake tokens are not counted.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Check if no request is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of requests ever accepted
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}
