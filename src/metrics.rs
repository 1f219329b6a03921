use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window of latency samples, in nanoseconds
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: Arc<Mutex<VecDeque<u64>>>,
    capacity: usize,
}

impl LatencyWindow {
    /// Create a window holding at most `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Record a sample, evicting the oldest once the window is full
    pub fn record(&self, nanos: u64) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(nanos);
    }

    pub fn p50_us(&self) -> f64 {
        self.percentile_us(0.50)
    }

    pub fn p95_us(&self) -> f64 {
        self.percentile_us(0.95)
    }

    pub fn p99_us(&self) -> f64 {
        self.percentile_us(0.99)
    }

    fn percentile_us(&self, p: f64) -> f64 {
        let mut samples: Vec<u64> = self.samples.lock().iter().copied().collect();
        if samples.is_empty() {
            return 0.0;
        }

        let rank = ((samples.len() as f64 * p).ceil() as usize).saturating_sub(1);
        let (_, nth, _) = samples.select_nth_unstable(rank);
        *nth as f64 / 1000.0
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-stage metrics collector
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Number of requests the processor accepted
    requests_processed: Arc<AtomicU64>,
    /// Number of requests dropped because the processor failed
    requests_failed: Arc<AtomicU64>,
    /// Number of requests handed to the successor
    requests_forwarded: Arc<AtomicU64>,
    /// Number of interrupted takes
    interrupts: Arc<AtomicU64>,
    /// Processing latency window (p50, p95, p99)
    latency: LatencyWindow,
    /// Creation time for throughput calculation
    start_time: Instant,
}

impl StageMetrics {
    /// Create a new metrics collector with a 1000-sample latency window
    pub fn new() -> Self {
        Self::with_window(1000)
    }

    /// Create a new metrics collector with a custom latency window
    pub fn with_window(latency_window: usize) -> Self {
        Self {
            requests_processed: Arc::new(AtomicU64::new(0)),
            requests_failed: Arc::new(AtomicU64::new(0)),
            requests_forwarded: Arc::new(AtomicU64::new(0)),
            interrupts: Arc::new(AtomicU64::new(0)),
            latency: LatencyWindow::new(latency_window),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully processed request
    pub fn record_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request dropped by a processing failure
    pub fn record_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request forwarded to the next stage
    pub fn record_forwarded(&self) {
        self.requests_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an interrupted take
    pub fn record_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a latency measurement in nanoseconds
    pub fn record_latency(&self, nanos: u64) {
        self.latency.record(nanos);
    }

    pub fn total_processed(&self) -> u64 {
        self.requests_processed.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn total_forwarded(&self) -> u64 {
        self.requests_forwarded.load(Ordering::Relaxed)
    }

    pub fn total_interrupts(&self) -> u64 {
        self.interrupts.load(Ordering::Relaxed)
    }

    /// Calculate current throughput in requests per second
    pub fn throughput_rps(&self) -> f64 {
        let elapsed = self.start_time.elapsed();
        let total = self.total_processed();
        if elapsed.as_secs_f64() == 0.0 {
            0.0
        } else {
            total as f64 / elapsed.as_secs_f64()
        }
    }

    /// Get P50 latency in microseconds
    pub fn latency_p50_us(&self) -> f64 {
        self.latency.p50_us()
    }

    /// Get P95 latency in microseconds
    pub fn latency_p95_us(&self) -> f64 {
        self.latency.p95_us()
    }

    /// Get P99 latency in microseconds
    pub fn latency_p99_us(&self) -> f64 {
        self.latency.p99_us()
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_processed: self.total_processed(),
            total_failed: self.total_failed(),
            total_forwarded: self.total_forwarded(),
            total_interrupts: self.total_interrupts(),
            throughput_rps: self.throughput_rps(),
            latency_p50_us: self.latency_p50_us(),
            latency_p95_us: self.latency_p95_us(),
            latency_p99_us: self.latency_p99_us(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_forwarded: u64,
    pub total_interrupts: u64,
    pub throughput_rps: f64,
    pub latency_p50_us: f64,
    pub latency_p95_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Processed: {}, Failed: {}, Forwarded: {}, Interrupts: {}, \
             Throughput: {:.2} req/s, Latency P50: {:.2}µs, P95: {:.2}µs, P99: {:.2}µs, \
             Elapsed: {:.2}s",
            self.total_processed,
            self.total_failed,
            self.total_forwarded,
            self.total_interrupts,
            self.throughput_rps,
            self.latency_p50_us,
            self.latency_p95_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}
