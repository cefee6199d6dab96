//! Per-endpoint rolling windows of request durations.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use super::Sample;

/// Samples kept per endpoint. Writes past this overwrite the oldest slot.
pub const WINDOW_CAPACITY: usize = 100;

// ─── EndpointWindow ──────────────────────────────────────────────

/// Fixed-capacity ring buffer of recent durations for one endpoint key.
///
/// `total_count` is monotonic and independent of the buffer: it counts
/// every sample ever recorded, while the buffer holds only the most
/// recent `min(total_count, WINDOW_CAPACITY)` of them.
#[derive(Debug)]
struct EndpointWindow {
    samples: Vec<f64>,
    cursor: usize,
    total_count: u64,
}

impl EndpointWindow {
    fn new() -> Self {
        Self {
            samples: Vec::with_capacity(WINDOW_CAPACITY),
            cursor: 0,
            total_count: 0,
        }
    }

    fn push(&mut self, duration_ms: f64) {
        if self.samples.len() < WINDOW_CAPACITY {
            self.samples.push(duration_ms);
        } else {
            self.samples[self.cursor] = duration_ms;
        }
        self.cursor = (self.cursor + 1) % WINDOW_CAPACITY;
        self.total_count += 1;
    }

    fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            samples: self.samples.clone(),
            total_count: self.total_count,
        }
    }
}

// ─── Public types ────────────────────────────────────────────────

/// An owned copy of one window, detached from the live buffer.
/// Safe to iterate and sort without holding any lock. Slot order is
/// not chronological; aggregates do not depend on it.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub samples: Vec<f64>,
    pub total_count: u64,
}

/// Thread-safe store of all endpoint windows.
///
/// The hot path (`record`) takes a shard read lock to fetch the window's
/// `Arc`, then a short per-key mutex for the buffer write. Contention on
/// one endpoint never serializes writes to another. Constructed once at
/// process start and injected wherever samples are produced or read.
pub struct SampleRecorder {
    windows: DashMap<String, Arc<Mutex<EndpointWindow>>>,
}

impl SampleRecorder {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Record one observation. Never blocks on I/O; the critical section
    /// is a single ring-buffer write.
    pub fn record(&self, sample: Sample) {
        let window = if let Some(entry) = self.windows.get(&sample.endpoint_key) {
            Arc::clone(entry.value())
        } else {
            Arc::clone(
                self.windows
                    .entry(sample.endpoint_key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(EndpointWindow::new())))
                    .value(),
            )
        };

        window.lock().push(sample.duration_ms);
        trace!(
            endpoint = %sample.endpoint_key,
            duration_ms = sample.duration_ms,
            observed_at = %sample.observed_at,
            "sample recorded"
        );
    }

    /// Stable copy of one endpoint's current buffer, or `None` if the
    /// key has never been observed.
    pub fn snapshot(&self, endpoint_key: &str) -> Option<WindowSnapshot> {
        self.windows
            .get(endpoint_key)
            .map(|entry| entry.value().lock().snapshot())
    }

    /// All endpoint keys observed so far, in arbitrary order.
    pub fn endpoint_keys(&self) -> Vec<String> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────
