pub mod aggregate;
pub mod broadcast;
pub mod recorder;
pub mod snapshot;

pub use broadcast::MetricsBroadcaster;
pub use recorder::SampleRecorder;
pub use snapshot::SnapshotBuilder;

use chrono::{DateTime, Utc};

/// A single timing observation for one finished request.
/// This is the "write" side: the interceptor creates these and pushes
/// them into the [`SampleRecorder`].
#[derive(Debug, Clone)]
pub struct Sample {
    /// Normalized route template, e.g. "GET /api/transactions/:id"
    pub endpoint_key: String,
    /// Handler wall time in milliseconds
    pub duration_ms: f64,
    /// When the request finished
    pub observed_at: DateTime<Utc>,
}

impl Sample {
    pub fn new(endpoint_key: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            endpoint_key: endpoint_key.into(),
            duration_ms,
            observed_at: Utc::now(),
        }
    }
}
