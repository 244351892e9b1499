use crate::types::{GazeVector, FRESHNESS_WINDOW};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Clone, Copy)]
struct Sample {
    gaze: GazeVector,
    received_at: Instant,
}

/// Latest accepted gaze sample plus the monotonic instant it arrived.
///
/// Written by one feed thread, read by any number of consumer threads.
/// The lock only ever guards a small copy.
pub struct GazeSampleCache {
    latest: Mutex<Option<Sample>>,
}

impl GazeSampleCache {
    /// Create an empty cache. Until a sample arrives every query reports
    /// "unavailable", exactly as if the last sample had aged out.
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(None),
        }
    }

    /// Replace the stored sample. Vectors with a NaN component are dropped
    /// and leave the previous sample and timestamp untouched.
    ///
    /// Returns whether the sample was stored.
    pub fn record_sample(&self, gaze: GazeVector, at: Instant) -> bool {
        if gaze.has_nan() {
            return false;
        }
        *self.lock() = Some(Sample {
            gaze,
            received_at: at,
        });
        true
    }

    /// True iff the stored sample is younger than [`FRESHNESS_WINDOW`] at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.read_if_fresh(now).is_some()
    }

    /// The stored vector, if it is still fresh at `now`.
    pub fn read_if_fresh(&self, now: Instant) -> Option<GazeVector> {
        let sample = (*self.lock())?;
        (now.saturating_duration_since(sample.received_at) < FRESHNESS_WINDOW).then_some(sample.gaze)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Sample>> {
        // Sample is assigned whole, so a poisoned lock still holds a consistent value.
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for GazeSampleCache {
    fn default() -> Self {
        Self::new()
    }
}
