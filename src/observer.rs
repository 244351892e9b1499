//! Observation hooks for feed lifecycle and sample flow.
//!
//! Trackers report through an injected [`GazeObserver`] instead of a global
//! trace provider, so tests can count events without a logging backend.

use crate::types::{FeedIdentity, GazeVector};
use crate::GazeError;
use std::sync::Arc;

/// Receives feed events. All methods default to no-ops.
///
/// Called from feed threads; implementations must be cheap and must not block.
pub trait GazeObserver: Send + Sync {
    /// Construction of a feed failed and the feed will not be used.
    fn feed_unavailable(&self, _feed: FeedIdentity, _error: &GazeError) {}

    /// The background thread entered its loop.
    fn worker_started(&self, _feed: FeedIdentity) {}

    /// The background thread left its loop.
    fn worker_stopped(&self, _feed: FeedIdentity) {}

    /// A sample was written to the cache.
    fn sample_accepted(&self, _feed: FeedIdentity, _gaze: GazeVector) {}

    /// A received message could not be decoded and was skipped.
    fn message_malformed(&self, _feed: FeedIdentity, _error: &GazeError) {}
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl GazeObserver for LogObserver {
    fn feed_unavailable(&self, feed: FeedIdentity, error: &GazeError) {
        log::info!("{} eye tracker not available: {}", feed, error);
    }

    fn worker_started(&self, feed: FeedIdentity) {
        log::info!("{} reader started", feed);
    }

    fn worker_stopped(&self, feed: FeedIdentity) {
        log::info!("{} reader stopped", feed);
    }

    fn sample_accepted(&self, feed: FeedIdentity, gaze: GazeVector) {
        log::trace!("{} gaze {}", feed, gaze);
    }

    fn message_malformed(&self, feed: FeedIdentity, error: &GazeError) {
        log::warn!("{} dropped message: {}", feed, error);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl GazeObserver for NullObserver {}

/// The observer used when the caller does not supply one.
pub fn default_observer() -> Arc<dyn GazeObserver> {
    Arc::new(LogObserver)
}
