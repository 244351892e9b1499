//! The contract every feed implements, and the factories a host uses to
//! obtain one.

use crate::config::{DeviceConfig, OscConfig};
use crate::device::DeviceIpcTracker;
use crate::network::OscTracker;
use crate::observer::GazeObserver;
use crate::types::{FeedIdentity, FeedSet, GazeVector};
use crate::{GazeError, Result};
use std::sync::Arc;
use std::time::Instant;

/// A source of the latest gaze direction.
///
/// Only the constructor and [`EyeTracker::stop`] may block; queries take a
/// short lock around a copy and return immediately.
pub trait EyeTracker: Send + Sync {
    /// Spawn the background reader. Fails on a second call, or after `stop`.
    fn start(&mut self) -> Result<()>;

    /// Stop and join the background reader. Later calls do nothing.
    fn stop(&mut self);

    /// True if a sample younger than the freshness window exists at `now`.
    fn is_gaze_available(&self, now: Instant) -> bool;

    /// The latest gaze direction, if fresh at `now`.
    fn gaze(&self, now: Instant) -> Option<GazeVector>;

    fn feed(&self) -> FeedIdentity;
}

fn as_unavailable(feed: FeedIdentity, e: GazeError) -> GazeError {
    match e {
        e @ GazeError::FeedUnavailable { .. } => e,
        other => GazeError::unavailable(feed, other),
    }
}

fn report<T: EyeTracker + 'static>(
    feed: FeedIdentity,
    result: Result<T>,
    observer: &Arc<dyn GazeObserver>,
) -> Result<Box<dyn EyeTracker>> {
    match result {
        Ok(tracker) => Ok(Box::new(tracker)),
        Err(e) => {
            let e = as_unavailable(feed, e);
            observer.feed_unavailable(feed, &e);
            Err(e)
        }
    }
}

/// Connect to the PSVR2 Toolkit IPC server, or `None` if it is not there.
pub fn create_device_ipc_tracker(
    config: DeviceConfig,
    observer: Arc<dyn GazeObserver>,
) -> Option<Box<dyn EyeTracker>> {
    let result = DeviceIpcTracker::connect(config, observer.clone());
    report(FeedIdentity::DeviceIpc, result, &observer).ok()
}

/// Bind the OSC listener, or `None` if the port cannot be bound.
pub fn create_osc_tracker(
    config: OscConfig,
    observer: Arc<dyn GazeObserver>,
) -> Option<Box<dyn EyeTracker>> {
    let result = OscTracker::bind(config, observer.clone());
    report(FeedIdentity::NetworkOsc, result, &observer).ok()
}

/// Like [`create_tracker`], keeping the [`GazeError::FeedUnavailable`] reason.
pub(crate) fn try_create_tracker(
    feed: FeedIdentity,
    observer: &Arc<dyn GazeObserver>,
) -> Result<Box<dyn EyeTracker>> {
    match feed {
        FeedIdentity::DeviceIpc => {
            let result = DeviceIpcTracker::connect(DeviceConfig::from_env(), observer.clone());
            report(feed, result, observer)
        }
        FeedIdentity::NetworkOsc => {
            let result = OscTracker::bind(OscConfig::from_env(), observer.clone());
            report(feed, result, observer)
        }
    }
}

/// Construct `feed` with its environment-derived configuration.
pub fn create_tracker(
    feed: FeedIdentity,
    observer: Arc<dyn GazeObserver>,
) -> Option<Box<dyn EyeTracker>> {
    try_create_tracker(feed, &observer).ok()
}

/// Like [`select_tracker`]; on failure returns the last feed's error, or
/// [`GazeError::NoFeedEnabled`] for an empty set.
pub(crate) fn try_select_tracker(
    feeds: FeedSet,
    observer: &Arc<dyn GazeObserver>,
) -> Result<Box<dyn EyeTracker>> {
    let mut last_err = GazeError::NoFeedEnabled;
    for feed in feeds.in_priority_order() {
        match try_create_tracker(feed, observer) {
            Ok(tracker) => {
                log::info!("Using eye tracking: {}", feed);
                return Ok(tracker);
            }
            Err(e) => last_err = e,
        }
    }
    log::info!("No supported eye tracking feed found");
    Err(last_err)
}

/// Try each enabled feed in priority order and return the first one that
/// constructs.
pub fn select_tracker(
    feeds: FeedSet,
    observer: Arc<dyn GazeObserver>,
) -> Option<Box<dyn EyeTracker>> {
    try_select_tracker(feeds, &observer).ok()
}
