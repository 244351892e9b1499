//! C FFI layer for gazefeed.
//!
//! Provides an opaque handle-based API for C/C++ hosts.
//! The generated C header is written to `include/gazefeed.h` by cbindgen.

use crate::error::LastError;
use crate::observer::default_observer;
use crate::tracker::{self, EyeTracker};
use crate::types::{FeedIdentity, FeedSet, GazeVector};
use crate::GazeError;
use std::ffi::{c_char, c_int};
use std::time::Instant;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque tracker handle for C consumers.
pub struct GzTracker(Box<dyn EyeTracker>);

/// Create a tracker for one feed (0 = PSVR2 Toolkit IPC, 1 = VRChat OSC).
/// Returns NULL if the feed is unavailable (check gz_last_error()).
#[no_mangle]
pub extern "C" fn gz_create_tracker(feed: c_int) -> *mut GzTracker {
    let Some(feed) = FeedIdentity::from_raw(feed) else {
        LAST_ERROR.set(&GazeError::UnknownFeed(feed));
        return std::ptr::null_mut();
    };
    LAST_ERROR.clear();
    into_handle(tracker::try_create_tracker(feed, &default_observer()))
}

/// Create the first available tracker among the feeds in `mask`
/// (bit 0 = IPC, bit 1 = OSC). Returns NULL if none is available
/// (check gz_last_error()).
#[no_mangle]
pub extern "C" fn gz_select_tracker(mask: u32) -> *mut GzTracker {
    LAST_ERROR.clear();
    into_handle(tracker::try_select_tracker(
        FeedSet::from_bits_truncate(mask),
        &default_observer(),
    ))
}

fn into_handle(result: crate::Result<Box<dyn EyeTracker>>) -> *mut GzTracker {
    match result {
        Ok(t) => Box::into_raw(Box::new(GzTracker(t))),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Start the tracker's background reader. Returns 0 on success, -1 on error.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gz_tracker_start(tracker: *mut GzTracker) -> c_int {
    if tracker.is_null() {
        return -1;
    }
    let tracker = &mut *tracker;
    match tracker.0.start() {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Stop the tracker's background reader and wait for it to exit.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gz_tracker_stop(tracker: *mut GzTracker) {
    if !tracker.is_null() {
        (*tracker).0.stop();
    }
}

/// Whether a fresh gaze sample is available now.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gz_tracker_is_gaze_available(tracker: *const GzTracker) -> bool {
    if tracker.is_null() {
        return false;
    }
    (*tracker).0.is_gaze_available(Instant::now())
}

/// Write the latest gaze direction to `out` if fresh. Returns false and
/// leaves `out` untouched otherwise.
///
/// # Safety
/// `tracker` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn gz_tracker_get_gaze(tracker: *const GzTracker, out: *mut GazeVector) -> bool {
    if tracker.is_null() || out.is_null() {
        return false;
    }
    match (*tracker).0.gaze(Instant::now()) {
        Some(gaze) => {
            out.write(gaze);
            true
        }
        None => false,
    }
}

/// Feed of the tracker, or -1 for a null handle.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gz_tracker_feed(tracker: *const GzTracker) -> c_int {
    if tracker.is_null() {
        return -1;
    }
    (*tracker).0.feed() as c_int
}

/// Stop a tracker and free its resources.
///
/// # Safety
/// `tracker` must be a pointer returned by `gz_create_tracker` or
/// `gz_select_tracker`, or null.
#[no_mangle]
pub unsafe extern "C" fn gz_destroy_tracker(tracker: *mut GzTracker) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next gazefeed API call.
#[no_mangle]
pub extern "C" fn gz_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
