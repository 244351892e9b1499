//! # gazefeed - latest-gaze ingestion for eye tracking feeds
//!
//! Keeps a continuously refreshed "latest gaze direction" from one external
//! feed and answers non-blocking, freshness-gated queries. Provides:
//! - PSVR2 Toolkit IPC feed (loopback TCP, versioned handshake, binary frames)
//! - VRChat-style OSC feed (UDP, `/tracking/eye/LeftRightPitchYaw`)
//! - Factories that return "no tracker" instead of an error
//! - C FFI for integration with C/C++ hosts
//!
//! ## Quick Start
//! ```no_run
//! use gazefeed::{select_tracker, FeedSet, LogObserver};
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! let mut tracker = select_tracker(FeedSet::all(), Arc::new(LogObserver)).unwrap();
//! tracker.start().unwrap();
//! if let Some(gaze) = tracker.gaze(Instant::now()) {
//!     println!("gaze: {}", gaze);
//! }
//! tracker.stop();
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod observer;
pub mod cache;
pub mod protocol;
pub mod osc;
mod worker;
pub mod device;
pub mod network;
pub mod tracker;
pub mod ffi;

pub use cache::GazeSampleCache;
pub use config::{DeviceConfig, OscConfig};
pub use device::DeviceIpcTracker;
pub use error::GazeError;
pub use network::OscTracker;
pub use observer::{GazeObserver, LogObserver, NullObserver};
pub use tracker::{create_device_ipc_tracker, create_osc_tracker, create_tracker, select_tracker, EyeTracker};
pub use types::*;

/// Result type alias for gazefeed operations.
pub type Result<T> = std::result::Result<T, GazeError>;
