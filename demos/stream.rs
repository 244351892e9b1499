//! Print the combined gaze direction from the first available feed.
//!
//! Usage: cargo run --example stream
//! Feeds are tried in order (PSVR2 Toolkit IPC, then OSC on port 9000);
//! restrict them with GAZEFEED_FEEDS=osc or GAZEFEED_FEEDS=device.
//! Press Ctrl+C to stop.

use gazefeed::config::feeds_from_env;
use gazefeed::{select_tracker, FeedSet, LogObserver};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let feeds = feeds_from_env(FeedSet::all());
    let mut tracker = match select_tracker(feeds, Arc::new(LogObserver)) {
        Some(t) => t,
        None => {
            eprintln!("No eye tracking feed available ({:?})", feeds);
            std::process::exit(1);
        }
    };

    println!("Feed: {}", tracker.feed());
    if let Err(e) = tracker.start() {
        eprintln!("Failed to start feed: {}", e);
        std::process::exit(1);
    }

    println!("Streaming gaze (Ctrl+C to stop)...");

    let start = Instant::now();
    let mut available: u64 = 0;
    let mut polls: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        let now = Instant::now();
        polls += 1;
        match tracker.gaze(now) {
            Some(g) => {
                available += 1;
                println!("gaze={}  |g|={:.3}", g, g.length());
            }
            None => println!("gaze unavailable"),
        }

        if now.duration_since(last_report) >= Duration::from_secs(5) {
            println!(
                "--- {:.0}% of polls had fresh gaze over {:.1}s ---",
                100.0 * available as f64 / polls as f64,
                start.elapsed().as_secs_f64()
            );
            last_report = now;
        }

        std::thread::sleep(Duration::from_millis(100));
    }
}
