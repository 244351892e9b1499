use crate::cache::GazeSampleCache;
use crate::config::DeviceConfig;
use crate::observer::GazeObserver;
use crate::protocol::{self, GAZE_RESULT_SIZE, HANDSHAKE_RESULT_SIZE};
use crate::tracker::EyeTracker;
use crate::types::{FeedIdentity, GazeVector};
use crate::worker::{FeedWorker, StopSignal};
use crate::{GazeError, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FEED: FeedIdentity = FeedIdentity::DeviceIpc;

/// Gaze from the PSVR2 Toolkit driver over its loopback IPC server.
///
/// Construction connects and completes the versioned handshake, so a
/// `DeviceIpcTracker` always holds a live, negotiated connection.
pub struct DeviceIpcTracker {
    config: DeviceConfig,
    /// Kept by the owner so teardown can shut the socket down while the
    /// reader thread is blocked on its clone.
    stream: TcpStream,
    server_version: u16,
    cache: Arc<GazeSampleCache>,
    observer: Arc<dyn GazeObserver>,
    worker: FeedWorker,
}

impl DeviceIpcTracker {
    /// Connect and handshake. Fails with [`GazeError::FeedUnavailable`].
    pub fn connect(config: DeviceConfig, observer: Arc<dyn GazeObserver>) -> Result<DeviceIpcTracker> {
        let mut stream = connect_with_retries(&config)?;
        let server_version = handshake(&mut stream, &config)
            .map_err(|e| GazeError::unavailable(FEED, format!("handshake failed: {}", e)))?;

        log::info!(
            "Connected to PSVR2 Toolkit IPC server at {} (client v{}, server v{})",
            config.server_addr,
            config.ipc_version,
            server_version
        );

        Ok(DeviceIpcTracker {
            config,
            stream,
            server_version,
            cache: Arc::new(GazeSampleCache::new()),
            observer,
            worker: FeedWorker::new(),
        })
    }

    /// IPC version reported by the server during the handshake.
    pub fn server_version(&self) -> u16 {
        self.server_version
    }
}

impl EyeTracker for DeviceIpcTracker {
    fn start(&mut self) -> Result<()> {
        let stream = self.stream.try_clone()?;
        let config = self.config.clone();
        let cache = self.cache.clone();
        let observer = self.observer.clone();
        self.worker.spawn("gazefeed-ipc", move |stop| {
            ipc_reader_loop(stream, &config, &cache, observer.as_ref(), &stop);
        })
    }

    fn stop(&mut self) {
        let stream = &self.stream;
        self.worker.stop(|| {
            let _ = stream.shutdown(Shutdown::Both);
        });
    }

    fn is_gaze_available(&self, now: Instant) -> bool {
        self.cache.is_fresh(now)
    }

    fn gaze(&self, now: Instant) -> Option<GazeVector> {
        self.cache.read_if_fresh(now)
    }

    fn feed(&self) -> FeedIdentity {
        FEED
    }
}

impl Drop for DeviceIpcTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn connect_with_retries(config: &DeviceConfig) -> Result<TcpStream> {
    let mut last_err = None;
    for attempt in 1..=config.connect_attempts {
        let started = Instant::now();
        match TcpStream::connect_timeout(&config.server_addr, config.connect_retry_delay) {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    log::debug!("TCP_NODELAY not applied: {}", e);
                }
                return Ok(stream);
            }
            Err(e) => {
                log::debug!(
                    "IPC connect attempt {}/{} to {} failed: {}",
                    attempt,
                    config.connect_attempts,
                    config.server_addr,
                    e
                );
                last_err = Some(e);
                // A timed-out attempt has already used up the delay.
                let pause = config.connect_retry_delay.saturating_sub(started.elapsed());
                if attempt < config.connect_attempts && !pause.is_zero() {
                    std::thread::sleep(pause);
                }
            }
        }
    }

    Err(GazeError::unavailable(
        FEED,
        match last_err {
            Some(e) => format!("no IPC server at {}: {}", config.server_addr, e),
            None => format!("no connect attempts configured for {}", config.server_addr),
        },
    ))
}

/// Send the handshake request and validate the reply. Returns the server's
/// IPC version.
fn handshake(stream: &mut TcpStream, config: &DeviceConfig) -> Result<u16> {
    let request = protocol::build_handshake_request(config.ipc_version, config.process_id);
    stream.write_all(&request)?;

    let mut response = [0u8; HANDSHAKE_RESULT_SIZE];
    let mut filled = 0;
    if !fill_before_deadline(stream, &mut response, &mut filled, config.handshake_budget())? {
        return Err(GazeError::Timeout);
    }
    protocol::parse_handshake_response(&response)
}

/// Read into `buf[*filled..]` until the buffer is full or `budget` elapses.
///
/// Returns `Ok(true)` once full and `Ok(false)` on deadline, leaving
/// `*filled` at the number of bytes accumulated so far. A zero-length read
/// means the peer closed the connection.
fn fill_before_deadline(
    stream: &mut TcpStream,
    buf: &mut [u8],
    filled: &mut usize,
    budget: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + budget;
    while *filled < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        stream.set_read_timeout(Some(remaining))?;
        match stream.read(&mut buf[*filled..]) {
            Ok(0) => return Err(GazeError::ConnectionClosed),
            Ok(n) => *filled += n,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Request/response loop run by the reader thread.
///
/// A response that misses its deadline is not abandoned: the next iteration
/// keeps filling the same buffer before issuing another request, so the
/// stream never drifts out of frame alignment. I/O failures discard the
/// partial frame and the loop keeps polling; only the stop signal ends it.
fn ipc_reader_loop(
    mut stream: TcpStream,
    config: &DeviceConfig,
    cache: &GazeSampleCache,
    observer: &dyn GazeObserver,
    stop: &StopSignal,
) {
    observer.worker_started(FEED);

    let request = protocol::build_gaze_request();
    let mut response = [0u8; GAZE_RESULT_SIZE];
    let mut filled = 0;
    let mut link_lost = false;

    while !stop.is_raised() {
        let sent = if filled == 0 {
            stream.write_all(&request).map_err(GazeError::from)
        } else {
            Ok(())
        };

        match sent.and_then(|()| {
            fill_before_deadline(&mut stream, &mut response, &mut filled, config.read_budget())
        }) {
            Ok(true) => {
                filled = 0;
                link_lost = false;
                match protocol::parse_gaze_response(&response) {
                    Ok(frame) => {
                        if let Some(gaze) = frame.combined_direction() {
                            if cache.record_sample(gaze, Instant::now()) {
                                observer.sample_accepted(FEED, gaze);
                            }
                        }
                    }
                    Err(e) => observer.message_malformed(FEED, &e),
                }
            }
            Ok(false) => {
                log::trace!("IPC gaze response pending ({}/{} bytes)", filled, GAZE_RESULT_SIZE);
            }
            Err(e) => {
                filled = 0;
                if stop.is_raised() {
                    break;
                }
                if link_lost {
                    log::debug!("IPC gaze read failed: {}", e);
                } else {
                    log::warn!("IPC gaze read failed, still polling: {}", e);
                    link_lost = true;
                }
            }
        }

        if stop.wait(config.poll_interval) {
            break;
        }
    }

    observer.worker_stopped(FEED);
}
