use crate::cache::GazeSampleCache;
use crate::config::OscConfig;
use crate::observer::GazeObserver;
use crate::osc::{self, OscMessage};
use crate::tracker::EyeTracker;
use crate::types::{FeedIdentity, GazeVector};
use crate::worker::{FeedWorker, StopSignal};
use crate::{GazeError, Result};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FEED: FeedIdentity = FeedIdentity::NetworkOsc;

/// OSC address carrying both eyes' pitch and yaw in degrees.
pub const EYE_ADDRESS: &str = "/tracking/eye/LeftRightPitchYaw";

/// Largest datagram the listener accepts.
const MAX_DATAGRAM: usize = 65_536;

/// Per-eye angles from one `/tracking/eye/LeftRightPitchYaw` message, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeAngles {
    pub left_pitch: f32,
    pub left_yaw: f32,
    pub right_pitch: f32,
    pub right_yaw: f32,
}

impl EyeAngles {
    /// Extract the four float arguments. Any other argument list is malformed.
    pub fn from_message(msg: &OscMessage) -> Result<EyeAngles> {
        match msg.floats().as_deref() {
            Some(&[left_pitch, left_yaw, right_pitch, right_yaw]) => Ok(EyeAngles {
                left_pitch,
                left_yaw,
                right_pitch,
                right_yaw,
            }),
            _ => Err(GazeError::malformed(format!(
                "{} expects 4 floats, got {:?}",
                EYE_ADDRESS, msg.args
            ))),
        }
    }

    pub fn has_nan(&self) -> bool {
        self.left_pitch.is_nan()
            || self.left_yaw.is_nan()
            || self.right_pitch.is_nan()
            || self.right_yaw.is_nan()
    }

    /// Mean of both eyes' spherical-to-Cartesian directions.
    ///
    /// Pitch is inverted before projection: senders report positive pitch as
    /// looking down, the host expects +Y up. Forward is -Z.
    pub fn direction(&self) -> GazeVector {
        let project = |pitch_deg: f32, yaw_deg: f32| {
            let pitch = -pitch_deg.to_radians();
            let yaw = yaw_deg.to_radians();
            GazeVector::new(
                yaw.sin() * pitch.cos(),
                pitch.sin(),
                -yaw.cos() * pitch.cos(),
            )
        };
        GazeVector::midpoint(
            project(self.left_pitch, self.left_yaw),
            project(self.right_pitch, self.right_yaw),
        )
    }
}

/// Gaze from VRChat-style OSC eye tracking messages.
///
/// The UDP port is bound at construction; the receive thread starts with
/// [`EyeTracker::start`].
pub struct OscTracker {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_timeout: Duration,
    cache: Arc<GazeSampleCache>,
    observer: Arc<dyn GazeObserver>,
    worker: FeedWorker,
}

impl OscTracker {
    /// Bind the listening socket. Fails with [`GazeError::FeedUnavailable`].
    pub fn bind(config: OscConfig, observer: Arc<dyn GazeObserver>) -> Result<OscTracker> {
        let socket = UdpSocket::bind(config.bind_addr)
            .map_err(|e| GazeError::unavailable(FEED, format!("bind {} failed: {}", config.bind_addr, e)))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| GazeError::unavailable(FEED, e))?;

        log::info!("Listening for OSC eye tracking on {}", local_addr);

        Ok(OscTracker {
            socket,
            local_addr,
            recv_timeout: config.recv_timeout,
            cache: Arc::new(GazeSampleCache::new()),
            observer,
            worker: FeedWorker::new(),
        })
    }

    /// Address actually bound, with the real port when 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Where to send the wake datagram: the bound address, or loopback if
    /// bound to the unspecified address.
    fn wake_addr(&self) -> SocketAddr {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        SocketAddr::new(ip, self.local_addr.port())
    }
}

impl EyeTracker for OscTracker {
    fn start(&mut self) -> Result<()> {
        let socket = self.socket.try_clone()?;
        socket.set_read_timeout(Some(self.recv_timeout))?;
        let cache = self.cache.clone();
        let observer = self.observer.clone();
        self.worker.spawn("gazefeed-osc", move |stop| {
            osc_listen_loop(socket, &cache, observer.as_ref(), &stop);
        })
    }

    fn stop(&mut self) {
        let socket = &self.socket;
        let wake = self.wake_addr();
        self.worker.stop(|| {
            // Interrupts the pending receive; the read timeout bounds it otherwise.
            if let Err(e) = socket.send_to(&[], wake) {
                log::debug!("OSC wake datagram to {} failed: {}", wake, e);
            }
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

impl Drop for OscTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn osc_listen_loop(
    socket: UdpSocket,
    cache: &GazeSampleCache,
    observer: &dyn GazeObserver,
    stop: &StopSignal,
) {
    observer.worker_started(FEED);
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !stop.is_raised() {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _peer)) => len,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => {
                // e.g. ICMP port unreachable surfacing as ConnectionReset on Windows.
                log::debug!("OSC receive error: {}", e);
                continue;
            }
        };

        if len == 0 || stop.is_raised() {
            continue;
        }
        handle_packet(&buf[..len], cache, observer);
    }

    observer.worker_stopped(FEED);
}

/// Decode one datagram and record any eye message it carries.
/// Returns the number of samples recorded.
pub(crate) fn handle_packet(data: &[u8], cache: &GazeSampleCache, observer: &dyn GazeObserver) -> usize {
    let now = Instant::now();
    let messages = match osc::decode_packet(data) {
        Ok(messages) => messages,
        Err(e) => {
            observer.message_malformed(FEED, &e);
            return 0;
        }
    };

    let mut recorded = 0;
    for msg in messages.iter().filter(|m| m.address == EYE_ADDRESS) {
        match EyeAngles::from_message(msg) {
            Ok(angles) if angles.has_nan() => {}
            Ok(angles) => {
                let gaze = angles.direction();
                if cache.record_sample(gaze, now) {
                    observer.sample_accepted(FEED, gaze);
                    recorded += 1;
                }
            }
            Err(e) => observer.message_malformed(FEED, &e),
        }
    }
    recorded
}
