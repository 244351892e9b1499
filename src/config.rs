//! Compiled-in feed constants, overridable from the environment.

use crate::protocol::{IPC_SERVER_PORT, IPC_VERSION};
use crate::types::FeedSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Well-known OSC port used by VRChat-compatible eye tracking senders.
pub const OSC_PORT: u16 = 9000;

/// Settings for the PSVR2 Toolkit IPC feed.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Address of the driver's IPC server.
    pub server_addr: SocketAddr,
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub handshake_attempts: u32,
    pub handshake_retry_delay: Duration,
    /// Budget for one gaze response is `read_attempts * read_retry_delay`.
    pub read_attempts: u32,
    pub read_retry_delay: Duration,
    /// Pause between gaze requests.
    pub poll_interval: Duration,
    pub ipc_version: u16,
    /// Process id announced in the handshake.
    pub process_id: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), IPC_SERVER_PORT),
            connect_attempts: 15,
            connect_retry_delay: Duration::from_millis(100),
            handshake_attempts: 5,
            handshake_retry_delay: Duration::from_millis(100),
            read_attempts: 5,
            read_retry_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
            ipc_version: IPC_VERSION,
            process_id: std::process::id(),
        }
    }
}

impl DeviceConfig {
    /// Defaults with `GAZEFEED_DEVICE_PORT` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = read_env_parsed::<u16>("GAZEFEED_DEVICE_PORT") {
            config.server_addr.set_port(port);
        }
        config
    }

    /// Total wait for the handshake reply.
    pub fn handshake_budget(&self) -> Duration {
        self.handshake_retry_delay * self.handshake_attempts
    }

    /// Total wait for one gaze response per loop iteration.
    pub fn read_budget(&self) -> Duration {
        self.read_retry_delay * self.read_attempts
    }
}

/// Settings for the OSC feed.
#[derive(Debug, Clone)]
pub struct OscConfig {
    pub bind_addr: SocketAddr,
    /// Upper bound on how long a receive blocks before the stop flag is rechecked.
    pub recv_timeout: Duration,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), OSC_PORT),
            recv_timeout: Duration::from_millis(100),
        }
    }
}

impl OscConfig {
    /// Defaults with `GAZEFEED_OSC_BIND` and `GAZEFEED_OSC_PORT` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ip) = read_env_parsed::<IpAddr>("GAZEFEED_OSC_BIND") {
            config.bind_addr.set_ip(ip);
        }
        if let Some(port) = read_env_parsed::<u16>("GAZEFEED_OSC_PORT") {
            config.bind_addr.set_port(port);
        }
        config
    }
}

/// Feeds enabled by `GAZEFEED_FEEDS` (comma separated `device`, `osc`),
/// or `default` when unset.
pub fn feeds_from_env(default: FeedSet) -> FeedSet {
    let Ok(raw) = std::env::var("GAZEFEED_FEEDS") else {
        return default;
    };
    match parse_feed_list(&raw) {
        Some(feeds) => feeds,
        None => {
            log::warn!("Ignoring GAZEFEED_FEEDS='{}' (supported: device, osc)", raw);
            default
        }
    }
}

fn parse_feed_list(raw: &str) -> Option<FeedSet> {
    let mut feeds = FeedSet::empty();
    for item in raw.split(',').map(|s| s.trim().to_ascii_lowercase()) {
        match item.as_str() {
            "" => {}
            "device" | "psvr2" => feeds |= FeedSet::DEVICE_IPC,
            "osc" | "vrchat" => feeds |= FeedSet::NETWORK_OSC,
            _ => return None,
        }
    }
    Some(feeds)
}

fn read_env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid {}='{}'", name, raw);
            None
        }
    }
}
