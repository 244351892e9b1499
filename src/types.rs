use std::fmt;
use std::time::Duration;

/// Maximum age of a sample before it is treated as absent.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(1);

/// Combined binocular gaze direction in the host's right-handed space
/// (+Y up, -Z forward).
///
/// Not guaranteed to be normalized; treat it as a direction hint.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GazeVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl GazeVector {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// True if any component is NaN.
    pub fn has_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }

    /// Component-wise mean of two vectors.
    pub fn midpoint(a: GazeVector, b: GazeVector) -> GazeVector {
        GazeVector {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
            z: (a.z + b.z) / 2.0,
        }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl From<[f32; 3]> for GazeVector {
    fn from(v: [f32; 3]) -> Self {
        GazeVector::new(v[0], v[1], v[2])
    }
}

impl fmt::Display for GazeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:+.4}, {:+.4}, {:+.4})", self.x, self.y, self.z)
    }
}

/// Which external feed a tracker reads from.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedIdentity {
    /// PSVR2 Toolkit driver over its loopback TCP IPC server.
    DeviceIpc = 0,
    /// VRChat-style OSC eye tracking datagrams.
    NetworkOsc = 1,
}

impl FeedIdentity {
    pub fn name(&self) -> &'static str {
        match self {
            FeedIdentity::DeviceIpc => "PSVR2 Toolkit",
            FeedIdentity::NetworkOsc => "VRChat OSC",
        }
    }

    pub fn from_raw(raw: i32) -> Option<FeedIdentity> {
        match raw {
            0 => Some(FeedIdentity::DeviceIpc),
            1 => Some(FeedIdentity::NetworkOsc),
            _ => None,
        }
    }
}

impl fmt::Display for FeedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// Set of feeds a factory is allowed to try.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct FeedSet: u32 {
        const DEVICE_IPC  = 1 << 0;
        const NETWORK_OSC = 1 << 1;
    }
}

impl FeedSet {
    /// Feeds in the order a selector should try them.
    pub fn in_priority_order(self) -> impl Iterator<Item = FeedIdentity> {
        [
            (FeedSet::DEVICE_IPC, FeedIdentity::DeviceIpc),
            (FeedSet::NETWORK_OSC, FeedIdentity::NetworkOsc),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, feed)| feed)
    }
}

impl From<FeedIdentity> for FeedSet {
    fn from(feed: FeedIdentity) -> Self {
        match feed {
            FeedIdentity::DeviceIpc => FeedSet::DEVICE_IPC,
            FeedIdentity::NetworkOsc => FeedSet::NETWORK_OSC,
        }
    }
}
