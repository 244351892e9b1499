//! PSVR2 Toolkit IPC wire format.
//!
//! Every message is a packed little-endian header followed by a fixed payload
//! selected by the header's command tag. The layout is owned by the driver's
//! IPC server; sizes below must match it byte for byte.

use crate::types::GazeVector;
use crate::{GazeError, Result};

// -- Server endpoint --
pub const IPC_SERVER_PORT: u16 = 3364;
pub const IPC_VERSION: u16 = 1;

// -- Message geometry --
/// `type: u16`, `data_len: u32`.
pub const HEADER_SIZE: usize = 6;
/// `ipc_version: u16`, `process_id: u32`.
pub const HANDSHAKE_REQUEST_PAYLOAD: usize = 6;
/// `result: u8`, `ipc_version: u16`.
pub const HANDSHAKE_RESULT_PAYLOAD: usize = 3;
/// One eye: origin flag + 3×f32, direction flag + 3×f32, pupil flag + f32,
/// blink flag + blink byte.
pub const EYE_RESULT_SIZE: usize = 33;
pub const GAZE_RESULT_PAYLOAD: usize = 2 * EYE_RESULT_SIZE;

pub const HANDSHAKE_REQUEST_SIZE: usize = HEADER_SIZE + HANDSHAKE_REQUEST_PAYLOAD;
pub const HANDSHAKE_RESULT_SIZE: usize = HEADER_SIZE + HANDSHAKE_RESULT_PAYLOAD;
pub const GAZE_REQUEST_SIZE: usize = HEADER_SIZE;
pub const GAZE_RESULT_SIZE: usize = HEADER_SIZE + GAZE_RESULT_PAYLOAD;

/// Command tags carried in the header.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    ClientPing = 0,
    ServerPong = 1,
    ClientRequestHandshake = 2,
    ServerHandshakeResult = 3,
    ClientRequestGazeData = 4,
    ServerGazeDataResult = 5,
}

impl CommandType {
    pub fn from_u16(raw: u16) -> Option<CommandType> {
        match raw {
            0 => Some(CommandType::ClientPing),
            1 => Some(CommandType::ServerPong),
            2 => Some(CommandType::ClientRequestHandshake),
            3 => Some(CommandType::ServerHandshakeResult),
            4 => Some(CommandType::ClientRequestGazeData),
            5 => Some(CommandType::ServerGazeDataResult),
            _ => None,
        }
    }
}

/// Result code of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeResult {
    Success,
    Failed,
    InvalidVersion,
    Unknown(u8),
}

impl HandshakeResult {
    pub fn from_u8(raw: u8) -> HandshakeResult {
        match raw {
            0 => HandshakeResult::Success,
            1 => HandshakeResult::Failed,
            2 => HandshakeResult::InvalidVersion,
            other => HandshakeResult::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            HandshakeResult::Success => 0,
            HandshakeResult::Failed => 1,
            HandshakeResult::InvalidVersion => 2,
            HandshakeResult::Unknown(raw) => raw,
        }
    }
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: u16,
    pub data_len: u32,
}

/// Per-eye block of a gaze result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeSample {
    pub origin_valid: bool,
    /// Gaze origin in millimeters, device space.
    pub origin_mm: [f32; 3],
    pub direction_valid: bool,
    /// Normalized gaze direction, device space.
    pub direction: GazeVector,
    pub pupil_valid: bool,
    pub pupil_diameter_mm: f32,
    pub blink_valid: bool,
    pub blink: bool,
}

/// Both eyes of one gaze result, left first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeFrame {
    pub left: EyeSample,
    pub right: EyeSample,
}

impl GazeFrame {
    /// Binocular direction in host space, if both eye directions are valid
    /// and the result has no NaN component.
    ///
    /// The eyes are averaged component-wise, then X and Z are negated.
    pub fn combined_direction(&self) -> Option<GazeVector> {
        if !(self.left.direction_valid && self.right.direction_valid) {
            return None;
        }
        let mean = GazeVector::midpoint(self.left.direction, self.right.direction);
        let gaze = GazeVector::new(-mean.x, mean.y, -mean.z);
        (!gaze.has_nan()).then_some(gaze)
    }
}

/// Encode a message header.
pub fn build_header(kind: CommandType, data_len: u32) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..2].copy_from_slice(&(kind as u16).to_le_bytes());
    buf[2..6].copy_from_slice(&data_len.to_le_bytes());
    buf
}

/// Decode a message header from the start of `data`.
pub fn parse_header(data: &[u8]) -> Option<Header> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    Some(Header {
        kind: u16::from_le_bytes([data[0], data[1]]),
        data_len: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
    })
}

/// Build the handshake request sent once after connecting.
pub fn build_handshake_request(ipc_version: u16, process_id: u32) -> [u8; HANDSHAKE_REQUEST_SIZE] {
    let mut buf = [0u8; HANDSHAKE_REQUEST_SIZE];
    buf[..HEADER_SIZE].copy_from_slice(&build_header(
        CommandType::ClientRequestHandshake,
        HANDSHAKE_REQUEST_PAYLOAD as u32,
    ));
    buf[6..8].copy_from_slice(&ipc_version.to_le_bytes());
    buf[8..12].copy_from_slice(&process_id.to_le_bytes());
    buf
}

/// Build the payload-less gaze data request.
pub fn build_gaze_request() -> [u8; GAZE_REQUEST_SIZE] {
    build_header(CommandType::ClientRequestGazeData, 0)
}

fn expect_kind(data: &[u8], expected: CommandType) -> Result<()> {
    let header = parse_header(data).ok_or_else(|| GazeError::malformed("truncated header"))?;
    if header.kind != expected as u16 {
        return Err(GazeError::UnexpectedMessage {
            expected,
            got: header.kind,
        });
    }
    Ok(())
}

/// Validate a handshake response and return the server's IPC version.
///
/// Fails if the tag is not `ServerHandshakeResult` or the result is not success.
pub fn parse_handshake_response(data: &[u8]) -> Result<u16> {
    if data.len() < HANDSHAKE_RESULT_SIZE {
        return Err(GazeError::malformed("truncated handshake result"));
    }
    expect_kind(data, CommandType::ServerHandshakeResult)?;

    match HandshakeResult::from_u8(data[6]) {
        HandshakeResult::Success => Ok(u16::from_le_bytes([data[7], data[8]])),
        other => Err(GazeError::Handshake(other)),
    }
}

fn read_f32(data: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Parse one 33-byte eye block.
///
/// Layout:
/// - `[0]`: origin valid
/// - `[1..13]`: origin x, y, z (f32, mm)
/// - `[13]`: direction valid
/// - `[14..26]`: direction x, y, z (f32)
/// - `[26]`: pupil valid
/// - `[27..31]`: pupil diameter (f32, mm)
/// - `[31]`: blink valid
/// - `[32]`: blink
fn parse_eye(data: &[u8]) -> EyeSample {
    EyeSample {
        origin_valid: data[0] != 0,
        origin_mm: [read_f32(data, 1), read_f32(data, 5), read_f32(data, 9)],
        direction_valid: data[13] != 0,
        direction: GazeVector::new(read_f32(data, 14), read_f32(data, 18), read_f32(data, 22)),
        pupil_valid: data[26] != 0,
        pupil_diameter_mm: read_f32(data, 27),
        blink_valid: data[31] != 0,
        blink: data[32] != 0,
    }
}

/// Parse a full gaze result message (header included).
pub fn parse_gaze_response(data: &[u8]) -> Result<GazeFrame> {
    if data.len() < GAZE_RESULT_SIZE {
        return Err(GazeError::malformed("truncated gaze result"));
    }
    expect_kind(data, CommandType::ServerGazeDataResult)?;

    let left_at = HEADER_SIZE;
    let right_at = HEADER_SIZE + EYE_RESULT_SIZE;
    Ok(GazeFrame {
        left: parse_eye(&data[left_at..right_at]),
        right: parse_eye(&data[right_at..GAZE_RESULT_SIZE]),
    })
}

/// Encode a gaze result. Used by test servers.
pub fn build_gaze_response(frame: &GazeFrame) -> [u8; GAZE_RESULT_SIZE] {
    let mut buf = [0u8; GAZE_RESULT_SIZE];
    buf[..HEADER_SIZE].copy_from_slice(&build_header(
        CommandType::ServerGazeDataResult,
        GAZE_RESULT_PAYLOAD as u32,
    ));
    for (eye, at) in [(&frame.left, HEADER_SIZE), (&frame.right, HEADER_SIZE + EYE_RESULT_SIZE)] {
        let out = &mut buf[at..at + EYE_RESULT_SIZE];
        out[0] = eye.origin_valid as u8;
        for (i, v) in eye.origin_mm.iter().enumerate() {
            out[1 + 4 * i..5 + 4 * i].copy_from_slice(&v.to_le_bytes());
        }
        out[13] = eye.direction_valid as u8;
        let dir = [eye.direction.x, eye.direction.y, eye.direction.z];
        for (i, v) in dir.iter().enumerate() {
            out[14 + 4 * i..18 + 4 * i].copy_from_slice(&v.to_le_bytes());
        }
        out[26] = eye.pupil_valid as u8;
        out[27..31].copy_from_slice(&eye.pupil_diameter_mm.to_le_bytes());
        out[31] = eye.blink_valid as u8;
        out[32] = eye.blink as u8;
    }
    buf
}

/// Encode a handshake result. Used by test servers.
pub fn build_handshake_response(
    kind: CommandType,
    result: HandshakeResult,
    ipc_version: u16,
) -> [u8; HANDSHAKE_RESULT_SIZE] {
    let mut buf = [0u8; HANDSHAKE_RESULT_SIZE];
    buf[..HEADER_SIZE].copy_from_slice(&build_header(kind, HANDSHAKE_RESULT_PAYLOAD as u32));
    buf[6] = result.to_u8();
    buf[7..9].copy_from_slice(&ipc_version.to_le_bytes());
    buf
}

impl EyeSample {
    /// An eye block with only a direction set.
    pub fn with_direction(direction: GazeVector, valid: bool) -> EyeSample {
        EyeSample {
            origin_valid: false,
            origin_mm: [0.0; 3],
            direction_valid: valid,
            direction,
            pupil_valid: false,
            pupil_diameter_mm: 0.0,
            blink_valid: false,
            blink: false,
        }
    }
}
