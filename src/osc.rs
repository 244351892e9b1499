//! Minimal OSC 1.0 decoder.
//!
//! Packets are either a message (`/address`, `,tags`, arguments) or a
//! `#bundle` of nested packets. Strings are NUL-terminated and padded to a
//! multiple of four bytes; numbers are big-endian.

use crate::{GazeError, Result};

const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";
/// Nested bundles deeper than this are rejected.
const MAX_BUNDLE_DEPTH: usize = 8;

/// A decoded OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Float(f32),
    Int(i32),
    Str(String),
    Bool(bool),
    Nil,
    Impulse,
}

/// A decoded OSC message.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// All arguments as floats, if every one of them is a float.
    pub fn floats(&self) -> Option<Vec<f32>> {
        self.args
            .iter()
            .map(|a| match a {
                OscArg::Float(f) => Some(*f),
                _ => None,
            })
            .collect()
    }
}

/// Decode a datagram into the messages it carries, flattening bundles
/// in order.
pub fn decode_packet(data: &[u8]) -> Result<Vec<OscMessage>> {
    let mut out = Vec::new();
    decode_into(data, 0, &mut out)?;
    Ok(out)
}

fn decode_into(data: &[u8], depth: usize, out: &mut Vec<OscMessage>) -> Result<()> {
    if data.starts_with(BUNDLE_TAG) {
        if depth >= MAX_BUNDLE_DEPTH {
            return Err(GazeError::malformed("bundle nesting too deep"));
        }
        // 8-byte tag, 8-byte NTP time tag, then size-prefixed elements.
        let mut pos = 16;
        if data.len() < pos {
            return Err(GazeError::malformed("truncated bundle header"));
        }
        while pos < data.len() {
            let size = read_i32(data, &mut pos)?;
            let size = usize::try_from(size)
                .map_err(|_| GazeError::malformed("negative bundle element size"))?;
            let end = pos
                .checked_add(size)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| GazeError::malformed("bundle element overruns packet"))?;
            decode_into(&data[pos..end], depth + 1, out)?;
            pos = end;
        }
        Ok(())
    } else {
        out.push(decode_message(data)?);
        Ok(())
    }
}

/// Decode a single (non-bundle) message.
pub fn decode_message(data: &[u8]) -> Result<OscMessage> {
    let mut pos = 0;
    let address = read_str(data, &mut pos)?;
    if !address.starts_with('/') {
        return Err(GazeError::malformed(format!("bad address pattern '{}'", address)));
    }

    // Messages without a type tag string carry no arguments.
    if pos >= data.len() {
        return Ok(OscMessage {
            address,
            args: Vec::new(),
        });
    }

    let tags = read_str(data, &mut pos)?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(GazeError::malformed("type tag string missing ','"));
    };

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            'f' => OscArg::Float(f32::from_bits(read_u32(data, &mut pos)?)),
            'i' => OscArg::Int(read_i32(data, &mut pos)?),
            's' => OscArg::Str(read_str(data, &mut pos)?),
            'T' => OscArg::Bool(true),
            'F' => OscArg::Bool(false),
            'N' => OscArg::Nil,
            'I' => OscArg::Impulse,
            other => {
                return Err(GazeError::malformed(format!("unsupported type tag '{}'", other)))
            }
        };
        args.push(arg);
    }

    Ok(OscMessage { address, args })
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes = data
        .get(*pos..*pos + 4)
        .ok_or_else(|| GazeError::malformed("truncated argument"))?;
    *pos += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_i32(data: &[u8], pos: &mut usize) -> Result<i32> {
    read_u32(data, pos).map(|v| v as i32)
}

fn read_str(data: &[u8], pos: &mut usize) -> Result<String> {
    let rest = data
        .get(*pos..)
        .ok_or_else(|| GazeError::malformed("truncated string"))?;
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| GazeError::malformed("unterminated string"))?;
    let s = std::str::from_utf8(&rest[..len])
        .map_err(|_| GazeError::malformed("string is not UTF-8"))?
        .to_string();
    // Skip the terminator and pad to the next 4-byte boundary.
    *pos += (len + 4) & !3;
    if *pos > data.len() {
        return Err(GazeError::malformed("string padding overruns packet"));
    }
    Ok(s)
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    let pad = 4 - (s.len() % 4);
    buf.extend(std::iter::repeat(0u8).take(pad));
}

/// Encode a message whose arguments are all floats.
pub fn encode_float_message(address: &str, args: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(address.len() + args.len() * 5 + 8);
    write_str(&mut buf, address);
    let tags: String = std::iter::once(',').chain(args.iter().map(|_| 'f')).collect();
    write_str(&mut buf, &tags);
    for v in args {
        buf.extend_from_slice(&v.to_bits().to_be_bytes());
    }
    buf
}

/// Wrap already-encoded packets in a bundle with an "immediately" time tag.
pub fn encode_bundle(elements: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(BUNDLE_TAG);
    buf.extend_from_slice(&1u64.to_be_bytes());
    for element in elements {
        buf.extend_from_slice(&(element.len() as i32).to_be_bytes());
        buf.extend_from_slice(element);
    }
    buf
}
