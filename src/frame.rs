//! HTTP/2 frame codec.
//!
//! Pure parse/serialize helpers for the 9-byte frame header and each frame
//! type's payload. Nothing here holds connection state; the connection
//! state machine is the only caller that acts on the results.
//!
//! Reference: RFC 7540 Section 4 and Section 6.

use crate::error::{ErrorCode, H2Error};

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 9;

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Largest value SETTINGS_MAX_FRAME_SIZE may take.
pub const MAX_FRAME_SIZE_LIMIT: u32 = 0x00ff_ffff;

/// Smallest value SETTINGS_MAX_FRAME_SIZE may take (also the default).
pub const MIN_MAX_FRAME_SIZE: u32 = 16_384;

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const ACK: u8 = 0x1;
    pub const END_STREAM: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 24 bits
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    /// 31 bits, the reserved high bit is dropped on parse
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn new(frame_type: u8, flags: u8, stream_id: u32, length: u32) -> Self {
        FrameHeader {
            length,
            frame_type,
            flags,
            stream_id,
        }
    }

    /// Parse a 9-byte frame header. Returns `None` on short input. The
    /// reserved bit of the stream id is dropped.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }

        let length = u32::from_be_bytes([0, data[0], data[1], data[2]]);
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7fff_ffff;

        Some(Self {
            length,
            frame_type: data[3],
            flags: data[4],
            stream_id,
        })
    }

    pub fn serialize(&self) -> [u8; FRAME_HEADER_LEN] {
        let len = self.length.to_be_bytes();
        let sid = (self.stream_id & 0x7fff_ffff).to_be_bytes();
        [
            len[1], len[2], len[3],
            self.frame_type,
            self.flags,
            sid[0], sid[1], sid[2], sid[3],
        ]
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_LEN + self.length as usize
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn is_end_stream(&self) -> bool {
        self.has_flag(flags::END_STREAM)
    }

    pub fn is_end_headers(&self) -> bool {
        self.has_flag(flags::END_HEADERS)
    }

    pub fn is_ack(&self) -> bool {
        self.has_flag(flags::ACK)
    }
}

/// Outcome of the structural pre-check on a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCheck {
    /// Known type, structurally sound; decode the payload.
    Valid,
    /// PRIORITY or PUSH_PROMISE.
    NotImplemented,
    /// Unrecognized type code.
    Unknown,
}

/// Validate a frame header before its payload is read.
pub fn check_frame_errors(header: &FrameHeader, max_frame_size: u32) -> Result<FrameCheck, H2Error> {
    if header.length > max_frame_size {
        return Err(H2Error::FrameSize("frame exceeds SETTINGS_MAX_FRAME_SIZE"));
    }

    match header.frame_type {
        frame_type::DATA | frame_type::HEADERS => {
            if header.stream_id == 0 {
                return Err(H2Error::Protocol("DATA/HEADERS on stream 0"));
            }
        }
        frame_type::RST_STREAM => {
            if header.length != 4 {
                return Err(H2Error::FrameSize("RST_STREAM length must be 4"));
            }
            if header.stream_id == 0 {
                return Err(H2Error::Protocol("RST_STREAM on stream 0"));
            }
        }
        frame_type::SETTINGS => {
            if header.length % 6 != 0 {
                return Err(H2Error::FrameSize("SETTINGS length not a multiple of 6"));
            }
            if header.is_ack() && header.length != 0 {
                return Err(H2Error::FrameSize("SETTINGS ACK with payload"));
            }
            if header.stream_id != 0 {
                return Err(H2Error::Protocol("SETTINGS on non-zero stream"));
            }
        }
        frame_type::PING => {
            if header.length != 8 {
                return Err(H2Error::FrameSize("PING length must be 8"));
            }
            if header.stream_id != 0 {
                return Err(H2Error::Protocol("PING on non-zero stream"));
            }
        }
        frame_type::GOAWAY => {
            if header.length < 8 {
                return Err(H2Error::FrameSize("GOAWAY shorter than 8 bytes"));
            }
            if header.stream_id != 0 {
                return Err(H2Error::Protocol("GOAWAY on non-zero stream"));
            }
        }
        frame_type::WINDOW_UPDATE => {
            if header.length != 4 {
                return Err(H2Error::FrameSize("WINDOW_UPDATE length must be 4"));
            }
        }
        frame_type::CONTINUATION => {
            if header.stream_id == 0 {
                return Err(H2Error::Protocol("CONTINUATION on stream 0"));
            }
        }
        frame_type::PRIORITY | frame_type::PUSH_PROMISE => return Ok(FrameCheck::NotImplemented),
        _ => return Ok(FrameCheck::Unknown),
    }

    Ok(FrameCheck::Valid)
}

/// Strip the PADDED envelope from a DATA payload.
pub fn data_payload<'a>(header: &FrameHeader, payload: &'a [u8]) -> Result<&'a [u8], H2Error> {
    if !header.has_flag(flags::PADDED) {
        return Ok(payload);
    }
    let (&pad_length, rest) = payload
        .split_first()
        .ok_or(H2Error::FrameSize("PADDED DATA frame with no payload"))?;
    let pad_length = pad_length as usize;
    if pad_length > rest.len() {
        return Err(H2Error::Protocol("padding exceeds DATA payload"));
    }
    Ok(&rest[..rest.len() - pad_length])
}

/// Strip padding and the priority block from a HEADERS payload, leaving the
/// header block fragment.
pub fn headers_payload<'a>(header: &FrameHeader, payload: &'a [u8]) -> Result<&'a [u8], H2Error> {
    let mut start = 0;
    let mut end = payload.len();

    if header.has_flag(flags::PADDED) {
        let pad_length = *payload
            .first()
            .ok_or(H2Error::FrameSize("PADDED HEADERS frame with no payload"))? as usize;
        start = 1;
        if pad_length > end - start {
            return Err(H2Error::Protocol("padding exceeds HEADERS payload"));
        }
        end -= pad_length;
    }

    if header.has_flag(flags::PRIORITY) {
        // stream dependency (4) + weight (1)
        if end - start < 5 {
            return Err(H2Error::FrameSize("PRIORITY HEADERS frame with insufficient data"));
        }
        start += 5;
    }

    Ok(&payload[start..end])
}

fn read_u32(payload: &[u8], at: usize) -> Result<u32, H2Error> {
    payload
        .get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(H2Error::FrameSize("frame payload too short"))
}

/// Error code carried by RST_STREAM.
pub fn decode_rst_stream(payload: &[u8]) -> Result<ErrorCode, H2Error> {
    Ok(ErrorCode::from_u32(read_u32(payload, 0)?))
}

/// A decoded GOAWAY payload. Additional debug data is not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAway {
    pub last_stream_id: u32,
    pub error_code: ErrorCode,
}

pub fn decode_goaway(payload: &[u8]) -> Result<GoAway, H2Error> {
    Ok(GoAway {
        last_stream_id: read_u32(payload, 0)? & 0x7fff_ffff,
        error_code: ErrorCode::from_u32(read_u32(payload, 4)?),
    })
}

/// Window increment carried by WINDOW_UPDATE, reserved bit cleared.
pub fn decode_window_update(payload: &[u8]) -> Result<u32, H2Error> {
    Ok(read_u32(payload, 0)? & 0x7fff_ffff)
}

pub fn decode_ping(payload: &[u8]) -> Result<[u8; 8], H2Error> {
    payload
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(H2Error::FrameSize("PING payload too short"))
}

/// Create a RST_STREAM frame
pub fn encode_rst_stream(stream_id: u32, error_code: ErrorCode) -> [u8; 13] {
    let mut frame = [0u8; 13];
    frame[..9].copy_from_slice(&FrameHeader::new(frame_type::RST_STREAM, 0, stream_id, 4).serialize());
    frame[9..].copy_from_slice(&error_code.as_u32().to_be_bytes());
    frame
}

/// Create a GOAWAY frame without debug data
pub fn encode_goaway(last_stream_id: u32, error_code: ErrorCode) -> [u8; 17] {
    let mut frame = [0u8; 17];
    frame[..9].copy_from_slice(&FrameHeader::new(frame_type::GOAWAY, 0, 0, 8).serialize());
    frame[9..13].copy_from_slice(&(last_stream_id & 0x7fff_ffff).to_be_bytes());
    frame[13..].copy_from_slice(&error_code.as_u32().to_be_bytes());
    frame
}

/// Create a SETTINGS ACK frame
pub fn encode_settings_ack() -> [u8; 9] {
    FrameHeader::new(frame_type::SETTINGS, flags::ACK, 0, 0).serialize()
}

/// Create a PING frame, or its acknowledgement when `ack` is set
pub fn encode_ping(data: [u8; 8], ack: bool) -> [u8; 17] {
    let mut frame = [0u8; 17];
    let f = if ack { flags::ACK } else { 0 };
    frame[..9].copy_from_slice(&FrameHeader::new(frame_type::PING, f, 0, 8).serialize());
    frame[9..].copy_from_slice(&data);
    frame
}

/// Create a WINDOW_UPDATE frame.
/// stream_id=0 updates the connection-level window, otherwise stream-level
pub fn encode_window_update(stream_id: u32, increment: u32) -> [u8; 13] {
    let mut frame = [0u8; 13];
    frame[..9].copy_from_slice(&FrameHeader::new(frame_type::WINDOW_UPDATE, 0, stream_id, 4).serialize());
    frame[9..].copy_from_slice(&(increment & 0x7fff_ffff).to_be_bytes());
    frame
}

/// True once `data` holds the full connection preface.
pub fn is_preface(data: &[u8]) -> bool {
    data.starts_with(CONNECTION_PREFACE)
}

/// True while `data` is still a prefix of the connection preface, so a
/// mismatch can be detected before all 24 bytes arrive.
pub fn could_be_preface(data: &[u8]) -> bool {
    let n = data.len().min(CONNECTION_PREFACE.len());
    data[..n] == CONNECTION_PREFACE[..n]
}
