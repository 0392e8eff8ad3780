//! HTTP/2 SETTINGS parameters (RFC 7540 Section 6.5).

use crate::error::H2Error;
use crate::flow_control::MAX_WINDOW_SIZE;
use crate::frame::{frame_type, FrameHeader, MAX_FRAME_SIZE_LIMIT, MIN_MAX_FRAME_SIZE};

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// Size of a SETTINGS frame carrying all six parameters.
pub const SETTINGS_FRAME_LEN: usize = 9 + 6 * 6;

/// The six connection parameters.
///
/// `Default` gives the protocol's initial values, which are in force for
/// each direction until a SETTINGS exchange changes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: u32,
    pub enable_push: u32,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: 1,
            max_concurrent_streams: u32::MAX,
            initial_window_size: 65_535,
            max_frame_size: MIN_MAX_FRAME_SIZE,
            max_header_list_size: u32::MAX,
        }
    }
}

impl Settings {
    fn pairs(&self) -> [(u16, u32); 6] {
        [
            (settings_id::HEADER_TABLE_SIZE, self.header_table_size),
            (settings_id::ENABLE_PUSH, self.enable_push),
            (settings_id::MAX_CONCURRENT_STREAMS, self.max_concurrent_streams),
            (settings_id::INITIAL_WINDOW_SIZE, self.initial_window_size),
            (settings_id::MAX_FRAME_SIZE, self.max_frame_size),
            (settings_id::MAX_HEADER_LIST_SIZE, self.max_header_list_size),
        ]
    }

    /// A complete, non-ACK SETTINGS frame advertising every parameter.
    pub fn encode_frame(&self) -> [u8; SETTINGS_FRAME_LEN] {
        let mut frame = [0u8; SETTINGS_FRAME_LEN];
        let header = FrameHeader::new(frame_type::SETTINGS, 0, 0, (SETTINGS_FRAME_LEN - 9) as u32);
        frame[..9].copy_from_slice(&header.serialize());
        for (i, (id, value)) in self.pairs().into_iter().enumerate() {
            let at = 9 + i * 6;
            frame[at..at + 2].copy_from_slice(&id.to_be_bytes());
            frame[at + 2..at + 6].copy_from_slice(&value.to_be_bytes());
        }
        frame
    }

    /// Apply a SETTINGS payload on top of the current values. The payload
    /// is validated in full first, so a rejected frame changes nothing.
    pub fn apply(&mut self, payload: &[u8]) -> Result<(), H2Error> {
        if payload.len() % 6 != 0 {
            return Err(H2Error::FrameSize("SETTINGS length not a multiple of 6"));
        }

        let mut next = *self;
        for entry in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            match id {
                settings_id::HEADER_TABLE_SIZE => next.header_table_size = value,
                settings_id::ENABLE_PUSH => {
                    if value > 1 {
                        return Err(H2Error::Protocol("ENABLE_PUSH must be 0 or 1"));
                    }
                    next.enable_push = value;
                }
                settings_id::MAX_CONCURRENT_STREAMS => next.max_concurrent_streams = value,
                settings_id::INITIAL_WINDOW_SIZE => {
                    if value > MAX_WINDOW_SIZE {
                        return Err(H2Error::FlowControl("INITIAL_WINDOW_SIZE above 2^31-1"));
                    }
                    next.initial_window_size = value;
                }
                settings_id::MAX_FRAME_SIZE => {
                    if !(MIN_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&value) {
                        return Err(H2Error::Protocol("MAX_FRAME_SIZE out of range"));
                    }
                    next.max_frame_size = value;
                }
                settings_id::MAX_HEADER_LIST_SIZE => next.max_header_list_size = value,
                // Unknown settings MUST be ignored (RFC 7540 Section 6.5.2).
                _ => {}
            }
        }

        *self = next;
        Ok(())
    }
}
