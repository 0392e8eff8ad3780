//! Connection configuration.
//!
//! [`Config`] sizes every buffer a connection allocates and carries the
//! settings it advertises. [`Config::validate`] runs before anything is
//! allocated.

use crate::error::ConfigError;
use crate::flow_control::MAX_WINDOW_SIZE;
use crate::frame::{FRAME_HEADER_LEN, MAX_FRAME_SIZE_LIMIT, MIN_MAX_FRAME_SIZE};
use crate::settings::Settings;

/// Which end of the connection the engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Waits for the client preface and answers requests.
    #[default]
    Server,
    /// Sends the preface and issues requests.
    Client,
}

/// Sizing and protocol parameters for a connection.
///
/// Every buffer a connection uses is allocated once from these values when
/// the connection (or the pool holding it) is created.
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    /// Settings advertised to the peer. They take effect for incoming
    /// traffic once the peer acknowledges them.
    pub settings: Settings,
    /// Capacity of the read ring behind [`Connection::feed`](crate::Connection::feed).
    /// Must hold one maximum-size frame.
    pub read_buffer_capacity: usize,
    /// Capacity of the outbound byte ring. Must hold one maximum-size frame.
    pub write_buffer_capacity: usize,
    /// Byte capacity of each header list (incoming and outgoing). Also the
    /// longest single name or value the HPACK decoder accepts.
    pub header_list_capacity: usize,
    /// Capacity of the HEADERS/CONTINUATION reassembly buffer, and of the
    /// buffer outgoing header blocks are compressed into.
    pub header_block_capacity: usize,
    /// Capacity of the buffered request or response body.
    pub body_capacity: usize,
    /// Largest integer the HPACK decoder accepts.
    pub hpack_max_integer: u32,
    /// Ceiling for the encoder's dynamic table. 0 disables outgoing indexing.
    pub encoder_table_size: usize,
    /// Events held for [`Connection::poll_event`](crate::Connection::poll_event)
    /// before the oldest is dropped.
    pub event_capacity: usize,
    /// Clamp a connection WINDOW_UPDATE that credits more than is in
    /// flight instead of failing the connection with PROTOCOL_ERROR.
    pub lenient_window_updates: bool,
    /// Number of connection contexts a [`Pool`](crate::pool::Pool) preallocates.
    pub pool_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let header_list_capacity = 4096;
        Self {
            role: Role::Server,
            settings: Settings {
                header_table_size: 4096,
                enable_push: 0,
                max_concurrent_streams: 1,
                initial_window_size: 65_535,
                max_frame_size: MIN_MAX_FRAME_SIZE,
                max_header_list_size: header_list_capacity as u32,
            },
            read_buffer_capacity: 32 * 1024,
            write_buffer_capacity: 32 * 1024,
            header_list_capacity,
            header_block_capacity: 8192,
            body_capacity: 16 * 1024,
            hpack_max_integer: 1 << 20,
            encoder_table_size: 4096,
            event_capacity: 16,
            lenient_window_updates: false,
            pool_capacity: 4,
        }
    }
}

impl Config {
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("read_buffer_capacity", self.read_buffer_capacity),
            ("write_buffer_capacity", self.write_buffer_capacity),
            ("header_list_capacity", self.header_list_capacity),
            ("header_block_capacity", self.header_block_capacity),
            ("body_capacity", self.body_capacity),
            ("hpack_max_integer", self.hpack_max_integer as usize),
            ("event_capacity", self.event_capacity),
            ("pool_capacity", self.pool_capacity),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*name));
        }

        let s = &self.settings;
        if !(MIN_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&s.max_frame_size) {
            return Err(ConfigError::Setting("max_frame_size must be within 16384..=16777215"));
        }
        if s.initial_window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::Setting("initial_window_size must be <= 2^31-1"));
        }
        if s.enable_push > 1 {
            return Err(ConfigError::Setting("enable_push must be 0 or 1"));
        }

        let needed = FRAME_HEADER_LEN + s.max_frame_size as usize;
        for (name, value) in [
            ("read_buffer_capacity", self.read_buffer_capacity),
            ("write_buffer_capacity", self.write_buffer_capacity),
        ] {
            if value < needed {
                return Err(ConfigError::BufferTooSmall { name, value, needed });
            }
        }
        Ok(())
    }
}
