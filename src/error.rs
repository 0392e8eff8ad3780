//! Error taxonomy for the engine.
//!
//! Every protocol error is fatal to the connection: the engine answers it
//! with a single GOAWAY carrying [`H2Error::code`] and then closes.

use thiserror::Error;

/// HTTP/2 error codes (RFC 7540 Section 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Map a wire value onto a known code. Unknown codes are treated as
    /// INTERNAL_ERROR (RFC 7540 Section 7).
    pub fn from_u32(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::InternalError,
        }
    }

    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Connection-fatal errors raised while processing peer input or while
/// assembling output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum H2Error {
    /// Wrong payload length for a frame type, or a frame above MAX_FRAME_SIZE.
    #[error("frame size error: {0}")]
    FrameSize(&'static str),
    /// Sequencing violation: bad stream id, frame in the wrong state,
    /// header block interleaving.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Window exceeded or invalid window increment.
    #[error("flow control error: {0}")]
    FlowControl(&'static str),
    /// HPACK failure (integer overflow, EOS in a literal, bad padding, bad index).
    #[error("compression error: {0}")]
    Compression(#[from] HpackError),
    /// Local resource exhaustion that corrupts an in-flight exchange.
    #[error("internal error: {0}")]
    Internal(&'static str),
    /// Frame type the engine deliberately does not implement.
    #[error("frame type 0x{0:x} not implemented")]
    NotImplemented(u8),
    /// Frame received on a stream that is already closed for that direction.
    #[error("stream {0} closed")]
    StreamClosed(u32),
    /// Our SETTINGS were never acknowledged.
    #[error("settings acknowledgement timed out")]
    SettingsTimeout,
}

impl H2Error {
    /// The GOAWAY error code announcing this error to the peer.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FrameSize(_) => ErrorCode::FrameSizeError,
            Self::Protocol(_) | Self::NotImplemented(_) => ErrorCode::ProtocolError,
            Self::FlowControl(_) => ErrorCode::FlowControlError,
            Self::Compression(HpackError::HeaderList(_) | HpackError::StringTooLong { .. }) => {
                ErrorCode::InternalError
            }
            Self::Compression(HpackError::InvalidHeaderByte) => ErrorCode::ProtocolError,
            Self::Compression(_) => ErrorCode::CompressionError,
            Self::Internal(_) => ErrorCode::InternalError,
            Self::StreamClosed(_) => ErrorCode::StreamClosed,
            Self::SettingsTimeout => ErrorCode::SettingsTimeout,
        }
    }
}

impl From<RingBufferError> for H2Error {
    fn from(_: RingBufferError) -> Self {
        H2Error::Internal("write buffer full")
    }
}

/// HPACK codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HpackError {
    #[error("integer exceeds limit of {max}")]
    IntegerOverflow { max: u32 },
    #[error("truncated header block")]
    Truncated,
    #[error("EOS symbol inside a huffman literal")]
    EosInString,
    #[error("invalid huffman padding")]
    InvalidPadding,
    #[error("invalid table index {0}")]
    InvalidIndex(u32),
    #[error("dynamic table size update {requested} above limit {max}")]
    TableSizeAboveLimit { requested: u32, max: u32 },
    #[error("dynamic table size update after a header field")]
    LateTableSizeUpdate,
    #[error("header name or value contains a forbidden byte")]
    InvalidHeaderByte,
    #[error("header name or value longer than {max} bytes")]
    StringTooLong { max: usize },
    #[error("header list: {0}")]
    HeaderList(#[from] HeaderListError),
}

/// Header List capacity/content failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderListError {
    /// The flat buffer cannot hold the entry.
    #[error("no space left in header list")]
    NoSpace,
    /// Names and values may not contain NUL (it separates entries).
    #[error("header contains a NUL byte")]
    NulByte,
}

/// Byte ring buffer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingBufferError {
    #[error("ring buffer full: {needed} bytes needed, {available} available")]
    Full { needed: usize, available: usize },
}

/// Rejected [`Config`](crate::config::Config) values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be non-zero")]
    Zero(&'static str),
    #[error("{name} ({value}) must hold at least one frame of {needed} bytes")]
    BufferTooSmall {
        name: &'static str,
        value: usize,
        needed: usize,
    },
    #[error("invalid setting: {0}")]
    Setting(&'static str),
}
