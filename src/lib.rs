//! h2-sans-io-engine: a small, sans-I/O HTTP/2 connection engine
//!
//! This crate implements the server (and client) side of an HTTP/2
//! connection for hosts that cannot afford an async runtime or a general
//! purpose HTTP stack: embedded targets, WebAssembly kernels, single-threaded
//! event loops. It owns the protocol, you own the socket.
//!
//! # Features
//!
//! - **Sans-I/O Design**: bytes in, bytes out. Every entry point accepts a
//!   partial frame and reports how many bytes it consumed.
//! - **Fixed memory**: every buffer is sized by [`Config`] and allocated when
//!   a connection (or a [`Pool`] of them) is created.
//! - **In-crate HPACK**: static and dynamic tables, integer and canonical
//!   Huffman coding (RFC 7541), no external codec.
//! - **Strict framing**: RFC 7540 frame validation, HEADERS/CONTINUATION
//!   reassembly, SETTINGS negotiation, PING, GOAWAY and connection-level
//!   flow control.
//! - **One stream at a time**: a single concurrent stream per connection,
//!   advertised through SETTINGS_MAX_CONCURRENT_STREAMS.
//!
//! # Quick Start
//!
//! ```rust
//! use h2_engine::frame::{flags, frame_type, FrameHeader, CONNECTION_PREFACE};
//! use h2_engine::hpack::{H2Header, HpackEncoder};
//! use h2_engine::{Config, Connection, Request, Response};
//!
//! fn frame(kind: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
//!     let header = FrameHeader::new(kind, flags, stream_id, payload.len() as u32);
//!     let mut buf = header.serialize().to_vec();
//!     buf.extend_from_slice(payload);
//!     buf
//! }
//!
//! fn hello(request: &Request<'_>) -> Response {
//!     assert_eq!(request.path(), Some(&b"/hello"[..]));
//!     Response::new(200)
//!         .with_header("content-type", "text/plain")
//!         .with_body("hello")
//! }
//!
//! let mut conn = Connection::new(Config::default()).unwrap();
//!
//! // What a client would send: preface, SETTINGS, one GET.
//! let block = HpackEncoder::default().encode(&[
//!     H2Header::new(":method", "GET"),
//!     H2Header::new(":scheme", "http"),
//!     H2Header::new(":path", "/hello"),
//! ]);
//! let mut input = CONNECTION_PREFACE.to_vec();
//! input.extend(frame(frame_type::SETTINGS, 0, 0, &[]));
//! input.extend(frame(frame_type::HEADERS, flags::END_HEADERS | flags::END_STREAM, 1, &block));
//!
//! let consumed = conn.serve(&input, &mut hello);
//! assert_eq!(consumed, input.len());
//!
//! // SETTINGS, SETTINGS ACK, HEADERS and DATA, ready for the socket.
//! let mut out = vec![0u8; 4096];
//! let n = conn.take_output(&mut out);
//! assert!(n > 0);
//! ```
//!
//! # Architecture
//!
//! - [`frame`]: 9-byte frame headers, per-type validation, control frame
//!   builders
//! - [`hpack`]: header block encoder and decoder over [`hpack::table`],
//!   [`hpack::integer`] and [`hpack::huffman`]
//! - [`headers`]: flat, capacity-bounded header list
//! - [`flow_control`]: send and receive windows
//! - [`connection`]: the state machine tying it all together
//! - [`pool`]: preallocated connections addressed by generation-checked
//!   handles
//!
//! It does NOT provide:
//! - TCP transport (you provide the bytes)
//! - TLS (terminate it in front of the engine)
//! - Server push or stream priorities
//!
//! Logging goes through `tracing`; install a subscriber to see it.

pub mod config;
pub mod connection;
pub mod error;
pub mod flow_control;
pub mod frame;
pub mod headers;
pub mod hpack;
pub mod pool;
pub mod ring_buffer;
pub mod settings;
pub mod stream;

pub use config::{Config, Role};
pub use connection::{Connection, ConnectionState, Event, Handler, Request, Response};
pub use error::{ConfigError, ErrorCode, H2Error, HeaderListError, HpackError, RingBufferError};
pub use flow_control::{FlowControl, Window};
pub use frame::{FrameHeader, CONNECTION_PREFACE};
pub use headers::HeaderList;
pub use hpack::{H2Header, HpackDecoder, HpackEncoder};
pub use pool::{ConnectionHandle, Pool};
pub use ring_buffer::RingBuffer;
pub use settings::Settings;
pub use stream::{Stream, StreamState};
