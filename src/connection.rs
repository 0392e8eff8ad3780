//! HTTP/2 connection state machine.
//!
//! A [`Connection`] owns everything one HTTP/2 connection needs: the parse
//! position, both settings tables, the single stream slot, the flow-control
//! windows, the HPACK contexts, a read ring, and a write ring for outgoing
//! frames. It never touches a socket. The embedder feeds received bytes to
//! [`Connection::receive`], which reports how many it consumed, or hands
//! them to [`Connection::feed`] to be buffered in the read ring, and drains
//! frames to send from [`Connection::pending_output`].
//!
//! ```text
//! WaitingPreface -> WaitingSettings -> Ready -> Closing -> Closed
//! ```
//!
//! Every protocol violation is connection-fatal: one GOAWAY carrying the
//! error code is queued, further input is discarded, and the connection
//! closes once the GOAWAY has been drained.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::config::{Config, Role};
use crate::error::{ConfigError, ErrorCode, H2Error, HeaderListError};
use crate::flow_control::{FlowControl, DEFAULT_WINDOW_SIZE};
use crate::frame::{self, flags, frame_type, FrameCheck, FrameHeader, CONNECTION_PREFACE, FRAME_HEADER_LEN};
use crate::headers::HeaderList;
use crate::hpack::{H2Header, HpackDecoder, HpackEncoder, DEFAULT_TABLE_SIZE};
use crate::ring_buffer::RingBuffer;
use crate::settings::Settings;
use crate::stream::{Direction, Stream, StreamState};

/// Highest stream id a client may open.
pub const MAX_STREAM_ID: u32 = 0x7fff_ffff;

/// Free write-ring space required before another frame is read, so that
/// any reply it provokes plus a GOAWAY always fits.
const CONTROL_RESERVE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Server side, before the 24-byte client preface.
    WaitingPreface,
    /// Preface done, waiting for the peer's first SETTINGS.
    WaitingSettings,
    Ready,
    /// GOAWAY sent. Only GOAWAY, SETTINGS and PING are still processed.
    Closing,
    Closed,
}

/// Where the frame parser stands. The header of a frame whose payload has
/// not fully arrived is kept here so it is never parsed twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Header,
    Payload(FrameHeader, FrameCheck),
}

/// Outcome of a `check_incoming_*_condition` predicate. Failures come back
/// as `Err` and close the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    NoError,
    AckReceived,
}

/// Notifications for the embedder, drained with [`Connection::poll_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// SETTINGS exchanged, streams may flow.
    Ready,
    /// A complete request is waiting in [`Connection::request`].
    Request { stream_id: u32 },
    /// A complete response is in [`Connection::response_headers`] and
    /// [`Connection::body`].
    Response { stream_id: u32 },
    StreamReset { stream_id: u32, error_code: ErrorCode },
    PingAck([u8; 8]),
    GoAway { last_stream_id: u32, error_code: ErrorCode },
    Closed { error_code: ErrorCode },
}

/// A decoded request, borrowed from the connection.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub stream_id: u32,
    pub headers: &'a HeaderList,
    pub body: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn method(&self) -> Option<&'a [u8]> {
        self.headers.get(b":method")
    }

    pub fn path(&self) -> Option<&'a [u8]> {
        self.headers.get(b":path")
    }

    pub fn scheme(&self) -> Option<&'a [u8]> {
        self.headers.get(b":scheme")
    }

    pub fn authority(&self) -> Option<&'a [u8]> {
        self.headers.get(b":authority")
    }

    pub fn header(&self, name: &[u8]) -> Option<&'a [u8]> {
        self.headers.get(name)
    }
}

/// A response produced by a [`Handler`]. `:status` is added by the
/// connection and must not appear in `headers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<H2Header>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(H2Header::new(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Resource dispatch: turns one complete request into one response.
pub trait Handler {
    fn handle(&mut self, request: &Request<'_>) -> Response;
}

impl<F> Handler for F
where
    F: FnMut(&Request<'_>) -> Response,
{
    fn handle(&mut self, request: &Request<'_>) -> Response {
        self(request)
    }
}

/// One HTTP/2 connection with a single concurrent stream.
pub struct Connection {
    config: Config,
    state: ConnectionState,
    read_state: ReadState,

    /// Settings the peer has acknowledged, governing what we accept.
    local: Settings,
    /// Settings sent but not yet acknowledged.
    pending_local: Option<Settings>,
    /// Settings the peer announced, governing what we send.
    remote: Settings,

    stream: Stream,
    last_open_stream_id: u32,
    next_stream_id: u32,
    flow: FlowControl,

    decoder: HpackDecoder,
    encoder: HpackEncoder,
    incoming_headers: HeaderList,
    outgoing_headers: HeaderList,
    /// HEADERS + CONTINUATION fragments awaiting END_HEADERS.
    header_block: Vec<u8>,
    header_block_end_stream: bool,
    waiting_for_end_headers: bool,
    headers_received: bool,
    body: Vec<u8>,

    /// Compressed outgoing header block, written once it fits.
    encoded: Vec<u8>,
    headers_pending: bool,
    outgoing_body: Vec<u8>,
    outgoing_body_sent: usize,
    body_pending: bool,

    /// A request was delivered and awaits [`Connection::respond`]. Input is
    /// not consumed meanwhile.
    request_pending: bool,
    sent_goaway: bool,
    received_goaway: bool,
    /// A connection error was raised. All further input is discarded.
    fatal: bool,
    close_code: ErrorCode,

    /// Bytes accepted by [`Connection::feed`] and not yet consumed.
    inbound: RingBuffer,
    out: RingBuffer,
    /// Bounded by `config.event_capacity`; the oldest event is dropped when
    /// full.
    events: VecDeque<Event>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.config.role)
            .field("state", &self.state)
            .field("read_state", &self.read_state)
            .field("stream", &self.stream)
            .field("last_open_stream_id", &self.last_open_stream_id)
            .field("flow", &self.flow)
            .field("buffered_input", &self.inbound.len())
            .field("pending_output", &self.out.len())
            .field("queued_events", &self.events.len())
            .finish()
    }
}

impl Connection {
    /// Allocate every buffer the connection will ever use. A client
    /// connection queues its preface and SETTINGS immediately.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut conn = Self {
            state: ConnectionState::WaitingPreface,
            read_state: ReadState::Header,
            local: Settings::default(),
            pending_local: None,
            remote: Settings::default(),
            stream: Stream::default(),
            last_open_stream_id: 0,
            next_stream_id: 1,
            flow: FlowControl::default(),
            decoder: HpackDecoder::with_string_capacity(
                DEFAULT_TABLE_SIZE,
                config.hpack_max_integer,
                config.header_list_capacity,
            ),
            encoder: HpackEncoder::new(config.encoder_table_size),
            incoming_headers: HeaderList::new(config.header_list_capacity),
            outgoing_headers: HeaderList::new(config.header_list_capacity),
            header_block: Vec::with_capacity(config.header_block_capacity),
            header_block_end_stream: false,
            waiting_for_end_headers: false,
            headers_received: false,
            body: Vec::with_capacity(config.body_capacity),
            encoded: Vec::with_capacity(config.header_block_capacity),
            headers_pending: false,
            outgoing_body: Vec::with_capacity(config.body_capacity),
            outgoing_body_sent: 0,
            body_pending: false,
            request_pending: false,
            sent_goaway: false,
            received_goaway: false,
            fatal: false,
            close_code: ErrorCode::NoError,
            inbound: RingBuffer::new(config.read_buffer_capacity),
            out: RingBuffer::new(config.write_buffer_capacity),
            events: VecDeque::with_capacity(config.event_capacity),
            config,
        };
        conn.start();
        Ok(conn)
    }

    /// Return to the freshly created state, keeping every allocation.
    pub fn reset(&mut self) {
        self.state = ConnectionState::WaitingPreface;
        self.read_state = ReadState::Header;
        self.local = Settings::default();
        self.pending_local = None;
        self.remote = Settings::default();
        self.stream.reset();
        self.last_open_stream_id = 0;
        self.next_stream_id = 1;
        self.flow = FlowControl::new(DEFAULT_WINDOW_SIZE, DEFAULT_WINDOW_SIZE);
        self.decoder.reset(DEFAULT_TABLE_SIZE);
        self.encoder.reset();
        self.incoming_headers.clear();
        self.outgoing_headers.clear();
        self.header_block.clear();
        self.header_block_end_stream = false;
        self.waiting_for_end_headers = false;
        self.headers_received = false;
        self.body.clear();
        self.encoded.clear();
        self.headers_pending = false;
        self.outgoing_body.clear();
        self.outgoing_body_sent = 0;
        self.body_pending = false;
        self.request_pending = false;
        self.sent_goaway = false;
        self.received_goaway = false;
        self.fatal = false;
        self.close_code = ErrorCode::NoError;
        self.inbound.clear();
        self.out.clear();
        self.events.clear();
        self.start();
    }

    fn start(&mut self) {
        if self.config.role == Role::Client {
            if let Err(err) = self.write(CONNECTION_PREFACE) {
                self.fail(err);
                return;
            }
            self.set_state(ConnectionState::WaitingSettings);
            if let Err(err) = self.send_local_settings() {
                self.fail(err);
            }
        }
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn stream_id(&self) -> u32 {
        self.stream.id
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream.state
    }

    pub fn last_open_stream_id(&self) -> u32 {
        self.last_open_stream_id
    }

    pub fn local_settings(&self) -> &Settings {
        &self.local
    }

    pub fn remote_settings(&self) -> &Settings {
        &self.remote
    }

    pub fn flow_control(&self) -> &FlowControl {
        &self.flow
    }

    /// Error code carried by the GOAWAY we sent, or the reason we closed.
    pub fn close_code(&self) -> ErrorCode {
        self.close_code
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Number of events waiting in [`poll_event`](Self::poll_event).
    pub fn queued_events(&self) -> usize {
        self.events.len()
    }

    fn push_event(&mut self, event: Event) {
        if self.events.len() >= self.config.event_capacity {
            if let Some(dropped) = self.events.pop_front() {
                warn!(?dropped, "event queue full, oldest event dropped");
            }
        }
        self.events.push_back(event);
    }

    // ---- input ----

    /// Consume as much of `input` as forms complete protocol units and
    /// return the number of bytes used. Unconsumed bytes must be offered
    /// again, extended with whatever arrives next.
    ///
    /// Once the connection is closed, or after a connection error, input
    /// is swallowed whole.
    pub fn receive(&mut self, input: &[u8]) -> usize {
        let mut consumed = 0;
        while !self.discards_input() {
            let n = self.step(&input[consumed..]);
            if n == 0 {
                break;
            }
            consumed += n;
        }
        if self.discards_input() {
            input.len()
        } else {
            consumed
        }
    }

    /// [`receive`](Self::receive) straight out of a read ring.
    pub fn receive_from(&mut self, input: &mut RingBuffer) -> usize {
        let n = self.receive(input.make_contiguous());
        input.consume(n);
        n
    }

    /// Buffer as much of `bytes` as the read ring holds, then process
    /// everything buffered. Returns how many of `bytes` were accepted; the
    /// rest must be offered again later.
    ///
    /// Partial frames stay in the ring between calls. After
    /// [`respond`](Self::respond), call `feed(&[])` to process input held
    /// back while the request was pending.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let accepted = self.inbound.write_partial(bytes);
        let mut inbound = std::mem::replace(&mut self.inbound, RingBuffer::new(0));
        self.receive_from(&mut inbound);
        self.inbound = inbound;
        accepted
    }

    /// Bytes held in the read ring.
    pub fn buffered_input(&self) -> usize {
        self.inbound.len()
    }

    fn discards_input(&self) -> bool {
        self.fatal || self.state == ConnectionState::Closed
    }

    fn step(&mut self, input: &[u8]) -> usize {
        match self.state {
            ConnectionState::WaitingPreface => self.read_preface(input),
            ConnectionState::Closed => 0,
            _ if self.request_pending => 0,
            _ => match self.read_state {
                ReadState::Header => self.read_frame_header(input),
                ReadState::Payload(header, check) => self.read_frame_payload(header, check, input),
            },
        }
    }

    fn read_preface(&mut self, input: &[u8]) -> usize {
        if !frame::could_be_preface(input) {
            warn!("invalid connection preface");
            self.close_code = ErrorCode::ProtocolError;
            self.set_closed();
            return 0;
        }
        if input.len() < CONNECTION_PREFACE.len() {
            return 0;
        }
        debug!("connection preface received");
        self.set_state(ConnectionState::WaitingSettings);
        if let Err(err) = self.send_local_settings() {
            self.fail(err);
        }
        CONNECTION_PREFACE.len()
    }

    fn read_frame_header(&mut self, input: &[u8]) -> usize {
        let Some(header) = FrameHeader::parse(input) else {
            return 0;
        };
        if self.out.available() < CONTROL_RESERVE {
            trace!(pending = self.out.len(), "write buffer full, pausing input");
            return 0;
        }
        trace!(
            frame_type = header.frame_type,
            flags = header.flags,
            stream_id = header.stream_id,
            length = header.length,
            "frame header"
        );
        match frame::check_frame_errors(&header, self.max_incoming_frame_size()) {
            Err(err) => self.fail(err),
            Ok(check) if header.length == 0 => self.dispatch(&header, check, &[]),
            Ok(check) => self.read_state = ReadState::Payload(header, check),
        }
        FRAME_HEADER_LEN
    }

    fn read_frame_payload(&mut self, header: FrameHeader, check: FrameCheck, input: &[u8]) -> usize {
        let len = header.length as usize;
        if input.len() < len {
            return 0;
        }
        self.read_state = ReadState::Header;
        self.dispatch(&header, check, &input[..len]);
        len
    }

    /// Frames up to the larger of our acknowledged and our pending limit
    /// are accepted.
    fn max_incoming_frame_size(&self) -> u32 {
        match self.pending_local {
            Some(pending) => pending.max_frame_size.max(self.local.max_frame_size),
            None => self.local.max_frame_size,
        }
    }

    fn dispatch(&mut self, header: &FrameHeader, check: FrameCheck, payload: &[u8]) {
        if let Err(err) = self.process_frame(header, check, payload) {
            self.fail(err);
        }
    }

    fn process_frame(&mut self, header: &FrameHeader, check: FrameCheck, payload: &[u8]) -> Result<(), H2Error> {
        if self.waiting_for_end_headers && header.frame_type != frame_type::CONTINUATION {
            return Err(H2Error::Protocol("frame interleaved with a header block"));
        }
        match self.state {
            ConnectionState::WaitingSettings => self.on_initial_settings(header, payload),
            ConnectionState::Ready => self.on_frame(header, check, payload),
            ConnectionState::Closing => match header.frame_type {
                frame_type::GOAWAY | frame_type::SETTINGS | frame_type::PING => self.on_frame(header, check, payload),
                _ => {
                    trace!(frame_type = header.frame_type, "frame ignored while closing");
                    Ok(())
                }
            },
            ConnectionState::WaitingPreface | ConnectionState::Closed => Ok(()),
        }
    }

    fn on_initial_settings(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), H2Error> {
        if header.frame_type != frame_type::SETTINGS {
            return Err(H2Error::Protocol("first frame must be SETTINGS"));
        }
        match self.check_incoming_settings_condition(header)? {
            Condition::AckReceived => {
                self.apply_local_settings();
                Ok(())
            }
            Condition::NoError => {
                self.apply_remote_settings(payload)?;
                self.set_state(ConnectionState::Ready);
                self.push_event(Event::Ready);
                Ok(())
            }
        }
    }

    fn on_frame(&mut self, header: &FrameHeader, check: FrameCheck, payload: &[u8]) -> Result<(), H2Error> {
        match check {
            FrameCheck::Valid => {}
            FrameCheck::NotImplemented => return self.on_not_implemented(header),
            FrameCheck::Unknown => {
                trace!(frame_type = header.frame_type, "unknown frame type ignored");
                return Ok(());
            }
        }
        match header.frame_type {
            frame_type::DATA => self.on_data(header, payload),
            frame_type::HEADERS => self.on_headers(header, payload),
            frame_type::CONTINUATION => self.on_continuation(header, payload),
            frame_type::RST_STREAM => self.on_rst_stream(header, payload),
            frame_type::SETTINGS => self.on_settings(header, payload),
            frame_type::PING => self.on_ping(header, payload),
            frame_type::GOAWAY => self.on_goaway(payload),
            frame_type::WINDOW_UPDATE => self.on_window_update(header, payload),
            _ => Ok(()),
        }
    }

    fn on_not_implemented(&mut self, header: &FrameHeader) -> Result<(), H2Error> {
        match header.frame_type {
            frame_type::PRIORITY => {
                if header.stream_id == 0 {
                    return Err(H2Error::Protocol("PRIORITY on stream 0"));
                }
                if header.length != 5 {
                    return Err(H2Error::FrameSize("PRIORITY payload must be 5 bytes"));
                }
                trace!(stream_id = header.stream_id, "PRIORITY ignored");
                Ok(())
            }
            other => Err(H2Error::NotImplemented(other)),
        }
    }

    // ---- HEADERS / CONTINUATION ----

    fn check_incoming_headers_condition(&self, header: &FrameHeader) -> Result<Condition, H2Error> {
        let id = header.stream_id;
        if self.stream.is_live() {
            if id != self.stream.id {
                return Err(H2Error::Protocol("HEADERS for a second concurrent stream"));
            }
            if !self.stream.can_receive() {
                return Err(H2Error::StreamClosed(id));
            }
            if self.headers_received && !header.is_end_stream() {
                return Err(H2Error::Protocol("trailers without END_STREAM"));
            }
            return Ok(Condition::NoError);
        }
        match self.config.role {
            Role::Server if id % 2 == 1 && id > self.last_open_stream_id => Ok(Condition::NoError),
            Role::Server => Err(H2Error::Protocol("invalid stream id for a new stream")),
            Role::Client if id <= self.last_open_stream_id => Err(H2Error::StreamClosed(id)),
            Role::Client => Err(H2Error::Protocol("HEADERS on an idle stream")),
        }
    }

    fn on_headers(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), H2Error> {
        self.check_incoming_headers_condition(header)?;
        let fragment = frame::headers_payload(header, payload)?;
        if !self.stream.is_live() {
            self.open_stream(header.stream_id);
        }
        self.header_block_end_stream = header.is_end_stream();
        self.append_header_fragment(fragment)?;
        if header.is_end_headers() {
            self.finish_header_block()
        } else {
            self.waiting_for_end_headers = true;
            Ok(())
        }
    }

    fn check_incoming_continuation_condition(&self, header: &FrameHeader) -> Result<Condition, H2Error> {
        if !self.waiting_for_end_headers {
            return Err(H2Error::Protocol("CONTINUATION without a header block"));
        }
        if header.stream_id != self.stream.id {
            return Err(H2Error::Protocol("CONTINUATION on a different stream"));
        }
        Ok(Condition::NoError)
    }

    fn on_continuation(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), H2Error> {
        self.check_incoming_continuation_condition(header)?;
        self.append_header_fragment(payload)?;
        if header.is_end_headers() {
            self.finish_header_block()?;
        }
        Ok(())
    }

    fn append_header_fragment(&mut self, fragment: &[u8]) -> Result<(), H2Error> {
        if self.header_block.len() + fragment.len() > self.config.header_block_capacity {
            return Err(H2Error::Internal("header block exceeds reassembly buffer"));
        }
        self.header_block.extend_from_slice(fragment);
        Ok(())
    }

    fn finish_header_block(&mut self) -> Result<(), H2Error> {
        self.waiting_for_end_headers = false;
        let decoded = self.decoder.decode_into(&self.header_block, &mut self.incoming_headers);
        self.header_block.clear();
        decoded?;

        if self.config.role == Role::Client && self.is_informational() {
            trace!(stream_id = self.stream.id, "informational response skipped");
            self.incoming_headers.clear();
            return Ok(());
        }
        self.headers_received = true;
        trace!(
            stream_id = self.stream.id,
            count = self.incoming_headers.count(),
            "header block decoded"
        );
        if self.header_block_end_stream {
            self.end_of_incoming_stream()?;
        }
        Ok(())
    }

    fn is_informational(&self) -> bool {
        !self.headers_received
            && self
                .incoming_headers
                .get(b":status")
                .map_or(false, |status| status.first() == Some(&b'1'))
    }

    // ---- DATA ----

    fn check_incoming_data_condition(&self, header: &FrameHeader) -> Result<Condition, H2Error> {
        let id = header.stream_id;
        if !self.stream.is_live() || id != self.stream.id {
            return Err(if id <= self.last_open_stream_id {
                H2Error::StreamClosed(id)
            } else {
                H2Error::Protocol("DATA on an idle stream")
            });
        }
        if !self.stream.can_receive() {
            return Err(H2Error::StreamClosed(id));
        }
        if !self.headers_received {
            return Err(H2Error::Protocol("DATA before HEADERS"));
        }
        Ok(Condition::NoError)
    }

    fn on_data(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), H2Error> {
        self.check_incoming_data_condition(header)?;
        // Padding counts against the window too.
        self.flow.incoming.on_receive(header.length)?;
        let data = frame::data_payload(header, payload)?;
        if self.body.len() + data.len() > self.config.body_capacity {
            return Err(H2Error::Internal("body exceeds buffer"));
        }
        self.body.extend_from_slice(data);

        if header.length > 0 {
            self.flow.incoming.on_window_update(header.length)?;
            self.write(&frame::encode_window_update(0, header.length))?;
            if !header.is_end_stream() {
                self.write(&frame::encode_window_update(header.stream_id, header.length))?;
            }
        }
        if header.is_end_stream() {
            self.end_of_incoming_stream()?;
        }
        Ok(())
    }

    // ---- stream lifecycle ----

    fn open_stream(&mut self, id: u32) {
        self.stream.open(id);
        self.last_open_stream_id = id;
        self.incoming_headers.clear();
        self.body.clear();
        self.headers_received = false;
        debug!(stream_id = id, "stream opened");
    }

    fn end_of_incoming_stream(&mut self) -> Result<(), H2Error> {
        let stream_id = self.stream.id;
        let closed = self.stream.change_stream_state_end_stream_flag(Direction::Receiving)?;
        debug!(stream_id, body_len = self.body.len(), "end of stream received");
        match self.config.role {
            Role::Server => {
                self.request_pending = true;
                self.push_event(Event::Request { stream_id });
            }
            Role::Client => self.push_event(Event::Response { stream_id }),
        }
        if closed {
            self.on_stream_closed()?;
        }
        Ok(())
    }

    fn end_of_outgoing_stream(&mut self) -> Result<(), H2Error> {
        let closed = self.stream.change_stream_state_end_stream_flag(Direction::Sending)?;
        trace!(stream_id = self.stream.id, "end of stream sent");
        if closed {
            self.on_stream_closed()?;
        }
        Ok(())
    }

    /// The stream slot is free again. Either the shutdown a received GOAWAY
    /// asked for proceeds, or the next stream id becomes available.
    fn on_stream_closed(&mut self) -> Result<(), H2Error> {
        debug!(stream_id = self.stream.id, "stream closed");
        self.stream.reset();
        self.headers_pending = false;
        self.body_pending = false;
        self.outgoing_body.clear();
        self.outgoing_body_sent = 0;
        if self.received_goaway {
            self.go_away(ErrorCode::NoError);
        } else if self.config.role == Role::Client {
            self.next_stream_id = self.last_open_stream_id.saturating_add(2);
        }
        Ok(())
    }

    // ---- control frames ----

    fn on_rst_stream(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), H2Error> {
        let error_code = frame::decode_rst_stream(payload)?;
        let stream_id = header.stream_id;
        if self.stream.is_live() && stream_id == self.stream.id {
            debug!(stream_id, ?error_code, "stream reset by peer");
            self.request_pending = false;
            self.push_event(Event::StreamReset { stream_id, error_code });
            return self.on_stream_closed();
        }
        if stream_id > self.last_open_stream_id {
            return Err(H2Error::Protocol("RST_STREAM on an idle stream"));
        }
        trace!(stream_id, "RST_STREAM for a closed stream ignored");
        Ok(())
    }

    fn check_incoming_settings_condition(&self, header: &FrameHeader) -> Result<Condition, H2Error> {
        if !header.is_ack() {
            return Ok(Condition::NoError);
        }
        if self.pending_local.is_some() {
            Ok(Condition::AckReceived)
        } else {
            Err(H2Error::Protocol("SETTINGS ACK without pending SETTINGS"))
        }
    }

    fn on_settings(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), H2Error> {
        match self.check_incoming_settings_condition(header)? {
            Condition::AckReceived => {
                self.apply_local_settings();
                Ok(())
            }
            Condition::NoError => {
                self.apply_remote_settings(payload)?;
                // A larger MAX_FRAME_SIZE may unblock queued output.
                self.flush_pending()
            }
        }
    }

    fn send_local_settings(&mut self) -> Result<(), H2Error> {
        let settings = self.config.settings;
        self.write(&settings.encode_frame())?;
        self.pending_local = Some(settings);
        debug!(
            header_table_size = settings.header_table_size,
            max_frame_size = settings.max_frame_size,
            initial_window_size = settings.initial_window_size,
            "local SETTINGS sent"
        );
        Ok(())
    }

    fn apply_local_settings(&mut self) {
        if let Some(settings) = self.pending_local.take() {
            self.local = settings;
            self.decoder.set_max_table_size(settings.header_table_size as usize);
            debug!("local SETTINGS acknowledged");
        }
    }

    fn apply_remote_settings(&mut self, payload: &[u8]) -> Result<(), H2Error> {
        self.remote.apply(payload)?;
        self.encoder.set_peer_table_size(self.remote.header_table_size as usize);
        self.write(&frame::encode_settings_ack())?;
        debug!(
            header_table_size = self.remote.header_table_size,
            max_frame_size = self.remote.max_frame_size,
            max_concurrent_streams = self.remote.max_concurrent_streams,
            "peer SETTINGS applied"
        );
        Ok(())
    }

    fn on_ping(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), H2Error> {
        let data = frame::decode_ping(payload)?;
        if header.is_ack() {
            trace!("PING ACK received");
            self.push_event(Event::PingAck(data));
            Ok(())
        } else {
            self.write(&frame::encode_ping(data, true))
        }
    }

    fn on_goaway(&mut self, payload: &[u8]) -> Result<(), H2Error> {
        let goaway = frame::decode_goaway(payload)?;
        debug!(
            last_stream_id = goaway.last_stream_id,
            error_code = ?goaway.error_code,
            "GOAWAY received"
        );
        self.received_goaway = true;
        self.push_event(Event::GoAway {
            last_stream_id: goaway.last_stream_id,
            error_code: goaway.error_code,
        });

        if self.stream.is_live() && self.config.role == Role::Client && self.stream.id > goaway.last_stream_id {
            // The server will never process our stream.
            let stream_id = self.stream.id;
            self.push_event(Event::StreamReset {
                stream_id,
                error_code: ErrorCode::RefusedStream,
            });
            return self.on_stream_closed();
        }
        if !self.stream.is_live() {
            self.go_away(ErrorCode::NoError);
        }
        Ok(())
    }

    fn on_window_update(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), H2Error> {
        let increment = frame::decode_window_update(payload)?;
        if increment == 0 {
            return Err(H2Error::Protocol("WINDOW_UPDATE increment of 0"));
        }
        if header.stream_id == 0 {
            let credit = if self.config.lenient_window_updates {
                increment.min(self.flow.outgoing.used())
            } else {
                increment
            };
            if credit > 0 {
                self.flow.outgoing.on_window_update(credit)?;
            }
            trace!(increment, available = self.flow.outgoing.available(), "connection window credited");
            return self.flush_pending();
        }
        if header.stream_id > self.last_open_stream_id {
            return Err(H2Error::Protocol("WINDOW_UPDATE on an idle stream"));
        }
        trace!(stream_id = header.stream_id, increment, "stream WINDOW_UPDATE ignored");
        Ok(())
    }

    // ---- output ----

    fn write(&mut self, bytes: &[u8]) -> Result<(), H2Error> {
        self.out.write(bytes)?;
        Ok(())
    }

    /// First contiguous run of queued output. Empty when nothing is queued.
    pub fn pending_output(&self) -> &[u8] {
        self.out.as_slices().0
    }

    pub fn has_pending_output(&self) -> bool {
        !self.out.is_empty()
    }

    /// Mark `n` bytes of [`pending_output`](Self::pending_output) as sent.
    pub fn consume_output(&mut self, n: usize) {
        self.out.consume(n);
        self.on_output_drained();
    }

    /// Copy queued output into `buf`, returning the number of bytes copied.
    pub fn take_output(&mut self, buf: &mut [u8]) -> usize {
        let n = self.out.read(buf);
        self.on_output_drained();
        n
    }

    fn on_output_drained(&mut self) {
        if let Err(err) = self.flush_pending() {
            self.fail(err);
        }
        if self.state == ConnectionState::Closing && self.out.is_empty() {
            self.set_closed();
        }
    }

    /// Write whatever queued HEADERS and DATA the ring, the window and the
    /// peer's frame size allow.
    fn flush_pending(&mut self) -> Result<(), H2Error> {
        if self.state != ConnectionState::Ready {
            return Ok(());
        }
        if self.headers_pending && !self.write_header_block()? {
            return Ok(());
        }
        self.write_body()
    }

    /// HEADERS plus CONTINUATION frames go out all at once so nothing can
    /// interleave with them. Returns false while the ring lacks room.
    fn write_header_block(&mut self) -> Result<bool, H2Error> {
        let max = self.remote.max_frame_size as usize;
        let len = self.encoded.len();
        let frames = len.div_ceil(max).max(1);
        let total = len + frames * FRAME_HEADER_LEN;
        if total + CONTROL_RESERVE > self.out.capacity() {
            return Err(H2Error::Internal("header block larger than the write buffer"));
        }
        if total + CONTROL_RESERVE > self.out.available() {
            trace!(total, "waiting for room to write header block");
            return Ok(false);
        }

        let stream_id = self.stream.id;
        let end_stream = !self.body_pending;
        let first = len.min(max);
        let mut first_flags = if end_stream { flags::END_STREAM } else { 0 };
        if first == len {
            first_flags |= flags::END_HEADERS;
        }
        let header = FrameHeader::new(frame_type::HEADERS, first_flags, stream_id, first as u32);
        self.out.write(&header.serialize())?;
        self.out.write(&self.encoded[..first])?;

        let mut at = first;
        while at < len {
            let n = (len - at).min(max);
            let flags = if at + n == len { flags::END_HEADERS } else { 0 };
            let header = FrameHeader::new(frame_type::CONTINUATION, flags, stream_id, n as u32);
            self.out.write(&header.serialize())?;
            self.out.write(&self.encoded[at..at + n])?;
            at += n;
        }

        trace!(stream_id, block_len = len, frames, end_stream, "header block written");
        self.headers_pending = false;
        if end_stream {
            self.end_of_outgoing_stream()?;
        }
        Ok(true)
    }

    fn write_body(&mut self) -> Result<(), H2Error> {
        while self.body_pending {
            let remaining = self.outgoing_body.len() - self.outgoing_body_sent;
            let room = self.out.available().saturating_sub(FRAME_HEADER_LEN + CONTROL_RESERVE);
            let n = remaining
                .min(self.flow.outgoing.available() as usize)
                .min(self.remote.max_frame_size as usize)
                .min(room);
            if n == 0 {
                trace!(
                    remaining,
                    window = self.flow.outgoing.available(),
                    room,
                    "DATA blocked"
                );
                return Ok(());
            }

            let last = n == remaining;
            let stream_id = self.stream.id;
            self.flow.outgoing.on_send(n as u32)?;
            let header = FrameHeader::new(
                frame_type::DATA,
                if last { flags::END_STREAM } else { 0 },
                stream_id,
                n as u32,
            );
            let start = self.outgoing_body_sent;
            self.out.write(&header.serialize())?;
            self.out.write(&self.outgoing_body[start..start + n])?;
            self.outgoing_body_sent += n;

            if last {
                self.body_pending = false;
                self.end_of_outgoing_stream()?;
            }
        }
        Ok(())
    }

    /// Compress `outgoing_headers` and queue them with `body` on the live
    /// stream.
    fn queue_message(&mut self, body: &[u8]) -> Result<(), H2Error> {
        if body.len() > self.config.body_capacity {
            return Err(H2Error::Internal("body exceeds buffer"));
        }
        self.encoded.clear();
        self.encoder.encode_into(&self.outgoing_headers, &mut self.encoded);
        if self.encoded.len() > self.config.header_block_capacity {
            return Err(H2Error::Internal("encoded header block exceeds buffer"));
        }
        self.outgoing_body.clear();
        self.outgoing_body.extend_from_slice(body);
        self.outgoing_body_sent = 0;
        self.body_pending = !body.is_empty();
        self.headers_pending = true;
        self.flush_pending()
    }

    // ---- server API ----

    /// The request awaiting a response, if any.
    pub fn request(&self) -> Option<Request<'_>> {
        self.request_pending.then(|| Request {
            stream_id: self.stream.id,
            headers: &self.incoming_headers,
            body: &self.body,
        })
    }

    /// Answer the pending request. Input processing resumes afterwards.
    ///
    /// A response that cannot be encoded within the configured buffers is
    /// a connection error: the connection sends GOAWAY(INTERNAL_ERROR).
    pub fn respond(&mut self, response: &Response) -> Result<(), H2Error> {
        if self.config.role != Role::Server || !self.request_pending {
            return Err(H2Error::Internal("no request awaiting a response"));
        }
        self.request_pending = false;
        let result = self.queue_response(response);
        if let Err(err) = &result {
            self.fail(err.clone());
        }
        result
    }

    fn queue_response(&mut self, response: &Response) -> Result<(), H2Error> {
        if !(100..=999).contains(&response.status) {
            return Err(H2Error::Internal("status code out of range"));
        }
        let status = response.status;
        let digits = [
            b'0' + (status / 100) as u8,
            b'0' + (status / 10 % 10) as u8,
            b'0' + (status % 10) as u8,
        ];
        self.outgoing_headers.clear();
        self.outgoing_headers.add(b":status", &digits).map_err(outgoing_header_error)?;
        for h in &response.headers {
            self.outgoing_headers
                .add(h.name.as_bytes(), h.value.as_bytes())
                .map_err(outgoing_header_error)?;
        }
        debug!(stream_id = self.stream.id, status, body_len = response.body.len(), "responding");
        self.queue_message(&response.body)
    }

    /// Feed `input` and answer every request it completes with `handler`.
    /// Returns the bytes consumed, as [`receive`](Self::receive) does.
    /// Requests answered here are not reported through
    /// [`poll_event`](Self::poll_event).
    pub fn serve<H: Handler + ?Sized>(&mut self, input: &[u8], handler: &mut H) -> usize {
        let mut consumed = 0;
        loop {
            consumed += self.receive(&input[consumed..]);
            let Some(request) = self.request() else {
                break;
            };
            let stream_id = request.stream_id;
            let response = handler.handle(&request);
            // The request was handled here, so its event is not reported.
            if self.events.back() == Some(&Event::Request { stream_id }) {
                self.events.pop_back();
            }
            if let Err(err) = self.respond(&response) {
                debug!(%err, "response rejected");
            }
        }
        consumed
    }

    // ---- client API ----

    /// Open the next client stream and queue a request on it. `headers`
    /// carries the pseudo-headers (`:method`, `:scheme`, `:authority`,
    /// `:path`) first.
    pub fn send_request(&mut self, headers: &[H2Header], body: &[u8]) -> Result<u32, H2Error> {
        if self.config.role != Role::Client {
            return Err(H2Error::Internal("only a client sends requests"));
        }
        if self.state != ConnectionState::Ready || self.received_goaway {
            return Err(H2Error::Protocol("connection is not accepting new streams"));
        }
        if self.stream.is_live() {
            return Err(H2Error::Internal("a stream is already open"));
        }
        let stream_id = self.next_stream_id;
        if stream_id > MAX_STREAM_ID {
            return Err(H2Error::Protocol("stream ids exhausted"));
        }

        self.outgoing_headers.clear();
        for h in headers {
            self.outgoing_headers
                .add(h.name.as_bytes(), h.value.as_bytes())
                .map_err(outgoing_header_error)?;
        }
        self.open_stream(stream_id);
        if let Err(err) = self.queue_message(body) {
            self.fail(err.clone());
            return Err(err);
        }
        Ok(stream_id)
    }

    /// Decoded headers of the last response (client) or request (server).
    pub fn response_headers(&self) -> &HeaderList {
        &self.incoming_headers
    }

    /// `:status` of the last response.
    pub fn status(&self) -> Option<u16> {
        let status = self.incoming_headers.get(b":status")?;
        std::str::from_utf8(status).ok()?.parse().ok()
    }

    /// Body of the last request or response.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    // ---- lifecycle ----

    /// Probe the peer. The answer arrives as [`Event::PingAck`].
    pub fn send_ping(&mut self, data: [u8; 8]) -> Result<(), H2Error> {
        match self.state {
            ConnectionState::WaitingSettings | ConnectionState::Ready => self.write(&frame::encode_ping(data, false)),
            _ => Err(H2Error::Protocol("connection is not open")),
        }
    }

    /// Begin a graceful close with GOAWAY(NO_ERROR).
    pub fn shutdown(&mut self) {
        match self.state {
            ConnectionState::WaitingPreface => self.set_closed(),
            ConnectionState::WaitingSettings | ConnectionState::Ready => self.go_away(ErrorCode::NoError),
            ConnectionState::Closing | ConnectionState::Closed => {}
        }
    }

    /// The embedder's timer fired.
    pub fn on_timeout(&mut self) {
        match self.state {
            ConnectionState::WaitingPreface => {
                debug!("timed out waiting for the preface");
                self.set_closed();
            }
            ConnectionState::WaitingSettings | ConnectionState::Ready => {
                if self.pending_local.is_some() {
                    self.fail(H2Error::SettingsTimeout);
                } else {
                    self.go_away(ErrorCode::NoError);
                }
            }
            ConnectionState::Closing => self.set_closed(),
            ConnectionState::Closed => {}
        }
    }

    /// Raise a connection error: GOAWAY with its code once framing is
    /// established, an immediate close before that.
    fn fail(&mut self, err: H2Error) {
        let code = err.code();
        warn!(error = %err, error_code = ?code, state = ?self.state, "connection error");
        self.fatal = true;
        self.request_pending = false;
        match self.state {
            ConnectionState::WaitingPreface => {
                self.close_code = code;
                self.set_closed();
            }
            ConnectionState::Closed => {}
            _ => self.go_away(code),
        }
    }

    fn go_away(&mut self, code: ErrorCode) {
        if self.sent_goaway {
            return;
        }
        self.sent_goaway = true;
        self.close_code = code;
        let last_stream_id = match self.config.role {
            Role::Server => self.last_open_stream_id,
            Role::Client => 0,
        };
        debug!(last_stream_id, error_code = ?code, "sending GOAWAY");
        if self.out.write(&frame::encode_goaway(last_stream_id, code)).is_err() {
            warn!("no room for GOAWAY");
            self.set_closed();
            return;
        }
        self.set_state(ConnectionState::Closing);
    }

    fn set_state(&mut self, state: ConnectionState) {
        debug!(from = ?self.state, to = ?state, "connection state");
        self.state = state;
    }

    fn set_closed(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.set_state(ConnectionState::Closed);
        self.push_event(Event::Closed {
            error_code: self.close_code,
        });
    }
}

fn outgoing_header_error(err: HeaderListError) -> H2Error {
    match err {
        HeaderListError::NoSpace => H2Error::Internal("outgoing headers exceed header list"),
        HeaderListError::NulByte => H2Error::Internal("outgoing header contains NUL"),
    }
}
