//! Tests for the client role

use h2_engine::frame::{flags, frame_type, CONNECTION_PREFACE};
use h2_engine::{Config, ConnectionState, ErrorCode, Event, H2Error, HpackDecoder, StreamState};

use super::*;

fn request_headers(path: &str) -> Vec<H2Header> {
    vec![
        H2Header::new(":method", "GET"),
        H2Header::new(":scheme", "https"),
        H2Header::new(":authority", "sensor.example"),
        H2Header::new(":path", path),
    ]
}

fn response_block(status: &str) -> Vec<u8> {
    HpackEncoder::new(0).encode(&[
        H2Header::new(":status", status),
        H2Header::new("content-type", "text/plain"),
    ])
}

fn ready_client() -> Connection {
    let mut conn = Connection::new(Config::client()).unwrap();
    let mut input = settings(&[]);
    input.extend(settings_ack());
    assert_eq!(conn.receive(&input), input.len());
    assert_eq!(conn.state(), ConnectionState::Ready);
    read_frames_after_preface(&mut conn);
    while conn.poll_event().is_some() {}
    conn
}

/// Drain client output, stripping the preface if it is still queued.
fn read_frames_after_preface(conn: &mut Connection) -> Vec<Frame> {
    if conn.pending_output().starts_with(CONNECTION_PREFACE) {
        conn.consume_output(CONNECTION_PREFACE.len());
    }
    read_frames(conn)
}

#[test]
fn test_client_sends_preface_and_settings() {
    let mut conn = Connection::new(Config::client()).unwrap();
    assert_eq!(conn.state(), ConnectionState::WaitingSettings);
    assert!(conn.pending_output().starts_with(CONNECTION_PREFACE));

    let frames = read_frames_after_preface(&mut conn);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind(), frame_type::SETTINGS);
    assert!(!frames[0].header.is_ack());
}

#[test]
fn test_client_reaches_ready_on_server_settings() {
    let mut conn = Connection::new(Config::client()).unwrap();
    read_frames_after_preface(&mut conn);
    conn.receive(&settings(&[]));

    assert_eq!(conn.poll_event(), Some(Event::Ready));
    let frames = read_frames(&mut conn);
    assert!(frames[0].header.is_ack());
}

#[test]
fn test_send_request_before_ready_fails() {
    let mut conn = Connection::new(Config::client()).unwrap();
    assert!(matches!(
        conn.send_request(&request_headers("/"), b""),
        Err(H2Error::Protocol(_))
    ));
}

#[test]
fn test_server_cannot_send_requests() {
    let mut conn = ready_server();
    assert!(conn.send_request(&request_headers("/"), b"").is_err());
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[test]
fn test_request_and_response() {
    let mut conn = ready_client();
    let stream_id = conn.send_request(&request_headers("/temperature"), b"").unwrap();
    assert_eq!(stream_id, 1);
    assert_eq!(conn.stream_state(), StreamState::HalfClosedLocal);

    let frames = read_frames(&mut conn);
    assert_eq!(frames.len(), 1);
    let headers = &frames[0];
    assert_eq!(headers.kind(), frame_type::HEADERS);
    assert_eq!(headers.header.stream_id, 1);
    assert!(headers.header.is_end_stream());
    assert!(headers.header.is_end_headers());
    let decoded = HpackDecoder::default().decode(&headers.payload).unwrap();
    assert_eq!(decoded, request_headers("/temperature"));

    let mut input = frame(frame_type::HEADERS, flags::END_HEADERS, 1, &response_block("200"));
    input.extend(frame(frame_type::DATA, flags::END_STREAM, 1, b"21.5"));
    assert_eq!(conn.receive(&input), input.len());

    assert_eq!(conn.poll_event(), Some(Event::Response { stream_id: 1 }));
    assert_eq!(conn.status(), Some(200));
    assert_eq!(conn.response_headers().get(b"content-type"), Some(&b"text/plain"[..]));
    assert_eq!(conn.body(), b"21.5");
    assert_eq!(conn.stream_state(), StreamState::Idle);
}

#[test]
fn test_request_with_body() {
    let mut conn = ready_client();
    conn.send_request(&request_headers("/upload"), b"reading=42").unwrap();

    let frames = read_frames(&mut conn);
    let kinds: Vec<u8> = frames.iter().map(Frame::kind).collect();
    assert_eq!(kinds, vec![frame_type::HEADERS, frame_type::DATA]);
    assert!(!frames[0].header.is_end_stream());
    assert!(frames[1].header.is_end_stream());
    assert_eq!(frames[1].payload, b"reading=42");
}

#[test]
fn test_informational_response_skipped() {
    let mut conn = ready_client();
    conn.send_request(&request_headers("/"), b"").unwrap();
    read_frames(&mut conn);

    let mut input = frame(frame_type::HEADERS, flags::END_HEADERS, 1, &response_block("100"));
    input.extend(frame(
        frame_type::HEADERS,
        flags::END_HEADERS | flags::END_STREAM,
        1,
        &response_block("204"),
    ));
    conn.receive(&input);

    assert_eq!(conn.poll_event(), Some(Event::Response { stream_id: 1 }));
    assert_eq!(conn.poll_event(), None);
    assert_eq!(conn.status(), Some(204));
}

#[test]
fn test_stream_ids_advance_by_two() {
    let mut conn = ready_client();
    for expected in [1, 3, 5] {
        let id = conn.send_request(&request_headers("/"), b"").unwrap();
        assert_eq!(id, expected);
        conn.receive(&frame(
            frame_type::HEADERS,
            flags::END_HEADERS | flags::END_STREAM,
            id,
            &response_block("200"),
        ));
        read_frames(&mut conn);
    }
    assert_eq!(conn.last_open_stream_id(), 5);
}

#[test]
fn test_one_stream_at_a_time() {
    let mut conn = ready_client();
    conn.send_request(&request_headers("/"), b"").unwrap();
    assert!(matches!(
        conn.send_request(&request_headers("/"), b""),
        Err(H2Error::Internal(_))
    ));
}

#[test]
fn test_goaway_refuses_unprocessed_stream() {
    let mut conn = ready_client();
    conn.send_request(&request_headers("/"), b"").unwrap();
    read_frames(&mut conn);

    conn.receive(&goaway_frame(0, 0));
    assert_eq!(
        conn.poll_event(),
        Some(Event::GoAway {
            last_stream_id: 0,
            error_code: ErrorCode::NoError,
        })
    );
    assert_eq!(
        conn.poll_event(),
        Some(Event::StreamReset {
            stream_id: 1,
            error_code: ErrorCode::RefusedStream,
        })
    );
    assert!(conn.send_request(&request_headers("/"), b"").is_err());

    let goaway = find_goaway(&read_frames(&mut conn)).unwrap();
    assert_eq!(goaway.last_stream_id, 0);
    assert!(conn.is_closed());
}

#[test]
fn test_response_on_unopened_stream_rejected() {
    let mut conn = ready_client();
    conn.receive(&frame(
        frame_type::HEADERS,
        flags::END_HEADERS | flags::END_STREAM,
        2,
        &response_block("200"),
    ));
    let goaway = find_goaway(&read_frames(&mut conn)).unwrap();
    assert_eq!(goaway.error_code, ErrorCode::ProtocolError);
}
