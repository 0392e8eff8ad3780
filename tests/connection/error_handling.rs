//! Tests for connection errors and the GOAWAY they produce

use h2_engine::frame::{flags, frame_type};
use h2_engine::settings::settings_id;
use h2_engine::{Connection, ConnectionState, ErrorCode, Event};

use super::*;

/// Feed `input` to a ready server and return the GOAWAY code it answers with.
fn goaway_code_for(input: &[u8]) -> ErrorCode {
    let mut conn = ready_server();
    assert_eq!(conn.receive(input), input.len());
    let frames = read_frames(&mut conn);
    assert!(conn.is_closed(), "connection should close after GOAWAY drains");
    find_goaway(&frames).expect("GOAWAY").error_code
}

fn closed_event(conn: &mut Connection) -> Option<ErrorCode> {
    std::iter::from_fn(|| conn.poll_event()).find_map(|e| match e {
        Event::Closed { error_code } => Some(error_code),
        _ => None,
    })
}

#[test]
fn test_window_update_too_short() {
    let input = frame(frame_type::WINDOW_UPDATE, 0, 1, &[0, 0]);
    assert_eq!(goaway_code_for(&input), ErrorCode::FrameSizeError);
}

#[test]
fn test_ping_too_short() {
    let input = frame(frame_type::PING, 0, 0, &[1, 2, 3, 4]);
    assert_eq!(goaway_code_for(&input), ErrorCode::FrameSizeError);
}

#[test]
fn test_goaway_too_short() {
    let input = frame(frame_type::GOAWAY, 0, 0, &[0, 0, 0, 5]);
    assert_eq!(goaway_code_for(&input), ErrorCode::FrameSizeError);
}

#[test]
fn test_rst_stream_too_short() {
    let input = frame(frame_type::RST_STREAM, 0, 1, &[0, 0]);
    assert_eq!(goaway_code_for(&input), ErrorCode::FrameSizeError);
}

#[test]
fn test_settings_length_not_multiple_of_six() {
    let input = frame(frame_type::SETTINGS, 0, 0, &[0, 4, 0, 0, 0]);
    assert_eq!(goaway_code_for(&input), ErrorCode::FrameSizeError);
}

#[test]
fn test_frame_above_max_frame_size() {
    // Only the header is needed to reject it.
    let header = FrameHeader::new(frame_type::DATA, 0, 1, 16_385).serialize();
    assert_eq!(goaway_code_for(&header), ErrorCode::FrameSizeError);
}

#[test]
fn test_padded_data_frame_invalid_padding() {
    let mut input = frame(frame_type::HEADERS, flags::END_HEADERS, 1, &request_block("POST", "/"));
    let mut payload = vec![10];
    payload.extend_from_slice(b"hello");
    input.extend(frame(frame_type::DATA, flags::PADDED, 1, &payload));
    assert_eq!(goaway_code_for(&input), ErrorCode::ProtocolError);
}

#[test]
fn test_padded_headers_invalid_padding() {
    let input = frame(frame_type::HEADERS, flags::PADDED | flags::END_HEADERS, 1, &[4, 0x82]);
    assert_eq!(goaway_code_for(&input), ErrorCode::ProtocolError);
}

#[test]
fn test_headers_on_stream_zero() {
    let input = frame(frame_type::HEADERS, flags::END_HEADERS, 0, &request_block("GET", "/"));
    assert_eq!(goaway_code_for(&input), ErrorCode::ProtocolError);
}

#[test]
fn test_push_promise_is_protocol_error() {
    let input = frame(frame_type::PUSH_PROMISE, flags::END_HEADERS, 1, &[0, 0, 0, 2, 0x82]);
    assert_eq!(goaway_code_for(&input), ErrorCode::ProtocolError);
}

#[test]
fn test_priority_on_stream_zero() {
    let input = frame(frame_type::PRIORITY, 0, 0, &[0, 0, 0, 1, 16]);
    assert_eq!(goaway_code_for(&input), ErrorCode::ProtocolError);
}

#[test]
fn test_priority_wrong_length() {
    let input = frame(frame_type::PRIORITY, 0, 3, &[0, 0, 0, 1]);
    assert_eq!(goaway_code_for(&input), ErrorCode::FrameSizeError);
}

#[test]
fn test_priority_is_ignored() {
    let mut conn = ready_server();
    let input = frame(frame_type::PRIORITY, 0, 3, &[0, 0, 0, 1, 16]);
    assert_eq!(conn.receive(&input), input.len());
    assert!(!conn.has_pending_output());
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[test]
fn test_unknown_frame_type_is_ignored() {
    let mut conn = ready_server();
    let mut input = frame(0x42, 0xff, 7, b"extension payload");
    input.extend(get(1, "/"));
    assert_eq!(conn.receive(&input), input.len());
    assert_eq!(conn.poll_event(), Some(Event::Request { stream_id: 1 }));
}

#[test]
fn test_invalid_initial_window_size() {
    let input = settings(&[(settings_id::INITIAL_WINDOW_SIZE, 0x8000_0000)]);
    assert_eq!(goaway_code_for(&input), ErrorCode::FlowControlError);
}

#[test]
fn test_invalid_max_frame_size_setting() {
    let input = settings(&[(settings_id::MAX_FRAME_SIZE, 100)]);
    assert_eq!(goaway_code_for(&input), ErrorCode::ProtocolError);
}

#[test]
fn test_goaway_names_last_stream() {
    let mut conn = ready_server();
    conn.receive(&get(1, "/"));
    conn.respond(&h2_engine::Response::new(204)).unwrap();
    conn.receive(&frame(frame_type::PING, 0, 0, &[0; 3]));

    let goaway = find_goaway(&read_frames(&mut conn)).unwrap();
    assert_eq!(goaway.last_stream_id, 1);
    assert_eq!(goaway.error_code, ErrorCode::FrameSizeError);
}

#[test]
fn test_single_goaway_and_closed_event() {
    let mut conn = ready_server();
    let mut input = frame(frame_type::PING, 0, 1, &[0; 8]);
    input.extend(frame(frame_type::PING, 0, 1, &[0; 8]));
    conn.receive(&input);

    assert_eq!(conn.state(), ConnectionState::Closing);
    let frames = read_frames(&mut conn);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind(), frame_type::GOAWAY);
    assert!(conn.is_closed());
    assert_eq!(conn.close_code(), ErrorCode::ProtocolError);
    assert_eq!(closed_event(&mut conn), Some(ErrorCode::ProtocolError));
}

#[test]
fn test_closed_connection_swallows_input() {
    let mut conn = ready_server();
    conn.receive(&window_update(0, 0));
    read_frames(&mut conn);
    assert!(conn.is_closed());

    let input = get(1, "/");
    assert_eq!(conn.receive(&input), input.len());
    assert!(conn.request().is_none());
    assert!(!conn.has_pending_output());
}
