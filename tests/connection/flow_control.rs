//! Tests for connection-level flow control

use h2_engine::frame::{self, flags, frame_type};
use h2_engine::settings::settings_id;
use h2_engine::{ErrorCode, Response, StreamState};

use super::*;

fn data_frames(frames: &[Frame]) -> Vec<&Frame> {
    frames.iter().filter(|f| f.kind() == frame_type::DATA).collect()
}

fn big_body_config() -> Config {
    Config {
        body_capacity: 128 * 1024,
        write_buffer_capacity: 256 * 1024,
        ..Config::default()
    }
}

#[test]
fn test_received_data_is_credited_back() {
    let mut conn = ready_server();
    let mut input = frame(frame_type::HEADERS, flags::END_HEADERS, 1, &request_block("POST", "/"));
    input.extend(frame(frame_type::DATA, 0, 1, &[7; 100]));
    conn.receive(&input);

    let frames = read_frames(&mut conn);
    let updates: Vec<(u32, u32)> = frames
        .iter()
        .filter(|f| f.kind() == frame_type::WINDOW_UPDATE)
        .map(|f| (f.header.stream_id, frame::decode_window_update(&f.payload).unwrap()))
        .collect();
    assert_eq!(updates, vec![(0, 100), (1, 100)]);
    assert_eq!(conn.flow_control().incoming.used(), 0);
}

#[test]
fn test_final_data_credits_connection_only() {
    let mut conn = ready_server();
    let mut input = frame(frame_type::HEADERS, flags::END_HEADERS, 1, &request_block("POST", "/"));
    input.extend(frame(frame_type::DATA, flags::END_STREAM, 1, &[7; 10]));
    conn.receive(&input);

    let frames = read_frames(&mut conn);
    let updates: Vec<u32> = frames
        .iter()
        .filter(|f| f.kind() == frame_type::WINDOW_UPDATE)
        .map(|f| f.header.stream_id)
        .collect();
    assert_eq!(updates, vec![0]);
}

#[test]
fn test_padding_counts_against_window() {
    let mut conn = ready_server();
    let mut input = frame(frame_type::HEADERS, flags::END_HEADERS, 1, &request_block("POST", "/"));
    let mut payload = vec![9];
    payload.extend_from_slice(b"ab");
    payload.extend_from_slice(&[0; 9]);
    input.extend(frame(frame_type::DATA, flags::PADDED | flags::END_STREAM, 1, &payload));
    conn.receive(&input);

    let frames = read_frames(&mut conn);
    let update = frames.iter().find(|f| f.kind() == frame_type::WINDOW_UPDATE).unwrap();
    assert_eq!(frame::decode_window_update(&update.payload).unwrap(), 12);
    assert_eq!(conn.body(), b"ab");
}

#[test]
fn test_body_larger_than_window_waits_for_credit() {
    let mut conn = ready_server_with(big_body_config());
    conn.receive(&get(1, "/big"));
    conn.respond(&Response::new(200).with_body(vec![1u8; 100_000])).unwrap();

    let frames = read_frames(&mut conn);
    let data = data_frames(&frames);
    let sizes: Vec<u32> = data.iter().map(|f| f.header.length).collect();
    assert_eq!(sizes, vec![16_384, 16_384, 16_384, 16_383]);
    assert!(data.iter().all(|f| !f.header.is_end_stream()));
    assert_eq!(conn.flow_control().outgoing.available(), 0);
    assert_eq!(conn.stream_state(), StreamState::HalfClosedRemote);

    conn.receive(&window_update(0, 40_000));
    let frames = read_frames(&mut conn);
    let data = data_frames(&frames);
    let sizes: Vec<u32> = data.iter().map(|f| f.header.length).collect();
    assert_eq!(sizes, vec![16_384, 16_384, 1_697]);
    assert!(data.last().unwrap().header.is_end_stream());
    assert_eq!(conn.stream_state(), StreamState::Idle);
}

#[test]
fn test_data_frames_follow_peer_max_frame_size() {
    let mut conn = ready_server_with(big_body_config());
    conn.receive(&settings(&[(settings_id::MAX_FRAME_SIZE, 32_768)]));
    read_frames(&mut conn);

    conn.receive(&get(1, "/"));
    conn.respond(&Response::new(200).with_body(vec![0u8; 40_000])).unwrap();

    let frames = read_frames(&mut conn);
    let sizes: Vec<u32> = data_frames(&frames).iter().map(|f| f.header.length).collect();
    assert_eq!(sizes, vec![32_768, 7_232]);
}

#[test]
fn test_small_write_buffer_drains_in_pieces() {
    let config = Config {
        body_capacity: 64 * 1024,
        ..Config::default()
    };
    let mut conn = ready_server_with(config);
    conn.receive(&get(1, "/"));
    conn.respond(&Response::new(200).with_body(vec![3u8; 60_000])).unwrap();

    let frames = read_frames(&mut conn);
    let data = data_frames(&frames);
    let total: u32 = data.iter().map(|f| f.header.length).sum();
    assert_eq!(total, 60_000);
    assert!(data.iter().all(|f| f.header.length <= 16_384));
    assert!(data.last().unwrap().header.is_end_stream());
}

#[test]
fn test_window_update_zero_is_protocol_error() {
    let mut conn = ready_server();
    conn.receive(&window_update(0, 0));

    let frames = read_frames(&mut conn);
    let goaway = find_goaway(&frames).unwrap();
    assert_eq!(goaway.error_code, ErrorCode::ProtocolError);
    assert!(conn.is_closed());
}

#[test]
fn test_stream_window_update_zero_is_protocol_error() {
    let mut conn = ready_server();
    conn.receive(&frame(frame_type::HEADERS, flags::END_HEADERS, 1, &request_block("POST", "/")));
    conn.receive(&window_update(1, 0));
    let goaway = find_goaway(&read_frames(&mut conn)).unwrap();
    assert_eq!(goaway.error_code, ErrorCode::ProtocolError);
}

#[test]
fn test_credit_beyond_data_in_flight_is_protocol_error() {
    let mut conn = ready_server();
    conn.receive(&window_update(0, 1_000_000));

    let goaway = find_goaway(&read_frames(&mut conn)).unwrap();
    assert_eq!(goaway.error_code, ErrorCode::ProtocolError);
    assert!(conn.is_closed());
}

#[test]
fn test_credit_up_to_data_in_flight_is_accepted() {
    let mut conn = ready_server();
    conn.receive(&get(1, "/"));
    conn.respond(&Response::new(200).with_body(vec![0u8; 500])).unwrap();
    read_frames(&mut conn);

    conn.receive(&window_update(0, 500));
    assert_eq!(conn.flow_control().outgoing.used(), 0);
    conn.receive(&window_update(0, 1));
    let goaway = find_goaway(&read_frames(&mut conn)).unwrap();
    assert_eq!(goaway.error_code, ErrorCode::ProtocolError);
}

#[test]
fn test_lenient_window_updates_clamp_excess_credit() {
    let config = Config {
        lenient_window_updates: true,
        ..Config::default()
    };
    let mut conn = ready_server_with(config);
    conn.receive(&window_update(0, 1_000_000));
    assert_eq!(conn.flow_control().outgoing.available(), 65_535);
    assert_eq!(conn.state(), h2_engine::ConnectionState::Ready);
    assert!(read_frames(&mut conn).is_empty());
}

#[test]
fn test_window_update_on_idle_stream_rejected() {
    let mut conn = ready_server();
    conn.receive(&window_update(5, 10));
    let goaway = find_goaway(&read_frames(&mut conn)).unwrap();
    assert_eq!(goaway.error_code, ErrorCode::ProtocolError);
}

#[test]
fn test_window_update_on_closed_stream_ignored() {
    let mut conn = ready_server();
    conn.receive(&get(1, "/"));
    conn.respond(&Response::new(204)).unwrap();
    read_frames(&mut conn);

    conn.receive(&window_update(1, 10));
    assert!(read_frames(&mut conn).is_empty());
    assert_eq!(conn.state(), h2_engine::ConnectionState::Ready);
}

#[test]
fn test_body_over_capacity_is_internal_error() {
    let config = Config {
        body_capacity: 16,
        ..Config::default()
    };
    let mut conn = ready_server_with(config);
    let mut input = frame(frame_type::HEADERS, flags::END_HEADERS, 1, &request_block("POST", "/"));
    input.extend(frame(frame_type::DATA, flags::END_STREAM, 1, &[0; 17]));
    conn.receive(&input);

    let goaway = find_goaway(&read_frames(&mut conn)).unwrap();
    assert_eq!(goaway.error_code, ErrorCode::InternalError);
}
