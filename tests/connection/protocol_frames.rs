//! Tests for PING, SETTINGS and WINDOW_UPDATE handling, and ring-fed input

use h2_engine::frame::{self, flags, frame_type};
use h2_engine::settings::settings_id;
use h2_engine::{ConnectionState, Event, HpackDecoder, Response, RingBuffer};

use super::*;

#[test]
fn test_ping_is_acknowledged() {
    let mut conn = ready_server();
    conn.receive(&frame(frame_type::PING, 0, 0, &[1, 2, 3, 4, 5, 6, 7, 8]));

    let frames = read_frames(&mut conn);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind(), frame_type::PING);
    assert!(frames[0].header.is_ack());
    assert_eq!(frames[0].payload, [1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_ping_ack_raises_event() {
    let mut conn = ready_server();
    let data = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE];
    conn.receive(&frame(frame_type::PING, flags::ACK, 0, &data));

    assert_eq!(conn.poll_event(), Some(Event::PingAck(data)));
    assert!(!conn.has_pending_output());
}

#[test]
fn test_send_ping_round_trip() {
    let mut conn = ready_server();
    conn.send_ping(*b"liveness").unwrap();

    let frames = read_frames(&mut conn);
    assert_eq!(frames[0].kind(), frame_type::PING);
    assert!(!frames[0].header.is_ack());
    assert_eq!(frames[0].payload, b"liveness");

    conn.receive(&frame(frame_type::PING, flags::ACK, 0, b"liveness"));
    assert_eq!(conn.poll_event(), Some(Event::PingAck(*b"liveness")));
}

#[test]
fn test_send_ping_needs_open_connection() {
    let mut conn = server();
    assert!(conn.send_ping([0; 8]).is_err());
    conn.shutdown();
    assert!(conn.send_ping([0; 8]).is_err());
}

#[test]
fn test_peer_settings_are_acknowledged() {
    let mut conn = ready_server();
    conn.receive(&settings(&[
        (settings_id::HEADER_TABLE_SIZE, 8192),
        (settings_id::INITIAL_WINDOW_SIZE, 65_535),
        (settings_id::MAX_FRAME_SIZE, 16_384),
    ]));

    let frames = read_frames(&mut conn);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind(), frame_type::SETTINGS);
    assert!(frames[0].header.is_ack());
    assert_eq!(conn.remote_settings().header_table_size, 8192);
}

#[test]
fn test_unknown_setting_ignored() {
    let mut conn = ready_server();
    conn.receive(&settings(&[(0xff, 42), (settings_id::MAX_CONCURRENT_STREAMS, 1)]));
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(conn.remote_settings().max_concurrent_streams, 1);
    assert!(read_frames(&mut conn)[0].header.is_ack());
}

#[test]
fn test_peer_table_size_zero_reaches_encoder() {
    let mut conn = ready_server();
    conn.receive(&settings(&[(settings_id::HEADER_TABLE_SIZE, 0)]));
    read_frames(&mut conn);

    conn.receive(&get(1, "/"));
    conn.respond(&Response::new(200).with_header("server", "engine")).unwrap();
    let frames = read_frames(&mut conn);
    let headers = &frames[0];
    assert_eq!(headers.kind(), frame_type::HEADERS);
    // Dynamic table size update to 0 leads the block.
    assert_eq!(headers.payload[0], 0x20);

    let mut decoder = HpackDecoder::default();
    let decoded = decoder.decode(&headers.payload).unwrap();
    assert_eq!(decoded[0], h2_engine::H2Header::new(":status", "200"));
    assert_eq!(decoder.table().len(), 0);
}

#[test]
fn test_window_update_clears_reserved_bit() {
    let mut conn = ready_server();
    conn.receive(&get(1, "/"));
    conn.respond(&Response::new(200).with_body(vec![0u8; 1000])).unwrap();
    read_frames(&mut conn);
    assert_eq!(conn.flow_control().outgoing.used(), 1000);

    conn.receive(&frame(frame_type::WINDOW_UPDATE, 0, 0, &[0x80, 0, 0x01, 0x00]));
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(conn.flow_control().outgoing.used(), 1000 - 256);
    assert_eq!(frame::decode_window_update(&[0x80, 0, 0x01, 0x00]).unwrap(), 256);
}

#[test]
fn test_receive_from_ring() {
    let mut conn = server();
    let mut ring = RingBuffer::new(32 * 1024);
    let mut input = client_hello();
    input.extend(settings_ack());
    input.extend(get(1, "/ring"));

    // Everything but the last byte of the request.
    ring.write(&input[..input.len() - 1]).unwrap();
    conn.receive_from(&mut ring);
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert!(conn.request().is_none());
    assert!(!ring.is_empty());

    ring.write(&input[input.len() - 1..]).unwrap();
    conn.receive_from(&mut ring);
    assert!(ring.is_empty());
    assert_eq!(conn.request().unwrap().path(), Some(&b"/ring"[..]));
}

#[test]
fn test_feed_buffers_partial_frames() {
    let mut conn = server();
    let mut input = client_hello();
    input.extend(settings_ack());
    input.extend(get(1, "/fed"));

    for byte in &input[..input.len() - 1] {
        assert_eq!(conn.feed(std::slice::from_ref(byte)), 1);
    }
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert!(conn.request().is_none());
    assert!(conn.buffered_input() > 0);

    assert_eq!(conn.feed(&input[input.len() - 1..]), 1);
    assert_eq!(conn.buffered_input(), 0);
    assert_eq!(conn.request().unwrap().path(), Some(&b"/fed"[..]));
}

#[test]
fn test_feed_holds_input_while_request_pending() {
    let mut conn = ready_server();
    let mut input = get(1, "/a");
    input.extend(get(3, "/b"));
    assert_eq!(conn.feed(&input), input.len());
    assert_eq!(conn.request().unwrap().stream_id, 1);
    assert_eq!(conn.buffered_input(), get(3, "/b").len());

    conn.respond(&Response::new(204)).unwrap();
    conn.feed(&[]);
    assert_eq!(conn.request().unwrap().stream_id, 3);
    assert_eq!(conn.buffered_input(), 0);
}

#[test]
fn test_feed_accepts_only_what_the_read_ring_holds() {
    let config = h2_engine::Config {
        read_buffer_capacity: 16_393,
        ..h2_engine::Config::default()
    };
    let mut conn = ready_server_with(config);
    assert_eq!(conn.feed(&get(1, "/")), get(1, "/").len());
    assert!(conn.request().is_some());

    assert_eq!(conn.feed(&[0u8; 20_000]), 16_393);
    assert_eq!(conn.buffered_input(), 16_393);
    assert_eq!(conn.feed(b"more"), 0);
}

#[test]
fn test_pending_output_and_consume() {
    let mut conn = server();
    conn.receive(&client_hello());

    let out = conn.pending_output().to_vec();
    assert!(conn.has_pending_output());
    let first = FrameHeader::parse(&out).unwrap();
    assert_eq!(first.frame_type, frame_type::SETTINGS);
    assert!(!first.is_ack());

    conn.consume_output(first.total_size());
    let next = FrameHeader::parse(conn.pending_output()).unwrap();
    assert!(next.is_ack());
    conn.consume_output(next.total_size());
    assert!(!conn.has_pending_output());
    assert!(conn.pending_output().is_empty());
}
