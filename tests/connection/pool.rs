//! Tests for serving connections out of a preallocated pool

use h2_engine::frame::frame_type;
use h2_engine::{Config, ConnectionState, Pool, Request, Response};

use super::*;

fn echo_path(request: &Request<'_>) -> Response {
    Response::new(200).with_body(request.path().unwrap_or_default().to_vec())
}

fn pool(capacity: usize) -> Pool {
    Pool::new(&Config {
        pool_capacity: capacity,
        ..Config::default()
    })
    .unwrap()
}

fn full_exchange(path: &str) -> Vec<u8> {
    let mut input = client_hello();
    input.extend(settings_ack());
    input.extend(get(1, path));
    input
}

#[test]
fn test_connections_are_independent() {
    let mut pool = pool(2);
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();

    let input = full_exchange("/a");
    pool.get_mut(a).unwrap().serve(&input, &mut echo_path);
    pool.get_mut(b).unwrap().receive(&client_hello());

    assert_eq!(pool.get(a).unwrap().last_open_stream_id(), 1);
    assert_eq!(pool.get(b).unwrap().last_open_stream_id(), 0);
    assert_eq!(pool.get(b).unwrap().state(), ConnectionState::Ready);

    let frames = read_frames(pool.get_mut(a).unwrap());
    let data = frames.iter().find(|f| f.kind() == frame_type::DATA).unwrap();
    assert_eq!(data.payload, b"/a");
}

#[test]
fn test_released_connection_comes_back_fresh() {
    let mut pool = pool(1);
    let a = pool.acquire().unwrap();
    let conn = pool.get_mut(a).unwrap();
    conn.serve(&full_exchange("/first"), &mut echo_path);
    conn.shutdown();
    assert!(pool.release(a));

    let b = pool.acquire().unwrap();
    assert_eq!(a.index(), b.index());
    assert!(pool.get_mut(a).is_none());

    let conn = pool.get_mut(b).unwrap();
    assert_eq!(conn.state(), ConnectionState::WaitingPreface);
    assert!(!conn.has_pending_output());
    conn.serve(&full_exchange("/second"), &mut echo_path);
    let frames = read_frames(conn);
    let data = frames.iter().find(|f| f.kind() == frame_type::DATA).unwrap();
    assert_eq!(data.payload, b"/second");
}

#[test]
fn test_stale_handle_cannot_release_new_owner() {
    let mut pool = pool(1);
    let a = pool.acquire().unwrap();
    pool.release(a);
    let b = pool.acquire().unwrap();

    assert!(!pool.release(a));
    assert!(pool.get(b).is_some());
    assert_eq!(pool.in_use(), 1);
}

#[test]
fn test_exhausted_pool_recovers_after_release() {
    let mut pool = pool(3);
    let handles: Vec<_> = std::iter::from_fn(|| pool.acquire()).collect();
    assert_eq!(handles.len(), 3);
    assert!(pool.is_full());

    assert!(pool.release(handles[1]));
    let again = pool.acquire().unwrap();
    assert_eq!(again.index(), handles[1].index());
    assert_eq!(pool.in_use(), pool.capacity());
}
