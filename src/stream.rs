//! Stream lifecycle (RFC 7540 Section 5.1), reduced to the states a
//! single, push-free stream can reach.

use crate::error::H2Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// Which side set END_STREAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sending,
    Receiving,
}

/// The connection's one stream slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stream {
    pub id: u32,
    pub state: StreamState,
}

impl Stream {
    /// Idle -> Open under `id`.
    pub fn open(&mut self, id: u32) {
        debug_assert_eq!(self.state, StreamState::Idle);
        self.id = id;
        self.state = StreamState::Open;
    }

    /// Apply END_STREAM for one direction. Returns true once both
    /// directions have ended and the stream is closed.
    pub fn change_stream_state_end_stream_flag(&mut self, direction: Direction) -> Result<bool, H2Error> {
        use Direction::*;
        use StreamState::*;

        self.state = match (self.state, direction) {
            (Open, Sending) => HalfClosedLocal,
            (Open, Receiving) => HalfClosedRemote,
            (HalfClosedLocal, Receiving) | (HalfClosedRemote, Sending) => Closed,
            (HalfClosedRemote | Closed, Receiving) => return Err(H2Error::StreamClosed(self.id)),
            (Idle, Receiving) => return Err(H2Error::Protocol("END_STREAM on idle stream")),
            (Idle | HalfClosedLocal | Closed, Sending) => {
                return Err(H2Error::Internal("sending on a stream closed for sending"))
            }
        };
        Ok(self.state == Closed)
    }

    pub fn can_receive(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedLocal)
    }

    pub fn can_send(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Open or half-closed.
    pub fn is_live(&self) -> bool {
        !matches!(self.state, StreamState::Idle | StreamState::Closed)
    }

    /// Return to the idle template for the next stream.
    pub fn reset(&mut self) {
        *self = Stream::default();
    }
}
