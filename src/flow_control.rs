//! HTTP/2 flow control window tracking (RFC 7540 Section 6.9).
//!
//! Only connection-level windows are modeled; with a single live stream
//! the connection window is the binding constraint.

use crate::error::H2Error;

/// Default initial window size (RFC 7540 Section 6.9.2).
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;

/// Largest legal window (2^31 - 1).
pub const MAX_WINDOW_SIZE: u32 = 0x7fff_ffff;

/// A credit window: `size` agreed at setup, `used` consumed but not yet
/// credited back. `used <= size` always holds; an operation that would
/// break it fails and leaves the window unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    size: u32,
    used: u32,
}

impl Window {
    pub fn new(size: u32) -> Self {
        Self { size, used: 0 }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn available(&self) -> u32 {
        self.size - self.used
    }

    /// Account for `n` bytes of DATA we are about to send.
    pub fn on_send(&mut self, n: u32) -> Result<(), H2Error> {
        if n > self.available() {
            return Err(H2Error::FlowControl("send exceeds window"));
        }
        self.used += n;
        Ok(())
    }

    /// Account for `n` bytes of DATA received from the peer.
    pub fn on_receive(&mut self, n: u32) -> Result<(), H2Error> {
        if n > self.available() {
            return Err(H2Error::FlowControl("peer exceeded window"));
        }
        self.used += n;
        Ok(())
    }

    /// Credit `n` bytes back.
    pub fn on_window_update(&mut self, n: u32) -> Result<(), H2Error> {
        if n == 0 {
            return Err(H2Error::Protocol("WINDOW_UPDATE increment of 0"));
        }
        if n > self.used {
            return Err(H2Error::Protocol("WINDOW_UPDATE beyond consumed credit"));
        }
        self.used -= n;
        Ok(())
    }

    /// Start over with a new size and nothing consumed.
    pub fn reset(&mut self, size: u32) {
        self.size = size;
        self.used = 0;
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

/// The connection's window pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowControl {
    /// Credit we granted the peer.
    pub incoming: Window,
    /// Credit the peer granted us.
    pub outgoing: Window,
}

impl FlowControl {
    pub fn new(incoming: u32, outgoing: u32) -> Self {
        Self {
            incoming: Window::new(incoming),
            outgoing: Window::new(outgoing),
        }
    }
}
