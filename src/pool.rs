//! Fixed-size arena of connection contexts.
//!
//! Every [`Connection`] is allocated up front. Acquiring and releasing a
//! slot is a free-list push or pop, so steady-state operation never calls
//! the allocator. Handles carry the slot's generation, which changes on
//! release, so a handle kept past its connection's lifetime stops resolving.

use tracing::debug;

use crate::config::Config;
use crate::connection::Connection;
use crate::error::ConfigError;

/// Address of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    index: u32,
    generation: u32,
}

impl ConnectionHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

struct Slot {
    conn: Connection,
    generation: u32,
    active: bool,
}

pub struct Pool {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

impl Pool {
    /// Preallocate `config.pool_capacity` connections built from `config`.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = config.pool_capacity;
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                conn: Connection::new(config.clone())?,
                generation: 0,
                active: false,
            });
        }
        // Reverse order so pop hands out the lowest index first.
        let free_list = (0..capacity as u32).rev().collect();
        Ok(Self { slots, free_list })
    }

    /// Take a free connection, reset to its initial state.
    pub fn acquire(&mut self) -> Option<ConnectionHandle> {
        let index = self.free_list.pop()?;
        let slot = &mut self.slots[index as usize];
        slot.conn.reset();
        slot.active = true;
        debug!(index, generation = slot.generation, "connection acquired");
        Some(ConnectionHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Return a connection to the pool. Stale or repeated releases are
    /// ignored and reported as false.
    pub fn release(&mut self, handle: ConnectionHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if !slot.active || slot.generation != handle.generation {
            return false;
        }
        slot.active = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        debug!(index = handle.index, "connection released");
        true
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.active && s.generation == handle.generation)
            .map(|s| &s.conn)
    }

    pub fn get_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Connection> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.active && s.generation == handle.generation)
            .map(|s| &mut s.conn)
    }

    /// Number of connections currently handed out.
    pub fn in_use(&self) -> usize {
        self.slots.len().saturating_sub(self.free_list.len())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.free_list.is_empty()
    }
}
