//! Fixed-capacity registry of driver slots.
//!
//! A slot is claimed by exactly one worker for the worker's lifetime. The
//! registry lock is only held while scanning for a free entry, releasing one,
//! or copying entries for a status report; everything else a slot does is
//! confined to the owning worker.

use crate::{DriverError, DriverResult, Endpoint};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of concurrently claimed slots
pub const MAX_CONCURRENCY: usize = 16;

const NOT_CONNECTED: usize = usize::MAX;

/// Identifies the worker owning a slot
///
/// The generation distinguishes successive owners of the same registry entry,
/// so a stale token can never release somebody else's claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OwnerToken {
    index: usize,
    generation: u64,
}

impl OwnerToken {
    /// Registry entry this token refers to
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}#{}", self.index, self.generation)
    }
}

/// Read-only view of a slot for the status report
///
/// Holds the immutable slot configuration plus the index of the host the
/// slot is connected to, which the owner updates atomically.
#[derive(Debug)]
pub(crate) struct SlotProbe {
    pub(crate) username: String,
    pub(crate) vhost: String,
    pub(crate) exchange: String,
    pub(crate) endpoints: Vec<Endpoint>,
    connected_host: AtomicUsize,
}

impl SlotProbe {
    pub(crate) fn new(
        username: impl Into<String>,
        vhost: impl Into<String>,
        exchange: impl Into<String>,
        endpoints: Vec<Endpoint>,
    ) -> Self {
        Self {
            username: username.into(),
            vhost: vhost.into(),
            exchange: exchange.into(),
            endpoints,
            connected_host: AtomicUsize::new(NOT_CONNECTED),
        }
    }

    pub(crate) fn set_connected(&self, host_index: usize) {
        self.connected_host.store(host_index, Ordering::Release);
    }

    pub(crate) fn set_disconnected(&self) {
        self.connected_host.store(NOT_CONNECTED, Ordering::Release);
    }

    /// Endpoint of the live connection, if any
    pub(crate) fn connected_endpoint(&self) -> Option<&Endpoint> {
        match self.connected_host.load(Ordering::Acquire) {
            NOT_CONNECTED => None,
            idx => self.endpoints.get(idx),
        }
    }
}

struct Claim {
    token: OwnerToken,
    probe: Arc<SlotProbe>,
}

/// Bounded slot registry
pub struct SlotPool {
    entries: Mutex<Vec<Option<Claim>>>,
    generation: AtomicU64,
}

impl SlotPool {
    /// Create a pool with [`MAX_CONCURRENCY`] entries
    pub fn new() -> Self {
        Self::with_capacity(MAX_CONCURRENCY)
    }

    /// Create a pool with `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new((0..capacity).map(|_| None).collect()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries().len()
    }

    /// Number of claimed entries
    pub fn in_use(&self) -> usize {
        self.entries().iter().filter(|e| e.is_some()).count()
    }

    /// Claim the first free entry
    ///
    /// Fails with [`DriverError::Exhausted`] when every entry is owned.
    pub(crate) fn claim(&self, probe: Arc<SlotProbe>) -> DriverResult<OwnerToken> {
        let mut entries = self.entries();
        let capacity = entries.len();

        let (index, entry) = entries
            .iter_mut()
            .enumerate()
            .find(|(_, e)| e.is_none())
            .ok_or(DriverError::Exhausted { capacity })?;

        let token = OwnerToken {
            index,
            generation: self.generation.fetch_add(1, Ordering::Relaxed),
        };
        *entry = Some(Claim { token, probe });
        Ok(token)
    }

    /// Return an entry to the pool
    ///
    /// Returns `false` if `token` does not own its entry (already released).
    pub(crate) fn release(&self, token: OwnerToken) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(token.index) {
            Some(entry) if entry.as_ref().map(|c| c.token) == Some(token) => {
                *entry = None;
                true
            }
            _ => false,
        }
    }

    /// Copy of every claimed entry, in registry order
    pub(crate) fn claims(&self) -> Vec<(OwnerToken, Arc<SlotProbe>)> {
        self.entries()
            .iter()
            .flatten()
            .map(|c| (c.token, c.probe.clone()))
            .collect()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Option<Claim>>> {
        // Entries are plain data; a panicking holder cannot leave them half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SlotPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}
