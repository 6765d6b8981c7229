//! Per-connection accounting table.
//!
//! Sharded `parking_lot` mutexes keyed by connection id. The table stores
//! only the host's connection key and byte tallies, never transport state.

use std::collections::HashMap;
use std::fmt;

use parking_lot::{Mutex, MutexGuard};

const SHARD_COUNT: usize = 32;

/// Opaque connection identifier supplied by the host container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConnId {
    fn from(v: u64) -> Self {
        ConnId(v)
    }
}

/// Bytes and packets currently charged to one connection.
///
/// `epoch` distinguishes successive registrations of the same `ConnId`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub epoch: u64,
    pub overhead_bytes: usize,
    pub packet_bytes: usize,
    pub packets_in_flight: u64,
    pub packets_total: u64,
}

impl ConnectionEntry {
    pub fn new(epoch: u64, overhead_bytes: usize) -> Self {
        Self {
            epoch,
            overhead_bytes,
            ..Default::default()
        }
    }

    /// Total bytes this connection holds against the shared budget.
    pub fn charged_bytes(&self) -> usize {
        self.overhead_bytes + self.packet_bytes
    }
}

/// One admitted packet's charge, bound to the registration it was taken on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketCharge {
    pub conn: ConnId,
    pub epoch: u64,
    pub bytes: usize,
}

pub(crate) type Shard = HashMap<ConnId, ConnectionEntry>;

/// Concurrency-safe map from connection id to its accounting entry.
pub struct ConnectionTable {
    shards: Box<[Mutex<Shard>]>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    /// Lock the shard that owns `id`.
    ///
    /// Callers perform check-then-insert sequences while holding the guard.
    pub(crate) fn lock(&self, id: ConnId) -> MutexGuard<'_, Shard> {
        // Fibonacci hashing spreads sequential ids across shards.
        let h = id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        self.shards[(h as usize) % self.shards.len()].lock()
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.lock(id).contains_key(&id)
    }

    pub fn get(&self, id: ConnId) -> Option<ConnectionEntry> {
        self.lock(id).get(&id).cloned()
    }

    pub fn remove(&self, id: ConnId) -> Option<ConnectionEntry> {
        self.lock(id).remove(&id)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}
