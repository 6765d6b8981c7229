//! Connection and packet admission against the packet memory budget.
//!
//! The controller owns the shared budget and the connection table. Every
//! decision is synchronous and non-blocking apart from a short shard lock.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::error::ServiceError;
use crate::metrics::ServiceMetrics;

use super::budget::MemoryBudget;
use super::connections::{ConnId, ConnectionEntry, ConnectionTable, PacketCharge};

/// Outcome of a connection or packet admission request.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionResult {
    Admitted,
    Rejected(ServiceError),
}

impl AdmissionResult {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionResult::Admitted)
    }

    pub fn rejection(&self) -> Option<&ServiceError> {
        match self {
            AdmissionResult::Admitted => None,
            AdmissionResult::Rejected(e) => Some(e),
        }
    }

    pub fn into_result(self) -> Result<(), ServiceError> {
        match self {
            AdmissionResult::Admitted => Ok(()),
            AdmissionResult::Rejected(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, ServiceError>> for AdmissionResult {
    fn from(r: Result<T, ServiceError>) -> Self {
        match r {
            Ok(_) => AdmissionResult::Admitted,
            Err(e) => AdmissionResult::Rejected(e),
        }
    }
}

/// Host-supplied admission policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Bytes reserved for each admitted connection's bookkeeping.
    pub connection_overhead_bytes: usize,
    /// Cap on packet bytes in flight per connection; 0 = unlimited.
    pub per_connection_packet_bytes: usize,
}

pub struct AdmissionController {
    budget: MemoryBudget,
    table: ConnectionTable,
    metrics: ServiceMetrics,
    next_epoch: AtomicU64,
}

impl AdmissionController {
    pub fn new(ceiling: usize) -> Self {
        Self {
            budget: MemoryBudget::new(ceiling),
            table: ConnectionTable::new(),
            metrics: ServiceMetrics::default(),
            next_epoch: AtomicU64::new(1),
        }
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Register a new connection, reserving its bookkeeping overhead.
    pub fn admit_connection(&self, id: ConnId, policy: &AdmissionPolicy) -> AdmissionResult {
        let overhead = policy.connection_overhead_bytes;
        let result = {
            let mut shard = self.table.lock(id);
            if shard.contains_key(&id) {
                AdmissionResult::Rejected(ServiceError::DuplicateConnection(id))
            } else if !self.budget.try_reserve(overhead) {
                AdmissionResult::Rejected(ServiceError::BudgetExhausted {
                    requested: overhead,
                    available: self.budget.available_bytes(),
                })
            } else {
                let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
                shard.insert(id, ConnectionEntry::new(epoch, overhead));
                AdmissionResult::Admitted
            }
        };

        match &result {
            AdmissionResult::Admitted => {
                ServiceMetrics::incr(&self.metrics.connections_admitted);
                ServiceMetrics::incr(&self.metrics.active_connections);
                ServiceMetrics::add(&self.metrics.bytes_reserved_total, overhead);
            }
            AdmissionResult::Rejected(e) => {
                ServiceMetrics::incr(&self.metrics.connections_rejected);
                self.count_rejection(e);
            }
        }
        result
    }

    /// Charge `bytes` for an inbound packet on the current registration of `id`.
    pub fn charge_packet(
        &self,
        id: ConnId,
        bytes: usize,
        policy: &AdmissionPolicy,
    ) -> Result<PacketCharge, ServiceError> {
        let result = {
            let mut shard = self.table.lock(id);
            match shard.get_mut(&id) {
                None => Err(ServiceError::UnknownConnection(id)),
                Some(entry) => {
                    let cap = policy.per_connection_packet_bytes;
                    let cap_room = if cap == 0 {
                        usize::MAX
                    } else {
                        cap.saturating_sub(entry.packet_bytes)
                    };
                    if bytes <= cap_room && self.budget.try_reserve(bytes) {
                        entry.packet_bytes += bytes;
                        entry.packets_in_flight += 1;
                        entry.packets_total += 1;
                        Ok(PacketCharge {
                            conn: id,
                            epoch: entry.epoch,
                            bytes,
                        })
                    } else {
                        Err(ServiceError::BudgetExhausted {
                            requested: bytes,
                            available: cap_room.min(self.budget.available_bytes()),
                        })
                    }
                }
            }
        };

        match &result {
            Ok(_) => {
                ServiceMetrics::incr(&self.metrics.packets_admitted);
                ServiceMetrics::add(&self.metrics.bytes_reserved_total, bytes);
            }
            Err(e) => {
                ServiceMetrics::incr(&self.metrics.packets_rejected);
                self.count_rejection(e);
            }
        }
        result
    }

    /// Return a packet charge taken by `charge_packet`.
    ///
    /// Charges from an earlier registration of the same id release nothing;
    /// closing that registration already returned them.
    pub fn release_charge(&self, charge: &PacketCharge) -> usize {
        let released = {
            let mut shard = self.table.lock(charge.conn);
            match shard.get_mut(&charge.conn) {
                Some(entry) if entry.epoch == charge.epoch => {
                    let n = charge.bytes.min(entry.packet_bytes);
                    entry.packet_bytes -= n;
                    entry.packets_in_flight = entry.packets_in_flight.saturating_sub(1);
                    self.budget.release(n)
                }
                _ => return 0,
            }
        };
        ServiceMetrics::add(&self.metrics.bytes_released_total, released);
        released
    }

    /// Credit back up to `bytes` of packet memory held by the current registration of `id`.
    ///
    /// Returns the bytes actually released. Unknown connections release nothing.
    /// A release that frees no bytes leaves the in-flight packet count alone.
    pub fn release_packet(&self, id: ConnId, bytes: usize) -> usize {
        let released = {
            let mut shard = self.table.lock(id);
            let Some(entry) = shard.get_mut(&id) else {
                return 0;
            };
            let n = bytes.min(entry.packet_bytes);
            if n == 0 {
                return 0;
            }
            entry.packet_bytes -= n;
            entry.packets_in_flight = entry.packets_in_flight.saturating_sub(1);
            self.budget.release(n)
        };
        ServiceMetrics::add(&self.metrics.bytes_released_total, released);
        released
    }

    /// Remove `id` and release everything still charged to it.
    pub fn close_connection(&self, id: ConnId) -> Option<usize> {
        let entry = self.table.remove(id)?;
        let released = self.budget.release(entry.charged_bytes());
        ServiceMetrics::decr(&self.metrics.active_connections);
        ServiceMetrics::add(&self.metrics.bytes_released_total, released);
        Some(released)
    }

    pub(crate) fn count_rejection(&self, e: &ServiceError) {
        if e.is_budget_exhausted() {
            ServiceMetrics::incr(&self.metrics.budget_exhausted);
        } else if e.is_integration_bug() {
            ServiceMetrics::incr(&self.metrics.integration_errors);
        }
    }
}
