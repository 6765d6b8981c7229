//! Service core: identity, packet memory budget and connection admission.
//!
//! This module contains:
//! - `identity`: Service identity and its injected allocator
//! - `budget`: Lock-free packet memory budget
//! - `connections`: Sharded per-connection accounting table
//! - `admission`: Admit/reject policy for connections and packets
//! - `lease`: RAII packet charge
//!
//! `ServiceNet` is the lifecycle façade the host container drives through
//! the `NetService` trait. It never calls back into the host.

pub mod admission;
pub mod budget;
pub mod connections;
pub mod identity;
pub mod lease;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, OnceLock};

use log::*;

use crate::common::error::ServiceError;
use crate::config;
use crate::metrics::ServiceMetrics;

pub use admission::{AdmissionController, AdmissionPolicy, AdmissionResult};
pub use budget::MemoryBudget;
pub use connections::{ConnId, ConnectionEntry, PacketCharge};
pub use identity::{IdentityAllocator, ServiceIdentity};
pub use lease::PacketLease;

/// Host dispatch context handed to the service at `init`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostContext {
    name: String,
    policy: AdmissionPolicy,
}

impl HostContext {
    pub fn new(name: impl Into<String>, policy: AdmissionPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }
}

/// Hooks a host container invokes on a hosted network service.
pub trait NetService: Send + Sync {
    /// Identity fixed at construction.
    fn identity(&self) -> ServiceIdentity;

    /// Service name, available once initialized.
    fn name(&self) -> &str;

    /// Wire the service to its host. Called exactly once, before any connection.
    fn init(&self, host: HostContext) -> Result<(), ServiceError>;

    /// A transport connection was accepted.
    fn on_connection(&self, conn: ConnId) -> AdmissionResult;

    /// Charge an inbound packet of `bytes` on `conn` before it is buffered.
    ///
    /// The returned charge is bound to the current registration of `conn`.
    fn charge_packet(&self, conn: ConnId, bytes: usize) -> Result<PacketCharge, ServiceError>;

    /// Return a charge from `charge_packet`. Returns bytes released.
    ///
    /// Charges taken before `conn` was closed and re-registered release nothing.
    fn release_charge(&self, charge: &PacketCharge) -> usize;

    /// An inbound packet of `bytes` is about to be buffered on `conn`.
    fn on_packet_received(&self, conn: ConnId, bytes: usize) -> AdmissionResult {
        self.charge_packet(conn, bytes).into()
    }

    /// A packet buffer charged to `conn` was freed. Returns bytes released.
    ///
    /// Untagged: applies to whatever registration `conn` currently has.
    /// Hosts that reuse ids while packets are in flight should use `release_charge`.
    fn on_packet_released(&self, conn: ConnId, bytes: usize) -> usize;

    /// The transport connection closed. Returns bytes released.
    fn on_connection_closed(&self, conn: ConnId) -> usize;
}

/// Network service instance with a bounded packet memory budget.
pub struct ServiceNet {
    identity: ServiceIdentity,
    host: OnceLock<HostContext>,
    admission: AdmissionController,
}

impl ServiceNet {
    /// Construct a service with a packet memory ceiling of `packet_mem_limit` bytes.
    ///
    /// Negative limits fail with `InvalidConfiguration`.
    pub fn new(packet_mem_limit: i64, allocator: &IdentityAllocator) -> Result<Self, ServiceError> {
        let ceiling = usize::try_from(packet_mem_limit).map_err(|_| {
            ServiceError::InvalidConfiguration(format!(
                "packet memory limit must be >= 0, got {}",
                packet_mem_limit
            ))
        })?;
        let identity = allocator.assign();
        debug!("service {} constructed, packet memory ceiling {} bytes", identity, ceiling);
        Ok(Self {
            identity,
            host: OnceLock::new(),
            admission: AdmissionController::new(ceiling),
        })
    }

    pub fn from_config(
        cfg: &config::Service,
        allocator: &IdentityAllocator,
    ) -> Result<Self, ServiceError> {
        Self::new(cfg.packet_mem_limit, allocator)
    }

    pub fn is_initialized(&self) -> bool {
        self.host.get().is_some()
    }

    /// Charge a packet and tie the charge to the returned lease.
    pub fn admit_packet(
        self: &Arc<Self>,
        conn: ConnId,
        bytes: usize,
    ) -> Result<PacketLease, ServiceError> {
        PacketLease::acquire(self.clone(), conn, bytes)
    }

    pub fn used_bytes(&self) -> usize {
        self.admission.budget().used_bytes()
    }

    pub fn ceiling_bytes(&self) -> usize {
        self.admission.budget().ceiling_bytes()
    }

    pub fn active_connections(&self) -> usize {
        self.admission.table().len()
    }

    /// Current accounting for `conn`, if registered.
    pub fn connection_snapshot(&self, conn: ConnId) -> Option<ConnectionEntry> {
        self.admission.table().get(conn)
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        self.admission.metrics()
    }

    pub fn render_metrics(&self) -> String {
        self.metrics()
            .render_prometheus(self.identity, self.used_bytes(), self.ceiling_bytes())
    }

    fn report(&self, what: &str, conn: ConnId, result: &AdmissionResult) {
        match result {
            AdmissionResult::Admitted => {
                debug!("[srv={} hd={}] {} admitted", self.identity, conn, what)
            }
            AdmissionResult::Rejected(e @ ServiceError::BudgetExhausted { .. }) => debug!(
                "[srv={} hd={}] {} rejected: {} ({}/{} bytes used)",
                self.identity,
                conn,
                what,
                e,
                self.used_bytes(),
                self.ceiling_bytes()
            ),
            AdmissionResult::Rejected(e @ ServiceError::UnknownConnection(_)) => {
                warn!("[srv={} hd={}] {} rejected: {}", self.identity, conn, what, e)
            }
            AdmissionResult::Rejected(e) => {
                error!("[srv={} hd={}] {} rejected: {}", self.identity, conn, what, e)
            }
        }
    }

    fn not_initialized(&self, what: &str, conn: ConnId, rejected: &AtomicU64) -> ServiceError {
        let result = AdmissionResult::Rejected(ServiceError::NotInitialized);
        ServiceMetrics::incr(rejected);
        self.admission.count_rejection(&ServiceError::NotInitialized);
        self.report(what, conn, &result);
        ServiceError::NotInitialized
    }
}

impl NetService for ServiceNet {
    fn identity(&self) -> ServiceIdentity {
        self.identity
    }

    fn name(&self) -> &str {
        self.host.get().map(|h| h.name()).unwrap_or("uninitialized")
    }

    fn init(&self, host: HostContext) -> Result<(), ServiceError> {
        let name = host.name.clone();
        if self.host.set(host).is_err() {
            error!(
                "[srv={}] init({}) called again; keeping {}",
                self.identity,
                name,
                self.name()
            );
            ServiceMetrics::incr(&self.metrics().integration_errors);
            return Err(ServiceError::AlreadyInitialized);
        }
        let policy = self.host.get().map(|h| h.policy).unwrap_or_default();
        info!(
            "[srv={}] {} initialized: ceiling={} bytes, connection overhead={} bytes, per-connection packets={} bytes",
            self.identity,
            name,
            self.ceiling_bytes(),
            policy.connection_overhead_bytes,
            policy.per_connection_packet_bytes
        );
        Ok(())
    }

    fn on_connection(&self, conn: ConnId) -> AdmissionResult {
        let Some(host) = self.host.get() else {
            let rejected = &self.metrics().connections_rejected;
            return AdmissionResult::Rejected(self.not_initialized("connection", conn, rejected));
        };
        let result = self.admission.admit_connection(conn, host.policy());
        self.report("connection", conn, &result);
        result
    }

    fn charge_packet(&self, conn: ConnId, bytes: usize) -> Result<PacketCharge, ServiceError> {
        let Some(host) = self.host.get() else {
            let rejected = &self.metrics().packets_rejected;
            return Err(self.not_initialized("packet", conn, rejected));
        };
        let result = self.admission.charge_packet(conn, bytes, host.policy());
        if let Err(e) = &result {
            self.report("packet", conn, &AdmissionResult::Rejected(e.clone()));
        }
        result
    }

    fn release_charge(&self, charge: &PacketCharge) -> usize {
        self.admission.release_charge(charge)
    }

    fn on_packet_released(&self, conn: ConnId, bytes: usize) -> usize {
        self.admission.release_packet(conn, bytes)
    }

    fn on_connection_closed(&self, conn: ConnId) -> usize {
        match self.admission.close_connection(conn) {
            Some(released) => {
                debug!(
                    "[srv={} hd={}] connection closed, released {} bytes",
                    self.identity, conn, released
                );
                released
            }
            None => {
                warn!("[srv={} hd={}] close for unknown connection", self.identity, conn);
                0
            }
        }
    }
}
