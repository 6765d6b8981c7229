//! RAII packet charge.

use std::sync::Arc;

use crate::common::error::ServiceError;

use super::connections::{ConnId, PacketCharge};
use super::NetService;

/// Packet bytes charged against a service's budget.
///
/// The charge is returned through `release_charge` when the lease is dropped,
/// so it lives exactly as long as the buffer it accounts for. A lease that
/// outlives its connection releases nothing, even if the id is registered again.
pub struct PacketLease {
    service: Arc<dyn NetService>,
    charge: PacketCharge,
}

impl PacketLease {
    /// Charge `bytes` for a packet on `conn`, or report why it was rejected.
    pub fn acquire(
        service: Arc<dyn NetService>,
        conn: ConnId,
        bytes: usize,
    ) -> Result<Self, ServiceError> {
        let charge = service.charge_packet(conn, bytes)?;
        Ok(Self { service, charge })
    }

    pub fn conn(&self) -> ConnId {
        self.charge.conn
    }

    pub fn bytes(&self) -> usize {
        self.charge.bytes
    }
}

impl Drop for PacketLease {
    fn drop(&mut self) {
        self.service.release_charge(&self.charge);
    }
}

impl std::fmt::Debug for PacketLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketLease")
            .field("service", &self.service.identity())
            .field("charge", &self.charge)
            .finish()
    }
}
