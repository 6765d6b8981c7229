//! Configuration type definitions.

use crate::service::{AdmissionPolicy, HostContext};

/// Packet memory ceiling and admission policy for the service instance.
#[derive(Clone, Debug)]
pub struct Service {
    pub name: String,
    // Signed so that a negative value reaches construction and is rejected there.
    pub packet_mem_limit: i64,
    pub connection_overhead_bytes: usize,
    pub per_connection_packet_bytes: usize, // 0 = unlimited
}

impl Default for Service {
    fn default() -> Self {
        Self {
            name: "servicenet".into(),
            packet_mem_limit: 64 * 1024 * 1024,
            connection_overhead_bytes: 4096,
            per_connection_packet_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Reference host listener configuration.
#[derive(Clone, Debug)]
pub struct Net {
    pub bind_addr: String,
    pub max_frame_bytes: usize,
    pub read_timeout_ms: u64, // 0 = no timeout
}

impl Default for Net {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7400".into(),
            max_frame_bytes: 16 * 1024 * 1024,
            read_timeout_ms: 30000,
        }
    }
}

/// Periodic metrics reporting.
#[derive(Clone, Debug, Default)]
pub struct Reporting {
    pub report_interval_ms: u64, // 0 = disabled
}

/// Root configuration container.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub service: Service,
    pub net: Net,
    pub reporting: Reporting,
}

impl Config {
    /// Host policy handed to the service at `init`.
    pub fn to_host_context(&self) -> HostContext {
        HostContext::new(
            self.service.name.clone(),
            AdmissionPolicy {
                connection_overhead_bytes: self.service.connection_overhead_bytes,
                per_connection_packet_bytes: self.service.per_connection_packet_bytes,
            },
        )
    }
}
