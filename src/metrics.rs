use std::sync::atomic::{AtomicU64, Ordering};

use crate::service::identity::ServiceIdentity;

/// Per-instance admission counters.
#[derive(Default, Debug)]
pub struct ServiceMetrics {
    pub connections_admitted: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub active_connections: AtomicU64,
    pub packets_admitted: AtomicU64,
    pub packets_rejected: AtomicU64,
    // Routine backpressure, counted separately from integration errors
    pub budget_exhausted: AtomicU64,
    pub integration_errors: AtomicU64,
    pub bytes_reserved_total: AtomicU64,
    pub bytes_released_total: AtomicU64,
}

impl ServiceMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn decr(counter: &AtomicU64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        });
    }

    pub fn render_prometheus(&self, id: ServiceIdentity, used: usize, ceiling: usize) -> String {
        let c = |name: &str, help: &str, kind: &str, val: u64| -> String {
            format!(
                "# HELP {0} {1}\n# TYPE {0} {2}\n{0}{{service=\"{3}\"}} {4}\n",
                name, help, kind, id, val
            )
        };
        let ld = |a: &AtomicU64| a.load(Ordering::Relaxed);
        let mut s = String::with_capacity(2048);
        s.push_str(&c("servicenet_connections_admitted_total", "Connections admitted", "counter", ld(&self.connections_admitted)));
        s.push_str(&c("servicenet_connections_rejected_total", "Connections rejected", "counter", ld(&self.connections_rejected)));
        s.push_str(&c("servicenet_active_connections", "Connections currently registered", "gauge", ld(&self.active_connections)));
        s.push_str(&c("servicenet_packets_admitted_total", "Packets admitted against the budget", "counter", ld(&self.packets_admitted)));
        s.push_str(&c("servicenet_packets_rejected_total", "Packets rejected", "counter", ld(&self.packets_rejected)));
        s.push_str(&c("servicenet_budget_exhausted_total", "Rejections caused by budget exhaustion", "counter", ld(&self.budget_exhausted)));
        s.push_str(&c("servicenet_integration_errors_total", "Host ordering or duplicate-id violations", "counter", ld(&self.integration_errors)));
        s.push_str(&c("servicenet_bytes_reserved_total", "Bytes reserved from the budget", "counter", ld(&self.bytes_reserved_total)));
        s.push_str(&c("servicenet_bytes_released_total", "Bytes released back to the budget", "counter", ld(&self.bytes_released_total)));
        s.push_str(&c("servicenet_budget_used_bytes", "Packet memory currently reserved", "gauge", used as u64));
        s.push_str(&c("servicenet_budget_ceiling_bytes", "Configured packet memory ceiling", "gauge", ceiling as u64));
        s
    }
}
