//! Error types shared by the service core and the host layer.

use std::fmt;

use crate::service::connections::ConnId;

/// Errors surfaced by the service core to its host container.
///
/// Rejections carried by `AdmissionResult::Rejected` use the same taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A constructor argument was out of range. Prevents the service from starting.
    InvalidConfiguration(String),
    /// A hook was called before `init` completed.
    NotInitialized,
    /// `init` was called a second time.
    AlreadyInitialized,
    /// The host reported the same connection id twice.
    DuplicateConnection(ConnId),
    /// The packet memory budget cannot cover the request.
    ///
    /// `available` is the headroom seen at rejection time, after any per-connection cap.
    BudgetExhausted { requested: usize, available: usize },
    /// A packet referenced a connection that is not registered.
    UnknownConnection(ConnId),
}

impl ServiceError {
    /// Whether this error points at a host integration bug rather than routine backpressure.
    pub fn is_integration_bug(&self) -> bool {
        matches!(
            self,
            ServiceError::NotInitialized
                | ServiceError::AlreadyInitialized
                | ServiceError::DuplicateConnection(_)
        )
    }

    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, ServiceError::BudgetExhausted { .. })
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::InvalidConfiguration(msg) => write!(f, "invalid configuration: {}", msg),
            ServiceError::NotInitialized => write!(f, "service not initialized"),
            ServiceError::AlreadyInitialized => write!(f, "service already initialized"),
            ServiceError::DuplicateConnection(id) => write!(f, "duplicate connection {}", id),
            ServiceError::BudgetExhausted {
                requested,
                available,
            } => write!(
                f,
                "packet memory budget exhausted: requested {} bytes, {} available",
                requested, available
            ),
            ServiceError::UnknownConnection(id) => write!(f, "unknown connection {}", id),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ServiceError> for std::io::Error {
    fn from(e: ServiceError) -> Self {
        let kind = match e {
            ServiceError::BudgetExhausted { .. } => std::io::ErrorKind::OutOfMemory,
            ServiceError::InvalidConfiguration(_) => std::io::ErrorKind::InvalidInput,
            ServiceError::UnknownConnection(_) => std::io::ErrorKind::NotFound,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ordering_violations_are_integration_bugs() {
        assert!(ServiceError::NotInitialized.is_integration_bug());
        assert!(ServiceError::AlreadyInitialized.is_integration_bug());
        assert!(ServiceError::DuplicateConnection(ConnId(1)).is_integration_bug());
        assert!(!ServiceError::BudgetExhausted {
            requested: 1,
            available: 0
        }
        .is_integration_bug());
        assert!(!ServiceError::UnknownConnection(ConnId(1)).is_integration_bug());
    }

    #[test]
    fn budget_exhaustion_maps_to_out_of_memory() {
        let e: std::io::Error = ServiceError::BudgetExhausted {
            requested: 4096,
            available: 100,
        }
        .into();
        assert_eq!(e.kind(), std::io::ErrorKind::OutOfMemory);
        assert_eq!(
            e.to_string(),
            "packet memory budget exhausted: requested 4096 bytes, 100 available"
        );
    }

    #[test]
    fn connection_errors_name_the_connection() {
        assert_eq!(
            ServiceError::DuplicateConnection(ConnId(42)).to_string(),
            "duplicate connection 42"
        );
        let e: std::io::Error = ServiceError::UnknownConnection(ConnId(9)).into();
        assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
        assert_eq!(e.to_string(), "unknown connection 9");
    }
}
