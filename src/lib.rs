#![deny(clippy::all)]
#![warn(unused_crate_dependencies)]

pub mod common;
pub mod config;
pub mod metrics;
pub mod net;
pub mod service;

pub use common::error::ServiceError;
pub use service::{
    AdmissionPolicy, AdmissionResult, ConnId, HostContext, IdentityAllocator, NetService,
    PacketCharge, PacketLease, ServiceIdentity, ServiceNet,
};

// Only the binary sets up logging.
use env_logger as _;
