//! Configuration module for servicenet.
//!
//! This module provides all configuration types and parsing logic:
//! - `Config` - Root configuration container
//! - `Service` - Packet memory ceiling and admission policy
//! - `Net` - Reference host listener settings
//! - `Reporting` - Periodic metrics reporting

mod parser;
mod types;

pub use parser::{load_config, parse_config};
pub use types::*;
