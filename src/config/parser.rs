//! Configuration file parser.
//!
//! Parses sectioned `key = value` files with a small hand-written parser.
//! Keys may be qualified inline (`service.name = "x"`) or grouped under a
//! `[service]` header.

use super::types::*;
use std::{fs, io};

/// Load configuration from a file path.
pub fn load_config(path: &str) -> io::Result<Config> {
    let s = fs::read_to_string(path)?;
    parse_config(&s)
}

/// Parse configuration from a string.
pub fn parse_config(s: &str) -> io::Result<Config> {
    let mut cfg = Config::default();
    let mut current = String::new();

    for (lineno, line) in s.lines().enumerate() {
        let bad = |msg: String| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line {}: {}", lineno + 1, msg),
            )
        };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix('[') {
            let Some(name) = rest.split('#').next().and_then(|r| r.trim().strip_suffix(']')) else {
                return Err(bad(format!("bad section header {line}")));
            };
            current = name.trim().to_string();
            continue;
        }
        let Some((lhs, rhs)) = line.split_once('=') else {
            return Err(bad(format!("expected key = value, got {line}")));
        };
        let lhs = lhs.trim();
        let val = strip_comment(rhs.trim());

        let (section, key) = match lhs.split_once('.') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (current.as_str(), lhs),
        };

        if section.is_empty() {
            return Err(bad(format!("key {key} outside of any section")));
        }

        set_config_value(section, key, val, &mut cfg).map_err(bad)?;
    }

    Ok(cfg)
}

/// Drop a trailing `# comment`, leaving quoted values intact.
fn strip_comment(val: &str) -> &str {
    if let Some(inner) = val.strip_prefix('"') {
        if let Some(end) = inner.find('"') {
            return &val[..end + 2];
        }
        return val;
    }
    val.split('#').next().unwrap_or(val).trim()
}

/// Set a configuration value based on section, key, and value strings.
fn set_config_value(section: &str, key: &str, val: &str, cfg: &mut Config) -> Result<(), String> {
    macro_rules! parse {
        (s) => {
            val.trim_matches('"').to_string()
        };
        (u) => {
            val.parse::<u64>().map_err(|e| format!("{key}: {e}"))?
        };
        (i) => {
            val.parse::<i64>().map_err(|e| format!("{key}: {e}"))?
        };
        (usize_) => {
            val.parse::<usize>().map_err(|e| format!("{key}: {e}"))?
        };
    }

    match (section, key) {
        // Service section
        ("service", "name") => cfg.service.name = parse!(s),
        ("service", "packet_mem_limit") => cfg.service.packet_mem_limit = parse!(i),
        ("service", "connection_overhead_bytes") => {
            cfg.service.connection_overhead_bytes = parse!(usize_)
        }
        ("service", "per_connection_packet_bytes") => {
            cfg.service.per_connection_packet_bytes = parse!(usize_)
        }

        // Net section
        ("net", "bind_addr") => cfg.net.bind_addr = parse!(s),
        ("net", "max_frame_bytes") => cfg.net.max_frame_bytes = parse!(usize_),
        ("net", "read_timeout_ms") => cfg.net.read_timeout_ms = parse!(u),

        // Metrics section
        ("metrics", "report_interval_ms") => cfg.reporting.report_interval_ms = parse!(u),

        _ => return Err(format!("unknown key {section}.{key}")),
    }

    Ok(())
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &str) -> io::Result<Self> {
        load_config(path)
    }
}
