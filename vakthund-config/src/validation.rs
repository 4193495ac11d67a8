// vakthund-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

use crate::gateway::ProtectedService;

lazy_static! {
    static ref PORT_RE: Regex = Regex::new(r"^([0-9]{1,5})(?::([0-9]{1,5}))?$").unwrap();
    static ref CHAIN_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,28}$").unwrap();
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok().filter(|port| *port != 0)
}

/// Validate a service port: `N` or `N:M` with `1 <= N <= M <= 65535`.
pub fn validate_port(port: &str) -> Result<(), ValidationError> {
    let captures = PORT_RE
        .captures(port)
        .ok_or_else(|| ValidationError::new("invalid_port"))?;
    let first = parse_port(&captures[1]).ok_or_else(|| ValidationError::new("invalid_port"))?;
    if let Some(last) = captures.get(2) {
        let last = parse_port(last.as_str()).ok_or_else(|| ValidationError::new("invalid_port"))?;
        if last < first {
            return Err(ValidationError::new("invalid_port_range"));
        }
    }
    Ok(())
}

/// Validate a port that must be bound by a listener (no ranges).
pub fn validate_single_port(port: &str) -> Result<(), ValidationError> {
    parse_port(port)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("invalid_single_port"))
}

/// Validate a route path segment: non-empty and free of `/`.
pub fn validate_route_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() || path.contains('/') || path.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("invalid_route_path"));
    }
    Ok(())
}

/// Validate a route label; it ends up as an iptables comment argument.
pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.len() > 255 || label.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::new("invalid_label"));
    }
    Ok(())
}

/// Validate that every `(port, path)` pair is declared once.
pub fn validate_unique_routes(services: &[ProtectedService]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for service in services {
        for route in &service.routes {
            if !seen.insert((service.port.as_str(), route.path.as_str())) {
                return Err(ValidationError::new("duplicate_route"));
            }
        }
    }
    Ok(())
}

/// Validate an iptables chain name.
pub fn validate_chain(chain: &str) -> Result<(), ValidationError> {
    if CHAIN_RE.is_match(chain) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_chain"))
    }
}

/// Validate a logging filter directive is not empty.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if level.trim().is_empty() {
        Err(ValidationError::new("invalid_log_level"))
    } else {
        Ok(())
    }
}
