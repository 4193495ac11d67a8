//! # Vakthund Configuration System
//!
//! Declarative configuration for the Vakthund gate: the management port,
//! the protected services with their secret access routes, and the
//! operational knobs for the firewall driver, suspect tracking and telemetry.
//!
//! ## Features
//! - **Single file**: one JSON or YAML document describes the whole gate
//! - **Validation**: ports, route paths and labels are checked before startup
//! - **Environment overrides**: `VAKTHUND_*` variables, `__` for nesting
//! - **Legacy field names**: `httpPort`, `ports`, `passports`/`way`, `name`, `ip`

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod gateway;
mod listen;
mod prevention;
mod suspects;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use gateway::{AccessRoute, GatewaySpec, ProtectedService};
pub use listen::ListenConfig;
pub use prevention::{DriverKind, FirewallConfig, ResyncMode};
pub use suspects::{SuspectConfig, SweepFailurePolicy};
pub use telemetry::TelemetryConfig;

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "VAKTHUND_";

/// Top‑level configuration container for the gate.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct VakthundConfig {
    /// Management port and protected services.
    #[serde(flatten)]
    #[validate(nested)]
    pub gateway: GatewaySpec,

    /// Listener parameters for the gate's own HTTP surface.
    #[serde(default)]
    #[validate(nested)]
    pub listen: ListenConfig,

    /// Firewall driver and resync behavior.
    #[serde(default)]
    #[validate(nested)]
    pub firewall: FirewallConfig,

    /// Suspect tracking, banning and expiry.
    #[serde(default)]
    #[validate(nested)]
    pub suspects: SuspectConfig,

    /// Logging and metrics.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl VakthundConfig {
    /// Load configuration from `path`, then apply `VAKTHUND_*` overrides.
    ///
    /// The format is picked from the file extension (`.json`, `.yaml`, `.yml`).
    /// A missing, unreadable, malformed or invalid file is an error; there is
    /// no fallback configuration since the gate cannot run without services.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Figment::new().merge(Json::file(path)),
            Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
            _ => return Err(ConfigError::UnsupportedFormat(PathBuf::from(path))),
        };

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Parse a JSON document directly. Environment overrides are not applied.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Json::string(raw)))
    }

    /// Parse a YAML document directly. Environment overrides are not applied.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Yaml::string(raw)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Socket address the gate listens on: the configured host and the
    /// management port.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let port = self
            .gateway
            .management_port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(self.gateway.management_port.clone()))?;
        Ok(SocketAddr::new(self.listen.host, port))
    }
}
