//! Listener configuration for the gate's HTTP surface.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use validator::Validate;

/// The port is always the management port; only the host is configurable.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}
