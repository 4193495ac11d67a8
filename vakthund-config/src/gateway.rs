//! Gateway specification: the management port and the protected services.
//!
//! Each protected service is identified by its port and carries an ordered
//! list of access routes. A route's path segment is the secret a client must
//! visit to get its address bound to the route.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Management port plus the ordered list of protected services.
#[derive(Debug, Default, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct GatewaySpec {
    /// Port serving the gate's own HTTP surface.
    #[serde(alias = "httpPort", deserialize_with = "de::port_string")]
    #[validate(custom(function = validation::validate_single_port))]
    pub management_port: String,

    /// Protected services in rule-synthesis order.
    #[serde(default, alias = "ports")]
    #[validate(nested)]
    #[validate(custom(function = validation::validate_unique_routes))]
    pub services: Vec<ProtectedService>,
}

/// A port guarded by a default-reject rule, opened per bound route.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct ProtectedService {
    /// Port or `first:last` port range.
    #[serde(deserialize_with = "de::port_string")]
    #[validate(custom(function = validation::validate_port))]
    pub port: String,

    #[serde(default, alias = "passports", alias = "way")]
    #[validate(nested)]
    pub routes: Vec<AccessRoute>,
}

/// Secret path bound to at most one admitted source address.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
pub struct AccessRoute {
    /// Secret path segment, the second component of `/{port}/{path}`.
    #[validate(custom(function = validation::validate_route_path))]
    pub path: String,

    /// Human-readable owner, attached to the accept rule as a comment.
    #[serde(alias = "name")]
    #[validate(length(min = 1, max = 255))]
    #[validate(custom(function = validation::validate_label))]
    pub label: String,

    /// Currently admitted source. Serialized as `""` when unbound.
    #[serde(default, alias = "ip", with = "bound_addr")]
    pub bound: Option<IpAddr>,
}

impl GatewaySpec {
    /// Looks up a route by service port and path segment.
    pub fn route(&self, port: &str, path: &str) -> Option<&AccessRoute> {
        self.services
            .iter()
            .filter(|service| service.port == port)
            .flat_map(|service| service.routes.iter())
            .find(|route| route.path == path)
    }

    /// Mutable variant of [`GatewaySpec::route`].
    pub fn route_mut(&mut self, port: &str, path: &str) -> Option<&mut AccessRoute> {
        self.services
            .iter_mut()
            .filter(|service| service.port == port)
            .flat_map(|service| service.routes.iter_mut())
            .find(|route| route.path == path)
    }

    /// Total number of declared routes across all services.
    pub fn route_count(&self) -> usize {
        self.services.iter().map(|service| service.routes.len()).sum()
    }

    /// Number of routes that currently have a bound address.
    pub fn bound_count(&self) -> usize {
        self.services
            .iter()
            .flat_map(|service| service.routes.iter())
            .filter(|route| route.bound.is_some())
            .count()
    }
}

mod de {
    use serde::{Deserialize, Deserializer};

    /// Ports are strings in the file, but env overrides and hand-written
    /// JSON often produce numbers.
    pub(super) fn port_string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        })
    }
}

mod bound_addr {
    use std::net::IpAddr;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(addr: &Option<IpAddr>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match addr {
            Some(addr) => serializer.collect_str(addr),
            None => serializer.serialize_str(""),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<IpAddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(addr) => addr.parse().map(Some).map_err(de::Error::custom),
        }
    }
}
