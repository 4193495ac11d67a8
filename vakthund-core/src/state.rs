//! Process-wide gate state.

use serde::Serialize;
use vakthund_config::GatewaySpec;
use vakthund_detection::SuspectTable;
use vakthund_prevention::{plan, FirewallRule};

/// The gateway spec with its live bindings, plus every tracked suspect.
///
/// Serialized as the `/configs` dump: the spec's fields at the top level
/// and the suspect table under `suspects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateState {
    #[serde(flatten)]
    pub spec: GatewaySpec,
    pub suspects: SuspectTable,
}

impl GateState {
    pub fn new(spec: GatewaySpec) -> Self {
        Self {
            spec,
            suspects: SuspectTable::new(),
        }
    }

    /// Rule set exactly derivable from this state.
    pub fn plan(&self, ban_threshold: u32) -> Vec<FirewallRule> {
        plan(&self.spec, self.suspects.over_threshold(ban_threshold))
    }

    pub fn banned_count(&self, ban_threshold: u32) -> usize {
        self.suspects.over_threshold(ban_threshold).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vakthund_config::{AccessRoute, ProtectedService};

    #[test]
    fn dump_layout() {
        let mut state = GateState::new(GatewaySpec {
            management_port: "9090".into(),
            services: vec![ProtectedService {
                port: "8080".into(),
                routes: vec![AccessRoute {
                    path: "secret1".into(),
                    label: "alice".into(),
                    bound: None,
                }],
            }],
        });
        state.suspects.record_hit(
            "10.0.0.9".parse().unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        );

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["management_port"], "9090");
        assert_eq!(json["services"][0]["routes"][0]["bound"], "");
        assert_eq!(json["suspects"]["10.0.0.9"]["count"], 1);
    }
}
