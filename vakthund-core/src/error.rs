use thiserror::Error;
use vakthund_prevention::FirewallError;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("no route /{port}/{path}")]
    UnknownRoute { port: String, path: String },

    #[error("firewall resync failed: {0}")]
    Firewall(#[from] FirewallError),
}
