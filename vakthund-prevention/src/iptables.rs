//! `iptables` driver.
//!
//! One process per call, optionally through `sudo`. Every call is bounded by
//! a timeout; a process that outlives it is killed and the call fails.
//!
//! Rules for an IPv6 source are skipped with a warning when no `ip6tables`
//! command is configured, so the rest of the pass still gets applied.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use vakthund_config::FirewallConfig;

use crate::firewall::{FirewallDriver, FirewallError, FirewallRule, RuleAction};

#[derive(Debug, Clone)]
pub struct IptablesDriver {
    binary: String,
    ip6_binary: Option<String>,
    chain: String,
    sudo: bool,
    timeout: Duration,
}

impl IptablesDriver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ip6_binary: None,
            chain: "INPUT".into(),
            sudo: false,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &FirewallConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            ip6_binary: config.ip6_binary.clone(),
            chain: config.chain.clone(),
            sudo: config.sudo,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = chain.into();
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ip6_binary(mut self, binary: impl Into<String>) -> Self {
        self.ip6_binary = Some(binary.into());
        self
    }

    /// Arguments that insert `rule` at the head of the managed chain.
    pub fn rule_args(&self, rule: &FirewallRule) -> Vec<String> {
        let mut args = vec!["-I".to_string(), self.chain.clone()];
        if let Some(source) = rule.source {
            args.extend(["--source".to_string(), source.to_string()]);
        }
        args.extend([
            "-p".to_string(),
            "tcp".to_string(),
            "--dport".to_string(),
            rule.port.clone(),
        ]);
        if let Some(comment) = &rule.comment {
            args.extend([
                "-m".to_string(),
                "comment".to_string(),
                "--comment".to_string(),
                comment.clone(),
            ]);
        }
        match rule.action {
            RuleAction::RejectAllOnPort => args.extend([
                "-j".to_string(),
                "REJECT".to_string(),
                "--reject-with".to_string(),
                "tcp-reset".to_string(),
            ]),
            RuleAction::AcceptSourceOnPort => {
                args.extend(["-j".to_string(), "ACCEPT".to_string()])
            }
            RuleAction::RejectSourceOnPort => {
                args.extend(["-j".to_string(), "REJECT".to_string()])
            }
        }
        args
    }

    fn flush_args(&self) -> Vec<String> {
        vec!["-F".to_string(), self.chain.clone()]
    }

    /// Binaries a rule must be applied with. Port-wide rules go to both
    /// families when an IPv6 binary is configured; IPv6 sources get none
    /// without one.
    fn binaries_for(&self, rule: &FirewallRule) -> Vec<&str> {
        match rule.source {
            None => self.all_binaries(),
            Some(source) if source.is_ipv4() => vec![self.binary.as_str()],
            Some(_) => self.ip6_binary.as_deref().into_iter().collect(),
        }
    }

    fn all_binaries(&self) -> Vec<&str> {
        std::iter::once(self.binary.as_str())
            .chain(self.ip6_binary.as_deref())
            .collect()
    }

    /// Program and arguments actually spawned for `binary args...`.
    fn command_line<'a>(&'a self, binary: &'a str, args: &'a [String]) -> (&'a str, Vec<&'a str>) {
        if self.sudo {
            (
                "sudo",
                std::iter::once(binary)
                    .chain(args.iter().map(String::as_str))
                    .collect(),
            )
        } else {
            (binary, args.iter().map(String::as_str).collect())
        }
    }

    #[instrument(level = "debug", skip(self, args))]
    async fn run(&self, binary: &str, args: &[String]) -> Result<(), FirewallError> {
        let (program, argv) = self.command_line(binary, args);
        let command = format!("{} {}", program, argv.join(" "));

        let mut child = Command::new(program);
        child
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, child.output())
            .await
            .map_err(|_| FirewallError::Timeout {
                command: command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| FirewallError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(FirewallError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(%command, "firewall command applied");
        Ok(())
    }
}

#[async_trait]
impl FirewallDriver for IptablesDriver {
    fn name(&self) -> &'static str {
        "iptables"
    }

    async fn flush(&self) -> Result<(), FirewallError> {
        let args = self.flush_args();
        for binary in self.all_binaries() {
            self.run(binary, &args).await?;
        }
        Ok(())
    }

    async fn insert(&self, rule: &FirewallRule) -> Result<(), FirewallError> {
        let binaries = self.binaries_for(rule);
        if binaries.is_empty() {
            warn!(rule = %rule, "no firewall command for this address family, rule skipped");
            return Ok(());
        }
        let args = self.rule_args(rule);
        for binary in binaries {
            self.run(binary, &args).await?;
        }
        Ok(())
    }
}
