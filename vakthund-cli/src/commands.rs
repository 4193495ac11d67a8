use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use vakthund_config::VakthundConfig;
use vakthund_engine::run_gateway;
use vakthund_prevention::{plan, IptablesDriver};
use vakthund_telemetry::{EventLogger, MetricsRecorder};

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gate
    Run(ConfigArgs),
    /// Load and validate a configuration file
    Check(ConfigArgs),
    /// Print the rules the gate applies at startup, without touching the firewall
    Plan(PlanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// JSON or YAML configuration file
    #[arg(short, long, default_value = "guard.json")]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[arg(long, value_enum, default_value_t = PlanFormat::Text)]
    pub format: PlanFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    /// One rule per line
    Text,
    /// Rules as a JSON array
    Json,
    /// The `iptables` invocations, flush included
    Iptables,
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run(&args.config).await,
        Commands::Check(args) => {
            print!("{}", check(&args.config)?);
            Ok(())
        }
        Commands::Plan(args) => {
            print!("{}", render_plan(&args.config.config, args.format)?);
            Ok(())
        }
    }
}

fn load(path: &Path) -> anyhow::Result<VakthundConfig> {
    VakthundConfig::load_from_path(path)
        .with_context(|| format!("failed to load {}", path.display()))
}

async fn run(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    EventLogger::init(&config.telemetry.log_level).map_err(|err| anyhow::anyhow!(err))?;
    info!(config = %path.display(), "starting vakthund");
    let metrics = MetricsRecorder::new()?;
    run_gateway(config, metrics).await?;
    Ok(())
}

fn check(path: &Path) -> anyhow::Result<String> {
    let config = load(path)?;
    let gateway = &config.gateway;
    let mut out = String::new();
    writeln!(out, "{}: ok", path.display())?;
    writeln!(out, "listen: {}", config.listen_addr()?)?;
    for service in &gateway.services {
        let bound = service
            .routes
            .iter()
            .filter(|route| route.bound.is_some())
            .count();
        writeln!(
            out,
            "service {}: {} route(s), {} bound",
            service.port,
            service.routes.len(),
            bound
        )?;
    }
    writeln!(
        out,
        "driver: {:?}, resync: {:?}, ban threshold: {}",
        config.firewall.driver, config.firewall.resync_mode, config.suspects.ban_threshold
    )?;
    Ok(out)
}

fn render_plan(path: &Path, format: PlanFormat) -> anyhow::Result<String> {
    let config = load(path)?;
    // suspects start empty, so only the configured bindings contribute
    let rules = plan(&config.gateway, []);
    let mut out = String::new();
    match format {
        PlanFormat::Text => {
            for rule in &rules {
                writeln!(out, "{}", rule)?;
            }
        }
        PlanFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(&rules)?)?;
        }
        PlanFormat::Iptables => {
            let driver = IptablesDriver::from_config(&config.firewall);
            writeln!(out, "{} -F {}", config.firewall.binary, config.firewall.chain)?;
            for rule in &rules {
                writeln!(
                    out,
                    "{} {}",
                    config.firewall.binary,
                    driver.rule_args(rule).join(" ")
                )?;
            }
        }
    }
    Ok(out)
}
