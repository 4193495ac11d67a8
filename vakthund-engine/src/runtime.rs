/*!
# Runtime Engine

Builds the gate from a validated configuration and runs it: the gate's own
listener on the management port, the optional metrics listener and the
expiry sweeper. The process ends on Ctrl-C, a listener failure, or a sweep
failure under the `exit` policy.
*/

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, Instrument};
use vakthund_api::{metrics_router, router};
use vakthund_config::{DriverKind, FirewallConfig, VakthundConfig};
use vakthund_core::{Gate, GateSettings};
use vakthund_prevention::{DryRunDriver, FirewallDriver, IptablesDriver};
use vakthund_telemetry::MetricsRecorder;

use crate::error::EngineError;
use crate::sweeper::run_sweeper;

pub fn build_driver(config: &FirewallConfig) -> Arc<dyn FirewallDriver> {
    match config.driver {
        DriverKind::Iptables => Arc::new(IptablesDriver::from_config(config)),
        DriverKind::DryRun => Arc::new(DryRunDriver::new()),
    }
}

pub fn build_gate(config: &VakthundConfig, metrics: MetricsRecorder) -> Gate {
    Gate::new(
        config.gateway.clone(),
        build_driver(&config.firewall),
        GateSettings::from(config),
        metrics,
    )
}

/// Runs the gate until shutdown.
#[instrument(level = "info", name = "run_gateway", skip_all)]
pub async fn run_gateway(
    config: VakthundConfig,
    metrics: MetricsRecorder,
) -> Result<(), EngineError> {
    let addr = config.listen_addr()?;
    let gate = Arc::new(build_gate(&config, metrics.clone()));
    info!(
        driver = ?config.firewall.driver,
        services = config.gateway.services.len(),
        routes = config.gateway.route_count(),
        "gate configured"
    );

    if config.firewall.resync_on_startup {
        let report = gate.resync().await.map_err(EngineError::Startup)?;
        info!(rules = report.rules, "initial rules applied");
    }

    let listener = bind(addr).await?;
    info!(%addr, "gate listening");

    if let Some(metrics_addr) = config.telemetry.metrics_addr {
        let metrics_listener = bind(metrics_addr).await?;
        info!(addr = %metrics_addr, "metrics listening");
        spawn_metrics_server(metrics_listener, metrics);
    }

    let sweeper = tokio::spawn(
        run_sweeper(
            gate.clone(),
            Duration::from_secs(config.suspects.sweep_interval_secs),
            config.suspects.on_sweep_failure,
        )
        .in_current_span(),
    );

    let server = serve(listener, router(gate));
    tokio::select! {
        result = server => result,
        joined = sweeper => joined?,
    }
}

/// The metrics listener is best effort: a failure is logged and the gate
/// keeps serving.
fn spawn_metrics_server(listener: TcpListener, metrics: MetricsRecorder) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            if let Err(err) = serve(listener, metrics_router(metrics)).await {
                error!(error = %err, "metrics server failed");
            }
        }
        .instrument(tracing::info_span!("metrics_server")),
    )
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, EngineError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| EngineError::Bind { addr, source })
}

async fn serve(listener: TcpListener, app: Router) -> Result<(), EngineError> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(EngineError::Serve)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use vakthund_config::ResyncMode;

    const SAMPLE: &str = r#"{
        "management_port": "9090",
        "services": [
            { "port": "8080", "routes": [
                { "path": "secret1", "label": "alice", "bound": "10.0.0.5" }
            ] }
        ],
        "firewall": { "driver": "dry_run", "resync_mode": "skip_unchanged" },
        "suspects": { "ban_threshold": 3 }
    }"#;

    #[test]
    fn gate_takes_settings_from_config() {
        let config = VakthundConfig::from_json_str(SAMPLE).unwrap();
        let gate = build_gate(&config, MetricsRecorder::new().unwrap());
        let settings = gate.settings();
        assert_eq!(settings.ban_threshold, 3);
        assert_eq!(settings.resync_mode, ResyncMode::SkipUnchanged);
        assert_eq!(settings.retention, Duration::from_secs(3_600));
        assert_eq!(gate.plan().len(), 2);
    }

    #[test]
    fn driver_selection() {
        let mut config = FirewallConfig::default();
        assert_eq!(build_driver(&config).name(), "iptables");
        config.driver = DriverKind::DryRun;
        assert_eq!(build_driver(&config).name(), "dry_run");
    }

    #[tokio::test]
    async fn metrics_server_answers_in_background() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let metrics = MetricsRecorder::new().unwrap();
        metrics.probes.inc();
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = spawn_metrics_server(listener, metrics);

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("vakthund_probes_total 1"));
        assert!(!server.is_finished());
        server.abort();
    }
}
