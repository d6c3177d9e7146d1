//! egress-router: control-plane service for the process-wide routing policy.

use egress_router::config::RouterConfig;
use egress_router::server::{self, AppState};

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("EGRESS_ROUTER_CONFIG").ok())
        .unwrap_or_else(|| "egress-router.toml".to_string());

    let proxy_override = args
        .iter()
        .position(|a| a == "--proxy")
        .and_then(|i| args.get(i + 1).cloned());

    // Load configuration
    let mut config = RouterConfig::load(&config_path)?;

    // CLI override takes precedence over TOML and env vars
    if let Some(spec) = proxy_override {
        config.proxy = Some(parse_proxy_arg(&spec)?);
    }

    // Build the tokio runtime first: the tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Initialize tracing (OTLP export is optional, falls back to fmt-only)
        let _tracing_guard = egress_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            proxy = ?config.proxy,
            "Starting egress-router"
        );

        run(config).await
    })
}

async fn run(config: RouterConfig) -> anyhow::Result<()> {
    let controller = egress_router::controller();

    if let Some(proxy) = &config.proxy {
        controller.set_proxy(&proxy.host, proxy.port)?;
    }

    let state = AppState { controller };
    server::run(&config.server.listen_address, state).await
}

/// `host:port`, split on the last colon so bracketed IPv6 hosts work.
fn parse_proxy_arg(spec: &str) -> anyhow::Result<egress_router::config::UpstreamConfig> {
    let (host, port) = spec
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("--proxy expects host:port, got {spec:?}"))?;
    let port = port
        .parse::<i64>()
        .map_err(|e| anyhow::anyhow!("--proxy port {port:?} is not a number: {e}"))?;
    Ok(egress_router::config::UpstreamConfig {
        host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
        port,
    })
}
