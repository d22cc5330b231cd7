//! livepage-proxy: development proxy that serves a live, deployed page with
//! the local app mounted into it and the dev server's live-reload wired in.

mod classify;
mod config;
mod cookies;
mod document;
mod exclusion;
mod mutate;
mod proxy;
mod rewrite;
mod server;

use std::time::Duration;

use config::ProxyConfig;
use exclusion::ExclusionSet;
use server::AppState;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Determine config path
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        // Fall back to positional arg
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("LIVEPAGE_PROXY_CONFIG").ok())
        .unwrap_or_else(|| "livepage-proxy.toml".to_string());

    let mut config = ProxyConfig::load(&config_path)?;
    if let Some(origin) = args
        .iter()
        .position(|a| a == "--origin")
        .and_then(|i| args.get(i + 1).cloned())
    {
        config.live.origin = Some(origin);
    }
    if args.iter().any(|a| a == "--debug") {
        config.debug = true;
    }

    // Build the tokio runtime first; the gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_config = if config.debug {
            config.tracing.clone().with_directive("livepage_proxy=debug")
        } else {
            config.tracing.clone()
        };
        let tracing_guard = livepage_tracing::init_tracing(&tracing_config);
        tracing::debug!(
            otlp_export = tracing_guard.is_exporting(),
            "Tracing initialized"
        );

        run(config, &config_path).await
    })
}

async fn run(config: ProxyConfig, config_path: &str) -> anyhow::Result<()> {
    let live = config.validate()?;
    let exclusions = ExclusionSet::build(&config.assets, &live)?;

    tracing::info!(
        config_path = %config_path,
        listen_address = %config.server.listen_address,
        live_origin = %live.live_origin,
        dev_server = %live.dev_server.origin(),
        container_ids = ?live.container_ids,
        force_mount = live.force_mount,
        exclusions = exclusions.len(),
        debug = live.debug,
        "Starting livepage-proxy"
    );

    if live.rewrite_cookies {
        tracing::warn!(
            "Set-Cookie rewriting is on: Secure and SameSite=None are stripped from live cookies. \
             Use only for local development"
        );
    }

    let state = AppState::new(
        live,
        exclusions,
        Duration::from_secs(config.live.timeout_secs),
        Duration::from_secs(config.dev_server.timeout_secs),
    )?;

    server::run(state, &config.server.listen_address).await
}
