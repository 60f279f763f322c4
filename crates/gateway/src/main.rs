use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vg_agents::Scenario;
use vg_gateway::cli::{load_config, Cli, Command};
use vg_gateway::state::{default_scenario, AppState};
use vg_gateway::ws::browser::browser_ws;
use vg_gateway::ws::telephony::telephony_ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, config_path) = load_config(cli.config.as_deref())?;
            match &config_path {
                Some(path) => tracing::info!(path = %path.display(), "config loaded"),
                None => tracing::info!("no config file, using defaults"),
            }
            run_server(Arc::new(config)).await
        }
        Some(Command::Version) => {
            println!("voicegate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON logs, `RUST_LOG`-style filtering.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vg_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<vg_domain::config::Config>) -> anyhow::Result<()> {
    tracing::info!("VoiceGate starting");

    let scenario = match &config.scenario_path {
        Some(path) => {
            let scenario = Scenario::load(path)?;
            tracing::info!(
                scenario = %scenario.name,
                agents = scenario.agents.len(),
                path = %path.display(),
                "scenario loaded"
            );
            scenario
        }
        None => {
            tracing::info!("no scenario configured, using the built-in demo");
            default_scenario()
        }
    };

    let state = AppState::dev(Arc::clone(&config), scenario)?;

    let app = axum::Router::new()
        .route("/ws/telephony", axum::routing::get(telephony_ws))
        .route("/ws/browser", axum::routing::get(browser_ws))
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
