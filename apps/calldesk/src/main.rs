use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use calldesk_core::board;
use calldesk_core::config::{normalize_endpoint, Config};
use calldesk_core::connection::WebSocketConnector;
use calldesk_core::session::Session;
use calldesk_core::telemetry::init_tracing;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "calldesk", about = "Live call board for the crisis line")]
struct Cli {
    #[arg(long, help = "Backend websocket endpoint")]
    endpoint: Option<String>,

    #[arg(long, help = "Reconnect attempts after an unexpected close")]
    max_attempts: Option<u32>,

    #[arg(long, help = "Base reconnect delay in milliseconds")]
    base_delay_ms: Option<u64>,

    #[arg(long, help = "Seed for the fixture calls")]
    seed: Option<u64>,

    #[arg(long, help = "Start with an empty board")]
    no_seed: bool,

    #[arg(long, help = "Write logs to a file instead of stderr")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = normalize_endpoint(&endpoint);
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_reconnect_attempts = max_attempts;
        }
        if let Some(base_delay_ms) = self.base_delay_ms {
            config.reconnect_base_delay_ms = base_delay_ms;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.no_seed {
            config.seed_fixtures = false;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let mut cfg = Config::from_env();
    cli.apply(&mut cfg);
    cfg.validate().context("invalid configuration")?;
    init_tracing(&cfg.log_filter, cfg.log_file.as_deref())?;

    info!(
        endpoint = %cfg.endpoint,
        max_attempts = cfg.max_reconnect_attempts,
        base_delay_ms = cfg.reconnect_base_delay_ms,
        seed_fixtures = cfg.seed_fixtures,
        seed = cfg.seed,
        "starting calldesk"
    );

    let session = Session::start(cfg.session_options(), Arc::new(WebSocketConnector::new()));
    let feed = board::spawn_feed(session.handle());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    session.shutdown().await;
    let _ = feed.await;
    Ok(())
}
