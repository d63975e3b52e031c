//! page-bridge server binary.
//!
//! Connects an automation session to a browser already running with remote
//! debugging enabled, and serves the bridge protocol on the loopback
//! interface for a coding agent to call.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use page_bridge::bridge::{self, Bridge, DEFAULT_BRIDGE_PORT};
use page_bridge::browser::{ChromeConfig, ChromeDriver};
use page_bridge::session::{SessionConfig, SessionManager};

#[derive(Parser)]
#[command(name = "bridge-server")]
#[command(version)]
#[command(about = "Localhost JSON bridge for inspecting and driving a live web page", long_about = None)]
struct Cli {
    /// Port the bridge listens on
    #[arg(long, short = 'p', default_value_t = DEFAULT_BRIDGE_PORT)]
    port: u16,

    /// Host of the browser's remote-debugging endpoint
    #[arg(long, default_value = "127.0.0.1")]
    browser_host: String,

    /// Port of the browser's remote-debugging endpoint
    #[arg(long, default_value_t = 9222)]
    browser_port: u16,

    /// Explicit websocket debugger URL, skipping discovery
    #[arg(long, value_name = "URL")]
    ws_url: Option<String>,

    /// URL of the page the session should attach to
    #[arg(long, value_name = "URL")]
    target_url: Option<String>,

    /// Connect to the browser on startup instead of on first use
    #[arg(long)]
    eager: bool,

    /// Log level: error, warn, info, debug, trace (RUST_LOG overrides)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut config = ChromeConfig::new().host(cli.browser_host).port(cli.browser_port);
    if let Some(ws_url) = cli.ws_url {
        config = config.ws_url(ws_url);
    }
    info!("page-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("browser endpoint: {}", config.endpoint());
    if let Some(target) = &cli.target_url {
        info!("target page: {}", target);
    }

    let driver = Arc::new(ChromeDriver::new(config));
    let session_config = SessionConfig { target_url: cli.target_url, ..SessionConfig::default() };
    let manager = Arc::new(SessionManager::new(driver, session_config));
    manager.spawn_event_listener();

    if cli.eager {
        if let Err(err) = manager.connect().await {
            warn!("initial browser connect failed: {}; retrying on first operation", err);
        }
    }

    let bridge = Arc::new(Bridge::with_handler(manager));
    bridge::serve(bridge, cli.port).await.context("bridge server failed")
}
