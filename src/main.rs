use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use wakewatch::config::MonitorConfig;
use wakewatch::engine::Monitor;
use wakewatch::notify::{FanoutSink, LogSink, TelegramSink, WebhookSink};
use wakewatch::probe::LivenessProbe;
use wakewatch::wol::MagicPacketSender;
use wakewatch::{api, utils};

#[derive(Parser, Debug)]
#[command(version, about = "Wake-on-LAN orchestration and host liveness monitor")]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

fn build_sink(config: &MonitorConfig) -> FanoutSink {
    let http_client = reqwest::Client::new();
    let mut sink = FanoutSink::new().with(Arc::new(LogSink));

    if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        sink = sink.with(Arc::new(WebhookSink::new(url, http_client.clone())));
    }
    if let Some(telegram) = &config.telegram {
        if !telegram.bot_token.is_empty() && telegram.admin_chat_id != 0 {
            sink = sink.with(Arc::new(TelegramSink::new(
                telegram.bot_token.clone(),
                telegram.admin_chat_id,
                http_client,
            )));
        }
    }
    sink
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::setup_console();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let args = Args::parse();
    let config = MonitorConfig::load(&args.config)
        .with_context(|| format!("Error loading config {}", args.config.display()))?;

    let sink = build_sink(&config);
    info!(
        servers = config.servers.len(),
        monitored = config.monitored_hosts().count(),
        sinks = sink.len(),
        "Configuration loaded"
    );

    let api_addr = SocketAddr::new(config.api_bind, config.api_port);
    let monitor = Arc::new(Monitor::new(
        config,
        Arc::new(LivenessProbe::default()),
        MagicPacketSender::default(),
        Arc::new(sink),
    ));

    // Serve commands only once every addressed host has a recorded state.
    let handle = Arc::clone(&monitor).start().await;

    let monitor_for_api = Arc::clone(&monitor);
    tokio::spawn(async move {
        if let Err(e) = api::start_server(api_addr, monitor_for_api).await {
            error!("Command API failed: {:#}", e);
        }
    });

    let startup = format!(
        "🤖 wakewatch started successfully!\n\n⏱️ System uptime: {}\n🔍 Monitoring {} servers every {}m",
        utils::format_uptime(utils::system_uptime()),
        monitor.config().servers.len(),
        monitor.config().interval().as_secs() / 60,
    );
    monitor.announce(&startup).await;

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping monitor...");
    handle.stop().await;

    Ok(())
}
