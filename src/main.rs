use actix_web::{web, App, HttpServer};
use actix_web_prom::PrometheusMetricsBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use trade_relay::api;
use trade_relay::config::RelayConfig;
use trade_relay::relay::TradeRelay;
use trade_relay::ws_server::WsServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load environment variables before anything reads them
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    info!("╔═══════════════════════════════════════════════════════════════╗");
    info!("║                        TRADE RELAY                            ║");
    info!("║         Telemetry fan-out, settings sync, command queue       ║");
    info!("╚═══════════════════════════════════════════════════════════════╝");

    let config = RelayConfig::new()?;
    let relay = Arc::new(TradeRelay::from_config(&config)?);
    info!(settings = ?relay.query_settings(), "✅ Relay initialized");

    // --- Standalone WebSocket Listener Task (optional) ---
    let ws_handle = match config.server.ws_addr.as_deref() {
        Some(ws_addr) => {
            let ws_listener = TcpListener::bind(ws_addr).await?;
            info!("🚀 Extra push listener on ws://{}", ws_addr);
            let ws_server = WsServer::new(relay.clone(), relay.send_buffer());
            Some(tokio::spawn(ws_server.run(ws_listener)))
        }
        None => None,
    };

    // --- API Server Task ---
    let prometheus = PrometheusMetricsBuilder::new("trade_relay_http")
        .registry(prometheus::default_registry().clone())
        .endpoint("/metrics")
        .build()?;

    info!("🚀 Starting API Server on http://{}", config.server.http_addr);
    info!("🚀 Push subscribers on ws://{}/", config.server.http_addr);
    let relay_data = web::Data::from(relay.clone());

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(prometheus.clone())
            .app_data(relay_data.clone())
            .configure(api::config)
    })
    .bind(config.server.http_addr.as_str())?
    .run()
    .await?;

    if let Some(handle) = ws_handle {
        handle.abort();
    }
    info!("Relay stopped");

    Ok(())
}
