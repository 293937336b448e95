use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::RelayError;
use crate::metrics;
use crate::relay::TradeRelay;
use crate::ws_server;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    subscribers: usize,
    pending_commands: usize,
}

pub async fn health_check(relay: web::Data<TradeRelay>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: relay.subscriber_count(),
        pending_commands: relay.pending_commands(),
    })
}

// Bodies are parsed here rather than by the Json extractor so malformed
// JSON gets the same error envelope as every other rejection.
fn parse_body(body: &[u8]) -> Result<Value, RelayError> {
    serde_json::from_slice(body).map_err(|_| {
        metrics::inc_invalid_submissions();
        RelayError::invalid("Invalid JSON data")
    })
}

fn success() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "success" }))
}

pub async fn submit_data(
    relay: web::Data<TradeRelay>,
    body: web::Bytes,
) -> Result<HttpResponse, RelayError> {
    let payload = parse_body(&body)?;
    relay.submit_telemetry(payload)?;
    Ok(success())
}

pub async fn submit_command(
    relay: web::Data<TradeRelay>,
    body: web::Bytes,
) -> Result<HttpResponse, RelayError> {
    let payload = parse_body(&body)?;
    relay.submit_command(payload)?;
    Ok(success())
}

pub async fn get_command(relay: web::Data<TradeRelay>) -> impl Responder {
    HttpResponse::Ok().json(relay.poll_command())
}

pub async fn get_settings(relay: web::Data<TradeRelay>) -> impl Responder {
    HttpResponse::Ok().json(relay.query_settings())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    // Push subscribers upgrade on the root path
    cfg.service(web::resource("/").route(web::get().to(ws_server::subscribe)))
        .service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/data").route(web::post().to(submit_data)))
        .service(web::resource("/command").route(web::post().to(submit_command)))
        .service(web::resource("/get-command").route(web::get().to(get_command)))
        // Legacy name for the same poll
        .service(web::resource("/command-state").route(web::get().to(get_command)))
        .service(web::resource("/get-settings").route(web::get().to(get_settings)));
}
