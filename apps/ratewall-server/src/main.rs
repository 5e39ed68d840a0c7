//! # Ratewall Server
//!
//! Actix-web entry point: rate limits callers by API token or client IP.

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod middleware;
mod observability;
mod state;
mod telemetry;

use config::AppConfig;
use observability::RequestIdMiddleware;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_env_file()?;

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env().context("error reading configuration")?;

    tracing::info!(
        "Starting Ratewall server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config).await?;
    let gatekeeper = config.gatekeeper.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(RequestIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure_routes(&state, &gatekeeper))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

/// Seed the environment from `CONFIG_FILE` when set, else from `.env` if one
/// exists. Variables already in the environment take precedence.
fn load_env_file() -> anyhow::Result<()> {
    match std::env::var("CONFIG_FILE") {
        Ok(path) => {
            dotenvy::from_path(&path)
                .with_context(|| format!("error reading configuration file {path}"))?;
        }
        Err(_) => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}
