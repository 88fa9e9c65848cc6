//! UDL Differentiation Wizard · local backend
//!
//! - Axum HTTP + WebSocket API on the loopback interface
//! - Ollama for generation and refinement conversations
//! - DOCX / PDF / PPTX / XLSX export
//! - JSON persistence under ~/.udl-wizard
//! - Static frontend fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 8765)
//!   WIZARD_PROMPTS_PATH : path to TOML prompt overrides
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"
//!
//! Endpoint, model, save location and the rest are user preferences,
//! changed through the settings API.

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod store;
mod ollama;
mod export;
mod wizard;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

const DEFAULT_PORT: u16 = 8765;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Preferences, store, Ollama client, prompts and the wizard session.
  let state = Arc::new(AppState::new()?);

  let app = build_router(state.clone());

  let port = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .unwrap_or(DEFAULT_PORT);
  let addr = SocketAddr::from(([127, 0, 0, 1], port));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "udl_wizard", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "udl_wizard", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "udl_wizard", error = %e, "Failed to listen for Ctrl+C");
  }
}
