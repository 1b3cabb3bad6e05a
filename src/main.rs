//! CareComm · Healthcare Communication Training Backend
//!
//! - Axum HTTP API for scenarios, trainee responses and evaluations
//! - SQLite persistence (rusqlite, migrations applied at startup)
//! - Optional OpenAI-compatible model server (LM Studio by default), with
//!   fixed fallback content whenever it is off or misbehaves
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   DATABASE_URL        : default "sqlite://./carecomm.db"
//!   LLM_BASE_URL        : default "http://localhost:1234"; empty disables the model
//!   LLM_MODEL           : default "local-model"
//!   PROMPTS_CONFIG_PATH : path to TOML prompt overrides
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod config;
mod db;
mod domain;
mod error;
mod fallback;
mod llm;
mod protocol;
mod routes;
mod services;
mod state;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

  // Store (with migrations), prompts and the optional model client.
  let state = Arc::new(AppState::from_settings(settings)?);

  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "carecomm_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "carecomm_backend", "Server stopped");
  Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!(target: "carecomm_backend", error = %e, "Could not install Ctrl-C handler");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::error!(target: "carecomm_backend", error = %e, "Could not install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  info!(target: "carecomm_backend", "Shutdown signal received");
}
