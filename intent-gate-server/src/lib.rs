// intent-gate-server/src/lib.rs
// ============================================================================
// Module: Intent Gate Server Library
// Description: HTTP surface for the governance pipeline.
// Purpose: Expose the versioned API, the edge authorization gate, and the
//          operational endpoints over the composed system.
// Dependencies: crate::{auth, error, routes, state, telemetry}
// ============================================================================

//! ## Overview
//! The server binds the generic core to production backends and mounts the
//! `/api/v1` surface plus `/health`, `/ready`, `/metrics`, and `/scheduler`.
//! Transport concerns (TLS, JWT verification, CORS) belong to the fronting
//! layer; the edge here consumes the trusted principal envelope.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use intent_gate_config::IntentGateConfig;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::PRINCIPAL_HEADER;
pub use auth::TRACE_HEADER;
pub use error::ApiError;
pub use state::AppState;
pub use state::System;
pub use state::SystemHooks;
pub use state::build_system;
pub use state::build_system_with_hooks;
pub use state::build_system_with_store;
pub use telemetry::Metrics;

// ============================================================================
// SECTION: Serving
// ============================================================================

/// Builds the router over an existing state (tests drive this directly).
#[must_use]
pub fn app(state: Arc<AppState>) -> axum::Router {
    routes::router(state)
}

/// Builds the system from configuration and serves until shutdown.
///
/// # Errors
///
/// Returns an error string when initialization or binding fails.
pub async fn serve(config: IntentGateConfig) -> Result<(), String> {
    let system = build_system(&config)?;
    let router = app(Arc::clone(&system.state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .map_err(|err| format!("bind {}: {err}", config.server.bind_addr))?;
    tracing::info!(addr = %config.server.bind_addr, "intent gate listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|err| err.to_string())?;
    for task in system.tasks {
        task.abort();
    }
    Ok(())
}
