//! HTTP server for Ladder.
//!
//! Mounts the [`ladder_api`] router under `/api` behind HTTP Basic auth, with
//! request tracing. `/health` is open.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, middleware, routing::get};
use ladder_core::{policy::HierarchyPolicy, store::HierarchyStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `LADDER_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  #[serde(default)]
  pub hierarchy:          HierarchyPolicy,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state for the router.
pub struct AppState<S: HierarchyStore> {
  pub store: Arc<S>,
  pub auth:  Arc<AuthConfig>,
}

impl<S: HierarchyStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), auth: self.auth.clone() }
  }
}

impl<S: HierarchyStore> AppState<S> {
  pub fn new(store: S, config: &ServerConfig) -> Self {
    Self {
      store: Arc::new(store),
      auth:  Arc::new(AuthConfig {
        username:      config.auth_username.clone(),
        password_hash: config.auth_password_hash.clone(),
      }),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server's axum [`Router`].
pub fn router<S>(state: AppState<S>) -> Router
where
  S: HierarchyStore + 'static,
{
  let api = ladder_api::api_router(state.store.clone())
    .layer(middleware::from_fn_with_state(state.auth.clone(), require_auth));

  Router::new()
    .route("/health", get(health))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str { "ok" }
