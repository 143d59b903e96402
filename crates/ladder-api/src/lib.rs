//! JSON REST API for Ladder.
//!
//! Exposes an axum [`Router`] backed by any
//! [`ladder_core::store::HierarchyStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", ladder_api::api_router(store.clone()))
//! ```
//!
//! Errors are returned as `{"error": "...", "kind": "..."}` where `kind` is
//! the snake_case [`ladder_core::ErrorKind`].

pub mod access;
pub mod assignments;
pub mod error;
pub mod etag;
pub mod history;
pub mod roles;
pub mod scopes;


use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use ladder_core::store::HierarchyStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: HierarchyStore + 'static,
{
  Router::new()
    // Role catalog
    .route("/roles", get(roles::list::<S>).post(roles::create::<S>))
    .route("/roles/{id}", delete(roles::retire::<S>))
    // Assignments
    .route("/assignments", post(assignments::assign::<S>))
    .route("/assignments/validate", post(assignments::validate::<S>))
    .route(
      "/assignments/{person}",
      get(assignments::get_one::<S>).delete(assignments::release::<S>),
    )
    .route(
      "/assignments/{person}/manager",
      delete(assignments::remove_manager::<S>),
    )
    // Scope views
    .route("/scopes/{scope}/assignments", get(scopes::assignments::<S>))
    .route("/scopes/{scope}/managers", get(scopes::managers::<S>))
    .route("/scopes/{scope}/tree", get(scopes::tree::<S>))
    .route("/scopes/{scope}/managers/{manager}/team", get(scopes::team::<S>))
    .route(
      "/scopes/{scope}/managers/{manager}/stats",
      get(scopes::stats::<S>),
    )
    // Dashboard access
    .route(
      "/scopes/{scope}/managers/{manager}/access",
      get(access::get_access::<S>).put(access::put_access::<S>),
    )
    .route(
      "/scopes/{scope}/managers/{manager}/can-view/{capability}",
      get(access::can_view::<S>),
    )
    // Audit
    .route("/history", get(history::handler::<S>))
    .with_state(store)
}
