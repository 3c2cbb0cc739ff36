//! JSON REST API for Kratia.
//!
//! Exposes an axum [`Router`] over a [`Governance`] engine backed by any
//! [`kratia_core::store::LedgerStore`]. Authentication, TLS and transport
//! concerns are the caller's responsibility; the acting member arrives in the
//! [`session::MEMBER_HEADER`] header.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", kratia_api::api_router(engine.clone()))
//! ```

pub mod error;
pub mod proposals;
pub mod session;
pub mod site;
pub mod threads;
pub mod votations;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use kratia_core::store::LedgerStore;
use kratia_governance::Governance;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<Governance<S>>) -> Router<()>
where
  S: LedgerStore + 'static,
{
  Router::new()
    // Votations
    .route("/votations", get(votations::list::<S>))
    .route("/votations/{id}", get(votations::get_one::<S>))
    .route("/votations/{id}/votes", post(votations::cast::<S>))
    // Proposals
    .route("/proposals/sanction", post(proposals::sanction::<S>))
    .route("/proposals/rule-change", post(proposals::rule_change::<S>))
    .route("/proposals/new-forum", post(proposals::new_forum::<S>))
    .route("/proposals/admission", post(proposals::admission::<S>))
    // Threads
    .route("/threads/{id}", get(threads::page::<S>))
    .route("/threads/{id}/posts", post(threads::reply::<S>))
    // Site
    .route("/constitution", get(site::constitution::<S>))
    .route("/notifications", get(site::notifications::<S>))
    .with_state(engine)
}
