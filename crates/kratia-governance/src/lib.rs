//! The Kratia governance engine.
//!
//! [`Governance`] owns the voting, closure, issuance and reply flows. It is
//! generic over any [`LedgerStore`]; every mutation goes through the store's
//! two atomic primitives so partial state is never visible. The acting member
//! is always passed in explicitly.

use std::sync::Arc;

use kratia_core::{
  Error, Result,
  member::Member,
  notification::Notification,
  settings::SiteSettings,
  store::LedgerStore,
  votation::Votation,
};
use uuid::Uuid;

mod closure;
pub mod config;
mod issuer;
mod members;
pub mod notify;
mod replies;
mod tally;
mod validate;

pub use closure::{Decision, evaluate};
pub use config::{GovernanceConfig, Limits};
pub use issuer::ProposalReceipt;
pub use notify::{Notifier, TracingNotifier};
pub use replies::ThreadPage;

#[cfg(test)]
mod tests;

pub struct Governance<S> {
  store:    Arc<S>,
  config:   GovernanceConfig,
  notifier: Arc<dyn Notifier>,
}

impl<S> Clone for Governance<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      config:   self.config.clone(),
      notifier: Arc::clone(&self.notifier),
    }
  }
}

impl<S: LedgerStore> Governance<S> {
  /// An engine that announces notifications through `tracing`.
  pub fn new(store: Arc<S>, config: GovernanceConfig) -> Self {
    Self {
      store,
      config,
      notifier: Arc::new(TracingNotifier),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &GovernanceConfig { &self.config }

  pub async fn member(&self, id: Uuid) -> Result<Member> {
    self
      .store
      .get_member(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::MemberNotFound(id))
  }

  pub async fn site_settings(&self) -> Result<SiteSettings> {
    self.store.site_settings().await.map_err(Error::store)
  }

  /// A member's notifications, newest first.
  pub async fn notifications(&self, member_id: Uuid, limit: usize) -> Result<Vec<Notification>> {
    self
      .store
      .list_notifications(member_id, limit)
      .await
      .map_err(Error::store)
  }

  /// Fetch a votation as stored, without triggering closure.
  pub(crate) async fn stored_votation(&self, id: Uuid) -> Result<Votation> {
    self
      .store
      .get_votation(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::VotationNotFound(id))
  }
}
