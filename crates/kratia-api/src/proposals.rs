//! Handlers for `/proposals` endpoints. Each issues a votation with its
//! Agora thread and answers `201` with `{"votationId", "threadId"}`.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use kratia_core::{store::LedgerStore, votation::SanctionDuration};
use kratia_governance::{Governance, ProposalReceipt};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, session::CurrentMember};

type Created = (StatusCode, Json<ProposalReceipt>);

fn created(receipt: ProposalReceipt) -> Created { (StatusCode::CREATED, Json(receipt)) }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanctionBody {
  pub target_user_id:    Uuid,
  pub sanction_duration: SanctionDuration,
  pub justification:     String,
}

/// `POST /proposals/sanction`
pub async fn sanction<S>(
  State(engine): State<Arc<Governance<S>>>,
  CurrentMember(member): CurrentMember,
  Json(body): Json<SanctionBody>,
) -> Result<Created, ApiError>
where
  S: LedgerStore + 'static,
{
  let receipt = engine
    .propose_sanction(&member, body.target_user_id, body.sanction_duration, &body.justification)
    .await?;
  Ok(created(receipt))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleChangeBody {
  pub title:                      String,
  pub justification:              String,
  pub proposed_constitution_text: String,
}

/// `POST /proposals/rule-change`
pub async fn rule_change<S>(
  State(engine): State<Arc<Governance<S>>>,
  CurrentMember(member): CurrentMember,
  Json(body): Json<RuleChangeBody>,
) -> Result<Created, ApiError>
where
  S: LedgerStore + 'static,
{
  let receipt = engine
    .propose_rule_change(
      &member,
      &body.title,
      &body.justification,
      &body.proposed_constitution_text,
    )
    .await?;
  Ok(created(receipt))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewForumBody {
  pub name:          String,
  pub description:   String,
  pub category_id:   Uuid,
  #[serde(default = "default_public")]
  pub is_public:     bool,
  pub justification: String,
}

fn default_public() -> bool { true }

/// `POST /proposals/new-forum`
pub async fn new_forum<S>(
  State(engine): State<Arc<Governance<S>>>,
  CurrentMember(member): CurrentMember,
  Json(body): Json<NewForumBody>,
) -> Result<Created, ApiError>
where
  S: LedgerStore + 'static,
{
  let receipt = engine
    .propose_new_forum(
      &member,
      &body.name,
      &body.description,
      body.category_id,
      body.is_public,
      &body.justification,
    )
    .await?;
  Ok(created(receipt))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionBody {
  pub applicant_id:  Uuid,
  pub justification: String,
}

/// `POST /proposals/admission`
pub async fn admission<S>(
  State(engine): State<Arc<Governance<S>>>,
  CurrentMember(member): CurrentMember,
  Json(body): Json<AdmissionBody>,
) -> Result<Created, ApiError>
where
  S: LedgerStore + 'static,
{
  let receipt = engine
    .propose_admission(&member, body.applicant_id, &body.justification)
    .await?;
  Ok(created(receipt))
}
