//! Handler for `GET /history`.
//!
//! All filters are optional: `person_id`, `scope`, `change_type`
//! (`assigned|reassigned|removed`), `since`, `until` (RFC 3339), `limit`
//! (default 50) and `offset`. Newest first.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use ladder_core::{
  audit::{ChangeType, HierarchyChangeEvent, HistoryQuery},
  ids::{PersonId, RoleScope},
  store::HierarchyStore,
};
use serde::Deserialize;

use crate::error::ApiError;

/// Upper bound on `limit`.
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub person_id:   Option<PersonId>,
  pub scope:       Option<RoleScope>,
  pub change_type: Option<ChangeType>,
  pub since:       Option<DateTime<Utc>>,
  pub until:       Option<DateTime<Utc>>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

impl From<HistoryParams> for HistoryQuery {
  fn from(p: HistoryParams) -> Self {
    HistoryQuery {
      person_id:   p.person_id,
      scope:       p.scope,
      change_type: p.change_type,
      since:       p.since,
      until:       p.until,
      limit:       p.limit.map(|l| l.min(MAX_LIMIT)),
      offset:      p.offset,
    }
  }
}

/// `GET /history`
pub async fn handler<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HierarchyChangeEvent>>, ApiError>
where
  S: HierarchyStore,
{
  if let (Some(since), Some(until)) = (params.since, params.until) {
    if since > until {
      return Err(ApiError::BadRequest("`since` is after `until`".into()));
    }
  }
  let events = store
    .history(HistoryQuery::from(params))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(events))
}
