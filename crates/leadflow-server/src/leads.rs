use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};

use leadflow_core::ids::{AgentId, ListId};
use leadflow_core::{normalize_phone, CrmError, Stage};
use leadflow_engine::filter::LeadFilter;
use leadflow_engine::Selection;
use leadflow_store::events::{EventRepo, EventType};
use leadflow_store::leads::{LeadRepo, NewLead};
use leadflow_store::lists::ListRepo;

use crate::error::ApiError;
use crate::server::AppState;
use crate::tenant::Tenant;

/// GET /leads — filtered, paged lead list with derived call counts.
pub async fn list(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = LeadFilter::from_params(&params, chrono::Local::now());
    let limit = state
        .query
        .clamp_limit(params.get("limit").and_then(|s| s.parse().ok()));
    let offset = params
        .get("offset")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let page = state
        .query
        .run(&tenant_id, &filter, limit, offset, &state.cache)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "rows": page.rows,
        "total": page.total,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// GET /leads/{phone} — one lead with its full event history.
pub async fn get_lead(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(phone): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let phone = normalize_phone(&phone);
    let events_repo = EventRepo::new(state.db.clone());
    let lead = LeadRepo::new(state.db.clone()).get(&tenant_id, &phone)?;
    let events = events_repo.list_for_lead(&tenant_id, &phone)?;
    let views = leadflow_engine::aggregate::augment(&events_repo, vec![lead])?;

    Ok(Json(serde_json::json!({
        "success": true,
        "lead": views.into_iter().next(),
        "events": events,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLead {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub alternate_number: Option<String>,
    pub source: Option<String>,
    pub stage: Option<Stage>,
    pub score: Option<f64>,
    pub owner_id: Option<String>,
    pub list_id: Option<String>,
    pub notes: Option<String>,
}

/// POST /leads — create a lead. When the body names no owner the
/// assignment engine picks one under the tenant's active rule; an empty
/// pool leaves the lead unowned and records the deferral. List
/// membership is a secondary write: failure is logged, never rolled
/// back.
pub async fn create(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Json(body): Json<CreateLead>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let phone = normalize_phone(&body.phone);
    if phone.trim_start_matches('+').is_empty() {
        return Err(ApiError(CrmError::Validation(
            "phone must contain at least one digit".into(),
        )));
    }

    let mut deferred = false;
    let owner_id = match body.owner_id {
        Some(id) => Some(AgentId::from_raw(id)),
        None => match state
            .engine
            .select_owner(&tenant_id, &mut rand::thread_rng())?
        {
            Selection::Assigned(id) => Some(id),
            Selection::Deferred => {
                deferred = true;
                None
            }
        },
    };

    let lead = LeadRepo::new(state.db.clone()).create(
        &tenant_id,
        NewLead {
            phone,
            name: body.name,
            email: body.email,
            address: body.address,
            alternate_number: body.alternate_number,
            source: body.source,
            stage: body.stage,
            score: body.score,
            owner_id,
        },
    )?;

    let events = EventRepo::new(state.db.clone());
    if deferred {
        events.append(
            &tenant_id,
            &lead.phone,
            EventType::AssignmentDeferred,
            serde_json::json!({ "reason": "no eligible agents" }),
        )?;
    }
    if let Some(notes) = body.notes.filter(|n| !n.trim().is_empty()) {
        events.append(
            &tenant_id,
            &lead.phone,
            EventType::Note,
            serde_json::json!({ "text": notes }),
        )?;
    }
    if let Some(list_id) = body.list_id {
        let list_id = ListId::from_raw(list_id);
        if let Err(e) =
            ListRepo::new(state.db.clone()).add_member(&tenant_id, &list_id, &lead.phone)
        {
            warn!(tenant_id = %tenant_id, list_id = %list_id, error = %e,
                  "list membership write failed after lead creation");
        }
    }

    info!(tenant_id = %tenant_id, phone = %lead.phone, deferred, "lead created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "phone": lead.phone })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStage {
    pub phones: Vec<String>,
    pub stage: Stage,
    pub actor_id: Option<String>,
}

/// PATCH /leads — set the stage for a batch of leads. Unknown phones are
/// skipped; the valid subset commits in one transaction. `updated` is
/// the affected-lead count.
pub async fn bulk_update_stage(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Json(body): Json<BulkStage>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let phones = normalized_batch(&body.phones)?;
    let actor = body.actor_id.map(AgentId::from_raw);

    let affected = LeadRepo::new(state.db.clone()).bulk_update_stage(
        &tenant_id,
        &phones,
        body.stage,
        actor.as_ref(),
    )?;

    let phones: Vec<&str> = affected.iter().map(|(p, _)| p.as_str()).collect();
    Ok(Json(serde_json::json!({
        "success": true,
        "updated": affected.len(),
        "phones": phones,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BulkDelete {
    pub phones: Vec<String>,
}

/// DELETE /leads — delete a batch of leads and their history.
pub async fn bulk_delete(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Json(body): Json<BulkDelete>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let phones = normalized_batch(&body.phones)?;
    let deleted = LeadRepo::new(state.db.clone()).bulk_delete(&tenant_id, &phones)?;
    Ok(Json(serde_json::json!({ "success": true, "deleted": deleted })))
}

fn normalized_batch(raw: &[String]) -> Result<Vec<String>, ApiError> {
    if raw.is_empty() {
        return Err(ApiError(CrmError::Validation(
            "phones must not be empty".into(),
        )));
    }
    Ok(raw.iter().map(|p| normalize_phone(p)).collect())
}
