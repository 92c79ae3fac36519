use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use leadflow_core::automation::{AutomationSettings, ConversionTier, CustomConfig, RuleKind};
use leadflow_core::CrmError;
use leadflow_store::automations::AutomationRepo;

use crate::error::ApiError;
use crate::server::AppState;
use crate::tenant::Tenant;

/// GET /automations — the rule catalog plus the tenant's active
/// configuration.
pub async fn get(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
) -> Result<Json<serde_json::Value>, ApiError> {
    let active = AutomationRepo::new(state.db.clone()).load(&tenant_id)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "rules": RuleKind::all(),
        "active": active,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRule {
    pub id: String,
    #[serde(default)]
    pub conversion_rates: Vec<ConversionTier>,
    #[serde(default)]
    pub custom_config: Option<CustomConfig>,
}

/// POST /automations — activate a rule for the tenant. Replaces the
/// prior configuration; leads already assigned keep their owners.
pub async fn activate(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Json(body): Json<ActivateRule>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rule: RuleKind = body
        .id
        .parse()
        .map_err(|e: String| ApiError(CrmError::Validation(e)))?;

    let settings = AutomationSettings {
        rule,
        conversion_tiers: body.conversion_rates,
        custom: body.custom_config.unwrap_or_default(),
    };
    AutomationRepo::new(state.db.clone()).save(&tenant_id, &settings)?;
    info!(tenant_id = %tenant_id, rule = %settings.rule, "automation rule activated");

    Ok(Json(serde_json::json!({ "success": true, "active": settings })))
}
