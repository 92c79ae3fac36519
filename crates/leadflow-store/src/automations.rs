use chrono::Utc;
use tracing::instrument;

use leadflow_core::automation::AutomationSettings;
use leadflow_core::ids::TenantId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Per-tenant singleton automation configuration. Exactly one rule is
/// active per tenant; a tenant that never configured one gets the
/// default (round-robin).
pub struct AutomationRepo {
    db: Database,
}

impl AutomationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn load(&self, tenant_id: &TenantId) -> Result<AutomationSettings, StoreError> {
        self.db.with_conn(|conn| {
            let row: Option<String> = conn
                .query_row(
                    "SELECT params FROM automation_configs WHERE tenant_id = ?1",
                    [tenant_id.as_str()],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            match row {
                Some(params) => {
                    let value = row_helpers::parse_json(&params, "automation_configs", "params")?;
                    serde_json::from_value(value).map_err(|e| StoreError::CorruptRow {
                        table: "automation_configs",
                        column: "params",
                        detail: e.to_string(),
                    })
                }
                None => Ok(AutomationSettings::default()),
            }
        })
    }

    /// Activate a rule for the tenant, replacing any prior configuration.
    /// Never retouches already-assigned leads.
    #[instrument(skip(self, settings), fields(tenant_id = %tenant_id, rule = %settings.rule))]
    pub fn save(
        &self,
        tenant_id: &TenantId,
        settings: &AutomationSettings,
    ) -> Result<(), StoreError> {
        let params = serde_json::to_string(settings)?;
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO automation_configs (tenant_id, rule, params, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(tenant_id) DO UPDATE SET
                     rule = excluded.rule,
                     params = excluded.params,
                     updated_at = excluded.updated_at",
                rusqlite::params![tenant_id.as_str(), settings.rule.as_str(), params, now],
            )?;
            Ok(())
        })
    }
}
