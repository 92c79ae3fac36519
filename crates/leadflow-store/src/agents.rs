use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use leadflow_core::ids::{AgentId, TenantId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Roles eligible to receive leads from the assignment engine.
pub const ELIGIBLE_ROLES: [&str; 2] = ["sales", "jl"];

/// Trailing window for the rolling conversion-rate statistic.
pub const CONVERSION_WINDOW_DAYS: i64 = 90;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRow {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub code: String,
    pub name: String,
    pub role: String,
    pub active: bool,
    pub ad_spend_cents: i64,
    pub revenue_cents: i64,
}

/// Derived view of an agent for assignment decisions. Conversion rate is
/// None when the agent has no assigned leads in the window (the engine
/// substitutes the pool mean).
#[derive(Clone, Debug, PartialEq)]
pub struct AgentProfile {
    pub id: AgentId,
    pub conversion_rate: Option<f64>,
    pub assigned_total: i64,
    pub open_leads: i64,
    pub ad_spend_pct: f64,
}

pub struct AgentRepo {
    db: Database,
}

impl AgentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        tenant_id: &TenantId,
        code: &str,
        name: &str,
        role: &str,
    ) -> Result<AgentRow, StoreError> {
        let id = AgentId::new();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agents (id, tenant_id, code, name, role, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                rusqlite::params![id.as_str(), tenant_id.as_str(), code, name, role],
            )?;
            Ok(AgentRow {
                id,
                tenant_id: tenant_id.clone(),
                code: code.to_string(),
                name: name.to_string(),
                role: role.to_string(),
                active: true,
                ad_spend_cents: 0,
                revenue_cents: 0,
            })
        })
    }

    pub fn set_active(&self, id: &AgentId, active: bool) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE agents SET active = ?1 WHERE id = ?2",
                rusqlite::params![active as i64, id.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn set_ad_attribution(
        &self,
        id: &AgentId,
        ad_spend_cents: i64,
        revenue_cents: i64,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE agents SET ad_spend_cents = ?1, revenue_cents = ?2 WHERE id = ?3",
                rusqlite::params![ad_spend_cents, revenue_cents, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Active agents eligible for assignment, in stable code order. This
    /// ordering is what the round-robin cursor indexes into.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn eligible_pool(&self, tenant_id: &TenantId) -> Result<Vec<AgentRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, code, name, role, active, ad_spend_cents, revenue_cents
                 FROM agents
                 WHERE tenant_id = ?1 AND active = 1 AND role IN (?2, ?3)
                 ORDER BY code ASC, id ASC",
            )?;
            let mut rows = stmt.query(rusqlite::params![
                tenant_id.as_str(),
                ELIGIBLE_ROLES[0],
                ELIGIBLE_ROLES[1],
            ])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_agent(row)?);
            }
            Ok(results)
        })
    }

    /// Build assignment profiles for the eligible pool: rolling
    /// conversion rate over the trailing window, current open-lead load,
    /// and attributed ad spend as a percentage of attributed revenue.
    /// Two grouped queries regardless of pool size.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn profiles(&self, tenant_id: &TenantId) -> Result<Vec<AgentProfile>, StoreError> {
        let pool = self.eligible_pool(tenant_id)?;
        if pool.is_empty() {
            return Ok(Vec::new());
        }

        let cutoff = (Utc::now() - Duration::days(CONVERSION_WINDOW_DAYS)).to_rfc3339();

        let (windowed, open) = self.db.with_conn(|conn| {
            let mut windowed: HashMap<String, (i64, i64)> = HashMap::new();
            let mut stmt = conn.prepare(
                "SELECT owner_id, COUNT(*),
                        SUM(CASE WHEN stage = 'Customer' THEN 1 ELSE 0 END)
                 FROM leads
                 WHERE tenant_id = ?1 AND owner_id IS NOT NULL AND created_at >= ?2
                 GROUP BY owner_id",
            )?;
            let mut rows = stmt.query(rusqlite::params![tenant_id.as_str(), cutoff])?;
            while let Some(row) = rows.next()? {
                let owner: String = row_helpers::get(row, 0, "leads", "owner_id")?;
                let total: i64 = row_helpers::get(row, 1, "leads", "assigned_total")?;
                let converted: i64 = row_helpers::get(row, 2, "leads", "converted")?;
                windowed.insert(owner, (total, converted));
            }

            let mut open: HashMap<String, i64> = HashMap::new();
            let mut stmt = conn.prepare(
                "SELECT owner_id, COUNT(*)
                 FROM leads
                 WHERE tenant_id = ?1 AND owner_id IS NOT NULL
                   AND stage NOT IN ('Customer', 'Not interested', 'Junk')
                 GROUP BY owner_id",
            )?;
            let mut rows = stmt.query(rusqlite::params![tenant_id.as_str()])?;
            while let Some(row) = rows.next()? {
                let owner: String = row_helpers::get(row, 0, "leads", "owner_id")?;
                let count: i64 = row_helpers::get(row, 1, "leads", "open_leads")?;
                open.insert(owner, count);
            }

            Ok((windowed, open))
        })?;

        Ok(pool
            .into_iter()
            .map(|agent| {
                let (total, converted) = windowed
                    .get(agent.id.as_str())
                    .copied()
                    .unwrap_or((0, 0));
                let conversion_rate = if total > 0 {
                    Some(converted as f64 / total as f64)
                } else {
                    None
                };
                let ad_spend_pct = if agent.revenue_cents > 0 {
                    agent.ad_spend_cents as f64 / agent.revenue_cents as f64 * 100.0
                } else if agent.ad_spend_cents > 0 {
                    100.0
                } else {
                    0.0
                };
                AgentProfile {
                    conversion_rate,
                    assigned_total: total,
                    open_leads: open.get(agent.id.as_str()).copied().unwrap_or(0),
                    ad_spend_pct,
                    id: agent.id,
                }
            })
            .collect())
    }
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> Result<AgentRow, StoreError> {
    Ok(AgentRow {
        id: AgentId::from_raw(row_helpers::get::<String>(row, 0, "agents", "id")?),
        tenant_id: TenantId::from_raw(row_helpers::get::<String>(row, 1, "agents", "tenant_id")?),
        code: row_helpers::get(row, 2, "agents", "code")?,
        name: row_helpers::get(row, 3, "agents", "name")?,
        role: row_helpers::get(row, 4, "agents", "role")?,
        active: row_helpers::get::<i64>(row, 5, "agents", "active")? != 0,
        ad_spend_cents: row_helpers::get(row, 6, "agents", "ad_spend_cents")?,
        revenue_cents: row_helpers::get(row, 7, "agents", "revenue_cents")?,
    })
}
