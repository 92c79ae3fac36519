use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use leadflow_core::ids::{AgentId, TenantId};
use leadflow_core::Stage;

use crate::database::Database;
use crate::error::{is_constraint_violation, StoreError};
use crate::events::EventType;
use crate::row_helpers;
use crate::search::{CompiledQuery, SqlParam};

const LEAD_COLUMNS: &str = "tenant_id, phone, name, email, address, alternate_number, source, \
                            stage, score, owner_id, need_followup, created_at, last_activity_at";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeadRow {
    pub tenant_id: TenantId,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub alternate_number: Option<String>,
    pub source: Option<String>,
    pub stage: Stage,
    pub score: f64,
    pub owner_id: Option<AgentId>,
    pub need_followup: bool,
    pub created_at: String,
    pub last_activity_at: Option<String>,
}

/// Input for lead creation. The phone must already be normalized.
#[derive(Clone, Debug, Default)]
pub struct NewLead {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub alternate_number: Option<String>,
    pub source: Option<String>,
    pub stage: Option<Stage>,
    pub score: Option<f64>,
    pub owner_id: Option<AgentId>,
}

pub struct LeadRepo {
    db: Database,
}

impl LeadRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a lead and its `created` event in one transaction.
    /// Duplicate phone within the tenant is a Conflict.
    #[instrument(skip(self, lead), fields(tenant_id = %tenant_id, phone = %lead.phone))]
    pub fn create(&self, tenant_id: &TenantId, lead: NewLead) -> Result<LeadRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        let stage = lead.stage.unwrap_or_default();
        let score = lead.score.unwrap_or(0.0);

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let inserted = tx.execute(
                "INSERT INTO leads (tenant_id, phone, name, email, address, alternate_number,
                                    source, stage, score, owner_id, need_followup, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11)",
                rusqlite::params![
                    tenant_id.as_str(),
                    lead.phone,
                    lead.name,
                    lead.email,
                    lead.address,
                    lead.alternate_number,
                    lead.source,
                    stage.as_str(),
                    score,
                    lead.owner_id.as_ref().map(|a| a.as_str().to_string()),
                    now,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(ref e) if is_constraint_violation(e) => {
                    return Err(StoreError::Conflict(format!(
                        "lead {} already exists",
                        lead.phone
                    )));
                }
                Err(e) => return Err(e.into()),
            }

            let payload = serde_json::json!({
                "stage": stage.as_str(),
                "owner_id": lead.owner_id.as_ref().map(|a| a.as_str()),
                "source": lead.source,
            });
            tx.execute(
                "INSERT INTO lead_events (id, tenant_id, phone, event_type, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    leadflow_core::ids::LeadEventId::new().as_str(),
                    tenant_id.as_str(),
                    lead.phone,
                    EventType::Created.to_string(),
                    payload.to_string(),
                    now,
                ],
            )?;

            tx.commit()?;

            Ok(LeadRow {
                tenant_id: tenant_id.clone(),
                phone: lead.phone.clone(),
                name: lead.name.clone(),
                email: lead.email.clone(),
                address: lead.address.clone(),
                alternate_number: lead.alternate_number.clone(),
                source: lead.source.clone(),
                stage,
                score,
                owner_id: lead.owner_id.clone(),
                need_followup: false,
                created_at: now.clone(),
                last_activity_at: None,
            })
        })
    }

    /// Get a lead by its natural key.
    pub fn get(&self, tenant_id: &TenantId, phone: &str) -> Result<LeadRow, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE tenant_id = ?1 AND phone = ?2");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params![tenant_id.as_str(), phone])?;
            match rows.next()? {
                Some(row) => row_to_lead(row),
                None => Err(StoreError::NotFound(format!("lead {phone}"))),
            }
        })
    }

    /// Page through leads matching a compiled filter, newest first.
    /// Ties on created_at fall back to insertion order so pagination
    /// stays consistent.
    #[instrument(skip(self, query))]
    pub fn search(
        &self,
        query: &CompiledQuery,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LeadRow>, StoreError> {
        let n = query.params.len();
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE {}
             ORDER BY created_at DESC, rowid ASC LIMIT ?{} OFFSET ?{}",
            query.where_sql,
            n + 1,
            n + 2,
        );

        let mut params = query.params.clone();
        params.push(SqlParam::Int(i64::from(limit)));
        params.push(SqlParam::Int(i64::from(offset)));

        self.collect_leads(&sql, &params)
    }

    /// Fetch every matching lead up to `cap`, newest first. Used when
    /// call-count filtering or sorting forces an in-memory pass.
    #[instrument(skip(self, query))]
    pub fn search_capped(
        &self,
        query: &CompiledQuery,
        cap: u32,
    ) -> Result<Vec<LeadRow>, StoreError> {
        let n = query.params.len();
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE {}
             ORDER BY created_at DESC, rowid ASC LIMIT ?{}",
            query.where_sql,
            n + 1,
        );

        let mut params = query.params.clone();
        params.push(SqlParam::Int(i64::from(cap)));

        self.collect_leads(&sql, &params)
    }

    /// Total number of leads matching a compiled filter.
    pub fn count(&self, query: &CompiledQuery) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM leads WHERE {}", query.where_sql);
            let refs = query.param_refs();
            conn.query_row(&sql, refs.as_slice(), |row| row.get(0))
                .map_err(Into::into)
        })
    }

    fn collect_leads(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<LeadRow>, StoreError> {
        self.db.with_conn(|conn| {
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p as &dyn rusqlite::types::ToSql).collect();
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(refs.as_slice())?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_lead(row)?);
            }
            Ok(results)
        })
    }

    /// Set a lead's stage for every phone that exists within the tenant,
    /// in one transaction, appending one stage-change event per affected
    /// lead with its prior stage. Phones outside the tenant are skipped.
    /// Returns (phone, prior stage) per affected lead.
    #[instrument(skip(self, phones), fields(tenant_id = %tenant_id, stage = %stage, batch = phones.len()))]
    pub fn bulk_update_stage(
        &self,
        tenant_id: &TenantId,
        phones: &[String],
        stage: Stage,
        actor_id: Option<&AgentId>,
    ) -> Result<Vec<(String, Stage)>, StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut affected = Vec::new();

            for phone in phones {
                let prior: Option<String> = tx
                    .query_row(
                        "SELECT stage FROM leads WHERE tenant_id = ?1 AND phone = ?2",
                        rusqlite::params![tenant_id.as_str(), phone],
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                let Some(prior) = prior else { continue };
                let prior: Stage = row_helpers::parse_enum(&prior, "leads", "stage")?;

                tx.execute(
                    "UPDATE leads SET stage = ?1, last_activity_at = ?2
                     WHERE tenant_id = ?3 AND phone = ?4",
                    rusqlite::params![stage.as_str(), now, tenant_id.as_str(), phone],
                )?;

                let payload = serde_json::json!({
                    "from": prior.as_str(),
                    "to": stage.as_str(),
                    "actor_id": actor_id.map(|a| a.as_str()),
                });
                tx.execute(
                    "INSERT INTO lead_events (id, tenant_id, phone, event_type, payload, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        leadflow_core::ids::LeadEventId::new().as_str(),
                        tenant_id.as_str(),
                        phone,
                        EventType::StageChange.to_string(),
                        payload.to_string(),
                        now,
                    ],
                )?;

                affected.push((phone.clone(), prior));
            }

            tx.commit()?;
            Ok(affected)
        })
    }

    /// Delete leads and everything hanging off them (events first, then
    /// list memberships, then the leads) in one transaction. Returns the
    /// phones that actually existed within the tenant.
    #[instrument(skip(self, phones), fields(tenant_id = %tenant_id, batch = phones.len()))]
    pub fn bulk_delete(
        &self,
        tenant_id: &TenantId,
        phones: &[String],
    ) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut deleted = Vec::new();

            for phone in phones {
                tx.execute(
                    "DELETE FROM lead_events WHERE tenant_id = ?1 AND phone = ?2",
                    rusqlite::params![tenant_id.as_str(), phone],
                )?;
                tx.execute(
                    "DELETE FROM lead_list_members WHERE tenant_id = ?1 AND phone = ?2",
                    rusqlite::params![tenant_id.as_str(), phone],
                )?;
                let n = tx.execute(
                    "DELETE FROM leads WHERE tenant_id = ?1 AND phone = ?2",
                    rusqlite::params![tenant_id.as_str(), phone],
                )?;
                if n > 0 {
                    deleted.push(phone.clone());
                }
            }

            tx.commit()?;
            Ok(deleted)
        })
    }
}

fn row_to_lead(row: &rusqlite::Row<'_>) -> Result<LeadRow, StoreError> {
    let stage: String = row_helpers::get(row, 7, "leads", "stage")?;

    Ok(LeadRow {
        tenant_id: TenantId::from_raw(row_helpers::get::<String>(row, 0, "leads", "tenant_id")?),
        phone: row_helpers::get(row, 1, "leads", "phone")?,
        name: row_helpers::get_opt(row, 2, "leads", "name")?,
        email: row_helpers::get_opt(row, 3, "leads", "email")?,
        address: row_helpers::get_opt(row, 4, "leads", "address")?,
        alternate_number: row_helpers::get_opt(row, 5, "leads", "alternate_number")?,
        source: row_helpers::get_opt(row, 6, "leads", "source")?,
        stage: row_helpers::parse_enum(&stage, "leads", "stage")?,
        score: row_helpers::get(row, 8, "leads", "score")?,
        owner_id: row_helpers::get_opt::<String>(row, 9, "leads", "owner_id")?.map(AgentId::from_raw),
        need_followup: row_helpers::get::<i64>(row, 10, "leads", "need_followup")? != 0,
        created_at: row_helpers::get(row, 11, "leads", "created_at")?,
        last_activity_at: row_helpers::get_opt(row, 12, "leads", "last_activity_at")?,
    })
}
