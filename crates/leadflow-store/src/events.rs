use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use leadflow_core::ids::{LeadEventId, TenantId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// What happened to a lead. Append-only; rows are never updated and are
/// deleted only as a cascade of lead deletion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    StageChange,
    Note,
    AssignmentDeferred,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::StageChange => write!(f, "stage_change"),
            Self::Note => write!(f, "note"),
            Self::AssignmentDeferred => write!(f, "assignment_deferred"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "stage_change" => Ok(Self::StageChange),
            "note" => Ok(Self::Note),
            "assignment_deferred" => Ok(Self::AssignmentDeferred),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeadEventRow {
    pub id: LeadEventId,
    pub tenant_id: TenantId,
    pub phone: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub created_at: String,
}

pub struct EventRepo {
    db: Database,
}

// SQLite's default host-parameter limit is 999; stay under it when
// binding phone lists.
const IN_CHUNK: usize = 500;

impl EventRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append an event for a lead.
    #[instrument(skip(self, payload), fields(tenant_id = %tenant_id, phone, event_type = %event_type))]
    pub fn append(
        &self,
        tenant_id: &TenantId,
        phone: &str,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<LeadEventRow, StoreError> {
        let id = LeadEventId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO lead_events (id, tenant_id, phone, event_type, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    tenant_id.as_str(),
                    phone,
                    event_type.to_string(),
                    payload.to_string(),
                    now,
                ],
            )?;

            Ok(LeadEventRow {
                id,
                tenant_id: tenant_id.clone(),
                phone: phone.to_string(),
                event_type,
                payload,
                created_at: now,
            })
        })
    }

    /// List events for a lead, oldest first.
    pub fn list_for_lead(
        &self,
        tenant_id: &TenantId,
        phone: &str,
    ) -> Result<Vec<LeadEventRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, phone, event_type, payload, created_at
                 FROM lead_events WHERE tenant_id = ?1 AND phone = ?2
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let mut rows = stmt.query(rusqlite::params![tenant_id.as_str(), phone])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_event(row)?);
            }
            Ok(results)
        })
    }

    /// Count stage-change events per lead for a candidate set, in one
    /// grouped pass per chunk. Leads with no stage changes are absent
    /// from the map.
    #[instrument(skip(self, phones), fields(tenant_id = %tenant_id, candidates = phones.len()))]
    pub fn stage_change_counts(
        &self,
        tenant_id: &TenantId,
        phones: &[String],
    ) -> Result<HashMap<String, i64>, StoreError> {
        let mut counts = HashMap::with_capacity(phones.len());
        if phones.is_empty() {
            return Ok(counts);
        }

        self.db.with_conn(|conn| {
            for chunk in phones.chunks(IN_CHUNK) {
                let placeholders: Vec<String> =
                    (0..chunk.len()).map(|i| format!("?{}", i + 3)).collect();
                let sql = format!(
                    "SELECT phone, COUNT(*) FROM lead_events
                     WHERE tenant_id = ?1 AND event_type = ?2 AND phone IN ({})
                     GROUP BY phone",
                    placeholders.join(", ")
                );

                let mut params: Vec<&dyn rusqlite::types::ToSql> =
                    Vec::with_capacity(chunk.len() + 2);
                let tenant = tenant_id.as_str().to_string();
                let event_type = EventType::StageChange.to_string();
                params.push(&tenant);
                params.push(&event_type);
                for phone in chunk {
                    params.push(phone);
                }

                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params.as_slice())?;
                while let Some(row) = rows.next()? {
                    let phone: String = row_helpers::get(row, 0, "lead_events", "phone")?;
                    let count: i64 = row_helpers::get(row, 1, "lead_events", "count")?;
                    counts.insert(phone, count);
                }
            }
            Ok(())
        })?;

        Ok(counts)
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<LeadEventRow, StoreError> {
    let event_type: String = row_helpers::get(row, 3, "lead_events", "event_type")?;
    let payload: String = row_helpers::get(row, 4, "lead_events", "payload")?;

    Ok(LeadEventRow {
        id: LeadEventId::from_raw(row_helpers::get::<String>(row, 0, "lead_events", "id")?),
        tenant_id: TenantId::from_raw(row_helpers::get::<String>(row, 1, "lead_events", "tenant_id")?),
        phone: row_helpers::get(row, 2, "lead_events", "phone")?,
        event_type: row_helpers::parse_enum(&event_type, "lead_events", "event_type")?,
        payload: row_helpers::parse_json(&payload, "lead_events", "payload")?,
        created_at: row_helpers::get(row, 5, "lead_events", "created_at")?,
    })
}
