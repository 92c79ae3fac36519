use serde::{Deserialize, Serialize};

use leadflow_core::ids::AgentId;
use leadflow_core::Stage;
use leadflow_store::events::EventRepo;
use leadflow_store::leads::LeadRow;

use crate::error::EngineError;

/// A lead as clients see it: the stored row plus the derived call count.
/// The call count is the number of stage-change events on record for the
/// lead; it is computed here, never stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadView {
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
    pub call_count: i64,
    pub created_at: String,
    pub last_activity_at: Option<String>,
}

impl LeadView {
    fn from_row(row: LeadRow, call_count: i64) -> Self {
        Self {
            phone: row.phone,
            name: row.name,
            email: row.email,
            address: row.address,
            alternate_number: row.alternate_number,
            source: row.source,
            stage: row.stage,
            score: row.score,
            owner_id: row.owner_id,
            need_followup: row.need_followup,
            call_count,
            created_at: row.created_at,
            last_activity_at: row.last_activity_at,
        }
    }
}

/// Attach call counts to a candidate set with one grouped event query.
/// Leads with no stage changes get zero. Input order is preserved.
pub fn augment(events: &EventRepo, rows: Vec<LeadRow>) -> Result<Vec<LeadView>, EngineError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let tenant_id = rows[0].tenant_id.clone();
    let phones: Vec<String> = rows.iter().map(|r| r.phone.clone()).collect();
    let counts = events.stage_change_counts(&tenant_id, &phones)?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let count = counts.get(&row.phone).copied().unwrap_or(0);
            LeadView::from_row(row, count)
        })
        .collect())
}
