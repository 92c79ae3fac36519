use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use leadflow_core::ids::{ListId, TenantId};

use crate::database::Database;
use crate::error::{is_constraint_violation, StoreError};
use crate::row_helpers;

/// A named lead list. A NULL tenant means a shared list visible to every
/// tenant; membership rows are always tenant-scoped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListRow {
    pub id: ListId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub created_at: String,
}

pub struct ListRepo {
    db: Database,
}

impl ListRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        tenant_id: Option<&TenantId>,
        name: &str,
    ) -> Result<ListRow, StoreError> {
        let id = ListId::new();
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO lead_lists (id, tenant_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    id.as_str(),
                    tenant_id.map(|t| t.as_str().to_string()),
                    name,
                    now,
                ],
            )?;
            Ok(ListRow {
                id,
                tenant_id: tenant_id.cloned(),
                name: name.to_string(),
                created_at: now,
            })
        })
    }

    /// Add a lead to a list. The list must belong to the tenant or be a
    /// shared (NULL-tenant) list; anything else is NotFound so callers
    /// cannot probe other tenants' lists.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, list_id = %list_id, phone))]
    pub fn add_member(
        &self,
        tenant_id: &TenantId,
        list_id: &ListId,
        phone: &str,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let visible: i64 = conn.query_row(
                "SELECT COUNT(*) FROM lead_lists
                 WHERE id = ?1 AND (tenant_id = ?2 OR tenant_id IS NULL)",
                rusqlite::params![list_id.as_str(), tenant_id.as_str()],
                |row| row.get(0),
            )?;
            if visible == 0 {
                return Err(StoreError::NotFound(format!("list {list_id}")));
            }

            let now = Utc::now().to_rfc3339();
            let result = conn.execute(
                "INSERT INTO lead_list_members (list_id, tenant_id, phone, added_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![list_id.as_str(), tenant_id.as_str(), phone, now],
            );
            match result {
                Ok(_) => Ok(()),
                // Re-adding an existing member is a no-op
                Err(ref e) if is_constraint_violation(e) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn members(
        &self,
        tenant_id: &TenantId,
        list_id: &ListId,
    ) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT phone FROM lead_list_members
                 WHERE list_id = ?1 AND tenant_id = ?2 ORDER BY added_at ASC",
            )?;
            let mut rows = stmt.query(rusqlite::params![list_id.as_str(), tenant_id.as_str()])?;
            let mut phones = Vec::new();
            while let Some(row) = rows.next()? {
                phones.push(row_helpers::get(row, 0, "lead_list_members", "phone")?);
            }
            Ok(phones)
        })
    }
}
