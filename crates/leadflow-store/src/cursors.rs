use tracing::instrument;

use leadflow_core::ids::TenantId;

use crate::database::Database;
use crate::error::StoreError;

/// Durable per-tenant rotation counter backing round-robin assignment
/// and CUSTOM tie-breaks. The advance is a single atomic upsert in the
/// store, never an in-memory counter, so concurrent requests (and
/// multiple service instances) can never observe the same position.
pub struct CursorRepo {
    db: Database,
}

impl CursorRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Read-and-advance the tenant's cursor. Returns the position to use
    /// for this assignment (0-based, monotonically increasing).
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn advance(&self, tenant_id: &TenantId) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let position: i64 = conn.query_row(
                "INSERT INTO assignment_cursors (tenant_id, position) VALUES (?1, 0)
                 ON CONFLICT(tenant_id) DO UPDATE SET position = position + 1
                 RETURNING position",
                [tenant_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(position as u64)
        })
    }

    /// Current position without advancing. Missing row means no
    /// assignment has happened yet.
    pub fn peek(&self, tenant_id: &TenantId) -> Result<Option<u64>, StoreError> {
        self.db.with_conn(|conn| {
            let row: Option<i64> = conn
                .query_row(
                    "SELECT position FROM assignment_cursors WHERE tenant_id = ?1",
                    [tenant_id.as_str()],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(row.map(|p| p as u64))
        })
    }
}
