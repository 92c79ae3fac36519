use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use leadflow_core::ids::TenantId;
use leadflow_store::database::Database;
use leadflow_store::events::EventRepo;
use leadflow_store::leads::LeadRepo;

use crate::aggregate::{self, LeadView};
use crate::cache::{QueryCache, TtlClass};
use crate::error::EngineError;
use crate::filter::LeadFilter;

#[derive(Clone, Copy, Debug)]
pub struct QueryConfig {
    pub default_limit: u32,
    pub max_limit: u32,
    /// Row cap for the in-memory pass forced by call-count filters and
    /// sorting. Beyond this the result is computed over the newest
    /// `max_scan_rows` candidates only.
    pub max_scan_rows: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 200,
            max_scan_rows: 5000,
        }
    }
}

/// One page of lead views plus the total match count for the filter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub rows: Vec<LeadView>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

/// Read path for lead pages. Results come from the cache when a fresh
/// page exists for the same canonical filter; otherwise one of two
/// paths runs: plain filters page in SQL, call-count filters and sorts
/// take a capped in-memory pass because the count is derived from
/// events, not stored.
pub struct LeadQuery {
    leads: LeadRepo,
    events: EventRepo,
    config: QueryConfig,
}

impl LeadQuery {
    pub fn new(db: Database, config: QueryConfig) -> Self {
        Self {
            leads: LeadRepo::new(db.clone()),
            events: EventRepo::new(db),
            config,
        }
    }

    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(0) | None => self.config.default_limit,
            Some(n) => n.min(self.config.max_limit),
        }
    }

    #[instrument(skip(self, filter, cache), fields(tenant_id = %tenant_id, limit, offset))]
    pub fn run(
        &self,
        tenant_id: &TenantId,
        filter: &LeadFilter,
        limit: u32,
        offset: u32,
        cache: &QueryCache,
    ) -> Result<Page, EngineError> {
        let key = filter.cache_key(tenant_id, limit, offset);
        if let Some(hit) = cache.get(&key) {
            debug!(key, "serving lead page from cache");
            return Ok(serde_json::from_value(hit)?);
        }

        let page = if filter.needs_call_count_pass() {
            self.run_counted(tenant_id, filter, limit, offset)?
        } else {
            self.run_plain(tenant_id, filter, limit, offset)?
        };

        cache.put(key, TtlClass::LeadList, serde_json::to_value(&page)?);
        cache.sweep();
        Ok(page)
    }

    fn run_plain(
        &self,
        tenant_id: &TenantId,
        filter: &LeadFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Page, EngineError> {
        let compiled = filter.compile(tenant_id);
        let rows = self.leads.search(&compiled, limit, offset)?;
        let total = self.leads.count(&compiled)?;
        let rows = aggregate::augment(&self.events, rows)?;
        Ok(Page {
            rows,
            total,
            limit,
            offset,
        })
    }

    fn run_counted(
        &self,
        tenant_id: &TenantId,
        filter: &LeadFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Page, EngineError> {
        let compiled = filter.compile(tenant_id);
        let candidates = self.leads.search_capped(&compiled, self.config.max_scan_rows)?;
        let mut views = aggregate::augment(&self.events, candidates)?;

        views.retain(|v| filter.call_count_matches(v.call_count));
        if filter.sort_by_call_count {
            // Stable: equal counts keep the newest-first candidate order
            views.sort_by(|a, b| b.call_count.cmp(&a.call_count));
        }

        let total = views.len() as i64;
        let start = (offset as usize).min(views.len());
        let end = (start + limit as usize).min(views.len());
        Ok(Page {
            rows: views[start..end].to_vec(),
            total,
            limit,
            offset,
        })
    }
}
