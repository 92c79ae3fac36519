use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Local};

use leadflow_core::ids::{AgentId, ListId, TenantId};
use leadflow_core::Stage;
use leadflow_store::row_helpers::escape_like;
use leadflow_store::search::{CompiledQuery, SqlParam};

use crate::windows::{ActivityWindow, DateWindow};

/// Owner filter: a specific agent, or the `unassigned` sentinel which
/// asserts the owner column is null.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnerFilter {
    Agent(AgentId),
    Unassigned,
}

/// Every optional lead-query parameter. An absent field contributes no
/// clause; there are no match-all sentinels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LeadFilter {
    pub text: Option<String>,
    pub stage: Option<Stage>,
    pub owner: Option<OwnerFilter>,
    pub source: Option<String>,
    pub score_min: Option<f64>,
    pub score_max: Option<f64>,
    /// Explicit creation bounds, RFC 3339. Upper bound exclusive.
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    /// Explicit last-activity bounds, RFC 3339. Upper bound exclusive.
    pub activity_from: Option<String>,
    pub activity_to: Option<String>,
    /// The `noactivity` sentinel: last-activity timestamp is null.
    pub no_activity: bool,
    pub need_followup: Option<bool>,
    pub has_email: Option<bool>,
    pub email_domain: Option<String>,
    pub exclude_early_stages: bool,
    pub list_id: Option<ListId>,
    pub call_count_min: Option<i64>,
    pub call_count_max: Option<i64>,
    pub sort_by_call_count: bool,
}

/// One recognized filter, lowered independently and combined with AND.
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    TextSearch(String),
    StageEq(Stage),
    OwnerEq(AgentId),
    OwnerUnassigned,
    SourceEq(String),
    ScoreMin(f64),
    ScoreMax(f64),
    CreatedFrom(String),
    CreatedBefore(String),
    ActivityFrom(String),
    ActivityBefore(String),
    ActivityNever,
    NeedFollowup(bool),
    HasEmail(bool),
    EmailDomain(String),
    ExcludeEarlyStages,
    InList(ListId),
}

impl LeadFilter {
    /// Build a filter from raw query parameters. Malformed values are
    /// ignored rather than rejected: the filter surface is deliberately
    /// forgiving, and only a missing tenant is a hard failure upstream.
    ///
    /// Named date windows resolve to explicit bounds here, at request
    /// time; explicit `from`/`to` always win over a window name, and the
    /// newer `scoreMin`/`scoreMax` names win over legacy
    /// `minScore`/`maxScore`.
    pub fn from_params(params: &HashMap<String, String>, now: DateTime<Local>) -> Self {
        let get = |key: &str| params.get(key).map(|s| s.trim()).filter(|s| !s.is_empty());

        let mut filter = LeadFilter {
            text: get("q").map(str::to_string),
            stage: get("stage").and_then(|s| s.parse().ok()),
            owner: get("owner").map(|s| {
                if s.eq_ignore_ascii_case("unassigned") {
                    OwnerFilter::Unassigned
                } else {
                    OwnerFilter::Agent(AgentId::from_raw(s))
                }
            }),
            source: get("source").map(str::to_string),
            score_min: get("scoreMin")
                .or_else(|| get("minScore"))
                .and_then(|s| s.parse().ok()),
            score_max: get("scoreMax")
                .or_else(|| get("maxScore"))
                .and_then(|s| s.parse().ok()),
            need_followup: get("needFollowup").and_then(parse_bool),
            has_email: get("hasEmail").and_then(parse_bool),
            email_domain: get("emailDomain").map(str::to_string),
            exclude_early_stages: get("excludeEarlyStages")
                .and_then(parse_bool)
                .unwrap_or(false),
            list_id: get("listId").map(ListId::from_raw),
            call_count_min: get("callCountMin").and_then(|s| s.parse().ok()),
            call_count_max: get("callCountMax").and_then(|s| s.parse().ok()),
            sort_by_call_count: get("sortByCallCount")
                .and_then(parse_bool)
                .unwrap_or(false),
            ..Default::default()
        };

        filter.created_from = get("from").map(normalize_lower_bound);
        filter.created_to = get("to").map(normalize_upper_bound);
        if filter.created_from.is_none() && filter.created_to.is_none() {
            if let Some(window) = get("dateRange").and_then(|s| s.parse::<DateWindow>().ok()) {
                let (from, to) = window.resolve(now);
                filter.created_from = Some(from);
                filter.created_to = Some(to);
            }
        }

        filter.activity_from = get("activityDateFrom").map(normalize_lower_bound);
        filter.activity_to = get("activityDateTo").map(normalize_upper_bound);
        if filter.activity_from.is_none() && filter.activity_to.is_none() {
            match get("lastActivity") {
                Some(s) if s.eq_ignore_ascii_case("noactivity") => filter.no_activity = true,
                Some(s) => {
                    if let Ok(window) = s.parse::<ActivityWindow>() {
                        let (from, to) = window.resolve(now);
                        filter.activity_from = Some(from);
                        filter.activity_to = Some(to);
                    }
                }
                None => {}
            }
        }

        filter
    }

    /// The tagged clause list this filter lowers to. Centrally enumerates
    /// every recognized filter so each lowers and tests in isolation.
    pub fn clauses(&self) -> Vec<Clause> {
        let mut clauses = Vec::new();

        if let Some(text) = &self.text {
            clauses.push(Clause::TextSearch(text.clone()));
        }
        if let Some(stage) = self.stage {
            clauses.push(Clause::StageEq(stage));
        }
        match &self.owner {
            Some(OwnerFilter::Agent(id)) => clauses.push(Clause::OwnerEq(id.clone())),
            Some(OwnerFilter::Unassigned) => clauses.push(Clause::OwnerUnassigned),
            None => {}
        }
        if let Some(source) = &self.source {
            clauses.push(Clause::SourceEq(source.clone()));
        }
        if let Some(min) = self.score_min {
            clauses.push(Clause::ScoreMin(min));
        }
        if let Some(max) = self.score_max {
            clauses.push(Clause::ScoreMax(max));
        }
        if let Some(from) = &self.created_from {
            clauses.push(Clause::CreatedFrom(from.clone()));
        }
        if let Some(to) = &self.created_to {
            clauses.push(Clause::CreatedBefore(to.clone()));
        }
        if self.no_activity {
            clauses.push(Clause::ActivityNever);
        } else {
            if let Some(from) = &self.activity_from {
                clauses.push(Clause::ActivityFrom(from.clone()));
            }
            if let Some(to) = &self.activity_to {
                clauses.push(Clause::ActivityBefore(to.clone()));
            }
        }
        if let Some(flag) = self.need_followup {
            clauses.push(Clause::NeedFollowup(flag));
        }
        if let Some(flag) = self.has_email {
            clauses.push(Clause::HasEmail(flag));
        }
        if let Some(domain) = &self.email_domain {
            clauses.push(Clause::EmailDomain(domain.clone()));
        }
        if self.exclude_early_stages {
            clauses.push(Clause::ExcludeEarlyStages);
        }
        if let Some(list_id) = &self.list_id {
            clauses.push(Clause::InList(list_id.clone()));
        }

        clauses
    }

    /// Fold the clause list into one tenant-scoped WHERE fragment. The
    /// tenant clause always comes first; nothing can widen it.
    pub fn compile(&self, tenant_id: &TenantId) -> CompiledQuery {
        let mut query = CompiledQuery {
            where_sql: "tenant_id = ?1".to_string(),
            params: vec![SqlParam::Text(tenant_id.as_str().to_string())],
        };
        for clause in self.clauses() {
            lower(&clause, &mut query);
        }
        query
    }

    /// True when the call count must be computed for the full candidate
    /// set before pagination (range post-filter or call-count sort).
    pub fn needs_call_count_pass(&self) -> bool {
        self.call_count_min.is_some() || self.call_count_max.is_some() || self.sort_by_call_count
    }

    /// Keep only leads whose computed call count is inside the range.
    pub fn call_count_matches(&self, count: i64) -> bool {
        self.call_count_min.is_none_or(|min| count >= min)
            && self.call_count_max.is_none_or(|max| count <= max)
    }

    /// Canonical cache key: tenant + every present parameter in sorted
    /// key order + the pagination window. Two logically identical filters
    /// produce the same key regardless of construction order.
    pub fn cache_key(&self, tenant_id: &TenantId, limit: u32, offset: u32) -> String {
        let mut parts: BTreeMap<&'static str, String> = BTreeMap::new();

        let mut put = |k: &'static str, v: Option<String>| {
            if let Some(v) = v {
                parts.insert(k, v);
            }
        };
        put("q", self.text.clone());
        put("stage", self.stage.map(|s| s.to_string()));
        put(
            "owner",
            self.owner.as_ref().map(|o| match o {
                OwnerFilter::Agent(id) => id.to_string(),
                OwnerFilter::Unassigned => "unassigned".to_string(),
            }),
        );
        put("source", self.source.clone());
        put("score_min", self.score_min.map(|v| v.to_string()));
        put("score_max", self.score_max.map(|v| v.to_string()));
        put("from", self.created_from.clone());
        put("to", self.created_to.clone());
        put("activity_from", self.activity_from.clone());
        put("activity_to", self.activity_to.clone());
        put("no_activity", self.no_activity.then(|| "1".to_string()));
        put("need_followup", self.need_followup.map(|b| b.to_string()));
        put("has_email", self.has_email.map(|b| b.to_string()));
        put("email_domain", self.email_domain.clone());
        put(
            "exclude_early",
            self.exclude_early_stages.then(|| "1".to_string()),
        );
        put("list", self.list_id.as_ref().map(|l| l.to_string()));
        put("cc_min", self.call_count_min.map(|v| v.to_string()));
        put("cc_max", self.call_count_max.map(|v| v.to_string()));
        put(
            "sort_cc",
            self.sort_by_call_count.then(|| "1".to_string()),
        );

        let mut key = format!("v1|{tenant_id}");
        for (k, v) in &parts {
            key.push('|');
            key.push_str(k);
            key.push('=');
            key.push_str(v);
        }
        key.push_str(&format!("|limit={limit}|offset={offset}"));
        key
    }
}

/// Lower one clause onto the WHERE fragment, numbering placeholders after
/// the parameters already present.
fn lower(clause: &Clause, query: &mut CompiledQuery) {
    // placeholder index for the next parameter to be pushed
    let next = query.params.len() + 1;

    match clause {
        Clause::TextSearch(text) => {
            let pattern = format!("%{}%", escape_like(&text.to_lowercase()));
            let (a, b, c) = (next, next + 1, next + 2);
            query.where_sql.push_str(&format!(
                " AND (LOWER(name) LIKE ?{a} ESCAPE '\\' OR LOWER(email) LIKE ?{b} ESCAPE '\\' OR phone LIKE ?{c} ESCAPE '\\')"
            ));
            query.params.push(SqlParam::Text(pattern.clone()));
            query.params.push(SqlParam::Text(pattern.clone()));
            query.params.push(SqlParam::Text(pattern));
        }
        Clause::StageEq(stage) => {
            let i = next;
            query.where_sql.push_str(&format!(" AND stage = ?{i}"));
            query.params.push(SqlParam::Text(stage.as_str().to_string()));
        }
        Clause::OwnerEq(agent) => {
            let i = next;
            query.where_sql.push_str(&format!(" AND owner_id = ?{i}"));
            query.params.push(SqlParam::Text(agent.as_str().to_string()));
        }
        Clause::OwnerUnassigned => {
            query.where_sql.push_str(" AND owner_id IS NULL");
        }
        Clause::SourceEq(source) => {
            let i = next;
            query.where_sql.push_str(&format!(" AND source = ?{i}"));
            query.params.push(SqlParam::Text(source.clone()));
        }
        Clause::ScoreMin(min) => {
            let i = next;
            query.where_sql.push_str(&format!(" AND score >= ?{i}"));
            query.params.push(SqlParam::Real(*min));
        }
        Clause::ScoreMax(max) => {
            let i = next;
            query.where_sql.push_str(&format!(" AND score <= ?{i}"));
            query.params.push(SqlParam::Real(*max));
        }
        Clause::CreatedFrom(from) => {
            let i = next;
            query.where_sql.push_str(&format!(" AND created_at >= ?{i}"));
            query.params.push(SqlParam::Text(from.clone()));
        }
        Clause::CreatedBefore(to) => {
            let i = next;
            query.where_sql.push_str(&format!(" AND created_at < ?{i}"));
            query.params.push(SqlParam::Text(to.clone()));
        }
        Clause::ActivityFrom(from) => {
            let i = next;
            query
                .where_sql
                .push_str(&format!(" AND last_activity_at >= ?{i}"));
            query.params.push(SqlParam::Text(from.clone()));
        }
        Clause::ActivityBefore(to) => {
            let i = next;
            query
                .where_sql
                .push_str(&format!(" AND last_activity_at < ?{i}"));
            query.params.push(SqlParam::Text(to.clone()));
        }
        Clause::ActivityNever => {
            query.where_sql.push_str(" AND last_activity_at IS NULL");
        }
        Clause::NeedFollowup(flag) => {
            let i = next;
            query.where_sql.push_str(&format!(" AND need_followup = ?{i}"));
            query.params.push(SqlParam::Int(i64::from(*flag)));
        }
        Clause::HasEmail(true) => {
            query
                .where_sql
                .push_str(" AND email IS NOT NULL AND email != ''");
        }
        Clause::HasEmail(false) => {
            query.where_sql.push_str(" AND (email IS NULL OR email = '')");
        }
        Clause::EmailDomain(domain) => {
            let i = next;
            let suffix = if domain.starts_with('@') {
                domain.to_lowercase()
            } else {
                format!("@{}", domain.to_lowercase())
            };
            query
                .where_sql
                .push_str(&format!(" AND LOWER(email) LIKE ?{i} ESCAPE '\\'"));
            query
                .params
                .push(SqlParam::Text(format!("%{}", escape_like(&suffix))));
        }
        Clause::ExcludeEarlyStages => {
            let (a, b, c) = (next, next + 1, next + 2);
            query
                .where_sql
                .push_str(&format!(" AND stage NOT IN (?{a}, ?{b}, ?{c})"));
            for stage in Stage::EARLY {
                query.params.push(SqlParam::Text(stage.as_str().to_string()));
            }
        }
        Clause::InList(list_id) => {
            let i = next;
            query.where_sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM lead_list_members m \
                 JOIN lead_lists l ON l.id = m.list_id \
                 WHERE m.list_id = ?{i} AND m.phone = leads.phone \
                 AND m.tenant_id = leads.tenant_id \
                 AND (l.tenant_id = leads.tenant_id OR l.tenant_id IS NULL))"
            ));
            query.params.push(SqlParam::Text(list_id.as_str().to_string()));
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Date-only bounds get day semantics: a lower bound starts at that day,
/// an upper bound runs to the end of that day (exclusive next-day start).
fn normalize_lower_bound(s: &str) -> String {
    match date_only(s) {
        Some(d) => format!("{}T00:00:00+00:00", d),
        None => s.to_string(),
    }
}

fn normalize_upper_bound(s: &str) -> String {
    match date_only(s) {
        Some(d) => {
            let next = d + chrono::Duration::days(1);
            format!("{}T00:00:00+00:00", next)
        }
        None => s.to_string(),
    }
}

fn date_only(s: &str) -> Option<chrono::NaiveDate> {
    if s.len() == 10 {
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 23, 12, 0, 0).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_params_compile_to_tenant_clause_only() {
        let filter = LeadFilter::from_params(&HashMap::new(), now());
        assert!(filter.clauses().is_empty());

        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        assert_eq!(q.where_sql, "tenant_id = ?1");
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn text_search_lowers_to_three_fields() {
        let filter = LeadFilter {
            text: Some("Ada".into()),
            ..Default::default()
        };
        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        assert!(q.where_sql.contains("LOWER(name) LIKE ?2"));
        assert!(q.where_sql.contains("LOWER(email) LIKE ?3"));
        assert!(q.where_sql.contains("phone LIKE ?4"));
        assert_eq!(q.params[1], SqlParam::Text("%ada%".into()));
    }

    #[test]
    fn text_search_escapes_like_metacharacters() {
        let filter = LeadFilter {
            text: Some("100%".into()),
            ..Default::default()
        };
        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        assert_eq!(q.params[1], SqlParam::Text("%100\\%%".into()));
    }

    #[test]
    fn owner_sentinel_lowers_to_is_null() {
        let filter = LeadFilter::from_params(&params(&[("owner", "unassigned")]), now());
        assert_eq!(filter.owner, Some(OwnerFilter::Unassigned));
        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        assert!(q.where_sql.contains("owner_id IS NULL"));
    }

    #[test]
    fn newer_score_names_win_over_legacy() {
        let filter = LeadFilter::from_params(
            &params(&[
                ("scoreMin", "10"),
                ("minScore", "99"),
                ("maxScore", "50"),
            ]),
            now(),
        );
        assert_eq!(filter.score_min, Some(10.0));
        // Legacy name still honored when the newer one is absent
        assert_eq!(filter.score_max, Some(50.0));
    }

    #[test]
    fn malformed_values_are_ignored_not_rejected() {
        let filter = LeadFilter::from_params(
            &params(&[
                ("scoreMin", "banana"),
                ("stage", "NoSuchStage"),
                ("hasEmail", "maybe"),
                ("callCountMin", "x"),
                ("dateRange", "fortnight"),
            ]),
            now(),
        );
        assert_eq!(filter, LeadFilter::default());
    }

    #[test]
    fn explicit_bounds_beat_named_window() {
        let filter = LeadFilter::from_params(
            &params(&[("from", "2026-01-01"), ("dateRange", "today")]),
            now(),
        );
        assert_eq!(filter.created_from.as_deref(), Some("2026-01-01T00:00:00+00:00"));
        // The window is not resolved at all once explicit bounds exist
        assert!(filter.created_to.is_none());
    }

    #[test]
    fn named_window_resolves_to_bounds() {
        let filter = LeadFilter::from_params(&params(&[("dateRange", "today")]), now());
        assert!(filter.created_from.is_some());
        assert!(filter.created_to.is_some());
    }

    #[test]
    fn date_only_upper_bound_covers_whole_day() {
        let filter = LeadFilter::from_params(&params(&[("to", "2026-01-31")]), now());
        assert_eq!(filter.created_to.as_deref(), Some("2026-02-01T00:00:00+00:00"));
    }

    #[test]
    fn noactivity_sentinel_sets_null_clause() {
        let filter = LeadFilter::from_params(&params(&[("lastActivity", "noactivity")]), now());
        assert!(filter.no_activity);
        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        assert!(q.where_sql.contains("last_activity_at IS NULL"));
    }

    #[test]
    fn activity_window_resolves() {
        let filter = LeadFilter::from_params(&params(&[("lastActivity", "last3days")]), now());
        assert!(filter.activity_from.is_some());
        assert!(filter.activity_to.is_some());
        assert!(!filter.no_activity);
    }

    #[test]
    fn email_domain_gets_at_prefix_and_suffix_match() {
        let filter = LeadFilter {
            email_domain: Some("Acme.com".into()),
            ..Default::default()
        };
        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        assert_eq!(q.params[1], SqlParam::Text("%@acme.com".into()));
    }

    #[test]
    fn exclude_early_stages_lists_fixed_subset() {
        let filter = LeadFilter {
            exclude_early_stages: true,
            ..Default::default()
        };
        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        assert!(q.where_sql.contains("stage NOT IN (?2, ?3, ?4)"));
        assert_eq!(q.params.len(), 4);
    }

    #[test]
    fn call_count_range_is_not_sql() {
        let filter = LeadFilter {
            call_count_min: Some(2),
            call_count_max: Some(5),
            ..Default::default()
        };
        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        assert_eq!(q.where_sql, "tenant_id = ?1");
        assert!(filter.needs_call_count_pass());
        assert!(!filter.call_count_matches(1));
        assert!(filter.call_count_matches(2));
        assert!(filter.call_count_matches(5));
        assert!(!filter.call_count_matches(6));
    }

    #[test]
    fn placeholders_stay_aligned_across_many_clauses() {
        let filter = LeadFilter {
            text: Some("a".into()),
            stage: Some(Stage::Qualified),
            score_min: Some(1.0),
            score_max: Some(9.0),
            need_followup: Some(true),
            exclude_early_stages: true,
            email_domain: Some("@x.io".into()),
            ..Default::default()
        };
        let q = filter.compile(&TenantId::from_raw("tnt_a"));
        // Highest placeholder index must equal the parameter count
        let max_idx = (1..=q.params.len())
            .filter(|i| q.where_sql.contains(&format!("?{i}")))
            .max()
            .unwrap();
        assert_eq!(max_idx, q.params.len());
    }

    #[test]
    fn cache_key_is_order_independent() {
        let tenant = TenantId::from_raw("tnt_a");
        let now = now();
        let a = LeadFilter::from_params(
            &params(&[("q", "ada"), ("stage", "Qualified"), ("scoreMin", "5")]),
            now,
        );
        let b = LeadFilter::from_params(
            &params(&[("scoreMin", "5"), ("q", "ada"), ("stage", "Qualified")]),
            now,
        );
        assert_eq!(a.cache_key(&tenant, 50, 0), b.cache_key(&tenant, 50, 0));
    }

    #[test]
    fn cache_key_varies_by_tenant_and_page() {
        let filter = LeadFilter::default();
        let t1 = TenantId::from_raw("tnt_a");
        let t2 = TenantId::from_raw("tnt_b");
        assert_ne!(filter.cache_key(&t1, 50, 0), filter.cache_key(&t2, 50, 0));
        assert_ne!(filter.cache_key(&t1, 50, 0), filter.cache_key(&t1, 50, 50));
        assert_ne!(filter.cache_key(&t1, 50, 0), filter.cache_key(&t1, 25, 0));
    }

    #[test]
    fn cache_key_distinguishes_distinct_filters() {
        let tenant = TenantId::from_raw("tnt_a");
        let a = LeadFilter {
            has_email: Some(true),
            ..Default::default()
        };
        let b = LeadFilter {
            has_email: Some(false),
            ..Default::default()
        };
        assert_ne!(a.cache_key(&tenant, 50, 0), b.cache_key(&tenant, 50, 0));
    }

    #[test]
    fn combined_filters_intersect_single_results() {
        use leadflow_store::database::Database;
        use leadflow_store::leads::{LeadRepo, NewLead};
        use std::collections::HashSet;

        let db = Database::in_memory().unwrap();
        let tenant = TenantId::from_raw("tnt_a");
        let repo = LeadRepo::new(db);
        for (phone, email, stage, score) in [
            ("111", Some("a@acme.com"), Stage::Qualified, 10.0),
            ("222", Some("b@acme.com"), Stage::Customer, 90.0),
            ("333", None, Stage::Qualified, 90.0),
            ("444", Some("c@other.io"), Stage::Customer, 10.0),
        ] {
            repo.create(
                &tenant,
                NewLead {
                    phone: phone.into(),
                    email: email.map(str::to_string),
                    stage: Some(stage),
                    score: Some(score),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let phones = |filter: &LeadFilter| -> HashSet<String> {
            repo.search(&filter.compile(&tenant), 100, 0)
                .unwrap()
                .into_iter()
                .map(|l| l.phone)
                .collect()
        };

        let by_stage = LeadFilter {
            stage: Some(Stage::Customer),
            ..Default::default()
        };
        let by_score = LeadFilter {
            score_min: Some(50.0),
            ..Default::default()
        };
        let by_domain = LeadFilter {
            email_domain: Some("acme.com".into()),
            ..Default::default()
        };
        let combined = LeadFilter {
            stage: Some(Stage::Customer),
            score_min: Some(50.0),
            email_domain: Some("acme.com".into()),
            ..Default::default()
        };

        let expected: HashSet<String> = phones(&by_stage)
            .intersection(&phones(&by_score))
            .cloned()
            .collect::<HashSet<_>>()
            .intersection(&phones(&by_domain))
            .cloned()
            .collect();
        assert_eq!(phones(&combined), expected);
        assert_eq!(phones(&combined), HashSet::from(["222".to_string()]));
    }

    #[test]
    fn every_filter_field_reaches_a_clause() {
        let filter = LeadFilter {
            text: Some("a".into()),
            stage: Some(Stage::Junk),
            owner: Some(OwnerFilter::Agent(AgentId::from_raw("agt_1"))),
            source: Some("web".into()),
            score_min: Some(0.0),
            score_max: Some(1.0),
            created_from: Some("2026-01-01T00:00:00+00:00".into()),
            created_to: Some("2026-02-01T00:00:00+00:00".into()),
            activity_from: Some("2026-01-01T00:00:00+00:00".into()),
            activity_to: Some("2026-02-01T00:00:00+00:00".into()),
            no_activity: false,
            need_followup: Some(true),
            has_email: Some(true),
            email_domain: Some("@x.io".into()),
            exclude_early_stages: true,
            list_id: Some(ListId::from_raw("lst_1")),
            call_count_min: None,
            call_count_max: None,
            sort_by_call_count: false,
        };
        assert_eq!(filter.clauses().len(), 15);
    }
}
