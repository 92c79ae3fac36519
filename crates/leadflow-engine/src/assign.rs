use rand::Rng;
use tracing::{debug, instrument};

use leadflow_core::automation::{AutomationSettings, ConversionTier, CustomFlag, RuleKind};
use leadflow_core::ids::{AgentId, TenantId};
use leadflow_store::agents::{AgentProfile, AgentRepo};
use leadflow_store::automations::AutomationRepo;
use leadflow_store::cursors::CursorRepo;
use leadflow_store::database::Database;

use crate::error::EngineError;

/// Share of HYBRID selections routed through the weighted branch.
const HYBRID_WEIGHTED_SHARE: f64 = 0.7;

/// Outcome of an owner selection. Deferred means no eligible agent
/// existed at selection time; the lead stays unowned and the caller
/// records the deferral.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Assigned(AgentId),
    Deferred,
}

/// Picks an owner for a new lead according to the tenant's active rule.
/// Every selection reads the pool and settings fresh; rotation state
/// lives in the durable per-tenant cursor, never in process memory.
pub struct AssignmentEngine {
    agents: AgentRepo,
    automations: AutomationRepo,
    cursors: CursorRepo,
}

impl AssignmentEngine {
    pub fn new(db: Database) -> Self {
        Self {
            agents: AgentRepo::new(db.clone()),
            automations: AutomationRepo::new(db.clone()),
            cursors: CursorRepo::new(db),
        }
    }

    #[instrument(skip(self, rng), fields(tenant_id = %tenant_id))]
    pub fn select_owner<R: Rng>(
        &self,
        tenant_id: &TenantId,
        rng: &mut R,
    ) -> Result<Selection, EngineError> {
        let pool = self.agents.profiles(tenant_id)?;
        if pool.is_empty() {
            debug!("no eligible agents, deferring assignment");
            return Ok(Selection::Deferred);
        }

        let settings = self.automations.load(tenant_id)?;
        let id = match settings.rule {
            RuleKind::RoundRobin => self.round_robin(tenant_id, &pool)?,
            RuleKind::ConversionWeighted => self.weighted(&settings, &pool, rng),
            RuleKind::Hybrid => {
                if rng.gen::<f64>() < HYBRID_WEIGHTED_SHARE {
                    self.weighted(&settings, &pool, rng)
                } else {
                    self.round_robin(tenant_id, &pool)?
                }
            }
            RuleKind::Custom => self.custom(tenant_id, &settings, &pool)?,
        };
        Ok(Selection::Assigned(id))
    }

    /// Strict rotation over the pool in its stable order, indexed by the
    /// durable cursor.
    fn round_robin(
        &self,
        tenant_id: &TenantId,
        pool: &[AgentProfile],
    ) -> Result<AgentId, EngineError> {
        let position = self.cursors.advance(tenant_id)?;
        let index = (position % pool.len() as u64) as usize;
        Ok(pool[index].id.clone())
    }

    /// One random draw proportional to effective conversion rates, over
    /// the tier-restricted candidate set.
    fn weighted<R: Rng>(
        &self,
        settings: &AutomationSettings,
        pool: &[AgentProfile],
        rng: &mut R,
    ) -> AgentId {
        let candidates = tier_candidates(&settings.conversion_tiers, pool);
        let weights = effective_rates(&candidates);
        let index = weighted_index(&weights, rng.gen::<f64>());
        candidates[index].id.clone()
    }

    /// Score every candidate from the selected business-rule flags, push
    /// agents over the ad-spend gate to the back, pick the best score and
    /// break ties with the cursor so repeated ties still rotate.
    fn custom(
        &self,
        tenant_id: &TenantId,
        settings: &AutomationSettings,
        pool: &[AgentProfile],
    ) -> Result<AgentId, EngineError> {
        let gate = settings.custom.gating_threshold();
        let preferred: Vec<&AgentProfile> = pool
            .iter()
            .filter(|p| gate.is_none_or(|t| p.ad_spend_pct <= t))
            .collect();

        // Every agent over the gate: soft deprioritization has nothing
        // left to prefer, fall back to plain rotation.
        if preferred.is_empty() {
            debug!("all agents over ad-spend gate, falling back to rotation");
            return self.round_robin(tenant_id, pool);
        }

        let mean = pool_mean(pool);
        let scores: Vec<f64> = preferred
            .iter()
            .map(|p| custom_score(&settings.custom.flags, p, mean))
            .collect();
        let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<&AgentProfile> = preferred
            .iter()
            .zip(&scores)
            .filter(|(_, s)| (*s - best).abs() < f64::EPSILON)
            .map(|(p, _)| *p)
            .collect();

        if tied.len() == 1 {
            return Ok(tied[0].id.clone());
        }
        let position = self.cursors.advance(tenant_id)?;
        let index = (position % tied.len() as u64) as usize;
        Ok(tied[index].id.clone())
    }
}

/// Agents whose conversion rate falls in any selected bracket. Agents
/// with no history use the pool mean for bracket membership too. An
/// empty selection, the `default` bracket, or a selection matching
/// nobody all widen back to the full pool.
fn tier_candidates<'a>(
    tiers: &[ConversionTier],
    pool: &'a [AgentProfile],
) -> Vec<&'a AgentProfile> {
    if tiers.is_empty() || tiers.contains(&ConversionTier::Default) {
        return pool.iter().collect();
    }
    let mean = pool_mean(pool);
    let matched: Vec<&AgentProfile> = pool
        .iter()
        .filter(|p| {
            let rate = p.conversion_rate.unwrap_or(mean);
            tiers.iter().any(|t| t.contains(rate))
        })
        .collect();
    if matched.is_empty() {
        pool.iter().collect()
    } else {
        matched
    }
}

/// Mean conversion rate over agents that have history. Zero when nobody
/// has history yet.
fn pool_mean(pool: &[AgentProfile]) -> f64 {
    let rates: Vec<f64> = pool.iter().filter_map(|p| p.conversion_rate).collect();
    if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    }
}

/// Per-candidate weights: the agent's rolling conversion rate, or the
/// pool mean for agents with no history so newcomers are not starved.
fn effective_rates(candidates: &[&AgentProfile]) -> Vec<f64> {
    let rates: Vec<f64> = candidates.iter().filter_map(|p| p.conversion_rate).collect();
    let mean = if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    };
    candidates
        .iter()
        .map(|p| p.conversion_rate.unwrap_or(mean))
        .collect()
}

/// Map one uniform roll in [0, 1) onto the cumulative weight array. A
/// degenerate all-zero weight vector degrades to a uniform pick.
fn weighted_index(weights: &[f64], roll: f64) -> usize {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return ((roll * weights.len() as f64) as usize).min(weights.len() - 1);
    }
    let target = roll * total;
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if target < cumulative {
            return i;
        }
    }
    weights.len() - 1
}

/// Sum of the score terms the selected flags contribute for one agent.
/// No flags means every agent scores zero and the cursor decides.
fn custom_score(flags: &[CustomFlag], profile: &AgentProfile, pool_mean: f64) -> f64 {
    flags
        .iter()
        .map(|flag| match flag {
            CustomFlag::SkillBased => profile.conversion_rate.unwrap_or(pool_mean),
            CustomFlag::LoadBalanced => 1.0 / (1.0 + profile.open_leads as f64),
            CustomFlag::PriorityBased => 1.0 / (1.0 + profile.assigned_total as f64),
            CustomFlag::CampaignBased => 1.0 - profile.ad_spend_pct.min(100.0) / 100.0,
            // No location or schedule signal at this boundary; the flag
            // contributes a neutral constant.
            CustomFlag::LocationBased | CustomFlag::TimeBased => 0.5,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::automation::CustomConfig;
    use leadflow_core::Stage;
    use leadflow_store::leads::{LeadRepo, NewLead};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn setup() -> (Database, TenantId, AssignmentEngine) {
        let db = Database::in_memory().unwrap();
        let engine = AssignmentEngine::new(db.clone());
        (db, TenantId::from_raw("tnt_test"), engine)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn agent(db: &Database, tenant: &TenantId, code: &str) -> AgentId {
        AgentRepo::new(db.clone())
            .create(tenant, code, code, "sales")
            .unwrap()
            .id
    }

    fn history(db: &Database, tenant: &TenantId, owner: &AgentId, total: u32, converted: u32) {
        let repo = LeadRepo::new(db.clone());
        for i in 0..total {
            let stage = if i < converted {
                Stage::Customer
            } else {
                Stage::Qualified
            };
            repo.create(
                tenant,
                NewLead {
                    phone: format!("{}-{}", owner.as_str(), i),
                    stage: Some(stage),
                    owner_id: Some(owner.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        }
    }

    fn activate(db: &Database, tenant: &TenantId, settings: AutomationSettings) {
        AutomationRepo::new(db.clone()).save(tenant, &settings).unwrap();
    }

    fn profile(id: &str, rate: Option<f64>) -> AgentProfile {
        AgentProfile {
            id: AgentId::from_raw(id),
            conversion_rate: rate,
            assigned_total: 0,
            open_leads: 0,
            ad_spend_pct: 0.0,
        }
    }

    #[test]
    fn empty_pool_defers() {
        let (_, tenant, engine) = setup();
        let selection = engine.select_owner(&tenant, &mut rng()).unwrap();
        assert_eq!(selection, Selection::Deferred);
    }

    #[test]
    fn round_robin_cycles_in_code_order() {
        let (db, tenant, engine) = setup();
        let a = agent(&db, &tenant, "a01");
        let b = agent(&db, &tenant, "a02");
        let c = agent(&db, &tenant, "a03");

        let mut r = rng();
        let picks: Vec<Selection> = (0..6)
            .map(|_| engine.select_owner(&tenant, &mut r).unwrap())
            .collect();
        let expected: Vec<Selection> = [&a, &b, &c, &a, &b, &c]
            .iter()
            .map(|id| Selection::Assigned((*id).clone()))
            .collect();
        assert_eq!(picks, expected);
    }

    #[test]
    fn round_robin_survives_pool_shrink() {
        let (db, tenant, engine) = setup();
        let repo = AgentRepo::new(db.clone());
        let a = agent(&db, &tenant, "a01");
        let b = agent(&db, &tenant, "a02");
        let c = agent(&db, &tenant, "a03");

        let mut r = rng();
        engine.select_owner(&tenant, &mut r).unwrap(); // a
        engine.select_owner(&tenant, &mut r).unwrap(); // b
        repo.set_active(&c, false).unwrap();

        // Position 2 now lands on a pool of two
        let next = engine.select_owner(&tenant, &mut r).unwrap();
        assert_eq!(next, Selection::Assigned(a.clone()));
        let _ = (a, b);
    }

    #[test]
    fn weighted_index_is_proportional() {
        let weights = vec![1.0, 3.0];
        assert_eq!(weighted_index(&weights, 0.0), 0);
        assert_eq!(weighted_index(&weights, 0.24), 0);
        assert_eq!(weighted_index(&weights, 0.25), 1);
        assert_eq!(weighted_index(&weights, 0.999), 1);
    }

    #[test]
    fn weighted_index_all_zero_is_uniform() {
        let weights = vec![0.0, 0.0, 0.0];
        assert_eq!(weighted_index(&weights, 0.0), 0);
        assert_eq!(weighted_index(&weights, 0.5), 1);
        assert_eq!(weighted_index(&weights, 0.99), 2);
    }

    #[test]
    fn effective_rates_substitute_pool_mean() {
        let pool = [profile("agt_a", Some(0.4)), profile("agt_b", None)];
        let candidates: Vec<&AgentProfile> = pool.iter().collect();
        assert_eq!(effective_rates(&candidates), vec![0.4, 0.4]);
    }

    #[test]
    fn tier_selection_restricts_candidates() {
        let pool = [
            profile("agt_low", Some(0.1)),
            profile("agt_mid", Some(0.3)),
            profile("agt_high", Some(0.7)),
        ];
        let candidates = tier_candidates(&[ConversionTier::High], &pool);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id.as_str(), "agt_high");

        let union = tier_candidates(&[ConversionTier::Low, ConversionTier::High], &pool);
        assert_eq!(union.len(), 2);
    }

    #[test]
    fn empty_tier_match_widens_to_full_pool() {
        let pool = [profile("agt_a", Some(0.1)), profile("agt_b", Some(0.2))];
        let candidates = tier_candidates(&[ConversionTier::High], &pool);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn default_tier_means_whole_pool() {
        let pool = [profile("agt_a", Some(0.1)), profile("agt_b", Some(0.9))];
        let candidates = tier_candidates(&[ConversionTier::Default, ConversionTier::High], &pool);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn conversion_weighted_favors_high_converters() {
        let (db, tenant, engine) = setup();
        let strong = agent(&db, &tenant, "a01");
        let weak = agent(&db, &tenant, "a02");
        history(&db, &tenant, &strong, 10, 8);
        history(&db, &tenant, &weak, 10, 1);
        activate(
            &db,
            &tenant,
            AutomationSettings {
                rule: RuleKind::ConversionWeighted,
                ..Default::default()
            },
        );

        let mut r = rng();
        let mut tally: HashMap<AgentId, u32> = HashMap::new();
        for _ in 0..500 {
            if let Selection::Assigned(id) = engine.select_owner(&tenant, &mut r).unwrap() {
                *tally.entry(id).or_default() += 1;
            }
        }
        let strong_picks = tally.get(&strong).copied().unwrap_or(0);
        let weak_picks = tally.get(&weak).copied().unwrap_or(0);
        // 0.8 vs 0.1 weights: roughly 8:1, allow slack
        assert!(strong_picks > weak_picks * 4, "{strong_picks} vs {weak_picks}");
        assert!(weak_picks > 0, "weighted draw must not starve anyone");
    }

    #[test]
    fn newcomer_gets_pool_mean_share() {
        let (db, tenant, engine) = setup();
        let veteran = agent(&db, &tenant, "a01");
        let newcomer = agent(&db, &tenant, "a02");
        history(&db, &tenant, &veteran, 10, 5);
        activate(
            &db,
            &tenant,
            AutomationSettings {
                rule: RuleKind::ConversionWeighted,
                ..Default::default()
            },
        );

        let mut r = rng();
        let mut newcomer_picks = 0;
        for _ in 0..400 {
            if engine.select_owner(&tenant, &mut r).unwrap() == Selection::Assigned(newcomer.clone())
            {
                newcomer_picks += 1;
            }
        }
        // Equal effective weights: expect roughly half
        assert!((120..=280).contains(&newcomer_picks), "{newcomer_picks}");
        let _ = veteran;
    }

    #[test]
    fn hybrid_mixes_both_branches() {
        let (db, tenant, engine) = setup();
        let strong = agent(&db, &tenant, "a01");
        let weak = agent(&db, &tenant, "a02");
        history(&db, &tenant, &strong, 10, 9);
        history(&db, &tenant, &weak, 10, 0);
        activate(
            &db,
            &tenant,
            AutomationSettings {
                rule: RuleKind::Hybrid,
                ..Default::default()
            },
        );

        let mut r = rng();
        let mut weak_picks = 0;
        for _ in 0..600 {
            if engine.select_owner(&tenant, &mut r).unwrap() == Selection::Assigned(weak.clone()) {
                weak_picks += 1;
            }
        }
        // Weighted alone would starve the zero-rate agent entirely; the
        // rotation branch runs ~30% of the time and alternates over two
        // agents, so the weak agent still lands near 15% of picks.
        assert!((50..=140).contains(&weak_picks), "{weak_picks}");
    }

    #[test]
    fn custom_load_balanced_prefers_idle_agent() {
        let (db, tenant, engine) = setup();
        let busy = agent(&db, &tenant, "a01");
        let idle = agent(&db, &tenant, "a02");
        history(&db, &tenant, &busy, 5, 0); // 5 open leads
        activate(
            &db,
            &tenant,
            AutomationSettings {
                rule: RuleKind::Custom,
                custom: CustomConfig {
                    flags: vec![CustomFlag::LoadBalanced],
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        let selection = engine.select_owner(&tenant, &mut rng()).unwrap();
        assert_eq!(selection, Selection::Assigned(idle));
        let _ = busy;
    }

    #[test]
    fn custom_ad_spend_gate_deprioritizes() {
        let (db, tenant, engine) = setup();
        let repo = AgentRepo::new(db.clone());
        let spender = agent(&db, &tenant, "a01");
        let organic = agent(&db, &tenant, "a02");
        repo.set_ad_attribution(&spender, 5_000, 10_000).unwrap(); // 50%
        activate(
            &db,
            &tenant,
            AutomationSettings {
                rule: RuleKind::Custom,
                custom: CustomConfig {
                    ad_spend_thresholds: vec![30.0],
                    flags: vec![CustomFlag::SkillBased],
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        // Even with identical scores the gated agent never wins
        for _ in 0..5 {
            let selection = engine.select_owner(&tenant, &mut rng()).unwrap();
            assert_eq!(selection, Selection::Assigned(organic.clone()));
        }
        let _ = spender;
    }

    #[test]
    fn custom_all_gated_falls_back_to_rotation() {
        let (db, tenant, engine) = setup();
        let repo = AgentRepo::new(db.clone());
        let a = agent(&db, &tenant, "a01");
        let b = agent(&db, &tenant, "a02");
        repo.set_ad_attribution(&a, 9_000, 10_000).unwrap();
        repo.set_ad_attribution(&b, 8_000, 10_000).unwrap();
        activate(
            &db,
            &tenant,
            AutomationSettings {
                rule: RuleKind::Custom,
                custom: CustomConfig {
                    ad_spend_thresholds: vec![30.0],
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        let mut r = rng();
        let first = engine.select_owner(&tenant, &mut r).unwrap();
        let second = engine.select_owner(&tenant, &mut r).unwrap();
        assert_eq!(first, Selection::Assigned(a));
        assert_eq!(second, Selection::Assigned(b));
    }

    #[test]
    fn custom_ties_rotate_via_cursor() {
        let (db, tenant, engine) = setup();
        let a = agent(&db, &tenant, "a01");
        let b = agent(&db, &tenant, "a02");
        // No flags selected: every score is zero, all tied
        activate(
            &db,
            &tenant,
            AutomationSettings {
                rule: RuleKind::Custom,
                ..Default::default()
            },
        );

        let mut r = rng();
        let picks: Vec<Selection> = (0..4)
            .map(|_| engine.select_owner(&tenant, &mut r).unwrap())
            .collect();
        let expected: Vec<Selection> = [&a, &b, &a, &b]
            .iter()
            .map(|id| Selection::Assigned((*id).clone()))
            .collect();
        assert_eq!(picks, expected);
    }

    #[test]
    fn custom_score_terms() {
        let p = AgentProfile {
            id: AgentId::from_raw("agt_x"),
            conversion_rate: Some(0.4),
            assigned_total: 9,
            open_leads: 4,
            ad_spend_pct: 25.0,
        };
        assert_eq!(custom_score(&[CustomFlag::SkillBased], &p, 0.0), 0.4);
        assert_eq!(custom_score(&[CustomFlag::LoadBalanced], &p, 0.0), 0.2);
        assert_eq!(custom_score(&[CustomFlag::PriorityBased], &p, 0.0), 0.1);
        assert_eq!(custom_score(&[CustomFlag::CampaignBased], &p, 0.0), 0.75);
        assert_eq!(custom_score(&[CustomFlag::LocationBased], &p, 0.0), 0.5);
        // Flags sum
        assert_eq!(
            custom_score(&[CustomFlag::SkillBased, CustomFlag::LoadBalanced], &p, 0.0),
            0.6
        );
    }

    #[test]
    fn activation_does_not_touch_existing_owners() {
        let (db, tenant, engine) = setup();
        let a = agent(&db, &tenant, "a01");
        let lead_repo = LeadRepo::new(db.clone());
        lead_repo
            .create(
                &tenant,
                NewLead {
                    phone: "111".into(),
                    owner_id: Some(a.clone()),
                    ..Default::default()
                },
            )
            .unwrap();

        activate(
            &db,
            &tenant,
            AutomationSettings {
                rule: RuleKind::ConversionWeighted,
                ..Default::default()
            },
        );
        engine.select_owner(&tenant, &mut rng()).unwrap();

        assert_eq!(lead_repo.get(&tenant, "111").unwrap().owner_id, Some(a));
    }
}
