use serde::{Deserialize, Serialize};

/// The distribution rules a tenant can activate. Exactly one is active
/// per tenant at a time; activating a rule only affects leads assigned
/// afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    #[serde(rename = "ROUND_ROBIN")]
    RoundRobin,
    #[serde(rename = "CONVERSION_WEIGHTED")]
    ConversionWeighted,
    #[serde(rename = "HYBRID")]
    Hybrid,
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "ROUND_ROBIN",
            Self::ConversionWeighted => "CONVERSION_WEIGHTED",
            Self::Hybrid => "HYBRID",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn all() -> &'static [RuleKind] {
        &[
            Self::RoundRobin,
            Self::ConversionWeighted,
            Self::Hybrid,
            Self::Custom,
        ]
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROUND_ROBIN" => Ok(Self::RoundRobin),
            "CONVERSION_WEIGHTED" => Ok(Self::ConversionWeighted),
            "HYBRID" => Ok(Self::Hybrid),
            "CUSTOM" => Ok(Self::Custom),
            other => Err(format!("unknown automation rule: {other}")),
        }
    }
}

/// Conversion-rate brackets an operator may restrict CONVERSION_WEIGHTED
/// to. `Default` means the whole pool; selecting several brackets unions
/// the agents in any of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionTier {
    Low,
    Medium,
    High,
    Default,
}

impl ConversionTier {
    /// Bracket membership by rate: low < 0.25, medium 0.25..0.50,
    /// high >= 0.50.
    pub fn contains(&self, rate: f64) -> bool {
        match self {
            Self::Low => rate < 0.25,
            Self::Medium => (0.25..0.50).contains(&rate),
            Self::High => rate >= 0.50,
            Self::Default => true,
        }
    }
}

/// Independent business-rule signals a CUSTOM rule may combine. Each
/// selected flag contributes its own score term per candidate agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFlag {
    LocationBased,
    TimeBased,
    SkillBased,
    LoadBalanced,
    PriorityBased,
    CampaignBased,
}

/// CUSTOM rule parameters: ad-spend percentage thresholds (the lowest
/// selected one gates deprioritization) plus the selected flags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomConfig {
    #[serde(default)]
    pub ad_spend_thresholds: Vec<f64>,
    #[serde(default)]
    pub flags: Vec<CustomFlag>,
}

impl CustomConfig {
    /// The lowest selected threshold, if any.
    pub fn gating_threshold(&self) -> Option<f64> {
        self.ad_spend_thresholds
            .iter()
            .copied()
            .fold(None, |acc, t| match acc {
                Some(min) if min <= t => Some(min),
                _ => Some(t),
            })
    }
}

/// The per-tenant singleton automation configuration: the active rule and
/// its parameter bag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub rule: RuleKind,
    #[serde(default)]
    pub conversion_tiers: Vec<ConversionTier>,
    #[serde(default)]
    pub custom: CustomConfig,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            rule: RuleKind::RoundRobin,
            conversion_tiers: Vec::new(),
            custom: CustomConfig::default(),
        }
    }
}
