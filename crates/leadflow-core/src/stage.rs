use serde::{Deserialize, Serialize};

/// Pipeline position of a lead. The string forms are wire and column
/// values, so Display/FromStr use the human labels verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Not contacted")]
    NotContacted,
    #[serde(rename = "Attempt to contact")]
    AttemptToContact,
    #[serde(rename = "Did not Connect")]
    DidNotConnect,
    #[serde(rename = "Qualified")]
    Qualified,
    #[serde(rename = "Interested")]
    Interested,
    #[serde(rename = "To be nurtured")]
    ToBeNurtured,
    #[serde(rename = "Ask to call back")]
    AskToCallBack,
    #[serde(rename = "Not interested")]
    NotInterested,
    #[serde(rename = "Junk")]
    Junk,
    #[serde(rename = "Customer")]
    Customer,
    #[serde(rename = "Other Language")]
    OtherLanguage,
}

impl Stage {
    /// Stages considered not yet productive; the exclude-early-stages
    /// filter removes leads sitting in any of these.
    pub const EARLY: [Stage; 3] = [
        Stage::AttemptToContact,
        Stage::DidNotConnect,
        Stage::NotContacted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotContacted => "Not contacted",
            Self::AttemptToContact => "Attempt to contact",
            Self::DidNotConnect => "Did not Connect",
            Self::Qualified => "Qualified",
            Self::Interested => "Interested",
            Self::ToBeNurtured => "To be nurtured",
            Self::AskToCallBack => "Ask to call back",
            Self::NotInterested => "Not interested",
            Self::Junk => "Junk",
            Self::Customer => "Customer",
            Self::OtherLanguage => "Other Language",
        }
    }

    pub fn all() -> &'static [Stage] {
        &[
            Self::NotContacted,
            Self::AttemptToContact,
            Self::DidNotConnect,
            Self::Qualified,
            Self::Interested,
            Self::ToBeNurtured,
            Self::AskToCallBack,
            Self::NotInterested,
            Self::Junk,
            Self::Customer,
            Self::OtherLanguage,
        ]
    }

    pub fn is_early(&self) -> bool {
        Self::EARLY.contains(self)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::NotContacted
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::all()
            .iter()
            .find(|st| st.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_from_str_roundtrip() {
        for stage in Stage::all() {
            let parsed: Stage = stage.as_str().parse().unwrap();
            assert_eq!(parsed, *stage);
        }
    }

    #[test]
    fn unknown_stage_rejected() {
        assert!("Warm".parse::<Stage>().is_err());
    }

    #[test]
    fn early_subset_is_fixed() {
        assert!(Stage::NotContacted.is_early());
        assert!(Stage::AttemptToContact.is_early());
        assert!(Stage::DidNotConnect.is_early());
        assert!(!Stage::Qualified.is_early());
        assert!(!Stage::Customer.is_early());
    }

    #[test]
    fn serde_uses_human_labels() {
        let json = serde_json::to_string(&Stage::DidNotConnect).unwrap();
        assert_eq!(json, "\"Did not Connect\"");
        let parsed: Stage = serde_json::from_str("\"Ask to call back\"").unwrap();
        assert_eq!(parsed, Stage::AskToCallBack);
    }

    #[test]
    fn default_is_not_contacted() {
        assert_eq!(Stage::default(), Stage::NotContacted);
    }
}
