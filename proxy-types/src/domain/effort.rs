use serde::{Deserialize, Serialize};

/// Reasoning-effort tier attached to an upstream Dialect-R request.
///
/// Total order: `Minimal < Low < Medium < High`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    /// Saturating increment: bumps the tier by `steps`, clamping at `High`.
    pub fn bump(self, steps: u8) -> Self {
        let idx = self as u8;
        let new_idx = idx.saturating_add(steps).min(ReasoningEffort::High as u8);
        Self::from_index(new_idx)
    }

    fn from_index(idx: u8) -> Self {
        match idx {
            0 => ReasoningEffort::Minimal,
            1 => ReasoningEffort::Low,
            2 => ReasoningEffort::Medium,
            _ => ReasoningEffort::High,
        }
    }
}

impl std::str::FromStr for ReasoningEffort {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(ReasoningEffort::Minimal),
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            _ => Err(()),
        }
    }
}

/// Coarse complexity classification for a conversation, used to pick the base
/// reasoning-effort tier before signal-based adjustments are layered on.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}
