//! Fetch strategy taxonomy.

use serde::{Deserialize, Serialize};

/// The three fetch strategies, ordered from cheapest to heaviest.
///
/// `Light` is a plain HTTP client, `Stealth` adds browser-grade evasion,
/// `Ultra` is the full anti-bot arsenal. The derive order matters: the
/// escalation runner relies on `Light < Stealth < Ultra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Light,
    Stealth,
    Ultra,
}

impl Strategy {
    /// All strategies in escalation order.
    pub const ESCALATION_ORDER: [Strategy; 3] = [Strategy::Light, Strategy::Stealth, Strategy::Ultra];

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Light => "light",
            Strategy::Stealth => "stealth",
            Strategy::Ultra => "ultra",
        }
    }

    /// Whether this strategy drives a real browser (counts toward
    /// browser-minute cost ceilings).
    pub fn uses_browser(&self) -> bool {
        matches!(self, Strategy::Stealth | Strategy::Ultra)
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Strategy::Light),
            "stealth" => Ok(Strategy::Stealth),
            "ultra" => Ok(Strategy::Ultra),
            _ => Err(format!(
                "Invalid strategy: {}. Must be one of: light, stealth, ultra",
                s
            )),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
