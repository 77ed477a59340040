use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MercatoError;

/// Importance of a request or of a tracked symbol.
///
/// Ordering follows importance: `Critical > High > Standard > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    /// Background work that may be shed first.
    Low,
    /// Regular traffic.
    #[default]
    Standard,
    /// Visible to the user right now.
    High,
    /// Must go through whenever any provider can serve it.
    Critical,
}

impl RequestPriority {
    /// All priorities, most important first.
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Standard, Self::Low];

    /// Stable lowercase identifier for logs and serialization.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Standard => "standard",
            Self::Low => "low",
        }
    }

    /// Whether this priority may dip into the reserved share of a quota.
    #[must_use]
    pub const fn may_use_reserve(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestPriority {
    type Err = MercatoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "standard" | "normal" => Ok(Self::Standard),
            "low" => Ok(Self::Low),
            other => Err(MercatoError::InvalidArg(format!(
                "unknown request priority: {other}"
            ))),
        }
    }
}
