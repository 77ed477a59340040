use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MercatoError;

/// Kind of upstream request, used to scope quotas and label errors.
///
/// Every variant maps to a stable kebab-case label so quota tables in
/// configuration files stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum RequestType {
    /// Point-in-time quote for a single symbol.
    Quote,
    /// Historical bars / candles.
    History,
    /// Company fundamentals and financial statements.
    Fundamentals,
    /// News articles.
    News,
    /// Free-text symbol search.
    Search,
    /// Screener queries over many symbols.
    Screener,
    /// Reference data (exchanges, calendars, symbol metadata).
    Reference,
}

impl RequestType {
    /// All request types in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Quote,
        Self::History,
        Self::Fundamentals,
        Self::News,
        Self::Search,
        Self::Screener,
        Self::Reference,
    ];

    /// Stable, kebab-case identifier for logs/errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::History => "history",
            Self::Fundamentals => "fundamentals",
            Self::News => "news",
            Self::Search => "search",
            Self::Screener => "screener",
            Self::Reference => "reference",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = MercatoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MercatoError::InvalidArg(format!("unknown request type: {s}")))
    }
}
