//! Model version lifecycle stages

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Registry lifecycle stage of a model version.
///
/// Parsing is case-insensitive (`"production"`, `"PRODUCTION"` and
/// `"Production"` are the same stage); display and serialization use the
/// registry's canonical capitalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Stage {
    /// No stage assigned (registry default).
    #[default]
    None,
    /// Candidate for production.
    Staging,
    /// Serving production traffic.
    Production,
    /// Retired.
    Archived,
}

impl Stage {
    /// All stages in registry order.
    pub const ALL: [Self; 4] = [Self::None, Self::Staging, Self::Production, Self::Archived];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Archived => "Archived",
        }
    }

    /// Whether a version in this stage needs an explicit transition after
    /// creation (new versions always start in `None`).
    #[must_use]
    pub const fn needs_transition(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| Error::InvalidStage(s.to_string()))
    }
}

impl TryFrom<String> for Stage {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        stage.as_str().to_string()
    }
}
