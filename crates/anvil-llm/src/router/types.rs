//! Core types for model routing

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Complexity
// ============================================================================

/// Declared difficulty of a subtask, as assigned by the planner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Mechanical work a small local model handles well
    Simple,
    /// Ordinary generation work
    #[default]
    Medium,
    /// Work that benefits from the strongest available model
    Complex,
}

impl Complexity {
    /// Tier this complexity asks for when every backend is available
    #[must_use]
    pub fn recommended_tier(&self) -> ModelTier {
        match self {
            Self::Simple => ModelTier::Local,
            Self::Medium => ModelTier::Standard,
            Self::Complex => ModelTier::Premium,
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Model Tier
// ============================================================================

/// Model tier for cost/quality trade-offs
///
/// Tiers are ordered by cost (ascending): `Local` runs on the host, the other
/// two are served by the remote backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Local model, no per-token cost
    Local,
    /// Balanced remote model
    Standard,
    /// Strongest remote model
    Premium,
}

impl ModelTier {
    /// Whether this tier is served by the remote backend
    #[must_use]
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Local)
    }

    /// Estimated cost multiplier relative to the standard tier
    #[must_use]
    pub fn cost_multiplier(&self) -> f32 {
        match self {
            ModelTier::Local => 0.0,
            ModelTier::Standard => 1.0,
            ModelTier::Premium => 15.0,
        }
    }
}
