use serde::{Deserialize, Serialize};

use crate::item::FeatureId;

/// "Related to tech startups" vector. Always considered, whatever the target.
pub const STARTUP_FEATURE_ID: FeatureId = 20000;

/// Industry feature ids are the industry code offset into the 10xxx block.
pub const INDUSTRY_FEATURE_BASE: FeatureId = 10000;

/// Placeholder weight until a fuller model combines more inputs.
pub const DEFAULT_DAMPING: f64 = 0.75;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringCfg {
    pub target_feature_id: FeatureId,
    pub sentinel_feature_id: FeatureId,
    pub damping: f64,
}

impl Default for ScoringCfg {
    fn default() -> Self {
        Self {
            target_feature_id: 0,
            sentinel_feature_id: STARTUP_FEATURE_ID,
            damping: DEFAULT_DAMPING,
        }
    }
}

impl ScoringCfg {
    pub fn for_target(target_feature_id: FeatureId) -> Self {
        Self {
            target_feature_id,
            ..Self::default()
        }
    }

    /// Target the feature vector of a user's current industry.
    /// Unknown industries (code <= 0) leave the target at 0, so only the
    /// sentinel can match.
    pub fn for_industry(industry_code: i32) -> Self {
        Self::for_target(industry_feature_id(industry_code).unwrap_or(0))
    }

    /// Damping actually applied: non-finite values fall back to the default,
    /// everything else is clamped into [0, DEFAULT_DAMPING].
    #[inline]
    pub fn effective_damping(&self) -> f64 {
        if self.damping.is_finite() {
            self.damping.clamp(0.0, DEFAULT_DAMPING)
        } else {
            DEFAULT_DAMPING
        }
    }

    /// Replace `damping` with its effective value.
    pub fn normalized(mut self) -> Self {
        self.damping = self.effective_damping();
        self
    }

    #[inline]
    pub fn matches(&self, feature_id: FeatureId) -> bool {
        feature_id == self.target_feature_id || feature_id == self.sentinel_feature_id
    }
}

/// Map an industry code to its feature id (e.g. 4 -> 10004).
pub fn industry_feature_id(industry_code: i32) -> Option<FeatureId> {
    if industry_code <= 0 {
        return None;
    }
    INDUSTRY_FEATURE_BASE.checked_add(industry_code)
}
