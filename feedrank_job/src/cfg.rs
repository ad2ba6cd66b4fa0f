use serde::{Deserialize, Serialize};

use feedrank_core::{PartitionKey, ScoringCfg};

use crate::adapter::FieldKeys;
use crate::error::JobResult;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobCfg {
    pub scoring: ScoringCfg,
    pub partition: PartitionKey,
    /// Independent reduce lanes per key. Values are routed by item id.
    pub shards: usize,
    /// Max values a single `merge` call sees before its output is folded
    /// into the next wave.
    pub wave_size: usize,
    pub fields: FieldKeys,
}

impl Default for JobCfg {
    fn default() -> Self {
        Self {
            scoring: ScoringCfg::default(),
            partition: PartitionKey::global(),
            shards: 1,
            wave_size: 1000,
            fields: FieldKeys::default(),
        }
    }
}

impl JobCfg {
    /// Parse from TOML. Missing fields fall back to defaults.
    ///
    /// ```toml
    /// shards = 4
    /// wave_size = 256
    ///
    /// [scoring]
    /// target_feature_id = 10004
    /// ```
    pub fn from_toml_str(s: &str) -> JobResult<Self> {
        let cfg: JobCfg = toml::from_str(s)?;
        Ok(cfg.normalized())
    }

    /// Clamp lane counts to at least one and damping into its valid range.
    pub fn normalized(mut self) -> Self {
        self.scoring = self.scoring.normalized();
        self.shards = self.shards.max(1);
        self.wave_size = self.wave_size.max(1);
        self
    }
}
