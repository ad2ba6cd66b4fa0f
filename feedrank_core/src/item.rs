use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric feature category (industry vectors, intent vectors, ...).
pub type FeatureId = i32;

/// Opaque item identifier. Ordering is only used to make output deterministic.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId(s)
    }
}

/// One classifier output attached to an item.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSignal {
    pub feature_id: FeatureId,
    pub similarity: f64,
}

impl FeatureSignal {
    pub fn new(feature_id: FeatureId, similarity: f64) -> Self {
        Self { feature_id, similarity }
    }
}

/// Scoring input. Everything besides the id and the feature list rides along
/// in `attrs` so downstream readers get the whole record back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub features: Vec<FeatureSignal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Item {
            id: id.into(),
            features: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, signal: FeatureSignal) {
        self.features.push(signal);
    }

    /// Builder-style helper, mostly for tests and fixtures.
    pub fn with_feature(mut self, feature_id: FeatureId, similarity: f64) -> Self {
        self.features.push(FeatureSignal::new(feature_id, similarity));
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }
}
