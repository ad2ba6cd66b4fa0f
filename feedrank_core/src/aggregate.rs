use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::ItemId;
use crate::score::ScoredPayload;
use crate::wire::WireAggregate;

// ---------------------------------------------------------------------
// Partition keys
// ---------------------------------------------------------------------

/// Grouping key for emissions. Opaque to this crate.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        PartitionKey(key.into())
    }

    /// The single key every emission currently funnels into.
    pub fn global() -> Self {
        PartitionKey("0".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PartitionKey {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------
// Aggregate values
// ---------------------------------------------------------------------

/// Combined result for one key: item id -> latest scored payload.
///
/// Serializes in the aggregate wire shape (`{"aggregate": true, ...}`), so
/// anything persisted through serde can be fed straight back into a reduce.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireAggregate", try_from = "WireAggregate")]
pub struct AggregateResult {
    pub entries: BTreeMap<ItemId, ScoredPayload>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&ScoredPayload> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &ScoredPayload)> {
        self.entries.iter()
    }

    /// Entries by descending score, ties broken by ascending id.
    pub fn ranked(&self) -> Vec<&ScoredPayload> {
        let mut out: Vec<&ScoredPayload> = self.entries.values().collect();
        out.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        out
    }

    /// Wrap for feeding back into a later `merge`.
    pub fn into_value(self) -> AggregateValue {
        AggregateValue::Aggregate(self)
    }
}

/// Reduce input: either a raw scorer payload or an earlier reduce output.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregateValue {
    Raw(ScoredPayload),
    Aggregate(AggregateResult),
}

impl AggregateValue {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, AggregateValue::Aggregate(_))
    }
}

impl From<ScoredPayload> for AggregateValue {
    fn from(p: ScoredPayload) -> Self {
        AggregateValue::Raw(p)
    }
}

impl From<AggregateResult> for AggregateValue {
    fn from(a: AggregateResult) -> Self {
        AggregateValue::Aggregate(a)
    }
}

// ---------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------

/// Merge `values` for `key` into a fresh aggregate.
///
/// Later values win on id collision; scores are not compared. Inputs are only
/// borrowed, so a prior aggregate passed in stays untouched and the output can
/// itself be fed to another `merge` over a larger set.
pub fn merge(key: &PartitionKey, values: &[AggregateValue]) -> AggregateResult {
    let mut out = AggregateResult::new();
    let mut overwritten = 0usize;

    for v in values {
        match v {
            AggregateValue::Aggregate(agg) => {
                for (id, payload) in &agg.entries {
                    if out.entries.insert(id.clone(), payload.clone()).is_some() {
                        overwritten += 1;
                    }
                }
            }
            AggregateValue::Raw(payload) => {
                if out
                    .entries
                    .insert(payload.item_id.clone(), payload.clone())
                    .is_some()
                {
                    overwritten += 1;
                }
            }
        }
    }

    tracing::debug!(
        key = %key,
        inputs = values.len(),
        entries = out.len(),
        overwritten,
        "merged values"
    );
    out
}
