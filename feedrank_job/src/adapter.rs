//! Record adapter layer: turn stored records into `feedrank_core::Item`s.
//!
//! Small and policy-light:
//! - No IO
//! - No scoring rules
//!
//! Callers provide an `ItemDecoder` (or use `JsonItemDecoder`) to map whatever
//! the store hands back into scoring input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use feedrank_core::{FeatureId, FeatureSignal, InputShapeError, Item, ItemId};

/// Trait: map one stored record into one `Item`.
pub trait ItemDecoder: Sync {
    fn decode(&self, record: &Value) -> Result<Item, InputShapeError>;
}

/// Field names `JsonItemDecoder` reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldKeys {
    pub id: String,
    pub features: String,
    pub feature_id: String,
    pub similarity: String,
}

impl Default for FieldKeys {
    fn default() -> Self {
        Self {
            id: "_id".to_string(),
            features: "feature".to_string(),
            feature_id: "feature_id".to_string(),
            similarity: "similarity".to_string(),
        }
    }
}

/// Decoder for document-store style JSON records.
///
/// - id: string, integer, or `{"$oid": "..."}`
/// - a missing feature list is an empty one; a non-array one is an error
/// - every other top-level field is kept in `Item::attrs`
#[derive(Clone, Debug, Default)]
pub struct JsonItemDecoder {
    pub keys: FieldKeys,
}

impl JsonItemDecoder {
    pub fn new(keys: FieldKeys) -> Self {
        Self { keys }
    }

    fn decode_id(&self, v: Option<&Value>) -> Result<ItemId, InputShapeError> {
        let missing = || InputShapeError::MissingId(self.keys.id.clone());
        match v {
            Some(Value::String(s)) if !s.is_empty() => Ok(ItemId::new(s.as_str())),
            Some(Value::Number(n)) => Ok(ItemId::new(n.to_string())),
            Some(Value::Object(o)) => match o.get("$oid") {
                Some(Value::String(s)) if !s.is_empty() => Ok(ItemId::new(s.as_str())),
                _ => Err(missing()),
            },
            _ => Err(missing()),
        }
    }

    fn decode_signal(&self, index: usize, v: &Value) -> Result<FeatureSignal, InputShapeError> {
        let obj = v
            .as_object()
            .ok_or_else(|| InputShapeError::bad_signal(index, "not an object"))?;

        let feature_id = obj
            .get(&self.keys.feature_id)
            .and_then(integral)
            .and_then(|n| FeatureId::try_from(n).ok())
            .ok_or_else(|| {
                InputShapeError::bad_signal(index, format!("`{}` is not an integer", self.keys.feature_id))
            })?;

        let similarity = obj
            .get(&self.keys.similarity)
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                InputShapeError::bad_signal(index, format!("`{}` is not a number", self.keys.similarity))
            })?;

        Ok(FeatureSignal::new(feature_id, similarity))
    }
}

/// Integer value of `v`, accepting integral floats (`55.0`) as stores often
/// write numbers that way.
fn integral(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    let f = v.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl ItemDecoder for JsonItemDecoder {
    fn decode(&self, record: &Value) -> Result<Item, InputShapeError> {
        let obj = record.as_object().ok_or(InputShapeError::NotAnObject)?;
        let id = self.decode_id(obj.get(&self.keys.id))?;

        let features = match obj.get(&self.keys.features) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(list)) => list
                .iter()
                .enumerate()
                .map(|(i, v)| self.decode_signal(i, v))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(InputShapeError::FeaturesNotSequence(self.keys.features.clone())),
        };

        let attrs: BTreeMap<String, Value> = obj
            .iter()
            .filter(|(k, _)| **k != self.keys.id && **k != self.keys.features)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Item { id, features, attrs })
    }
}

/// A record that failed decoding, with its position in the input batch.
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedRecord {
    pub index: usize,
    pub error: InputShapeError,
}

/// Helper: decode a batch, splitting good items from rejects.
///
/// This is intentionally dumb; parallelism is handled by the job.
pub fn decode_batch<D: ItemDecoder>(decoder: &D, records: &[Value]) -> (Vec<(usize, Item)>, Vec<RejectedRecord>) {
    let mut items = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for (index, rec) in records.iter().enumerate() {
        match decoder.decode(rec) {
            Ok(item) => items.push((index, item)),
            Err(error) => rejected.push(RejectedRecord { index, error }),
        }
    }
    (items, rejected)
}
