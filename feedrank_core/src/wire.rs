//! JSON shapes exchanged with a batch host.
//!
//! Raw payload:  `{"object": {"item": {...}, "item_id": "...", "score": 0.5}}`
//! Aggregate:    `{"aggregate": true, "entries": {"<id>": {...payload...}}}`
//!
//! The `aggregate` flag is what tells the two apart; a value carrying
//! neither an `object` nor `aggregate: true` is rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::aggregate::{merge, AggregateResult, AggregateValue, PartitionKey};
use crate::error::MalformedValueError;
use crate::item::ItemId;
use crate::score::ScoredPayload;

pub const RAW_FIELD: &str = "object";
pub const MARKER_FIELD: &str = "aggregate";
pub const ENTRIES_FIELD: &str = "entries";

/// Serde form of `AggregateResult`. Field names match `MARKER_FIELD` and
/// `ENTRIES_FIELD`.
#[derive(Serialize, Deserialize)]
pub struct WireAggregate {
    aggregate: bool,
    entries: BTreeMap<String, ScoredPayload>,
}

impl From<AggregateResult> for WireAggregate {
    fn from(agg: AggregateResult) -> Self {
        WireAggregate {
            aggregate: true,
            entries: agg.entries.into_iter().map(|(id, p)| (id.0, p)).collect(),
        }
    }
}

impl TryFrom<WireAggregate> for AggregateResult {
    type Error = String;

    fn try_from(w: WireAggregate) -> Result<Self, Self::Error> {
        if !w.aggregate {
            return Err(format!("`{MARKER_FIELD}` marker is not set"));
        }
        let mut out = AggregateResult::new();
        for (id, p) in w.entries {
            check_payload(&p).map_err(|e| format!("entry `{id}`: {e}"))?;
            if p.item_id.as_str() != id {
                return Err(format!("entry `{id}` holds payload for `{}`", p.item_id));
            }
            out.entries.insert(ItemId(id), p);
        }
        Ok(out)
    }
}

pub fn encode_payload(payload: &ScoredPayload) -> Value {
    json!({ RAW_FIELD: payload })
}

pub fn encode_aggregate(agg: &AggregateResult) -> Value {
    json!({ MARKER_FIELD: true, ENTRIES_FIELD: agg.entries })
}

pub fn encode_value(v: &AggregateValue) -> Value {
    match v {
        AggregateValue::Raw(p) => encode_payload(p),
        AggregateValue::Aggregate(a) => encode_aggregate(a),
    }
}

fn check_payload(p: &ScoredPayload) -> Result<(), String> {
    if p.item.id != p.item_id {
        return Err(format!(
            "item_id `{}` does not match item id `{}`",
            p.item_id, p.item.id
        ));
    }
    if !p.score.is_finite() {
        return Err(format!("score for `{}` is not finite", p.item_id));
    }
    Ok(())
}

fn decode_payload(v: &Value) -> Result<ScoredPayload, String> {
    let p: ScoredPayload = serde_json::from_value(v.clone()).map_err(|e| e.to_string())?;
    check_payload(&p)?;
    Ok(p)
}

fn decode_shape(v: &Value) -> Result<AggregateValue, String> {
    let obj = v.as_object().ok_or_else(|| "value is not an object".to_string())?;

    if obj.get(MARKER_FIELD).and_then(Value::as_bool) == Some(true) {
        if !obj.get(ENTRIES_FIELD).is_some_and(Value::is_object) {
            return Err("aggregate has no `entries` object".to_string());
        }
        return serde_json::from_value::<AggregateResult>(v.clone())
            .map(AggregateValue::Aggregate)
            .map_err(|e| e.to_string());
    }

    match obj.get(RAW_FIELD) {
        Some(raw) => decode_payload(raw).map(AggregateValue::Raw),
        None => Err("neither a raw payload nor an aggregate".to_string()),
    }
}

/// Decode one reduce input. `index` is its position in the input sequence.
pub fn decode_value(
    key: &PartitionKey,
    index: usize,
    v: &Value,
) -> Result<AggregateValue, MalformedValueError> {
    decode_shape(v).map_err(|reason| MalformedValueError::new(key, index, reason))
}

/// Decode all values, then `merge`. The first malformed value fails the key.
pub fn merge_wire(key: &PartitionKey, values: &[Value]) -> Result<AggregateResult, MalformedValueError> {
    let decoded = values
        .iter()
        .enumerate()
        .map(|(i, v)| decode_value(key, i, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merge(key, &decoded))
}
