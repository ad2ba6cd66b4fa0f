//! Local map/reduce driver.
//!
//! Plays the part of the batch host around `feedrank_core`:
//! - decodes and scores records (map), in parallel
//! - groups emissions by partition key
//! - reduces each key over shards and waves, feeding every partial aggregate
//!   back into `merge`
//!
//! No IO. State lives only inside a single call.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use feedrank_core::{
    decode_value, emit, encode_aggregate, merge, AggregateResult, AggregateValue, Emission, Item, ItemId,
    MalformedValueError, PartitionKey,
};

use crate::adapter::{ItemDecoder, JsonItemDecoder, RejectedRecord};
use crate::cfg::JobCfg;
use crate::error::JobResult;

/// Map phase output. `emissions` keeps input order.
#[derive(Clone, Debug, Default)]
pub struct MapOutput {
    pub emissions: Vec<Emission>,
    pub rejected: Vec<RejectedRecord>,
}

#[derive(Clone, Debug, Default)]
pub struct JobOutput {
    pub results: BTreeMap<PartitionKey, AggregateResult>,
    pub rejected: Vec<RejectedRecord>,
}

impl JobOutput {
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            results: self
                .results
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Reduce results in storage-agnostic form, sorted by key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub results: Vec<(PartitionKey, AggregateResult)>,
}

/// Snapshot as read off storage, before each aggregate is validated.
#[derive(Deserialize)]
struct StoredSnapshot {
    results: Vec<(PartitionKey, Value)>,
}

impl JobSnapshot {
    /// `{"results": [[key, <aggregate wire value>], ...]}`
    pub fn to_json(&self) -> JobResult<String> {
        let results: Vec<(&PartitionKey, Value)> = self
            .results
            .iter()
            .map(|(k, agg)| (k, encode_aggregate(agg)))
            .collect();
        Ok(serde_json::to_string(&json!({ "results": results }))?)
    }

    /// Every stored value must decode as an aggregate; entries keyed under the
    /// wrong id or raw payloads are rejected as malformed.
    pub fn from_json(s: &str) -> JobResult<Self> {
        let stored: StoredSnapshot = serde_json::from_str(s)?;
        let mut results = Vec::with_capacity(stored.results.len());
        for (index, (key, raw)) in stored.results.into_iter().enumerate() {
            match decode_value(&key, index, &raw)? {
                AggregateValue::Aggregate(agg) => results.push((key, agg)),
                AggregateValue::Raw(_) => {
                    return Err(MalformedValueError::new(&key, index, "snapshot entry is not an aggregate").into())
                }
            }
        }
        Ok(JobSnapshot { results })
    }
}

/// Deterministic FNV-1a hash (stable across runs).
fn fnv1a_u64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn shard_index(id: &ItemId, shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    (fnv1a_u64(id.as_str()) as usize) % shard_count
}

/// Split values into per-shard lanes. Every id lands in exactly one lane and
/// keeps its relative order there, so last-write-wins survives the split.
fn route(values: Vec<AggregateValue>, shard_count: usize) -> Vec<Vec<AggregateValue>> {
    let mut lanes: Vec<Vec<AggregateValue>> = vec![Vec::new(); shard_count];
    for v in values {
        match v {
            AggregateValue::Raw(p) => {
                let idx = shard_index(&p.item_id, shard_count);
                lanes[idx].push(AggregateValue::Raw(p));
            }
            AggregateValue::Aggregate(agg) => {
                let mut parts: Vec<AggregateResult> = vec![AggregateResult::new(); shard_count];
                for (id, p) in agg.entries {
                    let idx = shard_index(&id, shard_count);
                    parts[idx].entries.insert(id, p);
                }
                for (lane, part) in lanes.iter_mut().zip(parts) {
                    if !part.is_empty() {
                        lane.push(part.into_value());
                    }
                }
            }
        }
    }
    lanes
}

/// Reduce one lane in waves: each wave merges the previous wave's aggregate
/// followed by up to `wave_size` new values.
fn reduce_lane(key: &PartitionKey, lane: &[AggregateValue], wave_size: usize) -> AggregateResult {
    let mut acc: Option<AggregateResult> = None;
    for (wave, chunk) in lane.chunks(wave_size.max(1)).enumerate() {
        let mut inputs: Vec<AggregateValue> = Vec::with_capacity(chunk.len() + 1);
        if let Some(prev) = acc.take() {
            inputs.push(prev.into_value());
        }
        inputs.extend(chunk.iter().cloned());
        tracing::debug!(key = %key, wave, inputs = inputs.len(), "reduce wave");
        acc = Some(merge(key, &inputs));
    }
    acc.unwrap_or_default()
}

/// Map/reduce driver over one `ItemDecoder`.
#[derive(Debug)]
pub struct ScoringJob<D = JsonItemDecoder> {
    cfg: JobCfg,
    decoder: D,
}

impl ScoringJob<JsonItemDecoder> {
    /// Job with the JSON decoder configured from `cfg.fields`.
    pub fn new(cfg: JobCfg) -> Self {
        let decoder = JsonItemDecoder::new(cfg.fields.clone());
        Self::with_decoder(cfg, decoder)
    }
}

impl<D: ItemDecoder> ScoringJob<D> {
    pub fn with_decoder(cfg: JobCfg, decoder: D) -> Self {
        Self {
            cfg: cfg.normalized(),
            decoder,
        }
    }

    pub fn cfg(&self) -> &JobCfg {
        &self.cfg
    }

    /// Decode and score every record. Malformed records are dropped and
    /// reported; the rest are unaffected.
    pub fn map(&self, records: &[Value]) -> MapOutput {
        let scored: Vec<Result<Emission, RejectedRecord>> = records
            .par_iter()
            .enumerate()
            .map(|(index, rec)| {
                self.decoder
                    .decode(rec)
                    .map(|item| emit(&item, &self.cfg.partition, &self.cfg.scoring))
                    .map_err(|error| RejectedRecord { index, error })
            })
            .collect();

        let mut out = MapOutput::default();
        for r in scored {
            match r {
                Ok(e) => out.emissions.push(e),
                Err(rej) => {
                    tracing::warn!(index = rej.index, error = %rej.error, "dropping malformed record");
                    out.rejected.push(rej);
                }
            }
        }
        out
    }

    /// Score already-decoded items.
    pub fn map_items(&self, items: &[Item]) -> Vec<Emission> {
        items
            .par_iter()
            .map(|item| emit(item, &self.cfg.partition, &self.cfg.scoring))
            .collect()
    }

    /// Group emissions by key, then reduce every key.
    pub fn reduce(&self, emissions: Vec<Emission>) -> BTreeMap<PartitionKey, AggregateResult> {
        self.reduce_groups(group_emissions(emissions))
    }

    /// Reduce already-grouped values. Values may mix raw payloads and earlier
    /// aggregates.
    pub fn reduce_groups(
        &self,
        groups: BTreeMap<PartitionKey, Vec<AggregateValue>>,
    ) -> BTreeMap<PartitionKey, AggregateResult> {
        groups
            .into_iter()
            .map(|(key, values)| {
                let agg = self.reduce_key(&key, values);
                (key, agg)
            })
            .collect()
    }

    /// Reduce wire-encoded values per key. A malformed value fails only its
    /// own key.
    pub fn reduce_wire(
        &self,
        groups: BTreeMap<PartitionKey, Vec<Value>>,
    ) -> BTreeMap<PartitionKey, Result<AggregateResult, MalformedValueError>> {
        groups
            .into_iter()
            .map(|(key, raw)| {
                let decoded = raw
                    .iter()
                    .enumerate()
                    .map(|(i, v)| decode_value(&key, i, v))
                    .collect::<Result<Vec<_>, _>>();
                let res = match decoded {
                    Ok(values) => Ok(self.reduce_key(&key, values)),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "failing key on malformed value");
                        Err(e)
                    }
                };
                (key, res)
            })
            .collect()
    }

    /// Continue from a prior snapshot: each key's prior aggregate goes first,
    /// so new emissions overwrite it on collision.
    pub fn resume(
        &self,
        prior: JobSnapshot,
        emissions: Vec<Emission>,
    ) -> BTreeMap<PartitionKey, AggregateResult> {
        let mut groups: BTreeMap<PartitionKey, Vec<AggregateValue>> = BTreeMap::new();
        for (key, agg) in prior.results {
            groups.entry(key).or_default().push(agg.into_value());
        }
        for e in emissions {
            groups.entry(e.key).or_default().push(AggregateValue::Raw(e.payload));
        }
        self.reduce_groups(groups)
    }

    /// Map then reduce.
    pub fn run(&self, records: &[Value]) -> JobOutput {
        let mapped = self.map(records);
        tracing::debug!(
            emitted = mapped.emissions.len(),
            rejected = mapped.rejected.len(),
            "map phase done"
        );
        JobOutput {
            results: self.reduce(mapped.emissions),
            rejected: mapped.rejected,
        }
    }

    fn reduce_key(&self, key: &PartitionKey, values: Vec<AggregateValue>) -> AggregateResult {
        let lanes = route(values, self.cfg.shards);
        let wave_size = self.cfg.wave_size;

        let partials: Vec<AggregateValue> = lanes
            .par_iter()
            .filter(|lane| !lane.is_empty())
            .map(|lane| reduce_lane(key, lane, wave_size).into_value())
            .collect();

        merge(key, &partials)
    }
}

/// Group emissions by key, preserving emission order within each key.
pub fn group_emissions(emissions: Vec<Emission>) -> BTreeMap<PartitionKey, Vec<AggregateValue>> {
    let mut groups: BTreeMap<PartitionKey, Vec<AggregateValue>> = BTreeMap::new();
    for e in emissions {
        groups.entry(e.key).or_default().push(AggregateValue::Raw(e.payload));
    }
    groups
}
