pub mod item;
pub mod cfg;
pub mod error;

pub mod score;
pub mod aggregate;
pub mod wire;

pub use item::{FeatureId, FeatureSignal, Item, ItemId};
pub use cfg::{industry_feature_id, ScoringCfg, DEFAULT_DAMPING, STARTUP_FEATURE_ID};
pub use error::{InputShapeError, MalformedValueError};

pub use score::{emit, score, score_traced, score_with, Emission, ScoreTrace, ScoredPayload, SignalTrace};
pub use aggregate::{merge, AggregateResult, AggregateValue, PartitionKey};
pub use wire::{decode_value, encode_aggregate, encode_payload, encode_value, merge_wire};
