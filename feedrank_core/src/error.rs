use thiserror::Error;

use crate::aggregate::PartitionKey;

/// A record could not be turned into an `Item`. The record is dropped; other
/// records are unaffected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputShapeError {
    #[error("record is not an object")]
    NotAnObject,
    #[error("record has no usable identifier (field `{0}`)")]
    MissingId(String),
    #[error("feature list `{0}` is not a sequence")]
    FeaturesNotSequence(String),
    #[error("feature signal {index} is malformed: {reason}")]
    BadSignal { index: usize, reason: String },
}

impl InputShapeError {
    pub fn bad_signal(index: usize, reason: impl Into<String>) -> Self {
        Self::BadSignal {
            index,
            reason: reason.into(),
        }
    }
}

/// A reduce input matched neither the raw-payload shape nor the aggregate
/// shape. Fails the whole key; the caller decides whether to retry.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed value at index {index} for key {key}: {reason}")]
pub struct MalformedValueError {
    pub key: PartitionKey,
    pub index: usize,
    pub reason: String,
}

impl MalformedValueError {
    pub fn new(key: &PartitionKey, index: usize, reason: impl Into<String>) -> Self {
        Self {
            key: key.clone(),
            index,
            reason: reason.into(),
        }
    }
}
