use thiserror::Error;

use feedrank_core::MalformedValueError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("invalid job config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("invalid snapshot entry: {0}")]
    Malformed(#[from] MalformedValueError),
}

pub type JobResult<T> = Result<T, JobError>;
