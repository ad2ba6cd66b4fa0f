//! feedrank_job
//!
//! Batch-host facing orchestration layer for `feedrank_core`.
//!
//! Responsibilities:
//! - decode stored records into `Item`s via adapters
//! - run the map step over records
//! - group emissions by partition key
//! - reduce each key in shards and waves, re-feeding partial aggregates
//!
//! Non-goals:
//! - no IO
//! - no async
//! - no scoring policy (lives in core)

pub mod adapter;
pub mod cfg;
pub mod error;
pub mod job;

pub use adapter::{
    decode_batch,
    FieldKeys,
    ItemDecoder,
    JsonItemDecoder,
    RejectedRecord,
};

pub use cfg::JobCfg;
pub use error::{JobError, JobResult};

pub use job::{
    group_emissions,
    JobOutput,
    JobSnapshot,
    MapOutput,
    ScoringJob,
};
