use crate::AttachKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse quad document: {message}")]
    Format { message: String },

    #[error("invalid {kind} #{index} in quad document: {message}")]
    Schema {
        kind: &'static str,
        index: usize,
        message: String,
    },

    #[error("unresolved {kind:?} id {id} referenced by {referrer}")]
    Link {
        kind: AttachKind,
        id: i32,
        referrer: String,
    },

    #[error("skeleton '{skeleton}' attaches itself through its bones")]
    SkeletonCycle { skeleton: String },

    #[error("no active pool instance for fingerprint {fingerprint:016x} at frames {start}..{end}")]
    PoolMiss {
        fingerprint: u64,
        start: i32,
        end: i32,
    },

    #[error("pool exhausted for fingerprint {fingerprint:016x}: more than {limit} concurrent instances")]
    PoolExhausted { fingerprint: u64, limit: usize },

    #[error(
        "pool instance '{name}' is already active at frames {start}..{end}, cannot reassign"
    )]
    PoolInvariant { name: String, start: i32, end: i32 },

    #[error("failed to slice image '{name}': {message}")]
    SliceFailure { name: String, message: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("failed to serialize Spine JSON: {message}")]
    Serialize { message: String },
}
