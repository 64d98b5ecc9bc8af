//! Error classification for the assembly engine.
//!
//! Every failure the engine can produce belongs to exactly one of the four
//! kinds named in the specification: invalid input, exhausted data,
//! resource exhaustion, or an internal invariant violation. The first and
//! third are always fatal; the second is a warning the caller may choose to
//! log and continue past; the fourth is fatal and signals a bug rather than
//! bad input.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used by callers to decide exit-status behavior.
/// The binary that maps this to a process exit code is out of scope for
/// this crate; we only expose the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    ExhaustedData,
    ResourceExhaustion,
    InvariantViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::ExhaustedData => "exhausted data",
            ErrorKind::ResourceExhaustion => "resource exhaustion",
            ErrorKind::InvariantViolation => "internal invariant violation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("k={k} exceeds the marker capacity of {max}")]
    KTooLarge { k: u32, max: u32 },

    #[error("marker selection probability {p} is outside [0,1]")]
    SelectionProbabilityOutOfRange { p: f64 },

    #[error("log2BucketCount {log2_bucket_count} is too small (minimum {min})")]
    Log2BucketCountTooSmall { log2_bucket_count: u32, min: u32 },

    #[error("read {read_id} has a repeat count of {count} which exceeds 255")]
    RepeatCountOverflow { read_id: u32, count: u32 },

    #[error("duplicate marker invariant violated in read {read_id}: ordinals not strictly increasing")]
    MarkerOrderingViolated { read_id: u32 },

    #[error("no candidate alignment pairs survived LowHash")]
    NoCandidates,

    #[error("no alignments survived the post-filter threshold")]
    NoAlignments,

    #[error("no marker graph vertices survived the coverage filter")]
    NoVertices,

    #[error("failed to memory-map {path:?}: {source}")]
    Mmap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("twin mismatch: twin(twin({id})) != {id}")]
    TwinMismatch { id: u64 },

    #[error("disjoint-set find returned an id {id} outside the known universe of size {universe}")]
    UnseenDisjointSetId { id: u32, universe: u32 },

    #[error("vertex coverage {coverage} exceeds maxCoverage {max_coverage} after the size filter")]
    CoverageExceedsMax { coverage: u32, max_coverage: u32 },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            KTooLarge { .. }
            | SelectionProbabilityOutOfRange { .. }
            | Log2BucketCountTooSmall { .. }
            | RepeatCountOverflow { .. }
            | MarkerOrderingViolated { .. } => ErrorKind::InvalidInput,

            NoCandidates | NoAlignments | NoVertices => ErrorKind::ExhaustedData,

            Mmap { .. } => ErrorKind::ResourceExhaustion,

            TwinMismatch { .. } | UnseenDisjointSetId { .. } | CoverageExceedsMax { .. } => {
                ErrorKind::InvariantViolation
            }
        }
    }

    /// Invalid input and resource exhaustion are fatal at the point of
    /// detection; invariant violations are always fatal. Exhausted-data
    /// conditions are warnings: the pipeline continues and later stages
    /// observe empty collections.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::ExhaustedData)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
