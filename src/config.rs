//! The configuration block consumed by the core (§6).
//!
//! Parsing this from a file or CLI arguments is out of scope — that's the
//! excluded configuration-parser front end. This module only defines the
//! typed parameters the engine's phases read.

/// Marker selection: every k-mer is hashed and kept as a marker with
/// probability `marker_selection_probability`, seeded by `marker_seed`.
#[derive(Debug, Clone, Copy)]
pub struct MarkerSelectionConfig {
    pub k: u32,
    pub marker_selection_probability: f64,
    pub marker_seed: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct LowHashConfig {
    pub m: usize,
    pub hash_fraction: f64,
    pub iterations: usize,
    pub log2_bucket_count: u32,
    pub max_bucket_size: usize,
    pub min_frequency: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct AlignmentConfig {
    pub max_skip: u32,
    pub max_marker_frequency: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct AlignmentPostFilterConfig {
    pub min_aligned_marker_count: u32,
    pub max_trim: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct MarkerGraphConfig {
    pub min_coverage: u32,
    pub max_coverage: u32,
    pub low_coverage_threshold: u32,
    pub high_coverage_threshold: u32,
    pub max_distance: u32,
    pub edge_marker_skip_threshold: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PruningConfig {
    pub iteration_count: u32,
}

#[derive(Debug, Clone)]
pub struct SimplificationConfig {
    pub max_length_vector: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConsensusConfig {
    /// The "pathologically long interval" safety valve (§4.7): once a
    /// majority-mode (spanning) edge's between-marker interval exceeds
    /// this many bases, consensus skips POA entirely and copies the
    /// shortest surviving interval's raw bases instead.
    pub marker_graph_edge_length_threshold_for_consensus: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadGraphConfig {
    pub max_alignment_count: usize,
    pub max_chimeric_read_distance: u32,
    pub min_component_size: usize,
    /// Minimum fraction of a read's markers an edge must cover to count
    /// towards chimera detection.
    pub min_chimeric_span_fraction: f64,
}

/// The complete parameter set the engine needs, grouped exactly as
/// enumerated in §6.
#[derive(Debug, Clone)]
pub struct Config {
    pub marker_selection: MarkerSelectionConfig,
    pub low_hash: LowHashConfig,
    pub alignment: AlignmentConfig,
    pub alignment_post_filter: AlignmentPostFilterConfig,
    pub marker_graph: MarkerGraphConfig,
    pub pruning: PruningConfig,
    pub simplification: SimplificationConfig,
    pub consensus: ConsensusConfig,
    pub read_graph: ReadGraphConfig,
}

impl Config {
    /// Validate the static invariants the spec classifies as "invalid
    /// input" errors that are fatal at the point of detection.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::EngineError;

        const MAX_K: u32 = 30;
        if self.marker_selection.k == 0 || self.marker_selection.k > MAX_K {
            return Err(EngineError::KTooLarge {
                k: self.marker_selection.k,
                max: MAX_K,
            });
        }
        let p = self.marker_selection.marker_selection_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(EngineError::SelectionProbabilityOutOfRange { p });
        }
        const MIN_LOG2_BUCKETS: u32 = 1;
        if self.low_hash.log2_bucket_count < MIN_LOG2_BUCKETS {
            return Err(EngineError::Log2BucketCountTooSmall {
                log2_bucket_count: self.low_hash.log2_bucket_count,
                min: MIN_LOG2_BUCKETS,
            });
        }
        Ok(())
    }
}
