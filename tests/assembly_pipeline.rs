//! End-to-end exercises of the pipeline's public surface: two reads that
//! overlap end to end produce one linear contig; reads sharing no k-mers
//! produce no candidates.

use shasta_core::config::{
    AlignmentConfig, AlignmentPostFilterConfig, Config, ConsensusConfig, LowHashConfig,
    MarkerGraphConfig, MarkerSelectionConfig, PruningConfig, ReadGraphConfig, SimplificationConfig,
};
use shasta_core::read_store::{ReadStore, RunLengthRead};

fn read(seq: &str) -> RunLengthRead {
    RunLengthRead { bases: seq.bytes().collect(), repeat_counts: vec![1; seq.len()] }
}

fn small_config() -> Config {
    Config {
        marker_selection: MarkerSelectionConfig { k: 4, marker_selection_probability: 1.0, marker_seed: 11 },
        low_hash: LowHashConfig {
            m: 2,
            hash_fraction: 1.0,
            iterations: 2,
            log2_bucket_count: 4,
            max_bucket_size: 1000,
            min_frequency: 1,
        },
        alignment: AlignmentConfig { max_skip: 2, max_marker_frequency: 1000 },
        alignment_post_filter: AlignmentPostFilterConfig { min_aligned_marker_count: 2, max_trim: 5 },
        marker_graph: MarkerGraphConfig {
            min_coverage: 2,
            max_coverage: 1000,
            low_coverage_threshold: 1,
            high_coverage_threshold: 100,
            max_distance: 6,
            edge_marker_skip_threshold: 2,
        },
        pruning: PruningConfig { iteration_count: 3 },
        simplification: SimplificationConfig { max_length_vector: vec![2, 5, 10] },
        consensus: ConsensusConfig { marker_graph_edge_length_threshold_for_consensus: 4 },
        read_graph: ReadGraphConfig {
            max_alignment_count: 8,
            max_chimeric_read_distance: 10,
            min_component_size: 1,
            min_chimeric_span_fraction: 0.4,
        },
    }
}

#[test]
fn two_overlapping_reads_assemble_into_one_contig() {
    let dir = tempfile::tempdir().unwrap();
    // Two reads sharing a long overlap, as if sequenced from the same
    // genomic region.
    let reads = vec![read("ACGTACGTTGCATGCA"), read("ACGTACGTTGCATGCA")];
    let store = ReadStore::build(dir.path(), &reads).unwrap();

    let result = shasta_core::run(&store, dir.path(), &small_config()).unwrap();
    assert!(!result.assembly.segments.is_empty());
    for segment in &result.assembly.segments {
        assert!(segment.sequence.len() >= 4); // at least one k-mer's worth
        assert_eq!(segment.sequence.len(), segment.repeat_counts.len());
    }
}

#[test]
fn reads_sharing_no_kmers_yield_no_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let reads = vec![read("AAAAAAAAAAAAAAAA"), read("CCCCCCCCCCCCCCCC")];
    let store = ReadStore::build(dir.path(), &reads).unwrap();

    let err = shasta_core::run(&store, dir.path(), &small_config()).unwrap_err();
    assert_eq!(err.kind(), shasta_core::ErrorKind::ExhaustedData);
}

#[test]
fn invalid_k_is_rejected_before_any_phase_runs() {
    let dir = tempfile::tempdir().unwrap();
    let reads = vec![read("ACGTACGT")];
    let store = ReadStore::build(dir.path(), &reads).unwrap();

    let mut config = small_config();
    config.marker_selection.k = 0;
    let err = shasta_core::run(&store, dir.path(), &config).unwrap_err();
    assert_eq!(err.kind(), shasta_core::ErrorKind::InvalidInput);
}
