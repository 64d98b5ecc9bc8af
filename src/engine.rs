//! The engine handle (§9): runs the full pipeline — marker selection,
//! LowHash, alignment, read graph, marker graph, cleanup, assembly graph,
//! consensus — over an already-loaded [`ReadStore`], in order.
//!
//! Loading reads from FASTA/runnie files and writing the result out as
//! GFA/FASTA/Graphviz are both out of scope (§1); the engine starts from
//! an in-memory [`ReadStore`] and returns in-memory [`AssemblyResult`].

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::alignment::{align, passes_post_filter, AlignmentParams, AlignmentSummary};
use crate::assembler::{self, AssemblyResult};
use crate::assembly_graph;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::kmer::KmerTable;
use crate::lowhash;
use crate::marker::MarkerTable;
use crate::marker_graph::{build as build_marker_graph, cleanup};
use crate::read_graph::{AlignmentSummaryOnReads, ReadGraph, ReadGraphEdge};
use crate::read_store::{OrientedReadId, ReadId, ReadStore};

pub struct EngineResult {
    pub assembly: AssemblyResult,
    pub chimeric_reads: Vec<ReadId>,
}

/// Run every phase over `read_store`, persisting the mmap-backed k-mer and
/// marker tables under `prefix`.
pub fn run(read_store: &ReadStore, prefix: &Path, config: &Config) -> Result<EngineResult> {
    config.validate()?;

    let kmers = KmerTable::build(
        prefix,
        config.marker_selection.k,
        config.marker_selection.marker_selection_probability,
        config.marker_selection.marker_seed,
    )?;
    let markers = MarkerTable::build(prefix, read_store, &kmers)?;
    info!(read_count = read_store.read_count(), k = config.marker_selection.k, "markers built");

    let candidates = lowhash::find_candidates(
        read_store,
        &markers,
        config.low_hash.m,
        config.low_hash.hash_fraction,
        config.low_hash.iterations,
        config.low_hash.log2_bucket_count,
        config.low_hash.max_bucket_size,
        config.low_hash.min_frequency,
        config.marker_selection.marker_seed,
    );
    if candidates.is_empty() {
        return Err(EngineError::NoCandidates);
    }
    info!(candidate_count = candidates.len(), "lowhash candidates found");

    let mut edges_with_alignment = Vec::new();
    for c in &candidates {
        let oriented0 = OrientedReadId::new(c.read0, 0);
        let oriented1 = OrientedReadId::new(c.read1, if c.same_strand { 0 } else { 1 });
        let n0 = read_store.len_bases(c.read0);
        let n1 = read_store.len_bases(c.read1);
        let m0 = markers.markers(oriented0, n0);
        let m1 = markers.markers(oriented1, n1);

        let params = AlignmentParams {
            max_skip: config.alignment.max_skip,
            max_marker_frequency: config.alignment.max_marker_frequency,
        };
        let alignment = align(&m0, &m1, params);
        if !passes_post_filter(
            &alignment,
            m0.len() as u32,
            m1.len() as u32,
            config.alignment_post_filter.min_aligned_marker_count,
            config.alignment_post_filter.max_trim,
        ) {
            continue;
        }

        let summary = AlignmentSummary::from_alignment(&alignment).expect("non-empty after post-filter");
        let edge = ReadGraphEdge {
            read0: c.read0,
            read1: c.read1,
            same_strand: c.same_strand,
            cross_strand: false,
            summary: AlignmentSummaryOnReads { summary, n0: m0.len() as u32, n1: m1.len() as u32 },
        };
        edges_with_alignment.push((edge, alignment));
    }
    if edges_with_alignment.is_empty() {
        return Err(EngineError::NoAlignments);
    }
    info!(edge_count = edges_with_alignment.len(), "alignments passed post-filter");

    let mut read_graph = ReadGraph::new(
        read_store.read_count(),
        edges_with_alignment.iter().map(|(e, _)| *e).collect(),
    );
    read_graph.cap_degree(config.read_graph.max_alignment_count);
    read_graph.detect_cross_strand_edges();
    let chimeric_reads = read_graph.find_chimeric_reads(config.read_graph.min_chimeric_span_fraction);
    info!(chimeric_count = chimeric_reads.len(), "chimeric reads flagged");

    // Chimeric reads and cross-strand edges are both excluded from the
    // marker-graph build (§4.3): a chimeric read's alignments straddle two
    // unrelated genomic segments, and a cross-strand edge's pair already
    // has a same-strand alternative, so neither can be trusted to union
    // markers that truly correspond to the same genomic position.
    let excluded_reads: HashSet<ReadId> = chimeric_reads.iter().copied().collect();
    let kept: HashSet<(ReadId, ReadId)> = read_graph
        .edges
        .iter()
        .filter(|e| !e.cross_strand)
        .map(|e| (e.read0, e.read1))
        .collect();
    let filtered: Vec<_> = edges_with_alignment
        .into_iter()
        .filter(|(e, _)| {
            !excluded_reads.contains(&e.read0) && !excluded_reads.contains(&e.read1) && kept.contains(&(e.read0, e.read1))
        })
        .collect();

    let mut marker_graph = build_marker_graph(read_store, &markers, &filtered, &config.marker_graph)?;
    info!(
        vertex_count = marker_graph.vertex_count(),
        edge_count = marker_graph.edge_count(),
        "marker graph built"
    );

    cleanup::remove_short_cycles(&mut marker_graph, config.marker_graph.max_distance);
    cleanup::transitive_reduction(
        &mut marker_graph,
        config.marker_graph.low_coverage_threshold,
        config.marker_graph.high_coverage_threshold,
        config.marker_graph.max_distance,
    );
    cleanup::prune_leaves(&mut marker_graph, config.pruning.iteration_count);
    cleanup::simplify_bubbles(&mut marker_graph, &config.simplification.max_length_vector);
    info!(edge_count = marker_graph.live_edge_count(), "marker graph cleaned up");

    let graph = assembly_graph::build(&marker_graph);
    info!(chain_count = graph.chains.len(), "assembly graph built");

    let assembly = assembler::assemble(
        &graph,
        &marker_graph,
        read_store,
        &markers,
        config.marker_selection.k,
        &config.consensus,
    );
    info!(segment_count = assembly.segments.len(), link_count = assembly.links.len(), "assembly complete");

    Ok(EngineResult { assembly, chimeric_reads })
}
