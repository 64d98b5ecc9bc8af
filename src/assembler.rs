//! Top-level assembly (§4.7, §6): stitch each assembly-graph chain's
//! vertex and edge consensus into a contig sequence, and record the
//! genome-graph link structure between chains. Does not write GFA,
//! FASTA, or any other on-disk format — that is the excluded writer's
//! job (§1); this only produces the in-memory `Segment`/`Link` records.

use crate::assembly_graph::{AssemblyGraph, ChainId};
use crate::config::ConsensusConfig;
use crate::consensus::{edge_consensus, vertex_consensus};
use crate::marker::MarkerTable;
use crate::marker_graph::{MarkerGraph, MarkerGraphEdge, VertexId};
use crate::read_store::ReadStore;
use fxhash::FxHashMap;

#[derive(Debug, Clone)]
pub struct Segment {
    pub chain_id: ChainId,
    pub sequence: Vec<u8>,
    pub repeat_counts: Vec<u8>,
}

/// A run-length-encoded edit-script operation between two chains' abutting
/// repeat-count runs, read off the Needleman-Wunsch traceback in
/// [`repeat_count_cigar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    Match(u32),
    Insertion(u32),
    Deletion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub from: ChainId,
    pub to: ChainId,
    /// Edit script between the last `k` repeat counts of `from`'s segment
    /// and the first `k` repeat counts of `to`'s segment, describing how
    /// the two chains' base-space assemblies actually overlap.
    pub cigar: Vec<CigarOp>,
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyResult {
    pub segments: Vec<Segment>,
    pub links: Vec<Link>,
}

pub fn assemble(
    assembly_graph: &AssemblyGraph,
    marker_graph: &MarkerGraph,
    read_store: &ReadStore,
    marker_table: &MarkerTable,
    k: u32,
    consensus_config: &ConsensusConfig,
) -> AssemblyResult {
    let mut emitted = vec![false; assembly_graph.chains.len()];
    let mut segments = Vec::new();

    for (cid, chain) in assembly_graph.chains.iter().enumerate() {
        if emitted[cid] {
            continue;
        }
        emitted[cid] = true;
        let twin = chain.reverse_complement;
        if twin != ChainId::MAX && twin as usize != cid {
            emitted[twin as usize] = true;
        }
        segments.push(build_segment(
            cid as ChainId,
            chain,
            marker_graph,
            read_store,
            marker_table,
            k,
            consensus_config,
        ));
    }

    let links = build_links(assembly_graph, marker_graph, &segments, k);
    AssemblyResult { segments, links }
}

fn build_segment(
    chain_id: ChainId,
    chain: &crate::assembly_graph::Chain,
    marker_graph: &MarkerGraph,
    read_store: &ReadStore,
    marker_table: &MarkerTable,
    k: u32,
    consensus_config: &ConsensusConfig,
) -> Segment {
    let first_edge = &marker_graph.edges[chain.edges[0]];
    let v0 = vertex_consensus(&marker_graph.vertices[first_edge.source as usize], read_store, marker_table, k);
    let mut sequence = v0.bases;
    let mut repeat_counts = v0.repeat_counts;

    for &edge_idx in &chain.edges {
        let edge = &marker_graph.edges[edge_idx];
        let ec = edge_consensus(
            edge,
            read_store,
            marker_table,
            k,
            consensus_config.marker_graph_edge_length_threshold_for_consensus,
        );
        let target = vertex_consensus(&marker_graph.vertices[edge.target as usize], read_store, marker_table, k);

        if !ec.sequence.is_empty() {
            sequence.extend_from_slice(&ec.sequence);
            repeat_counts.extend_from_slice(&ec.repeat_counts);
            sequence.extend_from_slice(&target.bases);
            repeat_counts.extend_from_slice(&target.repeat_counts);
        } else {
            let gap = modal_gap(edge, read_store, marker_table, k);
            let overlap = (k as i64 - gap).clamp(0, k as i64) as usize;
            sequence.extend_from_slice(&target.bases[overlap..]);
            repeat_counts.extend_from_slice(&target.repeat_counts[overlap..]);
        }
    }

    Segment { chain_id, sequence, repeat_counts }
}

/// The base-position gap (target position minus source position) a single
/// transition implies.
fn transition_gap(oriented: crate::read_store::OrientedReadId, source_ordinal: u32, target_ordinal: u32, read_store: &ReadStore, marker_table: &MarkerTable) -> i64 {
    let len = read_store.len_bases(oriented.read_id());
    let markers = marker_table.markers(oriented, len);
    markers[target_ordinal as usize].position as i64 - markers[source_ordinal as usize].position as i64
}

/// The most common base-position gap among this edge's overlapping
/// transitions (offset <= k) — used to decide how much of the target
/// vertex's k-mer was already emitted by the preceding one when there's no
/// between-sequence to fall back on. Falls back to the gap across all
/// transitions when none of them qualify as overlapping.
fn modal_gap(edge: &MarkerGraphEdge, read_store: &ReadStore, marker_table: &MarkerTable, k: u32) -> i64 {
    let gaps: Vec<i64> = edge
        .transitions
        .iter()
        .map(|&(oriented, source_ordinal, target_ordinal)| transition_gap(oriented, source_ordinal, target_ordinal, read_store, marker_table))
        .collect();

    let overlapping: Vec<i64> = gaps.iter().copied().filter(|&g| g <= k as i64).collect();
    let pool = if overlapping.is_empty() { &gaps } else { &overlapping };

    let mut counts: FxHashMap<i64, u32> = FxHashMap::default();
    for &gap in pool {
        *counts.entry(gap).or_insert(0) += 1;
    }
    *counts.iter().max_by_key(|(_, &c)| c).map(|(g, _)| g).unwrap_or(&0)
}

/// Two chains are linked when one ends at the same marker-graph vertex
/// where the other begins — the branch/merge point the chain finder split
/// on. Each link's `cigar` is the edit script between the `k` repeat counts
/// abutting that junction on either side.
fn build_links(assembly_graph: &AssemblyGraph, marker_graph: &MarkerGraph, segments: &[Segment], k: u32) -> Vec<Link> {
    let mut ends_at: FxHashMap<VertexId, Vec<ChainId>> = FxHashMap::default();
    let mut starts_at: FxHashMap<VertexId, Vec<ChainId>> = FxHashMap::default();
    for (cid, chain) in assembly_graph.chains.iter().enumerate() {
        let first = marker_graph.edges[chain.edges[0]].source;
        let last = marker_graph.edges[*chain.edges.last().unwrap()].target;
        starts_at.entry(first).or_default().push(cid as ChainId);
        ends_at.entry(last).or_default().push(cid as ChainId);
    }

    let segment_by_chain: FxHashMap<ChainId, &Segment> = segments.iter().map(|s| (s.chain_id, s)).collect();
    let k = k as usize;
    let repeat_counts_of = |cid: ChainId| -> Vec<u8> {
        if let Some(segment) = segment_by_chain.get(&cid) {
            return segment.repeat_counts.clone();
        }
        let twin = assembly_graph.chains[cid as usize].reverse_complement;
        let twin_segment = segment_by_chain[&twin];
        let mut rc = twin_segment.repeat_counts.clone();
        rc.reverse();
        rc
    };

    let mut links = Vec::new();
    for (vertex, froms) in &ends_at {
        if let Some(tos) = starts_at.get(vertex) {
            for &from in froms {
                for &to in tos {
                    let from_counts = repeat_counts_of(from);
                    let to_counts = repeat_counts_of(to);
                    let tail = &from_counts[from_counts.len().saturating_sub(k)..];
                    let head = &to_counts[..k.min(to_counts.len())];
                    let cigar = repeat_count_cigar(tail, head);
                    links.push(Link { from, to, cigar });
                }
            }
        }
    }
    links
}

/// Needleman-Wunsch edit distance between two repeat-count runs, with the
/// traceback run-length-encoded into [`CigarOp`]s. Unit cost for every
/// substitution, insertion, and deletion.
fn repeat_count_cigar(from_tail: &[u8], to_head: &[u8]) -> Vec<CigarOp> {
    let n = from_tail.len();
    let m = to_head.len();
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in 0..=n {
        dp[i][0] = i as u32;
    }
    for j in 0..=m {
        dp[0][j] = j as u32;
    }
    for i in 1..=n {
        for j in 1..=m {
            let sub_cost = if from_tail[i - 1] == to_head[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j - 1] + sub_cost).min(dp[i - 1][j] + 1).min(dp[i][j - 1] + 1);
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && dp[i][j] == dp[i - 1][j - 1] + if from_tail[i - 1] == to_head[j - 1] { 0 } else { 1 } {
            ops.push(CigarOp::Match(1));
            i -= 1;
            j -= 1;
        } else if i > 0 && dp[i][j] == dp[i - 1][j] + 1 {
            ops.push(CigarOp::Deletion(1));
            i -= 1;
        } else {
            ops.push(CigarOp::Insertion(1));
            j -= 1;
        }
    }
    ops.reverse();

    let mut rle: Vec<CigarOp> = Vec::new();
    for op in ops {
        match (rle.last_mut(), op) {
            (Some(CigarOp::Match(n)), CigarOp::Match(_)) => *n += 1,
            (Some(CigarOp::Insertion(n)), CigarOp::Insertion(_)) => *n += 1,
            (Some(CigarOp::Deletion(n)), CigarOp::Deletion(_)) => *n += 1,
            _ => rle.push(op),
        }
    }
    rle
}
