//! Consensus (§4.7): per-vertex majority-vote repeat counts, and per-edge
//! consensus sequence either by direct majority vote ("overlapping
//! markers", when most of the edge's transitions show the source and
//! target markers overlapping or adjacent) or by partial-order alignment
//! ("spanning markers", when most transitions show real sequence between
//! the two marker-graph vertices that needs a real multiple-sequence
//! alignment before voting column by column).

use crate::kmer::decode_kmer;
use crate::marker::MarkerTable;
use crate::marker_graph::{MarkerGraphEdge, MarkerGraphVertex};
use crate::read_store::ReadStore;
use fxhash::FxHashMap;

#[derive(Debug, Clone)]
pub struct VertexConsensus {
    pub bases: Vec<u8>,
    pub repeat_counts: Vec<u8>,
    /// Number of member markers that agreed with the winning repeat count,
    /// per base position — the vertex's coverage profile.
    pub coverage: Vec<u32>,
}

pub fn vertex_consensus(
    vertex: &MarkerGraphVertex,
    read_store: &ReadStore,
    marker_table: &MarkerTable,
    k: u32,
) -> VertexConsensus {
    let (rep_oriented, rep_ordinal) = vertex.markers[0];
    let rep_markers = marker_table.markers(rep_oriented, read_store.len_bases(rep_oriented.read_id()));
    let kmer_id = rep_markers[rep_ordinal as usize].kmer_id;
    let bases = decode_kmer(kmer_id, k).into_bytes();

    let mut votes: Vec<FxHashMap<u8, u32>> = vec![FxHashMap::default(); k as usize];
    for &(oriented, ordinal) in &vertex.markers {
        let len = read_store.len_bases(oriented.read_id());
        let markers = marker_table.markers(oriented, len);
        let position = markers[ordinal as usize].position as usize;
        for i in 0..k as usize {
            let rc = read_store.repeat_count(oriented.read_id(), oriented.strand(), position + i);
            *votes[i].entry(rc).or_insert(0) += 1;
        }
    }

    let mut repeat_counts = Vec::with_capacity(k as usize);
    let mut coverage = Vec::with_capacity(k as usize);
    for column in &votes {
        let (&rc, &count) = column.iter().max_by_key(|(_, &c)| c).expect("vertex has at least one marker");
        repeat_counts.push(rc);
        coverage.push(count);
    }
    VertexConsensus { bases, repeat_counts, coverage }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeConsensusMode {
    Overlapping,
    Spanning,
}

#[derive(Debug, Clone)]
pub struct EdgeConsensus {
    pub mode: EdgeConsensusMode,
    pub sequence: Vec<u8>,
    pub repeat_counts: Vec<u8>,
}

/// The base sequence and repeat counts strictly between a transition's
/// source and target markers, plus the signed position offset
/// (`target.position - source.position`) that drives mode selection.
fn between_sequence(
    read_store: &ReadStore,
    marker_table: &MarkerTable,
    transition: (crate::read_store::OrientedReadId, u32, u32),
    k: u32,
) -> (Vec<u8>, Vec<u8>, i64) {
    let (oriented, source_ordinal, target_ordinal) = transition;
    let len = read_store.len_bases(oriented.read_id());
    let markers = marker_table.markers(oriented, len);
    let source = &markers[source_ordinal as usize];
    let target = &markers[target_ordinal as usize];
    let offset = target.position as i64 - source.position as i64;
    let start = source.position as usize + k as usize;
    let end = target.position as usize;

    let mut bases = Vec::with_capacity(end.saturating_sub(start));
    let mut repeat_counts = Vec::with_capacity(end.saturating_sub(start));
    for pos in start..end {
        bases.push(read_store.base(oriented.read_id(), oriented.strand(), pos));
        repeat_counts.push(read_store.repeat_count(oriented.read_id(), oriented.strand(), pos));
    }
    (bases, repeat_counts, offset)
}

/// Decides overlapping vs. spanning mode by a majority vote over each
/// transition's offset (not sequence length): a transition with
/// `offset <= k` means the source and target markers overlap or abut, with
/// no real intervening sequence to align; `offset > k` means there's a
/// real gap. Minority-mode intervals are discarded before building the
/// consensus, since they don't agree with the rest of the edge's reads
/// about what kind of junction this is. A pathologically long surviving
/// interval (beyond `pathological_length_threshold`) short-circuits to
/// copying the shortest surviving interval's raw bases rather than running
/// full POA over an outlier.
pub fn edge_consensus(
    edge: &MarkerGraphEdge,
    read_store: &ReadStore,
    marker_table: &MarkerTable,
    k: u32,
    pathological_length_threshold: usize,
) -> EdgeConsensus {
    let intervals: Vec<(Vec<u8>, Vec<u8>, i64)> =
        edge.transitions.iter().map(|&t| between_sequence(read_store, marker_table, t, k)).collect();

    if intervals.is_empty() {
        return EdgeConsensus { mode: EdgeConsensusMode::Overlapping, sequence: Vec::new(), repeat_counts: Vec::new() };
    }

    let overlapping_votes = intervals.iter().filter(|(_, _, offset)| *offset <= k as i64).count();
    let spanning_votes = intervals.len() - overlapping_votes;

    if overlapping_votes >= spanning_votes {
        return EdgeConsensus { mode: EdgeConsensusMode::Overlapping, sequence: Vec::new(), repeat_counts: Vec::new() };
    }

    let spanning: Vec<(Vec<u8>, Vec<u8>)> = intervals
        .into_iter()
        .filter(|(_, _, offset)| *offset > k as i64)
        .map(|(b, r, _)| (b, r))
        .collect();

    if spanning.iter().any(|(b, _)| b.len() > pathological_length_threshold) {
        let (bases, repeat_counts) = spanning.iter().min_by_key(|(b, _)| b.len()).cloned().expect("non-empty spanning set");
        return EdgeConsensus { mode: EdgeConsensusMode::Spanning, sequence: bases, repeat_counts };
    }

    let (sequence, repeat_counts) = poa_consensus(&spanning);
    EdgeConsensus { mode: EdgeConsensusMode::Spanning, sequence, repeat_counts }
}

/// An alignment operation of a query sequence against a fixed backbone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignOp {
    /// Query position matched (or substituted at) this backbone column.
    Match(usize, usize),
    /// Backbone column has no corresponding query position.
    Deletion(usize),
    /// Query position has no corresponding backbone column.
    Insertion(usize),
}

/// Edit-distance alignment of `query` against `backbone`, returned as a
/// full operation list rather than a sparse column map — deletions need to
/// be visible so the 5-way vote in [`poa_consensus`] can cast an explicit
/// gap ballot instead of silently dropping unmapped positions.
fn align_to_backbone(backbone: &[u8], query: &[u8]) -> Vec<AlignOp> {
    let n = backbone.len();
    let m = query.len();
    let mut dp = vec![vec![0i32; m + 1]; n + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i as i32;
    }
    for j in 0..=m {
        dp[0][j] = j as i32;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = if backbone[i - 1] == query[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j - 1] + cost).min(dp[i - 1][j] + 1).min(dp[i][j - 1] + 1);
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 {
            let cost = if backbone[i - 1] == query[j - 1] { 0 } else { 1 };
            if dp[i][j] == dp[i - 1][j - 1] + cost {
                ops.push(AlignOp::Match(i - 1, j - 1));
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && dp[i][j] == dp[i - 1][j] + 1 {
            ops.push(AlignOp::Deletion(i - 1));
            i -= 1;
        } else {
            ops.push(AlignOp::Insertion(j - 1));
            j -= 1;
        }
    }
    ops.reverse();
    ops
}

const GAP: u8 = b'-';

/// Progressive partial-order-alignment consensus: sequences are deduped by
/// identical bases, ordered by decreasing frequency (an acknowledged
/// simplification — tally order doesn't change a majority vote's winner),
/// aligned to the longest dedup'd sequence as backbone, and voted on
/// column by column with an explicit fifth `GAP` category alongside
/// A/C/G/T, so a column where most reads show a deletion is recognized as
/// such instead of having its vote silently diluted by the reads that
/// happen to have a base there.
fn poa_consensus(sequences: &[(Vec<u8>, Vec<u8>)]) -> (Vec<u8>, Vec<u8>) {
    let mut dedup: Vec<(Vec<u8>, Vec<u8>, u32)> = Vec::new();
    for (bases, repeat_counts) in sequences {
        if let Some(entry) = dedup.iter_mut().find(|(b, _, _)| b == bases) {
            entry.2 += 1;
        } else {
            dedup.push((bases.clone(), repeat_counts.clone(), 1));
        }
    }
    dedup.sort_by_key(|(_, _, freq)| std::cmp::Reverse(*freq));

    let backbone_idx = dedup.iter().enumerate().max_by_key(|(_, (b, _, _))| b.len()).map(|(i, _)| i).expect("at least one sequence");
    let (backbone_bases, _, _) = &dedup[backbone_idx];
    let len = backbone_bases.len();

    let mut base_votes: Vec<FxHashMap<u8, u32>> = vec![FxHashMap::default(); len];
    let mut rc_votes: Vec<FxHashMap<u8, u32>> = vec![FxHashMap::default(); len];
    for (bases, repeat_counts, freq) in &dedup {
        let ops = align_to_backbone(backbone_bases, bases);
        for op in ops {
            match op {
                AlignOp::Match(col, qpos) => {
                    *base_votes[col].entry(bases[qpos]).or_insert(0) += freq;
                    *rc_votes[col].entry(repeat_counts[qpos]).or_insert(0) += freq;
                }
                AlignOp::Deletion(col) => {
                    *base_votes[col].entry(GAP).or_insert(0) += freq;
                }
                AlignOp::Insertion(_) => {}
            }
        }
    }

    let mut sequence = Vec::with_capacity(len);
    let mut repeat_counts = Vec::with_capacity(len);
    for col in 0..len {
        let winner = base_votes[col].iter().max_by_key(|(_, &c)| c).map(|(&b, _)| b).unwrap_or(backbone_bases[col]);
        if winner == GAP {
            continue;
        }
        let rc = rc_votes[col].iter().max_by_key(|(_, &c)| c).map(|(&r, _)| r).unwrap_or(1);
        sequence.push(winner);
        repeat_counts.push(rc);
    }
    (sequence, repeat_counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::KmerTable;
    use crate::marker_graph::MarkerGraphEdge;
    use crate::read_store::{OrientedReadId, RunLengthRead};

    fn setup(seqs: &[&str], k: u32) -> (tempfile::TempDir, ReadStore, MarkerTable) {
        let dir = tempfile::tempdir().unwrap();
        let reads: Vec<RunLengthRead> = seqs
            .iter()
            .map(|s| RunLengthRead { bases: s.bytes().collect(), repeat_counts: vec![1; s.len()] })
            .collect();
        let store = ReadStore::build(dir.path(), &reads).unwrap();
        let kmers = KmerTable::build(dir.path(), k, 1.0, 1).unwrap();
        let table = MarkerTable::build(dir.path(), &store, &kmers).unwrap();
        (dir, store, table)
    }

    #[test]
    fn vertex_consensus_decodes_kmer_bases() {
        let (_dir, store, table) = setup(&["ACGACGT"], 3);
        let vertex = MarkerGraphVertex {
            markers: vec![(OrientedReadId::new(0, 0), 0)],
            reverse_complement: 0,
        };
        let c = vertex_consensus(&vertex, &store, &table, 3);
        assert_eq!(c.bases, b"ACG");
        assert_eq!(c.repeat_counts, vec![1, 1, 1]);
        assert_eq!(c.coverage, vec![1, 1, 1]);
    }

    #[test]
    fn vertex_consensus_majority_votes_repeat_counts() {
        let (_dir, store, table) = setup(&["ACGACGT", "ACGACGT", "ACGACGT"], 3);
        let vertex = MarkerGraphVertex {
            markers: vec![
                (OrientedReadId::new(0, 0), 0),
                (OrientedReadId::new(1, 0), 0),
                (OrientedReadId::new(2, 0), 0),
            ],
            reverse_complement: 0,
        };
        let c = vertex_consensus(&vertex, &store, &table, 3);
        assert_eq!(c.coverage, vec![3, 3, 3]);
    }

    #[test]
    fn poa_consensus_handles_insertion_in_minority_sequence() {
        let sequences = vec![
            (b"ACGT".to_vec(), vec![1, 1, 1, 1]),
            (b"ACGT".to_vec(), vec![1, 1, 1, 1]),
            (b"ACXGT".to_vec(), vec![1, 1, 1, 1, 1]), // one extra inserted base
        ];
        let (seq, _rcs) = poa_consensus(&sequences);
        assert_eq!(seq, b"ACGT");
    }

    #[test]
    fn align_to_backbone_maps_identical_sequence_one_to_one() {
        let ops = align_to_backbone(b"ACGT", b"ACGT");
        assert_eq!(ops, vec![AlignOp::Match(0, 0), AlignOp::Match(1, 1), AlignOp::Match(2, 2), AlignOp::Match(3, 3)]);
    }

    #[test]
    fn poa_consensus_skips_a_column_where_most_sequences_show_a_deletion() {
        let sequences = vec![
            (b"AC".to_vec(), vec![1, 1]),
            (b"AC".to_vec(), vec![1, 1]),
            (b"AXC".to_vec(), vec![1, 1, 1]),
        ];
        let (seq, _rcs) = poa_consensus(&sequences);
        assert_eq!(seq, b"AC");
    }

    fn one_transition_edge(source: u32, target: u32, source_ordinal: u32, target_ordinal: u32) -> MarkerGraphEdge {
        MarkerGraphEdge {
            source,
            target,
            transitions: vec![(OrientedReadId::new(0, 0), source_ordinal, target_ordinal)],
            removal: 0,
        }
    }

    #[test]
    fn edge_consensus_selects_overlapping_mode_when_offset_is_at_most_k() {
        let (_dir, store, table) = setup(&["ACGACGTAA"], 3);
        // ordinals 0 and 1 are adjacent markers (offset 1, well under k=3).
        let edge = one_transition_edge(0, 1, 0, 1);
        let ec = edge_consensus(&edge, &store, &table, 3, 100);
        assert_eq!(ec.mode, EdgeConsensusMode::Overlapping);
        assert!(ec.sequence.is_empty());
    }

    #[test]
    fn edge_consensus_selects_spanning_mode_when_offset_exceeds_k() {
        let (_dir, store, table) = setup(&["ACGTTTTTTACG"], 3);
        // With marker_selection_probability 1.0 every position is a marker,
        // so ordinal i sits at position i: ordinal 0 to ordinal 5 is an
        // offset of 5, over k=3, leaving real sequence to span.
        let edge = one_transition_edge(0, 1, 0, 5);
        let ec = edge_consensus(&edge, &store, &table, 3, 100);
        assert_eq!(ec.mode, EdgeConsensusMode::Spanning);
        assert!(!ec.sequence.is_empty());
    }

    #[test]
    fn edge_consensus_short_circuits_to_the_shortest_interval_when_pathologically_long() {
        let (_dir, store, table) = setup(&["ACGTTTTTTACG"], 3);
        let edge = MarkerGraphEdge {
            source: 0,
            target: 1,
            transitions: vec![
                (OrientedReadId::new(0, 0), 0, 9), // long interval: positions 3..9, 6 bases
                (OrientedReadId::new(0, 0), 0, 5), // short interval: positions 3..5, 2 bases
            ],
            removal: 0,
        };
        let ec = edge_consensus(&edge, &store, &table, 3, 4);
        assert_eq!(ec.mode, EdgeConsensusMode::Spanning);
        assert_eq!(ec.sequence.len(), 2);
    }
}
