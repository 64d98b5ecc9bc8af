//! The read graph (§4.3): an undirected graph whose vertices are reads and
//! whose edges are alignments that passed the post-filter. Used to cap
//! each read's degree to the best `max_alignment_count` edges and to flag
//! chimeric reads before the marker graph is built.

use crate::alignment::AlignmentSummary;
use crate::read_store::ReadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadGraphEdge {
    pub read0: ReadId,
    pub read1: ReadId,
    pub same_strand: bool,
    /// Set when this edge and its partner together form a cycle that
    /// bridges strand classes — both a same-strand and an opposite-strand
    /// edge exist between the same pair of reads, so following the
    /// strand-twin relation around the pair closes a loop that crosses
    /// from one strand's component into the other's. Detected by
    /// [`ReadGraph::detect_cross_strand_edges`].
    pub cross_strand: bool,
    pub summary: AlignmentSummaryOnReads,
}

/// An [`AlignmentSummary`] together with the two reads' marker counts, so
/// that trims and chimera detection can be computed without re-fetching
/// marker tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentSummaryOnReads {
    pub summary: AlignmentSummary,
    pub n0: u32,
    pub n1: u32,
}

impl AlignmentSummaryOnReads {
    /// Range of ordinals on read0 covered by the alignment, as a fraction
    /// of read0's marker count.
    fn range0(&self) -> (u32, u32) {
        (self.summary.first.0, self.summary.last.0)
    }

    fn range1(&self) -> (u32, u32) {
        (self.summary.first.1, self.summary.last.1)
    }
}

pub struct ReadGraph {
    pub edges: Vec<ReadGraphEdge>,
    read_count: usize,
}

/// Two half-open ordinal ranges on the same read overlap if neither lies
/// entirely before the other.
fn ranges_overlap(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

impl ReadGraph {
    pub fn new(read_count: usize, edges: Vec<ReadGraphEdge>) -> Self {
        ReadGraph { edges, read_count }
    }

    /// Keep, for every read, only its `max_alignment_count` edges with the
    /// highest marker count (ties broken by the neighboring read id, for
    /// determinism). Mirrors the teacher's degree-capping used to bound
    /// per-vertex fan-out before the expensive union-find pass.
    pub fn cap_degree(&mut self, max_alignment_count: usize) {
        if max_alignment_count == 0 {
            self.edges.clear();
            return;
        }
        let mut per_read: Vec<Vec<usize>> = vec![Vec::new(); self.read_count];
        for (idx, e) in self.edges.iter().enumerate() {
            per_read[e.read0 as usize].push(idx);
            per_read[e.read1 as usize].push(idx);
        }

        let mut keep = vec![false; self.edges.len()];
        for incident in &mut per_read {
            incident.sort_unstable_by_key(|&idx| {
                let e = &self.edges[idx];
                (std::cmp::Reverse(e.summary.summary.marker_count), e.read0, e.read1)
            });
            for &idx in incident.iter().take(max_alignment_count) {
                keep[idx] = true;
            }
        }

        let mut kept = Vec::new();
        for (idx, e) in self.edges.drain(..).enumerate() {
            if keep[idx] {
                kept.push(e);
            }
        }
        self.edges = kept;
    }

    /// Flag every edge between a pair of reads that has both a same-strand
    /// and an opposite-strand edge between them: the co-existence of both
    /// strand relations between the same two reads means following the
    /// strand-twin relation around the pair closes a cycle that bridges
    /// strand classes (§4.3), and every edge on that pair participates in
    /// it.
    pub fn detect_cross_strand_edges(&mut self) {
        let mut strands_seen: std::collections::HashMap<(ReadId, ReadId), (bool, bool)> = std::collections::HashMap::new();
        for e in &self.edges {
            let key = (e.read0.min(e.read1), e.read0.max(e.read1));
            let entry = strands_seen.entry(key).or_insert((false, false));
            if e.same_strand {
                entry.0 = true;
            } else {
                entry.1 = true;
            }
        }
        for e in &mut self.edges {
            let key = (e.read0.min(e.read1), e.read0.max(e.read1));
            let (same, opposite) = strands_seen[&key];
            e.cross_strand = same && opposite;
        }
    }

    /// A read is chimeric if two of its surviving edges cover disjoint
    /// ordinal ranges on that read, each spanning at least
    /// `min_chimeric_span_fraction` of its marker count: the read looks
    /// like the concatenation of two unrelated genomic segments rather
    /// than one aligned span with a single set of neighbors.
    pub fn find_chimeric_reads(&self, min_chimeric_span_fraction: f64) -> Vec<ReadId> {
        let mut per_read: Vec<Vec<(u32, u32, u32)>> = vec![Vec::new(); self.read_count];
        for e in &self.edges {
            let (lo0, hi0) = e.summary.range0();
            let (lo1, hi1) = e.summary.range1();
            per_read[e.read0 as usize].push((lo0, hi0, e.summary.n0));
            per_read[e.read1 as usize].push((lo1, hi1, e.summary.n1));
        }

        let mut chimeric = Vec::new();
        for (read_id, ranges) in per_read.iter().enumerate() {
            let significant: Vec<(u32, u32)> = ranges
                .iter()
                .filter(|(lo, hi, n)| {
                    if *n == 0 {
                        return false;
                    }
                    let span = (*hi - *lo + 1) as f64 / *n as f64;
                    span >= min_chimeric_span_fraction
                })
                .map(|(lo, hi, _)| (*lo, *hi))
                .collect();
            'outer: for i in 0..significant.len() {
                for j in (i + 1)..significant.len() {
                    if !ranges_overlap(significant[i], significant[j]) {
                        chimeric.push(read_id as ReadId);
                        break 'outer;
                    }
                }
            }
        }
        chimeric
    }
}
