//! The marker graph builder (§4.4): union the markers that alignments say
//! correspond to the same genomic position, compact the surviving classes
//! into vertices, then connect them with edges derived from each oriented
//! read's marker order.
//!
//! Runs in six phases, in order: union, find, size filter, bad-vertex
//! filter, reverse-complement pairing, edges.

use super::{MarkerGraph, MarkerGraphEdge, MarkerGraphVertex, VertexId};
use crate::alignment::Alignment;
use crate::config::MarkerGraphConfig;
use crate::disjoint_set::AtomicDisjointSets;
use crate::marker::MarkerTable;
use crate::read_graph::ReadGraphEdge;
use crate::read_store::{OrientedReadId, ReadId, ReadStore};
use fxhash::FxHashMap;

/// Maps every `(oriented_read_id, ordinal)` marker instance to a dense
/// `u64` id, laid out per read as `[strand0 block][strand1 block]`, so
/// that the disjoint-set array can be a flat `Vec`.
struct MarkerIndex {
    base: Vec<u64>,
    counts: Vec<u32>,
}

impl MarkerIndex {
    fn build(marker_table: &MarkerTable, read_count: usize) -> Self {
        let mut base = Vec::with_capacity(read_count + 1);
        let mut counts = Vec::with_capacity(read_count);
        let mut offset = 0u64;
        base.push(0);
        for read_id in 0..read_count as ReadId {
            let n = marker_table.marker_count(read_id);
            counts.push(n);
            offset += 2 * n as u64;
            base.push(offset);
        }
        MarkerIndex { base, counts }
    }

    fn total(&self) -> u64 {
        *self.base.last().unwrap_or(&0)
    }

    fn to_global(&self, oriented: OrientedReadId, ordinal: u32) -> u64 {
        let r = oriented.read_id() as usize;
        let n = self.counts[r] as u64;
        let block = if oriented.strand() == 0 { 0 } else { n };
        self.base[r] + block + ordinal as u64
    }

    fn from_global(&self, g: u64) -> (OrientedReadId, u32) {
        let r = self.base.partition_point(|&b| b <= g) - 1;
        let offset = g - self.base[r];
        let n = self.counts[r] as u64;
        if offset < n {
            (OrientedReadId::new(r as ReadId, 0), offset as u32)
        } else {
            (OrientedReadId::new(r as ReadId, 1), (offset - n) as u32)
        }
    }

    fn twin_global(&self, g: u64) -> u64 {
        let (oriented, ordinal) = self.from_global(g);
        let n = self.counts[oriented.read_id() as usize];
        self.to_global(oriented.twin(), n - 1 - ordinal)
    }
}

pub fn build(
    read_store: &ReadStore,
    marker_table: &MarkerTable,
    edges: &[(ReadGraphEdge, Alignment)],
    config: &MarkerGraphConfig,
) -> Result<MarkerGraph, crate::error::EngineError> {
    let read_count = read_store.read_count();
    let index = MarkerIndex::build(marker_table, read_count);
    let total = index.total();
    if total == 0 {
        return Err(crate::error::EngineError::NoVertices);
    }

    // Phase 1: union, batched across a load balancer so the parallel union
    // loop doesn't allocate a task per edge (§5).
    let dsu = AtomicDisjointSets::new(total as usize);
    let balancer = crate::balancer::LoadBalancer::new(edges.len() as u64, 64);
    balancer
        .for_each_batch(|begin, end| {
            for (edge, alignment) in &edges[begin as usize..end as usize] {
                let oriented0 = OrientedReadId::new(edge.read0, 0);
                let oriented1 = OrientedReadId::new(edge.read1, if edge.same_strand { 0 } else { 1 });
                for &(o0, o1) in &alignment.ordinals {
                    let a = index.to_global(oriented0, o0);
                    let b = index.to_global(oriented1, o1);
                    dsu.union(a, b);
                }
            }
            Ok(())
        })
        .expect("union batches never fail");

    // Phase 2: find.
    let roots = dsu.roots();

    // Phase 3: size filter.
    let mut members_by_root: FxHashMap<u64, Vec<u64>> = FxHashMap::default();
    for (g, &root) in roots.iter().enumerate() {
        members_by_root.entry(root).or_default().push(g as u64);
    }
    members_by_root.retain(|_, members| {
        let n = members.len() as u32;
        n >= config.min_coverage && n <= config.max_coverage
    });

    // Phase 4: bad-vertex filter.
    members_by_root.retain(|_, members| {
        let mut reads: Vec<ReadId> = members
            .iter()
            .map(|&g| index.from_global(g).0.read_id())
            .collect();
        reads.sort_unstable();
        reads.windows(2).all(|w| w[0] != w[1])
    });

    // Phase 5: reverse-complement pairing. A surviving class must have a
    // surviving twin class, or it is dropped too — the marker graph is
    // always reverse-complement symmetric.
    let surviving_roots: Vec<u64> = members_by_root.keys().copied().collect();
    let mut consistent_roots = Vec::new();
    for &root in &surviving_roots {
        let members = &members_by_root[&root];
        let twin_root = dsu.find(index.twin_global(members[0]));
        if members_by_root.contains_key(&twin_root) {
            consistent_roots.push(root);
        }
    }
    consistent_roots.sort_unstable();

    let mut vertex_of_root: FxHashMap<u64, VertexId> = FxHashMap::default();
    for (i, &root) in consistent_roots.iter().enumerate() {
        vertex_of_root.insert(root, i as VertexId);
    }

    let mut vertices: Vec<MarkerGraphVertex> = consistent_roots
        .iter()
        .map(|root| {
            let markers = members_by_root[root]
                .iter()
                .map(|&g| index.from_global(g))
                .collect();
            MarkerGraphVertex { markers, reverse_complement: VertexId::MAX }
        })
        .collect();
    for (i, &root) in consistent_roots.iter().enumerate() {
        let members = &members_by_root[&root];
        let twin_root = dsu.find(index.twin_global(members[0]));
        vertices[i].reverse_complement = vertex_of_root[&twin_root];
    }

    // Phase 6: edges, from each oriented read's marker-ordinal sequence.
    let mut vertex_of: FxHashMap<u64, VertexId> = FxHashMap::default();
    for (&root, &vid) in &vertex_of_root {
        for &g in &members_by_root[&root] {
            vertex_of.insert(g, vid);
        }
    }

    let mut transitions: FxHashMap<(VertexId, VertexId), Vec<(OrientedReadId, u32, u32)>> =
        FxHashMap::default();
    for read_id in 0..read_count as ReadId {
        let n = index.counts[read_id as usize];
        for strand in 0..2u8 {
            let oriented = OrientedReadId::new(read_id, strand);
            let mut prev: Option<(u32, VertexId)> = None;
            for ordinal in 0..n {
                let g = index.to_global(oriented, ordinal);
                let Some(&vid) = vertex_of.get(&g) else {
                    continue;
                };
                if let Some((prev_ordinal, prev_vid)) = prev {
                    transitions
                        .entry((prev_vid, vid))
                        .or_default()
                        .push((oriented, prev_ordinal, ordinal));
                }
                prev = Some((ordinal, vid));
            }
        }
    }

    let edges_out: Vec<MarkerGraphEdge> = transitions
        .into_iter()
        .map(|((source, target), mut t)| {
            t.sort_unstable_by_key(|(o, ord, _)| (o.value(), *ord));
            MarkerGraphEdge { source, target, transitions: t, removal: 0 }
        })
        .collect();

    Ok(MarkerGraph { vertices, edges: edges_out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{AlignmentParams, AlignmentSummary};
    use crate::kmer::KmerTable;
    use crate::read_graph::AlignmentSummaryOnReads;
    use crate::read_store::RunLengthRead;

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
    fn two_identical_reads_produce_a_linear_chain() {
        let (_dir, store, table) = setup(&["ACGACGTAA", "ACGACGTAA"], 3);
        let m0 = table.forward_markers(0);
        let m1 = table.forward_markers(1);
        let params = AlignmentParams { max_skip: 1, max_marker_frequency: 100 };
        let alignment = crate::alignment::align(&m0, &m1, params);
        let summary = AlignmentSummary::from_alignment(&alignment).unwrap();
        let edge = ReadGraphEdge {
            read0: 0,
            read1: 1,
            same_strand: true,
            cross_strand: false,
            summary: AlignmentSummaryOnReads {
                summary,
                n0: m0.len() as u32,
                n1: m1.len() as u32,
            },
        };
        let config = MarkerGraphConfig {
            min_coverage: 2,
            max_coverage: 100,
            low_coverage_threshold: 1,
            high_coverage_threshold: 50,
            max_distance: 10,
            edge_marker_skip_threshold: 2,
        };
        let graph = build(&store, &table, &[(edge, alignment)], &config).unwrap();
        assert_eq!(graph.vertex_count(), m0.len());
        assert_eq!(graph.edge_count(), m0.len() - 1);
        for v in &graph.vertices {
            assert!(v.is_internally_consistent());
        }
    }

    #[test]
    fn every_vertex_has_a_reverse_complement_partner() {
        let (_dir, store, table) = setup(&["ACGACGTAA", "ACGACGTAA"], 3);
        let m0 = table.forward_markers(0);
        let m1 = table.forward_markers(1);
        let params = AlignmentParams { max_skip: 1, max_marker_frequency: 100 };
        let alignment = crate::alignment::align(&m0, &m1, params);
        let summary = AlignmentSummary::from_alignment(&alignment).unwrap();
        let edge = ReadGraphEdge {
            read0: 0,
            read1: 1,
            same_strand: true,
            cross_strand: false,
            summary: AlignmentSummaryOnReads { summary, n0: m0.len() as u32, n1: m1.len() as u32 },
        };
        let config = MarkerGraphConfig {
            min_coverage: 2,
            max_coverage: 100,
            low_coverage_threshold: 1,
            high_coverage_threshold: 50,
            max_distance: 10,
            edge_marker_skip_threshold: 2,
        };
        let graph = build(&store, &table, &[(edge, alignment)], &config).unwrap();
        for (i, v) in graph.vertices.iter().enumerate() {
            let partner = &graph.vertices[v.reverse_complement as usize];
            assert_eq!(partner.reverse_complement as usize, i);
        }
    }
}
