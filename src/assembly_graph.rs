//! The assembly graph (§4.6): maximal linear chains of marker-graph edges,
//! with each chain paired with its reverse-complement twin (or flagged
//! self-complementary when a chain is its own twin).

use crate::marker_graph::{MarkerGraph, VertexId};
use fxhash::FxHashMap;

pub type ChainId = u32;

#[derive(Debug, Clone)]
pub struct Chain {
    /// Marker-graph edge indices, in traversal order.
    pub edges: Vec<usize>,
    pub reverse_complement: ChainId,
}

impl Chain {
    pub fn is_self_complementary(&self, id: ChainId) -> bool {
        self.reverse_complement == id
    }

    pub fn total_coverage(&self, marker_graph: &MarkerGraph) -> u64 {
        self.edges.iter().map(|&i| marker_graph.edges[i].coverage() as u64).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyGraph {
    pub chains: Vec<Chain>,
}

/// A marker-graph vertex is "mid-chain" when it has exactly one in-edge
/// and one out-edge: any edge ending there continues the same chain as the
/// edge before it, rather than starting a new one.
fn is_mid_chain(v: VertexId, in_deg: &[u32], out_deg: &[u32]) -> bool {
    in_deg[v as usize] == 1 && out_deg[v as usize] == 1
}

pub fn build(marker_graph: &MarkerGraph) -> AssemblyGraph {
    let n = marker_graph.vertices.len();
    let mut out_deg = vec![0u32; n];
    let mut in_deg = vec![0u32; n];
    for (_, e) in marker_graph.live_edges() {
        out_deg[e.source as usize] += 1;
        in_deg[e.target as usize] += 1;
    }
    let out_edges = marker_graph.out_edges();

    let mut visited = vec![false; marker_graph.edges.len()];
    let mut chains = Vec::new();

    let walk = |start: usize, visited: &mut Vec<bool>| -> Vec<usize> {
        let mut edges = vec![start];
        visited[start] = true;
        let mut cur = marker_graph.edges[start].target;
        while is_mid_chain(cur, &in_deg, &out_deg) {
            let next_edge = out_edges[cur as usize][0];
            if visited[next_edge] {
                break; // closed into a pure cycle
            }
            edges.push(next_edge);
            visited[next_edge] = true;
            cur = marker_graph.edges[next_edge].target;
        }
        edges
    };

    // Branch-anchored chains: start at every live edge whose source is not mid-chain.
    for (start, e) in marker_graph.live_edges() {
        if visited[start] {
            continue;
        }
        if is_mid_chain(e.source, &in_deg, &out_deg) {
            continue;
        }
        let edges = walk(start, &mut visited);
        chains.push(Chain { edges, reverse_complement: ChainId::MAX });
    }

    // Remaining live edges are isolated cycles (every vertex on them
    // mid-chain); each becomes its own chain, walked from an arbitrary entry
    // edge.
    for (start, _) in marker_graph.live_edges() {
        if visited[start] {
            continue;
        }
        let edges = walk(start, &mut visited);
        chains.push(Chain { edges, reverse_complement: ChainId::MAX });
    }

    pair_reverse_complements(marker_graph, &mut chains);
    AssemblyGraph { chains }
}

fn pair_reverse_complements(marker_graph: &MarkerGraph, chains: &mut [Chain]) {
    let edge_index_by_endpoints: FxHashMap<(VertexId, VertexId), usize> =
        marker_graph.live_edges().map(|(i, e)| ((e.source, e.target), i)).collect();
    let mut edge_to_chain: FxHashMap<usize, (ChainId, usize)> = FxHashMap::default();
    for (cid, chain) in chains.iter().enumerate() {
        for (pos, &e) in chain.edges.iter().enumerate() {
            edge_to_chain.insert(e, (cid as ChainId, pos));
        }
    }

    for cid in 0..chains.len() {
        if chains[cid].reverse_complement != ChainId::MAX {
            continue;
        }
        let last_edge = *chains[cid].edges.last().unwrap();
        let le = &marker_graph.edges[last_edge];
        let rc_source = marker_graph.vertices[le.target as usize].reverse_complement;
        let rc_target = marker_graph.vertices[le.source as usize].reverse_complement;
        let Some(&rc_edge_idx) = edge_index_by_endpoints.get(&(rc_source, rc_target)) else {
            continue;
        };
        let Some(&(twin_cid, twin_pos)) = edge_to_chain.get(&rc_edge_idx) else {
            continue;
        };
        if twin_pos != 0 {
            continue;
        }
        chains[cid].reverse_complement = twin_cid;
        chains[twin_cid as usize].reverse_complement = cid as ChainId;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker_graph::{MarkerGraphEdge, MarkerGraphVertex};
    use crate::read_store::OrientedReadId;

    fn vertex(rc: VertexId) -> MarkerGraphVertex {
        MarkerGraphVertex { markers: vec![(OrientedReadId::new(0, 0), 0)], reverse_complement: rc }
    }

    fn edge(source: VertexId, target: VertexId) -> MarkerGraphEdge {
        MarkerGraphEdge { source, target, transitions: vec![(OrientedReadId::new(0, 0), 0, 1)], removal: 0 }
    }

    #[test]
    fn linear_path_becomes_one_chain() {
        // Vertices 0..4 paired reverse-complement with 7..3 (mirror layout).
        let graph = MarkerGraph {
            vertices: vec![vertex(7), vertex(6), vertex(5), vertex(4), vertex(3), vertex(2), vertex(1), vertex(0)],
            edges: vec![
                edge(0, 1),
                edge(1, 2),
                edge(2, 3),
                // twin path, reversed and vertex-mirrored
                edge(4, 5),
                edge(5, 6),
                edge(6, 7),
            ],
        };
        let assembly_graph = build(&graph);
        assert_eq!(assembly_graph.chains.len(), 2);
        for chain in &assembly_graph.chains {
            assert_eq!(chain.edges.len(), 3);
        }
    }

    #[test]
    fn chains_are_paired_as_reverse_complement_twins() {
        let graph = MarkerGraph {
            vertices: vec![vertex(7), vertex(6), vertex(5), vertex(4), vertex(3), vertex(2), vertex(1), vertex(0)],
            edges: vec![edge(0, 1), edge(1, 2), edge(2, 3), edge(4, 5), edge(5, 6), edge(6, 7)],
        };
        let assembly_graph = build(&graph);
        for (cid, chain) in assembly_graph.chains.iter().enumerate() {
            let twin = chain.reverse_complement;
            assert_ne!(twin, ChainId::MAX);
            assert_eq!(assembly_graph.chains[twin as usize].reverse_complement as usize, cid);
        }
    }

    #[test]
    fn branch_point_splits_into_separate_chains() {
        // 0 -> 1 -> {2, 3}: vertex 1 has out-degree 2, so the chain through
        // it ends at 1 and two new chains begin.
        let graph = MarkerGraph {
            vertices: vec![vertex(0), vertex(1), vertex(2), vertex(3)],
            edges: vec![edge(0, 1), edge(1, 2), edge(1, 3)],
        };
        let assembly_graph = build(&graph);
        assert_eq!(assembly_graph.chains.len(), 3);
    }
}
