//! The marker table (§3, §6): per-read ordered sequence of
//! `(k-mer id, position, ordinal)` entries where the k-mer id belongs to
//! the precomputed marker set. Strand-1 (reverse complement) markers are
//! never materialized — they are derived on the fly from the strand-0
//! table, per §6's "orientation applied on read, not materialized".

use crate::kmer::{build_kmer_ids, reverse_complement_kmer_id, KmerTable};
use crate::read_store::{OrientedReadId, ReadId, ReadStore};
use crate::storage::MappedVec;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub kmer_id: u64,
    /// Position in the oriented read, in run-length coordinates, of the
    /// first base of the k-mer window.
    pub position: u32,
    pub ordinal: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct MarkerRaw {
    kmer_id: u64,
    position: u32,
    _pad: u32,
}

/// Forward-strand markers for every read, flattened with an offset table —
/// identical shape to `ReadStore`.
pub struct MarkerTable {
    markers: MappedVec<MarkerRaw>,
    offsets: MappedVec<u64>,
    pub k: u32,
}

impl MarkerTable {
    pub fn build(
        prefix: &Path,
        reads: &ReadStore,
        kmers: &KmerTable,
    ) -> Result<Self, crate::error::EngineError> {
        let k = kmers.k;
        let mut flat = Vec::new();
        let mut offsets = Vec::with_capacity(reads.read_count() + 1);
        offsets.push(0u64);
        for read_id in 0..reads.read_count() as ReadId {
            let seq = reads.bases_forward(read_id);
            let ids = build_kmer_ids(seq, k);
            let mut ordinal = 0u32;
            for (position, &kmer_id) in ids.iter().enumerate() {
                if kmers.is_marker(kmer_id) {
                    flat.push(MarkerRaw { kmer_id, position: position as u32, _pad: 0 });
                    ordinal += 1;
                }
            }
            let _ = ordinal;
            offsets.push(flat.len() as u64);
        }
        let markers =
            MappedVec::write_new(crate::storage::entity_path(prefix, "Markers"), &flat)?;
        let offsets =
            MappedVec::write_new(crate::storage::entity_path(prefix, "MarkerOffsets"), &offsets)?;
        Ok(MarkerTable { markers, offsets, k })
    }

    pub fn open(prefix: &Path, k: u32) -> Result<Self, crate::error::EngineError> {
        Ok(MarkerTable {
            markers: MappedVec::open(crate::storage::entity_path(prefix, "Markers"))?,
            offsets: MappedVec::open(crate::storage::entity_path(prefix, "MarkerOffsets"))?,
            k,
        })
    }

    fn bounds(&self, read_id: ReadId) -> (usize, usize) {
        let i = read_id as usize;
        (self.offsets[i] as usize, self.offsets[i + 1] as usize)
    }

    /// Number of markers in the given read (same for both strands).
    pub fn marker_count(&self, read_id: ReadId) -> u32 {
        let (a, b) = self.bounds(read_id);
        (b - a) as u32
    }

    fn forward_slice(&self, read_id: ReadId) -> &[MarkerRaw] {
        let (a, b) = self.bounds(read_id);
        &self.markers.as_slice()[a..b]
    }

    /// Forward-strand markers, zero-copy.
    pub fn forward_markers(&self, read_id: ReadId) -> Vec<Marker> {
        self.forward_slice(read_id)
            .iter()
            .enumerate()
            .map(|(ordinal, m)| Marker {
                kmer_id: m.kmer_id,
                position: m.position,
                ordinal: ordinal as u32,
            })
            .collect()
    }

    /// Markers for an oriented read. Strand 1 is derived: ordinal `o` in a
    /// read of `n` markers maps to forward ordinal `n-1-o`; its k-mer id is
    /// the reverse complement of the forward k-mer id at that ordinal; its
    /// position is measured from the reverse-complemented read's start.
    pub fn markers(&self, oriented_read_id: OrientedReadId, read_len_bases: usize) -> Vec<Marker> {
        let read_id = oriented_read_id.read_id();
        let fwd = self.forward_slice(read_id);
        if oriented_read_id.strand() == 0 {
            return fwd
                .iter()
                .enumerate()
                .map(|(ordinal, m)| Marker {
                    kmer_id: m.kmer_id,
                    position: m.position,
                    ordinal: ordinal as u32,
                })
                .collect();
        }
        let n = fwd.len();
        let k = self.k as usize;
        (0..n)
            .map(|ordinal| {
                let forward_ordinal = n - 1 - ordinal;
                let fm = fwd[forward_ordinal];
                let rc_id = reverse_complement_kmer_id(fm.kmer_id, self.k);
                let position = read_len_bases - k - fm.position as usize;
                Marker {
                    kmer_id: rc_id,
                    position: position as u32,
                    ordinal: ordinal as u32,
                }
            })
            .collect()
    }

    /// The twin ordinal of ordinal `o` in a read of `n` markers: `n-1-o`.
    pub fn twin_ordinal(marker_count: u32, ordinal: u32) -> u32 {
        marker_count - 1 - ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::KmerTable;
    use crate::read_store::{ReadStore, RunLengthRead};

    fn build_all(seqs: &[&str], k: u32, prob: f64) -> (tempfile::TempDir, ReadStore, KmerTable, MarkerTable) {
        let dir = tempfile::tempdir().unwrap();
        let reads: Vec<RunLengthRead> = seqs
            .iter()
            .map(|s| RunLengthRead { bases: s.bytes().collect(), repeat_counts: vec![1; s.len()] })
            .collect();
        let store = ReadStore::build(dir.path(), &reads).unwrap();
        let kmers = KmerTable::build(dir.path(), k, prob, 7).unwrap();
        let table = MarkerTable::build(dir.path(), &store, &kmers).unwrap();
        (dir, store, kmers, table)
    }

    #[test]
    fn all_kmers_marker_yields_one_marker_per_window() {
        let (_dir, _store, _kmers, table) = build_all(&["ACGACGT"], 3, 1.0);
        assert_eq!(table.marker_count(0), 5); // len-k+1 = 7-3+1
        let fwd = table.forward_markers(0);
        assert_eq!(fwd.len(), 5);
        for (i, m) in fwd.iter().enumerate() {
            assert_eq!(m.ordinal, i as u32);
        }
    }

    #[test]
    fn twin_ordinal_is_involutive() {
        let n = 5;
        for o in 0..n {
            assert_eq!(MarkerTable::twin_ordinal(n, MarkerTable::twin_ordinal(n, o)), o);
        }
    }

    #[test]
    fn reverse_strand_markers_mirror_forward_when_all_are_markers() {
        let (_dir, _store, _kmers, table) = build_all(&["ACGACGT"], 3, 1.0);
        let fwd = table.markers(crate::read_store::OrientedReadId::new(0, 0), 7);
        let rev = table.markers(crate::read_store::OrientedReadId::new(0, 1), 7);
        assert_eq!(fwd.len(), rev.len());
        // The first reverse marker is the reverse complement of the last forward marker.
        let k = 3;
        assert_eq!(
            rev[0].kmer_id,
            reverse_complement_kmer_id(fwd.last().unwrap().kmer_id, k)
        );
    }
}
