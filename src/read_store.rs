//! The read store (§3, §6): run-length-encoded read sequences plus
//! per-base repeat counts, indexed by read id, immutable after load.
//!
//! Loading from FASTA/runnie files is the excluded upstream collaborator's
//! job (§1). This module only owns the in-memory/mmap representation and
//! the oriented-read accessors every later phase builds on.

use crate::error::EngineError;
use crate::storage::MappedVec;
use std::path::Path;

pub type ReadId = u32;

/// `(read_id << 1) | strand`; strand 1 denotes reverse complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrientedReadId(pub u32);

impl OrientedReadId {
    #[inline]
    pub fn new(read_id: ReadId, strand: u8) -> Self {
        debug_assert!(strand <= 1);
        OrientedReadId((read_id << 1) | strand as u32)
    }

    #[inline]
    pub fn read_id(self) -> ReadId {
        self.0 >> 1
    }

    #[inline]
    pub fn strand(self) -> u8 {
        (self.0 & 1) as u8
    }

    #[inline]
    pub fn is_reverse(self) -> bool {
        self.strand() == 1
    }

    /// The reverse-complement counterpart of this oriented read. Involutive.
    #[inline]
    pub fn twin(self) -> OrientedReadId {
        OrientedReadId(self.0 ^ 1)
    }

    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }
}

/// A single run-length-encoded read: an ordered sequence of base symbols
/// (A/C/G/T, no homopolymer runs) plus a parallel sequence of repeat
/// counts (>= 1, each representable in u8).
#[derive(Debug, Clone)]
pub struct RunLengthRead {
    pub bases: Vec<u8>,
    pub repeat_counts: Vec<u8>,
}

impl RunLengthRead {
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Validates the "same length" invariant and rejects any read whose
    /// repeat-count encoding would have overflowed u8 before construction
    /// (the overflow itself is caught by the caller building this value;
    /// this only re-asserts the invariant holds on disk).
    pub fn validate(&self, read_id: ReadId) -> Result<(), EngineError> {
        if self.bases.len() != self.repeat_counts.len() {
            return Err(EngineError::MarkerOrderingViolated { read_id });
        }
        for &c in &self.repeat_counts {
            if c == 0 {
                return Err(EngineError::RepeatCountOverflow {
                    read_id,
                    count: 0,
                });
            }
        }
        Ok(())
    }

    fn complement(b: u8) -> u8 {
        match b {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            other => other,
        }
    }

    /// Reverse-complement orientation is applied on read, never
    /// materialized into a second stored copy (§6).
    pub fn base_at(&self, position: usize, strand: u8) -> u8 {
        if strand == 0 {
            self.bases[position]
        } else {
            Self::complement(self.bases[self.len() - 1 - position])
        }
    }

    pub fn repeat_count_at(&self, position: usize, strand: u8) -> u8 {
        if strand == 0 {
            self.repeat_counts[position]
        } else {
            self.repeat_counts[self.len() - 1 - position]
        }
    }
}

/// Indexed, immutable-after-load collection of reads, backed by two mmap
/// regions per §6: a flat base/repeat-count byte arena and an offset table.
pub struct ReadStore {
    bases: MappedVec<u8>,
    repeat_counts: MappedVec<u8>,
    offsets: MappedVec<u64>, // len() == read_count + 1
}

impl ReadStore {
    /// Build the store from an already-validated sequence of reads and
    /// publish it under `prefix`. This is the load phase's one writer.
    pub fn build(prefix: &Path, reads: &[RunLengthRead]) -> Result<Self, EngineError> {
        for (i, r) in reads.iter().enumerate() {
            r.validate(i as ReadId)?;
        }
        let mut bases = Vec::new();
        let mut repeat_counts = Vec::new();
        let mut offsets = Vec::with_capacity(reads.len() + 1);
        offsets.push(0u64);
        for r in reads {
            bases.extend_from_slice(&r.bases);
            repeat_counts.extend_from_slice(&r.repeat_counts);
            offsets.push(bases.len() as u64);
        }
        let bases = MappedVec::write_new(crate::storage::entity_path(prefix, "ReadBases"), &bases)?;
        let repeat_counts = MappedVec::write_new(
            crate::storage::entity_path(prefix, "ReadRepeatCounts"),
            &repeat_counts,
        )?;
        let offsets =
            MappedVec::write_new(crate::storage::entity_path(prefix, "ReadOffsets"), &offsets)?;
        Ok(ReadStore { bases, repeat_counts, offsets })
    }

    pub fn open(prefix: &Path) -> Result<Self, EngineError> {
        Ok(ReadStore {
            bases: MappedVec::open(crate::storage::entity_path(prefix, "ReadBases"))?,
            repeat_counts: MappedVec::open(crate::storage::entity_path(
                prefix,
                "ReadRepeatCounts",
            ))?,
            offsets: MappedVec::open(crate::storage::entity_path(prefix, "ReadOffsets"))?,
        })
    }

    pub fn read_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    fn bounds(&self, read_id: ReadId) -> (usize, usize) {
        let i = read_id as usize;
        (self.offsets[i] as usize, self.offsets[i + 1] as usize)
    }

    pub fn len_bases(&self, read_id: ReadId) -> usize {
        let (a, b) = self.bounds(read_id);
        b - a
    }

    pub fn base(&self, read_id: ReadId, strand: u8, position: usize) -> u8 {
        let (a, b) = self.bounds(read_id);
        let slice = &self.bases.as_slice()[a..b];
        if strand == 0 {
            slice[position]
        } else {
            RunLengthRead::complement(slice[b - a - 1 - position])
        }
    }

    pub fn repeat_count(&self, read_id: ReadId, strand: u8, position: usize) -> u8 {
        let (a, b) = self.bounds(read_id);
        let slice = &self.repeat_counts.as_slice()[a..b];
        if strand == 0 {
            slice[position]
        } else {
            slice[b - a - 1 - position]
        }
    }

    pub fn bases_forward(&self, read_id: ReadId) -> &[u8] {
        let (a, b) = self.bounds(read_id);
        &self.bases.as_slice()[a..b]
    }

    pub fn repeat_counts_forward(&self, read_id: ReadId) -> &[u8] {
        let (a, b) = self.bounds(read_id);
        &self.repeat_counts.as_slice()[a..b]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(seq: &str) -> RunLengthRead {
        RunLengthRead {
            bases: seq.bytes().collect(),
            repeat_counts: vec![1; seq.len()],
        }
    }

    #[test]
    fn oriented_read_id_packs_and_twins() {
        let o = OrientedReadId::new(5, 1);
        assert_eq!(o.read_id(), 5);
        assert_eq!(o.strand(), 1);
        assert_eq!(o.twin().twin(), o);
        assert_ne!(o.twin(), o);
    }

    #[test]
    fn reverse_complement_is_applied_on_read() {
        let r = read("ACGT");
        assert_eq!(r.base_at(0, 0), b'A');
        assert_eq!(r.base_at(0, 1), b'A'); // rc of T at the far end
        assert_eq!(r.base_at(3, 1), b'T'); // rc of A
    }

    #[test]
    fn store_round_trips_multiple_reads() {
        let dir = tempfile::tempdir().unwrap();
        let reads = vec![read("ACGACGT"), read("TTTT"), read("")];
        let store = ReadStore::build(dir.path(), &reads).unwrap();
        assert_eq!(store.read_count(), 3);
        assert_eq!(store.bases_forward(0), b"ACGACGT");
        assert_eq!(store.len_bases(2), 0);

        let reopened = ReadStore::open(dir.path()).unwrap();
        assert_eq!(reopened.bases_forward(1), b"TTTT");
    }

    #[test]
    fn rejects_zero_repeat_count() {
        let bad = RunLengthRead {
            bases: vec![b'A'],
            repeat_counts: vec![0],
        };
        assert!(bad.validate(0).is_err());
    }
}
