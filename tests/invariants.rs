//! Universally-quantified invariants from the specification, checked with
//! randomized inputs rather than a handful of hand-picked examples.

use proptest::prelude::*;
use shasta_core::alignment::AlignmentSummary;
use shasta_core::kmer::reverse_complement_kmer_id;
use shasta_core::read_store::OrientedReadId;

proptest! {
    #[test]
    fn oriented_read_twin_is_involutive(read_id in 0u32..(1 << 30), strand in 0u8..2) {
        let o = OrientedReadId::new(read_id, strand);
        prop_assert_eq!(o.twin().twin(), o);
        prop_assert_ne!(o.twin(), o);
    }

    #[test]
    fn reverse_complement_kmer_id_is_involutive(k in 1u32..16, id in 0u64..(1u64 << 30)) {
        let id = id & ((1u64 << (2 * k)) - 1);
        let rc = reverse_complement_kmer_id(id, k);
        prop_assert_eq!(reverse_complement_kmer_id(rc, k), id);
    }

    #[test]
    fn alignment_summary_swap_is_involutive(
        a0 in 0u32..1000, a1 in 0u32..1000, b0 in 0u32..1000, b1 in 0u32..1000, count in 1u32..1000
    ) {
        let s = AlignmentSummary { first: (a0, a1), last: (b0, b1), marker_count: count };
        prop_assert_eq!(s.swap().swap(), s);
    }

    #[test]
    fn alignment_summary_reverse_complement_is_involutive(
        a0 in 0u32..1000, a1 in 0u32..1000, b0 in 0u32..2000, b1 in 0u32..2000, count in 1u32..1000
    ) {
        let s = AlignmentSummary { first: (a0, a1), last: (b0, b1), marker_count: count };
        let (n0, n1) = (2000u32, 2000u32);
        prop_assert_eq!(s.reverse_complement(n0, n1).reverse_complement(n0, n1), s);
    }
}
