//! LowHash candidate finder (§4.1).
//!
//! Finds candidate overlapping oriented-read pairs by locality-sensitive
//! hashing over sliding windows of `m` consecutive marker k-mer ids,
//! without ever comparing all pairs of reads directly.

use crate::balancer::AtomicCounters;
use crate::marker::MarkerTable;
use crate::read_store::{OrientedReadId, ReadId, ReadStore};
use rayon::prelude::*;
use std::collections::HashMap;

/// A strong, seedable, auditable 64-bit mixer (splitmix64). Not
/// cryptographic — the spec only asks for "any strong non-cryptographic
/// mixer" — but deterministic given the same seed, which the LowHash
/// iterations rely on for reproducibility.
#[inline]
pub fn mix64(x: u64) -> u64 {
    let x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1311_1EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Witness {
    pub ordinal0: u32,
    pub ordinal1: u32,
}

/// Unordered pair of read ids, canonicalized with `read0 < read1`, plus the
/// same-strand flag and the deduplicated witness ordinals that justified
/// the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub read0: ReadId,
    pub read1: ReadId,
    pub same_strand: bool,
    pub witnesses: Vec<Witness>,
}

struct FeatureHit {
    oriented_read: OrientedReadId,
    ordinal: u32,
    low_hash: u64,
    bucket: u32,
}

/// Run the full LowHash computation and return the set of candidate
/// oriented-read pairs that collided on at least `min_frequency` distinct
/// feature witnesses across all iterations.
#[allow(clippy::too_many_arguments)]
pub fn find_candidates(
    read_store: &ReadStore,
    marker_table: &MarkerTable,
    m: usize,
    hash_fraction: f64,
    iterations: usize,
    log2_bucket_count: u32,
    max_bucket_size: usize,
    min_frequency: usize,
    seed: u64,
) -> Vec<Candidate> {
    let read_count = read_store.read_count() as ReadId;
    if read_count == 0 || m == 0 {
        return Vec::new();
    }

    let threshold = (hash_fraction.clamp(0.0, 1.0) * u64::MAX as f64) as u64;
    let bucket_count = 1usize << log2_bucket_count;
    let bucket_mask = (bucket_count as u64) - 1;

    // (canonical pair, same_strand) -> set of witnesses seen so far.
    let mut aggregated: HashMap<(ReadId, ReadId, bool), Vec<Witness>> = HashMap::new();

    for iteration in 0..iterations {
        let iter_seed = mix64(seed ^ iteration as u64);
        let hits = collect_feature_hits(
            read_store,
            marker_table,
            read_count,
            m,
            threshold,
            iter_seed,
            bucket_mask,
        );
        for (pair, witness) in emit_candidates_from_hits(hits, bucket_count, max_bucket_size) {
            aggregated.entry(pair).or_default().push(witness);
        }
    }

    let mut out = Vec::new();
    for ((read0, read1, same_strand), mut witnesses) in aggregated {
        witnesses.sort_unstable_by_key(|w| (w.ordinal0, w.ordinal1));
        witnesses.dedup();
        if witnesses.len() >= min_frequency {
            out.push(Candidate { read0, read1, same_strand, witnesses });
        }
    }
    out
}

fn collect_feature_hits(
    read_store: &ReadStore,
    marker_table: &MarkerTable,
    read_count: ReadId,
    m: usize,
    threshold: u64,
    iter_seed: u64,
    bucket_mask: u64,
) -> Vec<FeatureHit> {
    (0..read_count)
        .into_par_iter()
        .flat_map(|read_id| {
            let len_bases = read_store.len_bases(read_id);
            let mut local = Vec::new();
            for strand in 0..2u8 {
                let oriented = OrientedReadId::new(read_id, strand);
                let markers = marker_table.markers(oriented, len_bases);
                if markers.len() < m {
                    continue;
                }
                for window_start in 0..=(markers.len() - m) {
                    let window = &markers[window_start..window_start + m];
                    let mut h = iter_seed;
                    for marker in window {
                        h = mix64(h ^ marker.kmer_id);
                    }
                    if h < threshold {
                        let bucket = (mix64(iter_seed ^ h) & bucket_mask) as u32;
                        local.push(FeatureHit {
                            oriented_read: oriented,
                            ordinal: window_start as u32,
                            low_hash: h,
                            bucket,
                        });
                    }
                }
            }
            local
        })
        .collect()
}

/// Group hits into buckets (discarding oversized ones), then within each
/// surviving bucket group by exact low-hash value and emit one candidate
/// witness per pair of distinct oriented reads sharing that value.
///
/// Bucket placement follows §5's two-pass atomic sizing discipline instead
/// of a single global sort: pass 1 counts hits per bucket in parallel, a
/// prefix sum over those counts gives each bucket a fixed slice of a flat
/// output array, and pass 2 walks the hits once more, using a second
/// [`AtomicCounters`] purely as a per-bucket write cursor into that
/// preallocated slice.
fn emit_candidates_from_hits(
    hits: Vec<FeatureHit>,
    bucket_count: usize,
    max_bucket_size: usize,
) -> Vec<((ReadId, ReadId, bool), Witness)> {
    let sizes = AtomicCounters::new(bucket_count);
    hits.par_iter().for_each(|h| {
        sizes.increment(h.bucket as usize);
    });

    let mut offsets = vec![0usize; bucket_count + 1];
    for b in 0..bucket_count {
        offsets[b + 1] = offsets[b] + sizes.get(b);
    }
    let total = offsets[bucket_count];

    let mut placed: Vec<Option<FeatureHit>> = (0..total).map(|_| None).collect();
    let cursors = AtomicCounters::new(bucket_count);
    for hit in hits.into_iter() {
        let b = hit.bucket as usize;
        let local = cursors.increment(b);
        placed[offsets[b] + local] = Some(hit);
    }
    let mut flat: Vec<FeatureHit> = placed.into_iter().map(|h| h.expect("every slot filled by pass 2")).collect();

    let mut out = Vec::new();
    for b in 0..bucket_count {
        let lo = offsets[b];
        let hi = offsets[b + 1];
        let bucket_size = hi - lo;
        if bucket_size > max_bucket_size {
            continue;
        }
        flat[lo..hi].sort_unstable_by_key(|h| (h.low_hash, h.oriented_read.value()));
        let mut run_start = lo;
        while run_start < hi {
            let low_hash = flat[run_start].low_hash;
            let mut run_end = run_start;
            while run_end < hi && flat[run_end].low_hash == low_hash {
                run_end += 1;
            }
            for i in run_start..run_end {
                for j in (i + 1)..run_end {
                    if let Some(entry) = make_candidate(&flat[i], &flat[j]) {
                        out.push(entry);
                    }
                }
            }
            run_start = run_end;
        }
    }
    out
}

fn make_candidate(
    a: &FeatureHit,
    b: &FeatureHit,
) -> Option<((ReadId, ReadId, bool), Witness)> {
    let ra = a.oriented_read.read_id();
    let rb = b.oriented_read.read_id();
    if ra == rb {
        // Self-pairs and a pair whose second element is the reverse
        // complement of the first are both excluded.
        return None;
    }
    let same_strand = a.oriented_read.strand() == b.oriented_read.strand();
    let ((read0, read1), (ordinal0, ordinal1)) = if ra < rb {
        ((ra, rb), (a.ordinal, b.ordinal))
    } else {
        ((rb, ra), (b.ordinal, a.ordinal))
    };
    Some(((read0, read1, same_strand), Witness { ordinal0, ordinal1 }))
}
