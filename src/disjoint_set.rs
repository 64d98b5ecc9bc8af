//! Lock-free disjoint-set union over marker-graph vertex candidates (§4.4,
//! §9). Each element's parent and rank are packed into one `AtomicU64` so
//! that `union` and `find` only ever need single-word CAS, letting the
//! marker graph's union phase run across all alignments in parallel
//! without a global lock.

use std::sync::atomic::{AtomicU64, Ordering};

const PARENT_BITS: u32 = 40;
const PARENT_MASK: u64 = (1u64 << PARENT_BITS) - 1;

#[inline]
fn pack(parent: u64, rank: u32) -> u64 {
    (parent & PARENT_MASK) | ((rank as u64) << PARENT_BITS)
}

#[inline]
fn unpack(word: u64) -> (u64, u32) {
    (word & PARENT_MASK, (word >> PARENT_BITS) as u32)
}

pub struct AtomicDisjointSets {
    words: Vec<AtomicU64>,
}

impl AtomicDisjointSets {
    pub fn new(n: usize) -> Self {
        let words = (0..n as u64).map(|i| AtomicU64::new(pack(i, 0))).collect();
        AtomicDisjointSets { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Find with path halving: every visited node is pointed directly at
    /// its grandparent, which converges to the root under repeated calls
    /// without needing to lock a whole path.
    pub fn find(&self, x: u64) -> u64 {
        let mut current = x;
        loop {
            let word = self.words[current as usize].load(Ordering::Acquire);
            let (parent, _) = unpack(word);
            if parent == current {
                return current;
            }
            let grandparent_word = self.words[parent as usize].load(Ordering::Acquire);
            let (grandparent, _) = unpack(grandparent_word);
            if grandparent != parent {
                let (_, rank) = unpack(word);
                let _ = self.words[current as usize].compare_exchange(
                    word,
                    pack(grandparent, rank),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
            }
            current = parent;
        }
    }

    /// Union by rank via CAS retry loop. Returns `true` if this call
    /// performed the merge (the two elements were in different sets).
    pub fn union(&self, a: u64, b: u64) -> bool {
        loop {
            let ra = self.find(a);
            let rb = self.find(b);
            if ra == rb {
                return false;
            }

            let word_a = self.words[ra as usize].load(Ordering::Acquire);
            let word_b = self.words[rb as usize].load(Ordering::Acquire);
            let (_, rank_a) = unpack(word_a);
            let (_, rank_b) = unpack(word_b);

            let (child, child_word, new_parent, parent_word, parent_rank) = if rank_a < rank_b {
                (ra, word_a, rb, word_b, rank_b)
            } else {
                (rb, word_b, ra, word_a, rank_a)
            };

            if self.words[child as usize]
                .compare_exchange(child_word, pack(new_parent, unpack(child_word).1), Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            if rank_a == rank_b {
                let bumped_rank = parent_rank + 1;
                let _ = self.words[new_parent as usize].compare_exchange(
                    parent_word,
                    pack(new_parent, bumped_rank),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
            }
            return true;
        }
    }

    /// Materialize the final root id for every element, after all unions
    /// have completed. Not safe to call concurrently with `union`.
    pub fn roots(&self) -> Vec<u64> {
        (0..self.words.len() as u64).map(|i| self.find(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_are_their_own_root() {
        let dsu = AtomicDisjointSets::new(5);
        for i in 0..5 {
            assert_eq!(dsu.find(i), i);
        }
    }

    #[test]
    fn union_merges_sets() {
        let dsu = AtomicDisjointSets::new(5);
        assert!(dsu.union(0, 1));
        assert!(dsu.union(1, 2));
        assert_eq!(dsu.find(0), dsu.find(2));
        assert_ne!(dsu.find(0), dsu.find(3));
    }

    #[test]
    fn repeated_union_is_idempotent() {
        let dsu = AtomicDisjointSets::new(3);
        assert!(dsu.union(0, 1));
        assert!(!dsu.union(0, 1));
        assert!(!dsu.union(1, 0));
    }

    #[test]
    fn concurrent_unions_converge_to_one_set() {
        use rayon::prelude::*;
        let n = 200;
        let dsu = AtomicDisjointSets::new(n);
        (0..n - 1).into_par_iter().for_each(|i| {
            dsu.union(i as u64, (i + 1) as u64);
        });
        let roots = dsu.roots();
        assert!(roots.windows(2).all(|w| w[0] == w[1]));
    }
}
