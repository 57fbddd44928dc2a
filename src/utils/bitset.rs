//! A bit vector for efficient set operations.
//!
//! Dataflow analyses and the dominance computation track sets of entities
//! identified by small integers (basic block ids, local variable slots).
//! This module provides a compact fixed-capacity bit set tuned for the
//! in-place union/intersection/difference operations those fixpoints perform.

/// A fixed-capacity bit vector for efficient set operations.
///
/// Used by the dominance analyzer (sets of block ids) and the live-store
/// analysis (sets of local slots). All binary operations require both
/// operands to have the same capacity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    /// The bits, 64 per word.
    words: Vec<u64>,
    /// Capacity in bits.
    len: usize,
}

impl BitSet {
    /// Creates an empty bit set able to hold `capacity` bits.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Creates a bit set with every bit set.
    #[must_use]
    pub fn full(capacity: usize) -> Self {
        let mut set = Self {
            words: vec![u64::MAX; capacity.div_ceil(64)],
            len: capacity,
        };
        set.mask_tail();
        set
    }

    /// Clears the unused bits of the last word.
    fn mask_tail(&mut self) {
        if !self.len.is_multiple_of(64) {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << (self.len % 64)) - 1;
            }
        }
    }

    /// Returns the capacity of this bit set in bits.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) {
        assert!(index < self.len, "bit index out of bounds");
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Clears the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn remove(&mut self, index: usize) {
        assert!(index < self.len, "bit index out of bounds");
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns `true` if the bit at `index` is set.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        assert!(index < self.len, "bit index out of bounds");
        (self.words[index / 64] >> (index % 64)) & 1 != 0
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears all bits.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Unions `other` into `self`, returning `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn union_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit set capacities differ");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let merged = *a | b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// Intersects `other` into `self`, returning `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit set capacities differ");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let merged = *a & b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// Removes every bit of `other` from `self`, returning `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit set capacities differ");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let merged = *a & !b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// Returns `true` if every set bit of `self` is also set in `other`.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    #[must_use]
    pub fn subset_of(&self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit set capacities differ");
        self.words.iter().zip(&other.words).all(|(a, b)| a & !b == 0)
    }

    /// Returns an iterator over the indices of set bits, in increasing order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the set bits in a [`BitSet`].
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    word_idx: usize,
    current: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            if self.word_idx >= self.set.words.len() {
                return None;
            }
            self.current = self.set.words[self.word_idx];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_contains() {
        let mut set = BitSet::new(130);
        assert!(set.is_empty());

        set.insert(0);
        set.insert(64);
        set.insert(129);
        assert_eq!(set.count(), 3);
        assert!(set.contains(64));
        assert!(!set.contains(63));

        set.remove(64);
        assert!(!set.contains(64));
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn full_masks_tail_bits() {
        let set = BitSet::full(70);
        assert_eq!(set.count(), 70);
        assert!(set.contains(69));
    }

    #[test]
    fn union_intersect_difference() {
        let mut a = BitSet::new(100);
        let mut b = BitSet::new(100);
        a.insert(1);
        a.insert(2);
        b.insert(2);
        b.insert(3);

        let mut u = a.clone();
        assert!(u.union_with(&b));
        assert_eq!(u.iter().collect::<Vec<_>>(), vec![1, 2, 3]);

        let mut i = a.clone();
        assert!(i.intersect_with(&b));
        assert_eq!(i.iter().collect::<Vec<_>>(), vec![2]);

        let mut d = a.clone();
        assert!(d.difference_with(&b));
        assert_eq!(d.iter().collect::<Vec<_>>(), vec![1]);

        // Idempotent re-application reports no change
        assert!(!u.union_with(&b));
    }

    #[test]
    fn subset_queries() {
        let mut small = BitSet::new(50);
        let mut big = BitSet::new(50);
        small.insert(10);
        big.insert(10);
        big.insert(20);

        assert!(small.subset_of(&big));
        assert!(!big.subset_of(&small));
        assert!(small.subset_of(&small));
    }

    #[test]
    fn iterator_spans_words() {
        let mut set = BitSet::new(200);
        for idx in [0, 63, 64, 65, 127, 128, 199] {
            set.insert(idx);
        }
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![0, 63, 64, 65, 127, 128, 199]
        );
    }
}
