//! GC pointer maps.
//!
//! A pointer map describes a fixed-size block of memory as a sequence of
//! pointer-sized cells, each either holding a traced object reference or
//! not. Maps are immutable once built and compare structurally.
//!
//! ```text
//!   offset:  0    8    16   24   32
//!           +----+----+----+----+
//!           | GC |    | GC | GC |     -> "1011"
//!           +----+----+----+----+
//! ```

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

const BITS_PER_WORD: usize = u64::BITS as usize;

/// Immutable bitmap of GC reference cells.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GcPointerMap {
    num_cells: usize,
    words: SmallVec<[u64; 2]>,
}

impl GcPointerMap {
    /// A map with zero cells.
    pub fn empty() -> Self {
        Self {
            num_cells: 0,
            words: SmallVec::new(),
        }
    }

    /// Build a map from one flag per cell.
    pub fn from_cells(cells: &[bool]) -> Self {
        let mut words: SmallVec<[u64; 2]> = SmallVec::new();
        words.resize(cells.len().div_ceil(BITS_PER_WORD), 0);
        for (index, _) in cells.iter().enumerate().filter(|(_, set)| **set) {
            words[index / BITS_PER_WORD] |= 1 << (index % BITS_PER_WORD);
        }
        Self {
            num_cells: cells.len(),
            words,
        }
    }

    /// Number of pointer-sized cells covered.
    #[inline]
    pub fn size(&self) -> usize {
        self.num_cells
    }

    /// Whether the cell at `index` holds a GC reference.
    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        index < self.num_cells && self.words[index / BITS_PER_WORD] & (1 << (index % BITS_PER_WORD)) != 0
    }

    /// Number of GC reference cells.
    pub fn num_set_cells(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether no cell holds a GC reference.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterate over the indices of GC reference cells, in ascending order.
    pub fn set_cells(&self) -> SetCellIter<'_> {
        SetCellIter {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl Ord for GcPointerMap {
    fn cmp(&self, other: &Self) -> Ordering {
        self.num_cells
            .cmp(&other.num_cells)
            .then_with(|| self.words.iter().cmp(other.words.iter()))
    }
}

impl PartialOrd for GcPointerMap {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GcPointerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in 0..self.num_cells {
            f.write_str(if self.is_set(index) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for GcPointerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcPointerMap({})", self)
    }
}

// =============================================================================
// SetCellIter
// =============================================================================

/// Iterator over set cells of a [`GcPointerMap`].
#[derive(Debug, Clone)]
pub struct SetCellIter<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for SetCellIter<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let trailing = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1; // Clear lowest set bit
                return Some(self.word_index * BITS_PER_WORD + trailing);
            }
            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds a [`GcPointerMap`] by marking GC references at byte offsets.
#[derive(Debug, Clone)]
pub struct GcPointerMapBuilder {
    pointer_size: usize,
    cells: Vec<bool>,
}

impl GcPointerMapBuilder {
    /// Builder for a block of `byte_size` bytes on a target with `pointer_size`-byte pointers.
    ///
    /// A trailing partial cell is rounded up to a full cell.
    pub fn new(byte_size: usize, pointer_size: usize) -> Self {
        debug_assert!(pointer_size > 0);
        Self {
            pointer_size,
            cells: vec![false; byte_size.div_ceil(pointer_size)],
        }
    }

    /// Mark a GC reference at `offset`, which must be pointer-aligned.
    pub fn mark(&mut self, offset: usize) -> &mut Self {
        debug_assert_eq!(offset % self.pointer_size, 0, "unaligned GC reference");
        let index = offset / self.pointer_size;
        assert!(index < self.cells.len(), "GC reference at {} outside block", offset);
        self.cells[index] = true;
        self
    }

    /// Finish building.
    pub fn build(&self) -> GcPointerMap {
        GcPointerMap::from_cells(&self.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prints_one_char_per_cell() {
        let map = GcPointerMap::from_cells(&[true, false, true, true]);
        assert_eq!(map.to_string(), "1011");
        assert_eq!(GcPointerMap::empty().to_string(), "");
    }

    #[test]
    fn test_structural_equality() {
        let a = GcPointerMap::from_cells(&[true, false]);
        let b = GcPointerMap::from_cells(&[true, false]);
        let longer = GcPointerMap::from_cells(&[true, false, false]);
        assert_eq!(a, b);
        // Different lengths never compare equal, even with trailing zeros
        assert_ne!(a, longer);
        assert!(a < longer);
    }

    #[test]
    fn test_set_cells_across_words() {
        let mut cells = vec![false; 130];
        cells[0] = true;
        cells[63] = true;
        cells[64] = true;
        cells[129] = true;
        let map = GcPointerMap::from_cells(&cells);
        assert_eq!(map.set_cells().collect::<Vec<_>>(), vec![0, 63, 64, 129]);
        assert_eq!(map.num_set_cells(), 4);
        assert!(!map.is_set(130));
    }

    #[test]
    fn test_builder_marks_by_offset() {
        let mut builder = GcPointerMapBuilder::new(28, 8);
        builder.mark(0).mark(16);
        let map = builder.build();
        assert_eq!(map.size(), 4);
        assert_eq!(map.to_string(), "1010");
    }
}
