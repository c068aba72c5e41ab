use bitvec::slice::BitSlice;
use bitvec::vec::BitVec;

/// Remembers which blocks of a ledger have at least one vacant slot.
///
/// Insertion always goes to the lowest-positioned block with room, which keeps pure append
/// sequences in insertion order and concentrates live elements towards the front of the ledger
/// (leaving whole blocks at the back empty and easy to release).
///
/// The lowest position is cached, so reading it is O(1). The cache only needs to be recomputed
/// when the cached block itself fills up, in which case we scan forward through the bit set,
/// as no block before the cached one can have room.
#[derive(Debug, Default)]
pub(crate) struct FreeBlockIndex {
    /// One bit per ledger position, set if that block has a vacant slot.
    has_room: BitVec,

    /// Lowest position with its bit set, if any.
    lowest: Option<usize>,
}

impl FreeBlockIndex {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Position of the lowest block with a vacant slot, or `None` if every block is full.
    #[must_use]
    pub(crate) fn lowest(&self) -> Option<usize> {
        self.lowest
    }

    /// Number of blocks the index knows about.
    #[must_use]
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.has_room.len()
    }

    /// Registers a newly appended block. New blocks are empty, so they always have room.
    pub(crate) fn push_empty_block(&mut self) {
        let position = self.has_room.len();
        self.has_room.push(true);

        if self.lowest.is_none() {
            self.lowest = Some(position);
        }
    }

    /// Records that the block at `position` became full.
    ///
    /// # Panics
    ///
    /// Panics if `position` is not a known block.
    pub(crate) fn mark_full(&mut self, position: usize) {
        let had_room = self.has_room.replace(position, false);
        debug_assert!(had_room, "block {position} was marked full twice");

        if self.lowest == Some(position) {
            // Nothing before `position` has room, so the next candidate is after it.
            // Cannot overflow because that would imply more blocks than virtual memory.
            let start = position.wrapping_add(1);

            self.lowest = self
                .has_room
                .get(start..)
                .and_then(BitSlice::first_one)
                .map(|offset| start.wrapping_add(offset));
        }
    }

    /// Records that the block at `position` went from full to having a vacant slot.
    ///
    /// # Panics
    ///
    /// Panics if `position` is not a known block.
    pub(crate) fn mark_has_room(&mut self, position: usize) {
        let had_room = self.has_room.replace(position, true);
        debug_assert!(!had_room, "block {position} was marked as having room twice");

        if self.lowest.is_none_or(|lowest| position < lowest) {
            self.lowest = Some(position);
        }
    }

    /// Rebuilds the index from scratch, e.g. after blocks have been removed from the ledger.
    pub(crate) fn rebuild(&mut self, has_room: impl IntoIterator<Item = bool>) {
        self.has_room = has_room.into_iter().collect();
        self.lowest = self.has_room.first_one();
    }

    /// Forgets every block.
    pub(crate) fn clear(&mut self) {
        self.has_room.clear();
        self.lowest = None;
    }
}
