use std::any::type_name;
use std::num::NonZero;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::{Block, FreeBlockIndex};

/// Process-wide source of ledger identities.
static NEXT_LEDGER_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies one ledger for the lifetime of the process.
///
/// Cursors carry the identity of the ledger that issued them, so a cursor handed to the wrong
/// container is detected instead of being interpreted against unrelated blocks. The identity
/// travels with the ledger when storage is swapped or taken.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct LedgerId(u64);

impl LedgerId {
    fn next() -> Self {
        // Relaxed is enough: we only need uniqueness, not ordering with other memory.
        Self(NEXT_LEDGER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Position of a live element inside a ledger: (block position, slot index).
pub(crate) type Coordinates = (usize, usize);

/// The ordered collection of all blocks owned by one storage instance.
///
/// Blocks are kept in allocation order. The ledger is append-only except for [`shrink()`][1]
/// and [`clear()`][2], which remove blocks without reordering the survivors. Because removal
/// shifts the positions of later blocks, anything that needs to refer to a block across
/// mutations uses the block serial, which [`locate()`][3] turns back into a position.
///
/// [1]: Self::shrink
/// [2]: Self::clear
/// [3]: Self::locate
#[derive(Debug)]
pub(crate) struct Ledger<T> {
    id: LedgerId,

    blocks: Vec<Block<T>>,

    block_capacity: NonZero<usize>,

    /// Serial to assign to the next appended block. Never rewinds, not even on clear, so a
    /// serial identifies at most one block over the ledger's lifetime.
    next_serial: u64,

    free_blocks: FreeBlockIndex,
}

impl<T> Ledger<T> {
    #[must_use]
    pub(crate) fn new(block_capacity: NonZero<usize>) -> Self {
        Self {
            id: LedgerId::next(),
            blocks: Vec::new(),
            block_capacity,
            next_serial: 0,
            free_blocks: FreeBlockIndex::new(),
        }
    }

    #[must_use]
    pub(crate) fn id(&self) -> LedgerId {
        self.id
    }

    #[must_use]
    pub(crate) fn block_capacity(&self) -> NonZero<usize> {
        self.block_capacity
    }

    #[must_use]
    pub(crate) fn blocks(&self) -> &[Block<T>] {
        &self.blocks
    }

    #[must_use]
    pub(crate) fn blocks_mut(&mut self) -> &mut [Block<T>] {
        &mut self.blocks
    }

    #[must_use]
    pub(crate) fn into_blocks(self) -> Vec<Block<T>> {
        self.blocks
    }

    #[must_use]
    pub(crate) fn block(&self, position: usize) -> Option<&Block<T>> {
        self.blocks.get(position)
    }

    #[must_use]
    pub(crate) fn block_mut(&mut self, position: usize) -> Option<&mut Block<T>> {
        self.blocks.get_mut(position)
    }

    #[must_use]
    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of slots, live and vacant, across all blocks.
    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.blocks
            .len()
            .checked_mul(self.block_capacity.get())
            .expect("overflow here would mean the ledger holds more slots than virtual memory can fit")
    }

    /// Appends a new, empty block and returns its position.
    pub(crate) fn append_block(&mut self) -> usize {
        let serial = self.next_serial;

        self.next_serial = self
            .next_serial
            .checked_add(1)
            .expect("a ledger cannot allocate 2^64 blocks in any realistic lifetime");

        self.blocks.push(Block::new(serial, self.block_capacity));
        self.free_blocks.push_empty_block();

        trace!(
            serial,
            block_capacity = self.block_capacity.get(),
            block_count = self.blocks.len(),
            item_type = type_name::<T>(),
            "appended block"
        );

        self.blocks
            .len()
            .checked_sub(1)
            .expect("we just pushed a block, so len >= 1")
    }

    /// Position of the lowest block with a vacant slot, or `None` if every block is full.
    #[must_use]
    pub(crate) fn find_free_block(&self) -> Option<usize> {
        self.free_blocks.lowest()
    }

    /// Moves `value` into a vacant slot, appending a block first if every block is full.
    pub(crate) fn insert(&mut self, value: T) -> Coordinates {
        let position = self
            .find_free_block()
            .unwrap_or_else(|| self.append_block());

        let block = self
            .blocks
            .get_mut(position)
            .expect("the free block index only refers to existing blocks");

        let slot = block.allocate(value);

        if block.is_full() {
            self.free_blocks.mark_full(position);
        }

        (position, slot)
    }

    /// Takes the element out of a live slot.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates do not refer to a live slot.
    pub(crate) fn release(&mut self, (position, slot): Coordinates) -> T {
        let Some(block) = self.blocks.get_mut(position) else {
            panic!(
                "release() block position {position} is out of bounds in ledger of {}",
                type_name::<T>()
            );
        };

        let was_full = block.is_full();
        let value = block.release(slot);

        if was_full {
            self.free_blocks.mark_has_room(position);
        }

        value
    }

    /// Finds the current position of the block with the given serial.
    ///
    /// The hint is the position the block had when the caller last saw it. It is correct unless
    /// blocks before it have since been removed, in which case we fall back to a binary search
    /// (serials are sorted because the ledger never reorders blocks).
    #[must_use]
    pub(crate) fn locate(&self, serial: u64, hint: usize) -> Option<usize> {
        if self
            .blocks
            .get(hint)
            .is_some_and(|block| block.serial() == serial)
        {
            return Some(hint);
        }

        self.blocks
            .binary_search_by_key(&serial, Block::serial)
            .ok()
    }

    /// The first live slot at or after the given coordinates, crossing block boundaries.
    #[must_use]
    pub(crate) fn first_live_at_or_after(&self, (position, slot): Coordinates) -> Option<Coordinates> {
        let mut from_slot = slot;

        for (offset, block) in self.blocks.get(position..)?.iter().enumerate() {
            if let Some(found) = block.next_live(from_slot) {
                let found_position = position
                    .checked_add(offset)
                    .expect("bounded by the block count");

                return Some((found_position, found));
            }

            from_slot = 0;
        }

        None
    }

    /// The last live slot strictly before the given coordinates, crossing block boundaries.
    ///
    /// A position equal to the block count means "from the very end".
    #[must_use]
    pub(crate) fn last_live_before(&self, (position, slot): Coordinates) -> Option<Coordinates> {
        let end = position.min(self.blocks.len());

        if let Some(found) = self.blocks.get(end).and_then(|block| block.prev_live(slot)) {
            return Some((end, found));
        }

        self.blocks
            .get(..end)?
            .iter()
            .enumerate()
            .rev()
            .find_map(|(candidate, block)| {
                block
                    .prev_live(block.capacity())
                    .map(|found| (candidate, found))
            })
    }

    /// Releases every block that holds no live elements, returning how many were released.
    ///
    /// Blocks with live elements are neither moved nor resized, so element addresses stay put.
    pub(crate) fn shrink(&mut self) -> usize {
        let before = self.blocks.len();

        self.blocks.retain(|block| !block.is_empty());

        let removed = before
            .checked_sub(self.blocks.len())
            .expect("retain() cannot add blocks");

        if removed > 0 {
            self.free_blocks
                .rebuild(self.blocks.iter().map(|block| !block.is_full()));
        }

        removed
    }

    /// Drops every block and every live element in them.
    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
        self.free_blocks.clear();
    }

    /// Creates an empty ledger with a fresh identity and the same block capacity.
    #[must_use]
    pub(crate) fn empty_like(&self) -> Self {
        Self::new(self.block_capacity)
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(all(test, debug_assertions))]
    pub(crate) fn integrity_check(&self) {
        assert_eq!(
            self.free_blocks.len(),
            self.blocks.len(),
            "free block index tracks {} blocks but ledger has {} in ledger of {}",
            self.free_blocks.len(),
            self.blocks.len(),
            type_name::<T>()
        );

        let expected_lowest = self.blocks.iter().position(|block| !block.is_full());

        assert_eq!(
            self.free_blocks.lowest(),
            expected_lowest,
            "free block index disagrees with block contents in ledger of {}",
            type_name::<T>()
        );

        assert!(
            self.blocks
                .windows(2)
                .all(|pair| matches!(pair, [a, b] if a.serial() < b.serial())),
            "block serials are not strictly increasing in ledger of {}",
            type_name::<T>()
        );

        for block in &self.blocks {
            block.integrity_check();
        }
    }
}
