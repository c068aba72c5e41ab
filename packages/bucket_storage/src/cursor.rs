use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::LedgerId;

/// Block serial used by the end-of-storage sentinel. Real serials never get this high.
const END_SERIAL: u64 = u64::MAX;

/// A position in a [`BucketStorage`][1]: either a live element or the end sentinel.
///
/// Cursors are small `Copy` values that do not borrow the storage. They are interpreted by the
/// storage that produced them, which is what makes it possible to keep a cursor around while
/// mutating the storage, for example to continue a traversal through an erase:
///
/// ```rust
/// use bucket_storage::BucketStorage;
///
/// let mut storage: BucketStorage<u32> = (1..=6).collect();
///
/// let mut cursor = storage.begin();
/// while cursor != storage.end() {
///     if storage[cursor] % 2 == 0 {
///         cursor = storage.erase(cursor);
///     } else {
///         cursor = storage.next(cursor);
///     }
/// }
///
/// assert_eq!(storage.iter().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
/// ```
///
/// # Ordering
///
/// Cursors from the same storage are totally ordered by traversal position: `a < b` if and only
/// if `a` is reached before `b` when walking forward from [`begin()`][2]. The [`end()`][3]
/// cursor sorts after every element cursor.
///
/// # Validity
///
/// Inserting never invalidates a cursor. A cursor stops denoting an element when that element
/// is erased or removed, when its block is released by [`shrink_to_fit()`][4] (which only
/// releases empty blocks, so this can only affect cursors to already erased elements) or when
/// the storage is cleared. The storage detects such stale cursors and reports them via
/// [`CursorError`][5] or a panic, depending on the method used.
///
/// [1]: crate::BucketStorage
/// [2]: crate::BucketStorage::begin
/// [3]: crate::BucketStorage::end
/// [4]: crate::BucketStorage::shrink_to_fit
/// [5]: crate::CursorError
#[derive(Clone, Copy, Debug)]
pub struct Cursor {
    ledger: LedgerId,

    /// Serial of the block holding the element, or [`END_SERIAL`] for the end sentinel.
    block: u64,

    /// Where the block was in the ledger when the cursor was issued. Stays correct until blocks
    /// before it are released, after which the ledger falls back to a search by serial.
    block_hint: usize,

    slot: usize,

    /// Generation of the slot when the cursor was issued. Not part of equality or ordering.
    generation: u32,
}

impl Cursor {
    #[must_use]
    pub(crate) fn new(
        ledger: LedgerId,
        block: u64,
        block_hint: usize,
        slot: usize,
        generation: u32,
    ) -> Self {
        debug_assert_ne!(block, END_SERIAL, "block serial collides with the end sentinel");

        Self {
            ledger,
            block,
            block_hint,
            slot,
            generation,
        }
    }

    #[must_use]
    pub(crate) fn end(ledger: LedgerId) -> Self {
        Self {
            ledger,
            block: END_SERIAL,
            block_hint: usize::MAX,
            slot: 0,
            generation: 0,
        }
    }

    /// Whether this is the end sentinel, which does not denote an element.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage = BucketStorage::<u32>::new();
    /// assert!(storage.end().is_end());
    ///
    /// let cursor = storage.insert(42);
    /// assert!(!cursor.is_end());
    /// ```
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.block == END_SERIAL
    }

    #[must_use]
    pub(crate) fn ledger(&self) -> LedgerId {
        self.ledger
    }

    #[must_use]
    pub(crate) fn block(&self) -> u64 {
        self.block
    }

    #[must_use]
    pub(crate) fn block_hint(&self) -> usize {
        self.block_hint
    }

    #[must_use]
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }

    fn key(&self) -> (LedgerId, u64, usize) {
        (self.ledger, self.block, self.slot)
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Cursor {}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for Cursor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}
