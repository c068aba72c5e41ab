use std::any::type_name;
use std::num::NonZero;
use std::ops::{Index, IndexMut};
use std::{fmt, mem, thread};

use tracing::debug;

use crate::error::Result;
use crate::{
    BucketStorageBuilder, Coordinates, Cursor, CursorError, Cursors, DropPolicy, IntoIter, Iter,
    IterMut, Ledger,
};

/// A block-segmented container whose elements never move.
///
/// Elements are stored in blocks of [`block_capacity()`][1] slots each. Inserting an element
/// moves it into a vacant slot of the first block that has one (or a new block at the end if
/// all blocks are full) and returns a [`Cursor`] to it. Erasing an element vacates its slot
/// without touching any other element. Both operations take constant time regardless of how
/// many elements the storage holds.
///
/// Because elements are never relocated, a reference to an element stays valid for as long as
/// the element lives, and a [`Cursor`] to an element stays valid until that particular element
/// is erased.
///
/// # Traversal order
///
/// Traversal visits blocks in the order they were allocated and, within a block, slots in index
/// order. A sequence of pure inserts is therefore traversed in insertion order. Once elements
/// have been erased, later inserts fill the vacated slots first, so the traversal order no
/// longer matches insertion order.
///
/// There are two ways to traverse:
///
/// * Iterators: [`iter()`][2], [`iter_mut()`][3], [`cursors()`][4] and [`IntoIterator`]. These
///   borrow the storage for as long as they live.
/// * Cursors: [`begin()`][5], [`end()`][6], [`next()`][7], [`prev()`][8] and
///   [`advance_by()`][9]. Cursors do not borrow the storage, so they can be held across
///   mutations such as [`erase()`][10], which returns the cursor of the following element.
///
/// # Resource usage
///
/// The storage grows one block at a time as elements are added. Blocks are not released when
/// they become empty; use [`shrink_to_fit()`][11] to release empty blocks or [`clear()`][12] to
/// release everything.
///
/// # Example
///
/// ```rust
/// use bucket_storage::BucketStorage;
/// use new_zealand::nz;
///
/// let mut storage = BucketStorage::with_block_capacity(nz!(2));
///
/// storage.insert(3);
/// storage.insert(4);
/// storage.insert(5);
///
/// assert_eq!(storage.len(), 3);
/// assert_eq!(storage.capacity(), 4);
/// assert_eq!(storage[storage.begin()], 3);
/// assert_eq!(storage[storage.advance_by(storage.begin(), 2)], 5);
/// ```
///
/// [1]: Self::block_capacity
/// [2]: Self::iter
/// [3]: Self::iter_mut
/// [4]: Self::cursors
/// [5]: Self::begin
/// [6]: Self::end
/// [7]: Self::next
/// [8]: Self::prev
/// [9]: Self::advance_by
/// [10]: Self::erase
/// [11]: Self::shrink_to_fit
/// [12]: Self::clear
pub struct BucketStorage<T> {
    ledger: Ledger<T>,

    /// Number of live elements. The ledger could count them but not in O(1).
    len: usize,

    drop_policy: DropPolicy,
}

impl<T> BucketStorage<T> {
    #[must_use]
    pub(crate) fn new_inner(block_capacity: NonZero<usize>, drop_policy: DropPolicy) -> Self {
        Self {
            ledger: Ledger::new(block_capacity),
            len: 0,
            drop_policy,
        }
    }

    /// Creates a new [`BucketStorage`] with the default configuration.
    ///
    /// The storage starts empty, without any allocated blocks, and uses
    /// [`DEFAULT_BLOCK_CAPACITY`][1] slots per block.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage = BucketStorage::<String>::new();
    ///
    /// assert_eq!(storage.len(), 0);
    /// assert_eq!(storage.capacity(), 0);
    ///
    /// let cursor = storage.insert("Hello".to_string());
    /// assert_eq!(storage[cursor], "Hello");
    /// ```
    ///
    /// [1]: crate::DEFAULT_BLOCK_CAPACITY
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a new [`BucketStorage`] whose blocks each hold `block_capacity` elements.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    /// use new_zealand::nz;
    ///
    /// let mut storage = BucketStorage::with_block_capacity(nz!(20));
    /// storage.insert(1);
    ///
    /// assert_eq!(storage.len(), 1);
    /// assert_eq!(storage.capacity(), 20);
    /// ```
    #[must_use]
    pub fn with_block_capacity(block_capacity: NonZero<usize>) -> Self {
        Self::builder().block_capacity(block_capacity).build()
    }

    /// Starts building a new [`BucketStorage`].
    ///
    /// Use this when you want to customize the configuration beyond the block capacity.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::{BucketStorage, DropPolicy};
    ///
    /// let storage = BucketStorage::<u32>::builder()
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    ///
    /// assert!(storage.is_empty());
    /// ```
    pub fn builder() -> BucketStorageBuilder<T> {
        BucketStorageBuilder::new()
    }

    /// The number of elements in the storage.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the storage holds no elements. An empty storage may still hold capacity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of slots, occupied or not, across all allocated blocks.
    ///
    /// This is always a multiple of [`block_capacity()`][1] and at least [`len()`][2].
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    /// use new_zealand::nz;
    ///
    /// let mut storage = BucketStorage::with_block_capacity(nz!(4));
    /// assert_eq!(storage.capacity(), 0);
    ///
    /// for value in 0..5 {
    ///     storage.insert(value);
    /// }
    ///
    /// assert_eq!(storage.capacity(), 8);
    /// ```
    ///
    /// [1]: Self::block_capacity
    /// [2]: Self::len
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ledger.capacity()
    }

    /// The number of slots in every block of this storage.
    #[must_use]
    pub fn block_capacity(&self) -> NonZero<usize> {
        self.ledger.block_capacity()
    }

    /// The drop policy the storage was built with.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// Moves `value` into the storage and returns a cursor to it.
    ///
    /// The value is moved exactly once, into its final slot. To insert a copy of a value you
    /// want to keep, clone it at the call site: `storage.insert(value.clone())`.
    ///
    /// Inserting never invalidates cursors or references to other elements.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage = BucketStorage::new();
    ///
    /// let cursor = storage.insert(42);
    /// assert_eq!(storage[cursor], 42);
    /// assert_eq!(storage.len(), 1);
    /// ```
    pub fn insert(&mut self, value: T) -> Cursor {
        let coordinates = self.ledger.insert(value);

        self.len = self
            .len
            .checked_add(1)
            .expect("cannot hold more elements than virtual memory can fit");

        self.cursor_at(coordinates)
    }

    /// Erases the element at `cursor` and returns a cursor to the element that followed it in
    /// traversal order, or [`end()`][1] if there is none.
    ///
    /// The erased element is dropped. Only cursors to the erased element are invalidated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage: BucketStorage<u32> = (1..=3).collect();
    ///
    /// let after = storage.erase(storage.begin());
    /// assert_eq!(storage[after], 2);
    /// assert_eq!(storage.len(), 2);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the cursor does not denote a live element of this storage. See
    /// [`try_erase()`][2] for a non-panicking variant.
    ///
    /// [1]: Self::end
    /// [2]: Self::try_erase
    pub fn erase(&mut self, cursor: Cursor) -> Cursor {
        match self.try_erase(cursor) {
            Ok(next) => next,
            Err(error) => panic!(
                "erase({cursor:?}) failed in storage of {}: {error}",
                type_name::<T>()
            ),
        }
    }

    /// Erases the element at `cursor` and returns a cursor to the element that followed it in
    /// traversal order, or [`end()`][1] if there is none.
    ///
    /// Unlike [`erase()`][2], an unusable cursor is reported as an error and leaves the storage
    /// untouched.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::{BucketStorage, CursorError};
    ///
    /// let mut storage = BucketStorage::new();
    /// let cursor = storage.insert("a");
    ///
    /// assert_eq!(storage.try_erase(cursor), Ok(storage.end()));
    /// assert_eq!(storage.try_erase(cursor), Err(CursorError::VacantSlot));
    /// assert_eq!(storage.try_erase(storage.end()), Err(CursorError::End));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor is [`end()`][1], was issued by another storage, points
    /// into a released block or points to an element that has already been erased.
    ///
    /// [1]: Self::end
    /// [2]: Self::erase
    pub fn try_erase(&mut self, cursor: Cursor) -> Result<Cursor> {
        let coordinates = self.resolve(cursor)?;

        // The element is dropped here, after all our bookkeeping is consistent again.
        drop(self.release(coordinates));

        // The erased slot is vacant now, so searching from it finds the following element.
        Ok(self.cursor_at_or_after(coordinates))
    }

    /// Removes the element at `cursor` from the storage and returns it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage = BucketStorage::new();
    /// let cursor = storage.insert("Hello".to_string());
    ///
    /// let value = storage.remove(cursor);
    /// assert_eq!(value, "Hello");
    /// assert!(storage.is_empty());
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the cursor does not denote a live element of this storage.
    pub fn remove(&mut self, cursor: Cursor) -> T {
        match self.resolve(cursor) {
            Ok(coordinates) => self.release(coordinates),
            Err(error) => panic!(
                "remove({cursor:?}) failed in storage of {}: {error}",
                type_name::<T>()
            ),
        }
    }

    /// Gets a shared reference to the element at `cursor`, or `None` if the cursor does not
    /// denote a live element of this storage.
    ///
    /// Indexing with a cursor (`storage[cursor]`) is the panicking equivalent.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage = BucketStorage::new();
    /// let cursor = storage.insert(7);
    ///
    /// assert_eq!(storage.get(cursor), Some(&7));
    /// assert_eq!(storage.get(storage.end()), None);
    /// ```
    #[must_use]
    pub fn get(&self, cursor: Cursor) -> Option<&T> {
        let (position, slot) = self.resolve(cursor).ok()?;
        self.ledger.block(position)?.get(slot)
    }

    /// Gets an exclusive reference to the element at `cursor`, or `None` if the cursor does not
    /// denote a live element of this storage.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage = BucketStorage::new();
    /// let cursor = storage.insert("Hello".to_string());
    ///
    /// if let Some(value) = storage.get_mut(cursor) {
    ///     value.push_str(", World!");
    /// }
    ///
    /// assert_eq!(storage[cursor], "Hello, World!");
    /// ```
    #[must_use]
    pub fn get_mut(&mut self, cursor: Cursor) -> Option<&mut T> {
        let (position, slot) = self.resolve(cursor).ok()?;
        self.ledger.block_mut(position)?.get_mut(slot)
    }

    /// Checks whether `cursor` denotes a live element of this storage.
    ///
    /// # Errors
    ///
    /// Returns the reason the cursor cannot be used if it does not denote a live element.
    pub fn validate(&self, cursor: Cursor) -> Result<()> {
        self.resolve(cursor).map(|_| ())
    }

    /// A cursor to the first element in traversal order, or [`end()`][1] if the storage is
    /// empty.
    ///
    /// [1]: Self::end
    #[must_use]
    pub fn begin(&self) -> Cursor {
        self.cursor_at_or_after((0, 0))
    }

    /// The end sentinel: one past the last element in traversal order.
    ///
    /// It does not denote an element, compares greater than every element cursor of this
    /// storage and stays the same no matter how the storage is modified.
    #[must_use]
    pub fn end(&self) -> Cursor {
        Cursor::end(self.ledger.id())
    }

    /// The cursor that follows `cursor` in traversal order, or [`end()`][1] after the last
    /// element.
    ///
    /// # Panics
    ///
    /// Panics if `cursor` is [`end()`][1] or does not denote a live element of this storage.
    ///
    /// [1]: Self::end
    #[must_use]
    pub fn next(&self, cursor: Cursor) -> Cursor {
        match self.resolve(cursor) {
            Ok((position, slot)) => {
                // Cannot overflow because slot indexes are below the block capacity,
                // which itself is below usize::MAX.
                self.cursor_at_or_after((position, slot.wrapping_add(1)))
            }
            Err(error) => panic!(
                "next({cursor:?}) failed in storage of {}: {error}",
                type_name::<T>()
            ),
        }
    }

    /// The cursor that precedes `cursor` in traversal order.
    ///
    /// Retreating from [`end()`][1] yields the last element.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let storage: BucketStorage<u32> = (1..=3).collect();
    ///
    /// let last = storage.prev(storage.end());
    /// assert_eq!(storage[last], 3);
    /// assert_eq!(storage[storage.prev(last)], 2);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `cursor` is [`begin()`][2] (there is nothing before it), or if it is neither
    /// [`end()`][1] nor a cursor to a live element of this storage.
    ///
    /// [1]: Self::end
    /// [2]: Self::begin
    #[must_use]
    pub fn prev(&self, cursor: Cursor) -> Cursor {
        let before = match self.resolve(cursor) {
            Ok(coordinates) => coordinates,
            Err(CursorError::End) => (self.ledger.block_count(), 0),
            Err(error) => panic!(
                "prev({cursor:?}) failed in storage of {}: {error}",
                type_name::<T>()
            ),
        };

        self.ledger.last_live_before(before).map_or_else(
            || {
                panic!(
                    "prev({cursor:?}) has no preceding element in storage of {}",
                    type_name::<T>()
                )
            },
            |coordinates| self.cursor_at(coordinates),
        )
    }

    /// The cursor obtained by applying [`next()`][1] to `cursor` `n` times.
    ///
    /// This walks the elements one by one; it is a convenience, not a shortcut.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let storage: BucketStorage<u32> = (0..20).collect();
    ///
    /// let cursor = storage.advance_by(storage.begin(), 11);
    /// assert_eq!(storage[cursor], 11);
    /// assert_eq!(storage.advance_by(storage.begin(), 20), storage.end());
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the walk would go past [`end()`][2].
    ///
    /// [1]: Self::next
    /// [2]: Self::end
    #[must_use]
    pub fn advance_by(&self, cursor: Cursor, n: usize) -> Cursor {
        (0..n).fold(cursor, |current, _| self.next(current))
    }

    /// An iterator over shared references to the elements, in traversal order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let storage: BucketStorage<u32> = [1, 2, 3].into_iter().collect();
    ///
    /// let sum: u32 = storage.iter().sum();
    /// assert_eq!(sum, 6);
    /// ```
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self.ledger.blocks(), self.len)
    }

    /// An iterator over exclusive references to the elements, in traversal order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage: BucketStorage<u32> = [1, 2, 3].into_iter().collect();
    ///
    /// for value in storage.iter_mut() {
    ///     *value *= 2;
    /// }
    ///
    /// assert_eq!(storage.iter().copied().collect::<Vec<_>>(), vec![2, 4, 6]);
    /// ```
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut::new(self.ledger.blocks_mut(), self.len)
    }

    /// An iterator over the elements and their cursors, in traversal order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    ///
    /// let mut storage: BucketStorage<u32> = (10..15).collect();
    ///
    /// let found = storage
    ///     .cursors()
    ///     .find(|(_, value)| **value == 12)
    ///     .map(|(cursor, _)| cursor)
    ///     .unwrap();
    ///
    /// storage.erase(found);
    /// assert_eq!(storage.iter().copied().collect::<Vec<_>>(), vec![10, 11, 13, 14]);
    /// ```
    #[must_use]
    pub fn cursors(&self) -> Cursors<'_, T> {
        Cursors::new(self.ledger.id(), self.ledger.blocks(), self.len)
    }

    /// Drops every element and releases every block.
    ///
    /// Afterwards both [`len()`][1] and [`capacity()`][2] are zero and all element cursors are
    /// invalid. The storage remains usable with the same block capacity.
    ///
    /// [1]: Self::len
    /// [2]: Self::capacity
    pub fn clear(&mut self) {
        let dropped_items = mem::replace(&mut self.len, 0);
        let released_blocks = self.ledger.block_count();

        self.ledger.clear();

        debug!(
            dropped_items,
            released_blocks,
            item_type = type_name::<T>(),
            "cleared storage"
        );
    }

    /// Releases every block that holds no elements.
    ///
    /// Elements and their traversal order are unaffected and no element moves; afterwards the
    /// capacity is exactly [`block_capacity()`][1] times the number of blocks that still hold
    /// at least one element. Cursors to live elements remain valid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    /// use new_zealand::nz;
    ///
    /// let mut storage = BucketStorage::with_block_capacity(nz!(2));
    ///
    /// let first = storage.insert(1);
    /// let second = storage.insert(2);
    /// let third = storage.insert(3);
    /// assert_eq!(storage.capacity(), 4);
    ///
    /// storage.erase(first);
    /// storage.erase(second);
    /// storage.shrink_to_fit();
    ///
    /// assert_eq!(storage.capacity(), 2);
    /// assert_eq!(storage[third], 3);
    /// ```
    ///
    /// [1]: Self::block_capacity
    pub fn shrink_to_fit(&mut self) {
        let released_blocks = self.ledger.shrink();

        debug!(
            released_blocks,
            remaining_blocks = self.ledger.block_count(),
            item_type = type_name::<T>(),
            "shrank storage"
        );
    }

    /// Exchanges the contents of two storages, including their configuration.
    ///
    /// No element is moved, cloned or dropped. Cursors follow the elements: a cursor issued by
    /// `self` before the swap is valid for `other` afterwards.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Moves all elements out into a new storage, leaving `self` empty.
    ///
    /// `self` keeps its configuration and ends up with zero capacity. Cursors follow the
    /// elements into the returned storage.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bucket_storage::BucketStorage;
    /// use new_zealand::nz;
    ///
    /// let mut source = BucketStorage::with_block_capacity(nz!(2));
    /// let cursor = source.insert(1);
    ///
    /// let target = source.take();
    ///
    /// assert_eq!(target[cursor], 1);
    /// assert_eq!(source.len(), 0);
    /// assert_eq!(source.capacity(), 0);
    /// assert_eq!(source.block_capacity().get(), 2);
    /// ```
    #[must_use]
    pub fn take(&mut self) -> Self {
        let empty = Self {
            ledger: self.ledger.empty_like(),
            len: 0,
            drop_policy: self.drop_policy,
        };

        mem::replace(self, empty)
    }

    fn resolve(&self, cursor: Cursor) -> Result<Coordinates> {
        if cursor.ledger() != self.ledger.id() {
            return Err(CursorError::ForeignCursor);
        }

        if cursor.is_end() {
            return Err(CursorError::End);
        }

        let position = self
            .ledger
            .locate(cursor.block(), cursor.block_hint())
            .ok_or(CursorError::BlockReleased)?;

        let block = self
            .ledger
            .block(position)
            .expect("locate() only returns positions of existing blocks");

        let same_element = block.generation(cursor.slot()) == Some(cursor.generation());

        if !block.is_live(cursor.slot()) || !same_element {
            return Err(CursorError::VacantSlot);
        }

        Ok((position, cursor.slot()))
    }

    fn release(&mut self, coordinates: Coordinates) -> T {
        let value = self.ledger.release(coordinates);

        self.len = self
            .len
            .checked_sub(1)
            .expect("we released a live element so len must be non-zero");

        value
    }

    fn cursor_at(&self, (position, slot): Coordinates) -> Cursor {
        let block = self
            .ledger
            .block(position)
            .expect("coordinates always come from the ledger we are looking at");

        let generation = block
            .generation(slot)
            .expect("coordinates always come from the ledger we are looking at");

        Cursor::new(self.ledger.id(), block.serial(), position, slot, generation)
    }

    fn cursor_at_or_after(&self, coordinates: Coordinates) -> Cursor {
        self.ledger
            .first_live_at_or_after(coordinates)
            .map_or_else(|| self.end(), |found| self.cursor_at(found))
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(all(test, debug_assertions))]
    pub(crate) fn integrity_check(&self) {
        self.ledger.integrity_check();

        let live: usize = self.ledger.blocks().iter().map(crate::Block::len).sum();

        assert_eq!(
            self.len,
            live,
            "storage len {} does not match the live element count {} in storage of {}",
            self.len,
            live,
            type_name::<T>()
        );
    }
}

impl<T> Default for BucketStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for BucketStorage<T> {
    fn drop(&mut self) {
        let was_empty = self.is_empty();

        // Drop the elements first; if the policy check below panics, at least nothing leaks.
        self.ledger.clear();

        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                was_empty,
                "dropped a non-empty storage of {} with a policy that says it must be empty when dropped",
                type_name::<T>()
            );
        }
    }
}

impl<T: Clone> Clone for BucketStorage<T> {
    /// Creates an independent copy with the same configuration.
    ///
    /// Elements are cloned in traversal order into a fresh storage, so the copy's capacity is
    /// what inserting that many elements into an empty storage produces. It may be lower than
    /// the source's capacity if the source has vacant slots. Cursors of the source are not valid
    /// for the copy.
    fn clone(&self) -> Self {
        let mut copy = Self::new_inner(self.block_capacity(), self.drop_policy);
        copy.extend(self.iter().cloned());
        copy
    }

    /// Replaces the contents with copies of the elements of `source` and adopts its
    /// configuration.
    ///
    /// The existing elements are dropped in place, so this is allowed even when the current drop
    /// policy is [`DropPolicy::MustNotDropItems`]. Cursors of either storage are not valid for
    /// the result.
    fn clone_from(&mut self, source: &Self) {
        self.clear();
        self.ledger = Ledger::new(source.block_capacity());
        self.drop_policy = source.drop_policy;
        self.extend(source.iter().cloned());
    }
}

impl<T: fmt::Debug> fmt::Debug for BucketStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("block_capacity", &self.block_capacity())
            .field("drop_policy", &self.drop_policy)
            .field("items", &DebugItems(self))
            .finish_non_exhaustive()
    }
}

struct DebugItems<'a, T>(&'a BucketStorage<T>);

impl<T: fmt::Debug> fmt::Debug for DebugItems<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<T> Index<Cursor> for BucketStorage<T> {
    type Output = T;

    fn index(&self, index: Cursor) -> &Self::Output {
        match self.resolve(index) {
            Ok((position, slot)) => self
                .ledger
                .block(position)
                .and_then(|block| block.get(slot))
                .expect("resolve() only returns coordinates of live elements"),
            Err(error) => panic!(
                "index({index:?}) failed in storage of {}: {error}",
                type_name::<T>()
            ),
        }
    }
}

impl<T> IndexMut<Cursor> for BucketStorage<T> {
    fn index_mut(&mut self, index: Cursor) -> &mut Self::Output {
        match self.resolve(index) {
            Ok((position, slot)) => self
                .ledger
                .block_mut(position)
                .and_then(|block| block.get_mut(slot))
                .expect("resolve() only returns coordinates of live elements"),
            Err(error) => panic!(
                "index_mut({index:?}) failed in storage of {}: {error}",
                type_name::<T>()
            ),
        }
    }
}

impl<T> Extend<T> for BucketStorage<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            _ = self.insert(value);
        }
    }
}

impl<T> FromIterator<T> for BucketStorage<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut storage = Self::new();
        storage.extend(iter);
        storage
    }
}

impl<T> IntoIterator for BucketStorage<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(mut self) -> Self::IntoIter {
        // We cannot move out of a type with a Drop impl, so we swap in an empty ledger and let
        // the now-empty storage drop normally (which satisfies any drop policy).
        let fresh = self.ledger.empty_like();
        let ledger = mem::replace(&mut self.ledger, fresh);
        let len = mem::replace(&mut self.len, 0);

        IntoIter::new(ledger.into_blocks(), len)
    }
}

impl<'a, T> IntoIterator for &'a BucketStorage<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut BucketStorage<T> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        reason = "we do not need to worry about these things when writing test code"
    )]

    use std::cell::{Cell, RefCell};
    use std::fmt::Debug;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use std::{ptr, thread};

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(BucketStorage<u32>: Send, Sync, Clone, Default, Debug);
    assert_impl_all!(BucketStorage<Rc<u32>>: Clone);
    assert_not_impl_any!(BucketStorage<Rc<u32>>: Send, Sync);
    assert_not_impl_any!(BucketStorage<Cell<u32>>: Sync);
    assert_impl_all!(BucketStorage<Cell<u32>>: Send);

    const DEFAULT_BLOCK_CAPACITY_FOR_TESTS: usize = crate::DEFAULT_BLOCK_CAPACITY.get();

    fn values<T: Copy>(storage: &BucketStorage<T>) -> Vec<T> {
        storage.iter().copied().collect()
    }

    #[test]
    fn smoke_test() {
        let mut storage = BucketStorage::<u32>::new();

        assert_eq!(storage.len(), 0);
        assert!(storage.is_empty());
        assert_eq!(storage.begin(), storage.end());

        let a = storage.insert(42);
        let b = storage.insert(43);
        let c = storage.insert(44);

        assert_eq!(storage.len(), 3);
        assert!(!storage.is_empty());
        assert_eq!(storage.capacity(), DEFAULT_BLOCK_CAPACITY_FOR_TESTS);

        assert_eq!(storage[a], 42);
        assert_eq!(storage[b], 43);
        assert_eq!(storage[c], 44);

        let after = storage.erase(b);
        assert_eq!(after, c);

        let d = storage.insert(45);

        assert_eq!(storage[a], 42);
        assert_eq!(storage[c], 44);
        assert_eq!(storage[d], 45);

        #[cfg(debug_assertions)]
        storage.integrity_check();
    }

    #[test]
    fn block_capacity_two_scenario() {
        let mut storage = BucketStorage::with_block_capacity(nz!(2));

        storage.insert(3);
        storage.insert(4);
        storage.insert(5);

        assert_eq!(storage.len(), 3);
        assert_eq!(storage.capacity(), 4);
        assert_eq!(storage[storage.begin()], 3);
        assert_eq!(storage[storage.next(storage.next(storage.begin()))], 5);
    }

    #[test]
    fn block_capacity_one_scenario() {
        let mut storage = BucketStorage::with_block_capacity(nz!(1));

        for value in 1..=3 {
            let cursor = storage.insert(value);
            assert_eq!(storage[cursor], value);
        }

        let mut cursor = storage.begin();
        assert_eq!(storage[cursor], 1);
        cursor = storage.next(cursor);
        assert_eq!(storage[cursor], 2);
        cursor = storage.next(cursor);
        assert_eq!(storage[cursor], 3);
        cursor = storage.next(cursor);
        assert_eq!(cursor, storage.end());
    }

    #[test]
    fn capacity_is_quantized_by_block() {
        for block_capacity in [1_usize, 2, 3, 7, 64] {
            let mut storage =
                BucketStorage::with_block_capacity(NonZero::new(block_capacity).unwrap());

            for count in 1..=50_usize {
                storage.insert(count);
                assert_eq!(
                    storage.capacity(),
                    block_capacity * count.div_ceil(block_capacity)
                );
            }
        }
    }

    #[test]
    fn erase_returns_following_element_across_blocks() {
        let mut storage = BucketStorage::with_block_capacity(nz!(2));

        let cursors: Vec<Cursor> = (0..6).map(|value| storage.insert(value)).collect();

        // Empty the middle block so the following element is two blocks away.
        storage.erase(cursors[2]);
        let after = storage.erase(cursors[3]);
        assert_eq!(after, cursors[4]);

        let after_first = storage.erase(cursors[1]);
        assert_eq!(after_first, cursors[4]);

        assert_eq!(storage.erase(cursors[5]), storage.end());
        assert_eq!(values(&storage), vec![0, 4]);
    }

    #[test]
    fn erase_everything_through_cursor_walk() {
        let mut storage = BucketStorage::with_block_capacity(nz!(3));
        storage.insert(1);
        storage.insert(2);
        assert!(!storage.is_empty());

        let mut cursor = storage.begin();
        while cursor != storage.end() {
            cursor = storage.erase(cursor);
        }

        assert!(storage.is_empty());
        assert_eq!(storage.capacity(), 3);
    }

    #[test]
    fn reverse_walk_from_end_erasing() {
        let mut storage = BucketStorage::with_block_capacity(nz!(3));

        for value in 1..=10 {
            storage.insert(value);
        }

        let mut cursor = storage.end();
        let mut expected = 10;

        while !storage.is_empty() {
            cursor = storage.prev(cursor);
            assert_eq!(storage[cursor], expected);
            expected -= 1;
            cursor = storage.erase(cursor);
        }

        assert_eq!(expected, 0);
    }

    #[test]
    fn prev_and_next_are_inverse() {
        let mut storage = BucketStorage::with_block_capacity(nz!(4));
        let cursors: Vec<Cursor> = (0..10).map(|value| storage.insert(value)).collect();

        storage.erase(cursors[3]);
        storage.erase(cursors[4]);
        storage.erase(cursors[7]);

        let mut cursor = storage.begin();
        while cursor != storage.end() {
            let next = storage.next(cursor);
            assert_eq!(storage.prev(next), cursor);
            cursor = next;
        }
    }

    #[test]
    #[should_panic]
    fn prev_of_begin_panics() {
        let mut storage = BucketStorage::new();
        storage.insert(1);

        _ = storage.prev(storage.begin());
    }

    #[test]
    #[should_panic]
    fn prev_of_end_on_empty_panics() {
        let storage = BucketStorage::<u32>::new();
        _ = storage.prev(storage.end());
    }

    #[test]
    #[should_panic]
    fn next_of_end_panics() {
        let storage = BucketStorage::<u32>::new();
        _ = storage.next(storage.end());
    }

    #[test]
    #[should_panic]
    fn advance_past_end_panics() {
        let storage: BucketStorage<u32> = (0..3).collect();
        _ = storage.advance_by(storage.begin(), 4);
    }

    #[test]
    fn advance_by_matches_repeated_next() {
        let storage: BucketStorage<u32> = (0..20).collect();

        let mut cursor = storage.begin();
        for _ in 0..11 {
            cursor = storage.next(cursor);
        }

        assert_eq!(storage.advance_by(storage.begin(), 11), cursor);
        assert_eq!(storage.advance_by(cursor, 0), cursor);
    }

    #[test]
    fn cursor_order_follows_traversal() {
        let mut storage = BucketStorage::with_block_capacity(nz!(2));

        for value in 0..25 {
            storage.insert(value);
        }

        let mut cursor = storage.begin();
        let mut index = 0;
        while cursor != storage.end() {
            if [2, 6, 13, 18].contains(&index) {
                cursor = storage.erase(cursor);
            } else {
                cursor = storage.next(cursor);
            }
            index += 1;
        }

        let walk: Vec<Cursor> = storage.cursors().map(|(cursor, _)| cursor).collect();
        let last = storage.prev(storage.end());

        for pair in walk.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);

            assert!(earlier < later);
            assert!(later > earlier);
            assert!(earlier >= storage.begin());
            assert!(later > storage.begin());
            assert!(later < storage.end());
            assert!(earlier <= last);
            assert_eq!(storage.next(earlier), later);
        }
    }

    #[test]
    fn erased_cursor_is_detected_even_after_slot_reuse() {
        let mut storage = BucketStorage::with_block_capacity(nz!(2));

        let first = storage.insert(1);
        storage.erase(first);

        let reused = storage.insert(2);

        // Same slot, but a different element.
        assert_eq!(reused, first);
        assert_eq!(storage.get(first), None);
        assert_eq!(storage.validate(first), Err(CursorError::VacantSlot));
        assert_eq!(storage.get(reused), Some(&2));
        assert_eq!(storage.try_erase(first), Err(CursorError::VacantSlot));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn foreign_cursor_is_detected() {
        let mut a = BucketStorage::new();
        let mut b = BucketStorage::new();

        let cursor = a.insert(1);
        b.insert(1);

        assert_eq!(b.validate(cursor), Err(CursorError::ForeignCursor));
        assert_eq!(b.try_erase(cursor), Err(CursorError::ForeignCursor));
        assert_eq!(b.try_erase(a.end()), Err(CursorError::ForeignCursor));
        assert_eq!(b.len(), 1);
    }

    #[test]
    #[should_panic]
    fn erase_end_panics() {
        let mut storage = BucketStorage::<u32>::new();
        storage.insert(1);

        let end = storage.end();
        storage.erase(end);
    }

    #[test]
    #[should_panic]
    fn index_erased_panics() {
        let mut storage = BucketStorage::new();
        let cursor = storage.insert(1);
        storage.erase(cursor);

        _ = storage[cursor];
    }

    #[test]
    fn shrink_releases_only_empty_blocks() {
        let mut storage = BucketStorage::with_block_capacity(nz!(2));
        let cursors: Vec<Cursor> = (0..8).map(|value| storage.insert(value)).collect();

        storage.erase(cursors[0]);
        storage.erase(cursors[1]);
        storage.erase(cursors[4]);
        storage.erase(cursors[5]);
        storage.erase(cursors[6]);

        assert_eq!(storage.capacity(), 8);
        storage.shrink_to_fit();
        assert_eq!(storage.capacity(), 4);
        assert_eq!(storage.len(), 3);

        // Cursors to survivors keep working, even though their blocks moved in the ledger.
        assert_eq!(storage[cursors[2]], 2);
        assert_eq!(storage[cursors[3]], 3);
        assert_eq!(storage[cursors[7]], 7);
        assert_eq!(storage.next(cursors[3]), cursors[7]);

        // Cursors into released blocks are reported as such.
        assert_eq!(storage.validate(cursors[0]), Err(CursorError::BlockReleased));

        assert_eq!(values(&storage), vec![2, 3, 7]);

        // The vacancy in the last surviving block is filled before any new block is added.
        storage.insert(100);
        assert_eq!(storage.capacity(), 4);
        assert_eq!(values(&storage), vec![2, 3, 100, 7]);

        #[cfg(debug_assertions)]
        storage.integrity_check();
    }

    #[test]
    fn shrink_keeps_element_addresses() {
        let mut storage = BucketStorage::with_block_capacity(nz!(2));
        let cursors: Vec<Cursor> = (0..6).map(|value| storage.insert(value)).collect();

        let address_before = ptr::from_ref(&storage[cursors[5]]);

        storage.erase(cursors[0]);
        storage.erase(cursors[1]);
        storage.shrink_to_fit();

        let address_after = ptr::from_ref(&storage[cursors[5]]);
        assert_eq!(address_before, address_after);
    }

    #[test]
    fn insert_keeps_element_addresses() {
        let mut storage = BucketStorage::with_block_capacity(nz!(2));
        let first = storage.insert(0_u64);
        let address_before = ptr::from_ref(&storage[first]);

        for value in 1..1000 {
            storage.insert(value);
        }

        let address_after = ptr::from_ref(&storage[first]);
        assert_eq!(address_before, address_after);
    }

    #[test]
    fn clear_releases_everything() {
        let mut storage = BucketStorage::with_block_capacity(nz!(3));
        let cursor = storage.insert(1);
        storage.insert(2);
        storage.insert(3);
        storage.insert(4);

        storage.clear();

        assert_eq!(storage.len(), 0);
        assert_eq!(storage.capacity(), 0);
        assert_eq!(storage.begin(), storage.end());
        assert_eq!(storage.validate(cursor), Err(CursorError::BlockReleased));

        // Still usable.
        let again = storage.insert(5);
        assert_eq!(storage[again], 5);
        assert_ne!(again, cursor);
        assert_eq!(storage.capacity(), 3);
    }

    #[test]
    fn swap_exchanges_everything() {
        let mut a = BucketStorage::new();
        let a_cursor = a.insert(1);

        let mut b = BucketStorage::with_block_capacity(nz!(20));
        b.insert(2);
        b.insert(3);

        a.swap(&mut b);

        assert_eq!(values(&a), vec![2, 3]);
        assert_eq!(a.block_capacity().get(), 20);
        assert_eq!(values(&b), vec![1]);
        assert_eq!(b[a_cursor], 1);

        a.swap(&mut b);
        assert_eq!(a[a_cursor], 1);
    }

    #[test]
    fn take_leaves_empty_usable_source() {
        let mut source = BucketStorage::with_block_capacity(nz!(2));
        let cursor = source.insert(1);
        source.insert(2);
        source.insert(3);

        let target = source.take();

        assert_eq!(target.len(), 3);
        assert_eq!(target.capacity(), 4);
        assert_eq!(target[cursor], 1);

        assert_eq!(source.len(), 0);
        assert_eq!(source.capacity(), 0);
        assert_eq!(source.validate(cursor), Err(CursorError::ForeignCursor));

        source.insert(4);
        assert_eq!(source.capacity(), 2);
    }

    #[test]
    fn clone_is_deep_and_compact() {
        let mut source = BucketStorage::with_block_capacity(nz!(2));
        let cursors: Vec<Cursor> = (0..6).map(|value| source.insert(value.to_string())).collect();

        source.erase(cursors[1]);
        source.erase(cursors[2]);
        source.erase(cursors[3]);

        let mut copy = source.clone();

        assert_eq!(copy.len(), 3);
        assert_eq!(copy.capacity(), 4);
        assert_eq!(copy.block_capacity(), source.block_capacity());
        assert_eq!(
            copy.iter().cloned().collect::<Vec<_>>(),
            vec!["0".to_string(), "4".to_string(), "5".to_string()]
        );

        // Independent of the source.
        let first = copy.begin();
        copy[first].push('!');
        assert_eq!(source[cursors[0]], "0");
        assert_eq!(copy.validate(cursors[0]), Err(CursorError::ForeignCursor));
    }

    #[test]
    fn clone_from_adopts_source_configuration() {
        let source: BucketStorage<u32> = {
            let mut storage = BucketStorage::with_block_capacity(nz!(2));
            storage.extend([3, 4, 5]);
            storage
        };

        let mut target = BucketStorage::with_block_capacity(nz!(7));
        target.extend([1, 2]);

        target.clone_from(&source);

        assert_eq!(values(&target), vec![3, 4, 5]);
        assert_eq!(target.capacity(), 4);
        assert_eq!(target.block_capacity().get(), 2);
    }

    #[test]
    fn clone_from_onto_non_empty_must_not_drop_storage() {
        let source: BucketStorage<u32> = [7, 8].into_iter().collect();

        let mut target = BucketStorage::<u32>::builder()
            .block_capacity(nz!(2))
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();
        target.extend([1, 2, 3]);
        let stale = target.begin();

        target.clone_from(&source);

        assert_eq!(values(&target), vec![7, 8]);
        assert_eq!(target.drop_policy(), DropPolicy::MayDropItems);
        assert_eq!(target.block_capacity(), source.block_capacity());
        assert_eq!(target.validate(stale), Err(CursorError::ForeignCursor));
    }

    #[test]
    fn insert_then_erase_restores_len() {
        let mut storage = BucketStorage::with_block_capacity(nz!(3));
        let cursors: Vec<Cursor> = (0..5).map(|value| storage.insert(value)).collect();
        storage.erase(cursors[1]);

        let len_before = storage.len();
        let capacity_before = storage.capacity();

        let cursor = storage.insert(100);
        storage.erase(cursor);

        assert_eq!(storage.len(), len_before);
        assert!(storage.capacity() >= capacity_before);
        assert_eq!(values(&storage), vec![0, 2, 3, 4]);
    }

    #[test]
    fn into_iter_consumes_multi_block_storage() {
        let mut storage = BucketStorage::with_block_capacity(nz!(2));
        let cursors: Vec<Cursor> = (0..7).map(|value| storage.insert(value)).collect();
        storage.erase(cursors[0]);
        storage.erase(cursors[3]);

        let consumed: Vec<u32> = storage.into_iter().collect();

        assert_eq!(consumed, vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn iterator_conversions() {
        let mut storage: BucketStorage<u32> = (0..5).collect();

        for value in &mut storage {
            *value += 1;
        }

        let borrowed: Vec<u32> = (&storage).into_iter().copied().collect();
        assert_eq!(borrowed, vec![1, 2, 3, 4, 5]);

        let narrowed = Iter::from(storage.iter_mut());
        assert_eq!(narrowed.len(), 5);

        let owned: Vec<u32> = storage.into_iter().rev().collect();
        assert_eq!(owned, vec![5, 4, 3, 2, 1]);
    }

    /// Counts how many times values of this type have been dropped.
    struct Droppable(Rc<Cell<u32>>);

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn into_iter_drops_unyielded_elements() {
        let dropped = Rc::new(Cell::new(0_u32));

        let storage: BucketStorage<Droppable> =
            (0..5).map(|_| Droppable(Rc::clone(&dropped))).collect();

        let mut iter = storage.into_iter();
        drop(iter.next());
        assert_eq!(dropped.get(), 1);

        drop(iter);
        assert_eq!(dropped.get(), 5);
    }

    #[test]
    fn remove_returns_value_without_dropping() {
        let dropped = Rc::new(Cell::new(0_u32));

        let mut storage = BucketStorage::new();
        let cursor = storage.insert(Droppable(Rc::clone(&dropped)));

        let value = storage.remove(cursor);
        assert_eq!(dropped.get(), 0);
        assert!(storage.is_empty());

        drop(value);
        assert_eq!(dropped.get(), 1);
    }

    #[test]
    fn debug_output_lists_items() {
        let storage: BucketStorage<u32> = [1, 2].into_iter().collect();
        let text = format!("{storage:?}");

        assert!(text.contains("len: 2"));
        assert!(text.contains("items: [1, 2]"));
    }

    #[test]
    #[should_panic]
    fn drop_item_with_forbidden_to_drop_policy_panics() {
        let mut storage = BucketStorage::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        storage.insert(123);
    }

    #[test]
    fn drop_itemless_with_forbidden_to_drop_policy_ok() {
        let mut storage = BucketStorage::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        let cursor = storage.insert(123);
        storage.erase(cursor);

        drop(storage);
    }

    #[test]
    fn into_iter_with_forbidden_to_drop_policy_ok() {
        let mut storage = BucketStorage::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build();

        storage.insert(1);

        assert_eq!(storage.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn zero_sized_items_are_supported() {
        let mut storage = BucketStorage::with_block_capacity(nz!(4));

        let cursors: Vec<Cursor> = (0..6).map(|_| storage.insert(())).collect();
        storage.erase(cursors[2]);

        assert_eq!(storage.len(), 5);
        assert_eq!(storage.iter().count(), 5);
    }

    #[test]
    fn in_refcell_works_fine() {
        let storage = RefCell::new(BucketStorage::<u32>::new());

        let a = {
            let mut storage = storage.borrow_mut();
            let a = storage.insert(42);
            let b = storage.insert(43);
            storage.erase(b);
            a
        };

        let storage = storage.borrow();
        assert_eq!(storage[a], 42);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn multithreaded_via_mutex() {
        let storage = Arc::new(Mutex::new(BucketStorage::<u32>::new()));

        let (a, b) = {
            let mut storage = storage.lock().unwrap();
            (storage.insert(42), storage.insert(43))
        };

        let storage_clone = Arc::clone(&storage);
        thread::spawn(move || {
            let mut storage = storage_clone.lock().unwrap();
            storage.erase(b);
            storage.insert(44);
        })
        .join()
        .unwrap();

        let storage = storage.lock().unwrap();
        assert_eq!(storage[a], 42);
        assert_eq!(storage.len(), 2);
    }
}
