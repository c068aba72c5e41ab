use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;

use new_zealand::nz;

use crate::{BucketStorage, DropPolicy};

/// Number of slots per block used when the caller does not choose one.
#[cfg(not(miri))]
pub const DEFAULT_BLOCK_CAPACITY: NonZero<usize> = nz!(64);

// Under Miri, we use a smaller block capacity because Miri test runtime scales by memory usage.
#[cfg(miri)]
pub const DEFAULT_BLOCK_CAPACITY: NonZero<usize> = nz!(4);

/// Builder for creating an instance of [`BucketStorage`].
///
/// You only need to use this builder if you want to customize the storage configuration. The
/// default configuration used by [`BucketStorage::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use bucket_storage::{BucketStorage, DropPolicy};
/// use new_zealand::nz;
///
/// let storage = BucketStorage::<u32>::builder()
///     .block_capacity(nz!(20))
///     .drop_policy(DropPolicy::MayDropItems)
///     .build();
///
/// assert_eq!(storage.block_capacity().get(), 20);
/// ```
///
/// [1]: BucketStorage::new
#[must_use]
pub struct BucketStorageBuilder<T> {
    block_capacity: NonZero<usize>,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T> fmt::Debug for BucketStorageBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("block_capacity", &self.block_capacity)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T> BucketStorageBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the number of slots in every block of the storage.
    ///
    /// Capacity grows and shrinks in multiples of this number. Larger blocks mean fewer
    /// allocations; smaller blocks mean less unused capacity and cheaper traversal of sparse
    /// storage.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    /// use new_zealand::nz;
    ///
    /// let mut storage = BucketStorage::<u32>::builder()
    ///     .block_capacity(nz!(2))
    ///     .build();
    ///
    /// storage.insert(1);
    /// assert_eq!(storage.capacity(), 2);
    /// ```
    pub fn block_capacity(mut self, block_capacity: NonZero<usize>) -> Self {
        self.block_capacity = block_capacity;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the storage. This governs how to treat remaining
    /// elements when the storage is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_storage::{BucketStorage, DropPolicy};
    ///
    /// let storage = BucketStorage::<u32>::builder()
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the storage with the specified configuration.
    ///
    /// The storage starts with zero capacity; no block is allocated until the first insert.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_storage::BucketStorage;
    ///
    /// let storage = BucketStorage::<u32>::builder().build();
    /// assert_eq!(storage.capacity(), 0);
    /// ```
    #[must_use]
    pub fn build(self) -> BucketStorage<T> {
        BucketStorage::new_inner(self.block_capacity, self.drop_policy)
    }
}
