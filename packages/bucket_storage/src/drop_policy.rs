/// Determines what happens to remaining elements when a [`BucketStorage`][1] is dropped.
///
/// By default, the storage drops its elements when it is dropped.
///
/// # Examples
///
/// ```
/// use bucket_storage::{BucketStorage, DropPolicy};
///
/// // The drop policy is set at storage creation time.
/// let storage = BucketStorage::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
///
/// [1]: crate::BucketStorage
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The storage drops its remaining elements when it is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The storage panics if it still contains elements when it is dropped.
    ///
    /// Useful when every element is expected to be erased explicitly, for example because
    /// erasure is paired with bookkeeping elsewhere and a silently dropped element would be a
    /// leak of that bookkeeping.
    MustNotDropItems,
}
