use std::result;

use thiserror::Error;

/// Reasons a [`Cursor`][1] cannot be used to access or erase an element.
///
/// Returned by the fallible storage methods such as [`try_erase()`][2]. The panicking
/// counterparts report the same conditions in their panic message.
///
/// [1]: crate::Cursor
/// [2]: crate::BucketStorage::try_erase
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum CursorError {
    /// The cursor is the end sentinel, which does not denote an element.
    #[error("the end cursor does not denote an element")]
    End,

    /// The cursor was issued by a different storage instance.
    #[error("the cursor was issued by a different storage instance")]
    ForeignCursor,

    /// The block the cursor points into has been released by a shrink or clear.
    #[error("the block the cursor points into has been released")]
    BlockReleased,

    /// The element the cursor pointed to has been erased. The slot may since have been reused
    /// by a different element.
    #[error("the element the cursor pointed to has been erased")]
    VacantSlot,
}

/// A specialized `Result` type for cursor operations, returning the crate's
/// [`CursorError`] type as the error value.
pub(crate) type Result<T> = result::Result<T, CursorError>;
