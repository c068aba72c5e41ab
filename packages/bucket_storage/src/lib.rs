//! A block-segmented container with stable element addresses, constant-time insert and erase
//! and ordered cursors.
//!
//! This crate provides [`BucketStorage`], a container that stores elements in fixed-size blocks
//! and never moves an element once it has been inserted. Erasing an element vacates its slot,
//! which a later insert reuses. The container grows by one block at a time and only gives
//! memory back on request.
//!
//! # Key Features
//!
//! - **Stable addresses**: Inserting or erasing one element never relocates any other element
//! - **Constant-time insert and erase**: Each block threads its vacant slots into a free list
//!   and the container tracks the lowest block with room
//! - **Cursors**: [`Cursor`] is a small `Copy` position that survives mutation of the
//!   container, is totally ordered by traversal position and can step forward and backward
//! - **Stale cursor detection**: Cursors to erased elements, released blocks or a different
//!   container are reported as a [`CursorError`] instead of silently reaching the wrong element
//! - **Standard iteration**: [`Iter`], [`IterMut`], [`IntoIter`] and [`Cursors`] with
//!   double-ended and exact-size support
//! - **Explicit memory control**: [`shrink_to_fit()`][1] releases empty blocks and
//!   [`clear()`][2] releases everything
//! - **Flexible drop policies**: Choose whether dropping a non-empty container is acceptable
//!
//! # Traversal order
//!
//! Elements are visited block by block in allocation order and, within a block, slot by slot.
//! This is insertion order until elements get erased; afterwards new elements fill the
//! vacated slots and appear wherever those slots are.
//!
//! # Example
//!
//! ```rust
//! use bucket_storage::BucketStorage;
//! use new_zealand::nz;
//!
//! let mut storage = BucketStorage::with_block_capacity(nz!(4));
//!
//! let alice = storage.insert("Alice".to_string());
//! let bob = storage.insert("Bob".to_string());
//! storage.insert("Charlie".to_string());
//!
//! // Erasing returns the cursor of the following element.
//! let after_bob = storage.erase(bob);
//! assert_eq!(storage[after_bob], "Charlie");
//!
//! // Other elements are unaffected.
//! storage[alice].push_str(" Smith");
//! assert_eq!(storage[alice], "Alice Smith");
//!
//! // The vacated slot is reused by the next insert.
//! let dave = storage.insert("Dave".to_string());
//! assert_eq!(dave, bob);
//!
//! let names: Vec<&str> = storage.iter().map(String::as_str).collect();
//! assert_eq!(names, ["Alice Smith", "Dave", "Charlie"]);
//! ```
//!
//! # Thread safety
//!
//! The container is [`Send`] if `T` is [`Send`] and [`Sync`] if `T` is [`Sync`]. It has no
//! internal synchronization; wrap it in a `Mutex` to mutate it from multiple threads.
//!
//! [1]: BucketStorage::shrink_to_fit
//! [2]: BucketStorage::clear

mod block;
mod builder;
mod cursor;
mod drop_policy;
mod error;
mod free_block_index;
mod iter;
mod ledger;
mod storage;

pub(crate) use block::*;
pub use builder::*;
pub use cursor::Cursor;
pub use drop_policy::*;
pub use error::CursorError;
pub(crate) use free_block_index::*;
pub use iter::*;
pub(crate) use ledger::*;
pub use storage::BucketStorage;
