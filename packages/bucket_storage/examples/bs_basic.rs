//! Basic usage of the `bucket_storage` crate:
//!
//! * Creating a storage.
//! * Adding items.
//! * Retrieving items via cursors.
//! * Erasing items while walking the storage.

use bucket_storage::BucketStorage;
use new_zealand::nz;

fn main() {
    let mut storage = BucketStorage::with_block_capacity(nz!(4));

    // Inserting an item gives you a cursor that you can later use to look up the item again.
    let alice = storage.insert("Alice".to_string());
    let bob = storage.insert("Bob".to_string());
    storage.insert("Charlie".to_string());
    storage.insert("Dave".to_string());
    storage.insert("Eve".to_string());

    println!(
        "Storage contains {} items in blocks of {}, for a total capacity of {}",
        storage.len(),
        storage.block_capacity(),
        storage.capacity()
    );

    println!("Retrieved item: {}", storage[alice]);

    // Erasing does not move any other item, so the cursor to Alice remains valid.
    storage.erase(bob);
    println!("Retrieved item after erasing Bob: {}", storage[alice]);

    // The cursor to Bob now denotes nothing and the storage knows it.
    if let Err(error) = storage.try_erase(bob) {
        println!("Erasing Bob again failed: {error}");
    }

    // Cursors do not borrow the storage, so you can erase while walking.
    let mut cursor = storage.begin();
    while cursor != storage.end() {
        if storage[cursor].len() == 3 {
            println!("Erasing {}", storage[cursor]);
            cursor = storage.erase(cursor);
        } else {
            cursor = storage.next(cursor);
        }
    }

    // You can also modify the items in-place.
    storage[alice].push_str(" Smith");

    for name in &storage {
        println!("Remaining: {name}");
    }
}
