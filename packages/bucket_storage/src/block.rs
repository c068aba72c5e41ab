use std::any::type_name;
use std::mem;
use std::num::NonZero;

/// A fixed-capacity run of slots that makes up one segment of a [`BucketStorage`][1].
///
/// Every block of one storage instance has the same capacity, chosen when the storage is
/// created. The slots live in a boxed slice, so the address of a live element never changes
/// while the element is in the block, no matter how the list of blocks itself grows or shrinks.
///
/// Vacant slots are chained into an intrusive free list: each vacant slot stores the index of
/// the next vacant slot, with the head kept in the block. A fresh block chains its slots in index
/// order, so slots are handed out from the start of the block. Released slots are pushed onto
/// the head of the list, so reuse is last-released-first and does not follow index order.
///
/// [1]: crate::BucketStorage
#[derive(Debug)]
pub(crate) struct Block<T> {
    /// Identifies the block within its ledger. Serials are never reused and grow in allocation
    /// order, so comparing serials compares ledger positions.
    serial: u64,

    slots: Box<[Slot<T>]>,

    /// Head of the intrusive free list. Equal to the capacity when the block is full.
    next_free_index: usize,

    /// Number of live slots.
    count: usize,
}

/// One storage cell of a [`Block`].
#[derive(Debug)]
pub(crate) struct Slot<T> {
    /// Bumped every time the slot goes from live to vacant, so that cursors to a previous
    /// occupant can be told apart from cursors to the current one.
    generation: u32,

    entry: Entry<T>,
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { value: T },

    Vacant { next_free_index: usize },
}

impl<T> Slot<T> {
    #[must_use]
    pub(crate) fn value(&self) -> Option<&T> {
        match &self.entry {
            Entry::Occupied { value } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[must_use]
    pub(crate) fn value_mut(&mut self) -> Option<&mut T> {
        match &mut self.entry {
            Entry::Occupied { value } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[must_use]
    pub(crate) fn into_value(self) -> Option<T> {
        match self.entry {
            Entry::Occupied { value } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[must_use]
    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Block<T> {
    /// Creates a block with every slot vacant.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is `usize::MAX`, which is reserved as the "full" marker range.
    #[must_use]
    pub(crate) fn new(serial: u64, capacity: NonZero<usize>) -> Self {
        assert!(
            capacity.get() < usize::MAX,
            "Block capacity must be less than usize::MAX"
        );

        let slots = (0..capacity.get())
            .map(|index| Slot {
                generation: 0,
                entry: Entry::Vacant {
                    // For the last slot this points one past the end, meaning "full".
                    next_free_index: index
                        .checked_add(1)
                        .expect("guarded by capacity < usize::MAX above"),
                },
            })
            .collect();

        Self {
            serial,
            slots,
            next_free_index: 0,
            count: 0,
        }
    }

    #[must_use]
    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.next_free_index >= self.slots.len()
    }

    #[must_use]
    pub(crate) fn slots(&self) -> &[Slot<T>] {
        &self.slots
    }

    #[must_use]
    pub(crate) fn slots_mut(&mut self) -> &mut [Slot<T>] {
        &mut self.slots
    }

    #[must_use]
    pub(crate) fn into_slots(self) -> Vec<Slot<T>> {
        self.slots.into_vec()
    }

    #[must_use]
    pub(crate) fn is_live(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| matches!(slot.entry, Entry::Occupied { .. }))
    }

    /// The generation of the slot, or `None` if the index is out of bounds.
    #[must_use]
    pub(crate) fn generation(&self, index: usize) -> Option<u32> {
        self.slots.get(index).map(Slot::generation)
    }

    #[must_use]
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Slot::value)
    }

    #[must_use]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Slot::value_mut)
    }

    /// Index of the first live slot at or after `from`.
    #[must_use]
    pub(crate) fn next_live(&self, from: usize) -> Option<usize> {
        self.slots
            .get(from..)?
            .iter()
            .position(|slot| slot.value().is_some())
            .map(|offset| {
                from.checked_add(offset)
                    .expect("offset is bounded by the slot count")
            })
    }

    /// Index of the last live slot strictly before `before`.
    #[must_use]
    pub(crate) fn prev_live(&self, before: usize) -> Option<usize> {
        let end = before.min(self.slots.len());

        self.slots
            .get(..end)?
            .iter()
            .rposition(|slot| slot.value().is_some())
    }

    /// Moves `value` into the slot at the head of the free list and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if the block is full.
    pub(crate) fn allocate(&mut self, value: T) -> usize {
        #[cfg(debug_assertions)]
        self.integrity_check();

        assert!(
            !self.is_full(),
            "cannot allocate in a full block of {}",
            type_name::<T>()
        );

        let index = self.next_free_index;

        let slot = self
            .slots
            .get_mut(index)
            .expect("guarded by the is_full() check above");

        let previous = mem::replace(&mut slot.entry, Entry::Occupied { value });

        self.next_free_index = match previous {
            Entry::Vacant { next_free_index } => next_free_index,
            Entry::Occupied { .. } => panic!(
                "free list head {index} pointed at a live slot in block of {}",
                type_name::<T>()
            ),
        };

        self.count = self
            .count
            .checked_add(1)
            .expect("guarded by capacity < usize::MAX in block ctor");

        index
    }

    /// Takes the element out of a live slot and pushes the slot onto the free list.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds or the slot is vacant.
    pub(crate) fn release(&mut self, index: usize) -> T {
        let next_free_index = self.next_free_index;

        let Some(slot) = self.slots.get_mut(index) else {
            panic!(
                "release({index}) is out of bounds in block of {}",
                type_name::<T>()
            );
        };

        if matches!(slot.entry, Entry::Vacant { .. }) {
            panic!(
                "release({index}) slot was vacant in block of {}",
                type_name::<T>()
            );
        }

        let Entry::Occupied { value } =
            mem::replace(&mut slot.entry, Entry::Vacant { next_free_index })
        else {
            panic!(
                "release({index}) slot became vacant while we held it in block of {}",
                type_name::<T>()
            );
        };

        slot.generation = slot.generation.wrapping_add(1);
        self.next_free_index = index;

        self.count = self
            .count
            .checked_sub(1)
            .expect("we verified above that the slot was live so count must be non-zero");

        value
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let capacity = self.slots.len();

        let live = self
            .slots
            .iter()
            .filter(|slot| slot.value().is_some())
            .count();

        assert!(
            self.count == live,
            "block {} count {} does not match the observed live count {} in block of {}",
            self.serial,
            self.count,
            live,
            type_name::<T>()
        );

        // Walk the free list. It must visit exactly the vacant slots, each once.
        let mut visited = vec![false; capacity];
        let mut cursor = self.next_free_index;
        let mut steps: usize = 0;

        while cursor < capacity {
            let seen = visited
                .get_mut(cursor)
                .expect("guarded by loop condition");

            assert!(
                !*seen,
                "free list of block {} revisits slot {cursor} in block of {}",
                self.serial,
                type_name::<T>()
            );
            *seen = true;

            cursor = match &self.slots.get(cursor).expect("guarded by loop condition").entry {
                Entry::Vacant { next_free_index } => *next_free_index,
                Entry::Occupied { .. } => panic!(
                    "free list of block {} reaches live slot {cursor} in block of {}",
                    self.serial,
                    type_name::<T>()
                ),
            };

            steps = steps.checked_add(1).expect("bounded by capacity");
        }

        assert!(
            steps.checked_add(live) == Some(capacity),
            "block {} free list length {steps} plus live count {live} is not capacity {capacity} in block of {}",
            self.serial,
            type_name::<T>()
        );
    }
}
