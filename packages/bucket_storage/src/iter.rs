use std::iter::FusedIterator;
use std::{slice, vec};

use crate::{Block, Cursor, LedgerId, Slot};

/// An iterator over shared references to the elements of a [`BucketStorage`][1], in
/// traversal order.
///
/// Created by [`BucketStorage::iter()`][2]. An [`IterMut`] can be narrowed into this type via
/// [`From`], never the other way around.
///
/// [1]: crate::BucketStorage
/// [2]: crate::BucketStorage::iter
#[derive(Debug)]
pub struct Iter<'a, T> {
    blocks: slice::Iter<'a, Block<T>>,
    front: Option<slice::Iter<'a, Slot<T>>>,
    back: Option<slice::Iter<'a, Slot<T>>>,

    /// Live elements not yet yielded from either end.
    remaining: usize,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(blocks: &'a [Block<T>], len: usize) -> Self {
        Self {
            blocks: blocks.iter(),
            front: None,
            back: None,
            remaining: len,
        }
    }
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            blocks: self.blocks.clone(),
            front: self.front.clone(),
            back: self.back.clone(),
            remaining: self.remaining,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(front) = &mut self.front {
                if let Some(value) = front.find_map(Slot::value) {
                    self.remaining = self.remaining.wrapping_sub(1);
                    return Some(value);
                }

                self.front = None;
            }

            if let Some(block) = self.blocks.next() {
                self.front = Some(block.slots().iter());
                continue;
            }

            let value = self.back.as_mut()?.find_map(Slot::value);

            if value.is_some() {
                self.remaining = self.remaining.wrapping_sub(1);
            }

            return value;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(back) = &mut self.back {
                if let Some(value) = back.rev().find_map(Slot::value) {
                    self.remaining = self.remaining.wrapping_sub(1);
                    return Some(value);
                }

                self.back = None;
            }

            if let Some(block) = self.blocks.next_back() {
                self.back = Some(block.slots().iter());
                continue;
            }

            let value = self.front.as_mut()?.rev().find_map(Slot::value);

            if value.is_some() {
                self.remaining = self.remaining.wrapping_sub(1);
            }

            return value;
        }
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

/// An iterator over exclusive references to the elements of a [`BucketStorage`][1], in
/// traversal order.
///
/// Created by [`BucketStorage::iter_mut()`][2].
///
/// [1]: crate::BucketStorage
/// [2]: crate::BucketStorage::iter_mut
#[derive(Debug)]
pub struct IterMut<'a, T> {
    blocks: slice::IterMut<'a, Block<T>>,
    front: Option<slice::IterMut<'a, Slot<T>>>,
    back: Option<slice::IterMut<'a, Slot<T>>>,
    remaining: usize,
}

impl<'a, T> IterMut<'a, T> {
    pub(crate) fn new(blocks: &'a mut [Block<T>], len: usize) -> Self {
        Self {
            blocks: blocks.iter_mut(),
            front: None,
            back: None,
            remaining: len,
        }
    }
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(front) = &mut self.front {
                if let Some(value) = front.find_map(Slot::value_mut) {
                    self.remaining = self.remaining.wrapping_sub(1);
                    return Some(value);
                }

                self.front = None;
            }

            if let Some(block) = self.blocks.next() {
                self.front = Some(block.slots_mut().iter_mut());
                continue;
            }

            let value = self.back.as_mut()?.find_map(Slot::value_mut);

            if value.is_some() {
                self.remaining = self.remaining.wrapping_sub(1);
            }

            return value;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(back) = &mut self.back {
                if let Some(value) = back.rev().find_map(Slot::value_mut) {
                    self.remaining = self.remaining.wrapping_sub(1);
                    return Some(value);
                }

                self.back = None;
            }

            if let Some(block) = self.blocks.next_back() {
                self.back = Some(block.slots_mut().iter_mut());
                continue;
            }

            let value = self.front.as_mut()?.rev().find_map(Slot::value_mut);

            if value.is_some() {
                self.remaining = self.remaining.wrapping_sub(1);
            }

            return value;
        }
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}

impl<'a, T> From<IterMut<'a, T>> for Iter<'a, T> {
    /// Gives up write access, keeping the remaining range.
    fn from(value: IterMut<'a, T>) -> Self {
        let blocks: &'a [Block<T>] = value.blocks.into_slice();

        Self {
            blocks: blocks.iter(),
            front: value.front.map(narrow_slots),
            back: value.back.map(narrow_slots),
            remaining: value.remaining,
        }
    }
}

fn narrow_slots<T>(slots: slice::IterMut<'_, Slot<T>>) -> slice::Iter<'_, Slot<T>> {
    let slots: &[Slot<T>] = slots.into_slice();
    slots.iter()
}

/// An owning iterator over the elements of a [`BucketStorage`][1], in traversal order.
///
/// Created by the [`IntoIterator`] implementation of the storage. Elements not yielded are
/// dropped together with the iterator.
///
/// [1]: crate::BucketStorage
#[derive(Debug)]
pub struct IntoIter<T> {
    blocks: vec::IntoIter<Block<T>>,
    front: Option<vec::IntoIter<Slot<T>>>,
    back: Option<vec::IntoIter<Slot<T>>>,
    remaining: usize,
}

impl<T> IntoIter<T> {
    pub(crate) fn new(blocks: Vec<Block<T>>, len: usize) -> Self {
        Self {
            blocks: blocks.into_iter(),
            front: None,
            back: None,
            remaining: len,
        }
    }
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(front) = &mut self.front {
                if let Some(value) = front.find_map(Slot::into_value) {
                    self.remaining = self.remaining.wrapping_sub(1);
                    return Some(value);
                }

                self.front = None;
            }

            if let Some(block) = self.blocks.next() {
                self.front = Some(block.into_slots().into_iter());
                continue;
            }

            let value = self.back.as_mut()?.find_map(Slot::into_value);

            if value.is_some() {
                self.remaining = self.remaining.wrapping_sub(1);
            }

            return value;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(back) = &mut self.back {
                if let Some(value) = back.rev().find_map(Slot::into_value) {
                    self.remaining = self.remaining.wrapping_sub(1);
                    return Some(value);
                }

                self.back = None;
            }

            if let Some(block) = self.blocks.next_back() {
                self.back = Some(block.into_slots().into_iter());
                continue;
            }

            let value = self.front.as_mut()?.rev().find_map(Slot::into_value);

            if value.is_some() {
                self.remaining = self.remaining.wrapping_sub(1);
            }

            return value;
        }
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> FusedIterator for IntoIter<T> {}

/// An iterator over the elements of a [`BucketStorage`][1] together with their cursors, in
/// traversal order.
///
/// Created by [`BucketStorage::cursors()`][2]. Useful for locating an element by value and then
/// erasing it once the iterator has been dropped.
///
/// [1]: crate::BucketStorage
/// [2]: crate::BucketStorage::cursors
#[derive(Debug)]
pub struct Cursors<'a, T> {
    ledger: LedgerId,
    blocks: slice::Iter<'a, Block<T>>,

    /// Position of the block the front slots belong to.
    position: usize,
    front: Option<(&'a Block<T>, slice::Iter<'a, Slot<T>>)>,

    /// Index within the front block of the next slot to inspect.
    slot: usize,

    remaining: usize,
}

impl<'a, T> Cursors<'a, T> {
    pub(crate) fn new(ledger: LedgerId, blocks: &'a [Block<T>], len: usize) -> Self {
        Self {
            ledger,
            blocks: blocks.iter(),
            position: 0,
            front: None,
            slot: 0,
            remaining: len,
        }
    }
}

impl<'a, T> Iterator for Cursors<'a, T> {
    type Item = (Cursor, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some((block, slots)) = &mut self.front {
                for slot in slots.by_ref() {
                    let index = self.slot;
                    self.slot = self.slot.wrapping_add(1);

                    if let Some(value) = slot.value() {
                        self.remaining = self.remaining.wrapping_sub(1);

                        let cursor = Cursor::new(
                            self.ledger,
                            block.serial(),
                            self.position,
                            index,
                            slot.generation(),
                        );

                        return Some((cursor, value));
                    }
                }

                self.front = None;
                self.position = self.position.wrapping_add(1);
            }

            let block = self.blocks.next()?;
            self.front = Some((block, block.slots().iter()));
            self.slot = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Cursors<'_, T> {}

impl<T> FusedIterator for Cursors<'_, T> {}
