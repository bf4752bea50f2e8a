use alloc::vec::Vec;

use super::handle::Handle;

/// Slot storage with a free list.
///
/// The arena is the sole owner of everything it holds; handles passed around
/// the tree are plain indices and never affect lifetime. Freed slots are
/// recycled before the slot vector grows, so handles stay dense under
/// split/merge churn.
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<Handle>,
}

impl<T> Arena<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Number of live (non-freed) elements.
    pub(crate) const fn len(&self) -> usize {
        self.slots.len().saturating_sub(self.free.len())
    }

    pub(crate) fn alloc(&mut self, element: T) -> Handle {
        if let Some(handle) = self.free.pop() {
            self.slots[handle.index()] = Some(element);
            handle
        } else {
            // At most Handle::MAX + 1 slots after the push, so every slot
            // index remains representable.
            assert!(self.slots.len() <= Handle::MAX, "`Arena::alloc()` - arena is at maximum capacity ({})", Handle::MAX);
            self.slots.push(Some(element));
            Handle::new(self.slots.len() - 1)
        }
    }

    #[inline]
    pub(crate) fn get(&self, handle: Handle) -> &T {
        self.slots[handle.index()].as_ref().expect("`Arena::get()` - `handle` is invalid!")
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, handle: Handle) -> &mut T {
        self.slots[handle.index()].as_mut().expect("`Arena::get_mut()` - `handle` is invalid!")
    }

    /// Removes an element, returning it and recycling its slot.
    pub(crate) fn take(&mut self, handle: Handle) -> T {
        let element = self.slots[handle.index()].take().expect("`Arena::take()` - `handle` is invalid!");
        self.free.push(handle);
        element
    }

    pub(crate) fn free(&mut self, handle: Handle) {
        drop(self.take(handle));
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn take_returns_the_stored_element() {
        let mut arena: Arena<&str> = Arena::new();
        let handle = arena.alloc("first");
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.take(handle), "first");
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn freed_slots_are_recycled_before_the_storage_grows() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.alloc(1);
        let b = arena.alloc(2);
        let c = arena.alloc(3);
        arena.free(b);

        // The next allocation reuses the freed slot instead of appending.
        let d = arena.alloc(4);
        assert_eq!(d, b);
        assert_eq!(arena.slots.len(), 3);
        assert_eq!(*arena.get(a), 1);
        assert_eq!(*arena.get(c), 3);
        assert_eq!(*arena.get(d), 4);
    }

    #[test]
    fn clear_discards_live_and_freed_slots() {
        let mut arena: Arena<u32> = Arena::new();
        arena.alloc(7);
        let freed = arena.alloc(8);
        arena.free(freed);
        arena.clear();
        assert_eq!(arena.len(), 0);

        // A cleared arena starts allocating from slot zero again.
        let reused = arena.alloc(9);
        assert_eq!(reused.index(), 0);
        assert_eq!(*arena.get(reused), 9);
    }

    proptest! {
        /// Alternating allocation and release waves must keep every surviving
        /// element readable and writable, and must never grow the slot
        /// storage past the peak number of live elements.
        #[test]
        fn churn_preserves_survivors_and_reuses_slots(
            waves in prop::collection::vec(
                (prop::collection::vec(any::<u32>(), 1..32), any::<prop::sample::Index>()),
                1..16,
            ),
        ) {
            let mut arena: Arena<u32> = Arena::new();
            let mut live: Vec<(Handle, u32)> = Vec::new();
            let mut peak = 0;

            for (values, released) in waves {
                for value in values {
                    live.push((arena.alloc(value), value));
                }
                peak = peak.max(live.len());

                // Release a prefix of the oldest survivors; their handles go
                // back on the free list.
                for (handle, _) in live.drain(..released.index(live.len() + 1)) {
                    arena.free(handle);
                }

                prop_assert_eq!(arena.len(), live.len());
                for (handle, value) in &mut live {
                    prop_assert_eq!(*arena.get(*handle), *value);
                    *value = value.wrapping_add(1);
                    *arena.get_mut(*handle) = *value;
                }
                prop_assert!(arena.slots.len() <= peak);
            }
        }
    }
}
