//! Monotonic id allocation.

use std::cell::Cell;
use std::rc::Rc;

/// Hands out unique ids for tables, displays, editors and cursors.
///
/// Clones share the same counter, so an allocator can be passed down to
/// every component created for one document without any global state.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: Rc<Cell<u64>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start counting at `first` (ids restored from a serialized table stay unique).
    pub fn starting_at(first: u64) -> Self {
        Self { next: Rc::new(Cell::new(first)) }
    }

    pub fn allocate(&self) -> u64 {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }

    /// Make sure future ids are strictly greater than `id`.
    pub fn reserve(&self, id: u64) {
        if self.next.get() <= id {
            self.next.set(id + 1);
        }
    }

    pub fn peek(&self) -> u64 {
        self.next.get()
    }
}
