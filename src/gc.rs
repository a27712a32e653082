//! Mark-and-sweep garbage collection.
//!
//! Heap cells live in a slot arena and are addressed by copyable `ObjectId`
//! handles. Nothing is reference counted: a cell survives a collection only
//! if it is reachable from the roots the interpreter hands to `collect`
//! (registers, frames, globals, job queues) or from the heap's guard stack.
//!
//! Collections never start on their own. `Heap::alloc` only bumps a counter;
//! the interpreter checks `should_collect` at safepoints where every live
//! value is stored somewhere it reports as a root.

use tracing::debug;

/// Default number of allocations between collections
pub const DEFAULT_GC_THRESHOLD: usize = 1000;

/// Handle to a heap cell
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Trait for heap cells that hold references to other cells.
pub trait Traceable {
    /// Visit every `ObjectId` stored in this cell.
    fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F);
}

/// Slot arena with a free list and a mark bit per slot
struct Space<T> {
    slots: Vec<Option<T>>,
    marks: Vec<bool>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T: Traceable> Space<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            marks: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    fn alloc(&mut self, value: T) -> ObjectId {
        self.live += 1;
        if let Some(index) = self.free_list.pop()
            && let Some(slot) = self.slots.get_mut(index as usize)
        {
            *slot = Some(value);
            return ObjectId(index);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Some(value));
        self.marks.push(false);
        ObjectId(index)
    }

    fn get(&self, id: ObjectId) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Set the mark bit; returns true if the cell was live and unmarked.
    fn mark(&mut self, id: ObjectId) -> bool {
        let live = matches!(self.slots.get(id.index()), Some(Some(_)));
        match self.marks.get_mut(id.index()) {
            Some(mark) if live && !*mark => {
                *mark = true;
                true
            }
            _ => false,
        }
    }

    /// Free every unmarked cell and clear the marks. Returns the number freed.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, (slot, mark)) in self.slots.iter_mut().zip(self.marks.iter_mut()).enumerate()
        {
            if *mark {
                *mark = false;
            } else if slot.is_some() {
                *slot = None;
                self.free_list.push(index as u32);
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }
}

/// Position on the guard stack; releasing it unroots everything guarded since.
#[derive(Clone, Copy, Debug)]
pub struct GuardScope(usize);

/// The garbage-collected heap
pub struct Heap<T: Traceable> {
    space: Space<T>,
    guards: Vec<ObjectId>,
    mark_stack: Vec<ObjectId>,
    allocs_since_gc: usize,
    gc_threshold: usize,
    collections: usize,
    total_freed: usize,
}

impl<T: Traceable> Heap<T> {
    pub fn new() -> Self {
        Self {
            space: Space::new(),
            guards: Vec::new(),
            mark_stack: Vec::new(),
            allocs_since_gc: 0,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            collections: 0,
            total_freed: 0,
        }
    }

    pub fn alloc(&mut self, value: T) -> ObjectId {
        self.allocs_since_gc += 1;
        self.space.alloc(value)
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.space.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.space.get_mut(id)
    }

    /// Allocations since the last collection reached the threshold.
    /// A threshold of zero disables automatic collection.
    pub fn should_collect(&self) -> bool {
        self.gc_threshold > 0 && self.allocs_since_gc >= self.gc_threshold
    }

    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.gc_threshold = threshold;
    }

    pub fn gc_threshold(&self) -> usize {
        self.gc_threshold
    }

    pub fn guard_scope(&self) -> GuardScope {
        GuardScope(self.guards.len())
    }

    /// Root `id` until the enclosing guard scope is released.
    pub fn guard(&mut self, id: ObjectId) {
        self.guards.push(id);
    }

    pub fn release(&mut self, scope: GuardScope) {
        self.guards.truncate(scope.0);
    }

    /// Mark everything reachable from `roots` and the guard stack, then sweep.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ObjectId>) -> usize {
        let mut stack = std::mem::take(&mut self.mark_stack);
        for id in roots.into_iter().chain(self.guards.iter().copied()) {
            if self.space.mark(id) {
                stack.push(id);
            }
        }

        let mut children = Vec::new();
        while let Some(id) = stack.pop() {
            if let Some(cell) = self.space.get(id) {
                cell.trace(&mut |child| children.push(child));
            }
            for child in children.drain(..) {
                if self.space.mark(child) {
                    stack.push(child);
                }
            }
        }
        self.mark_stack = stack;

        let freed = self.space.sweep();
        self.allocs_since_gc = 0;
        self.collections += 1;
        self.total_freed += freed;
        debug!(freed, live = self.space.live, "gc: collection finished");
        freed
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            total_slots: self.space.slots.len(),
            live_objects: self.space.live,
            collections: self.collections,
            total_freed: self.total_freed,
        }
    }
}

impl<T: Traceable> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the garbage collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcStats {
    /// Arena slots ever allocated (live plus free)
    pub total_slots: usize,
    pub live_objects: usize,
    pub collections: usize,
    pub total_freed: usize,
}
