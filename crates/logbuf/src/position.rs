use crate::buffer::AtomicBuffer;
use crate::counters::{CountersError, CountersManager, CountersReader};
use crate::invariants::debug_assert_counter_in_range;
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// Per-slot handle binding a counter id to the values region.
///
/// A position is the hot-path face of a counter: readers and the single
/// writer touch the 8-byte value directly, never the metadata region. The
/// propose-max operations are deliberately a load-compare-store rather than
/// a compare-and-swap: positions are owned by exactly one writer, and
/// skipping the CAS is the point. Concurrent proposers produce
/// unspecified-but-safe results; that is a documented contract, not a bug.
pub struct Position {
    buffer: AtomicBuffer,
    id: i32,
    offset: usize,
    closed: bool,
}

// Note: Position intentionally does NOT implement Clone. Cloning would
// invite multiple writers onto the same slot, breaking the single-writer
// contract the propose-max operations rely on.

impl Position {
    /// Binds a handle to `id` within the values region.
    pub fn new(values: AtomicBuffer, id: i32) -> Self {
        let max_counter_id = (values.capacity() / crate::counters::COUNTER_LENGTH) as i32 - 1;
        debug_assert_counter_in_range!(id, max_counter_id);
        Self {
            buffer: values,
            id,
            offset: CountersReader::counter_offset(id),
            closed: false,
        }
    }

    /// The bound counter id.
    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Plain load of the value.
    #[inline]
    pub fn get(&self) -> i64 {
        self.buffer.get_i64(self.offset)
    }

    /// Acquire load of the value.
    #[inline]
    pub fn get_volatile(&self) -> i64 {
        self.buffer.get_i64_volatile(self.offset)
    }

    /// Plain store of the value.
    #[inline]
    pub fn set(&self, value: i64) {
        self.buffer.put_i64(self.offset, value);
    }

    /// Release store of the value, publishing prior writes with it.
    #[inline]
    pub fn set_ordered(&self, value: i64) {
        self.buffer.put_i64_ordered(self.offset, value);
    }

    /// Stores `proposed` if it exceeds the current value. Returns whether
    /// the store happened. Single-writer contract.
    #[inline]
    pub fn propose_max(&self, proposed: i64) -> bool {
        if self.get() < proposed {
            self.set(proposed);
            return true;
        }
        false
    }

    /// As [`propose_max`](Self::propose_max) but the update is a release
    /// store.
    #[inline]
    pub fn propose_max_ordered(&self, proposed: i64) -> bool {
        if self.get() < proposed {
            self.set_ordered(proposed);
            return true;
        }
        false
    }

    /// Whether [`close`](Self::close) has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Idempotent close. A plain position owns no slot, so this only marks
    /// the handle.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

/// A position that owns its counter slot and reclaims it at close.
///
/// The manager is deliberately single-owner and not thread-safe, so the
/// binding is `Rc<RefCell<_>>`; an owned position therefore stays on the
/// owner's thread. Slots written from other threads use a plain
/// [`Position`], which is Send, and are freed by the owner.
pub struct OwnedPosition {
    position: Position,
    manager: Rc<RefCell<CountersManager>>,
}

impl OwnedPosition {
    /// Allocates a counter and binds an owning handle to it.
    pub fn allocate(
        manager: &Rc<RefCell<CountersManager>>,
        label: &str,
        type_id: i32,
    ) -> Result<Self, CountersError> {
        let id = manager.borrow_mut().allocate(label, type_id)?;
        Ok(Self::new(manager, id))
    }

    /// Binds an owning handle to an already-allocated id.
    pub fn new(manager: &Rc<RefCell<CountersManager>>, id: i32) -> Self {
        let values = manager.borrow().values_buffer();
        Self {
            position: Position::new(values, id),
            manager: Rc::clone(manager),
        }
    }

    /// Idempotent close; the first call frees the slot through the manager.
    pub fn close(&mut self) {
        if !self.position.is_closed() {
            self.position.close();
            self.manager.borrow_mut().free(self.position.id());
        }
    }
}

impl Deref for OwnedPosition {
    type Target = Position;

    fn deref(&self) -> &Position {
        &self.position
    }
}

impl DerefMut for OwnedPosition {
    fn deref_mut(&mut self) -> &mut Position {
        &mut self.position
    }
}

impl Drop for OwnedPosition {
    fn drop(&mut self) {
        self.close();
    }
}
