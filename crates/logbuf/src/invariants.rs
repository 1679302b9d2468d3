//! Debug assertion macros for buffer and registry invariants.
//!
//! These are only active in debug builds (`#[cfg(debug_assertions)]`), so
//! there is zero overhead in release builds. Release builds rely on the
//! construction-time checks performed when a region is wrapped.
//!
//! Used by `AtomicBuffer`, the counters registry, and `TermAppender`.

// =============================================================================
// Bounds
// =============================================================================

/// Assert that an access of `len` bytes at `offset` stays inside `capacity`.
///
/// **Invariant**: `offset + len <= capacity`
///
/// Used in: every `AtomicBuffer` accessor
macro_rules! debug_assert_in_bounds {
    ($offset:expr, $len:expr, $capacity:expr) => {
        debug_assert!(
            $offset
                .checked_add($len)
                .is_some_and(|end| end <= $capacity),
            "access of {} bytes at offset {} overruns capacity {}",
            $len,
            $offset,
            $capacity
        )
    };
}

// =============================================================================
// Alignment
// =============================================================================

/// Assert that `offset` is aligned for an atomic access of the given width.
///
/// **Invariant**: `offset % alignment == 0`; combined with the 8-byte-aligned
/// base address verified at construction this keeps every atomic access
/// naturally aligned.
///
/// Used in: typed `AtomicBuffer` accessors
macro_rules! debug_assert_offset_aligned {
    ($offset:expr, $alignment:expr) => {
        debug_assert!(
            $offset % $alignment == 0,
            "offset {} is not {}-byte aligned",
            $offset,
            $alignment
        )
    };
}

/// Assert that a length lands on a frame-alignment boundary.
///
/// **Invariant**: fragment frames tile the reserved range exactly, so
/// `max_payload_length + HEADER_LENGTH` must be a multiple of the frame
/// alignment.
///
/// Used in: `TermAppender::append_fragmented`
macro_rules! debug_assert_frame_aligned {
    ($length:expr, $alignment:expr) => {
        debug_assert!(
            $length % $alignment == 0,
            "length {} is not a multiple of the {}-byte frame alignment",
            $length,
            $alignment
        )
    };
}

// =============================================================================
// Counter ids
// =============================================================================

/// Assert that a counter id addresses an existing slot.
///
/// **Invariant**: `0 <= id <= max_counter_id`
///
/// Used in: `CountersReader` accessors, `CountersManager::free`, `Position`
macro_rules! debug_assert_counter_in_range {
    ($id:expr, $max:expr) => {
        debug_assert!(
            $id >= 0 && $id <= $max,
            "counter id {} outside the slot range [0, {}]",
            $id,
            $max
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_counter_in_range;
pub(crate) use debug_assert_frame_aligned;
pub(crate) use debug_assert_in_bounds;
pub(crate) use debug_assert_offset_aligned;
