//! Frame descriptor for the term log.
//!
//! A frame is a 32-byte header, a payload, and trailing padding up to the
//! 32-byte frame alignment. The header layout is fixed so that independent
//! writers and out-of-process consumers agree on it byte for byte:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  0..4    frame length (i32, published last, ordered)    │
//! │  4       version (u8)                                   │
//! │  5       flags (u8: BEGIN_FRAG / END_FRAG)              │
//! │  6..8    frame type (u16: DATA or PADDING)              │
//! │  8..12   term offset (i32)                              │
//! │  12..16  term id (i32)                                  │
//! │  16..24  reserved value (i64)                           │
//! │  24..32  spare for outer-transport fields               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The frame length is the commit point: every other field and the payload
//! are written first, then the length is release-stored. A consumer that
//! acquire-loads a non-zero length observes a fully initialized frame.

use crate::buffer::AtomicBuffer;

/// Alignment of every frame start and length within a term.
pub const FRAME_ALIGNMENT: usize = 32;

/// Length of the frame header in bytes.
pub const HEADER_LENGTH: usize = 32;

pub const FRAME_LENGTH_OFFSET: usize = 0;
pub const VERSION_OFFSET: usize = 4;
pub const FLAGS_OFFSET: usize = 5;
pub const TYPE_OFFSET: usize = 6;
pub const TERM_OFFSET_OFFSET: usize = 8;
pub const TERM_ID_OFFSET: usize = 12;
pub const RESERVED_VALUE_OFFSET: usize = 16;

/// Header version written by [`DataHeaderWriter`].
pub const CURRENT_VERSION: u8 = 1;

/// Frame type for skippable padding emitted at end of term.
pub const FRAME_TYPE_PADDING: u16 = 0x00;
/// Frame type for application data.
pub const FRAME_TYPE_DATA: u16 = 0x01;

/// Flag marking the first fragment of a fragmented message.
pub const BEGIN_FRAG_FLAG: u8 = 0b1000_0000;
/// Flag marking the last fragment of a fragmented message.
pub const END_FRAG_FLAG: u8 = 0b0100_0000;
/// Flags carried by an unfragmented message.
pub const UNFRAGMENTED_FLAGS: u8 = BEGIN_FRAG_FLAG | END_FRAG_FLAG;

const _: () = assert!(HEADER_LENGTH % FRAME_ALIGNMENT == 0);
const _: () = assert!(RESERVED_VALUE_OFFSET % std::mem::size_of::<i64>() == 0);

/// Rounds `length` up to the next frame-alignment boundary.
#[inline]
pub const fn align_frame_length(length: usize) -> usize {
    (length + (FRAME_ALIGNMENT - 1)) & !(FRAME_ALIGNMENT - 1)
}

// ---------------------------------------------------------------------
// TAIL PACKING
// ---------------------------------------------------------------------
//
// The tail of a term is a single i64: term id in the high 32 bits, term
// offset (unsigned) in the low 32 bits. Producers advance it with one
// fetch-add; the offset half also carries the TRIPPED/FAILED sentinels on
// the appender's return path, distinguished by sign.

/// Packs a term id and term offset into a raw tail value.
#[inline]
pub const fn pack_tail(term_id: i32, term_offset: i32) -> i64 {
    ((term_id as i64) << 32) | (term_offset as i64 & 0xFFFF_FFFF)
}

/// Extracts the term id from a raw tail value.
#[inline]
pub const fn term_id(raw_tail: i64) -> i32 {
    (raw_tail >> 32) as i32
}

/// Extracts the term offset from a raw tail value.
///
/// Returned as `i64` so that a tail that has been driven past the end of the
/// term by racing producers still compares correctly against the term length.
#[inline]
pub const fn term_offset(raw_tail: i64) -> i64 {
    raw_tail & 0xFFFF_FFFF
}

// ---------------------------------------------------------------------
// FRAME FIELD ACCESS
// ---------------------------------------------------------------------

/// Acquire load of a frame's length field. Zero means not yet published.
#[inline]
pub fn frame_length_volatile(buffer: &AtomicBuffer, frame_offset: usize) -> i32 {
    buffer.get_i32_volatile(frame_offset + FRAME_LENGTH_OFFSET)
}

/// Release store of a frame's length field. This is the commit point that
/// makes the frame visible to consumers.
#[inline]
pub fn frame_length_ordered(buffer: &AtomicBuffer, frame_offset: usize, length: i32) {
    buffer.put_i32_ordered(frame_offset + FRAME_LENGTH_OFFSET, length);
}

#[inline]
pub fn frame_type(buffer: &AtomicBuffer, frame_offset: usize) -> u16 {
    buffer.get_u16(frame_offset + TYPE_OFFSET)
}

#[inline]
pub fn set_frame_type(buffer: &AtomicBuffer, frame_offset: usize, frame_type: u16) {
    buffer.put_u16(frame_offset + TYPE_OFFSET, frame_type);
}

#[inline]
pub fn frame_flags(buffer: &AtomicBuffer, frame_offset: usize, flags: u8) {
    buffer.put_u8(frame_offset + FLAGS_OFFSET, flags);
}

#[inline]
pub fn frame_flags_at(buffer: &AtomicBuffer, frame_offset: usize) -> u8 {
    buffer.get_u8(frame_offset + FLAGS_OFFSET)
}

#[inline]
pub fn frame_version(buffer: &AtomicBuffer, frame_offset: usize) -> u8 {
    buffer.get_u8(frame_offset + VERSION_OFFSET)
}

#[inline]
pub fn is_padding_frame(buffer: &AtomicBuffer, frame_offset: usize) -> bool {
    frame_type(buffer, frame_offset) == FRAME_TYPE_PADDING
}

// ---------------------------------------------------------------------
// COLLABORATOR INTERFACES
// ---------------------------------------------------------------------

/// Writes a frame header at a granted offset.
///
/// Implementations receive `(buffer, offset, frame_length, term_id)` and
/// must write every header field **except the frame length**: the appender
/// (or a claim's `commit`) publishes the length with release ordering as the
/// final step, and an eagerly written length would expose a half-built frame.
pub trait HeaderWriter {
    fn write(&self, buffer: &AtomicBuffer, offset: usize, frame_length: usize, term_id: i32);
}

/// Default header writer for data frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataHeaderWriter;

impl HeaderWriter for DataHeaderWriter {
    fn write(&self, buffer: &AtomicBuffer, offset: usize, _frame_length: usize, term_id: i32) {
        buffer.put_u8(offset + VERSION_OFFSET, CURRENT_VERSION);
        buffer.put_u8(offset + FLAGS_OFFSET, UNFRAGMENTED_FLAGS);
        buffer.put_u16(offset + TYPE_OFFSET, FRAME_TYPE_DATA);
        buffer.put_i32(offset + TERM_OFFSET_OFFSET, offset as i32);
        buffer.put_i32(offset + TERM_ID_OFFSET, term_id);
    }
}

/// Computes the reserved value for a frame being appended.
///
/// Called with `(buffer, frame_offset, frame_length)` after the payload is
/// in place; the result is stored at [`RESERVED_VALUE_OFFSET`] before the
/// length is published.
pub type ReservedValueSupplier = fn(&AtomicBuffer, usize, usize) -> i64;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AlignedRegion;

    #[test]
    fn test_align_frame_length() {
        assert_eq!(align_frame_length(0), 0);
        assert_eq!(align_frame_length(1), 32);
        assert_eq!(align_frame_length(32), 32);
        assert_eq!(align_frame_length(33), 64);
        assert_eq!(align_frame_length(96), 96);
    }

    #[test]
    fn test_tail_packing_round_trip() {
        let raw = pack_tail(7, 4096);
        assert_eq!(term_id(raw), 7);
        assert_eq!(term_offset(raw), 4096);

        // Sentinels live in the low word without disturbing the term id.
        let tripped = pack_tail(7, -1);
        assert_eq!(term_id(tripped), 7);
        assert_eq!(term_offset(tripped) as u32 as i32, -1);
    }

    #[test]
    fn test_header_writer_leaves_length_unwritten() {
        let region = AlignedRegion::new(256);
        let buffer = region.buffer();

        DataHeaderWriter.write(&buffer, 64, 96, 3);

        assert_eq!(frame_length_volatile(&buffer, 64), 0);
        assert_eq!(frame_version(&buffer, 64), CURRENT_VERSION);
        assert_eq!(frame_type(&buffer, 64), FRAME_TYPE_DATA);
        assert_eq!(buffer.get_i32(64 + TERM_OFFSET_OFFSET), 64);
        assert_eq!(buffer.get_i32(64 + TERM_ID_OFFSET), 3);
    }

    #[test]
    fn test_padding_frame_detection() {
        let region = AlignedRegion::new(64);
        let buffer = region.buffer();

        set_frame_type(&buffer, 0, FRAME_TYPE_PADDING);
        assert!(is_padding_frame(&buffer, 0));

        set_frame_type(&buffer, 0, FRAME_TYPE_DATA);
        assert!(!is_padding_frame(&buffer, 0));
    }
}
