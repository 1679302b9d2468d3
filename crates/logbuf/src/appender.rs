use crate::buffer::AtomicBuffer;
use crate::claim::BufferClaim;
use crate::frame::{
    self, align_frame_length, frame_flags, frame_length_ordered, pack_tail, set_frame_type,
    HeaderWriter, ReservedValueSupplier, BEGIN_FRAG_FLAG, END_FRAG_FLAG, FRAME_ALIGNMENT,
    FRAME_TYPE_PADDING, HEADER_LENGTH, RESERVED_VALUE_OFFSET,
};
use crate::invariants::debug_assert_frame_aligned;

// =============================================================================
// RESERVATION PROTOCOL
// =============================================================================
//
// A term has one tail: an i64 packing (term id << 32 | term offset). Every
// producer arrival is a single SeqCst fetch-add of its aligned frame length,
// which is the sole arbiter: each producer receives a disjoint, ordered
// [term_offset, term_offset + aligned) range and never contends again.
//
// **Producer (append path):**
// 1. fetch_add the tail by the aligned frame length (SeqCst)
// 2. If the granted range fits: write header, payload, reserved value
//    (all plain stores into the private range)
// 3. Release-store the frame length (publishes the frame)
//
// **Consumer (scan path, external to this crate):**
// 1. Acquire-load the frame length at the next offset
// 2. Zero → nothing published yet; padding type → skip to the next term
// 3. Non-zero → the header and payload are fully visible
//
// The tail never decreases, so a producer whose grant does not fit must
// still leave the term well-formed: a grant straddling the end emits one
// padding frame over the remainder (TRIPPED), a grant at exactly the end
// writes nothing (TRIPPED), and a grant past the end writes nothing
// (FAILED). The sentinel is packed under the grant's term id so the caller
// knows which term to rotate away from.
//
// =============================================================================

/// Result sentinel: the grant hit the end of the term; the caller rotates
/// to the next partition.
pub const TRIPPED: i32 = -1;
/// Result sentinel: the grant began past the end of the term; the caller
/// retries on the new term.
pub const FAILED: i32 = -2;

/// Number of term partitions rotated through by the log.
pub const PARTITION_COUNT: usize = 3;

/// Offset of the per-partition tail counters within the metadata buffer.
pub const TERM_TAIL_COUNTERS_OFFSET: usize = 0;

/// Total length of the tail-counter block.
pub const TERM_TAIL_COUNTERS_LENGTH: usize = PARTITION_COUNT * std::mem::size_of::<i64>();

/// Byte offset of a partition's tail counter within the metadata buffer.
#[inline]
pub const fn tail_counter_offset(partition_index: usize) -> usize {
    TERM_TAIL_COUNTERS_OFFSET + partition_index * std::mem::size_of::<i64>()
}

/// Seeds a partition's tail with `(term_id, offset 0)`. Done once per term
/// rotation, before producers arrive.
pub fn initialize_tail_with_term_id(
    metadata: &AtomicBuffer,
    partition_index: usize,
    term_id: i32,
) {
    metadata.put_i64_ordered(tail_counter_offset(partition_index), pack_tail(term_id, 0));
}

/// Multi-producer appender over one term buffer.
///
/// Appenders are cheap views; any number may exist over the same partition
/// and all coordinate through the tail counter alone.
pub struct TermAppender {
    term_buffer: AtomicBuffer,
    metadata: AtomicBuffer,
    tail_offset: usize,
}

impl TermAppender {
    /// Creates an appender for `partition_index` of a log.
    ///
    /// # Panics
    ///
    /// Panics if the partition index is out of range, the term length is not
    /// a frame-alignable power of two, or the metadata buffer cannot hold
    /// the tail counters.
    pub fn new(term_buffer: AtomicBuffer, metadata: AtomicBuffer, partition_index: usize) -> Self {
        assert!(
            partition_index < PARTITION_COUNT,
            "partition index {partition_index} outside 0..{PARTITION_COUNT}"
        );
        let term_length = term_buffer.capacity();
        assert!(
            term_length.is_power_of_two() && term_length >= FRAME_ALIGNMENT,
            "term length {term_length} must be a power of two of at least {FRAME_ALIGNMENT}"
        );
        assert!(
            term_length <= i32::MAX as usize,
            "term length {term_length} exceeds the 31-bit offset space"
        );
        assert!(
            metadata.capacity() >= TERM_TAIL_COUNTERS_OFFSET + TERM_TAIL_COUNTERS_LENGTH,
            "metadata capacity {} cannot hold the tail counters",
            metadata.capacity()
        );

        Self {
            term_buffer,
            metadata,
            tail_offset: tail_counter_offset(partition_index),
        }
    }

    /// The term buffer this appender writes into.
    #[inline]
    pub fn term_buffer(&self) -> &AtomicBuffer {
        &self.term_buffer
    }

    /// Acquire load of the raw packed tail.
    #[inline]
    pub fn raw_tail_volatile(&self) -> i64 {
        self.metadata.get_i64_volatile(self.tail_offset)
    }

    /// Reserves a frame for the caller to fill via `claim_out`.
    ///
    /// On success the header is already written, the claim wraps
    /// `[term_offset, term_offset + frame_length)`, and the return value is
    /// the post-append term offset. The caller publishes the frame by
    /// committing the claim. On end of term the return packs the term id
    /// over a [`TRIPPED`] or [`FAILED`] low word; check the sign of the low
    /// 32 bits.
    pub fn claim<H>(&self, header: &H, length: usize, claim_out: &mut BufferClaim) -> i64
    where
        H: HeaderWriter,
    {
        let frame_length = length + HEADER_LENGTH;
        let aligned_length = align_frame_length(frame_length);

        let raw_tail = self.get_and_add_raw_tail(aligned_length);
        let term_offset = frame::term_offset(raw_tail);
        let term_id = frame::term_id(raw_tail);
        let term_length = self.term_buffer.capacity();

        let resulting_offset = term_offset + aligned_length as i64;
        if resulting_offset > term_length as i64 {
            return self.handle_end_of_log(header, term_offset, term_length, term_id);
        }

        let frame_offset = term_offset as usize;
        header.write(&self.term_buffer, frame_offset, frame_length, term_id);
        claim_out.wrap(&self.term_buffer, frame_offset, frame_length);
        resulting_offset
    }

    /// Appends `payload` as a single frame.
    ///
    /// Return convention as for [`claim`](Self::claim); on success the frame
    /// is already published.
    pub fn append_unfragmented<H>(
        &self,
        header: &H,
        payload: &[u8],
        reserved_value_supplier: Option<ReservedValueSupplier>,
    ) -> i64
    where
        H: HeaderWriter,
    {
        let frame_length = payload.len() + HEADER_LENGTH;
        let aligned_length = align_frame_length(frame_length);

        let raw_tail = self.get_and_add_raw_tail(aligned_length);
        let term_offset = frame::term_offset(raw_tail);
        let term_id = frame::term_id(raw_tail);
        let term_length = self.term_buffer.capacity();

        let resulting_offset = term_offset + aligned_length as i64;
        if resulting_offset > term_length as i64 {
            return self.handle_end_of_log(header, term_offset, term_length, term_id);
        }

        let frame_offset = term_offset as usize;
        header.write(&self.term_buffer, frame_offset, frame_length, term_id);
        self.term_buffer
            .put_bytes(frame_offset + HEADER_LENGTH, payload);

        if let Some(supplier) = reserved_value_supplier {
            let reserved_value = supplier(&self.term_buffer, frame_offset, frame_length);
            self.term_buffer
                .put_i64(frame_offset + RESERVED_VALUE_OFFSET, reserved_value);
        }

        frame_length_ordered(&self.term_buffer, frame_offset, frame_length as i32);
        resulting_offset
    }

    /// Appends `payload` as a run of fragments of at most
    /// `max_payload_length` bytes each, reserved with a single fetch-add.
    ///
    /// The first fragment carries `BEGIN_FRAG_FLAG`, the last
    /// `END_FRAG_FLAG`, middle fragments neither; each fragment's length is
    /// release-published individually so consumers can reassemble as
    /// fragments land. `max_payload_length + HEADER_LENGTH` must be a
    /// multiple of the frame alignment so the fragments tile the reserved
    /// range exactly.
    pub fn append_fragmented<H>(
        &self,
        header: &H,
        payload: &[u8],
        max_payload_length: usize,
        reserved_value_supplier: Option<ReservedValueSupplier>,
    ) -> i64
    where
        H: HeaderWriter,
    {
        debug_assert_frame_aligned!(max_payload_length + HEADER_LENGTH, FRAME_ALIGNMENT);
        debug_assert!(!payload.is_empty(), "fragmented append of an empty payload");

        let length = payload.len();
        let num_max_payloads = length / max_payload_length;
        let remaining_payload = length % max_payload_length;
        let last_frame_length = if remaining_payload > 0 {
            align_frame_length(remaining_payload + HEADER_LENGTH)
        } else {
            0
        };
        let required_length =
            num_max_payloads * (max_payload_length + HEADER_LENGTH) + last_frame_length;

        let raw_tail = self.get_and_add_raw_tail(required_length);
        let term_offset = frame::term_offset(raw_tail);
        let term_id = frame::term_id(raw_tail);
        let term_length = self.term_buffer.capacity();

        let resulting_offset = term_offset + required_length as i64;
        if resulting_offset > term_length as i64 {
            return self.handle_end_of_log(header, term_offset, term_length, term_id);
        }

        let mut flags = BEGIN_FRAG_FLAG;
        let mut frame_offset = term_offset as usize;
        let mut remaining = length;
        loop {
            let bytes_to_write = remaining.min(max_payload_length);
            let frame_length = bytes_to_write + HEADER_LENGTH;
            let aligned_length = align_frame_length(frame_length);
            let payload_offset = length - remaining;

            header.write(&self.term_buffer, frame_offset, frame_length, term_id);
            self.term_buffer.put_bytes(
                frame_offset + HEADER_LENGTH,
                &payload[payload_offset..payload_offset + bytes_to_write],
            );

            if remaining <= max_payload_length {
                flags |= END_FRAG_FLAG;
            }
            frame_flags(&self.term_buffer, frame_offset, flags);

            if let Some(supplier) = reserved_value_supplier {
                let reserved_value = supplier(&self.term_buffer, frame_offset, frame_length);
                self.term_buffer
                    .put_i64(frame_offset + RESERVED_VALUE_OFFSET, reserved_value);
            }

            frame_length_ordered(&self.term_buffer, frame_offset, frame_length as i32);

            flags = 0;
            frame_offset += aligned_length;
            remaining -= bytes_to_write;
            if remaining == 0 {
                break;
            }
        }

        resulting_offset
    }

    #[inline]
    fn get_and_add_raw_tail(&self, aligned_length: usize) -> i64 {
        self.metadata
            .get_and_add_i64(self.tail_offset, aligned_length as i64)
    }

    /// A grant that does not fit the term. The three cases keep the term
    /// well-formed for scanning consumers:
    /// - past the end: a racing producer already tripped this term; nothing
    ///   to write, the caller retries on the next term (FAILED).
    /// - exactly at the end: the term is full and already well-formed
    ///   (TRIPPED).
    /// - straddling the end: pad out the remainder so consumers march off
    ///   the term without special-case tail detection (TRIPPED).
    fn handle_end_of_log<H>(
        &self,
        header: &H,
        term_offset: i64,
        term_length: usize,
        term_id: i32,
    ) -> i64
    where
        H: HeaderWriter,
    {
        if term_offset > term_length as i64 {
            return pack_tail(term_id, FAILED);
        }

        if term_offset < term_length as i64 {
            let frame_offset = term_offset as usize;
            let padding_length = term_length - frame_offset;
            header.write(&self.term_buffer, frame_offset, padding_length, term_id);
            set_frame_type(&self.term_buffer, frame_offset, FRAME_TYPE_PADDING);
            frame_length_ordered(&self.term_buffer, frame_offset, padding_length as i32);
        }

        pack_tail(term_id, TRIPPED)
    }
}
