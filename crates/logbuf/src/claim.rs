use crate::buffer::AtomicBuffer;
use crate::frame::{
    frame_length_ordered, set_frame_type, FRAME_LENGTH_OFFSET, FRAME_TYPE_PADDING, HEADER_LENGTH,
};

/// Zero-copy claim over a reserved frame in a term buffer.
///
/// A producer obtains a claim from [`TermAppender::claim`], writes the
/// payload directly into the claimed range, then commits to make the frame
/// visible to consumers. The claim wraps exactly
/// `[frame_offset, frame_offset + frame_length)` of the term; the header has
/// already been written, except for its length field.
///
/// A claim is a flyweight out-parameter so the reservation fast path
/// allocates nothing; the same instance can be re-wrapped across claims.
/// Using an unwrapped (or already committed) claim is a programming bug and
/// is caught by the debug bounds checks.
///
/// # Example
///
/// ```ignore
/// let mut claim = BufferClaim::new();
/// if appender.claim(&header, msg.len(), &mut claim) as i32 > 0 {
///     claim.buffer().put_bytes(claim.offset(), msg);
///     claim.commit();
/// }
/// ```
///
/// [`TermAppender::claim`]: crate::TermAppender::claim
pub struct BufferClaim {
    frame: AtomicBuffer,
}

impl BufferClaim {
    /// Creates an unwrapped claim.
    pub fn new() -> Self {
        Self {
            frame: AtomicBuffer::empty(),
        }
    }

    /// Binds this claim to a reserved frame range.
    pub(crate) fn wrap(&mut self, term_buffer: &AtomicBuffer, offset: usize, frame_length: usize) {
        self.frame = term_buffer.view(offset, frame_length);
    }

    /// The claimed frame region, header included.
    #[inline]
    pub fn buffer(&self) -> &AtomicBuffer {
        &self.frame
    }

    /// Offset of the payload within [`buffer`](Self::buffer).
    #[inline]
    pub fn offset(&self) -> usize {
        HEADER_LENGTH
    }

    /// Payload length in bytes.
    #[inline]
    pub fn length(&self) -> usize {
        self.frame.capacity().saturating_sub(HEADER_LENGTH)
    }

    /// Commits the claim, release-publishing the frame length.
    ///
    /// This is the claim's commit point: a consumer that acquire-loads a
    /// non-zero length observes the header and the payload written before
    /// this call.
    pub fn commit(&mut self) {
        let frame_length = self.frame.capacity();
        frame_length_ordered(&self.frame, FRAME_LENGTH_OFFSET, frame_length as i32);
        self.frame = AtomicBuffer::empty();
    }

    /// Aborts the claim, turning the reserved range into a padding frame so
    /// consumers skip it without stalling on a zero length.
    pub fn abort(&mut self) {
        let frame_length = self.frame.capacity();
        set_frame_type(&self.frame, 0, FRAME_TYPE_PADDING);
        frame_length_ordered(&self.frame, FRAME_LENGTH_OFFSET, frame_length as i32);
        self.frame = AtomicBuffer::empty();
    }
}

impl Default for BufferClaim {
    fn default() -> Self {
        Self::new()
    }
}
