//! logbuf - Shared-Memory Counters Registry and Term Appender
//!
//! The low-level coordination core of a high-throughput messaging transport:
//! a fixed-capacity table of named 64-bit counters published to
//! out-of-process observers, and a multi-producer, lock-free, append-only
//! writer framing messages into a fixed-size term buffer.
//!
//! Both are built on [`AtomicBuffer`], a typed atomic view over a
//! caller-supplied byte region (typically a shared-memory mapping). The
//! crate does no I/O and no file mapping itself; it owns only the layout and
//! the ordering protocol that lets independent processes agree on it.
//!
//! # Key Features
//!
//! - Cache-line-pair isolated counter slots (no false sharing between
//!   writers)
//! - Single release store as the publication point for records and frames
//! - One atomic fetch-add per producer arrival on the term tail; the rest
//!   of an append is plain work over a private range
//! - Zero-copy claim/commit API for in-place message construction
//!
//! # Example
//!
//! ```
//! use logbuf_rs::{
//!     initialize_tail_with_term_id, AlignedRegion, CountersManager, CountersReader,
//!     DataHeaderWriter, Position, TermAppender, COUNTER_LENGTH, METADATA_LENGTH,
//! };
//!
//! // Counters: allocate, publish, observe.
//! let metadata = AlignedRegion::new(16 * METADATA_LENGTH);
//! let values = AlignedRegion::new(16 * COUNTER_LENGTH);
//! let mut manager = CountersManager::new(metadata.buffer(), values.buffer());
//!
//! let id = manager.allocate("messages-received", 0).unwrap();
//! let position = Position::new(values.buffer(), id);
//! position.set_ordered(128);
//!
//! let reader = CountersReader::new(metadata.buffer(), values.buffer());
//! assert_eq!(reader.counter_value(id), 128);
//!
//! // Term log: reserve, frame, publish.
//! let term = AlignedRegion::new(64 * 1024);
//! let log_metadata = AlignedRegion::new(64);
//! initialize_tail_with_term_id(&log_metadata.buffer(), 0, 0);
//!
//! let appender = TermAppender::new(term.buffer(), log_metadata.buffer(), 0);
//! let result = appender.append_unfragmented(&DataHeaderWriter, b"hello", None);
//! // The low 32 bits carry the post-append offset, or a negative sentinel
//! // at end of term; the sign of the low word is the success check.
//! assert!(result as i32 > 0);
//! ```

mod appender;
mod buffer;
mod claim;
mod counters;
pub mod frame;
mod invariants;
mod position;

pub use appender::{
    initialize_tail_with_term_id, tail_counter_offset, TermAppender, FAILED, PARTITION_COUNT,
    TERM_TAIL_COUNTERS_LENGTH, TERM_TAIL_COUNTERS_OFFSET, TRIPPED,
};
pub use buffer::{AlignedRegion, AtomicBuffer, BUFFER_ALIGNMENT, REGION_ALIGNMENT};
pub use claim::BufferClaim;
pub use counters::{
    CountersError, CountersManager, CountersReader, COUNTER_LENGTH, DEFAULT_TYPE_ID, KEY_LENGTH,
    MAX_LABEL_LENGTH, METADATA_LENGTH, NULL_COUNTER_ID, RECORD_ALLOCATED, RECORD_RECLAIMED,
    RECORD_UNUSED,
};
pub use frame::{
    DataHeaderWriter, HeaderWriter, ReservedValueSupplier, FRAME_ALIGNMENT, HEADER_LENGTH,
};
pub use position::{OwnedPosition, Position};
