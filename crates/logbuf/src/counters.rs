use crate::buffer::AtomicBuffer;
use crate::invariants::debug_assert_counter_in_range;
use std::collections::VecDeque;
use std::ops::Deref;
use thiserror::Error;

// =============================================================================
// RECORD LAYOUT & PUBLICATION PROTOCOL
// =============================================================================
//
// The registry is two parallel regions addressed by the same slot index:
//
// - Values region: 128-byte slots, the i64 counter value at offset 0 and the
//   rest padding. The padding is an invariant, not a convenience: it keeps
//   each counter on its own cache-line pair so independent writers never
//   false-share.
// - Metadata region: 512-byte slots holding state, type id, key, and label.
//
// Publication follows a single-commit-point protocol: the manager writes
// every metadata field with plain stores, then release-stores
// RECORD_ALLOCATED into the state field. A reader that acquire-loads the
// state and sees RECORD_ALLOCATED is guaranteed to see the type id, key, and
// label of that same allocation. Freeing release-stores RECORD_RECLAIMED;
// the value slot keeps its final value until the id is reused, at which
// point it is release-zeroed before the record is republished.
//
// =============================================================================

/// Length of a values-region slot; the value itself is the first 8 bytes.
pub const COUNTER_LENGTH: usize = 128;

/// Length of a metadata-region slot.
pub const METADATA_LENGTH: usize = 4 * COUNTER_LENGTH;

/// Offset of the record state field within a metadata slot.
pub const RECORD_STATE_OFFSET: usize = 0;
/// Offset of the type id field within a metadata slot.
pub const TYPE_ID_OFFSET: usize = 4;
/// Offset of the key bytes within a metadata slot.
pub const KEY_OFFSET: usize = 8;
/// Length of the caller-defined key region.
pub const KEY_LENGTH: usize = 120;
/// Offset of the label length field within a metadata slot.
pub const LABEL_LENGTH_OFFSET: usize = KEY_OFFSET + KEY_LENGTH;
/// Offset of the label bytes within a metadata slot.
pub const LABEL_OFFSET: usize = LABEL_LENGTH_OFFSET + 4;
/// Maximum stored label length; longer labels are truncated.
pub const MAX_LABEL_LENGTH: usize = METADATA_LENGTH - LABEL_OFFSET;

/// Record state: the slot has never been allocated.
pub const RECORD_UNUSED: i32 = 0;
/// Record state: the slot is live.
pub const RECORD_ALLOCATED: i32 = 1;
/// Record state: the slot was freed and awaits reuse.
pub const RECORD_RECLAIMED: i32 = -1;

/// Sentinel returned by searches that find no matching counter.
pub const NULL_COUNTER_ID: i32 = -1;

/// Type id used when the caller has no domain-specific one.
pub const DEFAULT_TYPE_ID: i32 = 0;

const _: () = assert!(METADATA_LENGTH == 512);
const _: () = assert!(LABEL_OFFSET == 132);
const _: () = assert!(MAX_LABEL_LENGTH == 380);

/// Errors surfaced by the counters registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CountersError {
    /// Every slot is in use; the registry never grows.
    #[error("counters capacity exhausted (max counter id {max_counter_id})")]
    OutOfCapacity {
        /// The highest id the configured regions can hold.
        max_counter_id: i32,
    },
    /// The queried id has no allocated record.
    #[error("no allocated counter for id {id}")]
    NotFound {
        /// The queried counter id.
        id: i32,
    },
}

// ---------------------------------------------------------------------
// READER
// ---------------------------------------------------------------------

/// Read-only view over a counters registry.
///
/// Readers never mutate and tolerate concurrent writers: a slot's state may
/// change between the state read and subsequent field reads, so accessors
/// that need a live record re-confirm the state and surface `NotFound`
/// rather than returning another tenant's fields as authoritative.
pub struct CountersReader {
    metadata: AtomicBuffer,
    values: AtomicBuffer,
    max_counter_id: i32,
}

impl CountersReader {
    /// Wraps the metadata and values regions of a registry.
    ///
    /// # Panics
    ///
    /// Panics unless both regions are whole multiples of their slot lengths
    /// and the metadata region can describe every values slot
    /// (`metadata.capacity() >= 2 * values.capacity()`).
    pub fn new(metadata: AtomicBuffer, values: AtomicBuffer) -> Self {
        assert!(
            values.capacity() % COUNTER_LENGTH == 0,
            "values capacity {} is not a multiple of the {}-byte slot",
            values.capacity(),
            COUNTER_LENGTH
        );
        assert!(
            metadata.capacity() % METADATA_LENGTH == 0,
            "metadata capacity {} is not a multiple of the {}-byte slot",
            metadata.capacity(),
            METADATA_LENGTH
        );
        assert!(
            metadata.capacity() >= values.capacity() * 2,
            "metadata capacity {} cannot describe values capacity {}",
            metadata.capacity(),
            values.capacity()
        );

        let max_counter_id = (values.capacity() / COUNTER_LENGTH) as i32 - 1;
        Self {
            metadata,
            values,
            max_counter_id,
        }
    }

    /// The highest id this registry can hold.
    #[inline]
    pub fn max_counter_id(&self) -> i32 {
        self.max_counter_id
    }

    /// The metadata region backing this view.
    #[inline]
    pub fn metadata_buffer(&self) -> AtomicBuffer {
        self.metadata
    }

    /// The values region backing this view.
    #[inline]
    pub fn values_buffer(&self) -> AtomicBuffer {
        self.values
    }

    /// Byte offset of a counter's value slot. Pure arithmetic, no index
    /// structure exists.
    #[inline]
    pub const fn counter_offset(id: i32) -> usize {
        id as usize * COUNTER_LENGTH
    }

    /// Byte offset of a counter's metadata slot.
    #[inline]
    pub const fn metadata_offset(id: i32) -> usize {
        id as usize * METADATA_LENGTH
    }

    /// Acquire load of a record's state.
    pub fn counter_state(&self, id: i32) -> i32 {
        debug_assert_counter_in_range!(id, self.max_counter_id);
        self.metadata
            .get_i32_volatile(Self::metadata_offset(id) + RECORD_STATE_OFFSET)
    }

    /// Type id of an allocated record.
    pub fn counter_type_id(&self, id: i32) -> Result<i32, CountersError> {
        if self.counter_state(id) != RECORD_ALLOCATED {
            return Err(CountersError::NotFound { id });
        }
        Ok(self.metadata.get_i32(Self::metadata_offset(id) + TYPE_ID_OFFSET))
    }

    /// Key bytes of an allocated record.
    pub fn counter_key(&self, id: i32) -> Result<[u8; KEY_LENGTH], CountersError> {
        if self.counter_state(id) != RECORD_ALLOCATED {
            return Err(CountersError::NotFound { id });
        }
        let mut key = [0u8; KEY_LENGTH];
        self.metadata
            .get_bytes(Self::metadata_offset(id) + KEY_OFFSET, &mut key);
        Ok(key)
    }

    /// Label of an allocated record.
    pub fn counter_label(&self, id: i32) -> Result<String, CountersError> {
        if self.counter_state(id) != RECORD_ALLOCATED {
            return Err(CountersError::NotFound { id });
        }
        Ok(self.label_at(Self::metadata_offset(id)))
    }

    /// Acquire load of a counter's value.
    pub fn counter_value(&self, id: i32) -> i64 {
        debug_assert_counter_in_range!(id, self.max_counter_id);
        self.values.get_i64_volatile(Self::counter_offset(id))
    }

    /// Iterates allocated records in slot order, stopping at the first slot
    /// that has never been used. The callback receives `(id, type_id,
    /// label)`.
    pub fn for_each<F>(&self, mut callback: F)
    where
        F: FnMut(i32, i32, &str),
    {
        for id in 0..=self.max_counter_id {
            let record_offset = Self::metadata_offset(id);
            match self.metadata.get_i32_volatile(record_offset + RECORD_STATE_OFFSET) {
                RECORD_ALLOCATED => {
                    let type_id = self.metadata.get_i32(record_offset + TYPE_ID_OFFSET);
                    let label = self.label_at(record_offset);
                    callback(id, type_id, &label);
                }
                RECORD_UNUSED => break,
                _ => {}
            }
        }
    }

    /// Finds the lowest allocated id with the given type id, or
    /// [`NULL_COUNTER_ID`].
    pub fn find_first_by_type_id(&self, type_id: i32) -> i32 {
        for id in 0..=self.max_counter_id {
            let record_offset = Self::metadata_offset(id);
            match self.metadata.get_i32_volatile(record_offset + RECORD_STATE_OFFSET) {
                RECORD_ALLOCATED => {
                    if self.metadata.get_i32(record_offset + TYPE_ID_OFFSET) == type_id {
                        return id;
                    }
                }
                RECORD_UNUSED => break,
                _ => {}
            }
        }
        NULL_COUNTER_ID
    }

    /// Decodes a label, clamping the stored length so a torn record can
    /// never walk outside its slot.
    fn label_at(&self, record_offset: usize) -> String {
        let length = self.metadata.get_i32(record_offset + LABEL_LENGTH_OFFSET);
        let length = (length.max(0) as usize).min(MAX_LABEL_LENGTH);
        let mut bytes = vec![0u8; length];
        self.metadata.get_bytes(record_offset + LABEL_OFFSET, &mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

// ---------------------------------------------------------------------
// MANAGER
// ---------------------------------------------------------------------

/// Allocates and frees counter slots.
///
/// Not thread-safe: one logical owner performs every allocate and free,
/// while any number of concurrent readers and per-slot writers operate
/// through [`CountersReader`] and [`Position`](crate::Position). Allocation
/// is a slow-path control operation; centralizing it keeps the freelist and
/// high-water mark free of CAS loops.
///
/// The read API is delegated: the manager derefs to its reader.
pub struct CountersManager {
    reader: CountersReader,
    free_list: VecDeque<i32>,
    id_high_water_mark: i32,
}

impl CountersManager {
    /// Creates a manager over the given regions. Region preconditions are
    /// those of [`CountersReader::new`].
    pub fn new(metadata: AtomicBuffer, values: AtomicBuffer) -> Self {
        Self {
            reader: CountersReader::new(metadata, values),
            free_list: VecDeque::new(),
            id_high_water_mark: -1,
        }
    }

    /// Allocates a counter with an empty key.
    pub fn allocate(&mut self, label: &str, type_id: i32) -> Result<i32, CountersError> {
        self.allocate_with_key(label, type_id, |_key| {})
    }

    /// Allocates a counter, letting `key_fn` fill the key region.
    ///
    /// The callback receives a zeroed view of exactly [`KEY_LENGTH`] bytes,
    /// so callers never juggle record offsets. The record becomes visible to
    /// readers only after the final release store of the state field; an
    /// allocation that unwinds out of `key_fn` leaves the candidate id
    /// unconsumed and the record unpublished.
    pub fn allocate_with_key<F>(
        &mut self,
        label: &str,
        type_id: i32,
        key_fn: F,
    ) -> Result<i32, CountersError>
    where
        F: FnOnce(&mut [u8]),
    {
        let id = self.candidate_id()?;
        let record_offset = CountersReader::metadata_offset(id);
        let metadata = self.reader.metadata;

        metadata.put_i32(record_offset + TYPE_ID_OFFSET, type_id);
        // SAFETY: the manager is the sole writer of an unpublished record;
        // readers cannot observe the span until the state store below.
        let key = unsafe { metadata.bytes_mut(record_offset + KEY_OFFSET, KEY_LENGTH) };
        key.fill(0);
        key_fn(key);
        Self::put_label(&metadata, record_offset, label.as_bytes());

        self.consume_candidate(id);
        metadata.put_i32_ordered(record_offset + RECORD_STATE_OFFSET, RECORD_ALLOCATED);
        Ok(id)
    }

    /// Zero-allocation path: key and label supplied as raw byte slices,
    /// truncated to [`KEY_LENGTH`] and [`MAX_LABEL_LENGTH`] respectively.
    pub fn allocate_with_key_and_label(
        &mut self,
        type_id: i32,
        key: &[u8],
        label: &[u8],
    ) -> Result<i32, CountersError> {
        let id = self.candidate_id()?;
        let record_offset = CountersReader::metadata_offset(id);
        let metadata = self.reader.metadata;

        metadata.put_i32(record_offset + TYPE_ID_OFFSET, type_id);
        // SAFETY: as in allocate_with_key.
        let key_dst = unsafe { metadata.bytes_mut(record_offset + KEY_OFFSET, KEY_LENGTH) };
        key_dst.fill(0);
        let key_length = key.len().min(KEY_LENGTH);
        key_dst[..key_length].copy_from_slice(&key[..key_length]);
        Self::put_label(&metadata, record_offset, label);

        self.consume_candidate(id);
        metadata.put_i32_ordered(record_offset + RECORD_STATE_OFFSET, RECORD_ALLOCATED);
        Ok(id)
    }

    /// Frees a counter, publishing the reclaimed state and queueing the id
    /// for FIFO reuse. The value slot is not zeroed here; that happens just
    /// before the id is republished.
    pub fn free(&mut self, id: i32) {
        debug_assert_counter_in_range!(id, self.reader.max_counter_id);
        self.reader.metadata.put_i32_ordered(
            CountersReader::metadata_offset(id) + RECORD_STATE_OFFSET,
            RECORD_RECLAIMED,
        );
        self.free_list.push_back(id);
    }

    /// Administrative release store of a counter's value, bypassing any
    /// per-slot handle.
    pub fn set_counter_value(&self, id: i32, value: i64) {
        debug_assert_counter_in_range!(id, self.reader.max_counter_id);
        self.reader
            .values
            .put_i64_ordered(CountersReader::counter_offset(id), value);
    }

    /// Next id to hand out: head of the freelist, else one past the
    /// high-water mark. Neither is consumed until every metadata write for
    /// the allocation has succeeded, so a failed allocation leaves both
    /// untouched.
    fn candidate_id(&self) -> Result<i32, CountersError> {
        let id = match self.free_list.front() {
            Some(&id) => id,
            None => self.id_high_water_mark + 1,
        };

        let slot_end = (id as usize + 1) * COUNTER_LENGTH;
        let record_end = (id as usize + 1) * METADATA_LENGTH;
        if slot_end > self.reader.values.capacity()
            || record_end > self.reader.metadata.capacity()
        {
            return Err(CountersError::OutOfCapacity {
                max_counter_id: self.reader.max_counter_id,
            });
        }
        Ok(id)
    }

    /// Consumes the candidate returned by `candidate_id`. A reused id has
    /// its stale value release-zeroed before the record is republished.
    fn consume_candidate(&mut self, id: i32) {
        match self.free_list.front() {
            Some(&head) if head == id => {
                self.free_list.pop_front();
                self.reader
                    .values
                    .put_i64_ordered(CountersReader::counter_offset(id), 0);
            }
            _ => self.id_high_water_mark = id,
        }
    }

    fn put_label(metadata: &AtomicBuffer, record_offset: usize, label: &[u8]) {
        let length = label.len().min(MAX_LABEL_LENGTH);
        metadata.put_i32(record_offset + LABEL_LENGTH_OFFSET, length as i32);
        metadata.put_bytes(record_offset + LABEL_OFFSET, &label[..length]);
    }
}

impl Deref for CountersManager {
    type Target = CountersReader;

    fn deref(&self) -> &CountersReader {
        &self.reader
    }
}
