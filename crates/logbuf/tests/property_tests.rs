//! Property-based tests for the registry and appender invariants.
//!
//! Coverage:
//! - Counters registry: capacity bound, FIFO freelist reuse, zeroed reuse
//! - Position: propose-max monotonicity
//! - Term appender: fetch-add partitioning, padding on trip

use logbuf_rs::frame::{
    self, frame_length_volatile, is_padding_frame, DataHeaderWriter, FRAME_TYPE_DATA,
};
use logbuf_rs::{
    AlignedRegion, CountersError, CountersManager, Position, TermAppender, COUNTER_LENGTH,
    METADATA_LENGTH, TRIPPED,
};
use proptest::prelude::*;

const NUM_SLOTS: usize = 16;

fn registry() -> (AlignedRegion, AlignedRegion) {
    (
        AlignedRegion::new(NUM_SLOTS * METADATA_LENGTH),
        AlignedRegion::new(NUM_SLOTS * COUNTER_LENGTH),
    )
}

// =============================================================================
// Capacity bound
// "simultaneously-allocated ids never exceed the slot count; the allocation
//  beyond that fails with OutOfCapacity"
// =============================================================================

proptest! {
    #[test]
    fn prop_allocated_count_never_exceeds_capacity(
        ops in prop::collection::vec(prop::bool::ANY, 1..200),
    ) {
        let (metadata, values) = registry();
        let mut manager = CountersManager::new(metadata.buffer(), values.buffer());
        let mut live: Vec<i32> = Vec::new();

        for (i, allocate) in ops.into_iter().enumerate() {
            if allocate {
                match manager.allocate(&format!("c-{i}"), 0) {
                    Ok(id) => {
                        prop_assert!(!live.contains(&id), "live id {} handed out twice", id);
                        live.push(id);
                    }
                    Err(CountersError::OutOfCapacity { .. }) => {
                        prop_assert_eq!(live.len(), NUM_SLOTS,
                            "capacity failure while only {} slots were live", live.len());
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            } else if let Some(id) = live.pop() {
                manager.free(id);
            }

            prop_assert!(live.len() <= NUM_SLOTS);
        }
    }
}

// =============================================================================
// Freelist FIFO reuse
// "freeing a, b, c makes the next allocations reuse a, b, c in order, each
//  observed with a zero value"
// =============================================================================

proptest! {
    #[test]
    fn prop_freelist_reuse_is_fifo_and_zeroed(
        free_picks in prop::collection::vec(any::<prop::sample::Index>(), 1..10),
    ) {
        let (metadata, values) = registry();
        let mut manager = CountersManager::new(metadata.buffer(), values.buffer());

        // Saturate the high-water mark so reuse must come from the freelist.
        let mut ids: Vec<i32> = (0..NUM_SLOTS)
            .map(|i| manager.allocate(&format!("c-{i}"), 0).unwrap())
            .collect();
        for &id in &ids {
            manager.set_counter_value(id, 1000 + i64::from(id));
        }

        let mut freed: Vec<i32> = Vec::new();
        for pick in free_picks {
            if ids.is_empty() {
                break;
            }
            let id = ids.remove(pick.index(ids.len()));
            manager.free(id);
            freed.push(id);
        }

        for &expected in &freed {
            let reused = manager.allocate("reused", 0).unwrap();
            prop_assert_eq!(reused, expected, "freelist reuse out of order");
            prop_assert_eq!(manager.counter_value(reused), 0,
                "stale value visible on reused id {}", reused);
        }
    }
}

// =============================================================================
// Propose-max monotonicity (single writer)
// "after any sequence of propose_max(v_i), the value is max(initial, v_1..n)"
// =============================================================================

proptest! {
    #[test]
    fn prop_propose_max_is_monotonic(
        initial in 0i64..1000,
        proposals in prop::collection::vec(-1000i64..2000, 0..50),
    ) {
        let values = AlignedRegion::new(NUM_SLOTS * COUNTER_LENGTH);
        let position = Position::new(values.buffer(), 2);
        position.set(initial);

        let mut expected = initial;
        for proposed in proposals {
            let updated = position.propose_max(proposed);
            prop_assert_eq!(updated, proposed > expected);
            expected = expected.max(proposed);
            prop_assert_eq!(position.get(), expected);
        }
    }
}

// =============================================================================
// Fetch-add partitioning
// "successive grants tile [0, total) without gap or overlap, and the
//  published frames reproduce exactly the granted lengths"
// =============================================================================

proptest! {
    #[test]
    fn prop_appends_tile_the_term(
        payload_lengths in prop::collection::vec(0usize..=256, 1..40),
    ) {
        let term = AlignedRegion::new(8192);
        let metadata = AlignedRegion::new(64);
        logbuf_rs::initialize_tail_with_term_id(&metadata.buffer(), 0, 1);
        let appender = TermAppender::new(term.buffer(), metadata.buffer(), 0);

        let header = DataHeaderWriter;
        let mut expected_offsets = Vec::new();
        let mut next_offset = 0usize;

        for length in payload_lengths {
            let aligned = frame::align_frame_length(length + frame::HEADER_LENGTH);
            let result = appender.append_unfragmented(&header, &vec![0xA5u8; length], None);

            if result as i32 >= 0 {
                prop_assert_eq!(result as usize, next_offset + aligned,
                    "grant did not start at the previous grant's end");
                expected_offsets.push((next_offset, length + frame::HEADER_LENGTH));
                next_offset += aligned;
            } else {
                // End of term: this and every later grant fails or trips.
                break;
            }
        }

        // Scan the term the way a consumer would and compare.
        let mut scan_offset = 0usize;
        for (frame_offset, frame_length) in expected_offsets {
            prop_assert_eq!(scan_offset, frame_offset);
            let scanned = frame_length_volatile(&term.buffer(), scan_offset);
            prop_assert_eq!(scanned as usize, frame_length);
            prop_assert_eq!(frame::frame_type(&term.buffer(), scan_offset), FRAME_TYPE_DATA);
            scan_offset += frame::align_frame_length(scanned as usize);
        }
        prop_assert_eq!(scan_offset, next_offset);
    }
}

// =============================================================================
// Padding on trip
// "a straddling grant writes exactly one padding frame over the remainder
//  and modifies nothing else in [term_offset, term_length)"
// =============================================================================

proptest! {
    #[test]
    fn prop_straddling_grant_pads_the_remainder(
        offset_steps in 0usize..8,
        payload in 225usize..=256,
    ) {
        const TERM_LENGTH: usize = 256;
        let term = AlignedRegion::new(TERM_LENGTH);
        let metadata = AlignedRegion::new(64);
        let term_offset = offset_steps * 32;
        metadata.buffer().put_i64(
            logbuf_rs::tail_counter_offset(0),
            frame::pack_tail(3, term_offset as i32),
        );
        let appender = TermAppender::new(term.buffer(), metadata.buffer(), 0);

        // aligned frame = 256..288 bytes, so every offset > 0 straddles and
        // offset 0 straddles whenever the frame exceeds the term.
        let aligned = frame::align_frame_length(payload + frame::HEADER_LENGTH);
        prop_assume!(term_offset + aligned > TERM_LENGTH);

        let result = appender.append_unfragmented(&DataHeaderWriter, &vec![1u8; payload], None);

        prop_assert_eq!(frame::term_offset(result) as u32 as i32, TRIPPED);
        prop_assert_eq!(frame::term_id(result), 3);

        if term_offset < TERM_LENGTH {
            let padding_length = TERM_LENGTH - term_offset;
            prop_assert!(is_padding_frame(&term.buffer(), term_offset));
            prop_assert_eq!(
                frame_length_volatile(&term.buffer(), term_offset) as usize,
                padding_length
            );
            // Bytes beyond the padding header are untouched.
            for check in ((term_offset + frame::HEADER_LENGTH)..TERM_LENGTH).step_by(8) {
                prop_assert_eq!(term.buffer().get_i64(check), 0);
            }
        }
    }
}
