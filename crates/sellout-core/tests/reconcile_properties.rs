// crates/sellout-core/tests/reconcile_properties.rs
// ============================================================================
// Module: Reconciliation Property Tests
// Description: Property-based coverage for dedup, chunking, and replay.
// Purpose: Ensure persisted state depends only on the distinct input records.
// Dependencies: sellout-core, proptest
// ============================================================================

//! ## Overview
//! Generates store configuration batches with colliding keys and checks that
//! the last occurrence wins, that chunk size never changes the final state,
//! that replaying a batch is idempotent, and that every input record is
//! accounted for.

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use sellout_core::BlockName;
use sellout_core::EntityRow;
use sellout_core::InMemoryIngestStore;
use sellout_core::runtime::HandlerContext;
use sellout_core::runtime::reconcile_block;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds raw records from `(store suffix, goal, padded)` triples. Padding
/// and case vary so several raw codes collapse onto one key.
fn records(shape: &[(u8, u32, bool)]) -> Vec<Value> {
    shape.iter()
        .map(|(store, goal, padded)| {
            let code = if *padded { format!("  s{store} ") } else { format!("S{store}") };
            json!({"storeCode": code, "goalAmount": goal.to_string()})
        })
        .collect()
}

fn context(chunk_size: usize) -> HandlerContext {
    HandlerContext {
        calculate_date: None,
        chunk_size,
    }
}

fn reconcile_into(store: &InMemoryIngestStore, batch: Vec<Value>, chunk_size: usize) {
    reconcile_block(store, BlockName::StoreConfiguration, batch, &context(chunk_size)).unwrap();
}

fn snapshot(store: &InMemoryIngestStore) -> Vec<EntityRow> {
    store.entities(BlockName::StoreConfiguration).unwrap()
}

fn batch_strategy() -> impl Strategy<Value = Vec<(u8, u32, bool)>> {
    prop::collection::vec((0u8 .. 12, 0u32 .. 10_000, any::<bool>()), 1 .. 60)
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn last_occurrence_wins(shape in batch_strategy()) {
        let store = InMemoryIngestStore::new();
        reconcile_into(&store, records(&shape), 7);

        let mut expected: BTreeMap<String, u32> = BTreeMap::new();
        for (code, goal, _) in &shape {
            expected.insert(format!("S{code}"), *goal);
        }
        let stored = snapshot(&store);
        prop_assert_eq!(stored.len(), expected.len());
        for row in stored {
            let goal = row.document.get("goalAmount").and_then(Value::as_u64).unwrap();
            prop_assert_eq!(Some(&u32::try_from(goal).unwrap()), expected.get(&row.natural_key));
        }
    }

    #[test]
    fn chunk_size_does_not_change_final_state(shape in batch_strategy(), small in 1usize .. 5) {
        let fine = InMemoryIngestStore::new();
        let coarse = InMemoryIngestStore::new();
        reconcile_into(&fine, records(&shape), small);
        reconcile_into(&coarse, records(&shape), 10_000);
        prop_assert_eq!(snapshot(&fine), snapshot(&coarse));
    }

    #[test]
    fn replaying_a_batch_is_idempotent(shape in batch_strategy()) {
        let store = InMemoryIngestStore::new();
        reconcile_into(&store, records(&shape), 5);
        let first = snapshot(&store);
        reconcile_into(&store, records(&shape), 5);
        prop_assert_eq!(first, snapshot(&store));
    }

    #[test]
    fn every_record_is_accounted_for(shape in batch_strategy(), broken in prop::collection::vec(any::<bool>(), 60)) {
        let mut batch = records(&shape);
        for (record, is_broken) in batch.iter_mut().zip(&broken) {
            if *is_broken {
                record["goalAmount"] = json!("not a number");
            }
        }
        let total = batch.len() as u64;
        let store = InMemoryIngestStore::new();
        let outcome = reconcile_block(
            &store,
            BlockName::StoreConfiguration,
            batch,
            &context(3),
        )
        .unwrap();
        let errors = outcome.errors.len() as u64;
        prop_assert_eq!(outcome.accepted + errors + outcome.duplicates_dropped, total);
        prop_assert_eq!(outcome.chunks_completed, outcome.chunks_total);
    }
}
