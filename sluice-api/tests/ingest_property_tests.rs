//! Property-Based Tests for end-to-end ingestion
//!
//! **Property: Written rows match transform output**
//!
//! For any batch of N records where M have no fields, ingesting through the
//! identity transform commits exactly N-M rows, reports them in input order,
//! and leaves no row behind for any dropped record.

mod support;

use proptest::prelude::*;
use sluice_test_utils::fixtures::identity_module;
use sluice_test_utils::generators::arb_records;
use support::*;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_committed_rows_match_transform_output(records in arb_records(24)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = Harness::new();
            h.install(KEY, identity_module()).await;

            let expected_written: Vec<String> = records
                .iter()
                .filter(|r| !r.values.is_empty())
                .map(|r| r.id.clone())
                .collect();
            let expected_dropped: Vec<String> = records
                .iter()
                .filter(|r| r.values.is_empty())
                .map(|r| r.id.clone())
                .collect();

            let outcome = h
                .pipeline
                .ingest(request(COLLECTION, KEY, records))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_eq!(outcome.written_ids(), expected_written.clone());
            prop_assert_eq!(&outcome.dropped, &expected_dropped);
            prop_assert!(outcome.failed.is_empty());
            prop_assert_eq!(h.row_count().await, expected_written.len());

            for id in &expected_dropped {
                prop_assert!(h.row(id).await.is_none(), "dropped record {} was written", id);
            }
            for id in &expected_written {
                prop_assert!(h.row(id).await.is_some(), "record {} is missing", id);
            }
            Ok(())
        })?;
    }
}
