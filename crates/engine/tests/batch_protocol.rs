mod common;

use common::*;
use relabel_engine::{
    BatchLedger, BatchMode, BatchStatus, BulkRow, EngineError, MutationRequest, SkipReason,
};

fn row(line: usize, key: &str, old: &str, new: &str) -> BulkRow {
    let field = |s: &str| Some(s.to_string());
    BulkRow {
        line,
        row_key: field(key),
        old_value: field(old),
        new_value: field(new),
    }
}

#[tokio::test]
async fn test_rename_by_value_records_every_matched_row() {
    let stores = Stores::new(&[(1, Some("Acme")), (2, Some("Acme")), (3, Some("Globex"))]).await;
    let orchestrator = stores.session.orchestrator();

    let outcome = orchestrator
        .execute_single("alice", &MutationRequest::new(by_value("Acme"), "Acme Corp"))
        .await
        .unwrap();

    assert_eq!(outcome.matched_count, 2);
    assert_eq!(customer_name(&stores.target, 1).await.as_deref(), Some("Acme Corp"));
    assert_eq!(customer_name(&stores.target, 2).await.as_deref(), Some("Acme Corp"));
    assert_eq!(customer_name(&stores.target, 3).await.as_deref(), Some("Globex"));

    let batch = stores.session.ledger().get(&outcome.batch_id).await.unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Done);
    assert_eq!(batch.total_rows, 2);
    assert_eq!(batch.mode, BatchMode::Single);
    assert_eq!(batch.operator, "alice");
    assert_eq!(batch.env_name, ENV_NAME);

    let details = stores.session.recorder().for_batch(&outcome.batch_id).await.unwrap();
    assert_eq!(details.len(), 2);
    assert!(details
        .iter()
        .all(|d| d.old_name.as_deref() == Some("Acme") && d.new_name == "Acme Corp"));
    let mut ids: Vec<_> = details.iter().map(|d| d.row_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn test_key_wins_over_old_value() {
    let stores = Stores::new(&[(1, Some("Acme")), (2, Some("Acme"))]).await;
    let request = MutationRequest::from_parts(Some("2"), Some("Acme"), "Acme Labs").unwrap();

    let outcome = stores.session.orchestrator().execute_single("bob", &request).await.unwrap();

    assert_eq!(outcome.matched_count, 1);
    assert_eq!(customer_name(&stores.target, 1).await.as_deref(), Some("Acme"));
    assert_eq!(customer_name(&stores.target, 2).await.as_deref(), Some("Acme Labs"));
}

#[tokio::test]
async fn test_zero_match_still_closes_batch_as_done() {
    let stores = Stores::new(&[(1, Some("Acme"))]).await;

    let outcome = stores
        .session
        .orchestrator()
        .execute_single("alice", &MutationRequest::new(by_key("404"), "Nobody"))
        .await
        .unwrap();

    assert_eq!(outcome.matched_count, 0);
    let batch = stores.session.ledger().get(&outcome.batch_id).await.unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Done);
    assert_eq!(batch.total_rows, 0);
    assert_eq!(stores.session.recorder().count_for_batch(&outcome.batch_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_null_value_is_recorded_as_null() {
    let stores = Stores::new(&[(7, None)]).await;

    let outcome = stores
        .session
        .orchestrator()
        .execute_single("alice", &MutationRequest::new(by_key("7"), "Named at last"))
        .await
        .unwrap();

    let details = stores.session.recorder().for_batch(&outcome.batch_id).await.unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].old_name, None);
}

#[tokio::test]
async fn test_blank_operator_is_rejected_before_any_batch() {
    let stores = Stores::new(&[(1, Some("Acme"))]).await;

    let err = stores
        .session
        .orchestrator()
        .execute_single("   ", &MutationRequest::new(by_key("1"), "X"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Validation { .. }));
    assert!(stores.session.ledger().list_recent(10).await.unwrap().is_empty());
    assert_eq!(customer_name(&stores.target, 1).await.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_bulk_skips_invalid_rows_and_counts_the_rest() {
    let stores = Stores::new(&[(1, Some("Acme")), (2, Some("Initech"))]).await;
    let rows = vec![row(2, "1", "", "X"), row(3, "", "", "")];

    let mut progress = Vec::new();
    let outcome = stores
        .session
        .orchestrator()
        .execute_batch("carol", &rows, |p| progress.push(*p))
        .await
        .unwrap();

    assert_eq!(outcome.processed_rows, 1);
    assert_eq!(outcome.total_matched, 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].line, 3);
    assert_eq!(outcome.warnings[0].reason, SkipReason::MissingPredicateAndNewValue);
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].processed, 1);
    assert_eq!(progress[0].total, 1);

    assert_eq!(customer_name(&stores.target, 1).await.as_deref(), Some("X"));
    assert_eq!(customer_name(&stores.target, 2).await.as_deref(), Some("Initech"));

    let batch = stores.session.ledger().get(&outcome.batch_id).await.unwrap().unwrap();
    assert_eq!(batch.mode, BatchMode::Batch);
    assert_eq!(batch.status, BatchStatus::Done);
    assert_eq!(batch.total_rows, 1);
}

#[tokio::test]
async fn test_bulk_total_sums_matches_across_rows() {
    let stores = Stores::new(&[(1, Some("Acme")), (2, Some("Acme")), (3, Some("Globex"))]).await;
    let rows = vec![row(2, "", "Acme", "Acme Corp"), row(3, "3", "", "Globex Ltd")];

    let outcome = stores
        .session
        .orchestrator()
        .execute_batch("carol", &rows, |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.total_matched, 3);
    assert_eq!(stores.session.recorder().count_for_batch(&outcome.batch_id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_target_failure_mid_batch_leaves_batch_failed() {
    let target = memory_pool().await;
    seed_customers(&target, &[(1, Some("Acme")), (2, Some("Globex")), (3, Some("Initech"))]).await;
    // The first unit's SELECT goes through, the second unit's does not
    let flaky = FailingPool::wrap(target.clone(), Fault::Statement("SELECT"), 1);
    let stores = Stores::with_target(target, flaky).await;

    let rows = vec![row(2, "1", "", "A"), row(3, "2", "", "B"), row(4, "3", "", "C")];
    let err = stores
        .session
        .orchestrator()
        .execute_batch("dave", &rows, |_| {})
        .await
        .unwrap_err();
    assert!(err.is_connection());

    let batches = stores.session.ledger().list_recent(10).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].status, BatchStatus::Failed);
    assert_eq!(batches[0].total_rows, 0);

    let details = stores.session.recorder().for_batch(&batches[0].batch_id).await.unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].row_id, "1");

    assert_eq!(customer_name(&stores.target, 1).await.as_deref(), Some("A"));
    assert_eq!(customer_name(&stores.target, 2).await.as_deref(), Some("Globex"));
    assert_eq!(customer_name(&stores.target, 3).await.as_deref(), Some("Initech"));
}

#[tokio::test]
async fn test_update_failure_leaves_audit_ahead_of_target() {
    let target = memory_pool().await;
    seed_customers(&target, &[(1, Some("Acme"))]).await;
    let flaky = FailingPool::wrap(target.clone(), Fault::Statement("UPDATE"), 0);
    let stores = Stores::with_target(target, flaky).await;

    let err = stores
        .session
        .orchestrator()
        .execute_single("erin", &MutationRequest::new(by_key("1"), "Acme Corp"))
        .await
        .unwrap_err();
    assert!(err.is_connection());

    let batches = stores.session.ledger().list_recent(1).await.unwrap();
    assert_eq!(batches[0].status, BatchStatus::Failed);
    assert_eq!(stores.session.recorder().count_for_batch(&batches[0].batch_id).await.unwrap(), 1);
    assert_eq!(customer_name(&stores.target, 1).await.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_failed_close_keeps_default_status_and_original_error() {
    let target = memory_pool().await;
    seed_customers(&target, &[(1, Some("Acme"))]).await;
    let log = memory_pool().await;
    // The target refuses the rename, then the log refuses the ledger close
    let flaky_target = FailingPool::named("target", target.clone(), Fault::Statement("UPDATE"), 0);
    let flaky_log = FailingPool::named("log", log.clone(), Fault::Statement("UPDATE"), 0);
    let stores = Stores::with_pools(target, flaky_target, log, flaky_log).await;

    let err = stores
        .session
        .orchestrator()
        .execute_single("gina", &MutationRequest::new(by_key("1"), "Acme Corp"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("target:"), "unexpected error: {}", err);

    let ledger = BatchLedger::new(stores.log.clone(), "rename_batches");
    let batches = ledger.list_recent(1).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].status, BatchStatus::Failed);
    assert_eq!(batches[0].total_rows, 0);
    assert_eq!(customer_name(&stores.target, 1).await.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_log_failure_prevents_target_update() {
    let target = memory_pool().await;
    seed_customers(&target, &[(1, Some("Acme"))]).await;
    let log = FailingPool::wrap(memory_pool().await, Fault::BeginTransaction, 0);
    let session = relabel_engine::StoreSession::from_pools(environment(), target.clone(), log);
    session.ensure_log_schema().await.unwrap();

    let result = session
        .orchestrator()
        .execute_single("frank", &MutationRequest::new(by_key("1"), "Acme Corp"))
        .await;

    assert!(result.is_err());
    assert_eq!(customer_name(&target, 1).await.as_deref(), Some("Acme"));
    let batches = session.ledger().list_recent(1).await.unwrap();
    assert_eq!(batches[0].status, BatchStatus::Failed);
}

#[tokio::test]
async fn test_preview_does_not_open_a_batch() {
    let stores = Stores::new(&[(1, Some("Acme")), (2, Some("Acme"))]).await;

    let rows = stores.session.orchestrator().preview(&by_value("Acme")).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert!(stores.session.ledger().list_recent(10).await.unwrap().is_empty());
}
