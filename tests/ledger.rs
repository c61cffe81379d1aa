use interaction_sink::prelude::*;
use interaction_sink::RecordFailure;

fn record(id: &str, height: u64) -> InteractionRecord {
    InteractionRecord {
        interaction_id: id.to_string(),
        interaction: format!(r#"{{"id":"{id}","block":{{"height":{height}}}}}"#),
        block_height: height,
        block_id: format!("block-{height}"),
        contract_id: "contract-a".to_string(),
        function: "transfer".to_string(),
        input: r#"{"function":"transfer","qty":1}"#.to_string(),
        confirmation_status: ConfirmationStatus::NotProcessed,
        interact_write: vec!["contract-b".to_string()],
    }
}

/// Fails the `json_valid(interaction)` constraint.
fn malformed(id: &str, height: u64) -> InteractionRecord {
    InteractionRecord {
        interaction: "{\"id\": truncated".to_string(),
        ..record(id, height)
    }
}

#[tokio::test]
async fn upserting_the_same_record_twice_is_a_no_op() -> anyhow::Result<()> {
    let store = SqliteStore::new_in_memory()?;
    let r = record("tx-1", 10);

    store
        .upsert_batch(vec![r.clone()], BatchPolicy::PerRecord)
        .await?
        .into_result()?;
    let once = store.interaction("tx-1").await?;

    store
        .upsert_batch(vec![r.clone()], BatchPolicy::PerRecord)
        .await?
        .into_result()?;

    assert_eq!(store.interaction("tx-1").await?, once);
    assert_eq!(once, Some(r));
    assert_eq!(store.interaction_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn later_write_replaces_every_mutable_field() -> anyhow::Result<()> {
    let store = SqliteStore::new_in_memory()?;
    let first = record("tx-1", 10);
    let second = InteractionRecord {
        interaction_id: "tx-1".to_string(),
        interaction: r#"{"id":"tx-1","reorged":true}"#.to_string(),
        block_height: 11,
        block_id: "block-11b".to_string(),
        contract_id: "contract-z".to_string(),
        function: "mint".to_string(),
        input: r#"{"function":"mint"}"#.to_string(),
        confirmation_status: ConfirmationStatus::Confirmed,
        interact_write: vec![],
    };

    store
        .upsert_batch(vec![first], BatchPolicy::PerRecord)
        .await?
        .into_result()?;
    store
        .upsert_batch(vec![second.clone()], BatchPolicy::PerRecord)
        .await?
        .into_result()?;

    assert_eq!(store.interaction("tx-1").await?, Some(second));
    assert_eq!(store.interaction_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn per_record_policy_isolates_a_bad_record() -> anyhow::Result<()> {
    let store = SqliteStore::new_in_memory()?;
    let batch = vec![record("tx-1", 1), malformed("tx-2", 2), record("tx-3", 3)];

    let outcome = store.upsert_batch(batch, BatchPolicy::PerRecord).await?;

    assert_eq!(outcome.committed, vec!["tx-1".to_string(), "tx-3".to_string()]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].interaction_id, "tx-2");
    assert!(!outcome.is_complete());

    assert!(store.interaction("tx-1").await?.is_some());
    assert!(store.interaction("tx-2").await?.is_none());
    assert!(store.interaction("tx-3").await?.is_some());

    // The failure is never reported as success
    match outcome.into_result() {
        Err(SinkError::RecordWriteFailure { interaction_id, .. }) => {
            assert_eq!(interaction_id, "tx-2")
        }
        other => panic!("expected record write failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn per_record_policy_collects_every_failure() -> anyhow::Result<()> {
    let store = SqliteStore::new_in_memory()?;
    let too_high = InteractionRecord {
        block_height: u64::MAX,
        ..record("tx-4", 4)
    };
    let batch = vec![
        malformed("tx-1", 1),
        record("tx-2", 2),
        too_high,
        record("", 3),
    ];

    let outcome = store.upsert_batch(batch, BatchPolicy::PerRecord).await?;

    assert_eq!(outcome.committed, vec!["tx-2".to_string()]);
    let failed: Vec<&str> = outcome
        .failed
        .iter()
        .map(|f: &RecordFailure| f.interaction_id.as_str())
        .collect();
    assert_eq!(failed, vec!["tx-1", "tx-4", ""]);
    assert_eq!(store.interaction_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn whole_batch_policy_rolls_back_everything() -> anyhow::Result<()> {
    let store = SqliteStore::new_in_memory()?;
    let batch = vec![record("tx-1", 1), malformed("tx-2", 2), record("tx-3", 3)];

    match store.upsert_batch(batch, BatchPolicy::WholeBatch).await {
        Err(SinkError::RecordWriteFailure { interaction_id, .. }) => {
            assert_eq!(interaction_id, "tx-2")
        }
        other => panic!("expected record write failure, got {other:?}"),
    }
    assert_eq!(store.interaction_count().await?, 0);

    let outcome = store
        .upsert_batch(
            vec![record("tx-1", 1), record("tx-3", 3)],
            BatchPolicy::WholeBatch,
        )
        .await?;
    assert_eq!(outcome.into_result()?, 2);
    assert_eq!(store.interaction_count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn retrying_a_partially_failed_batch_converges() -> anyhow::Result<()> {
    let store = SqliteStore::new_in_memory()?;
    let bad = vec![record("tx-1", 1), malformed("tx-2", 2), record("tx-3", 3)];
    store.upsert_batch(bad, BatchPolicy::PerRecord).await?;

    let fixed = vec![record("tx-1", 1), record("tx-2", 2), record("tx-3", 3)];
    let outcome = store.upsert_batch(fixed, BatchPolicy::PerRecord).await?;

    assert_eq!(outcome.into_result()?, 3);
    assert_eq!(store.interaction_count().await?, 3);
    Ok(())
}

#[tokio::test]
async fn memory_store_matches_sqlite_semantics() -> anyhow::Result<()> {
    let mem = MemoryStore::new();
    let batch = vec![record("tx-1", 1), malformed("tx-2", 2), record("tx-3", 3)];

    let outcome = mem.upsert_batch(batch.clone(), BatchPolicy::PerRecord).await?;
    assert_eq!(outcome.committed, vec!["tx-1".to_string(), "tx-3".to_string()]);
    assert_eq!(outcome.failed[0].interaction_id, "tx-2");

    let fresh = MemoryStore::new();
    assert!(fresh
        .upsert_batch(batch, BatchPolicy::WholeBatch)
        .await
        .is_err());
    assert_eq!(fresh.interaction_count()?, 0);

    let replaced = InteractionRecord {
        function: "burn".to_string(),
        ..record("tx-1", 1)
    };
    mem.upsert_batch(vec![replaced.clone()], BatchPolicy::PerRecord)
        .await?;
    assert_eq!(mem.interaction("tx-1")?, Some(replaced));
    assert_eq!(mem.interaction_count()?, 2);
    Ok(())
}
