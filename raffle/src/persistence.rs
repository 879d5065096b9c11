//! Record service write plans.
//!
//! Every state change is persisted before it is applied in memory. Writes
//! that span several records run as small sagas: when a later step fails,
//! the completed steps are undone in reverse order and the original error is
//! returned. If undoing fails too, the error says so and is logged, since the
//! record service may then disagree with memory until the next load.

use crate::ranking::RankChange;
use crate::types::{Participant, ParticipantId, Prize, PrizeId, Winner, WinnerDraft};
use raffle_core::record_store::{Collection, Operation, Record, RecordStore, RecordStoreError};

fn failed(operation: Operation, collection: Collection, error: &RecordStoreError) {
    metrics::counter!(
        "raffle.persistence.failures",
        "operation" => operation.as_str(),
        "collection" => collection.as_str()
    )
    .increment(1);
    tracing::warn!(%operation, %collection, %error, "Record service call failed");
}

fn rollback_failed(original: RecordStoreError, rollback: RecordStoreError) -> RecordStoreError {
    tracing::error!(%original, %rollback, "Rollback failed, store and memory may disagree until next load");
    RecordStoreError::RollbackFailed {
        original: Box::new(original),
        rollback: Box::new(rollback),
    }
}

fn parse_all<T>(
    records: &[Record],
    parse: impl Fn(&Record) -> Result<T, RecordStoreError>,
) -> Result<Vec<T>, RecordStoreError> {
    records.iter().map(parse).collect()
}

/// Fetches all three collections concurrently.
///
/// # Errors
///
/// Returns the first failing list call or unreadable record.
pub async fn load_all(
    records: &dyn RecordStore,
) -> Result<(Vec<Participant>, Vec<Prize>, Vec<Winner>), RecordStoreError> {
    let (participants, prizes, winners) = futures::try_join!(
        records.list(Collection::Participants),
        records.list(Collection::Prizes),
        records.list(Collection::Winners),
    )
    .inspect_err(|e| tracing::warn!(error = %e, "Loading collections failed"))?;

    Ok((
        parse_all(&participants, Participant::from_record)?,
        parse_all(&prizes, Prize::from_record)?,
        parse_all(&winners, Winner::from_record)?,
    ))
}

/// Stores a new participant.
///
/// # Errors
///
/// Returns the record service error; nothing was stored.
pub async fn create_participant(
    records: &dyn RecordStore,
    name: &str,
) -> Result<Participant, RecordStoreError> {
    let record = records
        .create(Collection::Participants, Participant::new_fields(name))
        .await
        .inspect_err(|e| failed(Operation::Create, Collection::Participants, e))?;
    Participant::from_record(&record)
}

/// Deletes a participant.
///
/// # Errors
///
/// Returns the record service error.
pub async fn delete_participant(
    records: &dyn RecordStore,
    id: &ParticipantId,
) -> Result<(), RecordStoreError> {
    records
        .delete(Collection::Participants, id.as_record_id().clone())
        .await
        .inspect_err(|e| failed(Operation::Delete, Collection::Participants, e))
}

/// Stores a new prize at `rank`.
///
/// # Errors
///
/// Returns the record service error; nothing was stored.
pub async fn create_prize(
    records: &dyn RecordStore,
    name: &str,
    rank: u32,
) -> Result<Prize, RecordStoreError> {
    let record = records
        .create(Collection::Prizes, Prize::new_fields(name, rank))
        .await
        .inspect_err(|e| failed(Operation::Create, Collection::Prizes, e))?;
    let mut prize = Prize::from_record(&record)?;
    // Some services echo back only the id.
    prize.rank = rank;
    Ok(prize)
}

/// Empties a collection.
///
/// # Errors
///
/// Returns the record service error.
pub async fn clear(records: &dyn RecordStore, collection: Collection) -> Result<(), RecordStoreError> {
    records
        .delete_all(collection)
        .await
        .inspect_err(|e| failed(Operation::DeleteAll, collection, e))
}

async fn undo_rank_changes(
    records: &dyn RecordStore,
    applied: &[RankChange],
) -> Result<(), RecordStoreError> {
    for undo in applied.iter().rev().map(RankChange::reverted) {
        records
            .update_rank(undo.id.as_record_id().clone(), undo.to)
            .await?;
    }
    Ok(())
}

/// Writes rank changes in order; on failure restores the ones already written.
///
/// # Errors
///
/// Returns the failing call's error, or [`RecordStoreError::RollbackFailed`]
/// if restoring failed as well.
pub async fn write_rank_changes(
    records: &dyn RecordStore,
    changes: &[RankChange],
) -> Result<(), RecordStoreError> {
    for (done, change) in changes.iter().enumerate() {
        if let Err(error) = records
            .update_rank(change.id.as_record_id().clone(), change.to)
            .await
        {
            failed(Operation::UpdateRank, Collection::Prizes, &error);
            return match undo_rank_changes(records, &changes[..done]).await {
                Ok(()) => Err(error),
                Err(rollback) => Err(rollback_failed(error, rollback)),
            };
        }
    }
    Ok(())
}

/// Removes a prize: shifts the later prizes up, then deletes the record.
///
/// The shifts go first so a failed delete can be undone by restoring ranks;
/// a deleted record could not be restored with its id.
///
/// # Errors
///
/// Returns the failing call's error, or [`RecordStoreError::RollbackFailed`]
/// if restoring ranks failed as well.
pub async fn remove_prize(
    records: &dyn RecordStore,
    id: &PrizeId,
    changes: &[RankChange],
) -> Result<(), RecordStoreError> {
    write_rank_changes(records, changes).await?;

    if let Err(error) = records
        .delete(Collection::Prizes, id.as_record_id().clone())
        .await
    {
        failed(Operation::Delete, Collection::Prizes, &error);
        return match undo_rank_changes(records, changes).await {
            Ok(()) => Err(error),
            Err(rollback) => Err(rollback_failed(error, rollback)),
        };
    }
    Ok(())
}

/// Commits a draw: stores the winner, then deletes the participant.
///
/// If the participant cannot be deleted the winner record is deleted again,
/// so a failed commit leaves neither a winner nor a missing participant.
///
/// # Errors
///
/// Returns the failing call's error, or [`RecordStoreError::RollbackFailed`]
/// if the winner record could not be removed again.
pub async fn commit_winner(
    records: &dyn RecordStore,
    draft: WinnerDraft,
) -> Result<Winner, RecordStoreError> {
    let record = records
        .create(Collection::Winners, draft.fields())
        .await
        .inspect_err(|e| failed(Operation::Create, Collection::Winners, e))?;
    let participant = draft.participant.id.clone();

    if let Err(error) = records
        .delete(Collection::Participants, participant.as_record_id().clone())
        .await
    {
        failed(Operation::Delete, Collection::Participants, &error);
        return match records.delete(Collection::Winners, record.id).await {
            Ok(()) => Err(error),
            Err(rollback) => Err(rollback_failed(error, rollback)),
        };
    }

    Ok(draft.into_winner(record.id.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MoveDirection;
    use crate::ranking::PrizeRanking;
    use raffle_testing::InMemoryRecordStore;
    use serde_json::json;

    fn seed_prizes(records: &InMemoryRecordStore, names: &[&str]) -> PrizeRanking {
        let prizes = names
            .iter()
            .zip(1..)
            .map(|(name, rank)| {
                let record = records.seed(
                    Collection::Prizes,
                    Prize::new_fields(name, rank),
                );
                Prize::from_record(&record).unwrap()
            })
            .collect();
        PrizeRanking::from_stored(prizes)
    }

    fn stored_names(records: &InMemoryRecordStore) -> Vec<String> {
        records
            .records(Collection::Prizes)
            .iter()
            .map(|r| r.fields["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn failed_second_rank_write_restores_first() {
        let records = InMemoryRecordStore::new();
        let ranking = seed_prizes(&records, &["Gold", "Silver"]);
        let changes = ranking
            .plan_move(&ranking.get(1).unwrap().id, MoveDirection::Up)
            .unwrap();
        records.fail_once_after(Operation::UpdateRank, Collection::Prizes, 1);

        let err = write_rank_changes(&records, &changes).await.unwrap_err();

        assert!(matches!(err, RecordStoreError::Unavailable(_)));
        assert_eq!(stored_names(&records), vec!["Gold", "Silver"]);
        let ranks: Vec<_> = records
            .records(Collection::Prizes)
            .iter()
            .map(|r| r.fields["ranking"].clone())
            .collect();
        assert_eq!(ranks, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn failed_prize_delete_restores_shifted_ranks() {
        let records = InMemoryRecordStore::new();
        let ranking = seed_prizes(&records, &["Gold", "Silver", "Bronze"]);
        let gold = ranking.get(0).unwrap().id.clone();
        let changes = ranking.plan_remove(&gold).unwrap();
        records.fail_on(Operation::Delete, Collection::Prizes);

        assert!(remove_prize(&records, &gold, &changes).await.is_err());
        assert_eq!(stored_names(&records), vec!["Gold", "Silver", "Bronze"]);
    }

    #[tokio::test]
    async fn rollback_failure_is_reported() {
        let records = InMemoryRecordStore::new();
        let alice = records.seed(Collection::Participants, Participant::new_fields("Alice"));
        let ranking = seed_prizes(&records, &["Gold"]);
        records.fail_on(Operation::Delete, Collection::Participants);
        records.fail_on(Operation::Delete, Collection::Winners);

        let draft = WinnerDraft {
            participant: Participant::from_record(&alice).unwrap(),
            prize: ranking.get(0).unwrap().clone(),
            timestamp: "2025-01-01 00:00:00".into(),
        };
        let err = commit_winner(&records, draft).await.unwrap_err();

        assert!(matches!(err, RecordStoreError::RollbackFailed { .. }));
        assert!(err.to_string().contains("rollback also failed"));
    }

    #[tokio::test]
    async fn failed_participant_delete_removes_winner_again() {
        let records = InMemoryRecordStore::new();
        let alice = records.seed(Collection::Participants, Participant::new_fields("Alice"));
        let ranking = seed_prizes(&records, &["Gold"]);
        records.fail_on(Operation::Delete, Collection::Participants);

        let draft = WinnerDraft {
            participant: Participant::from_record(&alice).unwrap(),
            prize: ranking.get(0).unwrap().clone(),
            timestamp: "2025-01-01 00:00:00".into(),
        };
        assert!(commit_winner(&records, draft).await.is_err());

        assert!(records.records(Collection::Winners).is_empty());
        assert_eq!(records.records(Collection::Participants).len(), 1);
    }

    #[tokio::test]
    async fn load_all_reads_every_collection() {
        let records = InMemoryRecordStore::new();
        records.seed(Collection::Participants, Participant::new_fields("Alice"));
        seed_prizes(&records, &["Gold", "Silver"]);

        let (participants, prizes, winners) = load_all(&records).await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(prizes.len(), 2);
        assert!(winners.is_empty());

        records.fail_on(Operation::List, Collection::Winners);
        assert!(load_all(&records).await.is_err());
    }
}
