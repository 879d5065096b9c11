//! End-to-end tests for the raffle facade against the in-memory record store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use raffle::{
    DrawPacing, DrawPhase, Raffle, RaffleAction, RaffleEnvironment, RaffleError, Rejection,
};
use raffle_core::record_store::{Collection, Operation};
use raffle_testing::{InMemoryRecordStore, ScriptedRandom, test_clock};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn raffle_with(records: &InMemoryRecordStore, random: &ScriptedRandom, pacing: DrawPacing) -> Raffle {
    Raffle::new(
        RaffleEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(random.clone()),
            Arc::new(records.clone()),
            pacing,
        ),
        Duration::from_secs(5),
    )
}

fn instant(records: &InMemoryRecordStore, random: &ScriptedRandom) -> Raffle {
    raffle_with(records, random, DrawPacing::instant())
}

fn slow_pacing() -> DrawPacing {
    DrawPacing {
        ticks: 3,
        base_delay: Duration::from_millis(20),
        step_delay: Duration::from_millis(5),
        settle_delay: Duration::from_millis(100),
    }
}

async fn setup(raffle: &Raffle, participants: &[&str], prizes: &[&str]) {
    for name in participants {
        raffle.add_participant(name).await.unwrap();
    }
    for name in prizes {
        raffle.add_prize(name).await.unwrap();
    }
}

#[tokio::test]
async fn two_prizes_are_awarded_least_valuable_first() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::new([1, 0]);
    let raffle = instant(&records, &random);
    setup(&raffle, &["Alice", "Bob", "Carol"], &["Gold", "Silver"]).await;

    let first = raffle.request_draw().await.unwrap();
    assert_eq!(first.participant_name, "Bob");
    assert_eq!(first.prize_name, "Silver");
    assert_eq!(first.prize_rank, 2);

    let second = raffle.request_draw().await.unwrap();
    assert_eq!(second.participant_name, "Alice");
    assert_eq!(second.prize_name, "Gold");
    assert_eq!(second.prize_rank, 1);

    let names: Vec<_> = raffle.participants().await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["Carol"]);
    assert_eq!(raffle.winners().await.len(), 2);
    assert_eq!(records.records(Collection::Winners).len(), 2);

    let third = raffle.request_draw().await.unwrap_err();
    assert_eq!(third, RaffleError::Rejected(Rejection::AllPrizesClaimed));
    assert_eq!(raffle.participants().await.len(), 1);
    assert_eq!(raffle.winners().await.len(), 2);
    assert!(!raffle.can_draw().await);
}

#[tokio::test]
async fn exhausted_pool_with_claimed_prizes_reports_all_claimed() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::new([1, 0]);
    let raffle = instant(&records, &random);
    setup(&raffle, &["Alice", "Bob"], &["Gold", "Silver"]).await;

    raffle.request_draw().await.unwrap();
    raffle.request_draw().await.unwrap();

    assert!(raffle.participants().await.is_empty());
    assert_eq!(
        raffle.request_draw().await.unwrap_err(),
        RaffleError::Rejected(Rejection::AllPrizesClaimed)
    );
}

#[tokio::test]
async fn three_prizes_go_out_in_reverse_rank_order() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &["A", "B", "C", "D"], &["First", "Second", "Third"]).await;

    let mut ranks = Vec::new();
    for _ in 0..3 {
        ranks.push(raffle.request_draw().await.unwrap().prize_rank);
    }
    assert_eq!(ranks, [3, 2, 1]);
}

#[tokio::test]
async fn prizes_sharing_a_name_are_each_awarded_in_rank_order() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &["A", "B", "C", "D"], &["Gold", "Gift Card", "Gift Card"]).await;

    let mut awarded = Vec::new();
    for _ in 0..3 {
        let winner = raffle.request_draw().await.unwrap();
        awarded.push((winner.prize_rank, winner.prize_name));
    }
    assert_eq!(
        awarded,
        [
            (3, "Gift Card".to_string()),
            (2, "Gift Card".to_string()),
            (1, "Gold".to_string()),
        ]
    );

    assert_eq!(
        raffle.request_draw().await.unwrap_err(),
        RaffleError::Rejected(Rejection::AllPrizesClaimed)
    );
}

#[tokio::test]
async fn winner_leaves_the_pool_and_never_returns() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::new([2, 1, 0]);
    let raffle = instant(&records, &random);
    setup(&raffle, &["Ann", "Ben", "Cid"], &["P1", "P2", "P3"]).await;

    let mut drawn = Vec::new();
    for _ in 0..3 {
        let before = raffle.participants().await;
        let winner = raffle.request_draw().await.unwrap();
        let after = raffle.participants().await;

        let winner_id = winner.participant_id.clone().unwrap();
        assert!(before.iter().any(|p| p.id == winner_id));
        assert!(after.iter().all(|p| p.id != winner_id));
        assert_eq!(after.len(), before.len() - 1);
        assert!(!drawn.contains(&winner_id));
        drawn.push(winner_id);
    }

    assert!(records.records(Collection::Participants).is_empty());
}

#[tokio::test]
async fn empty_pool_never_produces_a_winner() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);

    raffle.add_prize("Gold").await.unwrap();
    assert_eq!(
        raffle.request_draw().await.unwrap_err(),
        RaffleError::Rejected(Rejection::EmptyPool)
    );

    raffle.clear_prizes().await.unwrap();
    raffle.add_participant("Alice").await.unwrap();
    assert_eq!(
        raffle.request_draw().await.unwrap_err(),
        RaffleError::Rejected(Rejection::EmptyPool)
    );

    assert!(raffle.winners().await.is_empty());
    assert!(records.records(Collection::Winners).is_empty());
    assert!(random.picks().is_empty());
}

#[tokio::test]
async fn failed_winner_write_leaves_everything_unchanged() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &["Alice", "Bob"], &["Gold"]).await;
    records.fail_on(Operation::Create, Collection::Winners);

    let err = raffle.request_draw().await.unwrap_err();
    assert!(matches!(err, RaffleError::Persistence(_)));

    assert_eq!(raffle.participants().await.len(), 2);
    assert!(raffle.winners().await.is_empty());
    assert_eq!(raffle.phase().await, DrawPhase::Idle);
    assert!(records.records(Collection::Winners).is_empty());
    assert_eq!(records.records(Collection::Participants).len(), 2);

    records.clear_failures();
    let winner = raffle.request_draw().await.unwrap();
    assert_eq!(winner.prize_name, "Gold");
}

#[tokio::test]
async fn failed_participant_delete_rolls_back_the_winner() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &["Alice"], &["Gold"]).await;
    records.fail_on(Operation::Delete, Collection::Participants);

    let err = raffle.request_draw().await.unwrap_err();
    assert!(matches!(err, RaffleError::Persistence(_)));

    assert_eq!(raffle.participants().await.len(), 1);
    assert!(raffle.winners().await.is_empty());
    assert!(records.records(Collection::Winners).is_empty());
    assert_eq!(records.records(Collection::Participants).len(), 1);
    assert!(raffle.can_draw().await);
}

#[tokio::test]
async fn failed_add_changes_nothing() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    records.fail_on(Operation::Create, Collection::Participants);

    let err = raffle.add_participant("Alice").await.unwrap_err();
    assert!(matches!(err, RaffleError::Persistence(_)));
    assert!(raffle.participants().await.is_empty());

    records.clear_failures();
    let added = raffle.add_participant("Alice").await.unwrap().unwrap();
    assert_eq!(raffle.participants().await, vec![added]);
}

#[tokio::test]
async fn blank_names_are_ignored_without_a_write() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);

    assert_eq!(raffle.add_participant("   ").await.unwrap(), None);
    assert_eq!(raffle.add_prize("").await.unwrap(), None);

    assert!(records.calls().is_empty());
    assert!(raffle.participants().await.is_empty());
    assert!(raffle.prizes().await.is_empty());
}

#[tokio::test]
async fn names_are_trimmed_and_prizes_append_at_the_lowest_rank() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);

    let alice = raffle.add_participant("  Alice  ").await.unwrap().unwrap();
    assert_eq!(alice.name, "Alice");

    let gold = raffle.add_prize("Gold").await.unwrap().unwrap();
    let silver = raffle.add_prize(" Silver").await.unwrap().unwrap();
    assert_eq!((gold.rank, silver.rank), (1, 2));
    assert_eq!(silver.name, "Silver");

    let stored = records.records(Collection::Prizes);
    assert_eq!(stored[1].fields["ranking"], json!(2));
}

#[tokio::test]
async fn moving_prizes_swaps_ranks_and_stops_at_the_edges() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &[], &["Gold", "Silver", "Bronze"]).await;
    let prizes = raffle.prizes().await;

    assert!(!raffle.move_prize_up(&prizes[0].id).await.unwrap());
    assert!(!raffle.move_prize_down(&prizes[2].id).await.unwrap());

    assert!(raffle.move_prize_up(&prizes[2].id).await.unwrap());
    let order: Vec<_> = raffle.prizes().await.into_iter().map(|p| (p.name, p.rank)).collect();
    assert_eq!(
        order,
        [("Gold".to_string(), 1), ("Bronze".to_string(), 2), ("Silver".to_string(), 3)]
    );

    let stored: Vec<_> = records
        .records(Collection::Prizes)
        .into_iter()
        .map(|r| r.fields["name"].clone())
        .collect();
    assert_eq!(stored, [json!("Gold"), json!("Bronze"), json!("Silver")]);
}

#[tokio::test]
async fn removing_a_prize_keeps_ranks_dense() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &[], &["Gold", "Silver", "Bronze", "Tin"]).await;
    let silver = raffle.prizes().await[1].id.clone();

    raffle.remove_prize(&silver).await.unwrap();

    let prizes = raffle.prizes().await;
    let ranks: Vec<_> = prizes.iter().map(|p| p.rank).collect();
    assert_eq!(ranks, [1, 2, 3]);
    assert_eq!(prizes[1].name, "Bronze");

    let stored: Vec<_> = records
        .records(Collection::Prizes)
        .into_iter()
        .map(|r| r.fields["ranking"].clone())
        .collect();
    assert_eq!(stored, [json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn failed_prize_removal_restores_stored_ranks() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &[], &["Gold", "Silver", "Bronze"]).await;
    let before = raffle.prizes().await;
    records.fail_on(Operation::Delete, Collection::Prizes);

    let err = raffle.remove_prize(&before[0].id).await.unwrap_err();
    assert!(matches!(err, RaffleError::Persistence(_)));

    assert_eq!(raffle.prizes().await, before);
    let stored: Vec<_> = records
        .records(Collection::Prizes)
        .into_iter()
        .map(|r| (r.fields["name"].clone(), r.fields["ranking"].clone()))
        .collect();
    assert_eq!(
        stored,
        [
            (json!("Gold"), json!(1)),
            (json!("Silver"), json!(2)),
            (json!("Bronze"), json!(3)),
        ]
    );
}

#[tokio::test]
async fn unknown_ids_are_rejected() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);

    let missing = raffle::ParticipantId::new("404");
    assert_eq!(
        raffle.remove_participant(&missing).await.unwrap_err(),
        RaffleError::Rejected(Rejection::UnknownParticipant(missing))
    );

    let missing = raffle::PrizeId::new("404");
    assert_eq!(
        raffle.move_prize_up(&missing).await.unwrap_err(),
        RaffleError::Rejected(Rejection::UnknownPrize(missing))
    );
}

#[tokio::test]
async fn a_second_draw_is_rejected_while_one_is_running() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = raffle_with(&records, &random, slow_pacing());
    setup(&raffle, &["Alice", "Bob"], &["Gold", "Silver"]).await;

    let (first, second, edit) = tokio::join!(
        raffle.request_draw(),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            raffle.request_draw().await
        },
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            raffle.add_participant("Carol").await
        },
    );

    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), RaffleError::Rejected(Rejection::DrawInProgress));
    assert_eq!(edit.unwrap_err(), RaffleError::Rejected(Rejection::DrawInProgress));
    assert_eq!(raffle.winners().await.len(), 1);
    assert_eq!(raffle.participants().await.len(), 1);
}

#[tokio::test]
async fn draw_broadcasts_highlights_before_the_winner() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = raffle_with(&records, &random, slow_pacing());
    setup(&raffle, &["Alice", "Bob"], &["Gold"]).await;
    let mut actions = raffle.subscribe();

    let winner = raffle.request_draw().await.unwrap();

    let mut highlights = 0;
    loop {
        match actions.recv().await.unwrap() {
            RaffleAction::CandidateHighlighted { participant, .. } => {
                assert!(["Alice", "Bob"].contains(&participant.name.as_str()));
                highlights += 1;
            },
            RaffleAction::WinnerCommitted { winner: committed, .. } => {
                assert_eq!(committed, winner);
                break;
            },
            _ => {},
        }
    }
    assert_eq!(highlights, 3);
}

#[tokio::test]
async fn reset_clears_every_collection() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &["Alice", "Bob"], &["Gold", "Silver"]).await;
    raffle.request_draw().await.unwrap();

    raffle.reset_all().await.unwrap();

    let state = raffle.snapshot().await;
    assert!(state.participants().is_empty());
    assert!(state.prizes().is_empty());
    assert!(state.winners().is_empty());
    for collection in [Collection::Participants, Collection::Prizes, Collection::Winners] {
        assert!(records.records(collection).is_empty());
    }
}

#[tokio::test]
async fn clearing_winners_makes_prizes_drawable_again() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    setup(&raffle, &["Alice", "Bob"], &["Gold"]).await;

    raffle.request_draw().await.unwrap();
    assert_eq!(
        raffle.request_draw().await.unwrap_err(),
        RaffleError::Rejected(Rejection::AllPrizesClaimed)
    );

    raffle.clear_winners().await.unwrap();
    let winner = raffle.request_draw().await.unwrap();
    assert_eq!(winner.participant_name, "Bob");
    assert_eq!(winner.prize_name, "Gold");
}

#[tokio::test]
async fn load_mirrors_the_record_service_and_renumbers_ranks() {
    let records = InMemoryRecordStore::new();
    records.seed(Collection::Participants, json_fields(json!({ "name": "Alice" })));
    records.seed(Collection::Prizes, json_fields(json!({ "name": "Gold", "ranking": 1 })));
    records.seed(Collection::Prizes, json_fields(json!({ "name": "Bronze", "ranking": 7 })));
    records.seed(Collection::Prizes, json_fields(json!({ "name": "Silver", "ranking": "4" })));
    records.seed(
        Collection::Winners,
        json_fields(json!({
            "participant_name": "Zed",
            "prize_name": "Tin",
            "prize_ranking": 9,
            "timestamp": "2024-01-15 10:30:00",
        })),
    );

    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    raffle.load().await.unwrap();

    let prizes: Vec<_> = raffle.prizes().await.into_iter().map(|p| (p.name, p.rank)).collect();
    assert_eq!(
        prizes,
        [("Gold".to_string(), 1), ("Silver".to_string(), 2), ("Bronze".to_string(), 3)]
    );
    assert_eq!(raffle.participants().await[0].name, "Alice");

    let winners = raffle.winners().await;
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].participant_id, None);
    assert_eq!(winners[0].timestamp, "2024-01-15 10:30:00");
}

#[tokio::test]
async fn failed_load_keeps_the_previous_mirror() {
    let records = InMemoryRecordStore::new();
    let random = ScriptedRandom::default();
    let raffle = instant(&records, &random);
    raffle.add_participant("Alice").await.unwrap();
    records.fail_on(Operation::List, Collection::Winners);

    assert!(matches!(raffle.load().await.unwrap_err(), RaffleError::Persistence(_)));
    assert_eq!(raffle.participants().await.len(), 1);
}

fn json_fields(value: serde_json::Value) -> raffle_core::record_store::Fields {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => raffle_core::record_store::Fields::new(),
    }
}
