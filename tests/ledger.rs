//! Ledger behavior against a real (in-memory) SQLite database with the
//! production migrations applied.

use std::time::Duration;

use bitbar::entities::prelude::MintTransaction;
use bitbar::ledger::{
    epoch_millis, ConfirmOutcome, InsertOutcome, Ledger, MintStatus, NewTransaction,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, IntoActiveModel,
};

async fn open_ledger() -> (Ledger, DatabaseConnection) {
    // A pool of one: every pooled connection to `sqlite::memory:` would
    // otherwise see its own empty database.
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options.max_connections(1);
    let database = Database::connect(options)
        .await
        .expect("in-memory database opens");
    Migrator::up(&database, None).await.expect("migrations run");
    (Ledger::new(database.clone()), database)
}

fn txid(tag: u8) -> String {
    format!("{:02x}", tag).repeat(32)
}

fn eligible(tag: u8, amount_sats: u64) -> NewTransaction {
    NewTransaction {
        txid: txid(tag),
        amount_sats,
        block_height: Some(840_000),
        sender_address: Some("bc1qsender".to_string()),
        status: MintStatus::Pending,
    }
}

fn below_threshold(tag: u8) -> NewTransaction {
    NewTransaction {
        txid: txid(tag),
        amount_sats: 1_640,
        block_height: None,
        sender_address: Some("bc1qsender".to_string()),
        status: MintStatus::NotRequired,
    }
}

#[tokio::test]
async fn duplicate_insert_is_a_noop() {
    let (ledger, _db) = open_ledger().await;

    assert_eq!(
        ledger.insert(eligible(1, 2_000)).await.unwrap(),
        InsertOutcome::Inserted
    );
    assert_eq!(
        ledger.insert(eligible(1, 9_999)).await.unwrap(),
        InsertOutcome::Exists
    );

    let stored = ledger.get(&txid(1)).await.unwrap().unwrap();
    assert_eq!(stored.amount_sats, 2_000, "second ingestion must not mutate");

    let counts = ledger.counts().await.unwrap();
    assert_eq!(counts.total, 1);
}

#[tokio::test]
async fn replaying_a_listing_is_idempotent() {
    let (ledger, _db) = open_ledger().await;

    for _ in 0..3 {
        ledger.insert(eligible(1, 2_000)).await.unwrap();
        ledger.insert(below_threshold(2)).await.unwrap();
        ledger.insert(eligible(3, 1_641)).await.unwrap();
    }

    let counts = ledger.counts().await.unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.pending, 2);
}

#[tokio::test]
async fn pending_listing_contains_only_pending_records() {
    let (ledger, _db) = open_ledger().await;

    ledger.insert(eligible(1, 2_000)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    ledger.insert(eligible(2, 5_000)).await.unwrap();
    ledger.insert(below_threshold(3)).await.unwrap();

    let pending = ledger.list_pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    // Oldest first.
    assert_eq!(pending[0].txid, txid(1));
    assert_eq!(pending[1].txid, txid(2));
    assert!(pending.iter().all(|r| r.sender_address.is_some()));
}

#[tokio::test]
async fn confirm_transitions_pending_exactly_once() {
    let (ledger, _db) = open_ledger().await;
    ledger.insert(eligible(1, 2_000)).await.unwrap();

    let outcome = ledger.confirm(&txid(1), "abc123i0").await.unwrap();
    let ConfirmOutcome::Confirmed(model) = outcome else {
        panic!("first confirm must succeed, got {outcome:?}");
    };
    assert_eq!(model.status, "completed");
    assert_eq!(model.inscription_id.as_deref(), Some("abc123i0"));
    assert!(model.completed_at_ms.is_some());

    assert_eq!(
        ledger.confirm(&txid(1), "other").await.unwrap(),
        ConfirmOutcome::AlreadyCompleted
    );

    let stored = ledger.get(&txid(1)).await.unwrap().unwrap();
    assert_eq!(
        stored.inscription_id.as_deref(),
        Some("abc123i0"),
        "a second confirm must not overwrite the inscription identity"
    );
}

#[tokio::test]
async fn concurrent_confirms_yield_exactly_one_confirmed() {
    let (ledger, _db) = open_ledger().await;
    ledger.insert(eligible(1, 2_000)).await.unwrap();

    let tx_id = txid(1);
    let (first, second) = tokio::join!(
        ledger.confirm(&tx_id, "firsti0"),
        ledger.confirm(&tx_id, "secondi0"),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    let winners: Vec<&str> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            ConfirmOutcome::Confirmed(model) => model.inscription_id.as_deref(),
            _ => None,
        })
        .collect();
    assert_eq!(winners.len(), 1, "exactly one concurrent confirm may win");
    assert!(
        outcomes
            .iter()
            .any(|outcome| *outcome == ConfirmOutcome::AlreadyCompleted),
        "the loser reports AlreadyCompleted"
    );

    let stored = ledger.get(&txid(1)).await.unwrap().unwrap();
    assert_eq!(
        stored.inscription_id.as_deref(),
        Some(winners[0]),
        "the losing confirm must not overwrite the winner's inscription"
    );
    assert_eq!(stored.status, "completed");
}

#[tokio::test]
async fn confirm_unknown_txid_is_not_found() {
    let (ledger, _db) = open_ledger().await;
    assert_eq!(
        ledger.confirm(&txid(9), "abc123i0").await.unwrap(),
        ConfirmOutcome::NotFound
    );
}

#[tokio::test]
async fn confirm_on_not_required_does_not_resurrect() {
    let (ledger, _db) = open_ledger().await;
    ledger.insert(below_threshold(1)).await.unwrap();

    assert_eq!(
        ledger.confirm(&txid(1), "abc123i0").await.unwrap(),
        ConfirmOutcome::AlreadyCompleted
    );

    let stored = ledger.get(&txid(1)).await.unwrap().unwrap();
    assert_eq!(stored.status, "not_required");
    assert!(stored.inscription_id.is_none());
}

#[tokio::test]
async fn completed_listing_is_newest_first() {
    let (ledger, _db) = open_ledger().await;
    ledger.insert(eligible(1, 2_000)).await.unwrap();
    ledger.insert(eligible(2, 3_000)).await.unwrap();

    ledger.confirm(&txid(1), "firsti0").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    ledger.confirm(&txid(2), "secondi0").await.unwrap();

    let completed = ledger.list_completed().await.unwrap();
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0].txid, txid(2));
    assert_eq!(completed[1].txid, txid(1));
}

#[tokio::test]
async fn counts_follow_the_lifecycle() {
    let (ledger, _db) = open_ledger().await;
    ledger.insert(eligible(1, 2_000)).await.unwrap();
    ledger.insert(below_threshold(2)).await.unwrap();

    let counts = ledger.counts().await.unwrap();
    assert_eq!((counts.total, counts.pending), (2, 1));

    ledger.confirm(&txid(1), "abc123i0").await.unwrap();
    let counts = ledger.counts().await.unwrap();
    assert_eq!((counts.total, counts.pending), (2, 0));
}

#[tokio::test]
async fn sweep_removes_old_settled_rows_and_spares_pending() {
    let (ledger, database) = open_ledger().await;
    ledger.insert(eligible(1, 2_000)).await.unwrap();
    ledger.insert(below_threshold(2)).await.unwrap();

    // Age both rows far past the horizon.
    let aged = epoch_millis() - 100 * 86_400_000;
    for tag in [1, 2] {
        let model = ledger.get(&txid(tag)).await.unwrap().unwrap();
        let mut active = model.into_active_model();
        active.first_seen_ms = Set(aged);
        active.update(&database).await.unwrap();
    }

    let removed = ledger.sweep_settled(30).await.unwrap();
    assert_eq!(removed, 1, "only the settled row is swept");

    assert!(
        ledger.get(&txid(1)).await.unwrap().is_some(),
        "pending rows are immortal"
    );
    assert!(ledger.get(&txid(2)).await.unwrap().is_none());
}

#[tokio::test]
async fn entity_schema_matches_the_migration() {
    let (ledger, database) = open_ledger().await;
    ledger.insert(eligible(7, 1_641)).await.unwrap();

    let all = MintTransaction::find().all(&database).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].block_height, Some(840_000));
    assert_eq!(all[0].status, "pending");
    assert!(all[0].completed_at_ms.is_none());
}
