//! PostgreSQL store tests
//!
//! Run against a scratch database:
//! `DATABASE_URL=postgresql://... cargo test -p credora-db -- --ignored`

use std::sync::Arc;

use credora_db::{Database, DatabaseConfig, PgStore};
use credora_ledger::{LedgerStore, Page, Posting, TransferRequest, UnitOfWork, WalletLedger};
use credora_types::{
    CredoraError, Currency, LoanApplication, TransactionStatus, TransactionType, UserId,
};
use rust_decimal_macros::dec;

async fn store() -> PgStore {
    dotenvy::dotenv().ok();
    let db = Database::connect(&DatabaseConfig::default())
        .await
        .expect("connect to DATABASE_URL");
    db.migrate().await.expect("migrations");
    db.store()
}

fn ledger(store: PgStore) -> WalletLedger {
    WalletLedger::new(Arc::new(store))
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_credit_and_debit_roundtrip_through_postgres() {
    let ledger = ledger(store().await);
    let user = UserId::new();

    ledger
        .credit(Posting::new(user, TransactionType::Deposit, dec!(500), Currency::ngn(), "Seed"))
        .await
        .unwrap();
    let debit = ledger
        .debit(Posting::new(user, TransactionType::Withdrawal, dec!(120.50), Currency::ngn(), "Cash out"))
        .await
        .unwrap();

    assert_eq!(debit.balance_before, Some(dec!(500)));
    assert_eq!(debit.balance_after, Some(dec!(379.50)));
    assert_eq!(ledger.balance(&user).await.unwrap(), dec!(379.50));

    let history = ledger
        .store()
        .transactions_for_user(&user, Page::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].reference, debit.reference);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_overdraft_leaves_no_trace() {
    let ledger = ledger(store().await);
    let user = UserId::new();
    ledger
        .credit(Posting::new(user, TransactionType::Deposit, dec!(10), Currency::ngn(), "Seed"))
        .await
        .unwrap();

    let err = ledger
        .debit(Posting::new(user, TransactionType::Withdrawal, dec!(10.01), Currency::ngn(), "Too much"))
        .await
        .unwrap_err();
    assert!(matches!(err, CredoraError::InsufficientFunds { .. }));

    let history = ledger
        .store()
        .transactions_for_user(&user, Page::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_reference_is_a_conflict() {
    let ledger = ledger(store().await);
    let user = UserId::new();
    let reference = format!("PAY-{}", UserId::new().as_uuid().simple());

    ledger
        .credit(
            Posting::new(user, TransactionType::PaymentGatewayDeposit, dec!(50), Currency::ngn(), "Card")
                .with_reference(reference.clone()),
        )
        .await
        .unwrap();
    let err = ledger
        .credit(
            Posting::new(user, TransactionType::PaymentGatewayDeposit, dec!(50), Currency::ngn(), "Card")
                .with_reference(reference),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CredoraError::Conflict { .. }));
    assert_eq!(ledger.balance(&user).await.unwrap(), dec!(50));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_loan_version_is_rejected() {
    let store = store().await;
    let loan = LoanApplication::new(UserId::new(), dec!(12000), Currency::ngn(), 12, "Inventory".to_string());

    let mut unit = UnitOfWork::new();
    unit.insert_loan(loan.clone());
    store.commit(unit).await.unwrap();

    let mut unit = UnitOfWork::new();
    unit.update_loan(loan.clone());
    store.commit(unit).await.unwrap();
    assert_eq!(store.loan(&loan.id).await.unwrap().unwrap().version, 1);

    // Still carries version 0
    let mut unit = UnitOfWork::new();
    unit.update_loan(loan.clone());
    let err = store.commit(unit).await.unwrap_err();
    assert!(matches!(err, CredoraError::Conflict { .. }));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_transfer_is_atomic_and_linked() {
    let ledger = ledger(store().await);
    let (sender, receiver) = (UserId::new(), UserId::new());
    ledger
        .credit(Posting::new(sender, TransactionType::Deposit, dec!(100), Currency::ngn(), "Seed"))
        .await
        .unwrap();

    let (sent, received) = ledger
        .transfer(TransferRequest {
            sender_id: sender,
            receiver_id: receiver,
            amount: dec!(40),
            currency: Currency::ngn(),
            description: "Rent share".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(sent.status, TransactionStatus::Completed);
    assert_eq!(sent.transfer, received.transfer);
    assert_eq!(ledger.balance(&sender).await.unwrap(), dec!(60));
    assert_eq!(ledger.balance(&receiver).await.unwrap(), dec!(40));

    let stored = ledger.store().transaction(&received.id).await.unwrap().unwrap();
    assert_eq!(stored.transfer, received.transfer);
}
