//! Ledger invariants under concurrent mutation

use std::sync::Arc;

use credora_ledger::{signed_amount, LedgerStore, MemoryStore, Page, Posting, TransferRequest, WalletLedger};
use credora_types::{CredoraError, Currency, TransactionStatus, TransactionType, UserId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn assert_reconciles(store: &MemoryStore, user: UserId) {
    let wallet = store.wallet(&user).await.unwrap().unwrap();
    let rows = store
        .transactions_for_user(&user, Page::unbounded())
        .await
        .unwrap();

    let mut sum = Decimal::ZERO;
    for tx in rows.iter().filter(|tx| tx.status == TransactionStatus::Completed) {
        let signed = signed_amount(tx, &user);
        assert_eq!(tx.balance_delta(), Some(signed), "snapshot mismatch on {}", tx.reference);
        sum += signed;
    }
    assert_eq!(wallet.balance, sum);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_postings_never_lose_updates() {
    let store = Arc::new(MemoryStore::new());
    let ledger = WalletLedger::new(store.clone());
    let user = UserId::new();
    ledger
        .credit(Posting::new(user, TransactionType::Deposit, dec!(1000), Currency::ngn(), "Seed"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let posting = if i % 2 == 0 {
                Posting::new(user, TransactionType::Deposit, dec!(10), Currency::ngn(), "Top up")
            } else {
                Posting::new(user, TransactionType::Withdrawal, dec!(30), Currency::ngn(), "Cash out")
            };
            if posting.kind == TransactionType::Deposit {
                ledger.credit(posting).await
            } else {
                ledger.debit(posting).await
            }
        }));
    }
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    // 1000 + 20 * 10 - 20 * 30
    assert_eq!(ledger.balance(&user).await.unwrap(), dec!(600));
    assert_reconciles(&store, user).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_cannot_overdraw() {
    let store = Arc::new(MemoryStore::new());
    let ledger = WalletLedger::new(store.clone());
    let user = UserId::new();
    ledger
        .credit(Posting::new(user, TransactionType::Deposit, dec!(100), Currency::ngn(), "Seed"))
        .await
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .debit(Posting::new(user, TransactionType::Withdrawal, dec!(30), Currency::ngn(), "Cash out"))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => succeeded += 1,
            Err(CredoraError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(ledger.balance(&user).await.unwrap(), dec!(10));
    assert_reconciles(&store, user).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_do_not_deadlock() {
    let store = Arc::new(MemoryStore::new());
    let ledger = WalletLedger::new(store.clone());
    let alice = UserId::new();
    let bob = UserId::new();
    for user in [alice, bob] {
        ledger
            .credit(Posting::new(user, TransactionType::Deposit, dec!(500), Currency::ngn(), "Seed"))
            .await
            .unwrap();
    }

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let ledger = ledger.clone();
            let (sender_id, receiver_id) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
            tokio::spawn(async move {
                ledger
                    .transfer(TransferRequest {
                        sender_id,
                        receiver_id,
                        amount: dec!(25),
                        currency: Currency::ngn(),
                        description: "Split".to_string(),
                    })
                    .await
            })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    assert_eq!(ledger.balance(&alice).await.unwrap(), dec!(500));
    assert_eq!(ledger.balance(&bob).await.unwrap(), dec!(500));
    assert_reconciles(&store, alice).await;
    assert_reconciles(&store, bob).await;
}

#[tokio::test]
async fn test_history_is_newest_first_and_paginated() {
    let store = Arc::new(MemoryStore::new());
    let ledger = WalletLedger::new(store.clone());
    let user = UserId::new();
    for amount in [dec!(1), dec!(2), dec!(3)] {
        ledger
            .credit(Posting::new(user, TransactionType::Deposit, amount, Currency::ngn(), "Deposit"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let page = ledger.history(&user, Page::new(2, 0)).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].signed_amount, dec!(3));
    assert_eq!(page[1].signed_amount, dec!(2));

    let rest = ledger.history(&user, Page::new(2, 2)).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].signed_amount, dec!(1));
}
