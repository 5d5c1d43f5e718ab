//! Credora Ledger - Wallet balances and the immutable transaction log
//!
//! The ledger is:
//! - Wallet-keyed by UserId (one wallet, one currency per user)
//! - Append-only (transactions are never edited, only settled or failed)
//! - Atomic (every balance change is committed together with its record)
//! - Serialized per wallet (see [`WalletLocks`])
//!
//! # Invariants
//!
//! 1. No negative balances
//! 2. `wallet.balance` equals the signed sum of the owner's `COMPLETED` transactions
//! 3. For every `COMPLETED` transaction, `balance_after - balance_before` is its signed amount
//! 4. A unit of work is applied entirely or not at all

pub mod classifier;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod statistics;
pub mod store;

pub use classifier::{direction, signed_amount};
pub use ledger::{new_reference, Posting, TransferRequest, WalletLedger};
pub use locks::{WalletGuard, WalletLocks};
pub use memory::MemoryStore;
pub use statistics::{AdminStatistics, HistoryEntry, PeriodTotals, UserStatistics};
pub use store::{Change, LedgerStore, Page, Settlement, StoredEntity, UnitOfWork};
