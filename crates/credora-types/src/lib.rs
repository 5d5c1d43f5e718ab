//! Credora Types - Canonical domain types for the ledger and lending engine
//!
//! This crate contains all foundational types for Credora with zero dependencies
//! on other credora crates. It defines:
//!
//! - Identity types (UserId, LoanId, TransactionId, etc.) and the caller identity context
//! - Currency codes and amount validation over exact decimals
//! - Wallets and the append-only transaction record
//! - Loan applications with their negotiated offer sub-state
//! - Deposits, gateway payments, withdrawals and grants
//! - Audit records and the error taxonomy
//!
//! # Monetary Invariants
//!
//! 1. Money is `rust_decimal::Decimal`, never binary floating point
//! 2. A wallet balance equals the signed sum of its `COMPLETED` transactions
//! 3. For every `COMPLETED` transaction, `balance_after - balance_before` is its signed amount
//! 4. `0 <= total_repaid <= amount` for every loan

pub mod identity;
pub mod actor;
pub mod currency;
pub mod wallet;
pub mod transaction;
pub mod loan;
pub mod funding;
pub mod grant;
pub mod audit;
pub mod error;

pub use identity::*;
pub use actor::*;
pub use currency::*;
pub use wallet::*;
pub use transaction::*;
pub use loan::*;
pub use funding::*;
pub use grant::*;
pub use audit::*;
pub use error::*;

/// Entities guarded by optimistic concurrency carry a version that the
/// store checks on every update.
pub trait Versioned {
    /// Version last read from the store
    fn version(&self) -> i64;

    /// Advance to the version the store will hold after a successful write
    fn bump_version(&mut self);
}

macro_rules! impl_versioned {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Versioned for $ty {
                fn version(&self) -> i64 {
                    self.version
                }

                fn bump_version(&mut self) {
                    self.version += 1;
                }
            }
        )*
    };
}

impl_versioned!(Wallet, LoanApplication, Deposit, Payment, Withdrawal, Grant);
