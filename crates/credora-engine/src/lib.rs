//! Credora Engine - Loan lifecycle and funding workflows over the wallet ledger
//!
//! The engine orchestrates every multi-step financial workflow:
//!
//! - Loan applications, counter-offers, processing fees, approval and disbursement
//! - Repayment allocation against active loans
//! - Manual deposits, gateway deposits and webhook confirmation
//! - Withdrawals, grants, transfers and admin adjustments
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Engine    │────▶│ WalletLedger │────▶│ LedgerStore  │
//! │ (workflows)  │     │ (postings)   │     │ (unit commit)│
//! └──────┬───────┘     └──────────────┘     └──────────────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │   Notifier   │  fire-and-forget, after commit
//! └──────────────┘
//! ```

pub mod amortization;
pub mod config;
pub mod deposits;
pub mod engine;
pub mod gateway;
pub mod grants;
pub mod loans;
pub mod notify;
pub mod repayment;
pub mod wallets;
pub mod withdrawals;

pub use amortization::{monthly_payment, round_payment, schedule, ScheduleEntry};
pub use config::EngineConfig;
pub use engine::Engine;
pub use gateway::{
    GatewayCheckout, PaymentConfirmation, WebhookData, WebhookEvent, WebhookOutcome,
    CHARGE_FAILED, CHARGE_SUCCESS,
};
pub use loans::{FeeRequest, LoanRequest};
pub use notify::{Channel, NoopNotifier, Notification, Notifier, NotifyError, TracingNotifier};
pub use repayment::{Repayment, LOAN_REPAYMENT};
pub use withdrawals::WithdrawalRequest;
