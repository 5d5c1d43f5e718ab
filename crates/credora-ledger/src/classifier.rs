//! Transaction classifier
//!
//! Read-side only: derives the direction of a transaction as seen by a
//! viewer, for history and statistics. The ledger's own balance snapshots are
//! authoritative and never consult this.
//!
//! Rules, in order:
//! 1. Kinds with a fixed direction use it.
//! 2. `TRANSFER`: credit for the receiver, debit for the sender. Without a
//!    transfer link, `balance_after > balance_before` means credit; with no
//!    snapshot either, credit.
//! 3. `ADJUSTMENT` and unknown kinds: balance delta when known, otherwise the
//!    description is scanned for "debit" then "credit", otherwise credit.
//!
//! The credit default in rules 2 and 3 can misread an ambiguous debit. It is
//! kept as-is; see DESIGN.md.

use credora_types::{Direction, Transaction, TransactionType, UserId};
use rust_decimal::Decimal;

/// Direction of `tx` from the point of view of `viewer`
pub fn direction(tx: &Transaction, viewer: &UserId) -> Direction {
    if let Some(fixed) = tx.kind.fixed_direction() {
        return fixed;
    }
    match tx.kind {
        TransactionType::Transfer => transfer_direction(tx, viewer),
        _ => inferred_direction(tx),
    }
}

/// Amount with sign: positive for credits, negative for debits
pub fn signed_amount(tx: &Transaction, viewer: &UserId) -> Decimal {
    direction(tx, viewer).sign(tx.amount)
}

fn transfer_direction(tx: &Transaction, viewer: &UserId) -> Direction {
    if let Some(link) = &tx.transfer {
        if &link.receiver_id == viewer {
            return Direction::Credit;
        }
        if &link.sender_id == viewer {
            return Direction::Debit;
        }
    }
    match tx.balance_delta() {
        Some(delta) if delta > Decimal::ZERO => Direction::Credit,
        Some(_) => Direction::Debit,
        None => Direction::Credit,
    }
}

fn inferred_direction(tx: &Transaction) -> Direction {
    if let Some(delta) = tx.balance_delta() {
        return if delta < Decimal::ZERO {
            Direction::Debit
        } else {
            Direction::Credit
        };
    }
    let description = tx.description.to_lowercase();
    if description.contains("debit") {
        Direction::Debit
    } else {
        Direction::Credit
    }
}
