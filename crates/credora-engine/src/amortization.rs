//! Amortization Engine
//!
//! Fixed monthly installment for an annuity loan, in exact decimal
//! arithmetic:
//!
//! ```text
//! r       = R / 12 / 100
//! payment = P * r * (1 + r)^n / ((1 + r)^n - 1)      (r > 0)
//! payment = P / n                                    (r = 0)
//! ```

use chrono::{DateTime, Duration, Utc};
use credora_types::{CredoraError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Scale at which installments are stored and charged
pub const PAYMENT_SCALE: u32 = 2;

fn overflow() -> CredoraError {
    CredoraError::validation("amount", "amortization overflowed decimal range")
}

/// Round an installment to the stored scale (half away from zero)
pub fn round_payment(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PAYMENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn monthly_rate(annual_rate_percent: Decimal) -> Decimal {
    annual_rate_percent / Decimal::from(12) / Decimal::from(100)
}

/// Exact, unrounded monthly installment.
///
/// `annual_rate_percent` is the nominal yearly rate in percent (5.5 for 5.5%).
pub fn monthly_payment(principal: Decimal, annual_rate_percent: Decimal, months: u32) -> Result<Decimal> {
    if months == 0 {
        return Err(CredoraError::validation("duration_months", "term must be at least one month"));
    }
    if principal <= Decimal::ZERO {
        return Err(CredoraError::validation("amount", "principal must be positive"));
    }
    if annual_rate_percent < Decimal::ZERO {
        return Err(CredoraError::validation("interest_rate", "rate cannot be negative"));
    }

    let r = monthly_rate(annual_rate_percent);
    if r.is_zero() {
        return Ok(principal / Decimal::from(months));
    }

    let growth = Decimal::ONE + r;
    let mut factor = Decimal::ONE;
    for _ in 0..months {
        factor = factor.checked_mul(growth).ok_or_else(overflow)?;
    }

    let numerator = principal
        .checked_mul(r)
        .and_then(|v| v.checked_mul(factor))
        .ok_or_else(overflow)?;
    numerator
        .checked_div(factor - Decimal::ONE)
        .ok_or_else(overflow)
}

/// One row of a repayment schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub period: u32,
    pub due_date: DateTime<Utc>,
    pub payment: Decimal,
    pub principal: Decimal,
    pub interest: Decimal,
    /// Outstanding principal after this payment
    pub balance: Decimal,
}

/// Full amortization table.
///
/// Installments use the rounded monthly payment; the last period absorbs the
/// rounding remainder so the closing balance is exactly zero.
pub fn schedule(
    principal: Decimal,
    annual_rate_percent: Decimal,
    months: u32,
    first_due: DateTime<Utc>,
    interval_days: i64,
) -> Result<Vec<ScheduleEntry>> {
    let payment = round_payment(monthly_payment(principal, annual_rate_percent, months)?);
    let r = monthly_rate(annual_rate_percent);

    let mut balance = principal;
    let mut rows = Vec::with_capacity(months as usize);
    for period in 1..=months {
        let interest = round_payment(balance * r);
        let (principal_part, amount) = if period == months {
            (balance, balance + interest)
        } else {
            let principal_part = (payment - interest).min(balance);
            (principal_part, principal_part + interest)
        };
        balance -= principal_part;
        rows.push(ScheduleEntry {
            period,
            due_date: first_due + Duration::days(interval_days * i64::from(period - 1)),
            payment: amount,
            principal: principal_part,
            interest,
            balance,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_installment() {
        let payment = monthly_payment(dec!(12000), dec!(5.5), 12).unwrap();
        assert_eq!(round_payment(payment), dec!(1030.04));
        // Reproducible to the last digit.
        assert_eq!(payment, monthly_payment(dec!(12000), dec!(5.5), 12).unwrap());
    }

    #[test]
    fn test_other_installments() {
        assert_eq!(round_payment(monthly_payment(dec!(10000), dec!(5.5), 12).unwrap()), dec!(858.37));
        assert_eq!(round_payment(monthly_payment(dec!(10000), dec!(12), 12).unwrap()), dec!(888.49));
        assert_eq!(round_payment(monthly_payment(dec!(1000), dec!(10), 6).unwrap()), dec!(171.56));
    }

    #[test]
    fn test_zero_rate_is_exact_division() {
        assert_eq!(monthly_payment(dec!(12000), Decimal::ZERO, 12).unwrap(), dec!(1000));
        let third = monthly_payment(dec!(100), Decimal::ZERO, 3).unwrap();
        assert_eq!(third, dec!(100) / dec!(3));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(monthly_payment(dec!(1000), dec!(5), 0).is_err());
        assert!(monthly_payment(dec!(0), dec!(5), 12).is_err());
        assert!(monthly_payment(dec!(1000), dec!(-1), 12).is_err());
    }

    #[test]
    fn test_long_term_does_not_overflow() {
        let payment = monthly_payment(dec!(250000), dec!(36), 360).unwrap();
        assert!(payment > dec!(7500));
    }

    #[test]
    fn test_schedule_retires_principal() {
        let start = Utc::now();
        let rows = schedule(dec!(12000), dec!(5.5), 12, start, 30).unwrap();

        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].payment, dec!(1030.04));
        assert_eq!(rows[0].interest, dec!(55.00));
        assert_eq!(rows[11].balance, Decimal::ZERO);
        assert_eq!(rows[11].due_date, start + Duration::days(330));

        let principal: Decimal = rows.iter().map(|r| r.principal).sum();
        assert_eq!(principal, dec!(12000));
    }
}
