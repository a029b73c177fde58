use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::catalog::DiscountShape;

/// Monetary value of one use of a program against `spend`.
///
/// Always within `[0, max_amount]`; immediate reductions are also capped at the spend itself.
/// Fractions below two decimal places are truncated so a value never rounds up. Arithmetic that
/// would overflow saturates to the cap, or to the spend for uncapped programs.
pub(crate) fn benefit_value(
    shape: &DiscountShape,
    max_amount: Option<Decimal>,
    spend: Decimal,
    cap_at_spend: bool,
) -> Decimal {
    let spend = spend.max(Decimal::ZERO);

    let raw = match shape {
        DiscountShape::Percent { percent } => spend
            .checked_mul(*percent)
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED)),
        DiscountShape::Fixed { amount } => Some(*amount),
        DiscountShape::PerUnit { rule } => spend
            .checked_div(rule.unit_amount)
            .and_then(|units| units.floor().checked_mul(rule.value_per_unit)),
    };
    let raw = raw.unwrap_or_else(|| max_amount.unwrap_or(spend));

    let mut value = match max_amount {
        Some(cap) => raw.min(cap),
        None => raw,
    };
    if cap_at_spend {
        value = value.min(spend);
    }

    value
        .max(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Value as a percentage of spend, rounded to two places.
pub(crate) fn benefit_rate(value: Decimal, spend: Decimal) -> f64 {
    if spend <= Decimal::ZERO {
        return 0.0;
    }

    value
        .checked_div(spend)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|rate| rate.round_dp(2))
        .and_then(|rate| rate.to_f64())
        .unwrap_or(0.0)
}
