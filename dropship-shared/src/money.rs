use rust_decimal::{Decimal, RoundingStrategy};

/// All amounts are Paraguayan guaraníes.
pub const CURRENCY: &str = "PYG";

/// Rounds a display amount to two decimal places, halves away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats an amount the way receipts show it: `₲ 1.234.567`.
///
/// Guaraní amounts carry no minor unit in practice, so the value is rounded to
/// the nearest whole number and grouped with `.` as the thousands separator.
pub fn format_guarani(amount: Decimal) -> String {
    let whole = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let negative = whole.is_sign_negative() && !whole.is_zero();
    let digits = whole.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-₲ {}", grouped)
    } else {
        format!("₲ {}", grouped)
    }
}
