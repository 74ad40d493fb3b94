use dropship_core::catalog::Product;
use dropship_core::{CoreError, CoreResult};
use dropship_shared::round_currency;
use rust_decimal::Decimal;
use serde::Serialize;

/// Money figures for one sale line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionBreakdown {
    pub total: Decimal,
    pub commission: Decimal,
    /// Display figure, rounded to two decimals.
    pub profit_per_unit: Decimal,
}

/// Computes order total and commission.
///
/// `total` and `commission` are exact; only `profit_per_unit` is rounded.
pub fn compute(
    unit_price: Decimal,
    quantity: i32,
    commission_pct: Decimal,
) -> CoreResult<CommissionBreakdown> {
    if quantity < 1 {
        return Err(CoreError::ValidationError(format!(
            "quantity must be at least 1, got {}",
            quantity
        )));
    }
    if commission_pct < Decimal::ZERO || commission_pct > Decimal::ONE_HUNDRED {
        return Err(CoreError::ValidationError(format!(
            "commission percentage must be within 0..=100, got {}",
            commission_pct
        )));
    }
    if unit_price < Decimal::ZERO {
        return Err(CoreError::ValidationError(format!(
            "unit price must not be negative, got {}",
            unit_price
        )));
    }

    let total = unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(out_of_range)?;
    // Scaling the rate first keeps the product within `total`.
    let rate = commission_pct
        .checked_div(Decimal::ONE_HUNDRED)
        .ok_or_else(out_of_range)?;
    let commission = total.checked_mul(rate).ok_or_else(out_of_range)?;

    Ok(CommissionBreakdown {
        total,
        commission,
        profit_per_unit: per_unit(commission, quantity),
    })
}

fn out_of_range() -> CoreError {
    CoreError::ValidationError("amount out of range".to_string())
}

fn per_unit(commission: Decimal, quantity: i32) -> Decimal {
    round_currency(commission / Decimal::from(quantity))
}

/// Resolves which percentage applies to a product and enforces the product's
/// commission floor and ceiling.
#[derive(Debug, Clone, Copy)]
pub struct CommissionPolicy {
    pub default_percentage: Decimal,
}

impl CommissionPolicy {
    pub fn new(default_percentage: Decimal) -> Self {
        Self { default_percentage }
    }

    pub fn percentage_for(&self, product: &Product) -> Decimal {
        product.commission_percentage.unwrap_or(self.default_percentage)
    }

    /// Returns the nominal percentage and the (possibly clamped) breakdown.
    /// When both bounds are set and contradict each other the ceiling wins.
    /// The floor never lifts the commission above the order total.
    pub fn settle(
        &self,
        product: &Product,
        unit_price: Decimal,
        quantity: i32,
    ) -> CoreResult<(Decimal, CommissionBreakdown)> {
        let pct = self.percentage_for(product);
        let mut breakdown = compute(unit_price, quantity, pct)?;

        let mut commission = breakdown.commission;
        if let Some(min) = product.min_commission {
            commission = commission.max(min.min(breakdown.total));
        }
        if let Some(max) = product.max_commission {
            commission = commission.min(max);
        }

        if commission != breakdown.commission {
            tracing::debug!(
                product_id = %product.id,
                nominal = %breakdown.commission,
                clamped = %commission,
                "Commission clamped to product bounds"
            );
            breakdown.commission = commission;
            breakdown.profit_per_unit = per_unit(commission, quantity);
        }

        Ok((pct, breakdown))
    }
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self::new(Decimal::from(15))
    }
}
