//! Rental cost computation.

use crate::core::currency::ExchangeRate;
use crate::core::rental::{DeliveryMethod, RentalConfiguration};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Share of the purchase price charged per week when an item has no
/// explicit weekly rental price.
pub const WEEKLY_RATE_FACTOR: Decimal = dec!(0.1);

/// Flat USD surcharge for home delivery.
pub const DELIVERY_SURCHARGE: Decimal = dec!(2.99);

/// Pricing input for a single catalog item, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPrice {
    pub price: Decimal,
    pub rental_price: Option<Decimal>,
}

impl ItemPrice {
    /// A zero or negative rental price counts as unset.
    pub fn weekly_rate(&self) -> Decimal {
        self.rental_price
            .filter(|rate| *rate > Decimal::ZERO)
            .unwrap_or(self.price * WEEKLY_RATE_FACTOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    pub weekly_rate: Decimal,
    /// Weekly rate times weeks, unrounded.
    pub rental_cost: Decimal,
    pub delivery_cost: Decimal,
    pub total_usd: Decimal,
    pub total_local: Decimal,
    pub exchange_rate: Decimal,
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes the cost of a rental in USD and local currency.
///
/// Pure: the result depends only on the arguments. Rental cost scales
/// linearly with the number of weeks; only the totals are rounded.
pub fn compute_cost(
    config: &RentalConfiguration,
    item: &ItemPrice,
    rate: &ExchangeRate,
) -> CostBreakdown {
    let weekly_rate = item.weekly_rate();
    let rental_cost = weekly_rate * Decimal::from(config.duration.weeks());
    let delivery_cost = match config.delivery {
        DeliveryMethod::Delivery => DELIVERY_SURCHARGE,
        DeliveryMethod::Pickup => Decimal::ZERO,
    };

    let total_usd = round_money(rental_cost + delivery_cost);
    let total_local = round_money(total_usd * rate.value);

    CostBreakdown {
        weekly_rate,
        rental_cost,
        delivery_cost,
        total_usd,
        total_local,
        exchange_rate: rate.value,
    }
}
