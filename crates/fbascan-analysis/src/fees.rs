//! Marketplace fee model: referral, closing and fulfilment fees for one
//! catalog record under a [`FeeSchedule`].

use fbascan_core::{FeeSchedule, SizeTier};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

pub const OVERSIZE_TIER: &str = "oversize";

/// Fees for selling one unit, in the schedule's currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeBreakdown {
    pub referral: Decimal,
    pub closing: Decimal,
    pub fulfilment: Decimal,
    pub total: Decimal,
    pub size_tier: String,
    /// Dimensions or weight were missing and the largest standard tier was assumed.
    pub estimated: bool,
}

/// Computes the fees for selling at `price`.
///
/// Referral is `max(rate * price, minimum)`. Fulfilment is the first size
/// tier that fits the sorted dimensions and weight, or the oversize charge
/// when none does. Without dimensions or weight the largest standard tier
/// is assumed. Amounts are rounded to the minor unit.
#[must_use]
pub fn fee_model(
    schedule: &FeeSchedule,
    price: Decimal,
    weight_lb: Option<f64>,
    dimensions_in: Option<[f64; 3]>,
    category: Option<&str>,
) -> FeeBreakdown {
    let referral = round_money(
        (price * schedule.referral_rate(category)).max(schedule.minimum_referral_fee),
    );
    let closing = round_money(schedule.closing_fee(category));

    let (size_tier, fulfilment, estimated) = match (weight_lb, dimensions_in) {
        (Some(weight), Some(dims)) => match fitting_tier(&schedule.size_tiers, weight, dims) {
            Some(tier) => (tier.name.clone(), tier.fee, false),
            None => (OVERSIZE_TIER.to_owned(), oversize_fee(schedule, weight), false),
        },
        _ => match schedule.size_tiers.last() {
            Some(tier) => (tier.name.clone(), tier.fee, true),
            None => (OVERSIZE_TIER.to_owned(), schedule.oversize.base_fee, true),
        },
    };
    let fulfilment = round_money(fulfilment);

    FeeBreakdown {
        referral,
        closing,
        fulfilment,
        total: referral + closing + fulfilment,
        size_tier,
        estimated,
    }
}

fn fitting_tier(tiers: &[SizeTier], weight: f64, dims: [f64; 3]) -> Option<&SizeTier> {
    let mut sorted = dims;
    sorted.sort_by(|a, b| b.total_cmp(a));
    let [longest, median, shortest] = sorted;

    tiers.iter().find(|tier| {
        longest <= tier.max_longest_in
            && median <= tier.max_median_in
            && shortest <= tier.max_shortest_in
            && weight <= tier.max_weight_lb
    })
}

fn oversize_fee(schedule: &FeeSchedule, weight: f64) -> Decimal {
    let excess = (weight - schedule.oversize.included_lb).max(0.0).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let started_pounds = excess.min(f64::from(u32::MAX)) as u32;
    schedule.oversize.base_fee + schedule.oversize.per_lb * Decimal::from(started_pounds)
}

pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
