//! Data-completeness score for a catalog record.

use fbascan_core::CatalogProduct;

const SALES_RANK_WEIGHT: f64 = 0.3;
const REVIEW_COUNT_WEIGHT: f64 = 0.2;
const MONTHLY_SALES_WEIGHT: f64 = 0.2;
/// Split evenly across FBA, FBM and total offer counts.
const SELLER_OFFERS_WEIGHT: f64 = 0.3;

/// Ceiling applied when the supplier cost is zero and ROI is undefined.
pub const ZERO_COST_CONFIDENCE_CAP: f64 = 0.1;

/// Sums a fixed weight for each signal present on `catalog`. Every missing
/// signal lowers the score; the result is within `[0, 1]`.
#[must_use]
pub fn confidence_score(catalog: &CatalogProduct) -> f64 {
    let offer_signals = [
        catalog.fba_seller_count,
        catalog.fbm_seller_count,
        catalog.total_offer_count,
    ];
    let present_offers = offer_signals.iter().filter(|c| c.is_some()).count();
    #[allow(clippy::cast_precision_loss)]
    let offers = SELLER_OFFERS_WEIGHT * present_offers as f64 / offer_signals.len() as f64;

    let mut score = offers;
    if catalog.sales_rank.is_some() {
        score += SALES_RANK_WEIGHT;
    }
    if catalog.review_count.is_some() {
        score += REVIEW_COUNT_WEIGHT;
    }
    if catalog.bought_in_past_month.is_some() {
        score += MONTHLY_SALES_WEIGHT;
    }
    score.clamp(0.0, 1.0)
}
