//! Marketplace fee schedule. The numbers live here as data; the fee model
//! that applies them to a catalog record lives in `fbascan-analysis`.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A fulfilment size tier. A product fits a tier when its sorted dimensions
/// and weight are all within the tier's maxima.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeTier {
    pub name: String,
    pub max_longest_in: f64,
    pub max_median_in: f64,
    pub max_shortest_in: f64,
    pub max_weight_lb: f64,
    pub fee: Decimal,
}

/// Fulfilment charge for products that fit no standard tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OversizeFee {
    pub base_fee: Decimal,
    /// Weight covered by `base_fee`.
    pub included_lb: f64,
    /// Charge per started pound above `included_lb`.
    pub per_lb: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Currency every amount in the schedule is denominated in.
    pub currency: String,
    pub default_referral_rate: Decimal,
    pub minimum_referral_fee: Decimal,
    /// Referral rate overrides keyed by lowercase category name.
    #[serde(default)]
    pub category_referral_rates: BTreeMap<String, Decimal>,
    /// Fixed per-item closing fees keyed by lowercase category name.
    #[serde(default)]
    pub closing_fees: BTreeMap<String, Decimal>,
    /// Standard tiers, smallest first.
    pub size_tiers: Vec<SizeTier>,
    pub oversize: OversizeFee,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let tier = |name: &str, dims: (f64, f64, f64), weight: f64, fee: Decimal| SizeTier {
            name: name.to_string(),
            max_longest_in: dims.0,
            max_median_in: dims.1,
            max_shortest_in: dims.2,
            max_weight_lb: weight,
            fee,
        };

        let mut category_referral_rates = BTreeMap::new();
        category_referral_rates.insert("electronics".to_string(), Decimal::new(8, 2));
        category_referral_rates.insert("computers".to_string(), Decimal::new(7, 2));
        category_referral_rates.insert("grocery".to_string(), Decimal::new(8, 2));
        category_referral_rates.insert("home & kitchen".to_string(), Decimal::new(15, 2));
        category_referral_rates.insert("beauty".to_string(), Decimal::new(8, 2));

        let mut closing_fees = BTreeMap::new();
        closing_fees.insert("books".to_string(), Decimal::new(50, 2));
        closing_fees.insert("music".to_string(), Decimal::new(50, 2));
        closing_fees.insert("dvd".to_string(), Decimal::new(50, 2));

        Self {
            currency: "GBP".to_string(),
            default_referral_rate: Decimal::new(15, 2),
            minimum_referral_fee: Decimal::new(25, 2),
            category_referral_rates,
            closing_fees,
            size_tiers: vec![
                tier("small_envelope", (7.9, 5.9, 0.4), 0.18, Decimal::new(186, 2)),
                tier("standard_envelope", (13.0, 9.8, 1.0), 0.97, Decimal::new(229, 2)),
                tier("small_parcel", (13.8, 11.8, 5.9), 2.2, Decimal::new(288, 2)),
                tier("standard_parcel", (17.7, 13.8, 7.9), 4.4, Decimal::new(356, 2)),
                tier("large_parcel", (17.7, 13.8, 7.9), 26.5, Decimal::new(589, 2)),
            ],
            oversize: OversizeFee {
                base_fee: Decimal::new(950, 2),
                included_lb: 1.0,
                per_lb: Decimal::new(40, 2),
            },
        }
    }
}

impl FeeSchedule {
    /// Load a fee schedule from YAML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let schedule: FeeSchedule = crate::read_yaml(path)?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for rates outside `[0, 1]`,
    /// negative fees, or an empty tier list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = Decimal::ONE;
        let rates = std::iter::once(&self.default_referral_rate)
            .chain(self.category_referral_rates.values());
        for rate in rates {
            if rate.is_sign_negative() || *rate > unit {
                return Err(ConfigError::Validation(format!(
                    "referral rate {rate} must be within [0, 1]"
                )));
            }
        }

        if self.minimum_referral_fee.is_sign_negative()
            || self.closing_fees.values().any(Decimal::is_sign_negative)
            || self.oversize.base_fee.is_sign_negative()
            || self.oversize.per_lb.is_sign_negative()
        {
            return Err(ConfigError::Validation(
                "fee amounts must be non-negative".to_string(),
            ));
        }

        if self.size_tiers.is_empty() {
            return Err(ConfigError::Validation(
                "fee schedule needs at least one size tier".to_string(),
            ));
        }
        for tier in &self.size_tiers {
            if tier.fee.is_sign_negative() {
                return Err(ConfigError::Validation(format!(
                    "size tier '{}' has a negative fee",
                    tier.name
                )));
            }
        }

        Ok(())
    }

    /// Referral rate for `category`, matched case-insensitively.
    #[must_use]
    pub fn referral_rate(&self, category: Option<&str>) -> Decimal {
        category
            .and_then(|c| self.category_referral_rates.get(&c.trim().to_lowercase()))
            .copied()
            .unwrap_or(self.default_referral_rate)
    }

    /// Closing fee for `category`, zero when none applies.
    #[must_use]
    pub fn closing_fee(&self, category: Option<&str>) -> Decimal {
        category
            .and_then(|c| self.closing_fees.get(&c.trim().to_lowercase()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}
