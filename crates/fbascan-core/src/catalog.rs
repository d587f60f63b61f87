//! Reference-marketplace catalog records.
//!
//! [`CatalogProduct`] is the typed, read-only view the analyzer consumes.
//! [`CatalogRecord`] is the loosely structured on-disk cache shape it is
//! parsed from: everything but `asin` is optional, and seller/sales signals
//! may arrive either as flat fields or nested in a `keepa` block.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub asin: String,
    pub title: Option<String>,
    pub ean: Option<String>,
    pub current_price: Option<Decimal>,
    /// ISO 4217 code of `current_price`; the fee schedule currency is
    /// assumed when absent.
    pub currency: Option<String>,
    pub sales_rank: Option<u32>,
    pub category: Option<String>,
    pub weight_pounds: Option<f64>,
    /// Length, width, height in inches, in any order.
    pub dimensions_inches: Option<[f64; 3]>,
    pub review_count: Option<u32>,
    pub rating: Option<f64>,
    pub fba_seller_count: Option<u32>,
    pub fbm_seller_count: Option<u32>,
    pub total_offer_count: Option<u32>,
    pub bought_in_past_month: Option<u32>,
}

/// Tolerant deserialization target for cached catalog JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    pub asin: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ean: Option<String>,
    #[serde(default, alias = "price")]
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub sales_rank: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub weight_pounds: Option<f64>,
    #[serde(default)]
    pub dimensions_inches: Option<Vec<f64>>,
    #[serde(default)]
    pub review_count: Option<u32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub fba_seller_count: Option<u32>,
    #[serde(default)]
    pub fbm_seller_count: Option<u32>,
    #[serde(default)]
    pub total_offer_count: Option<u32>,
    #[serde(default)]
    pub bought_in_past_month: Option<u32>,
    #[serde(default)]
    pub amazon_monthly_sales_badge: Option<String>,
    #[serde(default)]
    pub keepa: Option<KeepaBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeepaBlock {
    #[serde(default)]
    pub product_details_tab_data: BTreeMap<String, TabValue>,
}

/// A value from the keepa details tab; counts arrive as numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TabValue {
    Count(u64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

impl TabValue {
    fn as_count(&self) -> Option<u32> {
        match self {
            TabValue::Count(n) => u32::try_from(*n).ok(),
            TabValue::Text(s) => {
                let digits: String = s.chars().filter(char::is_ascii_digit).collect();
                digits.parse().ok()
            }
            TabValue::Other(_) => None,
        }
    }
}

impl CatalogRecord {
    fn tab_count(&self, key: &str) -> Option<u32> {
        self.keepa
            .as_ref()
            .and_then(|k| k.product_details_tab_data.get(key))
            .and_then(TabValue::as_count)
    }

    /// Flattens the record into a [`CatalogProduct`]. Flat fields win over
    /// their keepa or badge equivalents.
    #[must_use]
    pub fn into_product(self) -> CatalogProduct {
        let fba_seller_count = self
            .fba_seller_count
            .or_else(|| self.tab_count("FBA Seller Count"));
        let fbm_seller_count = self
            .fbm_seller_count
            .or_else(|| self.tab_count("FBM Seller Count"));
        let total_offer_count = self
            .total_offer_count
            .or_else(|| self.tab_count("Total Offer Count"));
        let bought_in_past_month = self.bought_in_past_month.or_else(|| {
            self.amazon_monthly_sales_badge
                .as_deref()
                .and_then(parse_monthly_sales_badge)
        });

        let dimensions_inches = match self.dimensions_inches.as_deref() {
            Some(&[a, b, c]) => Some([a, b, c]),
            _ => None,
        };

        CatalogProduct {
            asin: self.asin,
            title: self.title,
            ean: self.ean,
            current_price: self.current_price,
            currency: self.currency,
            sales_rank: self.sales_rank,
            category: self.category,
            weight_pounds: self.weight_pounds,
            dimensions_inches,
            review_count: self.review_count,
            rating: self.rating,
            fba_seller_count,
            fbm_seller_count,
            total_offer_count,
            bought_in_past_month,
        }
    }
}

/// Parses a marketplace sales badge such as `"1K+ bought in past month"`
/// into a unit count (`1000`). Returns `None` when no number is present.
#[must_use]
pub fn parse_monthly_sales_badge(badge: &str) -> Option<u32> {
    parse_count(badge).and_then(|n| u32::try_from(n).ok())
}

/// Reads the first count in `text`, honouring `,` separators and a `K`/`M`
/// multiplier suffix: `"1,234 reviews"` is 1234, `"2.5K+"` is 2500.
#[must_use]
pub fn parse_count(text: &str) -> Option<u64> {
    let token = text
        .split_whitespace()
        .find(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()))?;
    let token = token.trim_end_matches('+').replace(',', "");

    let (number, multiplier) = match token.chars().last()? {
        'k' | 'K' => (&token[..token.len() - 1], 1_000.0),
        'm' | 'M' => (&token[..token.len() - 1], 1_000_000.0),
        _ => (token.as_str(), 1.0),
    };

    let value: f64 = number.parse().ok()?;
    let units = (value * multiplier).round();
    #[allow(clippy::cast_precision_loss)]
    let ceiling = u64::MAX as f64;
    if !(0.0..ceiling).contains(&units) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(units as u64)
}
