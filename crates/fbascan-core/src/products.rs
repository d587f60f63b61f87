use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogProduct;

/// A product extracted from one supplier page.
///
/// Built once by the extractor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierProduct {
    pub supplier_id: String,
    /// Supplier category the item was listed under, when known.
    pub category: Option<String>,
    pub title: String,
    pub price: Decimal,
    /// ISO 4217 code of `price`.
    pub currency: String,
    /// Normalized EAN (digits only), if the page carried one.
    pub ean: Option<String>,
    /// Absolute product page URL, if the page carried one.
    pub url: Option<String>,
    /// Every configured field exactly as extracted; `None` for optional
    /// fields no rule matched.
    pub raw_fields: BTreeMap<String, Option<String>>,
}

/// Canonical supplier-side identity used as the linking-map key.
///
/// Either `EAN_<digits>` or, when the supplier record has no EAN,
/// `URL_<canonical url>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductKey(String);

impl ProductKey {
    pub const EAN_PREFIX: &'static str = "EAN_";
    pub const URL_PREFIX: &'static str = "URL_";

    #[must_use]
    pub fn from_ean(ean: &str) -> Self {
        Self(format!("{}{}", Self::EAN_PREFIX, ean.trim()))
    }

    /// Builds a URL-derived key. Fragments and trailing slashes are dropped
    /// so trivially different spellings of one page share a key.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let without_fragment = url.trim().split('#').next().unwrap_or_default();
        let canonical = without_fragment.trim_end_matches('/');
        Self(format!("{}{}", Self::URL_PREFIX, canonical))
    }

    /// Prefers the EAN; falls back to the URL; `None` when the record has neither.
    #[must_use]
    pub fn derive(product: &SupplierProduct) -> Option<Self> {
        if let Some(ean) = product.ean.as_deref().filter(|e| !e.trim().is_empty()) {
            return Some(Self::from_ean(ean));
        }
        product
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(Self::from_url)
    }

    /// Wraps an already-canonical key, e.g. one read back from storage.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_ean_keyed(&self) -> bool {
        self.0.starts_with(Self::EAN_PREFIX)
    }

    #[must_use]
    pub fn is_url_keyed(&self) -> bool {
        self.0.starts_with(Self::URL_PREFIX)
    }
}

impl std::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Profitability figures for one supplier/catalog pair. All money values
/// are in `currency`, the supplier's currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub currency: String,
    pub supplier_cost: Decimal,
    pub marketplace_price: Decimal,
    pub computed_fees: Decimal,
    pub net_profit: Decimal,
    /// `None` when `supplier_cost` is zero.
    pub roi_percent: Option<Decimal>,
    pub break_even_price: Decimal,
    /// Data-completeness score in `[0, 1]`.
    pub confidence_score: f64,
    /// Set when the marketplace price was converted from another currency.
    pub converted_from: Option<String>,
}

impl AnalysisResult {
    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.net_profit > Decimal::ZERO
    }
}

/// One row of the tabular report projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub supplier_product_identifier: String,
    pub supplier_id: String,
    pub title: String,
    pub supplier_url: Option<String>,
    pub ean: Option<String>,
    pub catalog_identifier: String,
    pub currency: String,
    pub supplier_cost: Decimal,
    pub marketplace_price: Option<Decimal>,
    pub computed_fees: Option<Decimal>,
    pub net_profit: Option<Decimal>,
    pub roi_percent: Option<Decimal>,
    pub break_even_price: Option<Decimal>,
    pub confidence_score: Option<f64>,
    pub fba_seller_count: Option<u32>,
    pub fbm_seller_count: Option<u32>,
    pub total_offer_count: Option<u32>,
    pub bought_in_past_month: Option<u32>,
    /// `analyzed` or `profitability_unknown`.
    pub status: &'static str,
}

impl ReportRow {
    /// Projects a matched product into a report row. `analysis` is `None`
    /// when profitability could not be determined.
    #[must_use]
    pub fn new(
        key: &ProductKey,
        product: &SupplierProduct,
        catalog: &CatalogProduct,
        analysis: Option<&AnalysisResult>,
    ) -> Self {
        Self {
            supplier_product_identifier: key.to_string(),
            supplier_id: product.supplier_id.clone(),
            title: product.title.clone(),
            supplier_url: product.url.clone(),
            ean: product.ean.clone(),
            catalog_identifier: catalog.asin.clone(),
            currency: product.currency.clone(),
            supplier_cost: product.price,
            marketplace_price: analysis.map(|a| a.marketplace_price),
            computed_fees: analysis.map(|a| a.computed_fees),
            net_profit: analysis.map(|a| a.net_profit),
            roi_percent: analysis.and_then(|a| a.roi_percent),
            break_even_price: analysis.map(|a| a.break_even_price),
            confidence_score: analysis.map(|a| a.confidence_score),
            fba_seller_count: catalog.fba_seller_count,
            fbm_seller_count: catalog.fbm_seller_count,
            total_offer_count: catalog.total_offer_count,
            bought_in_past_month: catalog.bought_in_past_month,
            status: if analysis.is_some() {
                "analyzed"
            } else {
                "profitability_unknown"
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(ean: Option<&str>, url: Option<&str>) -> SupplierProduct {
        SupplierProduct {
            supplier_id: "clearance-king".to_string(),
            category: None,
            title: "Widget".to_string(),
            price: Decimal::new(1599, 2),
            currency: "GBP".to_string(),
            ean: ean.map(str::to_string),
            url: url.map(str::to_string),
            raw_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn key_prefers_ean() {
        let key = ProductKey::derive(&product(
            Some("5012345678900"),
            Some("https://supplier.test/p/1"),
        ))
        .unwrap();
        assert_eq!(key.as_str(), "EAN_5012345678900");
        assert!(key.is_ean_keyed());
    }

    #[test]
    fn key_falls_back_to_url() {
        let key = ProductKey::derive(&product(None, Some("https://supplier.test/p/1/#reviews")))
            .unwrap();
        assert_eq!(key.as_str(), "URL_https://supplier.test/p/1");
        assert!(key.is_url_keyed());
    }

    #[test]
    fn blank_ean_is_ignored() {
        let key = ProductKey::derive(&product(Some("  "), Some("https://supplier.test/p/2")))
            .unwrap();
        assert!(key.is_url_keyed());
    }

    #[test]
    fn key_is_none_without_ean_or_url() {
        assert!(ProductKey::derive(&product(None, None)).is_none());
    }

    #[test]
    fn key_serializes_as_plain_string() {
        let json = serde_json::to_string(&ProductKey::from_ean("123")).unwrap();
        assert_eq!(json, "\"EAN_123\"");
    }

    #[test]
    fn report_row_without_analysis_is_unknown() {
        let p = product(Some("123"), None);
        let catalog = CatalogProduct {
            asin: "B000TEST01".to_string(),
            fba_seller_count: Some(3),
            ..CatalogProduct::default()
        };
        let row = ReportRow::new(&ProductKey::from_ean("123"), &p, &catalog, None);
        assert_eq!(row.status, "profitability_unknown");
        assert!(row.net_profit.is_none());
        assert_eq!(row.fba_seller_count, Some(3));
        assert_eq!(row.supplier_cost, Decimal::new(1599, 2));
    }
}
