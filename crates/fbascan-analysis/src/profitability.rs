//! Per-product profitability.
//!
//! All money in the result is in the supplier's currency. The marketplace
//! price is converted into it when the currencies differ; fees are computed
//! in the fee schedule's currency and converted the same way.

use fbascan_core::{AnalysisResult, CatalogProduct, FeeSchedule, SupplierProduct};
use rust_decimal::Decimal;

use crate::confidence::{confidence_score, ZERO_COST_CONFIDENCE_CAP};
use crate::currency::{same_currency, RateTable};
use crate::error::{AnalysisError, ConversionError};
use crate::fees::{fee_model, round_money, FeeBreakdown};

#[derive(Debug, Clone)]
pub struct ProfitabilityAnalyzer {
    fees: FeeSchedule,
}

impl ProfitabilityAnalyzer {
    #[must_use]
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    #[must_use]
    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Whether analyzing this pair needs a rate table.
    #[must_use]
    pub fn needs_conversion(&self, product: &SupplierProduct, catalog: &CatalogProduct) -> bool {
        let market = self.market_currency(catalog);
        !same_currency(&product.currency, market) || !same_currency(market, &self.fees.currency)
    }

    /// Computes cost, fees, profit, ROI, break-even and confidence.
    ///
    /// `rates` is `None` when conversion is disabled; a pair that needs it
    /// then fails with [`ConversionError::Disabled`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] when the catalog record has no usable price
    /// or a needed conversion fails. Callers report the product as
    /// profitability unknown and move on.
    pub fn analyze(
        &self,
        product: &SupplierProduct,
        catalog: &CatalogProduct,
        rates: Option<&RateTable>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let price = catalog
            .current_price
            .ok_or_else(|| AnalysisError::MissingMarketplacePrice {
                asin: catalog.asin.clone(),
            })?;
        if price <= Decimal::ZERO {
            return Err(AnalysisError::NonPositivePrice {
                asin: catalog.asin.clone(),
                price,
            });
        }

        let market = self.market_currency(catalog);
        let supplier = product.currency.as_str();
        let schedule = self.fees.currency.as_str();
        let convert = |amount: Decimal, from: &str, to: &str| -> Result<Decimal, ConversionError> {
            if same_currency(from, to) {
                return Ok(amount);
            }
            rates
                .ok_or_else(|| ConversionError::Disabled {
                    from: from.to_owned(),
                    to: to.to_owned(),
                })?
                .convert(amount, from, to)
        };

        let fees: FeeBreakdown = fee_model(
            &self.fees,
            convert(price, market, schedule)?,
            catalog.weight_pounds,
            catalog.dimensions_inches,
            catalog.category.as_deref(),
        );
        let computed_fees = round_money(convert(fees.total, schedule, supplier)?);
        let marketplace_price = round_money(convert(price, market, supplier)?);
        let supplier_cost = product.price;

        let net_profit = marketplace_price - supplier_cost - computed_fees;
        let roi_percent = (supplier_cost > Decimal::ZERO)
            .then(|| round_money(net_profit / supplier_cost * Decimal::ONE_HUNDRED));
        let break_even_price = supplier_cost + computed_fees;

        let mut confidence = confidence_score(catalog);
        if roi_percent.is_none() {
            confidence = confidence.min(ZERO_COST_CONFIDENCE_CAP);
        }

        let converted_from = (!same_currency(market, supplier)).then(|| market.to_uppercase());

        tracing::debug!(
            asin = %catalog.asin,
            size_tier = %fees.size_tier,
            fees = %computed_fees,
            net_profit = %net_profit,
            "product analyzed"
        );

        Ok(AnalysisResult {
            currency: supplier.to_uppercase(),
            supplier_cost,
            marketplace_price,
            computed_fees,
            net_profit,
            roi_percent,
            break_even_price,
            confidence_score: confidence,
            converted_from,
        })
    }

    fn market_currency<'a>(&'a self, catalog: &'a CatalogProduct) -> &'a str {
        catalog
            .currency
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&self.fees.currency)
    }
}

#[cfg(test)]
#[path = "profitability_test.rs"]
mod tests;
