use thiserror::Error;

/// A currency pair the rate table cannot price.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("no exchange rate for currency {0}")]
    UnknownCurrency(String),

    #[error("exchange rate for {0} is zero")]
    ZeroRate(String),

    /// Conversion is switched off in run configuration and the currencies differ.
    #[error("currency conversion disabled, cannot convert {from} to {to}")]
    Disabled { from: String, to: String },

    #[error("exchange rates unavailable: {0}")]
    RatesUnavailable(String),
}

/// Errors from fetching a rate table.
#[derive(Debug, Error)]
pub enum RateSourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate source returned HTTP {status}")]
    Status { status: u16 },

    /// The provider answered with a non-success result envelope.
    #[error("rate source error: {0}")]
    Api(String),

    #[error("rate table could not be decoded: {0}")]
    Decode(String),
}

/// Why a product's profitability could not be computed. Always contained at
/// the product boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("catalog record {asin} has no current price")]
    MissingMarketplacePrice { asin: String },

    #[error("catalog record {asin} has a non-positive price {price}")]
    NonPositivePrice {
        asin: String,
        price: rust_decimal::Decimal,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}
