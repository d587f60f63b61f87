//! Profitability numerics: the fee model, the confidence score, the
//! per-product analyzer and currency conversion.

pub mod confidence;
pub mod currency;
pub mod error;
pub mod fees;
pub mod profitability;

pub use confidence::confidence_score;
pub use currency::{CurrencyConverter, HttpRateSource, RateSource, RateTable};
pub use error::{AnalysisError, ConversionError, RateSourceError};
pub use fees::{fee_model, FeeBreakdown};
pub use profitability::ProfitabilityAnalyzer;
