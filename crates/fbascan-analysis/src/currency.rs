//! Currency conversion against a cached rate table.
//!
//! Rates are quoted against one base currency; converting multiplies by
//! `rate[to] / rate[from]`. The table is fetched from a [`RateSource`] on
//! first use and refreshed once it is older than the configured interval.

use std::collections::BTreeMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{ConversionError, RateSourceError};

/// Exchange rates relative to `base`. The base itself is implicitly 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub base: String,
    pub rates: BTreeMap<String, Decimal>,
    pub fetched_at: DateTime<Utc>,
}

impl RateTable {
    #[must_use]
    pub fn new(base: &str, rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            base: base.trim().to_uppercase(),
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.trim().to_uppercase(), rate))
                .collect(),
            fetched_at: Utc::now(),
        }
    }

    /// Units of `currency` per one unit of the base currency.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::UnknownCurrency`] when the table has no rate.
    pub fn rate(&self, currency: &str) -> Result<Decimal, ConversionError> {
        let code = currency.trim().to_uppercase();
        if code == self.base {
            return Ok(self.rates.get(&code).copied().unwrap_or(Decimal::ONE));
        }
        self.rates
            .get(&code)
            .copied()
            .ok_or(ConversionError::UnknownCurrency(code))
    }

    /// Converts `amount` from one currency to another. Unrounded.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when either currency is missing from the
    /// table or `from` has a zero rate.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, ConversionError> {
        if same_currency(from, to) {
            return Ok(amount);
        }
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to)?;
        if from_rate.is_zero() {
            return Err(ConversionError::ZeroRate(from.trim().to_uppercase()));
        }
        Ok(amount * to_rate / from_rate)
    }
}

pub(crate) fn same_currency(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Where rate tables come from.
pub trait RateSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<RateTable, RateSourceError>> + Send;
}

/// A fixed table is its own source; used for offline runs and tests.
impl RateSource for RateTable {
    async fn fetch(&self) -> Result<RateTable, RateSourceError> {
        Ok(self.clone())
    }
}

/// Fetches rates from a JSON endpoint shaped like
/// `{"result":"success","base_code":"USD","rates":{"GBP":0.79,...}}`.
/// A plain `{"base":"USD","rates":{...}}` body is accepted too.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default, rename = "error-type")]
    error_type: Option<String>,
    #[serde(alias = "base_code")]
    base: Option<String>,
    #[serde(default)]
    rates: BTreeMap<String, f64>,
    #[serde(default)]
    time_last_update_unix: Option<i64>,
}

impl HttpRateSource {
    /// # Errors
    ///
    /// Returns [`RateSourceError::Http`] if the `reqwest::Client` cannot be
    /// constructed.
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, RateSourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.to_owned(),
        })
    }
}

impl RateSource for HttpRateSource {
    async fn fetch(&self) -> Result<RateTable, RateSourceError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RateSourceError::Status {
                status: status.as_u16(),
            });
        }
        let body: RatesResponse = response
            .json()
            .await
            .map_err(|e| RateSourceError::Decode(e.to_string()))?;

        if let Some(result) = body.result.as_deref() {
            if result != "success" {
                return Err(RateSourceError::Api(
                    body.error_type.unwrap_or_else(|| result.to_owned()),
                ));
            }
        }
        let base = body
            .base
            .ok_or_else(|| RateSourceError::Decode("response has no base currency".to_owned()))?;
        if body.rates.is_empty() {
            return Err(RateSourceError::Decode("response has no rates".to_owned()));
        }

        // Go through the shortest decimal rendering so 0.8 stays exactly 0.8.
        let mut rates = BTreeMap::new();
        for (code, rate) in body.rates {
            let rate = Decimal::from_str(&rate.to_string())
                .map_err(|e| RateSourceError::Decode(format!("rate for {code}: {e}")))?;
            rates.insert(code, rate);
        }

        let mut table = RateTable::new(&base, rates);
        if let Some(ts) = body
            .time_last_update_unix
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        {
            table.fetched_at = ts;
        }
        tracing::debug!(base = %table.base, currencies = table.rates.len(), "exchange rates fetched");
        Ok(table)
    }
}

struct CachedTable {
    table: Arc<RateTable>,
    loaded_at: Instant,
}

/// Process-wide converter with a lazily fetched, periodically refreshed
/// rate table.
pub struct CurrencyConverter<R> {
    source: R,
    refresh_interval: Duration,
    cache: Mutex<Option<CachedTable>>,
}

impl<R> std::fmt::Debug for CurrencyConverter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrencyConverter")
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

impl<R: RateSource> CurrencyConverter<R> {
    #[must_use]
    pub fn new(source: R, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            cache: Mutex::new(None),
        }
    }

    /// The current rate table, fetching it when absent or older than the
    /// refresh interval. A failed refresh falls back to the stale table.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::RatesUnavailable`] when no table has ever
    /// been fetched and the source fails.
    pub async fn table(&self) -> Result<Arc<RateTable>, ConversionError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.loaded_at.elapsed() < self.refresh_interval {
                return Ok(Arc::clone(&cached.table));
            }
        }

        match self.source.fetch().await {
            Ok(table) => {
                let table = Arc::new(table);
                *cache = Some(CachedTable {
                    table: Arc::clone(&table),
                    loaded_at: Instant::now(),
                });
                Ok(table)
            }
            Err(e) => match cache.as_ref() {
                Some(stale) => {
                    tracing::warn!(error = %e, "exchange rate refresh failed, using stale table");
                    Ok(Arc::clone(&stale.table))
                }
                None => Err(ConversionError::RatesUnavailable(e.to_string())),
            },
        }
    }

    /// Converts `amount`; same-currency conversions never touch the source.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when rates are unavailable or either
    /// currency is unknown.
    pub async fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
    ) -> Result<Decimal, ConversionError> {
        if same_currency(from, to) {
            return Ok(amount);
        }
        self.table().await?.convert(amount, from, to)
    }

    /// Drops the cached table so the next call fetches afresh.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }
}
