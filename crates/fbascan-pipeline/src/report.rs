//! What a run hands back: stage reached, results, unparsed items and a tally
//! of everything that was skipped.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use fbascan_core::{AnalysisResult, CatalogProduct, ProductKey, ReportRow, SupplierProduct};
use fbascan_scraper::UnparsedItem;
use serde::Serialize;
use uuid::Uuid;

/// Stages of one run, in order. `Errored` is reachable from any stage
/// before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Preparing,
    Extracting,
    Matching,
    Analyzing,
    Aggregating,
    Done,
    Errored,
}

impl RunStage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStage::Done | RunStage::Errored)
    }

    /// Stages only move forward. Bypass runs skip from `Extracting`
    /// straight to `Aggregating`.
    #[must_use]
    pub fn can_advance_to(self, next: RunStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == RunStage::Errored || next > self
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::Idle => "idle",
            RunStage::Preparing => "preparing",
            RunStage::Extracting => "extracting",
            RunStage::Matching => "matching",
            RunStage::Analyzing => "analyzing",
            RunStage::Aggregating => "aggregating",
            RunStage::Done => "done",
            RunStage::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Per-run counts of contained failures and skipped items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorTally {
    /// Listing pages whose fetch failed after retries.
    pub fetch_failed: usize,
    /// Records dropped for a missing or malformed required field.
    pub validation_rejected: usize,
    /// Products with no identity or no catalog match.
    pub unmatched: usize,
    /// Catalog lookups that failed outright.
    pub catalog_failed: usize,
    /// Products analyzed without a usable exchange rate.
    pub conversion_failed: usize,
    /// Products whose catalog record could not be priced.
    pub analysis_failed: usize,
    /// Matched products turned away by the global analysis cap.
    pub not_admitted: usize,
    /// Items skipped because their category was full.
    pub category_capped: usize,
    /// Linking-map writes that failed.
    pub persistence_failed: usize,
    /// Repeat listings of a product already seen this run.
    pub duplicates: usize,
}

impl ErrorTally {
    #[must_use]
    pub fn total(&self) -> usize {
        self.fetch_failed
            + self.validation_rejected
            + self.unmatched
            + self.catalog_failed
            + self.conversion_failed
            + self.analysis_failed
            + self.not_admitted
            + self.category_capped
            + self.persistence_failed
            + self.duplicates
    }
}

#[derive(Debug, Default)]
pub(crate) struct TallyCounters {
    pub fetch_failed: AtomicUsize,
    pub validation_rejected: AtomicUsize,
    pub unmatched: AtomicUsize,
    pub catalog_failed: AtomicUsize,
    pub conversion_failed: AtomicUsize,
    pub analysis_failed: AtomicUsize,
    pub not_admitted: AtomicUsize,
    pub category_capped: AtomicUsize,
    pub persistence_failed: AtomicUsize,
    pub duplicates: AtomicUsize,
}

impl TallyCounters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ErrorTally {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        ErrorTally {
            fetch_failed: get(&self.fetch_failed),
            validation_rejected: get(&self.validation_rejected),
            unmatched: get(&self.unmatched),
            catalog_failed: get(&self.catalog_failed),
            conversion_failed: get(&self.conversion_failed),
            analysis_failed: get(&self.analysis_failed),
            not_admitted: get(&self.not_admitted),
            category_capped: get(&self.category_capped),
            persistence_failed: get(&self.persistence_failed),
            duplicates: get(&self.duplicates),
        }
    }
}

/// One matched product that went through analysis. `analysis` is `None`
/// when profitability is unknown.
#[derive(Debug, Clone, Serialize)]
pub struct ProductResult {
    pub key: ProductKey,
    pub product: SupplierProduct,
    pub catalog: CatalogProduct,
    pub analysis: Option<AnalysisResult>,
}

impl ProductResult {
    #[must_use]
    pub fn row(&self) -> ReportRow {
        ReportRow::new(&self.key, &self.product, &self.catalog, self.analysis.as_ref())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub supplier_id: String,
    /// Final stage; `Done` for any report that was returned.
    pub stage: RunStage,
    pub stage_history: Vec<RunStage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Completion order.
    pub results: Vec<ProductResult>,
    /// Raw item nodes, only populated in bypass mode.
    pub unparsed: Vec<UnparsedItem>,
    pub tally: ErrorTally,
}

impl RunReport {
    #[must_use]
    pub fn rows(&self) -> Vec<ReportRow> {
        self.results.iter().map(ProductResult::row).collect()
    }

    /// Results with a computed profitability.
    #[must_use]
    pub fn analyzed(&self) -> usize {
        self.results.iter().filter(|r| r.analysis.is_some()).count()
    }
}
