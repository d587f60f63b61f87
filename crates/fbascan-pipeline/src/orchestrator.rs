//! The per-run state machine.
//!
//! `Idle → Preparing → Extracting → Matching → Analyzing → Aggregating → Done`,
//! or `Errored` when configuration is unusable. Only `Preparing` can fail the
//! run; every later failure is contained to one product or page and tallied.
//!
//! Extraction stops pulling pages for a category once that category's cap is
//! reached. The global cap is checked as each matched product enters
//! analysis: once it is reached no further product is admitted, while those
//! already admitted run to completion.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use fbascan_analysis::{
    confidence_score, AnalysisError, CurrencyConverter, ProfitabilityAnalyzer, RateSource,
    RateTable,
};
use fbascan_core::{
    CatalogProduct, CategoryConfig, ConfigStore, ProductKey, RunConfig, SupplierProduct,
};
use fbascan_db::{
    LinkingMap, LinkingStore, RegisterOutcome, SnapshotCache, UpgradeOutcome, SUPPLIER_NAMESPACE,
};
use fbascan_scraper::{
    FetchError, FieldExtractor, RateLimiterRegistry, RetryPolicy, RetryingFetcher, Transport,
    UnparsedItem,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::caps::{AdmissionCap, CategoryCaps};
use crate::catalog::CatalogSource;
use crate::error::PipelineError;
use crate::report::{ProductResult, RunReport, RunStage, TallyCounters};

/// A fetched listing page as kept in the supplier snapshot namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedPage {
    url: String,
    body: String,
}

#[derive(Debug, Default)]
struct Harvest {
    products: Vec<SupplierProduct>,
    unparsed: Vec<UnparsedItem>,
}

struct Matched {
    key: ProductKey,
    product: SupplierProduct,
    catalog: CatalogProduct,
}

struct StageTracker {
    run_id: Uuid,
    supplier: String,
    current: RunStage,
    history: Vec<RunStage>,
}

impl StageTracker {
    fn new(run_id: Uuid, supplier: &str) -> Self {
        Self {
            run_id,
            supplier: supplier.to_owned(),
            current: RunStage::Idle,
            history: vec![RunStage::Idle],
        }
    }

    fn advance(&mut self, next: RunStage) {
        debug_assert!(self.current.can_advance_to(next), "{} -> {next}", self.current);
        tracing::info!(
            run_id = %self.run_id,
            supplier = %self.supplier,
            from = %self.current,
            to = %next,
            "run stage"
        );
        self.current = next;
        self.history.push(next);
    }

    fn fail(&mut self, error: &PipelineError) {
        tracing::error!(
            run_id = %self.run_id,
            supplier = %self.supplier,
            stage = %self.current,
            error = %error,
            "run aborted"
        );
        self.advance(RunStage::Errored);
    }
}

pub struct PipelineOrchestrator<T, C, S, R = RateTable> {
    config: Arc<ConfigStore>,
    transport: Arc<T>,
    catalog: C,
    linking: Arc<LinkingMap<S>>,
    snapshots: SnapshotCache,
    limiters: RateLimiterRegistry,
    retry: RetryPolicy,
    analyzer: ProfitabilityAnalyzer,
    converter: Option<Arc<CurrencyConverter<R>>>,
}

impl<T, C, S, R> std::fmt::Debug for PipelineOrchestrator<T, C, S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("retry", &self.retry)
            .field("converter", &self.converter.is_some())
            .finish_non_exhaustive()
    }
}

impl<T, C, S> PipelineOrchestrator<T, C, S, RateTable> {
    /// An orchestrator with the default retry policy and no currency
    /// converter; mismatched currencies then yield unknown profitability.
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        transport: T,
        catalog: C,
        linking: Arc<LinkingMap<S>>,
        snapshots: SnapshotCache,
    ) -> Self {
        let analyzer = ProfitabilityAnalyzer::new(config.fees.clone());
        Self {
            config,
            transport: Arc::new(transport),
            catalog,
            linking,
            snapshots,
            limiters: RateLimiterRegistry::new(),
            retry: RetryPolicy::default(),
            analyzer,
            converter: None,
        }
    }
}

impl<T, C, S, R> PipelineOrchestrator<T, C, S, R> {
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_converter<R2>(
        self,
        converter: Arc<CurrencyConverter<R2>>,
    ) -> PipelineOrchestrator<T, C, S, R2> {
        PipelineOrchestrator {
            config: self.config,
            transport: self.transport,
            catalog: self.catalog,
            linking: self.linking,
            snapshots: self.snapshots,
            limiters: self.limiters,
            retry: self.retry,
            analyzer: self.analyzer,
            converter: Some(converter),
        }
    }

    #[must_use]
    pub fn linking_map(&self) -> &Arc<LinkingMap<S>> {
        &self.linking
    }
}

impl<T, C, S, R> PipelineOrchestrator<T, C, S, R>
where
    T: Transport,
    C: CatalogSource,
    S: LinkingStore,
    R: RateSource,
{
    /// Runs one supplier through every stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only for configuration problems found while
    /// preparing; no page is fetched in that case.
    pub async fn run(&self, supplier_id: &str) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut stages = StageTracker::new(run_id, supplier_id);
        let tally = TallyCounters::default();
        let run = &self.config.run;

        stages.advance(RunStage::Preparing);
        let extractor = match self.prepare(supplier_id).await {
            Ok(extractor) => extractor,
            Err(e) => {
                stages.fail(&e);
                return Err(e);
            }
        };

        stages.advance(RunStage::Extracting);
        let harvest = self.extract(&extractor, run, &tally).await;
        tracing::info!(
            run_id = %run_id,
            products = harvest.products.len(),
            unparsed = harvest.unparsed.len(),
            "extraction finished"
        );

        let mut results = Vec::new();
        if !run.bypass_specialized_parsing {
            stages.advance(RunStage::Matching);
            let matched = self.match_all(harvest.products, run, &tally).await;
            tracing::info!(run_id = %run_id, matched = matched.len(), "matching finished");

            stages.advance(RunStage::Analyzing);
            results = self.analyze_all(matched, run, &tally).await;
        }

        stages.advance(RunStage::Aggregating);
        let tally = tally.snapshot();
        tracing::info!(
            run_id = %run_id,
            results = results.len(),
            unparsed = harvest.unparsed.len(),
            skipped = tally.total(),
            "run aggregated"
        );
        stages.advance(RunStage::Done);

        Ok(RunReport {
            run_id,
            supplier_id: supplier_id.to_owned(),
            stage: stages.current,
            stage_history: stages.history,
            started_at,
            finished_at: Utc::now(),
            results,
            unparsed: harvest.unparsed,
            tally,
        })
    }

    async fn prepare(&self, supplier_id: &str) -> Result<FieldExtractor, PipelineError> {
        self.config.run.validate()?;
        let supplier = self.config.supplier(supplier_id)?;
        let extractor = FieldExtractor::new(supplier)?;
        self.snapshots
            .apply_policy(&self.config.run.cache_policy)
            .await?;
        Ok(extractor)
    }

    async fn extract(
        &self,
        extractor: &FieldExtractor,
        run: &RunConfig,
        tally: &TallyCounters,
    ) -> Harvest {
        // Checked in prepare.
        let Ok(supplier) = self.config.supplier(extractor.supplier_id()) else {
            return Harvest::default();
        };
        let fetcher = RetryingFetcher::new(
            Arc::clone(&self.transport),
            self.limiters.for_source(&supplier.id, &supplier.rate_limit),
            self.retry,
        );
        let caps = CategoryCaps::new(
            run.max_products_per_category,
            supplier.categories.iter().map(|c| c.name.as_str()),
        );

        let harvests: Vec<Harvest> = stream::iter(&supplier.categories)
            .map(|category| {
                self.extract_category(&fetcher, extractor, category, &caps, run, tally)
            })
            .buffer_unordered(run.max_in_flight.max(1))
            .collect()
            .await;

        harvests.into_iter().fold(Harvest::default(), |mut all, h| {
            all.products.extend(h.products);
            all.unparsed.extend(h.unparsed);
            all
        })
    }

    async fn extract_category(
        &self,
        fetcher: &RetryingFetcher<Arc<T>>,
        extractor: &FieldExtractor,
        category: &CategoryConfig,
        caps: &CategoryCaps,
        run: &RunConfig,
        tally: &TallyCounters,
    ) -> Harvest {
        let mut harvest = Harvest::default();
        let name = category.name.as_str();

        for url in &category.urls {
            if caps.is_full(name) {
                tracing::info!(category = name, "category cap reached");
                break;
            }
            let page = match self.fetch_page(fetcher, url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(category = name, url, error = %e, "page skipped");
                    TallyCounters::bump(&tally.fetch_failed);
                    continue;
                }
            };

            if run.bypass_specialized_parsing {
                for item in extractor.extract_unparsed(&page.body, &page.url, Some(name)) {
                    if caps.try_admit(name) {
                        harvest.unparsed.push(item);
                    } else {
                        TallyCounters::bump(&tally.category_capped);
                    }
                }
            } else {
                let extraction = extractor.extract_document(&page.body, &page.url, Some(name));
                TallyCounters::add(&tally.validation_rejected, extraction.rejected.len());
                for product in extraction.products {
                    if caps.try_admit(name) {
                        harvest.products.push(product);
                    } else {
                        TallyCounters::bump(&tally.category_capped);
                    }
                }
            }
        }

        harvest
    }

    /// Serves the page from the supplier snapshot namespace when fresh.
    async fn fetch_page(
        &self,
        fetcher: &RetryingFetcher<Arc<T>>,
        url: &str,
    ) -> Result<CachedPage, FetchError> {
        match self.snapshots.get::<CachedPage>(SUPPLIER_NAMESPACE, url).await {
            Ok(Some(snapshot)) => {
                tracing::debug!(url, "listing page served from snapshot");
                return Ok(snapshot.data);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(url, error = %e, "supplier snapshot lookup failed"),
        }

        let page = fetcher.fetch(url).await?;
        let cached = CachedPage {
            url: page.url,
            body: page.body,
        };
        if let Err(e) = self.snapshots.put(SUPPLIER_NAMESPACE, url, &cached).await {
            tracing::warn!(url, error = %e, "failed to cache listing page");
        }
        Ok(cached)
    }

    async fn match_all(
        &self,
        products: Vec<SupplierProduct>,
        run: &RunConfig,
        tally: &TallyCounters,
    ) -> Vec<Matched> {
        let mut seen = HashSet::new();
        let mut keyed = Vec::with_capacity(products.len());
        for product in products {
            let Some(key) = ProductKey::derive(&product) else {
                tracing::warn!(title = %product.title, "product has neither EAN nor URL");
                TallyCounters::bump(&tally.unmatched);
                continue;
            };
            if seen.insert(key.clone()) {
                keyed.push((key, product));
            } else {
                TallyCounters::bump(&tally.duplicates);
            }
        }

        stream::iter(keyed)
            .map(|(key, product)| self.match_product(key, product, run, tally))
            .buffer_unordered(run.max_in_flight.max(1))
            .filter_map(std::future::ready)
            .collect()
            .await
    }

    async fn match_product(
        &self,
        key: ProductKey,
        product: SupplierProduct,
        run: &RunConfig,
        tally: &TallyCounters,
    ) -> Option<Matched> {
        if let Some(linked) = self.linking.resolve(&key) {
            if run.rematch_existing {
                if let Some(catalog) = self.try_upgrade(&key, &product, &linked, tally).await {
                    return Some(Matched {
                        key,
                        product,
                        catalog,
                    });
                }
            }
            let catalog = self.load_linked(&key, &linked, tally).await?;
            return Some(Matched {
                key,
                product,
                catalog,
            });
        }

        let candidate = match self.catalog.find_match(&product).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                tracing::debug!(key = %key, "no catalog match");
                TallyCounters::bump(&tally.unmatched);
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "catalog lookup failed");
                TallyCounters::bump(&tally.catalog_failed);
                return None;
            }
        };

        let confidence = confidence_score(&candidate);
        match self
            .linking
            .register(&key, &candidate.asin, Some(confidence))
            .await
        {
            Ok(RegisterOutcome::Registered) => Some(Matched {
                key,
                product,
                catalog: candidate,
            }),
            Ok(RegisterOutcome::AlreadyLinked {
                chosen_catalog_identifier,
            }) => {
                let catalog = if chosen_catalog_identifier == candidate.asin {
                    candidate
                } else {
                    self.load_linked(&key, &chosen_catalog_identifier, tally)
                        .await?
                };
                Some(Matched {
                    key,
                    product,
                    catalog,
                })
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "linking map write failed");
                TallyCounters::bump(&tally.persistence_failed);
                None
            }
        }
    }

    async fn load_linked(
        &self,
        key: &ProductKey,
        catalog_id: &str,
        tally: &TallyCounters,
    ) -> Option<CatalogProduct> {
        match self.catalog.by_identifier(catalog_id).await {
            Ok(Some(catalog)) => Some(catalog),
            Ok(None) => {
                tracing::warn!(key = %key, catalog_id, "linked catalog record not found");
                TallyCounters::bump(&tally.unmatched);
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, catalog_id, error = %e, "catalog lookup failed");
                TallyCounters::bump(&tally.catalog_failed);
                None
            }
        }
    }

    /// Re-queries the catalog for an already linked product and upgrades the
    /// link when the new candidate differs and scores strictly higher.
    async fn try_upgrade(
        &self,
        key: &ProductKey,
        product: &SupplierProduct,
        linked: &str,
        tally: &TallyCounters,
    ) -> Option<CatalogProduct> {
        let candidate = match self.catalog.find_match(product).await {
            Ok(Some(candidate)) if candidate.asin != linked => candidate,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "rematch lookup failed");
                return None;
            }
        };

        let confidence = confidence_score(&candidate);
        match self.linking.upgrade(key, &candidate.asin, confidence).await {
            Ok(UpgradeOutcome::Upgraded { .. }) => Some(candidate),
            Ok(UpgradeOutcome::NotBetter | UpgradeOutcome::Missing) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "linking map upgrade failed");
                TallyCounters::bump(&tally.persistence_failed);
                None
            }
        }
    }

    async fn analyze_all(
        &self,
        matched: Vec<Matched>,
        run: &RunConfig,
        tally: &TallyCounters,
    ) -> Vec<ProductResult> {
        let cap = AdmissionCap::new(run.max_analyzed_products);
        stream::iter(matched)
            .map(|item| {
                let cap = &cap;
                async move {
                    if !cap.try_admit() {
                        TallyCounters::bump(&tally.not_admitted);
                        return None;
                    }
                    Some(self.analyze_product(item, run, tally).await)
                }
            })
            .buffer_unordered(run.max_in_flight.max(1))
            .filter_map(std::future::ready)
            .collect()
            .await
    }

    async fn analyze_product(
        &self,
        item: Matched,
        run: &RunConfig,
        tally: &TallyCounters,
    ) -> ProductResult {
        let Matched {
            key,
            product,
            catalog,
        } = item;

        let rates = if run.enable_currency_conversion
            && self.analyzer.needs_conversion(&product, &catalog)
        {
            match &self.converter {
                Some(converter) => match converter.table().await {
                    Ok(table) => Some(table),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "profitability unknown");
                        TallyCounters::bump(&tally.conversion_failed);
                        return ProductResult {
                            key,
                            product,
                            catalog,
                            analysis: None,
                        };
                    }
                },
                None => None,
            }
        } else {
            None
        };

        let analysis = match self.analyzer.analyze(&product, &catalog, rates.as_deref()) {
            Ok(analysis) => Some(analysis),
            Err(AnalysisError::Conversion(e)) => {
                tracing::warn!(key = %key, error = %e, "profitability unknown");
                TallyCounters::bump(&tally.conversion_failed);
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "profitability unknown");
                TallyCounters::bump(&tally.analysis_failed);
                None
            }
        };

        ProductResult {
            key,
            product,
            catalog,
            analysis,
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
