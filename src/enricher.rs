//! Enrichment: attach the minifigures of every collected set, resolving each set
//! page at most once across runs through the detail cache.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, error, info};

use crate::catalog::{CatalogItem, EnrichedItem, SubItem};
use crate::config::{Config, EnricherConfig, FailedItemPolicy};
use crate::detail_cache::DetailCache;
use crate::extractor::SubItemExtractor;
use crate::fetch::{FetchError, HttpTransport, PageFetcher, RetryPolicy, UreqTransport};
use crate::json_store::{self, StoreError};
use crate::pacing::{Jitter, JitterRange, RandomJitter, Sleeper, ThreadSleeper};

const PAUSE_JITTER: JitterRange = JitterRange::new(0.1, 0.6);

/// Resolves a set page URL to the minifigures listed on it.
pub trait DetailSource {
    fn sub_items(&mut self, url: &str) -> Result<Vec<SubItem>, FetchError>;
}

/// Live `DetailSource`: fetch with retries, then scrape the page.
pub struct DetailPages<T, S, J> {
    fetcher: PageFetcher<T, S, J>,
    extractor: SubItemExtractor,
}

impl<T: HttpTransport, S: Sleeper, J: Jitter> DetailPages<T, S, J> {
    pub fn new(fetcher: PageFetcher<T, S, J>, extractor: SubItemExtractor) -> Self {
        Self { fetcher, extractor }
    }
}

impl<T: HttpTransport, S: Sleeper, J: Jitter> DetailSource for DetailPages<T, S, J> {
    fn sub_items(&mut self, url: &str) -> Result<Vec<SubItem>, FetchError> {
        let html = self.fetcher.fetch(url)?;
        Ok(self.extractor.extract(&html))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichOptions {
    /// Pause before every network fetch after the first, before jitter.
    pub base_delay: Duration,
    pub progress_every: usize,
    pub failed_items: FailedItemPolicy,
}

impl EnrichOptions {
    pub fn from_config(config: &EnricherConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            progress_every: config.progress_every.max(1),
            failed_items: config.failed_items,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub emitted: usize,
    pub skipped: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub failed: usize,
    pub progress_reports: usize,
}

pub struct Enricher<D, S, J> {
    source: D,
    cache: DetailCache,
    series_renames: BTreeMap<String, String>,
    options: EnrichOptions,
    sleeper: S,
    jitter: J,
    fetched_before: bool,
}

impl<D: DetailSource, S: Sleeper, J: Jitter> Enricher<D, S, J> {
    pub fn new(
        source: D,
        cache: DetailCache,
        series_renames: BTreeMap<String, String>,
        options: EnrichOptions,
        sleeper: S,
        jitter: J,
    ) -> Self {
        Self {
            source,
            cache,
            series_renames,
            options,
            sleeper,
            jitter,
            fetched_before: false,
        }
    }

    /// Enriches `items` in order. Sets without a number are left out.
    ///
    /// Only cache or output I/O failures abort; a set whose page cannot be
    /// fetched is emitted with no minifigures.
    pub fn enrich(
        &mut self,
        items: &[CatalogItem],
    ) -> Result<(Vec<EnrichedItem>, EnrichSummary), StoreError> {
        let total = items.len();
        let mut enriched = Vec::with_capacity(total);
        let mut summary = EnrichSummary::default();

        for (index, item) in items.iter().enumerate() {
            let position = index + 1;

            if let Some(key) = item.normalized_key() {
                let minifigs = match self.cache.get(&key) {
                    Some(cached) => {
                        summary.cache_hits += 1;
                        cached.to_vec()
                    }
                    None => {
                        let url = item.detail_url.trim();
                        let resolved = if url.is_empty() {
                            debug!("[{}/{}] {} has no set page", position, total, key);
                            Ok(Vec::new())
                        } else {
                            summary.fetched += 1;
                            self.fetch_sub_items(url)
                        };
                        let (minifigs, failed) = match resolved {
                            Ok(minifigs) => (minifigs, false),
                            Err(err) => {
                                error!("[{}/{}] {} ERROR: {}", position, total, key, err);
                                summary.failed += 1;
                                (Vec::new(), true)
                            }
                        };
                        if !failed || self.options.failed_items == FailedItemPolicy::CacheEmpty {
                            self.cache.insert(&key, minifigs.clone());
                            self.cache.persist()?;
                        }
                        minifigs
                    }
                };
                enriched.push(EnrichedItem::from_catalog(
                    key,
                    item,
                    &self.series_renames,
                    minifigs,
                ));
            } else {
                debug!("[{}/{}] skipping set without a number", position, total);
                summary.skipped += 1;
                continue;
            }

            // Skipped sets never report, even on an interval position.
            if position % self.options.progress_every == 0 {
                info!("Progress: {}/{}", position, total);
                summary.progress_reports += 1;
            }
        }

        summary.emitted = enriched.len();
        Ok((enriched, summary))
    }

    fn fetch_sub_items(&mut self, url: &str) -> Result<Vec<SubItem>, FetchError> {
        if self.fetched_before {
            let pause = self.options.base_delay + self.jitter.sample(PAUSE_JITTER);
            self.sleeper.sleep(pause);
        }
        self.fetched_before = true;
        self.source.sub_items(url)
    }
}

/// `figvault enrich`: read the catalog, enrich it through the cache and write the result.
pub fn run(
    config: &Config,
    input_path: &Path,
    cache_path: &Path,
    output_path: &Path,
) -> Result<usize, StoreError> {
    let items: Vec<CatalogItem> = json_store::read_json(input_path)?;
    let cache = DetailCache::load(cache_path);
    info!(
        "Loaded {} sets from {} ({} cached in {})",
        items.len(),
        input_path.display(),
        cache.len(),
        cache.path().display()
    );

    let fetcher = PageFetcher::new(
        UreqTransport::new(&config.fetch),
        RetryPolicy::from_config(&config.fetch),
        ThreadSleeper,
        RandomJitter::new(),
    );
    let source = DetailPages::new(
        fetcher,
        SubItemExtractor::new(&config.enricher.site_base_url),
    );
    let mut enricher = Enricher::new(
        source,
        cache,
        config.series.clone(),
        EnrichOptions::from_config(&config.enricher),
        ThreadSleeper,
        RandomJitter::new(),
    );

    let (enriched, summary) = enricher.enrich(&items)?;
    json_store::write_json_atomic(output_path, &enriched)?;
    debug!(
        "Enricher: {} emitted, {} cache hits, {} fetched, {} failed, {} skipped, {} progress lines",
        summary.emitted,
        summary.cache_hits,
        summary.fetched,
        summary.failed,
        summary.skipped,
        summary.progress_reports
    );
    info!(
        "Done. Wrote {} sets to {}",
        enriched.len(),
        output_path.display()
    );
    Ok(enriched.len())
}
