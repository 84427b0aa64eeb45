//! Catalog collection: page through every configured theme and write one
//! deduplicated set list.
//!
//! Any failure aborts the run before anything is written.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;

use crate::api_client::{BricksetApi, CatalogApi};
use crate::catalog::CatalogItem;
use crate::config::{CollectorConfig, Config};
use crate::json_store::{self, StoreError};
use crate::pacing::{Sleeper, ThreadSleeper};

const API_SUCCESS_STATUS: &str = "success";

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no API key configured; set api.api_key in the config or BRICKSET_API_KEY")]
    MissingApiKey,
    #[error("the API key is still the placeholder value; set your Brickset key first")]
    PlaceholderApiKey,
    #[error("[{category}] page {page}: request failed: {message}")]
    Transport {
        category: String,
        page: u32,
        message: String,
    },
    #[error("[{category}] page {page}: HTTP {status}")]
    HttpStatus {
        category: String,
        page: u32,
        status: u16,
    },
    #[error("[{category}] page {page}: invalid response: {message}")]
    Decode {
        category: String,
        page: u32,
        message: String,
    },
    #[error("[{category}] page {page}: API status '{status}': {message}")]
    ApiStatus {
        category: String,
        page: u32,
        status: String,
        message: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct CatalogCollector<A, S> {
    api: A,
    sleeper: S,
    page_size: u32,
    page_delay: Duration,
}

impl<A: CatalogApi, S: Sleeper> CatalogCollector<A, S> {
    pub fn new(api: A, sleeper: S, config: &CollectorConfig) -> Self {
        Self {
            api,
            sleeper,
            page_size: config.page_size.max(1),
            page_delay: Duration::from_millis(config.page_delay_ms),
        }
    }

    /// Fetches pages of one category until a short page signals the end.
    pub fn collect_category(&mut self, category: &str) -> Result<Vec<CatalogItem>, CollectError> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let batch = self.api.get_page(category, page, self.page_size)?;
            if batch.status != API_SUCCESS_STATUS {
                return Err(CollectError::ApiStatus {
                    category: category.to_string(),
                    page,
                    status: batch.status,
                    message: batch.message.unwrap_or_default(),
                });
            }

            let count = batch.items.len();
            items.extend(batch.items);
            info!(
                "[{}] page {}: +{} (total {})",
                category,
                page,
                count,
                items.len()
            );

            if count < self.page_size as usize {
                break;
            }
            page += 1;
            self.sleeper.sleep(self.page_delay);
        }

        Ok(items)
    }

    /// Collects every category in order, then deduplicates by set id.
    pub fn collect(&mut self, categories: &[String]) -> Result<Vec<CatalogItem>, CollectError> {
        let mut collected = Vec::new();
        for category in categories {
            collected.extend(self.collect_category(category)?);
        }
        Ok(dedup_by_set_id(collected))
    }
}

/// Later duplicates overwrite earlier ones in place; items without an id are dropped.
pub fn dedup_by_set_id(items: Vec<CatalogItem>) -> Vec<CatalogItem> {
    let mut unique: Vec<CatalogItem> = Vec::with_capacity(items.len());
    let mut positions: HashMap<u64, usize> = HashMap::new();

    for item in items {
        let Some(set_id) = item.set_id else {
            debug!("Collector: dropping set without setID: {:?}", item.number);
            continue;
        };
        match positions.get(&set_id) {
            Some(&index) => unique[index] = item,
            None => {
                positions.insert(set_id, unique.len());
                unique.push(item);
            }
        }
    }

    unique
}

/// `figvault collect`: fetch all configured themes and write the catalog file.
pub fn run(config: &Config, output_path: &Path) -> Result<usize, CollectError> {
    let api = BricksetApi::new(&config.api, &config.fetch)?;
    let mut collector = CatalogCollector::new(api, ThreadSleeper, &config.collector);
    let items = collector.collect(&config.collector.categories)?;
    json_store::write_json_atomic(output_path, &items)?;
    info!(
        "Done. Saved {} sets to {}",
        items.len(),
        output_path.display()
    );
    Ok(items.len())
}
