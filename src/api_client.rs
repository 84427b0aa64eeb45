//! Brickset API v3 `getSets` adapter.

use std::time::Duration;

use serde_json::json;

use crate::catalog::CatalogItem;
use crate::collector::CollectError;
use crate::config::{ApiConfig, FetchConfig, PLACEHOLDER_API_KEY};

const ORDER_BY: &str = "Number";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One page of `getSets` results.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPage {
    /// API status field; `"success"` when the request was served.
    pub status: String,
    pub message: Option<String>,
    pub items: Vec<CatalogItem>,
}

/// Source of catalog pages, one category and page at a time.
pub trait CatalogApi {
    fn get_page(
        &mut self,
        category: &str,
        page: u32,
        page_size: u32,
    ) -> Result<CatalogPage, CollectError>;
}

#[derive(Debug, serde::Deserialize)]
struct GetSetsResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sets: Option<Vec<CatalogItem>>,
}

/// `CatalogApi` backed by `ureq` form posts to the Brickset web service.
pub struct BricksetApi {
    http_client: ureq::Agent,
    base_url: String,
    api_key: String,
    user_hash: String,
    user_agent: String,
}

impl BricksetApi {
    /// Fails when the API key is blank or still the placeholder.
    pub fn new(api: &ApiConfig, fetch: &FetchConfig) -> Result<Self, CollectError> {
        let api_key = validate_api_key(&api.api_key)?.to_string();
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(api.timeout_secs))
            .build();
        Ok(Self {
            http_client,
            base_url: api.base_url.trim().trim_end_matches('/').to_string(),
            api_key,
            user_hash: api.user_hash.clone(),
            user_agent: fetch.user_agent.clone(),
        })
    }

    fn request_params(category: &str, page: u32, page_size: u32) -> String {
        json!({
            "theme": category,
            "pageSize": page_size,
            "pageNumber": page,
            "orderBy": ORDER_BY,
            "extendedData": 0,
        })
        .to_string()
    }
}

impl CatalogApi for BricksetApi {
    fn get_page(
        &mut self,
        category: &str,
        page: u32,
        page_size: u32,
    ) -> Result<CatalogPage, CollectError> {
        let url = format!("{}/getSets", self.base_url);
        let params = Self::request_params(category, page, page_size);
        let response = self
            .http_client
            .post(&url)
            .set("User-Agent", &self.user_agent)
            .send_form(&[
                ("apiKey", self.api_key.as_str()),
                ("userHash", self.user_hash.as_str()),
                ("params", params.as_str()),
            ])
            .map_err(|error| match error {
                ureq::Error::Status(status, _) => CollectError::HttpStatus {
                    category: category.to_string(),
                    page,
                    status,
                },
                ureq::Error::Transport(transport) => CollectError::Transport {
                    category: category.to_string(),
                    page,
                    message: transport.to_string(),
                },
            })?;
        let parsed: GetSetsResponse =
            response
                .into_json()
                .map_err(|error| CollectError::Decode {
                    category: category.to_string(),
                    page,
                    message: error.to_string(),
                })?;
        Ok(CatalogPage {
            status: parsed.status,
            message: parsed.message,
            items: parsed.sets.unwrap_or_default(),
        })
    }
}

pub fn validate_api_key(api_key: &str) -> Result<&str, CollectError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(CollectError::MissingApiKey);
    }
    if api_key == PLACEHOLDER_API_KEY {
        return Err(CollectError::PlaceholderApiKey);
    }
    Ok(api_key)
}
