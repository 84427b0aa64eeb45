//! Detail page fetching with rate-limit-aware retries.

pub mod page_fetcher;
pub mod retry_policy;
pub mod transport;

use std::time::Duration;

use thiserror::Error;

pub use page_fetcher::PageFetcher;
pub use retry_policy::RetryPolicy;
pub use transport::{HttpTransport, UreqTransport};

/// Failure of one page fetch. The fetcher surfaces the last attempt's error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("rate limited (HTTP 429) fetching {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },
    #[error("request for {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("failed to fetch {url}")]
    Exhausted { url: String },
}
