//! Retry loop around `HttpTransport`.
//!
//! Calls are strictly sequential: one URL, one attempt at a time. The fetcher is
//! what keeps the enricher polite towards the remote site.

use log::warn;

use super::retry_policy::{parse_retry_after, FailureClass, RetryPolicy};
use super::{FetchError, HttpTransport};
use crate::pacing::{Jitter, Sleeper};

pub struct PageFetcher<T, S, J> {
    transport: T,
    policy: RetryPolicy,
    sleeper: S,
    jitter: J,
}

impl<T: HttpTransport, S: Sleeper, J: Jitter> PageFetcher<T, S, J> {
    pub fn new(transport: T, policy: RetryPolicy, sleeper: S, jitter: J) -> Self {
        Self {
            transport,
            policy,
            sleeper,
            jitter,
        }
    }

    /// Returns the page body, retrying 429s and transport failures with backoff.
    pub fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        let max_attempts = self.policy.max_attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let (error, class) = match self.transport.get(url) {
                Ok(reply) if reply.is_success() => return Ok(reply.body),
                Ok(reply) if reply.status == 429 => {
                    let retry_after = reply.retry_after.as_deref().and_then(parse_retry_after);
                    (
                        FetchError::RateLimited {
                            url: url.to_string(),
                            retry_after,
                        },
                        FailureClass::RateLimited { retry_after },
                    )
                }
                Ok(reply) => (
                    FetchError::Status {
                        url: url.to_string(),
                        status: reply.status,
                    },
                    FailureClass::Transport,
                ),
                Err(message) => (
                    FetchError::Transport {
                        url: url.to_string(),
                        message,
                    },
                    FailureClass::Transport,
                ),
            };

            if attempt < max_attempts {
                let wait = self.policy.backoff(class, attempt).resolve(&mut self.jitter);
                match class {
                    FailureClass::RateLimited { .. } => warn!(
                        "429 for {} - waiting {:.1}s (attempt {}/{})",
                        url,
                        wait.as_secs_f64(),
                        attempt,
                        max_attempts
                    ),
                    FailureClass::Transport => warn!(
                        "Request error for {}: {} - waiting {:.1}s (attempt {}/{})",
                        url,
                        error,
                        wait.as_secs_f64(),
                        attempt,
                        max_attempts
                    ),
                }
                self.sleeper.sleep(wait);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| FetchError::Exhausted {
            url: url.to_string(),
        }))
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;

    use crate::fetch::transport::HttpReply;
    use crate::fetch::HttpTransport;

    /// Replays a fixed sequence of replies and counts requests.
    pub struct ScriptedTransport {
        replies: VecDeque<Result<HttpReply, String>>,
        pub requests: Vec<String>,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<Result<HttpReply, String>>) -> Self {
            Self {
                replies: replies.into(),
                requests: Vec::new(),
            }
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&mut self, url: &str) -> Result<HttpReply, String> {
            self.requests.push(url.to_string());
            self.replies
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".to_string()))
        }
    }

    pub fn ok(body: &str) -> Result<HttpReply, String> {
        Ok(HttpReply {
            status: 200,
            retry_after: None,
            body: body.to_string(),
        })
    }

    pub fn status(status: u16, retry_after: Option<&str>) -> Result<HttpReply, String> {
        Ok(HttpReply {
            status,
            retry_after: retry_after.map(str::to_string),
            body: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::{ok, status, ScriptedTransport};
    use super::PageFetcher;
    use crate::fetch::{FetchError, RetryPolicy};
    use crate::pacing::testing::{LowJitter, RecordingSleeper};

    const URL: &str = "https://brickset.com/sets/76218-1";

    fn fetcher(
        replies: Vec<Result<crate::fetch::transport::HttpReply, String>>,
    ) -> PageFetcher<ScriptedTransport, RecordingSleeper, LowJitter> {
        PageFetcher::new(
            ScriptedTransport::new(replies),
            RetryPolicy::default(),
            RecordingSleeper::default(),
            LowJitter,
        )
    }

    #[test]
    fn test_rate_limited_responses_then_success_returns_body() {
        let mut fetcher = fetcher(vec![
            status(429, None),
            status(429, None),
            status(429, None),
            ok("<html>figs</html>"),
        ]);

        let body = fetcher.fetch(URL).expect("fetch should eventually succeed");

        assert_eq!(body, "<html>figs</html>");
        assert_eq!(fetcher.transport.requests.len(), 4);
        let slept: Vec<Duration> = fetcher.sleeper.slept.clone();
        assert_eq!(
            slept,
            vec![
                Duration::from_secs(16) + Duration::from_secs_f64(0.5),
                Duration::from_secs(32) + Duration::from_secs_f64(0.5),
                Duration::from_secs(64) + Duration::from_secs_f64(0.5),
            ]
        );
    }

    #[test]
    fn test_server_retry_after_is_waited_exactly_before_next_attempt() {
        let mut fetcher = fetcher(vec![status(429, Some("42")), ok("done")]);

        assert_eq!(fetcher.fetch(URL), Ok("done".to_string()));
        assert_eq!(fetcher.sleeper.slept, vec![Duration::from_secs(42)]);
    }

    #[test]
    fn test_persistent_rate_limiting_stops_at_attempt_ceiling() {
        let mut fetcher = fetcher(vec![status(429, Some("1")); 10]);

        let error = fetcher.fetch(URL).expect_err("fetch should give up");

        assert_eq!(fetcher.transport.requests.len(), 6);
        assert_eq!(fetcher.sleeper.slept.len(), 5);
        assert_eq!(
            error,
            FetchError::RateLimited {
                url: URL.to_string(),
                retry_after: Some(Duration::from_secs(1)),
            }
        );
    }

    #[test]
    fn test_transport_failures_back_off_linearly_and_surface_last_error() {
        let mut fetcher = PageFetcher::new(
            ScriptedTransport::new(vec![
                Err("connection reset".to_string()),
                status(503, None),
                Err("timed out".to_string()),
            ]),
            RetryPolicy::default().with_max_attempts(3),
            RecordingSleeper::default(),
            LowJitter,
        );

        let error = fetcher.fetch(URL).expect_err("fetch should give up");

        assert_eq!(
            error,
            FetchError::Transport {
                url: URL.to_string(),
                message: "timed out".to_string(),
            }
        );
        assert_eq!(
            fetcher.sleeper.slept,
            vec![
                Duration::from_secs(3) + Duration::from_secs_f64(0.3),
                Duration::from_secs(6) + Duration::from_secs_f64(0.3),
            ]
        );
    }

    #[test]
    fn test_unexpected_status_is_retried_and_reported() {
        let mut fetcher = PageFetcher::new(
            ScriptedTransport::new(vec![status(404, None), status(404, None)]),
            RetryPolicy::default().with_max_attempts(2),
            RecordingSleeper::default(),
            LowJitter,
        );

        assert_eq!(
            fetcher.fetch(URL),
            Err(FetchError::Status {
                url: URL.to_string(),
                status: 404,
            })
        );
        assert_eq!(fetcher.transport.requests.len(), 2);
    }

    #[test]
    fn test_zero_attempt_policy_reports_generic_failure() {
        let mut fetcher = PageFetcher::new(
            ScriptedTransport::new(vec![ok("unused")]),
            RetryPolicy::default().with_max_attempts(0),
            RecordingSleeper::default(),
            LowJitter,
        );

        assert_eq!(
            fetcher.fetch(URL),
            Err(FetchError::Exhausted {
                url: URL.to_string(),
            })
        );
        assert!(fetcher.transport.requests.is_empty());
    }
}
