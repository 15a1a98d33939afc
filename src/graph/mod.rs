pub mod auth;
pub mod directory;

use crate::config::DEFAULT_GRAPH_BASE_URL;
use crate::error::{AssignerError, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Transport-level retry for throttling and transient server failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30000),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter for the given zero-based attempt
    fn backoff(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_backoff.as_millis() as u64;
        let capped = initial_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_backoff.as_millis() as u64);

        let jitter_range = (capped as f64 * JITTER_FACTOR) as u64;
        let jitter = if jitter_range > 0 {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::time::SystemTime::now().hash(&mut hasher);
            (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
        } else {
            0
        };

        Duration::from_millis((capped as i64 + jitter).max(0) as u64)
    }
}

/// Which failures a request may be sent again after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Reads: any transient failure
    Idempotent,
    /// Writes: only failures where Graph never processed the request
    RejectedOnly,
}

/// Graph API client with retry support
pub struct GraphClient {
    client: Client,
    base_url: String,
    access_token: String,
    retry: RetryPolicy,
}

impl GraphClient {
    pub fn new(access_token: String) -> Result<Self> {
        Self::with_base_url(access_token, DEFAULT_GRAPH_BASE_URL)
    }

    /// Point the client at another Graph root (national clouds, mock servers)
    pub fn with_base_url(access_token: String, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Make a GET request to Graph API with retry for transient failures
    pub async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.url(endpoint);
        let resp = self
            .send_with_retry("GET", &url, Replay::Idempotent, || {
                self.client
                    .get(&url)
                    .query(query)
                    .bearer_auth(&self.access_token)
            })
            .await?;
        Ok(resp.json::<T>().await?)
    }

    /// Make a POST request to Graph API
    ///
    /// Only retried when Graph rejected the request unprocessed (429) or the
    /// connection was never established.
    pub async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = self.url(endpoint);
        let resp = self
            .send_with_retry("POST", &url, Replay::RejectedOnly, || {
                self.client
                    .post(&url)
                    .bearer_auth(&self.access_token)
                    .json(body)
            })
            .await?;
        Ok(resp.json::<R>().await?)
    }

    /// Send a request, retrying on 429 (respecting Retry-After), 5xx and connection errors.
    /// Any other non-success status is returned as a `GraphApiError`.
    ///
    /// With `Replay::RejectedOnly` a 5xx or a failure after the request went
    /// out is returned at once, since Graph may already have applied it.
    async fn send_with_retry<F>(
        &self,
        verb: &str,
        url: &str,
        replay: Replay,
        build: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let is_last = attempt + 1 >= max_attempts;
            tracing::debug!("{} {} (attempt {}/{})", verb, url, attempt + 1, max_attempts);

            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS && !is_last {
                        let wait_time = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or(self.retry.initial_backoff);

                        tracing::warn!(
                            "Rate limited (429). Retrying in {:?}... (attempt {}/{})",
                            wait_time,
                            attempt + 1,
                            max_attempts
                        );
                        tokio::time::sleep(wait_time).await;
                        attempt += 1;
                        continue;
                    }

                    if status.is_server_error() && replay == Replay::Idempotent && !is_last {
                        let wait_time = self.retry.backoff(attempt);
                        tracing::warn!(
                            "Server error ({}). Retrying in {:?}... (attempt {}/{})",
                            status,
                            wait_time,
                            attempt + 1,
                            max_attempts
                        );
                        tokio::time::sleep(wait_time).await;
                        attempt += 1;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = resp.text().await.unwrap_or_default();
                        let enhanced_error = crate::error::enhance_graph_error(&error_text);
                        return Err(AssignerError::GraphApiError(format!(
                            "{} {} returned HTTP {}: {}",
                            verb, url, status, enhanced_error
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    let unsent = e.is_connect();
                    if is_last || (replay == Replay::RejectedOnly && !unsent) {
                        return Err(e.into());
                    }
                    let wait_time = self.retry.backoff(attempt);
                    tracing::warn!(
                        "Connection error: {}. Retrying in {:?}... (attempt {}/{})",
                        e,
                        wait_time,
                        attempt + 1,
                        max_attempts
                    );
                    tokio::time::sleep(wait_time).await;
                    attempt += 1;
                }
            }
        }
    }
}

// ============================================================================
// Pagination Helpers
// ============================================================================

/// Generic paginated response from Graph API
///
/// Standard OData collection with a `value` array and `@odata.nextLink`
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

impl GraphClient {
    /// Fetch all pages of a paginated Graph API endpoint
    ///
    /// Follows `@odata.nextLink` until the last page. `on_page` receives the
    /// running item count after each page.
    ///
    /// # Example
    /// ```ignore
    /// let apps: Vec<Application> = client
    ///     .get_all_pages("/applications", &[("$top", "999")], |n| bar.set_position(n as u64))
    ///     .await?;
    /// ```
    pub async fn get_all_pages<T, F>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        mut on_page: F,
    ) -> Result<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
        F: FnMut(usize),
    {
        let mut all_items: Vec<T> = Vec::new();
        let mut page: PaginatedResponse<T> = self.get(endpoint, query).await?;

        loop {
            all_items.extend(page.value);
            on_page(all_items.len());

            match page.next_link {
                // nextLink already carries the full query (including $skiptoken)
                Some(next) => page = self.get_raw_url(&next).await?,
                None => break,
            }
        }

        tracing::debug!("Fetched {} items from {}", all_items.len(), endpoint);
        Ok(all_items)
    }

    /// Make a GET request to a raw URL (for following nextLink)
    async fn get_raw_url<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let resp = self
            .send_with_retry("GET", url, Replay::Idempotent, || {
                self.client.get(url).bearer_auth(&self.access_token)
            })
            .await?;
        Ok(resp.json::<T>().await?)
    }
}

/// Quote a string literal for an OData `$filter` expression
pub fn odata_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odata_quote_doubles_single_quotes() {
        assert_eq!(odata_quote("ManagedIdentity"), "'ManagedIdentity'");
        assert_eq!(odata_quote("Bob's API"), "'Bob''s API'");
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(4000),
        };
        let wait = policy.backoff(8);
        // 4000ms cap +/- 30% jitter
        assert!(wait <= Duration::from_millis(5200));
        assert!(wait >= Duration::from_millis(2800));
    }

    #[test]
    fn test_zero_backoff_has_no_jitter() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        };
        assert_eq!(policy.backoff(2), Duration::ZERO);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = GraphClient::with_base_url("t".into(), "http://localhost:1/v1.0/").unwrap();
        assert_eq!(client.url("/applications"), "http://localhost:1/v1.0/applications");
    }
}
