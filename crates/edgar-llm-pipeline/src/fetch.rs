use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use edgar_llm_core::{PipelineConfig, PipelineError, Result};

use crate::rate_limiter::SecRateLimiter;

/// **SEC Fetcher**
///
/// Rate-limited HTTP client for the SEC's archives with a local
/// content-addressed cache. A cache hit bypasses the limiter entirely;
/// concurrent misses for the same URL are serialised so exactly one request
/// leaves the process. Cache entries never expire within a run.
///
/// Retry policy: 5xx, 429 and network timeouts retry with exponential
/// backoff (base 1s, factor 2, jitter ±20%, five attempts by default);
/// any other 4xx is terminal for the filing.
pub struct SecFetcher {
    client: reqwest::Client,
    limiter: Arc<SecRateLimiter>,
    cache_dir: PathBuf,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    retry_attempts: u32,
    retry_base: Duration,
    retry_factor: u32,
    retry_jitter: f64,
}

impl SecFetcher {
    pub fn new(config: &PipelineConfig, limiter: Arc<SecRateLimiter>) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|_| PipelineError::Config("user agent contains invalid characters".into()))?;
        headers.insert(USER_AGENT, user_agent);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            limiter,
            cache_dir: config.cache_dir.clone(),
            inflight: Mutex::new(HashMap::new()),
            retry_attempts: config.retry_attempts,
            retry_base: config.retry_base,
            retry_factor: config.retry_factor,
            retry_jitter: config.retry_jitter,
        })
    }

    /// Fetch a URL, consulting the cache first.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let cache_path = self.cache_path(url);
        if let Some(bytes) = read_cache(&cache_path).await {
            debug!(url, "fetch cache hit");
            return Ok(bytes);
        }

        // Serialise concurrent misses for the same URL.
        let url_lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = url_lock.lock().await;

        // Another worker may have populated the cache while we waited.
        if let Some(bytes) = read_cache(&cache_path).await {
            debug!(url, "fetch cache hit after wait");
            return Ok(bytes);
        }

        let bytes = self.fetch_with_retries(url).await?;
        if let Err(e) = write_cache(&cache_path, &bytes).await {
            warn!(url, error = %e, "failed to write fetch cache entry");
        }
        Ok(bytes)
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_reason = String::new();

        for attempt in 0..self.retry_attempts {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt - 1);
                debug!(url, attempt, ?delay, "retrying after backoff");
                sleep(delay).await;
            }

            self.limiter.acquire().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.bytes().await.map_err(|e| {
                            PipelineError::TransientFetch {
                                url: url.to_string(),
                                reason: format!("body read failed: {e}"),
                            }
                        })?;
                        info!(url, bytes = body.len(), "fetched");
                        return Ok(body.to_vec());
                    }
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        last_reason = format!("HTTP {status}");
                        warn!(url, %status, attempt, "transient HTTP error");
                        continue;
                    }
                    return Err(PipelineError::PermanentFetch {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Err(e) => {
                    last_reason = e.to_string();
                    warn!(url, error = %e, attempt, "request failed");
                }
            }
        }

        Err(PipelineError::TransientFetch {
            url: url.to_string(),
            reason: format!(
                "gave up after {} attempts: {last_reason}",
                self.retry_attempts
            ),
        })
    }

    /// Exponential backoff with jitter: base * factor^attempt ± jitter%.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_base.as_millis() as f64;
        let delay_ms = base_ms * f64::from(self.retry_factor).powi(attempt as i32);
        let jitter = delay_ms * self.retry_jitter * (rand::random::<f64>() * 2.0 - 1.0);
        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    fn cache_path(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        self.cache_dir.join(hex::encode(hasher.finalize()))
    }
}

async fn read_cache(path: &Path) -> Option<Vec<u8>> {
    tokio::fs::read(path).await.ok()
}

async fn write_cache(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Write-once: a temp file renamed into place so readers never observe a
    // partial entry.
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgar_llm_core::PipelineConfig;
    use tempfile::TempDir;

    fn fetcher_with_cache(dir: &TempDir) -> SecFetcher {
        let config = PipelineConfig {
            cache_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        SecFetcher::new(&config, Arc::new(SecRateLimiter::sec_default())).unwrap()
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_with_cache(&dir);

        let url = "https://www.sec.gov/Archives/edgar/data/320193/aapl-20221231.htm";
        let cache_path = fetcher.cache_path(url);
        write_cache(&cache_path, b"cached document").await.unwrap();

        let bytes = fetcher.fetch(url).await.unwrap();
        assert_eq!(bytes, b"cached document");
    }

    #[tokio::test]
    async fn distinct_urls_have_distinct_cache_keys() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_with_cache(&dir);
        let a = fetcher.cache_path("https://www.sec.gov/a");
        let b = fetcher.cache_path("https://www.sec.gov/b");
        assert_ne!(a, b);
        // Same URL always maps to the same entry.
        assert_eq!(a, fetcher.cache_path("https://www.sec.gov/a"));
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_with_cache(&dir);

        for attempt in 0..4u32 {
            let expected_ms = 1000.0 * 2f64.powi(attempt as i32);
            let delay = fetcher.backoff_delay(attempt).as_millis() as f64;
            assert!(delay >= expected_ms * 0.8 - 1.0, "attempt {attempt}: {delay}");
            assert!(delay <= expected_ms * 1.2 + 1.0, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn fetcher_rejects_user_agent_without_contact() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            cache_dir: dir.path().to_path_buf(),
            user_agent: "no-contact-here".to_string(),
            ..PipelineConfig::default()
        };
        assert!(SecFetcher::new(&config, Arc::new(SecRateLimiter::sec_default())).is_err());
    }
}
