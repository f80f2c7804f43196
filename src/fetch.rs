//! Startup document retrieval with bounded retry.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{FetchError, LoadError};
use crate::model::{Listing, Settings};

/// Linear backoff: after failed attempt `n` wait `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2000),
        }
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// `op` receives the 1-based attempt number. The error of the final attempt
/// is returned as-is together with the number of attempts made.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, (E, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(target_doc = label, attempt, "fetch recovered");
                }
                return Ok(value);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(target_doc = label, attempt, error = %err, "fetch failed; giving up");
                return Err((err, attempt));
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    target_doc = label,
                    attempt,
                    max_attempts,
                    retry_in = %humantime::format_duration(delay),
                    error = %err,
                    "fetch failed; retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// GET `url` and decode its JSON body. Any transport failure, non-success
/// status or undecodable body is retried under `policy`.
pub async fn fetch_json<T>(client: &Client, url: &Url, policy: &RetryPolicy) -> Result<T, FetchError>
where
    T: DeserializeOwned,
{
    retry_with_backoff(policy, url.as_str(), |attempt| async move {
        debug!(%url, attempt, "requesting");
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = client.get(url.clone()).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    })
    .await
    .map_err(|(last, attempts)| FetchError::Exhausted {
        url: url.to_string(),
        attempts,
        last: Box::new(last),
    })
}

/// Both startup documents, as fetched.
#[derive(Debug, Clone)]
pub struct Documents {
    pub listings: Vec<Listing>,
    pub settings: Settings,
}

/// Fetch inventory and settings concurrently. Succeeds only if both do; the
/// first failure wins and the other fetch is dropped.
pub async fn load_documents(
    client: &Client,
    stock_url: &Url,
    settings_url: &Url,
    policy: &RetryPolicy,
) -> Result<Documents, LoadError> {
    let (listings, settings) = tokio::try_join!(
        async {
            fetch_json::<Vec<Listing>>(client, stock_url, policy)
                .await
                .map_err(LoadError::Inventory)
        },
        async {
            fetch_json::<Settings>(client, settings_url, policy)
                .await
                .map_err(LoadError::Settings)
        },
    )?;
    info!(
        listings = listings.len(),
        promotions = settings.promotions.len(),
        "documents loaded"
    );
    Ok(Documents { listings, settings })
}
