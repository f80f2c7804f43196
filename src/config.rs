use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use reqwest::Url;
use serde::Deserialize;

use crate::fetch::RetryPolicy;

pub const DEFAULT_QR_TEMPLATE: &str =
    "https://api.qrserver.com/v1/create-qr-code/?size={size}x{size}&data={data}";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root every relative locator (documents, promo and listing media) resolves against.
    pub base_url: String,
    /// Inventory document, relative to `base-url`.
    pub stock_path: String,
    /// Settings document, relative to `base-url`.
    pub settings_path: String,
    /// Retry behavior for the two startup documents.
    pub fetch: FetchOptions,
    pub rotation: RotationOptions,
    pub render: RenderOptions,
    /// Optional deterministic seed for random inventory order.
    pub shuffle_seed: Option<u64>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(!self.base_url.trim().is_empty(), "base-url must be set");
        self.stock_url().context("invalid stock-path")?;
        self.settings_url().context("invalid settings-path")?;
        self.fetch.validate()?;
        self.rotation.validate()?;
        self.render.validate()?;
        Ok(self)
    }

    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.base_url.trim().to_owned();
        // a base without a trailing slash would drop its last segment on join
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("invalid base-url {:?}", self.base_url))
    }

    pub fn stock_url(&self) -> Result<Url> {
        Ok(self.base_url()?.join(&self.stock_path)?)
    }

    pub fn settings_url(&self) -> Result<Url> {
        Ok(self.base_url()?.join(&self.settings_path)?)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            stock_path: "stock.json".to_owned(),
            settings_path: "settings.json".to_owned(),
            fetch: FetchOptions::default(),
            rotation: RotationOptions::default(),
            render: RenderOptions::default(),
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FetchOptions {
    /// Total attempts per document, first one included.
    pub max_attempts: u32,
    /// Backoff unit: the wait after attempt `n` is `n * base-delay`.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Per-request timeout; a timeout counts as a failed attempt.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl FetchOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.max_attempts >= 1, "fetch.max-attempts must be >= 1");
        ensure!(
            self.request_timeout > Duration::ZERO,
            "fetch.request-timeout must be positive"
        );
        Ok(())
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay: policy.base_delay,
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RotationOptions {
    /// How often the progress bar is refreshed.
    #[serde(with = "humantime_serde")]
    pub progress_tick: Duration,
    /// Keep the current position (modulo the new length) when a new
    /// sequence is loaded instead of starting over.
    pub carry_index: bool,
}

impl RotationOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.progress_tick > Duration::ZERO,
            "rotation.progress-tick must be positive"
        );
        ensure!(
            self.progress_tick < Duration::from_secs(2),
            "rotation.progress-tick must be shorter than the minimum slide duration"
        );
        Ok(())
    }
}

impl Default for RotationOptions {
    fn default() -> Self {
        Self {
            progress_tick: Duration::from_millis(50),
            carry_index: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RenderOptions {
    /// QR service URL with `{data}` and optional `{size}` placeholders.
    pub qr_template: String,
    /// QR edge length in pixels.
    pub qr_size: u32,
    /// Fetch and decode slide media in the background to detect broken images.
    pub probe_media: bool,
    #[serde(with = "humantime_serde")]
    pub media_timeout: Duration,
}

impl RenderOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.qr_template.contains("{data}"),
            "render.qr-template must contain a {{data}} placeholder"
        );
        ensure!(self.qr_size > 0, "render.qr-size must be greater than zero");
        ensure!(
            self.media_timeout > Duration::ZERO,
            "render.media-timeout must be positive"
        );
        Ok(())
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            qr_template: DEFAULT_QR_TEMPLATE.to_owned(),
            qr_size: 110,
            probe_media: true,
            media_timeout: Duration::from_secs(10),
        }
    }
}
