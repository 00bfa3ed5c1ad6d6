//! Configuration management with serde serialization/deserialization
//!
//! This module holds every tunable of the harvester: worker pool sizing,
//! session rotation, DOM retry budget, navigation timeouts, pacing between
//! navigations and the launch settings of the Chrome sessions.

use crate::HarvestError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the harvester
///
/// # Examples
///
/// ```rust
/// use film_harvester::Config;
///
/// let config = Config {
///     pool_size: 3,
///     rotation_frequency: Some(20),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of concurrent workers, each owning one browser session
    pub pool_size: usize,

    /// Replace a worker's browser session after this many harvested films
    ///
    /// `None` keeps one session for the worker's whole lifetime.
    pub rotation_frequency: Option<usize>,

    /// Attempts for every read from the rendered page (default: 5)
    pub dom_query_attempts: usize,

    /// Upper bound for a single navigation or visibility wait (default: 40 seconds)
    pub navigation_timeout: Duration,

    /// How often a visibility wait re-checks the page
    pub wait_poll_interval: Duration,

    /// Randomized delays between navigations
    pub pacing: PacingSettings,

    /// Chrome launch settings
    pub browser: BrowserSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get().clamp(1, 4),
            rotation_frequency: None,
            dom_query_attempts: 5,
            navigation_timeout: Duration::from_secs(40),
            wait_poll_interval: Duration::from_millis(250),
            pacing: PacingSettings::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.pool_size == 0 {
            return Err(HarvestError::Configuration(
                "pool size must be greater than 0".to_string(),
            ));
        }
        if self.rotation_frequency == Some(0) {
            return Err(HarvestError::Configuration(
                "rotation frequency must be greater than 0 when set".to_string(),
            ));
        }
        if self.dom_query_attempts == 0 {
            return Err(HarvestError::Configuration(
                "DOM query attempts must be greater than 0".to_string(),
            ));
        }
        if self.navigation_timeout.is_zero() {
            return Err(HarvestError::Configuration(
                "navigation timeout must be greater than 0".to_string(),
            ));
        }
        if self.wait_poll_interval.is_zero() {
            return Err(HarvestError::Configuration(
                "wait poll interval must be greater than 0".to_string(),
            ));
        }
        self.pacing.validate()?;

        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(HarvestError::Configuration(
                "window dimensions must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub async fn from_json_file(path: &std::path::Path) -> Result<Self, HarvestError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

/// Delay ranges, in milliseconds, slept after each navigation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PacingSettings {
    pub enabled: bool,

    /// Delay after a listing page has rendered (default: 2000-3000 ms)
    pub listing_delay_ms: (u64, u64),

    /// Delay after a film or review page has rendered (default: 1500-2000 ms)
    pub review_delay_ms: (u64, u64),
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listing_delay_ms: (2000, 3000),
            review_delay_ms: (1500, 2000),
        }
    }
}

impl PacingSettings {
    fn validate(&self) -> Result<(), HarvestError> {
        for (name, (low, high)) in [
            ("listing", self.listing_delay_ms),
            ("review", self.review_delay_ms),
        ] {
            if low > high {
                return Err(HarvestError::Configuration(format!(
                    "{name} delay range is inverted: {low} > {high}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    pub user_agent: Option<String>,

    /// Cookies in `Cookie` header form (`name=value; other=value`), e.g. a
    /// logged-in session copied from a desktop browser
    pub cookies: Option<String>,

    /// Domain the cookies are set for
    pub cookie_domain: String,

    pub window_width: u32,
    pub window_height: u32,

    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            user_agent: None,
            cookies: None,
            cookie_domain: ".kinopoisk.ru".to_string(),
            window_width: 1920,
            window_height: 1080,
            headless: true,
        }
    }
}

/// Generate Chrome command-line arguments for one harvesting session
///
/// Every session gets its own user data directory so that several browsers
/// can run side by side, plus the flags that hide the automation markers the
/// site checks for. Headless mode is left to the `BrowserConfig` builder.
pub fn get_chrome_args(config: &Config, instance_id: Option<usize>) -> Vec<String> {
    let unique_id = match instance_id {
        Some(id) => format!("{}-{}", std::process::id(), id),
        None => format!("{}-{}", std::process::id(), uuid::Uuid::new_v4()),
    };

    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        format!(
            "--window-size={},{}",
            config.browser.window_width, config.browser.window_height
        ),
        format!("--user-data-dir=/tmp/film-harvester-{unique_id}"),
    ];

    if let Some(user_agent) = &config.browser.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &Config,
    instance_id: Option<usize>,
) -> Result<chromiumoxide::browser::BrowserConfig, HarvestError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .disable_default_args()
        .window_size(config.browser.window_width, config.browser.window_height)
        .request_timeout(config.navigation_timeout)
        .args(get_chrome_args(config, instance_id));

    if !config.browser.headless {
        builder = builder.with_head();
    }

    if let Some(chrome_path) = &config.browser.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(HarvestError::BrowserLaunchFailed)
}
