//! Randomized delays between navigations
//!
//! The site throttles clients that navigate at machine speed, so every
//! rendered page is followed by a short random pause. The policy is a trait
//! so tests can run without sleeping.

use crate::PacingSettings;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceKind {
    /// After a search-result listing page rendered
    Listing,
    /// After a film or review page rendered
    Review,
}

#[cfg_attr(test, mockall::automock)]
pub trait Pacing: Send + Sync {
    fn delay(&self, kind: PaceKind) -> Duration;
}

/// Uniformly random delay drawn from the configured millisecond ranges
#[derive(Debug, Clone)]
pub struct JitterPacing {
    settings: PacingSettings,
}

impl JitterPacing {
    pub fn new(settings: PacingSettings) -> Self {
        Self { settings }
    }
}

impl Pacing for JitterPacing {
    fn delay(&self, kind: PaceKind) -> Duration {
        if !self.settings.enabled {
            return Duration::ZERO;
        }

        let (low, high) = match kind {
            PaceKind::Listing => self.settings.listing_delay_ms,
            PaceKind::Review => self.settings.review_delay_ms,
        };
        if low >= high {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rand::rng().random_range(low..=high))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl Pacing for NoPacing {
    fn delay(&self, _kind: PaceKind) -> Duration {
        Duration::ZERO
    }
}

pub fn pacing_from_settings(settings: &PacingSettings) -> Arc<dyn Pacing> {
    if settings.enabled {
        Arc::new(JitterPacing::new(settings.clone()))
    } else {
        Arc::new(NoPacing)
    }
}

pub async fn pause(pacing: &dyn Pacing, kind: PaceKind) {
    let delay = pacing.delay(kind);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
