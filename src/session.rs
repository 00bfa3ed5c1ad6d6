//! Browser session capabilities used by the harvesting engine
//!
//! The engine only ever talks to a page through [`PageSession`]; the Chrome
//! implementation lives in [`crate::chrome`], and tests drive the same code
//! against an in-memory site.

use crate::HarvestError;
use async_trait::async_trait;
use std::time::Duration;

/// One browser instance with a single active tab
///
/// A session is a stateful, single-navigation-at-a-time resource. It is owned
/// by exactly one worker and never shared. Read-only queries (`find_*`,
/// `text_of`, `attribute_of`) may run concurrently against the current page.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Handle to an element of the current page
    type Element: Send + Sync;

    async fn navigate(&self, url: &str) -> Result<(), HarvestError>;

    /// Block until an element matching `selector` is rendered and visible
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), HarvestError>;

    /// Every element of the current page matching `selector`, in document order
    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Element>, HarvestError>;

    /// First element matching `selector`, searched under `parent` when given
    async fn find_one(
        &self,
        parent: Option<&Self::Element>,
        selector: &str,
    ) -> Result<Self::Element, HarvestError>;

    async fn text_of(&self, element: &Self::Element) -> Result<String, HarvestError>;

    async fn attribute_of(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<String, HarvestError>;

    async fn close(&mut self) -> Result<(), HarvestError>;
}

/// Produces independent, exclusively owned sessions
///
/// Creation is slow and may fail. Implementations must be callable from
/// several workers at once.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: PageSession + 'static;

    async fn create(&self) -> Result<Self::Session, HarvestError>;
}
