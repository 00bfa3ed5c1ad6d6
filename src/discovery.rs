//! Link discovery across paginated result listings
//!
//! Converts a skip/limit window into the ordered list of film URLs it
//! covers, fetching only the listing pages that overlap the window.

use crate::pacing::{pause, PaceKind, Pacing};
use crate::utils::{ceil_div, parse_trailing_int};
use crate::{DomRetry, HarvestError, HarvestMetrics, ListingSpec, PageSession, TotalSource};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Which slice of a listing to retrieve
///
/// Only constructible through [`WindowSpec::new`], so a held value is always
/// valid. Deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct WindowSpec {
    skip: usize,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct RawWindow {
    #[serde(default)]
    skip: i64,
    #[serde(default)]
    limit: Option<i64>,
}

impl TryFrom<RawWindow> for WindowSpec {
    type Error = HarvestError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        WindowSpec::new(raw.skip, raw.limit)
    }
}

impl WindowSpec {
    pub fn new(skip: i64, limit: Option<i64>) -> Result<Self, HarvestError> {
        let skip = usize::try_from(skip).map_err(|_| {
            HarvestError::Validation(format!("skip must not be negative, got {skip}"))
        })?;
        let limit = limit
            .map(|limit| {
                usize::try_from(limit).map_err(|_| {
                    HarvestError::Validation(format!("limit must not be negative, got {limit}"))
                })
            })
            .transpose()?;

        Ok(Self { skip, limit })
    }

    /// Everything from the start of the listing
    pub fn all() -> Self {
        Self::default()
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// Listing pages to fetch for a window and how to trim what they yield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    /// 1-based number of the first listing page to fetch
    pub first_page: usize,
    pub pages: usize,
    /// Entries of the first fetched page that precede the window
    pub drop_front: usize,
    /// Entries the window holds
    pub take: usize,
}

impl WindowPlan {
    pub fn compute(window: WindowSpec, total: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let first_page = window.skip / page_size + 1;
        let drop_front = window.skip % page_size;

        let mut take = total.saturating_sub(window.skip);
        if let Some(limit) = window.limit {
            take = take.min(limit);
        }

        // The window can straddle a page boundary, so count the pages that
        // cover [skip, skip + take) rather than take alone.
        let pages = if take == 0 {
            0
        } else {
            ceil_div(window.skip + take, page_size) - (first_page - 1)
        };

        Self {
            first_page,
            pages,
            drop_front,
            take,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pages == 0
    }

    pub fn page_numbers(&self) -> std::ops::Range<usize> {
        self.first_page..self.first_page + self.pages
    }

    pub fn trim(&self, links: Vec<String>) -> Vec<String> {
        links
            .into_iter()
            .skip(self.drop_front)
            .take(self.take)
            .collect()
    }
}

pub struct LinkDiscovery {
    listing: ListingSpec,
    retry: DomRetry,
    pacing: Arc<dyn Pacing>,
    timeout: Duration,
}

impl LinkDiscovery {
    pub fn new(
        listing: ListingSpec,
        retry: DomRetry,
        pacing: Arc<dyn Pacing>,
        timeout: Duration,
    ) -> Result<Self, HarvestError> {
        listing.validate()?;
        Ok(Self {
            listing,
            retry,
            pacing,
            timeout,
        })
    }

    pub fn listing(&self) -> &ListingSpec {
        &self.listing
    }

    /// Film URLs covered by `window`, in page-then-position order
    pub async fn discover<S: PageSession>(
        &self,
        session: &S,
        window: WindowSpec,
    ) -> Result<Vec<String>, HarvestError> {
        if window.limit == Some(0) {
            debug!("Window limit is 0, nothing to discover");
            return Ok(Vec::new());
        }

        let total = self.total(session).await?;
        let plan = WindowPlan::compute(window, total, self.listing.page_size);
        info!(
            "Listing {} holds {} films; fetching {} page(s) from page {}",
            self.listing.name, total, plan.pages, plan.first_page
        );

        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let mut links = Vec::with_capacity(plan.pages * self.listing.page_size);
        for page in plan.page_numbers() {
            let page_links = self.fetch_page(session, page).await?;
            debug!("Listing page {} yielded {} links", page, page_links.len());
            links.extend(page_links);
        }

        Ok(plan.trim(links))
    }

    async fn total<S: PageSession>(&self, session: &S) -> Result<usize, HarvestError> {
        let selector = match &self.listing.total {
            TotalSource::Fixed(total) => return Ok(*total),
            TotalSource::Counter { selector } => selector.as_str(),
        };

        let url = self.listing.page_url(1);
        session.navigate(&url).await?;
        session.wait_visible(selector, self.timeout).await?;

        self.retry
            .run(|| async move {
                let counter = session.find_one(None, selector).await?;
                let text = session.text_of(&counter).await?;
                parse_trailing_int::<usize>(&text)
            })
            .await
    }

    async fn fetch_page<S: PageSession>(
        &self,
        session: &S,
        page: usize,
    ) -> Result<Vec<String>, HarvestError> {
        let url = self.listing.page_url(page);
        session.navigate(&url).await?;
        session
            .wait_visible(&self.listing.ready_selector, self.timeout)
            .await?;
        pause(self.pacing.as_ref(), PaceKind::Listing).await;
        HarvestMetrics::record_listing_page();

        let listing = &self.listing;
        let url = url.as_str();
        self.retry
            .run(|| async move {
                let items = session.find_all(&listing.item_selector).await?;
                try_join_all(items.iter().map(|item| async move {
                    let raw = session.attribute_of(item, listing.link_attribute()).await?;
                    listing.resolve_link(url, &raw)
                }))
                .await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(skip: i64, limit: Option<i64>) -> WindowSpec {
        WindowSpec::new(skip, limit).unwrap()
    }

    #[test]
    fn test_window_rejects_negative_values() {
        assert!(matches!(
            WindowSpec::new(-1, None),
            Err(HarvestError::Validation(_))
        ));
        assert!(matches!(
            WindowSpec::new(0, Some(-5)),
            Err(HarvestError::Validation(_))
        ));
        assert!(WindowSpec::new(0, Some(0)).is_ok());
    }

    #[test]
    fn test_window_deserializes_through_validation() {
        let parsed: WindowSpec = serde_json::from_str(r#"{"skip": 10, "limit": 5}"#).unwrap();
        assert_eq!(parsed, window(10, Some(5)));

        let parsed: WindowSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, WindowSpec::all());

        assert!(serde_json::from_str::<WindowSpec>(r#"{"skip": -3}"#).is_err());
    }

    #[test]
    fn test_plan_whole_listing() {
        let plan = WindowPlan::compute(WindowSpec::all(), 450, 200);
        assert_eq!(
            plan,
            WindowPlan { first_page: 1, pages: 3, drop_front: 0, take: 450 }
        );
    }

    #[test]
    fn test_plan_skip_within_first_page() {
        let plan = WindowPlan::compute(window(50, Some(100)), 500, 200);
        assert_eq!(plan.first_page, 1);
        assert_eq!(plan.pages, 1);
        assert_eq!(plan.drop_front, 50);
        assert_eq!(plan.take, 100);
    }

    #[test]
    fn test_plan_window_straddles_pages() {
        let plan = WindowPlan::compute(window(150, Some(100)), 500, 200);
        assert_eq!(plan.first_page, 1);
        assert_eq!(plan.pages, 2);
        assert_eq!(plan.page_numbers(), 1..3);
    }

    #[test]
    fn test_plan_skip_whole_pages() {
        let plan = WindowPlan::compute(window(400, None), 450, 200);
        assert_eq!(plan.first_page, 3);
        assert_eq!(plan.pages, 1);
        assert_eq!(plan.drop_front, 0);
        assert_eq!(plan.take, 50);
    }

    #[test]
    fn test_plan_empty_cases() {
        assert!(WindowPlan::compute(window(0, Some(0)), 500, 50).is_empty());
        assert!(WindowPlan::compute(window(500, None), 500, 50).is_empty());
        assert!(WindowPlan::compute(window(9000, Some(10)), 500, 50).is_empty());
        assert!(WindowPlan::compute(WindowSpec::all(), 0, 50).is_empty());
    }

    #[test]
    fn test_plan_trim() {
        let plan = WindowPlan::compute(window(3, Some(2)), 10, 4);
        let links: Vec<String> = (0..4).map(|i| i.to_string()).collect();
        assert_eq!(plan.trim(links), vec!["3".to_string()]);
        assert_eq!(plan.pages, 2);
    }

    #[test]
    fn test_plan_matches_expected_count_exhaustively() {
        let total = 23;
        let page_size = 5;
        for skip in 0..30 {
            for limit in [None, Some(0), Some(1), Some(4), Some(7), Some(40)] {
                let spec = WindowSpec::new(skip, limit).unwrap();
                let plan = WindowPlan::compute(spec, total, page_size);

                let expected_take = limit
                    .map(|l| l as usize)
                    .unwrap_or(usize::MAX)
                    .min(total.saturating_sub(skip as usize));
                assert_eq!(plan.take, expected_take, "skip={skip} limit={limit:?}");

                // The fetched pages must cover the window exactly.
                let fetched = (plan.first_page - 1) * page_size;
                let last_page = plan.first_page + plan.pages - 1;
                if plan.take > 0 {
                    assert!(fetched + plan.drop_front == skip as usize);
                    assert!(last_page * page_size >= skip as usize + plan.take);
                    assert!((last_page - 1) * page_size < skip as usize + plan.take);
                }
            }
        }
    }
}
