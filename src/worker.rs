use crate::listing::PAGE_PLACEHOLDER;
use crate::metrics::ItemTimer;
use crate::pacing::{pause, PaceKind, Pacing};
use crate::utils::{ceil_div, class_token, join_path, parse_trailing_int};
use crate::{
    Config, DomRetry, HarvestError, HarvestMetrics, ItemRecord, PageSession, SessionFactory,
    SubRecord,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Film URLs waiting to be harvested, shared by every worker of a run
pub type WorkQueue = Arc<Mutex<VecDeque<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    FetchingParent,
    FetchingSubPages,
    Terminated,
}

/// Where the pieces of a film and its reviews live on the site
///
/// Paths are appended to the film URL. `{page}` in `sub_page_path` is the
/// 1-based review page number. Review children are located by element id:
/// `{prefix}{id}` where `id` is read from `id_attribute` of the review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPageLayout {
    /// Suffix of the page holding title and year; empty for the film URL itself
    pub parent_path: String,
    pub title_selector: String,
    /// Element whose text ends with the release year
    pub subtitle_selector: String,
    pub sub_page_path: String,
    pub sub_page_size: usize,
    pub sub_record_selector: String,
    pub counter_selector: String,
    pub id_attribute: String,
    pub stance_id_prefix: String,
    pub title_id_prefix: String,
    pub body_id_prefix: String,
    /// Position of the stance tag among the class tokens of the stance element
    pub stance_class_index: usize,
}

impl ItemPageLayout {
    /// Review pages of kinopoisk.ru, newest first, 200 per page
    ///
    /// Title and year are read from the breadcrumbs of review page 1, so the
    /// parent page and the first review page are the same navigation.
    pub fn kinopoisk() -> Self {
        Self {
            parent_path: "reviews/ord/date/status/all/perpage/200/page/1/".to_string(),
            title_selector: ".breadcrumbs__link".to_string(),
            subtitle_selector: ".breadcrumbs__sub".to_string(),
            sub_page_path: "reviews/ord/date/status/all/perpage/200/page/{page}/".to_string(),
            sub_page_size: 200,
            sub_record_selector: ".userReview".to_string(),
            counter_selector: ".pagesFromTo".to_string(),
            id_attribute: "data-id".to_string(),
            stance_id_prefix: "div_review_".to_string(),
            title_id_prefix: "ext_title_".to_string(),
            body_id_prefix: "ext_text_".to_string(),
            stance_class_index: 1,
        }
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.sub_page_size == 0 {
            return Err(HarvestError::Validation(
                "review page size must be greater than 0".to_string(),
            ));
        }
        if !self.sub_page_path.contains(PAGE_PLACEHOLDER) {
            return Err(HarvestError::Validation(format!(
                "review page path has no {PAGE_PLACEHOLDER} placeholder"
            )));
        }
        Ok(())
    }

    pub fn parent_url(&self, item_url: &str) -> String {
        if self.parent_path.is_empty() {
            item_url.to_string()
        } else {
            join_path(item_url, &self.parent_path)
        }
    }

    pub fn sub_page_url(&self, item_url: &str, page: usize) -> String {
        join_path(
            item_url,
            &self.sub_page_path.replace(PAGE_PLACEHOLDER, &page.to_string()),
        )
    }
}

impl Default for ItemPageLayout {
    fn default() -> Self {
        Self::kinopoisk()
    }
}

/// Everything a worker needs besides its session and the rotation policy
#[derive(Clone)]
pub struct HarvestSettings {
    pub layout: Arc<ItemPageLayout>,
    pub retry: DomRetry,
    pub pacing: Arc<dyn Pacing>,
    pub timeout: Duration,
}

impl HarvestSettings {
    pub fn from_config(config: &Config, layout: ItemPageLayout, pacing: Arc<dyn Pacing>) -> Self {
        Self {
            layout: Arc::new(layout),
            retry: DomRetry::new(config.dom_query_attempts),
            pacing,
            timeout: config.navigation_timeout,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub id: usize,
    pub harvested: usize,
    pub dropped: usize,
    pub sub_records: usize,
    pub rotations: usize,
}

/// A film URL that was dropped, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerOutcome {
    pub records: Vec<ItemRecord>,
    pub stats: WorkerStats,
    pub failures: Vec<ItemFailure>,
    /// The worker stopped before the queue was empty because its session
    /// could not be replaced
    pub aborted: bool,
}

pub struct HarvestWorker<F: SessionFactory> {
    id: usize,
    factory: Arc<F>,
    session: F::Session,
    settings: HarvestSettings,
    rotation_frequency: Option<usize>,
    state: WorkerState,
    stats: WorkerStats,
}

impl<F: SessionFactory> HarvestWorker<F> {
    pub fn new(
        id: usize,
        factory: Arc<F>,
        session: F::Session,
        settings: HarvestSettings,
        rotation_frequency: Option<usize>,
    ) -> Self {
        Self {
            id,
            factory,
            session,
            settings,
            rotation_frequency,
            state: WorkerState::Idle,
            stats: WorkerStats {
                id,
                ..Default::default()
            },
        }
    }

    /// Drain `queue` until it is empty, then close the session
    pub async fn run(mut self, queue: WorkQueue) -> WorkerOutcome {
        info!("Starting harvest worker {}", self.id);

        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut aborted = false;
        let mut until_rotation = self.rotation_frequency;

        loop {
            self.transition(WorkerState::Idle);

            let next = queue.lock().await.pop_front();
            let Some(url) = next else {
                break;
            };

            let timer = ItemTimer::start();
            match self.harvest_item(&url).await {
                Ok(record) => {
                    let elapsed = timer.finish(true);
                    debug!(
                        "Worker {} harvested {} ({} reviews) in {}",
                        self.id,
                        url,
                        record.sub_records.len(),
                        crate::utils::format_duration(elapsed)
                    );
                    self.stats.harvested += 1;
                    self.stats.sub_records += record.sub_records.len();
                    records.push(record);

                    if let (Some(left), Some(frequency)) =
                        (until_rotation.as_mut(), self.rotation_frequency)
                    {
                        *left = left.saturating_sub(1);
                        if *left == 0 {
                            if let Err(e) = self.rotate().await {
                                error!("Worker {} could not replace its session: {}", self.id, e);
                                aborted = true;
                                break;
                            }
                            *left = frequency;
                        }
                    }
                }
                Err(e) => {
                    timer.finish(false);
                    warn!("Worker {} dropped {}: {}", self.id, url, e);
                    self.stats.dropped += 1;

                    let session_failure = e.is_session_failure();
                    failures.push(ItemFailure {
                        url,
                        error: e.to_string(),
                    });

                    if session_failure {
                        if let Err(e) = self.rotate().await {
                            error!("Worker {} could not recover its session: {}", self.id, e);
                            aborted = true;
                            break;
                        }
                        until_rotation = self.rotation_frequency;
                    }
                }
            }
        }

        self.transition(WorkerState::Terminated);
        if let Err(e) = self.session.close().await {
            warn!("Worker {} failed to close its session: {}", self.id, e);
        }

        info!(
            "Harvest worker {} stopped: {} harvested, {} dropped",
            self.id, self.stats.harvested, self.stats.dropped
        );

        WorkerOutcome {
            records,
            stats: self.stats,
            failures,
            aborted,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!("Worker {}: {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        }
    }

    /// Replace the session with a fresh one; the old one is kept on failure
    async fn rotate(&mut self) -> Result<(), HarvestError> {
        info!("Worker {} rotating its browser session", self.id);
        let fresh = self.factory.create().await?;
        let mut stale = std::mem::replace(&mut self.session, fresh);
        if let Err(e) = stale.close().await {
            warn!("Worker {} failed to close the replaced session: {}", self.id, e);
        }
        self.stats.rotations += 1;
        HarvestMetrics::record_rotation();
        Ok(())
    }

    async fn harvest_item(&mut self, url: &str) -> Result<ItemRecord, HarvestError> {
        self.transition(WorkerState::FetchingParent);
        let parent_url = self.settings.layout.parent_url(url);
        let (title, release_year) = self.fetch_parent(&parent_url).await?;

        self.transition(WorkerState::FetchingSubPages);
        let sub_records = self.fetch_sub_records(url, &parent_url).await?;

        Ok(ItemRecord {
            title,
            release_year,
            source_url: url.to_string(),
            sub_records,
        })
    }

    async fn fetch_parent(&self, parent_url: &str) -> Result<(String, i32), HarvestError> {
        let session = &self.session;
        let layout = self.settings.layout.as_ref();

        session.navigate(parent_url).await?;
        session
            .wait_visible(&layout.title_selector, self.settings.timeout)
            .await?;
        pause(self.settings.pacing.as_ref(), PaceKind::Review).await;

        self.settings
            .retry
            .run(|| async move {
                let title = session.find_one(None, &layout.title_selector).await?;
                let subtitle = session.find_one(None, &layout.subtitle_selector).await?;
                let title = session.text_of(&title).await?;
                let release_year = parse_trailing_int::<i32>(&session.text_of(&subtitle).await?)?;
                Ok((title, release_year))
            })
            .await
    }

    async fn fetch_sub_records(
        &self,
        item_url: &str,
        current_url: &str,
    ) -> Result<Vec<SubRecord>, HarvestError> {
        let session = &self.session;
        let layout = self.settings.layout.as_ref();

        let first_url = layout.sub_page_url(item_url, 1);
        if first_url != current_url {
            session.navigate(&first_url).await?;
        }
        match session
            .wait_visible(&layout.sub_record_selector, self.settings.timeout)
            .await
        {
            Ok(()) => {}
            Err(HarvestError::Timeout(limit)) => {
                // Only a page that announces no reviews may legitimately render none
                return match self.sub_record_total(&first_url).await {
                    None | Some(0) => {
                        debug!("No reviews rendered for {}", item_url);
                        Ok(Vec::new())
                    }
                    Some(total) => {
                        warn!("{} announces {} reviews but none rendered", first_url, total);
                        Err(HarvestError::Timeout(limit))
                    }
                };
            }
            Err(e) => return Err(e),
        }

        let total = self.sub_record_total(&first_url).await;
        let pages = total.map_or(1, |total| ceil_div(total, layout.sub_page_size));

        let mut sub_records = self.extract_sub_page().await?;
        for page in 2..=pages {
            let url = layout.sub_page_url(item_url, page);
            session.navigate(&url).await?;
            session
                .wait_visible(&layout.sub_record_selector, self.settings.timeout)
                .await?;
            pause(self.settings.pacing.as_ref(), PaceKind::Review).await;

            let batch = self.extract_sub_page().await?;
            debug!("Review page {} of {} yielded {} reviews", page, item_url, batch.len());
            sub_records.extend(batch);
        }

        Ok(sub_records)
    }

    /// Review count from the "X of Y" counter of the current page
    async fn sub_record_total(&self, page_url: &str) -> Option<usize> {
        let session = &self.session;
        let layout = self.settings.layout.as_ref();

        self.settings
            .retry
            .run_or_else(
                || async move {
                    let counter = session.find_one(None, &layout.counter_selector).await?;
                    parse_trailing_int::<usize>(&session.text_of(&counter).await?)
                },
                || debug!("No review counter on {}", page_url),
            )
            .await
    }

    /// Every review of the current page, extracted concurrently
    async fn extract_sub_page(&self) -> Result<Vec<SubRecord>, HarvestError> {
        let session = &self.session;
        let layout = self.settings.layout.as_ref();

        self.settings
            .retry
            .run(|| async move {
                let elements = session.find_all(&layout.sub_record_selector).await?;
                try_join_all(
                    elements
                        .iter()
                        .map(|element| extract_sub_record(session, layout, element)),
                )
                .await
            })
            .await
    }
}

async fn extract_sub_record<S: PageSession>(
    session: &S,
    layout: &ItemPageLayout,
    element: &S::Element,
) -> Result<SubRecord, HarvestError> {
    let id = session.attribute_of(element, &layout.id_attribute).await?;
    let id = id.trim();

    let stance_element = session
        .find_one(Some(element), &format!("#{}{}", layout.stance_id_prefix, id))
        .await?;
    let title_element = session
        .find_one(Some(&stance_element), &format!("#{}{}", layout.title_id_prefix, id))
        .await?;
    let body_element = session
        .find_one(Some(&stance_element), &format!("#{}{}", layout.body_id_prefix, id))
        .await?;

    let class = session.attribute_of(&stance_element, "class").await?;

    Ok(SubRecord {
        title: session.text_of(&title_element).await?,
        stance: class_token(&class, layout.stance_class_index)?,
        body: session.text_of(&body_element).await?,
    })
}
