//! In-memory site for exercising discovery and harvesting without a browser
//!
//! Selectors are opaque keys: an element matches a selector when the
//! selector is one of its keys. Listing pages, film pages and review pages
//! are generated with predictable content so tests can compute the records
//! they expect.

use crate::{
    HarvestError, ItemPageLayout, ItemRecord, LinkSource, ListingSpec, PageSession,
    SessionFactory, SubRecord, TotalSource,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SITE: &str = "https://films.test";
pub const STANCES: [&str; 3] = ["good", "bad", "neutral"];

#[derive(Debug, Default)]
pub struct FakeElement {
    keys: Vec<String>,
    text: String,
    attributes: HashMap<String, String>,
    children: Vec<Arc<FakeElement>>,
}

impl FakeElement {
    fn new(key: impl Into<String>) -> Self {
        Self {
            keys: vec![key.into()],
            ..Default::default()
        }
    }

    fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    fn child(mut self, child: FakeElement) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.keys.iter().any(|key| key == selector)
    }

    fn collect<'a>(elements: &'a [Arc<FakeElement>], selector: &str, out: &mut Vec<&'a Arc<FakeElement>>) {
        for element in elements {
            if element.matches(selector) {
                out.push(element);
            }
            Self::collect(&element.children, selector, out);
        }
    }
}

#[derive(Debug, Default)]
pub struct FakePage {
    elements: Vec<Arc<FakeElement>>,
}

impl FakePage {
    fn push(&mut self, element: FakeElement) {
        self.elements.push(Arc::new(element));
    }

    fn find_all(&self, selector: &str) -> Vec<Arc<FakeElement>> {
        let mut found = Vec::new();
        FakeElement::collect(&self.elements, selector, &mut found);
        found.into_iter().cloned().collect()
    }
}

#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
    films: HashMap<usize, ItemRecord>,
    navigations: Mutex<Vec<String>>,
    broken_urls: HashSet<String>,
    panic_urls: HashSet<String>,
    flaky_selectors: Mutex<HashMap<String, usize>>,
}

pub fn film_url(id: usize) -> String {
    format!("{SITE}/film/{id}/")
}

/// Layout of the simulated film pages with `page_size` reviews per page
pub fn layout(page_size: usize) -> ItemPageLayout {
    ItemPageLayout {
        parent_path: String::new(),
        title_selector: ".title".to_string(),
        subtitle_selector: ".sub".to_string(),
        sub_page_path: "reviews/page/{page}/".to_string(),
        sub_page_size: page_size,
        sub_record_selector: ".review".to_string(),
        counter_selector: ".counter".to_string(),
        id_attribute: "data-id".to_string(),
        stance_id_prefix: "div_review_".to_string(),
        title_id_prefix: "ext_title_".to_string(),
        body_id_prefix: "ext_text_".to_string(),
        stance_class_index: 1,
    }
}

/// Listing of the simulated catalog, read through a result counter
pub fn listing(page_size: usize) -> ListingSpec {
    ListingSpec {
        name: "fake".to_string(),
        page_url_template: format!("{SITE}/list?page={{page}}"),
        ready_selector: ".list".to_string(),
        item_selector: ".item".to_string(),
        link: LinkSource::Href,
        page_size,
        total: TotalSource::Counter {
            selector: ".counter".to_string(),
        },
    }
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listing pages holding films `0..total`, `page_size` per page
    pub fn with_listing(mut self, total: usize, page_size: usize) -> Self {
        let spec = listing(page_size);
        let pages = total.div_ceil(page_size).max(1);
        for page in 1..=pages {
            let mut fake = FakePage::default();
            fake.push(
                FakeElement::new(".counter")
                    .text(format!("1—{} из {}", page_size.min(total), total)),
            );
            let mut list = FakeElement::new(".list");
            let first = (page - 1) * page_size;
            for index in first..(first + page_size).min(total) {
                list = list.child(FakeElement::new(".item").attr("href", format!("/film/{index}/")));
            }
            fake.push(list);
            self.pages.insert(spec.page_url(page), fake);
        }
        self
    }

    /// Film `id` with `reviews` reviews split into pages of `page_size`
    pub fn with_film(mut self, id: usize, reviews: usize, page_size: usize) -> Self {
        let url = film_url(id);
        let layout = layout(page_size);
        let title = format!("Film {id}");
        let year = 1950 + (id % 70) as i32;

        let mut parent = FakePage::default();
        parent.push(FakeElement::new(".title").text(title.clone()));
        parent.push(FakeElement::new(".sub").text(format!("Original Title {id} {year}")));
        self.pages.insert(layout.parent_url(&url), parent);

        let mut sub_records = Vec::with_capacity(reviews);
        let pages = reviews.div_ceil(page_size).max(1);
        for page in 1..=pages {
            let mut fake = FakePage::default();
            if reviews > 0 {
                fake.push(FakeElement::new(".counter").text(format!(
                    "{}—{} из {}",
                    (page - 1) * page_size + 1,
                    (page * page_size).min(reviews),
                    reviews
                )));
            }
            let first = (page - 1) * page_size;
            for index in first..(first + page_size).min(reviews) {
                let record = review(id, index);
                fake.push(review_element(id, index, &record));
                sub_records.push(record);
            }
            self.pages.insert(layout.sub_page_url(&url, page), fake);
        }

        self.films.insert(
            id,
            ItemRecord {
                title,
                release_year: year,
                source_url: url,
                sub_records,
            },
        );
        self
    }

    /// Film whose subtitle carries no year, so harvesting it fails
    pub fn with_yearless_film(mut self, id: usize) -> Self {
        let mut parent = FakePage::default();
        parent.push(FakeElement::new(".title").text(format!("Film {id}")));
        parent.push(FakeElement::new(".sub").text("Original Title"));
        self.pages.insert(film_url(id), parent);
        self
    }

    /// Remove every top-level element matching `selector` from the page at `url`
    pub fn without_elements(mut self, url: &str, selector: &str) -> Self {
        if let Some(page) = self.pages.get_mut(url) {
            page.elements.retain(|element| !element.matches(selector));
        }
        self
    }

    /// Navigating to `url` fails as if the browser connection died
    pub fn with_broken_url(mut self, url: impl Into<String>) -> Self {
        self.broken_urls.insert(url.into());
        self
    }

    /// Navigating to `url` panics the worker task
    pub fn with_panic_url(mut self, url: impl Into<String>) -> Self {
        self.panic_urls.insert(url.into());
        self
    }

    /// The next `failures` lookups of `selector` fail as if not yet rendered
    pub fn with_flaky_selector(self, selector: &str, failures: usize) -> Self {
        if let Ok(mut flaky) = self.flaky_selectors.lock() {
            flaky.insert(selector.to_string(), failures);
        }
        self
    }

    pub fn expected(&self, id: usize) -> Option<&ItemRecord> {
        self.films.get(&id)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn navigation_count(&self, predicate: impl Fn(&str) -> bool) -> usize {
        self.navigations().iter().filter(|url| predicate(url)).count()
    }

    fn take_flaky(&self, selector: &str) -> bool {
        let Ok(mut flaky) = self.flaky_selectors.lock() else {
            return false;
        };
        match flaky.get_mut(selector) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

fn review(film: usize, index: usize) -> SubRecord {
    SubRecord {
        title: format!("Review {index} of film {film}"),
        stance: STANCES[index % STANCES.len()].to_string(),
        body: format!("Body of review {index} of film {film}"),
    }
}

fn review_element(film: usize, index: usize, record: &SubRecord) -> FakeElement {
    let id = film * 10_000 + index;
    FakeElement::new(".review").attr("data-id", id.to_string()).child(
        FakeElement::new(format!("#div_review_{id}"))
            .attr("class", format!("response {}", record.stance))
            .child(FakeElement::new(format!("#ext_title_{id}")).text(record.title.clone()))
            .child(FakeElement::new(format!("#ext_text_{id}")).text(record.body.clone())),
    )
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    current: Mutex<Option<String>>,
    closed: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new(site: Arc<FakeSite>) -> Self {
        Self {
            site,
            current: Mutex::new(None),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_page<T>(&self, f: impl FnOnce(Option<&FakePage>) -> T) -> T {
        let current = self.current.lock().ok().and_then(|c| c.clone());
        f(current.as_ref().and_then(|url| self.site.pages.get(url)))
    }
}

#[async_trait]
impl PageSession for FakeSession {
    type Element = Arc<FakeElement>;

    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        if let Ok(mut navigations) = self.site.navigations.lock() {
            navigations.push(url.to_string());
        }
        if self.site.panic_urls.contains(url) {
            panic!("simulated worker crash on {url}");
        }
        if self.site.broken_urls.contains(url) {
            return Err(HarvestError::NavigationFailed {
                url: url.to_string(),
                reason: "connection closed".to_string(),
            });
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(url.to_string());
        }
        Ok(())
    }

    async fn wait_visible(&self, selector: &str, limit: Duration) -> Result<(), HarvestError> {
        let rendered = self.with_page(|page| page.is_some_and(|p| !p.find_all(selector).is_empty()));
        if rendered {
            Ok(())
        } else {
            Err(HarvestError::Timeout(limit))
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Element>, HarvestError> {
        if self.site.take_flaky(selector) {
            return Err(HarvestError::ElementNotFound(selector.to_string()));
        }
        Ok(self.with_page(|page| page.map(|p| p.find_all(selector)).unwrap_or_default()))
    }

    async fn find_one(
        &self,
        parent: Option<&Self::Element>,
        selector: &str,
    ) -> Result<Self::Element, HarvestError> {
        if self.site.take_flaky(selector) {
            return Err(HarvestError::ElementNotFound(selector.to_string()));
        }
        let found = match parent {
            Some(parent) => {
                let mut out = Vec::new();
                FakeElement::collect(&parent.children, selector, &mut out);
                out.first().map(|e| Arc::clone(e))
            }
            None => self.with_page(|page| page.and_then(|p| p.find_all(selector).into_iter().next())),
        };
        found.ok_or_else(|| HarvestError::ElementNotFound(selector.to_string()))
    }

    async fn text_of(&self, element: &Self::Element) -> Result<String, HarvestError> {
        Ok(element.text.clone())
    }

    async fn attribute_of(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<String, HarvestError> {
        element
            .attributes
            .get(name)
            .cloned()
            .ok_or_else(|| HarvestError::ElementNotFound(format!("attribute {name}")))
    }

    async fn close(&mut self) -> Result<(), HarvestError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts sessions it hands out and closes; can be told to fail
pub struct FakeFactory {
    site: Arc<FakeSite>,
    created: AtomicUsize,
    closed: Arc<AtomicUsize>,
    fail_from: Option<usize>,
}

impl FakeFactory {
    pub fn new(site: Arc<FakeSite>) -> Self {
        Self {
            site,
            created: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_from: None,
        }
    }

    /// Every creation after the first `succeed` ones fails
    pub fn failing_after(mut self, succeed: usize) -> Self {
        self.fail_from = Some(succeed);
        self
    }

    /// Creation attempts, successful or not
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn create(&self) -> Result<FakeSession, HarvestError> {
        let attempt = self.created.fetch_add(1, Ordering::SeqCst);
        if self.fail_from.is_some_and(|limit| attempt >= limit) {
            return Err(HarvestError::BrowserLaunchFailed(
                "simulated launch failure".to_string(),
            ));
        }
        Ok(FakeSession {
            site: Arc::clone(&self.site),
            current: Mutex::new(None),
            closed: Arc::clone(&self.closed),
        })
    }
}
