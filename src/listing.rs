//! Descriptions of paginated search-result listings
//!
//! A [`ListingSpec`] tells link discovery how to address page N of a listing,
//! when that page is ready, which elements are result entries and how an entry
//! turns into a film URL.

use crate::{HarvestError, NavigatorQuery};
use serde::{Deserialize, Serialize};
use url::Url;

pub const PAGE_PLACEHOLDER: &str = "{page}";
pub const VALUE_PLACEHOLDER: &str = "{value}";

const FILM_URL_TEMPLATE: &str = "https://www.kinopoisk.ru/film/{value}/";
const NAVIGATOR_PAGE_SUFFIX: &str = "perpage/200/page/{page}/";
const CONTROVERSIAL_BASE_URL: &str = "https://www.kinopoisk.ru/top/navigator/\
     m_act[num_vote]/1000/m_act[rating]/1:6/m_act[tomat_rating]/:60/order/num_vote/";

/// How the number of results of a listing is obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalSource {
    /// Read the trailing integer of a counter element on listing page 1
    Counter { selector: String },
    /// Catalog of known size; no navigation needed
    Fixed(usize),
}

/// How a result element becomes a film URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    /// The element's `href`, resolved against the listing page URL
    Href,
    /// An id attribute substituted into a URL template at `{value}`
    Attribute { name: String, url_template: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSpec {
    pub name: String,
    /// URL of a listing page with `{page}` standing for the 1-based page number
    pub page_url_template: String,
    /// Selector whose visibility means the page has rendered
    pub ready_selector: String,
    pub item_selector: String,
    pub link: LinkSource,
    pub page_size: usize,
    pub total: TotalSource,
}

impl ListingSpec {
    /// Results of a navigator search, 200 per page
    pub fn navigator(query: &NavigatorQuery) -> Self {
        Self::navigator_at("navigator", &query.url())
    }

    /// Films rated 6 or lower by users and 60% or lower by critics
    pub fn controversial() -> Self {
        Self::navigator_at("controversial", CONTROVERSIAL_BASE_URL)
    }

    /// The top-500 catalog, 50 per page
    pub fn top500() -> Self {
        Self {
            name: "top500".to_string(),
            page_url_template: "https://www.kinopoisk.ru/lists/movies/top500/?sort=votes&page={page}"
                .to_string(),
            ready_selector: ".styles_root__ti07r".to_string(),
            item_selector: ".styles_root__wgbNq".to_string(),
            link: LinkSource::Href,
            page_size: 50,
            total: TotalSource::Fixed(500),
        }
    }

    fn navigator_at(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            page_url_template: format!("{base_url}{NAVIGATOR_PAGE_SUFFIX}"),
            ready_selector: "#itemList".to_string(),
            item_selector: "#itemList .js-ott-widget".to_string(),
            link: LinkSource::Attribute {
                name: "data-kp-film-id".to_string(),
                url_template: FILM_URL_TEMPLATE.to_string(),
            },
            page_size: 200,
            total: TotalSource::Counter {
                selector: ".pagesFromTo".to_string(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.page_size == 0 {
            return Err(HarvestError::Validation(format!(
                "listing {} has a page size of 0",
                self.name
            )));
        }
        if !self.page_url_template.contains(PAGE_PLACEHOLDER) {
            return Err(HarvestError::Validation(format!(
                "listing {} page URL has no {PAGE_PLACEHOLDER} placeholder",
                self.name
            )));
        }
        if let LinkSource::Attribute { url_template, .. } = &self.link {
            if !url_template.contains(VALUE_PLACEHOLDER) {
                return Err(HarvestError::Validation(format!(
                    "listing {} link template has no {VALUE_PLACEHOLDER} placeholder",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn page_url(&self, page: usize) -> String {
        self.page_url_template
            .replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    /// The attribute to read from each result element
    pub fn link_attribute(&self) -> &str {
        match &self.link {
            LinkSource::Href => "href",
            LinkSource::Attribute { name, .. } => name,
        }
    }

    /// Turn a raw attribute value read on listing page `page_url` into a film URL
    pub fn resolve_link(&self, page_url: &str, raw: &str) -> Result<String, HarvestError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(HarvestError::Parse(format!(
                "empty {} on a result of {}",
                self.link_attribute(),
                self.name
            )));
        }

        match &self.link {
            LinkSource::Href => {
                let base = Url::parse(page_url).map_err(|e| {
                    HarvestError::Validation(format!("invalid listing URL {page_url}: {e}"))
                })?;
                base.join(raw)
                    .map(String::from)
                    .map_err(|e| HarvestError::Parse(format!("invalid link {raw:?}: {e}")))
            }
            LinkSource::Attribute { url_template, .. } => {
                Ok(url_template.replace(VALUE_PLACEHOLDER, raw))
            }
        }
    }
}
