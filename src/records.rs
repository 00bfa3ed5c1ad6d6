//! Harvested records
//!
//! Field names on the wire follow the published dataset format
//! (`film_title`, `film_reviews`, ...), not the Rust names.

use serde::{Deserialize, Serialize};

/// One harvested film with all of its reviews
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(rename = "film_title")]
    pub title: String,

    #[serde(rename = "year_of_release")]
    pub release_year: i32,

    #[serde(rename = "film_url")]
    pub source_url: String,

    #[serde(rename = "film_reviews")]
    pub sub_records: Vec<SubRecord>,
}

/// One user review
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubRecord {
    pub title: String,

    /// Review polarity as tagged by the site (`good`, `bad`, `neutral`, ...)
    #[serde(rename = "review_opinion")]
    pub stance: String,

    #[serde(rename = "text")]
    pub body: String,
}
