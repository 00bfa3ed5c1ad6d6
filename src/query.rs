//! Search-navigator query builder
//!
//! Turns filter criteria into the path-style navigator URL of the site, e.g.
//! `.../top/navigator/m_act[num_vote]/10/m_act[rating]/1:10/.../order/num_vote/`.
//! Out-of-domain values are rejected when set, never clamped.

use crate::HarvestError;
use serde::{Deserialize, Serialize};

pub const NAVIGATOR_BASE_URL: &str = "https://www.kinopoisk.ru/top/navigator/";
const RESULTS_ORDER_PART: &str = "order/num_vote/";

pub const MIN_VOTES_FLOOR: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigatorQuery {
    min_votes: u32,
    rating: (f32, f32),
    critics_rating: (u8, u8),
    imdb_rating: (f32, f32),
    positive_reviews_percent: (u8, u8),
}

impl Default for NavigatorQuery {
    fn default() -> Self {
        Self {
            min_votes: MIN_VOTES_FLOOR,
            rating: (1.0, 10.0),
            critics_rating: (0, 100),
            imdb_rating: (1.0, 10.0),
            positive_reviews_percent: (0, 100),
        }
    }
}

fn check_range<T: PartialOrd + std::fmt::Display + Copy>(
    what: &str,
    (min, max): (T, T),
    low: T,
    high: T,
) -> Result<(), HarvestError> {
    // `contains` is false for NaN, so unordered floats are rejected too
    let domain = low..=high;
    if !domain.contains(&min) {
        return Err(HarvestError::Validation(format!(
            "the minimum {what} must be in range {low} to {high}, got {min}"
        )));
    }
    if !domain.contains(&max) {
        return Err(HarvestError::Validation(format!(
            "the maximum {what} must be in range {low} to {high}, got {max}"
        )));
    }
    if min > max {
        return Err(HarvestError::Validation(format!(
            "the minimum {what} must not exceed the maximum ({min} > {max})"
        )));
    }
    Ok(())
}

impl NavigatorQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_votes(mut self, votes: u32) -> Result<Self, HarvestError> {
        if votes < MIN_VOTES_FLOOR {
            return Err(HarvestError::Validation(format!(
                "the minimum possible number of votes is {MIN_VOTES_FLOOR}, got {votes}"
            )));
        }
        self.min_votes = votes;
        Ok(self)
    }

    pub fn rating(mut self, min: f32, max: f32) -> Result<Self, HarvestError> {
        check_range("rating", (min, max), 1.0, 10.0)?;
        self.rating = (min, max);
        Ok(self)
    }

    pub fn critics_rating(mut self, min: u8, max: u8) -> Result<Self, HarvestError> {
        check_range("critics rating", (min, max), 0, 100)?;
        self.critics_rating = (min, max);
        Ok(self)
    }

    pub fn imdb_rating(mut self, min: f32, max: f32) -> Result<Self, HarvestError> {
        check_range("IMDb rating", (min, max), 1.0, 10.0)?;
        self.imdb_rating = (min, max);
        Ok(self)
    }

    pub fn positive_reviews_percent(mut self, min: u8, max: u8) -> Result<Self, HarvestError> {
        check_range("percentage of positive reviews", (min, max), 0, 100)?;
        self.positive_reviews_percent = (min, max);
        Ok(self)
    }

    pub fn url(&self) -> String {
        let mut url = String::from(NAVIGATOR_BASE_URL);
        url.push_str(&format!("m_act[num_vote]/{}/", self.min_votes));
        url.push_str(&format!("m_act[rating]/{}:{}/", self.rating.0, self.rating.1));
        url.push_str(&format!(
            "m_act[tomat_rating]/{}:{}/",
            self.critics_rating.0, self.critics_rating.1
        ));
        url.push_str(&format!(
            "m_act[review_procent]/{}:{}/",
            self.positive_reviews_percent.0, self.positive_reviews_percent.1
        ));
        url.push_str(&format!(
            "m_act[ex_rating]/{}:{}/",
            self.imdb_rating.0, self.imdb_rating.1
        ));
        url.push_str(RESULTS_ORDER_PART);
        url
    }
}

/// Parse a `min:max` pair as given on the command line
pub fn parse_range<T: std::str::FromStr>(text: &str) -> Result<(T, T), HarvestError> {
    let (min, max) = text
        .split_once(':')
        .ok_or_else(|| HarvestError::Validation(format!("expected min:max, got {text:?}")))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<T>()
            .map_err(|_| HarvestError::Validation(format!("{part:?} is not a valid bound")))
    };
    Ok((parse(min)?, parse(max)?))
}
