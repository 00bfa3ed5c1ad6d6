//! # Film Harvester
//!
//! Builds a dataset of films and their user reviews by driving headless
//! Chrome sessions through a paginated, JavaScript-rendered site.
//!
//! The engine has two halves:
//!
//! - **Link discovery** ([`LinkDiscovery`]) walks a search-result listing
//!   and returns the film URLs of a skip/limit window, fetching only the
//!   listing pages the window overlaps.
//! - **Harvesting** ([`HarvestCoordinator`]) runs a fixed pool of workers,
//!   each owning one browser session, against a shared queue of film URLs.
//!   Every film page and every page of its reviews is read through
//!   [`DomRetry`], and sessions can be replaced after a fixed number of films.
//!
//! A film that cannot be read is dropped and reported, never retried. The
//! run itself only fails on invalid input or when sessions cannot be built.
//!
//! Pages are reached through the [`PageSession`] trait. [`ChromeSession`]
//! implements it on top of chromiumoxide.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use film_harvester::{
//!     pacing_from_settings, ChromeSessionFactory, Config, HarvestCoordinator,
//!     HarvestSettings, ItemPageLayout,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let settings = HarvestSettings::from_config(
//!         &config,
//!         ItemPageLayout::kinopoisk(),
//!         pacing_from_settings(&config.pacing),
//!     );
//!     let factory = Arc::new(ChromeSessionFactory::new(config.clone()));
//!     let coordinator = HarvestCoordinator::new(factory, settings)?;
//!
//!     let urls = vec!["https://www.kinopoisk.ru/film/41519/".to_string()];
//!     let films = coordinator.harvest(urls, config.pool_size, Some(20)).await?;
//!     println!("Harvested {} films", films.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! film-harvester links --listing controversial --skip 400 --limit 600 -o links.json
//! film-harvester --pool-size 2 reviews -i links.json -o reviews.json --rotate 40
//! ```

/// Configuration and settings for the harvester
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Browser session capabilities used by the engine
pub mod session;

/// Chrome implementation of the session traits
pub mod chrome;

/// Bounded retry of reads from the rendered page
pub mod retry;

/// Randomized delays between navigations
pub mod pacing;

/// Harvested film and review records
pub mod records;

/// Listing descriptions and presets
pub mod listing;

/// Navigator search query builder
pub mod query;

/// Link discovery across paginated listings
pub mod discovery;

/// Per-session harvesting of films and reviews
pub mod worker;

/// Worker pool and result merging
pub mod coordinator;

/// JSON input and output
pub mod output;

/// Command-line interface implementation
pub mod cli;

/// Harvest counters and the Prometheus exporter
pub mod metrics;

/// Utility functions and helpers
pub mod utils;

#[cfg(test)]
mod testing;


pub use chrome::*;
pub use cli::*;
pub use config::*;
pub use coordinator::*;
pub use discovery::*;
pub use error::*;
pub use listing::*;
pub use self::metrics::*;
pub use pacing::{pacing_from_settings, JitterPacing, NoPacing, PaceKind, Pacing};
pub use query::NavigatorQuery;
pub use records::*;
pub use retry::*;
pub use session::*;
pub use worker::*;
