use crate::output::{read_url_list, write_json};
use crate::pacing::pacing_from_settings;
use crate::query::parse_range;
use crate::{
    ChromeSessionFactory, Config, DomRetry, HarvestCoordinator, HarvestError, HarvestReport,
    HarvestSettings, ItemPageLayout, LinkDiscovery, ListingSpec, NavigatorQuery, PageSession,
    SessionFactory, WindowSpec,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "film-harvester")]
#[command(about = "Harvest films and their user reviews from paginated listings")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Number of concurrent browser sessions")]
    pub pool_size: Option<usize>,

    #[arg(long, help = "Navigation timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Serve Prometheus metrics on this port")]
    pub metrics_port: Option<u16>,

    #[arg(long, help = "Write compact instead of indented JSON")]
    pub compact: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect film links from a listing
    Links {
        #[command(flatten)]
        listing: ListingArgs,

        #[arg(short, long, help = "Output file for the links (JSON array)")]
        output: PathBuf,
    },

    /// Harvest films and reviews for a list of film links
    Reviews {
        #[arg(short, long, help = "Input file: JSON array or one URL per line")]
        input: PathBuf,

        #[arg(short, long, help = "Output file for the harvested films")]
        output: PathBuf,

        #[arg(long, help = "Replace each browser session after this many films")]
        rotate: Option<usize>,

        #[arg(long, help = "Also write the run report to this file")]
        report: Option<PathBuf>,
    },

    /// Collect links, then harvest them in one run
    Crawl {
        #[command(flatten)]
        listing: ListingArgs,

        #[arg(long, help = "Also write the collected links to this file")]
        links_output: Option<PathBuf>,

        #[arg(short, long, help = "Output file for the harvested films")]
        output: PathBuf,

        #[arg(long, help = "Replace each browser session after this many films")]
        rotate: Option<usize>,

        #[arg(long, help = "Also write the run report to this file")]
        report: Option<PathBuf>,
    },

    /// Validate a configuration file and print the effective settings
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListingKind {
    /// The top-500 catalog
    Top500,
    /// Low user rating and low critics rating
    Controversial,
    /// Navigator search built from the filter flags
    Navigator,
}

#[derive(Args, Debug, Clone)]
pub struct ListingArgs {
    #[arg(long, value_enum, default_value = "top500")]
    pub listing: ListingKind,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true, help = "Results to skip")]
    pub skip: i64,

    #[arg(long, allow_negative_numbers = true, help = "Maximum number of links")]
    pub limit: Option<i64>,

    #[arg(long, help = "Navigator: minimum number of votes")]
    pub min_votes: Option<u32>,

    #[arg(long, help = "Navigator: user rating range, e.g. 1:6")]
    pub rating: Option<String>,

    #[arg(long, help = "Navigator: critics rating range, e.g. 0:60")]
    pub critics_rating: Option<String>,

    #[arg(long, help = "Navigator: IMDb rating range, e.g. 7:10")]
    pub imdb_rating: Option<String>,

    #[arg(long, help = "Navigator: positive review percentage range, e.g. 50:100")]
    pub positive_reviews: Option<String>,
}

impl ListingArgs {
    pub fn window(&self) -> Result<WindowSpec, HarvestError> {
        WindowSpec::new(self.skip, self.limit)
    }

    fn has_filters(&self) -> bool {
        self.min_votes.is_some()
            || self.rating.is_some()
            || self.critics_rating.is_some()
            || self.imdb_rating.is_some()
            || self.positive_reviews.is_some()
    }

    pub fn listing_spec(&self) -> Result<ListingSpec, HarvestError> {
        if self.listing != ListingKind::Navigator && self.has_filters() {
            warn!("Filter flags only apply to --listing navigator and are ignored");
        }

        match self.listing {
            ListingKind::Top500 => Ok(ListingSpec::top500()),
            ListingKind::Controversial => Ok(ListingSpec::controversial()),
            ListingKind::Navigator => Ok(ListingSpec::navigator(&self.query()?)),
        }
    }

    pub fn query(&self) -> Result<NavigatorQuery, HarvestError> {
        let mut query = NavigatorQuery::new();
        if let Some(votes) = self.min_votes {
            query = query.min_votes(votes)?;
        }
        if let Some(range) = &self.rating {
            let (min, max) = parse_range::<f32>(range)?;
            query = query.rating(min, max)?;
        }
        if let Some(range) = &self.critics_rating {
            let (min, max) = parse_range::<u8>(range)?;
            query = query.critics_rating(min, max)?;
        }
        if let Some(range) = &self.imdb_rating {
            let (min, max) = parse_range::<f32>(range)?;
            query = query.imdb_rating(min, max)?;
        }
        if let Some(range) = &self.positive_reviews {
            let (min, max) = parse_range::<u8>(range)?;
            query = query.positive_reviews_percent(min, max)?;
        }
        Ok(query)
    }
}

/// Load the configuration file if one was given, then apply flag overrides
pub async fn load_config(args: &Cli) -> Result<Config, HarvestError> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path).await?,
        None => Config::default(),
    };

    if let Some(pool_size) = args.pool_size {
        config.pool_size = pool_size;
    }
    if let Some(timeout) = args.timeout {
        config.navigation_timeout = Duration::from_secs(timeout);
    }
    if let Some(chrome_path) = &args.chrome_path {
        config.browser.chrome_path = Some(chrome_path.clone());
    }

    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Pool size: {}", config.pool_size);
    info!("Navigation timeout: {:?}", config.navigation_timeout);
    if let Some(frequency) = config.rotation_frequency {
        info!("Rotating sessions every {} films", frequency);
    }

    Ok(config)
}

pub struct CliRunner {
    pub config: Config,
    pretty: bool,
}

impl CliRunner {
    pub fn new(config: Config, args: &Cli) -> Self {
        Self {
            config,
            pretty: !args.compact,
        }
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Links { listing, output } => {
                let links = self.collect_links(&listing).await?;
                write_json(&output, &links, self.pretty).await?;
                info!("Wrote {} links to {}", links.len(), output.display());
            }
            Commands::Reviews {
                input,
                output,
                rotate,
                report,
            } => {
                let urls = read_url_list(&input).await?;
                info!("Loaded {} URLs from {}", urls.len(), input.display());
                self.harvest(urls, rotate, &output, report.as_deref()).await?;
            }
            Commands::Crawl {
                listing,
                links_output,
                output,
                rotate,
                report,
            } => {
                let links = self.collect_links(&listing).await?;
                if let Some(path) = &links_output {
                    write_json(path, &links, self.pretty).await?;
                    info!("Wrote {} links to {}", links.len(), path.display());
                }
                self.harvest(links, rotate, &output, report.as_deref()).await?;
            }
            Commands::Validate { config } => {
                let loaded = Config::from_json_file(&config).await?;
                loaded.validate()?;
                println!("Configuration is valid:");
                println!("{}", serde_json::to_string_pretty(&loaded)?);
            }
        }

        Ok(())
    }

    async fn collect_links(&self, args: &ListingArgs) -> Result<Vec<String>, HarvestError> {
        let window = args.window()?;
        let discovery = LinkDiscovery::new(
            args.listing_spec()?,
            DomRetry::new(self.config.dom_query_attempts),
            pacing_from_settings(&self.config.pacing),
            self.config.navigation_timeout,
        )?;
        info!(
            "Collecting links from {} (skip {}, limit {:?})",
            discovery.listing().name,
            window.skip(),
            window.limit()
        );

        let factory = ChromeSessionFactory::new(self.config.clone());
        let mut session = factory.create().await?;
        let links = discovery.discover(&session, window).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close discovery session: {}", e);
        }

        links
    }

    async fn harvest(
        &self,
        urls: Vec<String>,
        rotate: Option<usize>,
        output: &Path,
        report_path: Option<&Path>,
    ) -> Result<HarvestReport, HarvestError> {
        let settings = HarvestSettings::from_config(
            &self.config,
            ItemPageLayout::kinopoisk(),
            pacing_from_settings(&self.config.pacing),
        );
        let factory = Arc::new(ChromeSessionFactory::new(self.config.clone()));
        let coordinator = HarvestCoordinator::new(factory, settings)?;

        let report = coordinator
            .harvest_with_report(
                urls,
                self.config.pool_size,
                rotate.or(self.config.rotation_frequency),
            )
            .await?;

        write_json(output, &report.records, self.pretty).await?;
        if let Some(path) = report_path {
            write_json(path, &report, self.pretty).await?;
        }

        let reviews: usize = report.records.iter().map(|r| r.sub_records.len()).sum();
        info!(
            "Harvested {} films with {} reviews into {} ({} dropped)",
            report.harvested(),
            reviews,
            output.display(),
            report.dropped.len()
        );

        Ok(report)
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_links_command() {
        let cli = parse(&[
            "film-harvester",
            "--pool-size",
            "3",
            "links",
            "--listing",
            "controversial",
            "--skip",
            "400",
            "--limit",
            "600",
            "-o",
            "links.json",
        ]);
        assert_eq!(cli.pool_size, Some(3));
        match cli.command {
            Commands::Links { listing, output } => {
                assert_eq!(listing.listing, ListingKind::Controversial);
                assert_eq!(listing.window().unwrap(), WindowSpec::new(400, Some(600)).unwrap());
                assert_eq!(output, PathBuf::from("links.json"));
            }
            _ => panic!("expected links command"),
        }
    }

    #[test]
    fn test_negative_skip_rejected_by_window() {
        let cli = parse(&["film-harvester", "links", "--skip", "-1", "-o", "l.json"]);
        match cli.command {
            Commands::Links { listing, .. } => {
                assert!(matches!(listing.window(), Err(HarvestError::Validation(_))));
            }
            _ => panic!("expected links command"),
        }
    }

    #[test]
    fn test_navigator_filters_build_query() {
        let cli = parse(&[
            "film-harvester",
            "links",
            "--listing",
            "navigator",
            "--min-votes",
            "1000",
            "--rating",
            "1:6",
            "--critics-rating",
            "0:60",
            "-o",
            "l.json",
        ]);
        let Commands::Links { listing, .. } = cli.command else {
            panic!("expected links command");
        };
        let spec = listing.listing_spec().unwrap();
        assert!(spec.page_url(1).contains("m_act[num_vote]/1000/"));
        assert!(spec.page_url(1).contains("m_act[rating]/1:6/"));
        assert!(spec.page_url(1).contains("m_act[tomat_rating]/0:60/"));
    }

    #[test]
    fn test_out_of_domain_filter_rejected() {
        let cli = parse(&[
            "film-harvester",
            "links",
            "--listing",
            "navigator",
            "--rating",
            "0:11",
            "-o",
            "l.json",
        ]);
        let Commands::Links { listing, .. } = cli.command else {
            panic!("expected links command");
        };
        assert!(listing.listing_spec().is_err());
    }

    #[test]
    fn test_parse_reviews_command() {
        let cli = parse(&[
            "film-harvester",
            "--compact",
            "reviews",
            "-i",
            "links.json",
            "-o",
            "reviews.json",
            "--rotate",
            "2",
        ]);
        assert!(cli.compact);
        match cli.command {
            Commands::Reviews { rotate, report, .. } => {
                assert_eq!(rotate, Some(2));
                assert!(report.is_none());
            }
            _ => panic!("expected reviews command"),
        }
    }

    #[tokio::test]
    async fn test_load_config_applies_overrides() {
        let cli = parse(&[
            "film-harvester",
            "--pool-size",
            "2",
            "--timeout",
            "15",
            "--chrome-path",
            "/usr/bin/chromium",
            "validate",
            "-c",
            "config.json",
        ]);
        let config = load_config(&cli).await.unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.navigation_timeout, Duration::from_secs(15));
        assert_eq!(config.browser.chrome_path.as_deref(), Some("/usr/bin/chromium"));
    }

    #[tokio::test]
    async fn test_load_config_rejects_zero_pool() {
        let cli = parse(&["film-harvester", "--pool-size", "0", "validate", "-c", "x.json"]);
        assert!(load_config(&cli).await.is_err());
    }
}
