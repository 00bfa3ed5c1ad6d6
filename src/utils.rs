use crate::HarvestError;
use std::time::Duration;
use url::Url;

/// Number of fetches needed for `count` items, `per_page` at a time
pub fn ceil_div(count: usize, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    count.div_ceil(per_page)
}

/// Parse the last whitespace-delimited token of `text` as an integer
///
/// Used for "1-200 of 4567" counters and for "The Original Title, 2011"
/// breadcrumbs, which end with the number of interest.
pub fn parse_trailing_int<T: std::str::FromStr>(text: &str) -> Result<T, HarvestError> {
    let token = text
        .split_whitespace()
        .last()
        .ok_or_else(|| HarvestError::Parse(format!("no numeric token in {text:?}")))?;

    let digits = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '-');
    digits
        .parse::<T>()
        .map_err(|_| HarvestError::Parse(format!("{token:?} is not a number (in {text:?})")))
}

/// The `index`-th whitespace-separated word of an element's `class` attribute
pub fn class_token(class_attr: &str, index: usize) -> Result<String, HarvestError> {
    class_attr
        .split_whitespace()
        .nth(index)
        .map(str::to_string)
        .ok_or_else(|| {
            HarvestError::Parse(format!("class attribute {class_attr:?} has no token {index}"))
        })
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

/// Parse `url` and accept it only for the http and https schemes
pub fn validate_url(url: &str) -> Result<Url, HarvestError> {
    let parsed = Url::parse(url)
        .map_err(|e| HarvestError::Validation(format!("{url:?} is not a URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(HarvestError::Validation(format!(
            "unsupported scheme {scheme:?} in {url:?}, expected http or https"
        ))),
    }
}

/// Join a page-relative suffix onto a film URL, tolerating a missing `/`
pub fn join_path(base: &str, suffix: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{suffix}")
    } else {
        format!("{base}/{suffix}")
    }
}
