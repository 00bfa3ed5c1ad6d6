//! Reading URL lists and writing harvested data as JSON

use crate::utils::validate_url;
use crate::HarvestError;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// Serialize `value` to `path`, creating missing parent directories
pub async fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    pretty: bool,
) -> Result<(), HarvestError> {
    let json = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &json).await?;

    debug!("Wrote {} bytes to {}", json.len(), path.display());
    Ok(())
}

/// Load a URL list from a JSON array or from plain text, one URL per line
///
/// Blank lines and `#` comments are ignored. Entries that are not http(s)
/// URLs are skipped with a warning.
pub async fn read_url_list(path: &Path) -> Result<Vec<String>, HarvestError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_url_list(&content)
}

pub fn parse_url_list(content: &str) -> Result<Vec<String>, HarvestError> {
    let raw: Vec<String> = if content.trim_start().starts_with('[') {
        serde_json::from_str(content)?
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    Ok(raw
        .into_iter()
        .filter_map(|entry| {
            let entry = entry.trim();
            match validate_url(entry) {
                Ok(_) => Some(entry.to_string()),
                Err(e) => {
                    warn!("Skipping invalid URL {:?}: {}", entry, e);
                    None
                }
            }
        })
        .collect())
}
