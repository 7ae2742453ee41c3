//! Suspicious-ASN feed loader
//!
//! Loads the externally maintained suspicious-ASN list, a JSON array of
//! integers, from a local file or an HTTP(S) URL. The feed is loaded once
//! before a run starts. A fetch or parse failure is reported to the operator
//! log and degrades to an empty set; it never aborts ingestion.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::FeedConfig;

/// Fetch and parse the feed. Local path takes precedence over URL; with
/// neither configured the set is empty.
pub async fn fetch_suspicious_asns(config: &FeedConfig) -> Result<HashSet<i64>> {
    if let Some(path) = &config.path {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ASN feed: {}", path))?;
        return parse_feed(&data);
    }

    if let Some(url) = &config.url {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("logsift/0.1")
            .build()?;

        let data = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch ASN feed: {}", url))?
            .error_for_status()?
            .text()
            .await?;
        return parse_feed(&data);
    }

    Ok(HashSet::new())
}

fn parse_feed(data: &str) -> Result<HashSet<i64>> {
    let asns: Vec<i64> = serde_json::from_str(data).context("ASN feed is not a JSON integer array")?;
    Ok(asns.into_iter().collect())
}

/// Load the feed, degrading to an empty set on any failure
pub async fn load_or_empty(config: &FeedConfig) -> HashSet<i64> {
    match fetch_suspicious_asns(config).await {
        Ok(asns) => {
            if !asns.is_empty() {
                info!("Loaded {} suspicious ASNs", asns.len());
            }
            asns
        }
        Err(e) => {
            warn!("Suspicious-ASN feed unavailable, continuing without ASN rule: {:#}", e);
            HashSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_feed() {
        let asns = parse_feed("[4134, 4837, 9808]").unwrap();
        assert_eq!(asns.len(), 3);
        assert!(asns.contains(&4134));
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        assert!(parse_feed("not json").is_err());
        assert!(parse_feed(r#"{"asns": [1]}"#).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[100, 200]").unwrap();

        let config = FeedConfig {
            path: Some(file.path().to_string_lossy().into_owned()),
            url: None,
            timeout_secs: 10,
        };
        let asns = load_or_empty(&config).await;
        assert_eq!(asns.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_feed_degrades_to_empty() {
        let config = FeedConfig {
            path: Some("/nonexistent/asn-blocklist.json".to_string()),
            url: None,
            timeout_secs: 10,
        };
        let asns = load_or_empty(&config).await;
        assert!(asns.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_feed_is_empty() {
        let asns = load_or_empty(&FeedConfig::default()).await;
        assert!(asns.is_empty());
    }
}
