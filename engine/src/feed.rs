use crate::{
    error::AppError,
    reputation::hostname,
    types::{FeedReport, ThreatLevel},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where the phishing feed comes from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>, AppError>;
}

pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<Vec<u8>, AppError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AppError::Internal(format!(
                "feed download from {} returned {}",
                self.url, status
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// On-disk cache of the PhishTank CSV.
///
/// The file's mtime is the only freshness state. A lookup against a stale
/// cache makes one download attempt; if that fails the old file is used as is.
pub struct FeedCache {
    source: Arc<dyn FeedSource>,
    path: PathBuf,
    max_age: Duration,
    refresh_lock: Mutex<()>,
}

impl FeedCache {
    pub fn new(source: Arc<dyn FeedSource>, path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            source,
            path: path.into(),
            max_age,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_fresh(&self) -> bool {
        match tokio::fs::metadata(&self.path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified.elapsed().unwrap_or(Duration::ZERO) < self.max_age,
            Err(_) => false,
        }
    }

    /// Returns whether a download was attempted.
    pub async fn refresh_if_stale(&self) -> bool {
        let _guard = self.refresh_lock.lock().await;
        if self.is_fresh().await {
            debug!("PhishTank cache at {} is fresh", self.path.display());
            return false;
        }
        self.download().await;
        true
    }

    async fn download(&self) {
        match self.source.fetch().await {
            Ok(body) => match self.replace_cache(&body).await {
                Ok(()) => {
                    metrics::counter!("feed_refresh_total", "outcome" => "success").increment(1);
                    info!("PhishTank feed downloaded and cached ({} bytes)", body.len());
                }
                Err(e) => {
                    metrics::counter!("feed_refresh_total", "outcome" => "write_error").increment(1);
                    warn!("Failed to write PhishTank cache {}: {}", self.path.display(), e);
                }
            },
            Err(e) => {
                metrics::counter!("feed_refresh_total", "outcome" => "download_error").increment(1);
                warn!("Error downloading PhishTank feed: {}", e);
            }
        }
    }

    async fn replace_cache(&self, body: &[u8]) -> std::io::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }

    pub async fn lookup(&self, url: &str) -> Result<FeedReport, AppError> {
        self.refresh_if_stale().await;

        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(AppError::FeedUnavailable);
        }

        let domain = hostname(url)
            .ok_or_else(|| AppError::InvalidUrl(format!("no hostname in {:?}", url)))?;

        let path = self.path.clone();
        let query = url.trim().to_lowercase();
        let host = domain.clone();
        let found = tokio::task::spawn_blocking(move || scan_feed(&path, &query, &host))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .map_err(|e| AppError::FeedProcessing(e.to_string()))?;

        let (threat_level, details) = if found {
            (ThreatLevel::High, "URL found in PhishTank feed. Likely a phishing site.")
        } else {
            (ThreatLevel::Low, "URL not found in PhishTank feed.")
        };

        Ok(FeedReport {
            url: url.to_string(),
            domain,
            threat_level,
            details: details.to_string(),
        })
    }
}

/// Linear scan of the cached CSV; first matching row wins.
fn scan_feed(path: &Path, url: &str, domain: &str) -> Result<bool, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let Some(url_column) = reader
        .byte_headers()?
        .iter()
        .position(|h| String::from_utf8_lossy(h).trim() == "url")
    else {
        warn!("PhishTank cache {} has no url column", path.display());
        return Ok(false);
    };

    // Rows are scanned as bytes so one badly encoded row cannot fail the whole lookup.
    for row in reader.byte_records() {
        let row = row?;
        let cached = String::from_utf8_lossy(row.get(url_column).unwrap_or_default())
            .trim()
            .to_lowercase();
        if is_match(&cached, url, domain) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Exact URL match, or the cached URL points at the same host.
fn is_match(cached: &str, url: &str, domain: &str) -> bool {
    if cached.is_empty() {
        return false;
    }
    cached == url || hostname(cached).is_some_and(|host| host == domain)
}
