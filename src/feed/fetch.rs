//! Feed acquisition: local files or HTTP download.

use crate::config::{FetchConfig, SupplierConfig};
use crate::error::{Error, Result};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Downloads supplier feeds over HTTP. A configured local feed file that
/// exists always wins over the URL, which keeps reruns and tests offline.
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(Policy::limited(5))
            .build()
            .map_err(|e| Error::Feed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Resolve the feed file for a supplier, downloading it when needed.
    ///
    /// Downloads land at the supplier's `feed_path` when one is configured,
    /// otherwise under `feeds_dir`.
    pub async fn fetch(&self, supplier: &SupplierConfig, feeds_dir: &Path) -> Result<PathBuf> {
        if let Some(path) = &supplier.feed_path {
            if path.exists() {
                debug!("Using local feed file {:?}", path);
                return Ok(path.clone());
            }
        }

        let url = supplier.feed_url.as_deref().ok_or_else(|| {
            Error::Feed(format!(
                "supplier '{}' has no feed: local file missing and no feed_url configured",
                supplier.name
            ))
        })?;

        let target = supplier
            .feed_path
            .clone()
            .unwrap_or_else(|| feeds_dir.join(format!("{}.xml", supplier.name)));

        self.download(url, &target).await?;
        Ok(target)
    }

    async fn download(&self, url: &str, target: &Path) -> Result<()> {
        let url = Url::parse(url)?;
        info!("Downloading feed from {}", url);

        let mut response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::Feed(format!(
                "feed download failed: HTTP {} from {}",
                response.status(),
                url
            )));
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Chunked copy so multi-hundred-MB feeds never buffer in memory
        let mut file = tokio::fs::File::create(target).await?;
        let mut bytes_written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Saved {} bytes to {:?}", bytes_written, target);
        Ok(())
    }
}

/// Hash a feed file for the sync run log. Failures are logged, never fatal.
pub fn feed_checksum(path: &Path) -> Option<String> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Cannot open feed for checksum: {}", e);
            return None;
        }
    };
    let mut hasher = blake3::Hasher::new();
    match std::io::copy(&mut file, &mut hasher) {
        Ok(_) => Some(hasher.finalize().to_hex().to_string()),
        Err(e) => {
            warn!("Cannot checksum feed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED_XML: &str = r#"<products><item><id>1</id></item></products>"#;

    fn test_fetch_config() -> FetchConfig {
        FetchConfig {
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
            user_agent: "stockroom-test".to_string(),
        }
    }

    fn supplier(url: Option<String>, path: Option<PathBuf>) -> SupplierConfig {
        SupplierConfig {
            name: "acme".to_string(),
            feed_url: url,
            feed_path: path,
            enabled: true,
            pack_attribute: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_downloads_feed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(FEED_XML.as_bytes().to_vec(), "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let tmp = TempDir::new().unwrap();
        let fetcher = FeedFetcher::new(&test_fetch_config()).unwrap();
        let sup = supplier(Some(format!("{}/feed.xml", mock_server.uri())), None);

        let feed = fetcher.fetch(&sup, tmp.path()).await.unwrap();
        assert_eq!(feed, tmp.path().join("acme.xml"));
        assert_eq!(std::fs::read_to_string(&feed).unwrap(), FEED_XML);
    }

    #[tokio::test]
    async fn test_fetch_prefers_local_file() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path().join("local.xml");
        std::fs::write(&local, FEED_XML).unwrap();

        let fetcher = FeedFetcher::new(&test_fetch_config()).unwrap();
        // URL is bogus on purpose: the local file must short-circuit it
        let sup = supplier(
            Some("http://127.0.0.1:1/feed.xml".to_string()),
            Some(local.clone()),
        );

        let feed = fetcher.fetch(&sup, tmp.path()).await.unwrap();
        assert_eq!(feed, local);
    }

    #[tokio::test]
    async fn test_fetch_http_error_is_fatal() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let tmp = TempDir::new().unwrap();
        let fetcher = FeedFetcher::new(&test_fetch_config()).unwrap();
        let sup = supplier(Some(format!("{}/feed.xml", mock_server.uri())), None);

        let err = fetcher.fetch(&sup, tmp.path()).await.unwrap_err();
        assert!(matches!(err, Error::Feed(_)));
    }

    #[tokio::test]
    async fn test_fetch_without_any_source_fails() {
        let tmp = TempDir::new().unwrap();
        let fetcher = FeedFetcher::new(&test_fetch_config()).unwrap();

        let err = fetcher
            .fetch(&supplier(None, None), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Feed(_)));
    }

    #[test]
    fn test_feed_checksum() {
        let tmp = TempDir::new().unwrap();
        let feed = tmp.path().join("feed.xml");
        std::fs::write(&feed, FEED_XML).unwrap();

        let first = feed_checksum(&feed).unwrap();
        let second = feed_checksum(&feed).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        assert!(feed_checksum(&tmp.path().join("missing.xml")).is_none());
    }
}
