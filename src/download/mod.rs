pub mod api;
pub mod manifest;
pub mod playlist;
pub mod video;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::options::Options;

#[derive(Clone)]
pub struct DownloadClient {
    client: reqwest::Client,
}

impl DownloadClient {
    pub fn new(options: &Options) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; rv:78.0) Gecko/20100101 Firefox/78.0")
            .timeout(options.http_timeout)
            .build()
            .map_err(|err| Error::http("<client>", err))?;

        Ok(Self { client })
    }

    /// Sends a GET request and fails on any non-success status.
    pub async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<Response> {
        debug!(%url, "GET");
        let request = self.client.get(url.as_str()).headers(headers.to_owned());

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%url, error = %err, "request failed");
                return Err(Error::http(url, err));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "unexpected status");
            return Err(Error::Status { url: url.to_string(), status });
        }

        Ok(response)
    }

    pub async fn download(&self, url: &Url) -> Result<Bytes> {
        self.download_header(url, &HeaderMap::new()).await
    }

    pub async fn download_header(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes> {
        let response = self.get(url, headers).await?;

        response.bytes().await.map_err(|err| Error::http(url, err))
    }

    pub async fn text(&self, url: &Url) -> Result<String> {
        let bytes = self.download(url).await?;

        String::from_utf8(bytes.to_vec()).map_err(|_| Error::Utf8 { url: url.to_string() })
    }

    pub async fn json<T: DeserializeOwned>(&self, url: &Url, headers: &HeaderMap) -> Result<T> {
        let bytes = self.download_header(url, headers).await?;

        serde_json::from_slice(&bytes).map_err(|source| Error::Json { url: url.to_string(), source })
    }

    /// Starts a GET request without judging the status, segment fetches decide themselves.
    pub async fn send(&self, url: &Url) -> Result<Response> {
        self.client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| Error::http(url, err))
    }
}

/// Resolves `path` against one of the configured service roots.
pub fn endpoint(base: &Url, path: &str) -> Result<Url> {
    Ok(base.join(path)?)
}
