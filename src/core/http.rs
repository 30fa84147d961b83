use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::error::{PackError, PackResult};

pub const APP_USER_AGENT: &str = concat!("modforge/", env!("CARGO_PKG_VERSION"));

/// Extra request headers as `(lowercase-name, value)` pairs.
pub type Headers = Vec<(&'static str, String)>;

/// Query string parameters.
pub type Query = Vec<(String, String)>;

pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .timeout(timeout)
        .build()
}

/// Everything the pipeline needs from the network.
///
/// Registry clients only talk JSON through `get_json`; binaries always go
/// through `download`, which streams straight into `dest`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, url: &str, headers: &Headers, query: &Query) -> PackResult<Value>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    /// On failure `dest` may be left partially written; callers clean up.
    async fn download(&self, url: &str, headers: &Headers, dest: &Path) -> PackResult<u64>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn header_map(headers: &Headers) -> PackResult<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let value = HeaderValue::from_str(value).map_err(|e| PackError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            map.insert(HeaderName::from_static(name), value);
        }
        Ok(map)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str, headers: &Headers, query: &Query) -> PackResult<Value> {
        let resp = self
            .client
            .get(url)
            .headers(Self::header_map(headers)?)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PackError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(resp.json::<Value>().await?)
    }

    async fn download(&self, url: &str, headers: &Headers, dest: &Path) -> PackResult<u64> {
        let response = self
            .client
            .get(url)
            .headers(Self::header_map(headers)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PackError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let mut written: u64 = 0;

        // Scope the handle so it is closed before the caller copies the file.
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(PackError::io_at(dest))?;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await.map_err(PackError::io_at(dest))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(PackError::io_at(dest))?;
        }

        debug!(
            "Downloaded {} -> {:?} ({} of {:?} bytes)",
            url, dest, written, total_bytes
        );
        Ok(written)
    }
}
