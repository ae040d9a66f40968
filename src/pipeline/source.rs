//! Upstream HTTP source

use crate::error::PipelineError;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tracing::info;
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("smelt/", env!("CARGO_PKG_VERSION"));

/// Where and how to fetch the source document
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base URL of the API; existing query parameters are kept
    pub base_url: String,

    /// Number of records to request via `results=<count>` (0 omits the parameter)
    pub result_count: u32,

    /// Limit on establishing the connection
    pub connect_timeout: Duration,

    /// Limit on the whole request including the body (None = no limit)
    pub timeout: Option<Duration>,

    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            base_url: String::from("https://randomuser.me/api/"),
            result_count: 100,
            connect_timeout: Duration::from_secs(10),
            timeout: None,
            user_agent: String::from(DEFAULT_USER_AGENT),
        }
    }
}

impl FetchConfig {
    /// The full request URL, with the result count appended
    pub fn request_url(&self) -> Result<Url, PipelineError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            PipelineError::Config(format!("invalid base URL {:?}: {}", self.base_url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PipelineError::Config(format!(
                "unsupported URL scheme {:?}",
                url.scheme()
            )));
        }

        if self.result_count > 0 {
            url.query_pairs_mut()
                .append_pair("results", &self.result_count.to_string());
        }

        Ok(url)
    }

    /// Build an HTTP client honoring the configured timeouts
    pub fn build_client(&self) -> Result<reqwest::Client, PipelineError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .build()
            .map_err(|e| PipelineError::transport("failed to build HTTP client", e))
    }
}

/// Body of the upstream response as a stream of raw chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, PipelineError>>;

/// Issue the GET request and hand back its body as a stream
///
/// Fails if the request cannot be sent or the response status is not a
/// success. Errors while reading the body surface as stream items.
pub async fn open_stream(
    client: &reqwest::Client,
    config: &FetchConfig,
) -> Result<ByteStream, PipelineError> {
    let url = config.request_url()?;
    info!(url = %url, "Requesting source document");

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| PipelineError::transport(format!("GET {} failed", url), e))?;

    let status = response.status();
    info!(status = status.as_u16(), "Received response headers");
    if !status.is_success() {
        return Err(PipelineError::Transport {
            context: format!("GET {} returned {}", url, status),
            source: None,
        });
    }

    let body = response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| PipelineError::transport("error reading response body", e))
    });
    Ok(body.boxed())
}
