//! Network access for the cache manager.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use crate::http::{Request, Response, ResponseSource};

use super::FetchError;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Issues requests to the network on behalf of the cache manager.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Fetcher backed by a shared reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();

        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| *name != header::SET_COOKIE)
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await?.to_vec();

        debug!(
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            "Network response received"
        );

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}
