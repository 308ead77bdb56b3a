//! Request and response values exchanged between the host, the cache
//! manager and the network.
//!
//! These are plain owned values: a response captured from the network can
//! be cloned into a cache bucket and handed back to the caller unchanged.

use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// Status used for the synthetic response returned when neither the cache
/// nor the network can answer a sub-resource request.
pub const TIMEOUT_STATUS: u16 = 408;

const TIMEOUT_STATUS_TEXT: &str = "Request Timeout";

/// How the page issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Full-page navigation.
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            mode: RequestMode::default(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A sub-resource GET.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A full-page navigation GET.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.url)
    }
}

/// Key of a cache bucket entry: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
}

impl CacheKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.into(),
        }
    }

    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Where a response handed back to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseSource {
    #[default]
    Network,
    Cache,
    /// The stored offline page, served for a failed navigation.
    OfflineFallback,
    /// Generated locally because nothing else could answer.
    Synthetic,
}

/// A captured HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    #[serde(skip)]
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// A bare 200 response, mostly useful for hosts and tests.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let mut response = Self::new(200, body);
        response.status_text = "OK".to_string();
        response
    }

    /// Timeout-class response with an empty body.
    pub fn timeout() -> Self {
        Self {
            status: TIMEOUT_STATUS,
            status_text: TIMEOUT_STATUS_TEXT.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            source: ResponseSource::Synthetic,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
