//! Network module.
//!
//! The cache manager only talks to the network through the `Fetcher`
//! trait, so hosts can plug in a real HTTP client (`HttpFetcher`) or a
//! scripted one in tests.

pub mod error;
pub mod fetcher;

pub use error::FetchError;
pub use fetcher::{Fetcher, HttpFetcher, DEFAULT_REQUEST_TIMEOUT_SECS};
