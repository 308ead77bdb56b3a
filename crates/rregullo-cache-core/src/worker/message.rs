//! Cross-context messages posted to the worker by pages.

use serde::Deserialize;
use serde_json::Value;
use url::{Origin, Url};

/// A message event: payload plus the origin the sender claims.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub origin: String,
    pub data: Value,
}

impl MessageEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }

    /// The claimed origin, if it parses as a network origin.
    pub fn parsed_origin(&self) -> Option<Origin> {
        let origin = Url::parse(&self.origin).ok()?.origin();
        origin.is_tuple().then_some(origin)
    }
}

/// Payloads the worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// `{ "type": "SKIP_WAITING" }`
    SkipWaiting,
}

impl ClientMessage {
    pub fn parse(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// What the worker did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Origin not allow-listed; nothing changed.
    Untrusted,
    /// Trusted origin, payload not understood; nothing changed.
    Unrecognized,
    /// Skip-waiting accepted. `activated` is true if the worker took over.
    SkipWaiting { activated: bool },
}
