use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::{CacheKey, Response, ResponseSource};

/// A response stored in a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub key: CacheKey,
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(key: CacheKey, response: Response) -> Self {
        Self {
            key,
            response,
            cached_at: Utc::now(),
        }
    }

    /// The stored response, marked as served from cache.
    pub fn to_response(&self) -> Response {
        self.response.clone().with_source(ResponseSource::Cache)
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
