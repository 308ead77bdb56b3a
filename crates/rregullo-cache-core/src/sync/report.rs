use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issue report captured while offline, waiting to be submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReport {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Local bookkeeping, not sent to the server.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl PendingReport {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: new_report_id(),
            title: title.into(),
            description: description.into(),
            category: category.into(),
            latitude: None,
            longitude: None,
            address: None,
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// The body posted to the report endpoint.
    pub fn submission(&self) -> ReportSubmission<'_> {
        ReportSubmission {
            client_id: &self.id,
            title: &self.title,
            description: &self.description,
            category: &self.category,
            latitude: self.latitude,
            longitude: self.longitude,
            address: self.address.as_deref(),
            created_at: self.created_at,
        }
    }
}

/// Wire form of a report. The local id travels as `clientId` so the server
/// can deduplicate a report delivered twice.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSubmission<'a> {
    pub client_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

fn new_report_id() -> String {
    format!(
        "{}-{:08x}",
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::random::<u32>()
    )
}
