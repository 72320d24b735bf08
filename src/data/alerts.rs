//! Weather alerts from the Open-Meteo warnings endpoint
//!
//! Alerts are fetched fresh on every call; they are not cached.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::fetch::{FetchError, Fetcher};

/// Base URL for the Open-Meteo warnings API
pub const ALERTS_BASE_URL: &str = "https://api.open-meteo.com/v1/warnings";

/// An active weather alert for a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    /// Provider id, or `"{event}-{start}"` when the provider gave none
    pub id: String,
    pub severity: Option<String>,
    pub event: Option<String>,
    pub sender: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    pub url: Option<String>,
}

/// Coarse grouping of provider severity strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Unknown,
    Low,
    Medium,
    High,
}

impl WeatherAlert {
    pub fn level(&self) -> AlertLevel {
        match self.severity.as_deref().map(str::to_lowercase).as_deref() {
            Some("extreme" | "severe" | "warning") => AlertLevel::High,
            Some("moderate" | "watch") => AlertLevel::Medium,
            Some("minor" | "advisory" | "information") => AlertLevel::Low,
            _ => AlertLevel::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WarningsResponse {
    #[serde(default)]
    warnings: Vec<RawWarning>,
}

#[derive(Debug, Deserialize)]
struct RawWarning {
    /// Numeric or string depending on the issuing service
    id: Option<Value>,
    severity: Option<String>,
    event: Option<String>,
    sender: Option<String>,
    start: Option<String>,
    end: Option<String>,
    description: Option<String>,
    instruction: Option<String>,
    #[serde(default)]
    regions: Option<Vec<String>>,
    url: Option<String>,
}

impl From<RawWarning> for WeatherAlert {
    fn from(raw: RawWarning) -> Self {
        let id = match raw.id {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => format!(
                "{}-{}",
                raw.event.as_deref().unwrap_or("alert"),
                raw.start.as_deref().unwrap_or("unknown")
            ),
            Some(other) => other.to_string(),
        };

        WeatherAlert {
            id,
            severity: raw.severity,
            event: raw.event,
            sender: raw.sender,
            start: raw.start,
            end: raw.end,
            description: raw.description,
            instruction: raw.instruction,
            regions: raw.regions.unwrap_or_default(),
            url: raw.url,
        }
    }
}

/// Client for the warnings endpoint
#[derive(Debug, Clone)]
pub struct AlertsClient {
    fetcher: Fetcher,
    base_url: String,
}

impl AlertsClient {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_base_url(fetcher, ALERTS_BASE_URL)
    }

    pub fn with_base_url(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    /// Active alerts for the coordinates, in provider order
    pub async fn fetch_alerts(
        &self,
        lat: f64,
        lon: f64,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<WeatherAlert>, FetchError> {
        let query = [
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            ("language", "en".to_string()),
        ];

        let response: WarningsResponse = self
            .fetcher
            .get_json(&self.base_url, &query, cancel)
            .await?;

        Ok(response.warnings.into_iter().map(WeatherAlert::from).collect())
    }
}
