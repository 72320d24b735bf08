//! Open-Meteo air-quality client
//!
//! Fetches hourly PM2.5 and converts the reading nearest to now into a US EPA
//! Air Quality Index using the PM2.5 breakpoint table.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::weather::{nearest_hour_index, parse_local_datetime};
use crate::fetch::{FetchError, Fetcher};

/// Base URL for the Open-Meteo air-quality API
pub const AIR_QUALITY_BASE_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";

/// One segment of the EPA PM2.5 table: concentration range → index range
struct Breakpoint {
    c_low: f64,
    c_high: f64,
    aqi_low: f64,
    aqi_high: f64,
}

const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    Breakpoint { c_low: 0.0, c_high: 12.0, aqi_low: 0.0, aqi_high: 50.0 },
    Breakpoint { c_low: 12.1, c_high: 35.4, aqi_low: 51.0, aqi_high: 100.0 },
    Breakpoint { c_low: 35.5, c_high: 55.4, aqi_low: 101.0, aqi_high: 150.0 },
    Breakpoint { c_low: 55.5, c_high: 150.4, aqi_low: 151.0, aqi_high: 200.0 },
    Breakpoint { c_low: 150.5, c_high: 250.4, aqi_low: 201.0, aqi_high: 300.0 },
    Breakpoint { c_low: 250.5, c_high: 350.4, aqi_low: 301.0, aqi_high: 400.0 },
    Breakpoint { c_low: 350.5, c_high: 500.4, aqi_low: 401.0, aqi_high: 500.0 },
];

/// Convert a PM2.5 concentration (µg/m³) to an AQI value
///
/// Returns `None` when the concentration falls outside every segment, including
/// the small gaps between segments (e.g. 12.05) and anything above 500.4.
pub fn pm25_to_aqi(pm25: f64) -> Option<u16> {
    let segment = PM25_BREAKPOINTS
        .iter()
        .find(|b| pm25 >= b.c_low && pm25 <= b.c_high)?;

    let aqi = (segment.aqi_high - segment.aqi_low) / (segment.c_high - segment.c_low)
        * (pm25 - segment.c_low)
        + segment.aqi_low;

    Some(aqi.round() as u16)
}

/// Air-quality response from Open-Meteo
#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    #[serde(default)]
    hourly: Option<AirQualityHourly>,
}

#[derive(Debug, Deserialize)]
struct AirQualityHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    pm2_5: Vec<Option<f64>>,
}

/// Client for the air-quality endpoint
#[derive(Debug, Clone)]
pub struct AirQualityClient {
    fetcher: Fetcher,
    base_url: String,
}

impl AirQualityClient {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_base_url(fetcher, AIR_QUALITY_BASE_URL)
    }

    pub fn with_base_url(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    /// Fetch PM2.5 and compute the AQI for the hour closest to `now`
    ///
    /// `Ok(None)` means upstream had no usable reading.
    pub async fn fetch_aqi(
        &self,
        lat: f64,
        lon: f64,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<u16>, FetchError> {
        let query = [
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            ("hourly", "pm2_5".to_string()),
            ("timezone", "auto".to_string()),
        ];

        let response: AirQualityResponse = self
            .fetcher
            .get_json(&self.base_url, &query, cancel)
            .await?;

        Ok(aqi_from_response(&response, now))
    }
}

fn aqi_from_response(response: &AirQualityResponse, now: DateTime<Utc>) -> Option<u16> {
    let hourly = response.hourly.as_ref()?;
    if hourly.pm2_5.is_empty() {
        return None;
    }

    let times = hourly
        .time
        .iter()
        .map(|t| parse_local_datetime(t))
        .collect::<Option<Vec<_>>>();
    let Some(times) = times else {
        tracing::debug!("air-quality series has unparseable timestamps");
        return None;
    };

    let index = nearest_hour_index(&times, response.utc_offset_seconds, now)?;
    let pm25 = hourly.pm2_5.get(index).copied().flatten()?;
    pm25_to_aqi(pm25)
}
