//! Core data models for the weather dashboard
//!
//! This module contains the data types shared by the geocoder, the weather
//! normalizer and the derived-signal helpers.

pub mod air_quality;
pub mod alerts;
pub mod geocode;
pub mod weather;

pub use air_quality::{pm25_to_aqi, AirQualityClient};
pub use alerts::{AlertLevel, AlertsClient, WeatherAlert};
pub use geocode::{parse_query, GeocodeClient, GeocodeError, ParsedQuery};
pub use weather::{WeatherClient, WeatherError};

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Unit system requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    /// Provider selector for temperatures
    pub fn temperature_unit(&self) -> &'static str {
        match self {
            Units::Metric => "celsius",
            Units::Imperial => "fahrenheit",
        }
    }

    /// Provider selector for wind speeds
    pub fn wind_speed_unit(&self) -> &'static str {
        match self {
            Units::Metric => "kmh",
            Units::Imperial => "mph",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "metric" | "c" | "celsius" => Ok(Units::Metric),
            "imperial" | "f" | "fahrenheit" => Ok(Units::Imperial),
            other => Err(other.to_string()),
        }
    }
}

/// A resolved place from the geocoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Provider identifier, when the provider supplied one
    pub id: Option<i64>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub admin1: Option<String>,
    pub admin2: Option<String>,
    pub admin3: Option<String>,
    pub admin4: Option<String>,
    pub country_code: Option<String>,
    pub timezone: Option<String>,
    pub feature_code: Option<String>,
}

impl Location {
    /// Human-readable label: name, first-level region and country
    pub fn display_label(&self) -> String {
        [
            Some(self.name.as_str()),
            self.admin1.as_deref(),
            self.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Closed set of icon keys used by presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherIcon {
    Sun,
    Cloud,
    Rain,
    Snow,
    Mist,
    Thunder,
}

impl WeatherIcon {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherIcon::Sun => "sun",
            WeatherIcon::Cloud => "cloud",
            WeatherIcon::Rain => "rain",
            WeatherIcon::Snow => "snow",
            WeatherIcon::Mist => "mist",
            WeatherIcon::Thunder => "thunder",
        }
    }
}

/// Direction of barometric pressure over the last readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureTrend {
    Rising,
    Falling,
    Steady,
}

/// Upstream the record was normalized from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "open-meteo")]
    OpenMeteo,
    #[serde(rename = "openweather")]
    OpenWeather,
}

/// Display identity of a normalized record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Current conditions in both unit systems
///
/// Only the temperature pair and the icon are guaranteed; the rest depends on
/// what upstream returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub temp_c: f64,
    pub temp_f: f64,
    pub feels_c: Option<f64>,
    pub feels_f: Option<f64>,
    /// Relative humidity percentage (0-100)
    pub humidity: Option<f64>,
    pub wind_kph: Option<f64>,
    pub wind_mph: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub uv: Option<f64>,
    pub sunrise: Option<NaiveDateTime>,
    pub sunset: Option<NaiveDateTime>,
    pub icon: WeatherIcon,
    pub visibility_km: Option<f64>,
    pub dew_point_c: Option<f64>,
    pub wind_gust_kph: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
}

/// One hour of the forecast series (location-local time)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyPoint {
    pub time: NaiveDateTime,
    pub temp_c: f64,
    pub precip_prob: Option<f64>,
    pub wind_kph: Option<f64>,
    pub pressure_hpa: Option<f64>,
}

/// One day of the forecast series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub min_c: f64,
    pub max_c: f64,
    pub icon: WeatherIcon,
}

/// Sunrise and sunset for today, local to the location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise: NaiveDateTime,
    pub sunset: NaiveDateTime,
}

/// The canonical weather record handed to presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedWeather {
    pub location: DisplayLocation,
    pub current: CurrentConditions,
    /// Ascending, one entry per hour
    pub hourly: Vec<HourlyPoint>,
    /// Ascending, one entry per day
    pub daily: Vec<DailyPoint>,
    /// Epoch milliseconds at which normalization completed
    pub fetched_at: i64,
    pub provider: Provider,
    /// US EPA AQI (0-500); `None` means not computed yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqi: Option<u16>,
    pub pressure_trend: Option<PressureTrend>,
    pub sun: Option<SunTimes>,
    /// Offset of the location's local time from UTC
    #[serde(default)]
    pub utc_offset_seconds: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(name: &str, admin1: Option<&str>, country: Option<&str>) -> Location {
        Location {
            id: None,
            name: name.to_string(),
            latitude: 12.97,
            longitude: 77.59,
            country: country.map(str::to_string),
            admin1: admin1.map(str::to_string),
            admin2: None,
            admin3: None,
            admin4: None,
            country_code: None,
            timezone: None,
            feature_code: None,
        }
    }

    #[test]
    fn test_display_label_joins_available_parts() {
        let loc = location("Bengaluru", Some("Karnataka"), Some("India"));
        assert_eq!(loc.display_label(), "Bengaluru, Karnataka, India");
    }

    #[test]
    fn test_display_label_skips_missing_parts() {
        assert_eq!(location("Bengaluru", None, Some("India")).display_label(), "Bengaluru, India");
        assert_eq!(location("Bengaluru", Some(""), None).display_label(), "Bengaluru");
    }

    #[test]
    fn test_units_selectors() {
        assert_eq!(Units::Metric.temperature_unit(), "celsius");
        assert_eq!(Units::Metric.wind_speed_unit(), "kmh");
        assert_eq!(Units::Imperial.temperature_unit(), "fahrenheit");
        assert_eq!(Units::Imperial.wind_speed_unit(), "mph");
    }

    #[test]
    fn test_units_from_str() {
        assert_eq!("metric".parse::<Units>(), Ok(Units::Metric));
        assert_eq!("Imperial".parse::<Units>(), Ok(Units::Imperial));
        assert_eq!("f".parse::<Units>(), Ok(Units::Imperial));
        assert!("kelvin".parse::<Units>().is_err());
    }

    #[test]
    fn test_icon_and_provider_wire_names() {
        assert_eq!(serde_json::to_string(&WeatherIcon::Thunder).unwrap(), "\"thunder\"");
        assert_eq!(serde_json::to_string(&Provider::OpenMeteo).unwrap(), "\"open-meteo\"");
        assert_eq!(
            serde_json::to_string(&PressureTrend::Steady).unwrap(),
            "\"steady\""
        );
    }

    #[test]
    fn test_current_conditions_use_camel_case_fields() {
        let current = CurrentConditions {
            temp_c: 20.0,
            temp_f: 68.0,
            feels_c: None,
            feels_f: None,
            humidity: None,
            wind_kph: Some(10.0),
            wind_mph: None,
            pressure_hpa: None,
            uv: None,
            sunrise: None,
            sunset: None,
            icon: WeatherIcon::Sun,
            visibility_km: None,
            dew_point_c: None,
            wind_gust_kph: None,
            cloud_cover_pct: None,
        };

        let json = serde_json::to_string(&current).unwrap();
        assert!(json.contains("\"tempC\":20.0"));
        assert!(json.contains("\"windKph\":10.0"));
        assert!(json.contains("\"icon\":\"sun\""));
    }
}
