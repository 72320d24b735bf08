//! Open-Meteo weather normalizer
//!
//! This module fetches forecast data from the Open-Meteo API and turns it into a
//! `NormalizedWeather` record: both unit systems populated, "current" readings
//! derived from the nearest hourly point, a pressure trend, and icon keys.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{
    AirQualityClient, CurrentConditions, DailyPoint, DisplayLocation, HourlyPoint,
    NormalizedWeather, PressureTrend, Provider, SunTimes, Units, WeatherIcon,
};
use crate::cache::CacheManager;
use crate::enrichment::{spawn_aqi_enrichment, AqiJob, EnrichmentMessage, PendingKeys};
use crate::fetch::{FetchError, Fetcher};

/// Base URL for the Open-Meteo forecast API
pub const FORECAST_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// How long a normalized record stays fresh in the cache
pub const WEATHER_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Number of trailing pressure readings used for the trend
pub const PRESSURE_TREND_WINDOW: usize = 6;

/// Slope (hPa per hour) below which pressure counts as steady
///
/// Empirical noise floor; tune together with the window size.
pub const STEADY_SLOPE_HPA_PER_HOUR: f64 = 0.02;

const KPH_PER_MPH: f64 = 1.609_344;

const CURRENT_FIELDS: &str =
    "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,weather_code";
const HOURLY_FIELDS: &str = "temperature_2m,precipitation_probability,wind_speed_10m,pressure_msl,visibility,dew_point_2m,wind_gusts_10m,cloud_cover,uv_index";
const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,sunrise,sunset";

/// Capacity of the enrichment broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Errors that can occur when fetching weather data
#[derive(Debug, Error)]
pub enum WeatherError {
    /// Fetching the forecast failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(String),

    /// Invalid time format in response
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),
}

impl WeatherError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WeatherError::Fetch(e) if e.is_cancelled())
    }
}

/// Cache key for a forecast: coordinates rounded to 3 decimals plus units
pub fn weather_cache_key(lat: f64, lon: f64, units: Units) -> String {
    format!("om:{:.3},{:.3}:{}", lat, lon, units)
}

/// Client for fetching and normalizing weather data from Open-Meteo
///
/// Clones share the cache, the enrichment channel, the pending-enrichment set
/// and the shutdown token.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    fetcher: Fetcher,
    cache: CacheManager,
    air_quality: AirQualityClient,
    base_url: String,
    events: broadcast::Sender<EnrichmentMessage>,
    pending: PendingKeys,
    shutdown: CancellationToken,
}

impl WeatherClient {
    /// Create a new WeatherClient against the public endpoints
    pub fn new(fetcher: Fetcher, cache: CacheManager) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            air_quality: AirQualityClient::new(fetcher.clone()),
            fetcher,
            cache,
            base_url: FORECAST_BASE_URL.to_string(),
            events,
            pending: PendingKeys::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Use a different forecast endpoint (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a different air-quality endpoint
    pub fn with_air_quality_url(mut self, base_url: impl Into<String>) -> Self {
        self.air_quality = AirQualityClient::with_base_url(self.fetcher.clone(), base_url);
        self
    }

    /// Subscribe to background enrichment results
    ///
    /// Subscribe before calling `fetch_weather` to be sure not to miss the
    /// message for that call.
    pub fn subscribe(&self) -> broadcast::Receiver<EnrichmentMessage> {
        self.events.subscribe()
    }

    /// Abandon background enrichment started by this client and its clones
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Fresh cached record for these coordinates, without touching the network
    pub fn cached_weather(&self, lat: f64, lon: f64, units: Units) -> Option<NormalizedWeather> {
        self.cache
            .get(&weather_cache_key(lat, lon, units), WEATHER_CACHE_TTL)
    }

    /// Whether a background AQI task is still running for these coordinates
    ///
    /// Cache hits never start one, so only a fresh fetch can make this true.
    pub fn enrichment_pending(&self, lat: f64, lon: f64, units: Units) -> bool {
        self.pending.contains(&weather_cache_key(lat, lon, units))
    }

    /// Fetch and normalize weather for the given coordinates
    ///
    /// # Arguments
    /// * `lat` - Latitude coordinate
    /// * `lon` - Longitude coordinate
    /// * `display_name` - Name stored in the record's `location`
    /// * `units` - Unit system requested from the provider
    /// * `cancel` - Aborts the request; the cache is left untouched
    ///
    /// # Returns
    /// * `Ok(NormalizedWeather)` - Cached or freshly normalized record, without AQI
    ///   when fresh; AQI is attached to the cached copy by a background task
    /// * `Err(WeatherError)` - If the request or parsing fails
    pub async fn fetch_weather(
        &self,
        lat: f64,
        lon: f64,
        display_name: &str,
        units: Units,
        cancel: Option<&CancellationToken>,
    ) -> Result<NormalizedWeather, WeatherError> {
        let key = weather_cache_key(lat, lon, units);
        if let Some(cached) = self.cache.get::<NormalizedWeather>(&key, WEATHER_CACHE_TTL) {
            return Ok(cached);
        }

        let query = [
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
            ("temperature_unit", units.temperature_unit().to_string()),
            ("wind_speed_unit", units.wind_speed_unit().to_string()),
        ];

        let response: ForecastResponse = self
            .fetcher
            .get_json(&self.base_url, &query, cancel)
            .await?;

        let location = DisplayLocation {
            name: display_name.to_string(),
            lat,
            lon,
        };
        let weather = normalize_forecast(response, location, units, Utc::now())?;

        self.cache.set(&key, &weather);
        tracing::info!(key = %key, hours = weather.hourly.len(), "weather normalized");

        spawn_aqi_enrichment(AqiJob {
            client: self.air_quality.clone(),
            cache: self.cache.clone(),
            pending: self.pending.track(&key),
            key,
            weather: weather.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
        });

        Ok(weather)
    }
}

/// Open-Meteo forecast response structure
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current: Option<CurrentWeather>,
    #[serde(default)]
    hourly: HourlyWeather,
    #[serde(default)]
    daily: DailyWeather,
}

/// Current weather data from Open-Meteo
#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
    weather_code: Option<i32>,
}

/// Hourly weather data from Open-Meteo, one array per field
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HourlyWeather {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    precipitation_probability: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    pressure_msl: Vec<Option<f64>>,
    visibility: Vec<Option<f64>>,
    dew_point_2m: Vec<Option<f64>>,
    wind_gusts_10m: Vec<Option<f64>>,
    cloud_cover: Vec<Option<f64>>,
    uv_index: Vec<Option<f64>>,
}

/// Daily weather data from Open-Meteo
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyWeather {
    time: Vec<String>,
    weather_code: Vec<Option<i32>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    sunrise: Vec<Option<String>>,
    sunset: Vec<Option<String>>,
}

/// Build the canonical record from a forecast response
fn normalize_forecast(
    response: ForecastResponse,
    location: DisplayLocation,
    units: Units,
    now: DateTime<Utc>,
) -> Result<NormalizedWeather, WeatherError> {
    let current = response
        .current
        .ok_or_else(|| WeatherError::MissingField("current".to_string()))?;
    let temperature = current
        .temperature_2m
        .ok_or_else(|| WeatherError::MissingField("current.temperature_2m".to_string()))?;

    let hourly = &response.hourly;
    let hourly_times = hourly
        .time
        .iter()
        .map(|t| parse_local_datetime(t).ok_or_else(|| WeatherError::InvalidTimeFormat(t.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    // Hourly-only fields are read at the point closest to now
    let nearest = nearest_hour_index(&hourly_times, response.utc_offset_seconds, now);
    let now_value = |series: &[Option<f64>]| nearest.and_then(|i| value_at(series, i));

    let pressure_readings: Vec<f64> = hourly.pressure_msl.iter().flatten().copied().collect();

    let daily = &response.daily;
    let sunrise = first_datetime(&daily.sunrise);
    let sunset = first_datetime(&daily.sunset);

    let current = CurrentConditions {
        temp_c: to_celsius(temperature, units),
        temp_f: to_fahrenheit(temperature, units),
        feels_c: current.apparent_temperature.map(|t| to_celsius(t, units)),
        feels_f: current.apparent_temperature.map(|t| to_fahrenheit(t, units)),
        humidity: current.relative_humidity_2m,
        wind_kph: current.wind_speed_10m.map(|w| to_kph(w, units)),
        wind_mph: current.wind_speed_10m.map(|w| to_mph(w, units)),
        pressure_hpa: now_value(&hourly.pressure_msl),
        uv: now_value(&hourly.uv_index),
        sunrise,
        sunset,
        icon: wmo_code_to_icon(current.weather_code.unwrap_or(1)),
        visibility_km: now_value(&hourly.visibility).map(|m| (m / 1000.0).round()),
        dew_point_c: now_value(&hourly.dew_point_2m).map(|t| to_celsius(t, units)),
        wind_gust_kph: now_value(&hourly.wind_gusts_10m).map(|w| to_kph(w, units)),
        cloud_cover_pct: now_value(&hourly.cloud_cover),
    };

    let mut hourly_points = Vec::with_capacity(hourly_times.len());
    for (i, time) in hourly_times.iter().enumerate() {
        let Some(temp) = value_at(&hourly.temperature_2m, i) else {
            continue;
        };
        hourly_points.push(HourlyPoint {
            time: *time,
            temp_c: to_celsius(temp, units),
            precip_prob: value_at(&hourly.precipitation_probability, i),
            wind_kph: value_at(&hourly.wind_speed_10m, i).map(|w| to_kph(w, units)),
            pressure_hpa: value_at(&hourly.pressure_msl, i),
        });
    }
    hourly_points.sort_by_key(|p| p.time);
    hourly_points.dedup_by_key(|p| p.time);

    let mut daily_points = Vec::with_capacity(daily.time.len());
    for (i, day) in daily.time.iter().enumerate() {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|_| WeatherError::InvalidTimeFormat(day.clone()))?;
        let (Some(min), Some(max)) = (
            value_at(&daily.temperature_2m_min, i),
            value_at(&daily.temperature_2m_max, i),
        ) else {
            continue;
        };
        let code = daily.weather_code.get(i).copied().flatten().unwrap_or(1);
        daily_points.push(DailyPoint {
            date,
            min_c: to_celsius(min, units),
            max_c: to_celsius(max, units),
            icon: wmo_code_to_icon(code),
        });
    }
    daily_points.sort_by_key(|d| d.date);
    daily_points.dedup_by_key(|d| d.date);

    let sun = match (sunrise, sunset) {
        (Some(sunrise), Some(sunset)) => Some(SunTimes { sunrise, sunset }),
        _ => None,
    };

    Ok(NormalizedWeather {
        location,
        current,
        hourly: hourly_points,
        daily: daily_points,
        fetched_at: now.timestamp_millis(),
        provider: Provider::OpenMeteo,
        aqi: None,
        pressure_trend: pressure_trend(&pressure_readings),
        sun,
        utc_offset_seconds: response.utc_offset_seconds,
    })
}

fn value_at(series: &[Option<f64>], index: usize) -> Option<f64> {
    series.get(index).copied().flatten()
}

fn first_datetime(series: &[Option<String>]) -> Option<NaiveDateTime> {
    series
        .first()
        .and_then(|s| s.as_deref())
        .and_then(parse_local_datetime)
}

fn to_celsius(value: f64, units: Units) -> f64 {
    match units {
        Units::Metric => value,
        Units::Imperial => (value - 32.0) * 5.0 / 9.0,
    }
}

fn to_fahrenheit(value: f64, units: Units) -> f64 {
    match units {
        Units::Metric => value * 9.0 / 5.0 + 32.0,
        Units::Imperial => value,
    }
}

fn to_kph(value: f64, units: Units) -> f64 {
    match units {
        Units::Metric => value,
        Units::Imperial => value * KPH_PER_MPH,
    }
}

fn to_mph(value: f64, units: Units) -> f64 {
    match units {
        Units::Metric => value / KPH_PER_MPH,
        Units::Imperial => value,
    }
}

/// Parse an Open-Meteo local timestamp (e.g., "2024-07-15T05:30")
///
/// Also accepts seconds and full RFC 3339 timestamps, keeping the wall-clock time.
pub fn parse_local_datetime(datetime_str: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(datetime_str)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// Index of the local timestamp closest to `now`
///
/// Linear scan; ties keep the earlier index. `None` for an empty series.
pub fn nearest_hour_index(
    times: &[NaiveDateTime],
    utc_offset_seconds: i32,
    now: DateTime<Utc>,
) -> Option<usize> {
    let offset = chrono::Duration::seconds(i64::from(utc_offset_seconds));
    let mut best: Option<(usize, i64)> = None;

    for (i, local) in times.iter().enumerate() {
        let instant = (*local - offset).and_utc();
        let diff = (instant - now).num_milliseconds().abs();
        if best.map_or(true, |(_, best_diff)| diff < best_diff) {
            best = Some((i, diff));
        }
    }

    best.map(|(i, _)| i)
}

/// Classify the trend of the last pressure readings
///
/// Needs at least `PRESSURE_TREND_WINDOW` readings, otherwise the trend is unknown.
pub fn pressure_trend(readings: &[f64]) -> Option<PressureTrend> {
    pressure_trend_with_threshold(readings, STEADY_SLOPE_HPA_PER_HOUR)
}

/// Same as [`pressure_trend`] with an explicit steady threshold
pub fn pressure_trend_with_threshold(readings: &[f64], threshold: f64) -> Option<PressureTrend> {
    if readings.len() < PRESSURE_TREND_WINDOW {
        return None;
    }

    let window = &readings[readings.len() - PRESSURE_TREND_WINDOW..];
    let slope = least_squares_slope(window);

    Some(if slope.abs() < threshold {
        PressureTrend::Steady
    } else if slope > 0.0 {
        PressureTrend::Rising
    } else {
        PressureTrend::Falling
    })
}

/// Ordinary least-squares slope of `values` against their index
fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });

    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Map WMO weather code to an icon key
///
/// Weather codes from WMO (World Meteorological Organization):
/// - 0: Clear sky
/// - 1-3: Mainly clear, partly cloudy, overcast
/// - 45, 48: Fog
/// - 51, 53, 55: Drizzle
/// - 61, 63, 65: Rain
/// - 80-82: Rain showers
/// - 71, 73, 75: Snow
/// - 85, 86: Snow showers
/// - 95, 96, 99: Thunderstorm
///
/// Anything else falls back to `Cloud`.
pub fn wmo_code_to_icon(code: i32) -> WeatherIcon {
    match code {
        0 => WeatherIcon::Sun,
        1..=3 => WeatherIcon::Cloud,
        45 | 48 => WeatherIcon::Mist,
        51 | 53 | 55 | 61 | 63 | 65 | 80 | 81 | 82 => WeatherIcon::Rain,
        71 | 73 | 75 | 85 | 86 => WeatherIcon::Snow,
        95 | 96 | 99 => WeatherIcon::Thunder,
        _ => WeatherIcon::Cloud,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Sample metric Open-Meteo response, 8 hours around midday UTC
    const METRIC_RESPONSE: &str = r#"{
        "latitude": 49.28,
        "longitude": -123.12,
        "utc_offset_seconds": 0,
        "timezone": "GMT",
        "current": {
            "time": "2024-07-15T12:00",
            "temperature_2m": 20.0,
            "apparent_temperature": 21.0,
            "relative_humidity_2m": 65,
            "wind_speed_10m": 16.09344,
            "weather_code": 61
        },
        "hourly": {
            "time": [
                "2024-07-15T08:00", "2024-07-15T09:00", "2024-07-15T10:00", "2024-07-15T11:00",
                "2024-07-15T12:00", "2024-07-15T13:00", "2024-07-15T14:00", "2024-07-15T15:00"
            ],
            "temperature_2m": [15.0, 16.0, 17.0, 18.0, 20.0, 21.0, 22.0, 21.5],
            "precipitation_probability": [10, 20, 30, 40, 50, 60, 70, 80],
            "wind_speed_10m": [5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0],
            "pressure_msl": [1010.0, 1010.0, 1011.0, 1012.0, 1013.0, 1014.0, 1015.0, 1016.0],
            "visibility": [24140, 24140, 20000, 18000, 15600, 12000, 10000, 9000],
            "dew_point_2m": [10.0, 10.5, 11.0, 11.5, 12.0, 12.5, 13.0, 13.5],
            "wind_gusts_10m": [10.0, 11.0, 12.0, 13.0, 25.0, 15.0, 16.0, 17.0],
            "cloud_cover": [0, 10, 20, 30, 40, 50, 60, 70],
            "uv_index": [1.0, 2.0, 3.0, 4.0, 5.5, 6.0, 7.0, 6.5]
        },
        "daily": {
            "time": ["2024-07-15", "2024-07-16"],
            "weather_code": [61, 0],
            "temperature_2m_max": [22.0, 25.0],
            "temperature_2m_min": [14.0, 15.0],
            "sunrise": ["2024-07-15T05:30", "2024-07-16T05:31"],
            "sunset": ["2024-07-15T21:15", "2024-07-16T21:14"]
        }
    }"#;

    /// Same shape in imperial units
    const IMPERIAL_RESPONSE: &str = r#"{
        "utc_offset_seconds": 0,
        "current": {
            "temperature_2m": 68.0,
            "apparent_temperature": 50.0,
            "relative_humidity_2m": 40,
            "wind_speed_10m": 10.0,
            "weather_code": 0
        },
        "hourly": {
            "time": ["2024-07-15T11:00", "2024-07-15T12:00"],
            "temperature_2m": [59.0, 68.0],
            "wind_speed_10m": [5.0, 10.0],
            "dew_point_2m": [41.0, 50.0],
            "wind_gusts_10m": [10.0, 20.0]
        },
        "daily": {
            "time": ["2024-07-15"],
            "weather_code": [0],
            "temperature_2m_max": [86.0],
            "temperature_2m_min": [50.0],
            "sunrise": ["2024-07-15T05:30"],
            "sunset": ["2024-07-15T21:15"]
        }
    }"#;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 5, 0).unwrap()
    }

    fn display() -> DisplayLocation {
        DisplayLocation {
            name: "Vancouver".to_string(),
            lat: 49.28,
            lon: -123.12,
        }
    }

    fn normalize(json: &str, units: Units) -> Result<NormalizedWeather, WeatherError> {
        let response: ForecastResponse = serde_json::from_str(json).expect("fixture should parse");
        normalize_forecast(response, display(), units, noon())
    }

    fn local(s: &str) -> NaiveDateTime {
        parse_local_datetime(s).unwrap()
    }

    #[test]
    fn test_metric_response_populates_both_unit_systems() {
        let weather = normalize(METRIC_RESPONSE, Units::Metric).unwrap();

        assert!((weather.current.temp_c - 20.0).abs() < 1e-9);
        assert!((weather.current.temp_f - 68.0).abs() < 1e-9);
        assert!((weather.current.feels_f.unwrap() - 69.8).abs() < 1e-9);
        assert!((weather.current.wind_kph.unwrap() - 16.09344).abs() < 1e-9);
        assert!((weather.current.wind_mph.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(weather.current.humidity, Some(65.0));
        assert_eq!(weather.current.icon, WeatherIcon::Rain);
        assert_eq!(weather.provider, Provider::OpenMeteo);
        assert_eq!(weather.location, display());
        assert!(weather.aqi.is_none());
    }

    #[test]
    fn test_imperial_response_is_converted_to_celsius() {
        let weather = normalize(IMPERIAL_RESPONSE, Units::Imperial).unwrap();

        assert!((weather.current.temp_c - 20.0).abs() < 1e-9);
        assert!((weather.current.temp_f - 68.0).abs() < 1e-9);
        assert!((weather.current.feels_c.unwrap() - 10.0).abs() < 1e-9);
        assert!((weather.current.wind_mph.unwrap() - 10.0).abs() < 1e-9);
        assert!((weather.current.wind_kph.unwrap() - 16.09344).abs() < 1e-9);
        assert!((weather.current.dew_point_c.unwrap() - 10.0).abs() < 1e-9);
        assert!((weather.current.wind_gust_kph.unwrap() - 32.18688).abs() < 1e-9);
        assert!((weather.hourly[0].temp_c - 15.0).abs() < 1e-9);
        assert!((weather.daily[0].max_c - 30.0).abs() < 1e-9);
        assert!((weather.daily[0].min_c - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_pair_is_consistent() {
        for (json, units) in [(METRIC_RESPONSE, Units::Metric), (IMPERIAL_RESPONSE, Units::Imperial)] {
            let c = normalize(json, units).unwrap().current;
            assert!((c.temp_f - (c.temp_c * 9.0 / 5.0 + 32.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_hourly_only_fields_come_from_nearest_hour() {
        let weather = normalize(METRIC_RESPONSE, Units::Metric).unwrap();

        // 12:05 UTC is closest to the 12:00 entry (index 4)
        assert_eq!(weather.current.uv, Some(5.5));
        assert_eq!(weather.current.pressure_hpa, Some(1013.0));
        assert_eq!(weather.current.visibility_km, Some(16.0));
        assert_eq!(weather.current.dew_point_c, Some(12.0));
        assert_eq!(weather.current.wind_gust_kph, Some(25.0));
        assert_eq!(weather.current.cloud_cover_pct, Some(40.0));
    }

    #[test]
    fn test_series_are_sorted_and_complete() {
        let weather = normalize(METRIC_RESPONSE, Units::Metric).unwrap();

        assert_eq!(weather.hourly.len(), 8);
        assert_eq!(weather.hourly[0].time, local("2024-07-15T08:00"));
        assert_eq!(weather.hourly[4].precip_prob, Some(50.0));
        assert_eq!(weather.hourly[4].pressure_hpa, Some(1013.0));
        assert!(weather.hourly.windows(2).all(|w| w[0].time < w[1].time));

        assert_eq!(weather.daily.len(), 2);
        assert_eq!(weather.daily[0].date, NaiveDate::from_ymd_opt(2024, 7, 15).unwrap());
        assert_eq!(weather.daily[0].icon, WeatherIcon::Rain);
        assert_eq!(weather.daily[1].icon, WeatherIcon::Sun);
    }

    #[test]
    fn test_sun_times_are_taken_from_first_day() {
        let weather = normalize(METRIC_RESPONSE, Units::Metric).unwrap();

        let sun = weather.sun.unwrap();
        assert_eq!(sun.sunrise, local("2024-07-15T05:30"));
        assert_eq!(sun.sunset, local("2024-07-15T21:15"));
        assert_eq!(weather.current.sunrise, Some(sun.sunrise));
    }

    #[test]
    fn test_rising_pressure_is_detected() {
        let weather = normalize(METRIC_RESPONSE, Units::Metric).unwrap();
        assert_eq!(weather.pressure_trend, Some(PressureTrend::Rising));
    }

    #[test]
    fn test_fetched_at_is_normalization_time() {
        let weather = normalize(METRIC_RESPONSE, Units::Metric).unwrap();
        assert_eq!(weather.fetched_at, noon().timestamp_millis());
    }

    #[test]
    fn test_unsorted_duplicate_hours_are_cleaned_up() {
        let json = r#"{
            "current": {"temperature_2m": 10.0},
            "hourly": {
                "time": ["2024-07-15T02:00", "2024-07-15T01:00", "2024-07-15T02:00", "2024-07-15T03:00"],
                "temperature_2m": [2.0, 1.0, 2.5, null]
            }
        }"#;

        let weather = normalize(json, Units::Metric).unwrap();

        let times: Vec<_> = weather.hourly.iter().map(|h| h.time).collect();
        assert_eq!(times, vec![local("2024-07-15T01:00"), local("2024-07-15T02:00")]);
    }

    #[test]
    fn test_minimal_response_leaves_optionals_empty() {
        let json = r#"{"current": {"temperature_2m": 10.0}}"#;

        let weather = normalize(json, Units::Metric).unwrap();

        assert_eq!(weather.current.icon, WeatherIcon::Cloud);
        assert!(weather.current.uv.is_none());
        assert!(weather.current.wind_kph.is_none());
        assert!(weather.hourly.is_empty());
        assert!(weather.daily.is_empty());
        assert!(weather.pressure_trend.is_none());
        assert!(weather.sun.is_none());
    }

    #[test]
    fn test_missing_current_temperature_is_an_error() {
        let result = normalize(r#"{"current": {"weather_code": 2}}"#, Units::Metric);
        match result {
            Err(WeatherError::MissingField(field)) => assert_eq!(field, "current.temperature_2m"),
            other => panic!("Expected MissingField error, got {:?}", other),
        }

        assert!(matches!(
            normalize(r#"{}"#, Units::Metric),
            Err(WeatherError::MissingField(_))
        ));
    }

    #[test]
    fn test_invalid_hourly_time_is_an_error() {
        let json = r#"{
            "current": {"temperature_2m": 10.0},
            "hourly": {"time": ["yesterday"], "temperature_2m": [1.0]}
        }"#;

        match normalize(json, Units::Metric) {
            Err(WeatherError::InvalidTimeFormat(value)) => assert_eq!(value, "yesterday"),
            other => panic!("Expected InvalidTimeFormat error, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_sunrise_is_dropped() {
        let json = r#"{
            "current": {"temperature_2m": 10.0},
            "daily": {
                "time": ["2024-07-15"],
                "temperature_2m_max": [12.0],
                "temperature_2m_min": [8.0],
                "sunrise": ["soon"],
                "sunset": ["2024-07-15T21:15"]
            }
        }"#;

        let weather = normalize(json, Units::Metric).unwrap();

        assert!(weather.current.sunrise.is_none());
        assert!(weather.current.sunset.is_some());
        assert!(weather.sun.is_none());
    }

    #[test]
    fn test_nearest_hour_index() {
        let times = vec![
            local("2024-07-15T10:00"),
            local("2024-07-15T11:00"),
            local("2024-07-15T12:00"),
        ];

        let at = |h, m| Utc.with_ymd_and_hms(2024, 7, 15, h, m, 0).unwrap();
        assert_eq!(nearest_hour_index(&times, 0, at(11, 20)), Some(1));
        assert_eq!(nearest_hour_index(&times, 0, at(11, 40)), Some(2));
        assert_eq!(nearest_hour_index(&times, 0, at(3, 0)), Some(0));
        assert_eq!(nearest_hour_index(&times, 0, at(23, 0)), Some(2));
        // Exactly halfway keeps the earlier hour
        assert_eq!(nearest_hour_index(&times, 0, at(10, 30)), Some(0));
        assert_eq!(nearest_hour_index(&[], 0, at(10, 30)), None);
    }

    #[test]
    fn test_nearest_hour_index_applies_offset() {
        // Local times at UTC-7: 05:00 local is 12:00 UTC
        let times = vec![local("2024-07-15T05:00"), local("2024-07-15T12:00")];
        let now = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();

        assert_eq!(nearest_hour_index(&times, -7 * 3600, now), Some(0));
        assert_eq!(nearest_hour_index(&times, 0, now), Some(1));
    }

    #[test]
    fn test_constant_pressure_is_steady() {
        assert_eq!(pressure_trend(&[1013.0; 6]), Some(PressureTrend::Steady));
        assert_eq!(pressure_trend(&[1000.0, 1013.0, 1013.0, 1013.0, 1013.0, 1013.0, 1013.0]), Some(PressureTrend::Steady));
    }

    #[test]
    fn test_pressure_trend_direction() {
        assert_eq!(
            pressure_trend(&[1010.0, 1010.5, 1011.0, 1011.5, 1012.0, 1012.5]),
            Some(PressureTrend::Rising)
        );
        assert_eq!(
            pressure_trend(&[1012.5, 1012.0, 1011.5, 1011.0, 1010.5, 1010.0]),
            Some(PressureTrend::Falling)
        );
        // 0.01 hPa/h is below the noise floor
        assert_eq!(
            pressure_trend(&[1010.0, 1010.01, 1010.02, 1010.03, 1010.04, 1010.05]),
            Some(PressureTrend::Steady)
        );
    }

    #[test]
    fn test_pressure_trend_uses_only_last_six_readings() {
        let readings = [900.0, 950.0, 1013.0, 1013.0, 1013.0, 1013.0, 1013.0, 1013.0];
        assert_eq!(pressure_trend(&readings), Some(PressureTrend::Steady));
    }

    #[test]
    fn test_pressure_trend_needs_six_readings() {
        assert_eq!(pressure_trend(&[1010.0, 1011.0, 1012.0, 1013.0, 1014.0]), None);
        assert_eq!(pressure_trend(&[]), None);
    }

    #[test]
    fn test_pressure_trend_threshold_is_tunable() {
        let readings = [1010.0, 1010.01, 1010.02, 1010.03, 1010.04, 1010.05];
        assert_eq!(
            pressure_trend_with_threshold(&readings, 0.001),
            Some(PressureTrend::Rising)
        );
    }

    #[test]
    fn test_pressure_trend_is_deterministic() {
        let readings = [1009.3, 1011.2, 1008.7, 1012.4, 1010.1, 1010.9];
        let first = pressure_trend(&readings);
        for _ in 0..10 {
            assert_eq!(pressure_trend(&readings), first);
        }
    }

    #[test]
    fn test_null_pressure_readings_are_skipped() {
        let json = r#"{
            "current": {"temperature_2m": 10.0},
            "hourly": {
                "time": [
                    "2024-07-15T06:00", "2024-07-15T07:00", "2024-07-15T08:00", "2024-07-15T09:00",
                    "2024-07-15T10:00", "2024-07-15T11:00", "2024-07-15T12:00"
                ],
                "temperature_2m": [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
                "pressure_msl": [1010.0, 1009.0, null, 1008.0, 1007.0, 1006.0, 1005.0]
            }
        }"#;

        let weather = normalize(json, Units::Metric).unwrap();
        assert_eq!(weather.pressure_trend, Some(PressureTrend::Falling));
    }

    #[test]
    fn test_wmo_code_mapping() {
        assert_eq!(wmo_code_to_icon(0), WeatherIcon::Sun);
        for code in [1, 2, 3] {
            assert_eq!(wmo_code_to_icon(code), WeatherIcon::Cloud);
        }
        assert_eq!(wmo_code_to_icon(45), WeatherIcon::Mist);
        assert_eq!(wmo_code_to_icon(48), WeatherIcon::Mist);
        for code in [51, 53, 55, 61, 63, 65, 80, 81, 82] {
            assert_eq!(wmo_code_to_icon(code), WeatherIcon::Rain, "code {}", code);
        }
        for code in [71, 73, 75, 85, 86] {
            assert_eq!(wmo_code_to_icon(code), WeatherIcon::Snow, "code {}", code);
        }
        for code in [95, 96, 99] {
            assert_eq!(wmo_code_to_icon(code), WeatherIcon::Thunder, "code {}", code);
        }
    }

    #[test]
    fn test_unknown_wmo_codes_fall_back_to_cloud() {
        assert_eq!(wmo_code_to_icon(7), WeatherIcon::Cloud);
        assert_eq!(wmo_code_to_icon(56), WeatherIcon::Cloud);
        assert_eq!(wmo_code_to_icon(77), WeatherIcon::Cloud);
        assert_eq!(wmo_code_to_icon(-1), WeatherIcon::Cloud);
    }

    #[test]
    fn test_parse_local_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 7, 15)
            .unwrap()
            .and_hms_opt(5, 30, 0)
            .unwrap();
        assert_eq!(parse_local_datetime("2024-07-15T05:30"), Some(expected));
        assert_eq!(parse_local_datetime("2024-07-15T05:30:00"), Some(expected));
        assert_eq!(parse_local_datetime("2024-07-15T05:30:00+02:00"), Some(expected));
        assert_eq!(parse_local_datetime("2024-07-15 05:30"), None);
        assert_eq!(parse_local_datetime("not a time"), None);
    }

    #[test]
    fn test_cache_key_rounds_coordinates() {
        assert_eq!(
            weather_cache_key(12.971_59, 77.594_56, Units::Metric),
            "om:12.972,77.595:metric"
        );
        assert_eq!(
            weather_cache_key(-33.8688, 151.2093, Units::Imperial),
            "om:-33.869,151.209:imperial"
        );
    }
}
