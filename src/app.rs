//! Dashboard orchestration
//!
//! Turns what the user typed into a place, loads weather for it and, when the
//! record came back without AQI, briefly waits for background enrichment before
//! re-reading the cache.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheManager;
use crate::data::weather::weather_cache_key;
use crate::data::{
    AlertsClient, GeocodeClient, GeocodeError, Location, NormalizedWeather, Units, WeatherAlert,
    WeatherClient, WeatherError,
};
use crate::enrichment::EnrichmentMessage;
use crate::fetch::{FetchError, Fetcher};
use crate::settings::Settings;

/// How long to wait for background AQI before giving up on it
pub const DEFAULT_AQI_WAIT: Duration = Duration::from_millis(1500);

/// Errors surfaced to the user by the dashboard
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("No place matches '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl DashboardError {
    /// Cancelled operations are dropped silently, never shown
    pub fn is_cancelled(&self) -> bool {
        match self {
            DashboardError::NotFound(_) => false,
            DashboardError::Weather(e) => e.is_cancelled(),
            DashboardError::Geocode(e) => e.is_cancelled(),
            DashboardError::Fetch(e) => e.is_cancelled(),
        }
    }

    /// Short message suitable for a transient error banner
    pub fn user_message(&self) -> String {
        let fetch = match self {
            DashboardError::NotFound(_) => return "City not found".to_string(),
            DashboardError::Weather(WeatherError::Fetch(e)) => e,
            DashboardError::Weather(_) => {
                return "The weather service sent data we could not read".to_string()
            }
            DashboardError::Geocode(GeocodeError::Fetch(e)) => e,
            DashboardError::Fetch(e) => e,
        };

        match fetch {
            FetchError::Timeout => "The weather service took too long to answer".to_string(),
            FetchError::Status { status, .. } => format!("The weather service returned HTTP {}", status),
            FetchError::Request(_) => "Network error. Check your connection.".to_string(),
            FetchError::Decode(_) => "The weather service sent data we could not read".to_string(),
            FetchError::Cancelled => "Cancelled".to_string(),
        }
    }
}

/// What the user asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// `"<lat>, <lon>"` typed directly; skips the geocoder
    Coordinates { lat: f64, lon: f64 },
    /// Free text for the geocoder
    Query(String),
}

/// Recognize `"12.97, 77.59"` style input (plain decimals, optional minus sign)
pub fn parse_target(input: &str) -> Target {
    let coordinates = input.split_once(',').and_then(|(lat, lon)| {
        let (lat, lon) = (lat.trim(), lon.trim());
        if is_plain_decimal(lat) && is_plain_decimal(lon) {
            Some((lat.parse::<f64>().ok()?, lon.parse::<f64>().ok()?))
        } else {
            None
        }
    });

    match coordinates {
        Some((lat, lon)) => Target::Coordinates { lat, lon },
        None => Target::Query(input.trim().to_string()),
    }
}

fn is_plain_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

    all_digits(whole) && fraction.map_or(true, all_digits)
}

/// A resolved place ready for a forecast request
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    /// Geocoder record, absent for typed coordinates
    pub location: Option<Location>,
}

/// Weather for one place
#[derive(Debug, Clone, PartialEq)]
pub struct CityWeather {
    pub place: Place,
    pub weather: NormalizedWeather,
}

/// Entry point used by the command line
#[derive(Debug, Clone)]
pub struct Dashboard {
    weather: WeatherClient,
    geocoder: GeocodeClient,
    alerts: AlertsClient,
    units: Units,
    aqi_wait: Duration,
}

impl Dashboard {
    /// Build every client from `settings`
    pub fn new(settings: &Settings) -> Result<Self, DashboardError> {
        let fetcher = Fetcher::new(settings.request_timeout())?;
        let cache = match &settings.cache_dir {
            Some(dir) => CacheManager::with_dir(dir.clone()),
            None => CacheManager::new(),
        };
        let endpoints = &settings.endpoints;

        let weather = WeatherClient::new(fetcher.clone(), cache.clone())
            .with_base_url(endpoints.forecast.as_str())
            .with_air_quality_url(endpoints.air_quality.as_str());
        let geocoder = GeocodeClient::with_base_url(fetcher.clone(), cache, endpoints.geocoding.as_str());
        let alerts = AlertsClient::with_base_url(fetcher, endpoints.warnings.as_str());

        Ok(Self::with_clients(weather, geocoder, alerts, settings.units))
    }

    pub fn with_clients(
        weather: WeatherClient,
        geocoder: GeocodeClient,
        alerts: AlertsClient,
        units: Units,
    ) -> Self {
        Self {
            weather,
            geocoder,
            alerts,
            units,
            aqi_wait: DEFAULT_AQI_WAIT,
        }
    }

    pub fn with_aqi_wait(mut self, wait: Duration) -> Self {
        self.aqi_wait = wait;
        self
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Stop background work started by this dashboard
    pub fn shutdown(&self) {
        self.weather.shutdown();
    }

    /// Resolve user input to coordinates and a display label
    pub async fn resolve(
        &self,
        input: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Place, DashboardError> {
        match parse_target(input) {
            Target::Coordinates { lat, lon } => Ok(Place {
                label: format!("{:.4}, {:.4}", lat, lon),
                lat,
                lon,
                location: None,
            }),
            Target::Query(query) => {
                let location = self
                    .geocoder
                    .geocode_city(&query, cancel)
                    .await?
                    .ok_or_else(|| DashboardError::NotFound(query.clone()))?;

                Ok(Place {
                    label: location.display_label(),
                    lat: location.latitude,
                    lon: location.longitude,
                    location: Some(location),
                })
            }
        }
    }

    /// Resolve and load weather, returning as soon as the forecast is ready
    pub async fn load(
        &self,
        input: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<CityWeather, DashboardError> {
        let place = self.resolve(input, cancel).await?;
        let weather = self
            .weather
            .fetch_weather(place.lat, place.lon, &place.label, self.units, cancel)
            .await?;
        Ok(CityWeather { place, weather })
    }

    /// Like [`Dashboard::load`], then waits briefly for AQI enrichment
    ///
    /// Only waits while an enrichment task is in flight for the record; cache
    /// hits return straight away. Either way the cache is re-read afterwards and
    /// the AQI-bearing copy wins if there is one.
    pub async fn load_with_aqi(
        &self,
        input: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<CityWeather, DashboardError> {
        // Subscribe first so the enrichment message cannot slip past
        let mut events = self.weather.subscribe();
        let mut loaded = self.load(input, cancel).await?;
        if loaded.weather.aqi.is_some() {
            return Ok(loaded);
        }

        let (lat, lon) = (loaded.place.lat, loaded.place.lon);
        if self.weather.enrichment_pending(lat, lon, self.units) {
            let key = weather_cache_key(lat, lon, self.units);
            self.wait_for_enrichment(&mut events, &key, cancel).await;
        }

        if let Some(refreshed) = self
            .weather
            .cached_weather(lat, lon, self.units)
            .filter(|w| w.aqi.is_some())
        {
            loaded.weather = refreshed;
        }
        Ok(loaded)
    }

    async fn wait_for_enrichment(
        &self,
        events: &mut broadcast::Receiver<EnrichmentMessage>,
        key: &str,
        cancel: Option<&CancellationToken>,
    ) {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(message) if message.key() == key => return,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return,
                }
            }
        };
        let bounded = tokio::time::timeout(self.aqi_wait, wait);

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = bounded => {}
                }
            }
            None => {
                let _ = bounded.await;
            }
        }
    }

    /// Load several places concurrently; each result stands alone
    pub async fn compare(
        &self,
        inputs: &[String],
        cancel: Option<&CancellationToken>,
    ) -> Vec<(String, Result<CityWeather, DashboardError>)> {
        let loads = inputs.iter().map(|input| async move {
            (input.clone(), self.load_with_aqi(input, cancel).await)
        });
        futures::future::join_all(loads).await
    }

    pub async fn suggest(
        &self,
        query: &str,
        limit: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Location>, DashboardError> {
        Ok(self.geocoder.geocode_suggest(query, limit, cancel).await?)
    }

    pub async fn reverse(
        &self,
        lat: f64,
        lon: f64,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Location>, DashboardError> {
        Ok(self.geocoder.reverse_geocode(lat, lon, cancel).await?)
    }

    /// Active alerts for whatever `input` resolves to
    pub async fn alerts(
        &self,
        input: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<(Place, Vec<WeatherAlert>), DashboardError> {
        let place = self.resolve(input, cancel).await?;
        let alerts = self.alerts.fetch_alerts(place.lat, place.lon, cancel).await?;
        Ok((place, alerts))
    }
}
