//! Background AQI enrichment
//!
//! After a forecast is normalized, a background task fetches PM2.5 for the same
//! coordinates, writes an AQI-augmented copy of the record back to the cache and
//! announces the result on a broadcast channel so whoever reads the cache next
//! knows it changed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheManager;
use crate::data::{AirQualityClient, NormalizedWeather};

/// Messages sent from background enrichment to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentMessage {
    /// The cache entry for `key` now carries an AQI
    AqiUpdated { key: String, aqi: u16 },
    /// No AQI could be computed for `key`; the entry is unchanged
    AqiUnavailable { key: String },
}

impl EnrichmentMessage {
    /// Cache key the message refers to
    pub fn key(&self) -> &str {
        match self {
            EnrichmentMessage::AqiUpdated { key, .. } => key,
            EnrichmentMessage::AqiUnavailable { key } => key,
        }
    }
}

/// Cache keys with an enrichment task still in flight, counted per key
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingKeys {
    keys: Arc<Mutex<HashMap<String, usize>>>,
}

impl PendingKeys {
    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains_key(key)
    }

    /// Marks `key` pending until the returned guard is dropped
    pub fn track(&self, key: &str) -> PendingGuard {
        *self.keys.lock().entry(key.to_string()).or_insert(0) += 1;
        PendingGuard {
            keys: self.clone(),
            key: key.to_string(),
        }
    }
}

/// Clears its key from [`PendingKeys`] on drop
#[derive(Debug)]
pub(crate) struct PendingGuard {
    keys: PendingKeys,
    key: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut keys = self.keys.keys.lock();
        if let Some(count) = keys.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                keys.remove(&self.key);
            }
        }
    }
}

/// Everything a background enrichment task needs
pub(crate) struct AqiJob {
    pub client: AirQualityClient,
    pub cache: CacheManager,
    pub key: String,
    pub weather: NormalizedWeather,
    pub events: broadcast::Sender<EnrichmentMessage>,
    /// Fires when the owning client is torn down
    pub shutdown: CancellationToken,
    /// Held for the lifetime of the task
    pub pending: PendingGuard,
}

/// Spawns the enrichment task for one freshly normalized record
///
/// Errors are swallowed: the record is already usable without AQI.
pub(crate) fn spawn_aqi_enrichment(job: AqiJob) -> JoinHandle<()> {
    tokio::spawn(job.run())
}

impl AqiJob {
    async fn run(self) {
        let AqiJob {
            client,
            cache,
            key,
            mut weather,
            events,
            shutdown,
            pending,
        } = self;

        let result = client
            .fetch_aqi(
                weather.location.lat,
                weather.location.lon,
                Utc::now(),
                Some(&shutdown),
            )
            .await;

        let message = match result {
            Ok(Some(aqi)) => {
                weather.aqi = Some(aqi);
                cache.set(&key, &weather);
                tracing::debug!(key = %key, aqi, "aqi attached");
                EnrichmentMessage::AqiUpdated { key, aqi }
            }
            Ok(None) => {
                tracing::debug!(key = %key, "no usable pm2.5 reading");
                EnrichmentMessage::AqiUnavailable { key }
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!(key = %key, "aqi enrichment abandoned");
                return;
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "aqi enrichment failed");
                EnrichmentMessage::AqiUnavailable { key }
            }
        };

        // The cache is final before anyone hears about it
        drop(pending);

        // Nobody listening is fine
        let _ = events.send(message);
    }
}
