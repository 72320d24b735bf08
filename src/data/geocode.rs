//! Open-Meteo geocoder
//!
//! Resolves free-text place queries ("Springfield, Illinois, United States") to
//! coordinates, offers type-ahead suggestions and reverse-geocodes coordinates.
//! Every lookup is cached; "nothing found" is `Ok(None)` or an empty list.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::Location;
use crate::cache::CacheManager;
use crate::fetch::{FetchError, Fetcher};

/// Base URL for the Open-Meteo geocoding API
pub const GEOCODING_BASE_URL: &str = "https://geocoding-api.open-meteo.com";

const CITY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const SUGGEST_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const REVERSE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Candidates requested for the city term and for the raw query
const CITY_PASS_COUNT: usize = 20;
const RAW_PASS_COUNT: usize = 10;

/// Errors that can occur while geocoding
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl GeocodeError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            GeocodeError::Fetch(e) => e.is_cancelled(),
        }
    }
}

/// Search/reverse response; `results` is omitted when nothing matched
#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeoResult>,
}

/// One candidate place as returned by the provider
#[derive(Debug, Clone, Deserialize)]
struct GeoResult {
    id: Option<i64>,
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
    admin1: Option<String>,
    admin2: Option<String>,
    admin3: Option<String>,
    admin4: Option<String>,
    country_code: Option<String>,
    timezone: Option<String>,
    feature_code: Option<String>,
}

impl GeoResult {
    fn into_location(self) -> Location {
        Location {
            id: self.id,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            country: self.country,
            admin1: self.admin1,
            admin2: self.admin2,
            admin3: self.admin3,
            admin4: self.admin4,
            country_code: self.country_code,
            timezone: self.timezone,
            feature_code: self.feature_code,
        }
    }

    fn dedupe_key(&self) -> String {
        match self.id {
            Some(id) => format!("id:{}", id),
            None => format!("ll:{:.3},{:.3}", self.latitude, self.longitude),
        }
    }
}

/// A free-text query split into its comma-separated parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub city: String,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Split `"city, state, country"`; blank segments are ignored
///
/// The state is the second segment, the country the last one (only when there
/// are at least three).
pub fn parse_query(raw: &str) -> ParsedQuery {
    let raw = raw.trim();
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    ParsedQuery {
        city: parts.first().copied().unwrap_or(raw).to_string(),
        state: (parts.len() >= 2).then(|| parts[1].to_string()),
        country: (parts.len() >= 3).then(|| parts[parts.len() - 1].to_string()),
    }
}

/// +`exact` when equal, +`prefix` when `value` starts with `wanted` (case-insensitive)
fn match_score(value: Option<&str>, wanted: &str, exact: u32, prefix: u32) -> u32 {
    let value = value.unwrap_or_default().to_lowercase();
    if value == wanted {
        exact
    } else if value.starts_with(wanted) {
        prefix
    } else {
        0
    }
}

fn score(candidate: &GeoResult, query: &ParsedQuery) -> u32 {
    let mut score = match_score(Some(&candidate.name), &query.city.to_lowercase(), 5, 3);
    if let Some(state) = &query.state {
        score += match_score(candidate.admin1.as_deref(), &state.to_lowercase(), 3, 2);
    }
    if let Some(country) = &query.country {
        score += match_score(candidate.country.as_deref(), &country.to_lowercase(), 3, 2);
    }
    score
}

/// Drop repeated candidates, keeping the first occurrence
fn dedupe(candidates: Vec<GeoResult>) -> Vec<GeoResult> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.dedupe_key()))
        .collect()
}

/// Sort by descending score; equal scores keep provider order
fn rank(candidates: &mut [GeoResult], query: &ParsedQuery) {
    candidates.sort_by_cached_key(|c| Reverse(score(c, query)));
}

/// Client for the Open-Meteo geocoding API
#[derive(Debug, Clone)]
pub struct GeocodeClient {
    fetcher: Fetcher,
    cache: CacheManager,
    base_url: String,
}

impl GeocodeClient {
    pub fn new(fetcher: Fetcher, cache: CacheManager) -> Self {
        Self::with_base_url(fetcher, cache, GEOCODING_BASE_URL)
    }

    /// Use a different geocoding host; `/v1/search` and `/v1/reverse` are appended
    pub fn with_base_url(fetcher: Fetcher, cache: CacheManager, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            cache,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn search(
        &self,
        name: &str,
        count: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<GeoResult>, FetchError> {
        let url = format!("{}/v1/search", self.base_url);
        let query = [
            ("name", name.to_string()),
            ("count", count.to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ];
        let response: GeocodeResponse = self.fetcher.get_json(&url, &query, cancel).await?;
        Ok(response.results)
    }

    /// Resolve a free-text query to its best-matching place
    ///
    /// # Returns
    /// * `Ok(Some(Location))` - Highest-ranked candidate
    /// * `Ok(None)` - Empty query or no candidates
    /// * `Err(GeocodeError)` - If the primary search fails
    pub async fn geocode_city(
        &self,
        query: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Location>, GeocodeError> {
        let raw = query.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let key = format!("om-geo:{}", query.to_lowercase());
        if let Some(cached) = self.cache.get::<Location>(&key, CITY_TTL) {
            tracing::debug!(key = %key, "geocode cache hit");
            return Ok(Some(cached));
        }

        let parsed = parse_query(raw);
        let mut candidates = self.search(&parsed.city, CITY_PASS_COUNT, cancel).await?;

        // The full query can surface places the bare city name ranks low
        if raw.to_lowercase() != parsed.city.to_lowercase() {
            match self.search(raw, RAW_PASS_COUNT, cancel).await {
                Ok(extra) => candidates.extend(extra),
                Err(e) if e.is_cancelled() => return Err(e.into()),
                Err(e) => tracing::debug!(error = %e, "raw-query geocode pass failed"),
            }
        }

        let mut candidates = dedupe(candidates);
        rank(&mut candidates, &parsed);

        let Some(best) = candidates.into_iter().next() else {
            tracing::debug!(query = raw, "no geocode candidates");
            return Ok(None);
        };

        let location = best.into_location();
        self.cache.set(&key, &location);
        Ok(Some(location))
    }

    /// Type-ahead suggestions in provider order, at most `limit`
    pub async fn geocode_suggest(
        &self,
        query: &str,
        limit: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Location>, GeocodeError> {
        let q = query.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }

        let key = format!("om-geo-suggest:{}:{}", q.to_lowercase(), limit);
        if let Some(cached) = self.cache.get::<Vec<Location>>(&key, SUGGEST_TTL) {
            return Ok(cached);
        }

        let results = self.search(q, limit, cancel).await?;
        let suggestions: Vec<Location> = results
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, r)| {
                let mut location = r.into_location();
                location.id = location.id.or(Some(i as i64));
                location
            })
            .collect();

        self.cache.set(&key, &suggestions);
        Ok(suggestions)
    }

    /// Best-matching place for a coordinate pair
    pub async fn reverse_geocode(
        &self,
        lat: f64,
        lon: f64,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Location>, GeocodeError> {
        let key = format!("om-rev:{:.3},{:.3}", lat, lon);
        if let Some(cached) = self.cache.get::<Location>(&key, REVERSE_TTL) {
            return Ok(Some(cached));
        }

        let url = format!("{}/v1/reverse", self.base_url);
        let query = [
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ];
        let response: GeocodeResponse = self.fetcher.get_json(&url, &query, cancel).await?;

        let Some(first) = response.results.into_iter().next() else {
            return Ok(None);
        };

        let location = first.into_location();
        self.cache.set(&key, &location);
        Ok(Some(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: Option<i64>, name: &str, admin1: Option<&str>, country: Option<&str>) -> GeoResult {
        GeoResult {
            id,
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

    fn names(candidates: &[GeoResult]) -> Vec<&str> {
        candidates.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_parse_query_single_part() {
        let parsed = parse_query("  Paris ");
        assert_eq!(parsed.city, "Paris");
        assert_eq!(parsed.state, None);
        assert_eq!(parsed.country, None);
    }

    #[test]
    fn test_parse_query_city_and_state() {
        let parsed = parse_query("Portland, Oregon");
        assert_eq!(parsed.city, "Portland");
        assert_eq!(parsed.state.as_deref(), Some("Oregon"));
        assert_eq!(parsed.country, None);
    }

    #[test]
    fn test_parse_query_uses_last_part_as_country() {
        let parsed = parse_query("Springfield, Illinois, Sangamon, United States");
        assert_eq!(parsed.city, "Springfield");
        assert_eq!(parsed.state.as_deref(), Some("Illinois"));
        assert_eq!(parsed.country.as_deref(), Some("United States"));
    }

    #[test]
    fn test_parse_query_skips_blank_segments() {
        let parsed = parse_query("Paris, , France");
        assert_eq!(parsed.city, "Paris");
        assert_eq!(parsed.state.as_deref(), Some("France"));
        assert_eq!(parsed.country, None);
    }

    #[test]
    fn test_exact_name_ranks_above_prefix() {
        let mut candidates = vec![
            candidate(Some(2), "Bengaluru Rural", None, Some("India")),
            candidate(Some(1), "Bengaluru", None, Some("India")),
        ];

        rank(&mut candidates, &parse_query("Bengaluru"));

        assert_eq!(names(&candidates), vec!["Bengaluru", "Bengaluru Rural"]);
    }

    #[test]
    fn test_state_and_country_break_name_ties() {
        let mut candidates = vec![
            candidate(Some(1), "Portland", Some("Maine"), Some("United States")),
            candidate(Some(2), "Portland", Some("Oregon"), Some("United States")),
            candidate(Some(3), "Portland", Some("Victoria"), Some("Australia")),
        ];

        rank(&mut candidates, &parse_query("portland, ore, united states"));

        assert_eq!(candidates[0].id, Some(2));
        assert_eq!(score(&candidates[0], &parse_query("portland, ore, united states")), 5 + 2 + 3);
    }

    #[test]
    fn test_equal_scores_keep_provider_order() {
        let mut candidates = vec![
            candidate(Some(1), "Springfield", Some("Missouri"), None),
            candidate(Some(2), "Springfield", Some("Illinois"), None),
            candidate(Some(3), "Springfield", Some("Massachusetts"), None),
        ];

        rank(&mut candidates, &parse_query("Springfield"));

        let ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_score_ignores_missing_fields() {
        let query = parse_query("Oslo, Oslo, Norway");
        assert_eq!(score(&candidate(None, "Oslo", None, None), &query), 5);
        assert_eq!(score(&candidate(None, "Oslo", Some("Oslo"), Some("Norway")), &query), 11);
    }

    #[test]
    fn test_dedupe_by_id_then_coordinates() {
        let mut far = candidate(None, "Elsewhere", None, None);
        far.latitude = 40.0;
        let mut near_dup = candidate(None, "Same Spot", None, None);
        near_dup.latitude = 12.9701;

        let deduped = dedupe(vec![
            candidate(Some(1), "First", None, None),
            candidate(Some(1), "First again", None, None),
            candidate(None, "Spot", None, None),
            near_dup,
            far,
        ]);

        assert_eq!(names(&deduped), vec!["First", "Spot", "Elsewhere"]);
    }

    #[test]
    fn test_candidates_without_results_field() {
        let response: GeocodeResponse = serde_json::from_str(r#"{"generationtime_ms": 0.5}"#).unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_into_location_keeps_admin_hierarchy() {
        let json = r#"{
            "id": 1277333,
            "name": "Bengaluru",
            "latitude": 12.97194,
            "longitude": 77.59369,
            "feature_code": "PPLA",
            "country_code": "IN",
            "admin1": "Karnataka",
            "admin2": "Bangalore Urban",
            "timezone": "Asia/Kolkata",
            "country": "India"
        }"#;

        let location = serde_json::from_str::<GeoResult>(json).unwrap().into_location();

        assert_eq!(location.id, Some(1277333));
        assert_eq!(location.admin2.as_deref(), Some("Bangalore Urban"));
        assert_eq!(location.country_code.as_deref(), Some("IN"));
        assert_eq!(location.feature_code.as_deref(), Some("PPLA"));
        assert_eq!(location.display_label(), "Bengaluru, Karnataka, India");
    }
}
