//! weatherdash library
//!
//! The weather dashboard core: a two-tier TTL cache, the Open-Meteo geocoder,
//! the forecast normalizer with background AQI enrichment, and the derived
//! display signals. The binary in `main.rs` is a thin front end over `app`.

pub mod app;
pub mod cache;
pub mod cli;
pub mod data;
pub mod enrichment;
pub mod fetch;
pub mod report;
pub mod settings;
pub mod signals;

pub use app::{parse_target, CityWeather, Dashboard, DashboardError, Place, Target};
pub use cache::CacheManager;
pub use data::{Location, NormalizedWeather, Units};
pub use enrichment::EnrichmentMessage;
pub use fetch::{FetchError, Fetcher};
