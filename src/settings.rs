//! User settings
//!
//! Settings are a plain value loaded once from `settings.toml` and passed to
//! whatever needs them. Missing files yield defaults.
//!
//! ```toml
//! units = "imperial"
//! request_timeout_secs = 8
//!
//! [endpoints]
//! forecast = "http://localhost:8080/v1/forecast"
//!
//! [[favorites]]
//! type = "city"
//! label = "Bengaluru"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::air_quality::AIR_QUALITY_BASE_URL;
use crate::data::alerts::ALERTS_BASE_URL;
use crate::data::geocode::GEOCODING_BASE_URL;
use crate::data::weather::FORECAST_BASE_URL;
use crate::data::Units;
use crate::fetch::DEFAULT_TIMEOUT;

const SETTINGS_FILE: &str = "settings.toml";

/// Errors that can occur when loading or saving settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine platform config directory")]
    NoConfigDir,
}

/// Upstream base URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub forecast: String,
    pub air_quality: String,
    /// Host only; `/v1/search` and `/v1/reverse` are appended
    pub geocoding: String,
    pub warnings: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            forecast: FORECAST_BASE_URL.to_string(),
            air_quality: AIR_QUALITY_BASE_URL.to_string(),
            geocoding: GEOCODING_BASE_URL.to_string(),
            warnings: ALERTS_BASE_URL.to_string(),
        }
    }
}

/// A saved place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Favorite {
    /// Resolved through the geocoder each time
    City { label: String },
    Coords { label: String, lat: f64, lon: f64 },
}

impl Favorite {
    pub fn label(&self) -> &str {
        match self {
            Favorite::City { label } | Favorite::Coords { label, .. } => label,
        }
    }

    /// Query string that resolves back to this place
    pub fn query(&self) -> String {
        match self {
            Favorite::City { label } => label.clone(),
            Favorite::Coords { lat, lon, .. } => format!("{}, {}", lat, lon),
        }
    }
}

/// Top-level settings stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub units: Units,
    pub request_timeout_secs: u64,
    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,
    pub endpoints: Endpoints,
    pub favorites: Vec<Favorite>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            units: Units::default(),
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            cache_dir: None,
            endpoints: Endpoints::default(),
            favorites: Vec::new(),
        }
    }
}

/// Platform directories for this application, shared by settings and cache
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "weatherdash", "weatherdash")
}

impl Settings {
    /// Platform location of the settings file
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let dirs = project_dirs().ok_or(SettingsError::NoConfigDir)?;
        Ok(dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Load from the platform location, or defaults when there is none
    pub fn load() -> Result<Self, SettingsError> {
        match Self::default_path() {
            Ok(path) => Self::load_from(&path),
            Err(SettingsError::NoConfigDir) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write to `path`, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source: io::Error| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(io_err)
    }

    /// Per-request timeout; zero falls back to the default
    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_secs == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_secs(self.request_timeout_secs)
        }
    }

    /// Add a favorite unless one with the same label exists; returns whether it was added
    pub fn add_favorite(&mut self, favorite: Favorite) -> bool {
        if self
            .favorites
            .iter()
            .any(|f| f.label().eq_ignore_ascii_case(favorite.label()))
        {
            return false;
        }
        self.favorites.push(favorite);
        true
    }
}
