//! Command-line interface parsing for weatherdash
//!
//! This module handles parsing of CLI arguments using clap and merging them with
//! the settings file into the configuration the binary runs with.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;

use crate::data::Units;
use crate::settings::{Settings, SettingsError};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified unit system is not recognized
    #[error("Invalid units: '{0}'. Valid units: metric, imperial")]
    InvalidUnits(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// weatherdash - current conditions, forecasts and alerts for any place
#[derive(Parser, Debug)]
#[command(name = "weatherdash")]
#[command(about = "Weather dashboard: conditions, forecasts, air quality and alerts")]
#[command(version)]
pub struct Cli {
    /// Unit system for display and provider requests (metric, imperial)
    #[arg(long, global = true, value_name = "UNITS", value_parser = parse_units_arg)]
    pub units: Option<Units>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Settings file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Current conditions and forecast for a place or "lat, lon"
    ///
    /// Examples:
    ///   weatherdash weather Bengaluru
    ///   weatherdash weather Portland, Oregon
    ///   weatherdash weather -- -33.87, 151.21
    #[command(allow_negative_numbers = true)]
    Weather {
        #[arg(required = true, num_args = 1..)]
        place: Vec<String>,
    },

    /// Place-name suggestions for partial input
    Suggest {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of suggestions
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Name the place at a coordinate pair
    #[command(allow_negative_numbers = true)]
    Reverse { lat: f64, lon: f64 },

    /// Side-by-side conditions; uses saved favorites when no places are given
    Compare { places: Vec<String> },

    /// Active weather alerts for a place
    #[command(allow_negative_numbers = true)]
    Alerts {
        #[arg(required = true, num_args = 1..)]
        place: Vec<String>,
    },

    /// Save a place to the favorites list in the settings file
    #[command(allow_negative_numbers = true)]
    Favorite {
        #[arg(required = true, num_args = 1..)]
        place: Vec<String>,
    },
}

/// Parses a units string argument into a Units value.
///
/// # Arguments
/// * `s` - The units string from CLI
///
/// # Returns
/// * `Ok(Units)` if the string names a known unit system
/// * `Err(CliError::InvalidUnits)` otherwise
pub fn parse_units_arg(s: &str) -> Result<Units, CliError> {
    s.parse::<Units>()
        .map_err(|_| CliError::InvalidUnits(s.to_string()))
}

/// Joins words passed as separate arguments back into one query
pub fn join_words(words: &[String]) -> String {
    words.join(" ").trim().to_string()
}

/// Log filter used when `RUST_LOG` is not set
pub fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Configuration derived from CLI arguments and the settings file
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub settings: Settings,
    /// Where the settings came from (and where favorites are saved)
    pub settings_path: Option<PathBuf>,
    pub json: bool,
}

impl StartupConfig {
    /// Load settings and apply command-line overrides.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with flags taking precedence over the file
    /// * `Err(CliError)` if the settings file could not be read
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let settings_path = match &cli.config {
            Some(path) => Some(path.clone()),
            None => Settings::default_path().ok(),
        };
        let settings = match &settings_path {
            Some(path) => Settings::load_from(path)?,
            None => Settings::default(),
        };
        Ok(Self::with_settings(cli, settings, settings_path))
    }

    /// Apply command-line overrides to already loaded settings
    pub fn with_settings(cli: &Cli, mut settings: Settings, settings_path: Option<PathBuf>) -> Self {
        if let Some(units) = cli.units {
            settings.units = units;
        }
        Self {
            settings,
            settings_path,
            json: cli.json,
        }
    }
}
