//! weatherdash - weather conditions, forecasts and alerts from the command line
//!
//! Resolves places through the Open-Meteo geocoder, prints normalized forecasts
//! with air quality, and keeps a local cache so repeat lookups stay offline.

use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use weatherdash::app::{Dashboard, DashboardError};
use weatherdash::cli::{join_words, log_filter, Cli, CliError, Command, StartupConfig};
use weatherdash::report;
use weatherdash::settings::{Favorite, Settings};
use weatherdash::{parse_target, Target};

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Cli(#[from] CliError),

    #[error("{}", .0.user_message())]
    Dashboard(#[from] DashboardError),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No places given and no favorites saved")]
    NothingToCompare,

    #[error("No settings file location available; pass --config")]
    NoSettingsPath,
}

impl RunError {
    fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Dashboard(e) if e.is_cancelled())
    }
}

fn init_tracing(verbose: u8) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter(verbose))),
        )
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), RunError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), RunError> {
    let config = StartupConfig::from_cli(&cli)?;

    if let Command::Favorite { place } = &cli.command {
        return save_favorite(config.settings, config.settings_path, &join_words(place));
    }

    let dashboard = Dashboard::new(&config.settings)?;
    let units = dashboard.units();
    let cancel = Some(&cancel);

    let result = match cli.command {
        Command::Weather { place } => {
            let loaded = dashboard.load_with_aqi(&join_words(&place), cancel).await?;
            if config.json {
                print_json(&loaded.weather)
            } else {
                println!("{}", report::render_weather(&loaded.weather, units, Utc::now()));
                Ok(())
            }
        }
        Command::Suggest { query, limit } => {
            let suggestions = dashboard.suggest(&join_words(&query), limit, cancel).await?;
            if config.json {
                print_json(&suggestions)
            } else {
                println!("{}", report::render_locations(&suggestions));
                Ok(())
            }
        }
        Command::Reverse { lat, lon } => {
            let location = dashboard.reverse(lat, lon, cancel).await?;
            if config.json {
                print_json(&location)
            } else {
                let found: Vec<_> = location.into_iter().collect();
                println!("{}", report::render_locations(&found));
                Ok(())
            }
        }
        Command::Compare { places } => {
            let places = if places.is_empty() {
                config.settings.favorites.iter().map(Favorite::query).collect()
            } else {
                places
            };
            if places.is_empty() {
                return Err(RunError::NothingToCompare);
            }

            let results = dashboard.compare(&places, cancel).await;
            if results
                .iter()
                .any(|(_, r)| r.as_ref().is_err_and(DashboardError::is_cancelled))
            {
                return Ok(());
            }

            if config.json {
                let rows: Vec<_> = results
                    .iter()
                    .map(|(input, result)| match result {
                        Ok(loaded) => json!({ "query": input, "weather": loaded.weather }),
                        Err(e) => json!({ "query": input, "error": e.user_message() }),
                    })
                    .collect();
                print_json(&rows)
            } else {
                println!("{}", report::render_compare(&results, units));
                Ok(())
            }
        }
        Command::Alerts { place } => {
            let (place, alerts) = dashboard.alerts(&join_words(&place), cancel).await?;
            if config.json {
                print_json(&alerts)
            } else {
                println!("{}", report::render_alerts(&place.label, &alerts));
                Ok(())
            }
        }
        Command::Favorite { .. } => Ok(()),
    };

    dashboard.shutdown();
    result
}

fn save_favorite(
    mut settings: Settings,
    path: Option<std::path::PathBuf>,
    place: &str,
) -> Result<(), RunError> {
    let path = path.ok_or(RunError::NoSettingsPath)?;
    let favorite = match parse_target(place) {
        Target::Coordinates { lat, lon } => Favorite::Coords {
            label: format!("{:.4}, {:.4}", lat, lon),
            lat,
            lon,
        },
        Target::Query(label) => Favorite::City { label },
    };

    if settings.add_favorite(favorite) {
        settings.save_to(&path).map_err(CliError::from)?;
        println!("Saved {}", place);
    } else {
        println!("{} is already a favorite", place);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();

    let result = runtime.block_on(async move {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        run(cli, cancel).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => ExitCode::from(130),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
