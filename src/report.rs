//! Plain-text rendering for the command line
//!
//! Builds the lines printed for a weather record, alert lists, suggestions and
//! comparisons. Values are shown in the caller's unit system.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::app::{CityWeather, DashboardError};
use crate::data::{Location, NormalizedWeather, PressureTrend, Units, WeatherAlert, WeatherIcon};
use crate::signals::{aqi_label, day_phase, format_relative_time, local_now, WeatherEffect};

/// Hours shown in the hourly section
const HOURLY_ROWS: usize = 12;

/// Block characters for the temperature sparkline (8 levels)
const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Icon glyph for an icon key
fn icon_glyph(icon: WeatherIcon) -> &'static str {
    match icon {
        WeatherIcon::Sun => "\u{2600}",      // ☀
        WeatherIcon::Cloud => "\u{2601}",    // ☁
        WeatherIcon::Rain => "\u{1F327}",    // 🌧
        WeatherIcon::Snow => "\u{2744}",     // ❄
        WeatherIcon::Mist => "\u{1F32B}",    // 🌫
        WeatherIcon::Thunder => "\u{26C8}",  // ⛈
    }
}

fn trend_arrow(trend: PressureTrend) -> &'static str {
    match trend {
        PressureTrend::Rising => "↑ rising",
        PressureTrend::Falling => "↓ falling",
        PressureTrend::Steady => "→ steady",
    }
}

fn format_temp_c(celsius: f64, units: Units) -> String {
    match units {
        Units::Metric => format!("{:.0}°C", celsius),
        Units::Imperial => format!("{:.0}°F", celsius * 9.0 / 5.0 + 32.0),
    }
}

/// Picks the stored reading for the requested units
fn format_temp_pair(celsius: f64, fahrenheit: f64, units: Units) -> String {
    match units {
        Units::Metric => format!("{:.0}°C", celsius),
        Units::Imperial => format!("{:.0}°F", fahrenheit),
    }
}

fn format_wind_kph(kph: f64, units: Units) -> String {
    match units {
        Units::Metric => format!("{:.0} km/h", kph),
        Units::Imperial => format!("{:.0} mph", kph / 1.609_344),
    }
}

fn format_time(time: NaiveDateTime) -> String {
    time.format("%H:%M").to_string()
}

/// Map values onto block characters between their min and max
pub fn sparkline(values: &[f64]) -> String {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = max - min;

    values
        .iter()
        .map(|v| {
            let normalized = if span > 0.0 { (v - min) / span } else { 0.5 };
            BLOCKS[((normalized * 7.0).round() as usize).min(7)]
        })
        .collect()
}

/// Full text report for one record
pub fn render_weather(weather: &NormalizedWeather, units: Units, now: DateTime<Utc>) -> String {
    let c = &weather.current;
    let local = local_now(weather.utc_offset_seconds, now);
    let phase = day_phase(c.sunrise, c.sunset, local);

    let mut lines = vec![
        weather.location.name.clone(),
        format!(
            "Updated {} · {}",
            format_relative_time(weather.fetched_at, now.timestamp_millis()),
            phase.as_str()
        ),
        String::new(),
    ];

    let (temp, feels, wind) = match units {
        Units::Metric => (
            format!("{:.0}°C", c.temp_c),
            c.feels_c.map(|t| format!("{:.0}°C", t)),
            c.wind_kph.map(|w| format!("{:.0} km/h", w)),
        ),
        Units::Imperial => (
            format!("{:.0}°F", c.temp_f),
            c.feels_f.map(|t| format!("{:.0}°F", t)),
            c.wind_mph.map(|w| format!("{:.0} mph", w)),
        ),
    };

    let mut headline = format!("{}  {}", icon_glyph(c.icon), temp);
    if let Some(feels) = feels {
        headline.push_str(&format!(" (feels {})", feels));
    }
    match WeatherEffect::from_icon(c.icon) {
        WeatherEffect::None => {}
        effect => headline.push_str(&format!("  [{}]", effect.as_str())),
    }
    lines.push(headline);

    let mut push_field = |label: &str, value: Option<String>| {
        if let Some(value) = value {
            lines.push(format!("{:<12}{}", label, value));
        }
    };
    push_field("Humidity", c.humidity.map(|h| format!("{:.0}%", h)));
    push_field("Wind", wind);
    push_field("Gusts", c.wind_gust_kph.map(|g| format_wind_kph(g, units)));
    push_field(
        "Pressure",
        c.pressure_hpa.map(|p| match weather.pressure_trend {
            Some(trend) => format!("{:.0} hPa {}", p, trend_arrow(trend)),
            None => format!("{:.0} hPa", p),
        }),
    );
    push_field("UV", c.uv.map(|uv| format!("{:.1}", uv)));
    push_field("Visibility", c.visibility_km.map(|v| format!("{:.0} km", v)));
    push_field("Dew point", c.dew_point_c.map(|d| format_temp_c(d, units)));
    push_field("Clouds", c.cloud_cover_pct.map(|cc| format!("{:.0}%", cc)));
    push_field(
        "Air quality",
        Some(match weather.aqi {
            Some(aqi) => format!("{} ({})", aqi, aqi_label(Some(aqi))),
            None => aqi_label(None).to_string(),
        }),
    );
    if let Some(sun) = &weather.sun {
        push_field(
            "Sun",
            Some(format!("↑ {}  ↓ {}", format_time(sun.sunrise), format_time(sun.sunset))),
        );
    }

    let upcoming: Vec<_> = weather
        .hourly
        .iter()
        .filter(|h| h.time + chrono::Duration::hours(1) > local)
        .take(HOURLY_ROWS)
        .collect();
    if !upcoming.is_empty() {
        let temps: Vec<f64> = upcoming.iter().map(|h| h.temp_c).collect();
        lines.push(String::new());
        lines.push(format!("Next {} hours  {}", upcoming.len(), sparkline(&temps)));
        for hour in upcoming {
            let mut row = format!(
                "  {:<6}{:<7}",
                format_time(hour.time),
                format_temp_c(hour.temp_c, units)
            );
            if let Some(p) = hour.precip_prob {
                row.push_str(&format!("{:>4.0}% rain", p));
            }
            if let Some(w) = hour.wind_kph {
                row.push_str(&format!("  {}", format_wind_kph(w, units)));
            }
            lines.push(row.trim_end().to_string());
        }
    }

    if !weather.daily.is_empty() {
        lines.push(String::new());
        for day in &weather.daily {
            lines.push(format!(
                "  {}  {}  {} / {}",
                day.date.format("%a %d %b"),
                icon_glyph(day.icon),
                format_temp_c(day.min_c, units),
                format_temp_c(day.max_c, units)
            ));
        }
    }

    lines.join("\n")
}

/// One line per place: label, temperature, icon and AQI, or the error
pub fn render_compare(
    results: &[(String, Result<CityWeather, DashboardError>)],
    units: Units,
) -> String {
    let width = results
        .iter()
        .map(|(input, result)| match result {
            Ok(loaded) => loaded.place.label.chars().count(),
            Err(_) => input.chars().count(),
        })
        .max()
        .unwrap_or(0);

    results
        .iter()
        .map(|(input, result)| match result {
            Ok(loaded) => {
                let c = &loaded.weather.current;
                format!(
                    "{:<width$}  {}  {:>5}  AQI {}",
                    loaded.place.label,
                    icon_glyph(c.icon),
                    format_temp_pair(c.temp_c, c.temp_f, units),
                    loaded
                        .weather
                        .aqi
                        .map_or_else(|| aqi_label(None).to_string(), |a| a.to_string()),
                    width = width
                )
            }
            Err(e) => format!("{:<width$}  {}", input, e.user_message(), width = width),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_locations(locations: &[Location]) -> String {
    if locations.is_empty() {
        return "No matches".to_string();
    }
    locations
        .iter()
        .map(|l| format!("{}  ({:.4}, {:.4})", l.display_label(), l.latitude, l.longitude))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_alerts(label: &str, alerts: &[WeatherAlert]) -> String {
    if alerts.is_empty() {
        return format!("No active alerts for {}", label);
    }

    let mut lines = vec![format!("{} · {} active", label, alerts.len())];
    for alert in alerts {
        lines.push(String::new());
        lines.push(format!(
            "{} [{}]",
            alert.event.as_deref().unwrap_or("Weather Alert"),
            alert.severity.as_deref().unwrap_or("Alert")
        ));
        if let (Some(start), Some(end)) = (&alert.start, &alert.end) {
            lines.push(format!("  {} → {}", start, end));
        }
        if let Some(sender) = &alert.sender {
            lines.push(format!("  Issued by {}", sender));
        }
        if !alert.regions.is_empty() {
            lines.push(format!("  Regions: {}", alert.regions.join(", ")));
        }
        for text in [&alert.description, &alert.instruction].into_iter().flatten() {
            lines.push(format!("  {}", text.trim()));
        }
        if let Some(url) = &alert.url {
            lines.push(format!("  {}", url));
        }
    }
    lines.join("\n")
}
