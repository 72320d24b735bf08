//! Derived display signals
//!
//! Pure mappings from weather data to the small categorical values presentation
//! needs: time of day, AQI category and color, ambient weather effect, and how
//! long ago a record was fetched.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::data::weather::parse_local_datetime;
use crate::data::WeatherIcon;

/// Coarse time of day relative to sunrise and sunset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPhase {
    Night,
    Dawn,
    Day,
    Dusk,
}

impl DayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayPhase::Night => "night",
            DayPhase::Dawn => "dawn",
            DayPhase::Day => "day",
            DayPhase::Dusk => "dusk",
        }
    }
}

/// Classify `now` against one-hour windows either side of sunrise and sunset
///
/// All three times are wall-clock times in the same zone. Without both sunrise
/// and sunset the phase is `Day`.
pub fn day_phase(
    sunrise: Option<NaiveDateTime>,
    sunset: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> DayPhase {
    let (Some(sunrise), Some(sunset)) = (sunrise, sunset) else {
        return DayPhase::Day;
    };

    let hour = Duration::hours(1);
    let dawn_end = sunrise + hour;
    let dusk_start = sunset - hour;

    if now >= sunrise - hour && now <= dawn_end {
        DayPhase::Dawn
    } else if now >= dusk_start && now <= sunset + hour {
        DayPhase::Dusk
    } else if now > dawn_end && now < dusk_start {
        DayPhase::Day
    } else {
        DayPhase::Night
    }
}

/// [`day_phase`] over raw provider timestamps; unparseable input counts as missing
pub fn day_phase_from_strs(
    sunrise: Option<&str>,
    sunset: Option<&str>,
    now: NaiveDateTime,
) -> DayPhase {
    day_phase(
        sunrise.and_then(parse_local_datetime),
        sunset.and_then(parse_local_datetime),
        now,
    )
}

/// Wall-clock time at a location `utc_offset_seconds` away from UTC
pub fn local_now(utc_offset_seconds: i32, now: DateTime<Utc>) -> NaiveDateTime {
    now.naive_utc() + Duration::seconds(i64::from(utc_offset_seconds))
}

/// Category label for an AQI value
pub fn aqi_label(aqi: Option<u16>) -> &'static str {
    match aqi {
        None => "—",
        Some(0..=50) => "Good",
        Some(51..=100) => "Moderate",
        Some(101..=150) => "Unhealthy (SG)",
        Some(151..=200) => "Unhealthy",
        Some(201..=300) => "Very Unhealthy",
        Some(_) => "Hazardous",
    }
}

/// Hex color for an AQI value, parallel to [`aqi_label`]
pub fn aqi_color(aqi: Option<u16>) -> &'static str {
    match aqi {
        None => "#6b7280",
        Some(0..=50) => "#22c55e",
        Some(51..=100) => "#eab308",
        Some(101..=150) => "#f97316",
        Some(151..=200) => "#ef4444",
        Some(201..=300) => "#a855f7",
        Some(_) => "#7f1d1d",
    }
}

/// Ambient effect to overlay for the current conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherEffect {
    None,
    Rain,
    Snow,
    Thunder,
}

impl WeatherEffect {
    pub fn from_icon(icon: WeatherIcon) -> Self {
        match icon {
            WeatherIcon::Rain => WeatherEffect::Rain,
            WeatherIcon::Snow => WeatherEffect::Snow,
            WeatherIcon::Thunder => WeatherEffect::Thunder,
            WeatherIcon::Sun | WeatherIcon::Cloud | WeatherIcon::Mist => WeatherEffect::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherEffect::None => "none",
            WeatherEffect::Rain => "rain",
            WeatherEffect::Snow => "snow",
            WeatherEffect::Thunder => "thunder",
        }
    }
}

/// Human "time ago" for an epoch-millisecond timestamp
///
/// Timestamps in the future read as "just now".
pub fn format_relative_time(then_ms: i64, now_ms: i64) -> String {
    let seconds = (now_ms - then_ms).max(0) / 1000;
    if seconds < 5 {
        return "just now".to_string();
    }
    if seconds < 60 {
        return format!("{}s ago", seconds);
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return plural(minutes, "min");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hr");
    }

    plural(hours / 24, "day")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}
