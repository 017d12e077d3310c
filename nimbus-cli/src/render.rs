use std::fmt::Write;

use chrono::{DateTime, Local};
use nimbus_core::{ConditionCategory, RunOutcome, Snapshot};

fn glyph(category: ConditionCategory) -> &'static str {
    match category {
        ConditionCategory::Clear => "☀",
        ConditionCategory::PartlyCloudy => "⛅",
        ConditionCategory::Cloudy => "☁",
        ConditionCategory::Rain => "🌧",
        ConditionCategory::Thunderstorm => "⛈",
        ConditionCategory::Snow => "❄",
        ConditionCategory::Mist => "🌫",
    }
}

fn local_time(unix_seconds: i64, format: &str) -> String {
    DateTime::from_timestamp(unix_seconds, 0)
        .map(|t| t.with_timezone(&Local).format(format).to_string())
        .unwrap_or_else(|| "?".to_string())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Text for a snapshot-bearing outcome; `Failed` renders as an empty string.
pub fn outcome(outcome: &RunOutcome, forecast_limit: usize) -> String {
    let Some(snapshot) = outcome.snapshot() else {
        return String::new();
    };

    let mut out = snapshot_text(snapshot, forecast_limit);
    if let RunOutcome::Degraded { snapshot, reason } = outcome {
        let _ = writeln!(
            out,
            "(offline: showing data from {}, reason: {reason})",
            local_time(snapshot.captured_at_unix_seconds, "%Y-%m-%d %H:%M")
        );
    }
    out
}

fn snapshot_text(snapshot: &Snapshot, forecast_limit: usize) -> String {
    let c = &snapshot.conditions;
    let category = ConditionCategory::from_condition_code(&c.condition_code);
    let mut out = String::new();

    let place = if c.country_code.is_empty() {
        c.place_name.clone()
    } else {
        format!("{}, {}", c.place_name, c.country_code)
    };
    let _ = writeln!(out, "{place}  {} {}", glyph(category), capitalize(&c.condition_text));
    let _ = writeln!(
        out,
        "  {}°C   humidity {}%   wind {:.1} km/h",
        c.temperature_celsius.round(),
        c.humidity_percent,
        c.wind_speed_kph
    );

    if forecast_limit > 0 && !snapshot.forecast.is_empty() {
        let _ = writeln!(out, "Forecast:");
        for entry in snapshot.forecast.iter().take(forecast_limit) {
            let category = ConditionCategory::from_condition_code(&entry.condition_code);
            let _ = writeln!(
                out,
                "  {}  {:>4}°C  {} {}",
                local_time(entry.timestamp_unix_seconds, "%a %H:%M"),
                entry.temperature_celsius.round(),
                glyph(category),
                entry.condition_text
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::{
        Coordinates, CurrentConditions, FailureReason, ForecastEntry, NoDataAvailable,
    };

    fn snapshot(forecast: usize) -> Snapshot {
        Snapshot::fresh(
            CurrentConditions {
                place_name: "Springfield".into(),
                country_code: "US".into(),
                temperature_celsius: 21.0,
                humidity_percent: 40,
                wind_speed_kph: 14.76,
                condition_code: "03d".into(),
                condition_text: "scattered clouds".into(),
                coordinates: Coordinates::new(39.8, -89.64).unwrap(),
            },
            (0..forecast)
                .map(|i| ForecastEntry {
                    timestamp_unix_seconds: 1_700_000_000 + i as i64 * 10_800,
                    temperature_celsius: 15.4,
                    condition_code: "10d".into(),
                    condition_text: "light rain".into(),
                })
                .collect(),
            1_700_000_000,
        )
    }

    #[test]
    fn fresh_outcome_shows_conditions_and_limited_forecast() {
        let text = outcome(&RunOutcome::Succeeded(snapshot(12)), 8);

        assert!(text.starts_with("Springfield, US  ☁ Scattered clouds\n"));
        assert!(text.contains("21°C   humidity 40%   wind 14.8 km/h"));
        assert_eq!(text.matches("light rain").count(), 8);
        assert!(!text.contains("offline"));
    }

    #[test]
    fn zero_limit_hides_forecast() {
        let text = outcome(&RunOutcome::Succeeded(snapshot(3)), 0);
        assert!(!text.contains("Forecast:"));
    }

    #[test]
    fn degraded_outcome_is_labelled() {
        let degraded = RunOutcome::Degraded {
            snapshot: snapshot(0).into_stale(),
            reason: FailureReason::Network,
        };
        let text = outcome(&degraded, 8);
        assert!(text.contains("offline: showing data from"));
        assert!(text.contains("reason: network"));
    }

    #[test]
    fn failed_outcome_renders_nothing() {
        let failed = RunOutcome::Failed(NoDataAvailable { reason: FailureReason::NotFound });
        assert_eq!(outcome(&failed, 8), "");
    }

    #[test]
    fn capitalize_handles_empty_and_unicode() {
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("éclaircies"), "Éclaircies");
    }
}
