//! OpenWeather `current` block rendering.

use crate::codec::text::{format_observed_at, DateZone};
use serde_json::Value;

/// Renders an OpenWeather one-call response as comment text.
///
/// Output shape: `temp=72°F (feels like 70°F) humidity=40% on <date>.`
/// Missing fields are skipped; malformed input yields a failure sentence
/// instead of an error so the text can still be appended.
pub fn summarize_open_weather(json: &str, zone: DateZone) -> String {
    let Ok(root) = serde_json::from_str::<Value>(json) else {
        return "Get weather failed: invalid response.".to_string();
    };
    let Some(current) = root.get("current").filter(|value| value.is_object()) else {
        return "Current weather not found.".to_string();
    };

    let mut parts = Vec::new();
    if let Some(temp) = current.get("temp").and_then(Value::as_f64) {
        parts.push(format!("temp={temp:.0}°F"));
    }
    if let Some(feels_like) = current.get("feels_like").and_then(Value::as_f64) {
        parts.push(format!("(feels like {feels_like:.0}°F)"));
    }
    if let Some(humidity) = current.get("humidity").and_then(Value::as_i64) {
        parts.push(format!("humidity={humidity}%"));
    }
    if let Some(date) = current
        .get("dt")
        .and_then(Value::as_i64)
        .filter(|seconds| *seconds != 0)
        .and_then(|seconds| format_observed_at(seconds.saturating_mul(1000), zone))
    {
        parts.push(format!("on {date}"));
    }

    if parts.is_empty() {
        return "No data found.".to_string();
    }
    format!("{}.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::summarize_open_weather;
    use crate::codec::text::DateZone;
    use chrono::FixedOffset;

    fn utc() -> DateZone {
        DateZone::Fixed(FixedOffset::east_opt(0).unwrap())
    }

    #[test]
    fn renders_all_known_fields() {
        let json = r#"{"current":{"temp":71.6,"feels_like":70.2,"humidity":40,"dt":1704117600}}"#;
        assert_eq!(
            summarize_open_weather(json, utc()),
            "temp=72°F (feels like 70°F) humidity=40% on Jan 01, 2024 14:00:00 +0000."
        );
    }

    #[test]
    fn reports_missing_current_block_and_bad_json() {
        assert_eq!(
            summarize_open_weather(r#"{"hourly":[]}"#, utc()),
            "Current weather not found."
        );
        assert_eq!(
            summarize_open_weather("not json", utc()),
            "Get weather failed: invalid response."
        );
        assert_eq!(
            summarize_open_weather(r#"{"current":{}}"#, utc()),
            "No data found."
        );
    }
}
