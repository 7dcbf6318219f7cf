use chrono::{DateTime, Utc};
use serde::Serialize;

const MAX_CITY_LEN: usize = 100;

/// Validate latitude and longitude coordinates
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("Invalid latitude: {}. Must be between -90 and 90", lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("Invalid longitude: {}. Must be between -180 and 180", lon));
    }
    Ok(())
}

pub fn is_valid_coordinates(lat: f64, lon: f64) -> bool {
    validate_coordinates(lat, lon).is_ok()
}

/// Validate a `"City"`, `"City, CC"` or `"City, State, CC"` name and return
/// it with normalized spacing.
pub fn validate_city_name(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("City name is empty".to_string());
    }
    if trimmed.chars().count() > MAX_CITY_LEN {
        return Err(format!("City name is longer than {} characters", MAX_CITY_LEN));
    }

    let parts: Vec<String> = trimmed
        .split(',')
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(format!("Malformed city name: {}", trimmed));
    }

    let (country, places) = match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => (Some(last), rest),
        _ => (None, parts.as_slice()),
    };

    for place in places {
        let allowed = place
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'' || c == '.');
        if !allowed || !place.chars().any(char::is_alphabetic) {
            return Err(format!("Malformed city name: {}", trimmed));
        }
    }
    if let Some(code) = country {
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("Invalid country code: {}", code));
        }
    }

    let mut normalized = places.join(", ");
    if let Some(code) = country {
        normalized.push_str(", ");
        normalized.push_str(&code.to_uppercase());
    }
    Ok(normalized)
}

/// Sanitize user input strings
pub fn sanitize_string(input: &str, max_length: usize) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ".,!?-_()[]{}:;'\"°%".contains(*c))
        .take(max_length)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parse timezone string and validate
pub fn parse_timezone(tz_str: &str) -> Result<chrono_tz::Tz, String> {
    tz_str
        .parse::<chrono_tz::Tz>()
        .map_err(|_| format!("Invalid timezone: {}", tz_str))
}

/// Error response helper
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(0.0, 0.0).is_ok());
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(-90.0, -180.0).is_ok());
        assert!(validate_coordinates(91.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, 181.0).is_err());
    }

    #[test]
    fn test_validate_city_name() {
        assert_eq!(validate_city_name("  london ,  gb ").unwrap(), "london, GB");
        assert_eq!(validate_city_name("São Paulo").unwrap(), "São Paulo");
        assert_eq!(validate_city_name("Portland, Oregon, us").unwrap(), "Portland, Oregon, US");
        assert!(validate_city_name("").is_err());
        assert!(validate_city_name("   ").is_err());
        assert!(validate_city_name("Paris,").is_err());
        assert!(validate_city_name("Paris, France").is_err());
        assert!(validate_city_name("12345").is_err());
        assert!(validate_city_name("<script>, US").is_err());
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("Will it rain?", 20), "Will it rain?");
        assert_eq!(sanitize_string("<b>hot</b>", 20), "bhotb");
        assert_eq!(sanitize_string("Very long string that exceeds limit", 10), "Very long");
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("Asia/Jakarta").is_ok());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
