use super::types::{IntervalSample, WeatherCondition};

const PRECIPITATION_PREFIXES: [&str; 3] = ["09", "10", "11"];

/// A dry category drawn with a rain, shower or storm icon.
pub fn is_mismatched(condition: &WeatherCondition) -> bool {
    matches!(condition.category.as_str(), "Clear" | "Clouds")
        && PRECIPITATION_PREFIXES.contains(&condition.icon_prefix())
}

pub fn is_consistent(condition: &WeatherCondition) -> bool {
    match condition.category.as_str() {
        "Clear" => condition.icon_prefix() == "01",
        "Clouds" => matches!(condition.icon_prefix(), "02" | "03" | "04"),
        _ => false,
    }
}

/// Replace a mismatched display condition with the first consistent sibling
/// in chronological order. Returns true when a substitution was made.
///
/// Leaves the condition alone when it is plausible or when no sibling fits.
pub fn reconcile(condition: &mut WeatherCondition, siblings: &[IntervalSample]) -> bool {
    if !is_mismatched(condition) {
        return false;
    }

    match siblings.iter().find(|s| is_consistent(&s.condition)) {
        Some(sibling) => {
            *condition = sibling.condition.clone();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::bucket::tests::{sample_at, DAY0};

    fn sibling(hour: i64, condition: WeatherCondition) -> IntervalSample {
        IntervalSample {
            condition,
            ..sample_at(DAY0 + hour * 3600, 10.0, 20.0)
        }
    }

    #[test]
    fn test_mismatch_detection() {
        assert!(is_mismatched(&WeatherCondition::new("Clear", "clear sky", "10d")));
        assert!(is_mismatched(&WeatherCondition::new("Clouds", "overcast", "11n")));
        assert!(!is_mismatched(&WeatherCondition::new("Rain", "light rain", "10d")));
        assert!(!is_mismatched(&WeatherCondition::new("Clear", "clear sky", "01d")));
    }

    #[test]
    fn test_replaces_with_consistent_sibling() {
        let mut condition = WeatherCondition::new("Clear", "clear sky", "10d");
        let siblings = vec![
            sibling(9, WeatherCondition::new("Rain", "light rain", "10d")),
            sibling(12, WeatherCondition::new("Clear", "clear sky", "10d")),
            sibling(15, WeatherCondition::new("Clear", "clear sky", "01d")),
            sibling(18, WeatherCondition::new("Clouds", "few clouds", "02d")),
        ];

        assert!(reconcile(&mut condition, &siblings));
        assert_eq!(condition, WeatherCondition::new("Clear", "clear sky", "01d"));
    }

    #[test]
    fn test_keeps_original_without_consistent_sibling() {
        let original = WeatherCondition::new("Clouds", "broken clouds", "09d");
        let mut condition = original.clone();
        let siblings = vec![
            sibling(9, WeatherCondition::new("Rain", "shower rain", "09d")),
            sibling(12, original.clone()),
        ];

        assert!(!reconcile(&mut condition, &siblings));
        assert_eq!(condition, original);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let siblings = vec![
            sibling(12, WeatherCondition::new("Clear", "clear sky", "10d")),
            sibling(15, WeatherCondition::new("Clouds", "scattered clouds", "03d")),
        ];
        let mut once = WeatherCondition::new("Clear", "clear sky", "10d");
        reconcile(&mut once, &siblings);

        let mut twice = once.clone();
        assert!(!reconcile(&mut twice, &siblings));
        assert_eq!(once, twice);
        assert_eq!(once.icon, "03d");
    }
}
