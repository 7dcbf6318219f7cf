use super::bucket::{bucketize, representative_index, temperature_range};
use super::reconcile::reconcile;
use super::types::*;
use chrono::TimeZone;

/// Collapse 3-hour samples into one forecast per local calendar day.
pub fn build_daily<Tz: TimeZone>(samples: &[IntervalSample], tz: &Tz) -> Vec<DailyForecast> {
    bucketize(samples, tz)
        .iter()
        .filter_map(|bucket| daily_from_bucket(bucket, tz))
        .collect()
}

fn daily_from_bucket<Tz: TimeZone>(bucket: &DayBucket, tz: &Tz) -> Option<DailyForecast> {
    let idx = representative_index(bucket, tz)?;
    let (temp_min, temp_max) = temperature_range(bucket)?;
    let representative = &bucket.samples[idx];

    let mut condition = representative.condition.clone();
    if reconcile(&mut condition, &bucket.samples) {
        tracing::debug!(
            "Reconciled {} display condition {}/{} -> {}/{}",
            bucket.key(),
            representative.condition.category,
            representative.condition.icon,
            condition.category,
            condition.icon
        );
    }

    Some(DailyForecast {
        date: bucket.date,
        ts: representative.ts,
        temp_min,
        temp_max,
        temp_day: representative.temp,
        humidity: representative.humidity,
        wind_speed: representative.wind_speed,
        pop: representative.pop,
        condition,
    })
}

/// The next `limit` samples whose 3-hour slot has not ended before `now_ts`.
pub fn build_hourly(samples: &[IntervalSample], now_ts: i64, limit: usize) -> Vec<HourlyForecast> {
    samples
        .iter()
        .filter(|s| s.ts + 3 * 3600 > now_ts)
        .take(limit)
        .map(|s| HourlyForecast {
            ts: s.ts,
            temp: s.temp,
            humidity: s.humidity,
            wind_speed: s.wind_speed,
            pop: s.pop,
            condition: s.condition.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::bucket::tests::{sample_at, DAY0};
    use chrono::Utc;

    #[test]
    fn test_build_daily_aggregates_and_reconciles() {
        let mut samples: Vec<_> = [0, 6, 9, 12, 15, 18, 21]
            .iter()
            .map(|&h| sample_at(DAY0 + h * 3600, 10.0 + h as f64, 15.0 + h as f64))
            .collect();
        samples[3].condition = WeatherCondition::new("Clear", "clear sky", "10d");
        samples[3].pop = 0.4;
        samples[0].condition = WeatherCondition::new("Rain", "light rain", "10n");
        samples[1].condition = WeatherCondition::new("Clouds", "few clouds", "02d");

        let daily = build_daily(&samples, &Utc);

        assert_eq!(daily.len(), 1);
        let day = &daily[0];
        assert_eq!(day.ts, DAY0 + 12 * 3600);
        assert_eq!(day.temp_min, 10.0);
        assert_eq!(day.temp_max, 36.0);
        assert_eq!(day.temp_day, samples[3].temp);
        assert_eq!(day.pop, 0.4);
        assert_eq!(day.condition, WeatherCondition::new("Clouds", "few clouds", "02d"));
    }

    #[test]
    fn test_build_daily_one_entry_per_date() {
        let samples: Vec<_> = (0..40)
            .map(|i| sample_at(DAY0 + 6 * 3600 + i * 3 * 3600, 10.0, 20.0))
            .collect();

        let daily = build_daily(&samples, &Utc);

        assert_eq!(daily.len(), 6);
        assert!(daily.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_build_hourly_skips_past_slots() {
        let samples: Vec<_> = (0..10)
            .map(|i| sample_at(DAY0 + i * 3 * 3600, 10.0, 20.0))
            .collect();

        let hourly = build_hourly(&samples, DAY0 + 7 * 3600, 3);

        assert_eq!(hourly.len(), 3);
        assert_eq!(hourly[0].ts, DAY0 + 6 * 3600);
    }
}
