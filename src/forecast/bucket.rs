use super::types::{DayBucket, IntervalSample};
use chrono::{DateTime, NaiveDate, TimeZone, Timelike};
use std::collections::BTreeMap;

const NOON_SECS: i64 = 12 * 3600;

/// Group samples into one bucket per local calendar date, ascending by date.
///
/// Samples keep their relative order inside a bucket; input that arrives out
/// of order is sorted by timestamp within each day.
pub fn bucketize<Tz: TimeZone>(samples: &[IntervalSample], tz: &Tz) -> Vec<DayBucket> {
    let mut by_date: BTreeMap<NaiveDate, Vec<IntervalSample>> = BTreeMap::new();

    for sample in samples {
        let Some(local) = local_time(sample.ts, tz) else {
            tracing::warn!("Dropping sample with out-of-range timestamp {}", sample.ts);
            continue;
        };
        by_date
            .entry(local.date_naive())
            .or_default()
            .push(sample.clone());
    }

    by_date
        .into_iter()
        .map(|(date, mut samples)| {
            samples.sort_by_key(|s| s.ts);
            DayBucket { date, samples }
        })
        .collect()
}

/// Index of the sample whose local time of day is closest to 12:00.
/// Equal distances resolve to the earliest timestamp.
pub fn representative_index<Tz: TimeZone>(bucket: &DayBucket, tz: &Tz) -> Option<usize> {
    bucket
        .samples
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let local = local_time(s.ts, tz)?;
            let distance = (local.num_seconds_from_midnight() as i64 - NOON_SECS).abs();
            Some((distance, s.ts, i))
        })
        .min_by_key(|&(distance, ts, _)| (distance, ts))
        .map(|(_, _, i)| i)
}

/// Lowest `temp_min` and highest `temp_max` over every sample in the bucket.
pub fn temperature_range(bucket: &DayBucket) -> Option<(f64, f64)> {
    let mut samples = bucket.samples.iter();
    let first = samples.next()?;

    Some(samples.fold((first.temp_min, first.temp_max), |(lo, hi), s| {
        (lo.min(s.temp_min), hi.max(s.temp_max))
    }))
}

fn local_time<Tz: TimeZone>(ts: i64, tz: &Tz) -> Option<DateTime<Tz>> {
    DateTime::from_timestamp(ts, 0).map(|utc| utc.with_timezone(tz))
}
