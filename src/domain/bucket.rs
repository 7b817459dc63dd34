// Calendar bucketing of readings
use super::reading::Reading;
use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// How readings inside one bucket are reduced to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Average,
    Sum,
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(AggregationMethod::Average),
            "sum" | "total" => Ok(AggregationMethod::Sum),
            other => Err(format!("unknown aggregation method '{}'", other)),
        }
    }
}

/// Fixed-width bucket size. Boundaries follow each reading's own UTC offset,
/// so `Day` buckets start at local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Hour,
    Day,
    /// Buckets of `n` minutes aligned to local midnight, 1 <= n <= 1440.
    Minutes(u32),
}

impl Interval {
    /// Hourly buckets average and daily buckets total, matching the
    /// consumption views the endpoint has always served.
    pub fn default_method(&self) -> AggregationMethod {
        match self {
            Interval::Day => AggregationMethod::Sum,
            Interval::Hour | Interval::Minutes(_) => AggregationMethod::Average,
        }
    }

    /// Key of the bucket enclosing `timestamp`.
    ///
    /// Hour buckets are keyed by instant so an offset change never folds two
    /// hours together. Day and minute buckets are keyed by local wall-clock
    /// time, so a calendar day stays one bucket across a DST change.
    pub fn bucket_key(&self, timestamp: DateTime<FixedOffset>) -> BucketKey {
        let local = timestamp.naive_local();
        let midnight = local.date().and_time(NaiveTime::MIN);

        match self {
            Interval::Day => BucketKey::Local(midnight),
            Interval::Hour => {
                let start = midnight + TimeDelta::hours(i64::from(local.hour()));
                BucketKey::Instant(to_utc(start, *timestamp.offset()))
            }
            Interval::Minutes(width) => {
                let width = i64::from((*width).max(1)) * 60;
                let elapsed = (local - midnight).num_seconds();
                BucketKey::Local(midnight + TimeDelta::seconds(elapsed - elapsed % width))
            }
        }
    }
}

fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> NaiveDateTime {
    local - TimeDelta::seconds(i64::from(offset.local_minus_utc()))
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        match label.as_str() {
            "1hour" | "hour" | "hourly" => return Ok(Interval::Hour),
            "1day" | "day" | "daily" => return Ok(Interval::Day),
            _ => {}
        }

        let minutes = label
            .strip_suffix("min")
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| format!("unknown interval '{}'", s))?;

        if minutes == 0 || minutes > MINUTES_PER_DAY {
            return Err(format!(
                "interval must be between 1 and {} minutes, got {}",
                MINUTES_PER_DAY, minutes
            ));
        }
        Ok(Interval::Minutes(minutes))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Hour => write!(f, "1hour"),
            Interval::Day => write!(f, "1day"),
            Interval::Minutes(n) => write!(f, "{}min", n),
        }
    }
}

/// Truncated start identifying a bucket; used directly as the grouping key.
/// Keys from one `Interval` are always the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    /// UTC start
    Instant(NaiveDateTime),
    /// Local wall-clock start
    Local(NaiveDateTime),
}

impl BucketKey {
    /// Bucket start expressed in `offset`.
    pub fn start_in(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        let utc = match self {
            BucketKey::Instant(utc) => *utc,
            BucketKey::Local(local) => to_utc(*local, offset),
        };
        DateTime::from_naive_utc_and_offset(utc, offset)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub bucket_start: DateTime<FixedOffset>,
    pub aggregate: f64,
    pub count: usize,
    pub method: AggregationMethod,
}

/// Groups readings into sparse buckets ordered by start ascending.
///
/// Input order does not matter: readings are sorted first, and each
/// `bucketStart` is reported in the offset of the bucket's earliest reading.
/// Buckets without readings are not emitted.
pub fn bucketize(
    readings: &[Reading],
    interval: Interval,
    method: AggregationMethod,
) -> Vec<Bucket> {
    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by_key(|r| (r.timestamp, r.timestamp.offset().local_minus_utc()));

    let mut groups: BTreeMap<BucketKey, (FixedOffset, f64, usize)> = BTreeMap::new();
    for reading in sorted {
        let entry = groups
            .entry(interval.bucket_key(reading.timestamp))
            .or_insert((*reading.timestamp.offset(), 0.0, 0));
        entry.1 += reading.value;
        entry.2 += 1;
    }

    groups
        .into_iter()
        .map(|(key, (offset, sum, count))| {
            let aggregate = match method {
                AggregationMethod::Sum => sum,
                AggregationMethod::Average => sum / count as f64,
            };
            Bucket {
                bucket_start: key.start_in(offset),
                aggregate,
                count,
                method,
            }
        })
        .collect()
}
