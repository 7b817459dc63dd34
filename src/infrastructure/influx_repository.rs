// InfluxDB repository implementation
use crate::application::reading_repository::{ReadingFilter, ReadingRepository, StorageError};
use crate::domain::reading::{MeterSummary, Quality, Reading};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

const READING_MEASUREMENT: &str = "energy_reading";
const METER_MEASUREMENT: &str = "meter";
const WRITE_BATCH_SIZE: usize = 5000;

type Result<T> = std::result::Result<T, StorageError>;

/// Readings are stored as `energy_reading` points tagged by `muid`. The
/// original UTC offset is kept in `offset_seconds` since InfluxDB returns
/// every time in UTC.
#[derive(Debug, Clone)]
pub struct InfluxRepository {
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    #[allow(dead_code)]
    name: String,
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

impl InfluxQLSeries {
    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn tag(&self, name: &str) -> Option<&str> {
        self.tags.as_ref()?.get(name).map(String::as_str)
    }
}

impl InfluxRepository {
    pub fn new(host: String, token: String, database: String, retention_policy: String) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            token,
            database,
            retention_policy,
            client: reqwest::Client::new(),
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy),
            urlencoding::encode(query)
        )
    }

    fn build_write_url(&self) -> String {
        format!(
            "{}/write?db={}&rp={}&precision=ns",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy)
        )
    }

    async fn execute_query(&self, query: &str) -> Result<Vec<InfluxQLSeries>> {
        tracing::debug!("Executing InfluxQL: {}", query);

        let response = self
            .client
            .get(self.build_query_url(query))
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Query(format!(
                "InfluxDB query failed with status {}: {}",
                status, body
            )));
        }

        let data = response.json::<InfluxQLResponse>().await?;
        match data.results.into_iter().next() {
            Some(InfluxQLResult {
                error: Some(error), ..
            }) => Err(StorageError::Query(error)),
            Some(result) => Ok(result.series.unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    async fn write_lines(&self, lines: &[String]) -> Result<()> {
        for chunk in lines.chunks(WRITE_BATCH_SIZE) {
            let response = self
                .client
                .post(self.build_write_url())
                .header("Authorization", format!("Token {}", self.token))
                .body(chunk.join("\n"))
                .send()
                .await
                .map_err(request_error)?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(StorageError::Query(format!(
                    "InfluxDB write failed with status {}: {}",
                    status, body
                )));
            }
        }
        Ok(())
    }

    /// Nanosecond instants already stored for `muid` within the span of `readings`
    async fn existing_instants(&self, muid: &str, readings: &[&Reading]) -> Result<HashSet<i64>> {
        let (Some(first), Some(last)) = (
            readings.iter().map(|r| r.timestamp).min(),
            readings.iter().map(|r| r.timestamp).max(),
        ) else {
            return Ok(HashSet::new());
        };

        let query = format!(
            "SELECT \"value\" FROM {} WHERE \"muid\" = '{}' AND time >= '{}' AND time <= '{}'",
            READING_MEASUREMENT,
            escape_literal(muid),
            influx_time(first),
            influx_time(last)
        );

        let mut instants = HashSet::new();
        for series in self.execute_query(&query).await? {
            let time_idx = series.column("time").unwrap_or(0);
            for row in &series.values {
                if let Some(time) = row.get(time_idx).and_then(|v| v.as_str()) {
                    if let Some(nanos) = DateTime::parse_from_rfc3339(time)
                        .ok()
                        .and_then(|t| t.timestamp_nanos_opt())
                    {
                        instants.insert(nanos);
                    }
                }
            }
        }
        Ok(instants)
    }
}

#[async_trait]
impl ReadingRepository for InfluxRepository {
    async fn fetch_readings(&self, filter: &ReadingFilter) -> Result<Vec<Reading>> {
        let query = build_select(filter);
        let mut readings: Vec<Reading> = self
            .execute_query(&query)
            .await?
            .iter()
            .flat_map(parse_readings)
            .collect();

        // LIMIT applies per series, so merge the meters and cut again
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            readings.truncate(limit);
        }
        Ok(readings)
    }

    async fn upsert_meter(&self, muid: &str) -> Result<()> {
        // Same series, same instant: rewriting the point is idempotent
        let line = format!(
            "{},muid={} registered=true 0",
            METER_MEASUREMENT,
            escape_tag(muid)
        );
        self.write_lines(&[line]).await
    }

    async fn bulk_insert_readings(&self, readings: &[Reading]) -> Result<usize> {
        let mut by_meter: BTreeMap<&str, Vec<&Reading>> = BTreeMap::new();
        for reading in readings {
            by_meter.entry(reading.meter_id.as_str()).or_default().push(reading);
        }

        let mut lines = Vec::with_capacity(readings.len());
        for (muid, batch) in by_meter {
            let mut seen = self.existing_instants(muid, &batch).await?;
            for reading in batch {
                let nanos = reading.timestamp.timestamp_nanos_opt().ok_or_else(|| {
                    StorageError::Query(format!(
                        "timestamp {} out of range for InfluxDB",
                        reading.timestamp
                    ))
                })?;
                if seen.insert(nanos) {
                    lines.push(reading_line(reading, nanos));
                }
            }
        }

        self.write_lines(&lines).await?;
        tracing::debug!(
            "Wrote {} readings to InfluxDB, skipped {} duplicates",
            lines.len(),
            readings.len() - lines.len()
        );
        Ok(lines.len())
    }

    async fn list_meters(&self) -> Result<Vec<MeterSummary>> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();

        let query = format!("SHOW TAG VALUES FROM {} WITH KEY = \"muid\"", METER_MEASUREMENT);
        for series in self.execute_query(&query).await? {
            let value_idx = series.column("value").unwrap_or(1);
            for row in &series.values {
                if let Some(muid) = row.get(value_idx).and_then(|v| v.as_str()) {
                    counts.entry(muid.to_string()).or_insert(0);
                }
            }
        }

        let query = format!(
            "SELECT COUNT(\"value\") FROM {} GROUP BY \"muid\"",
            READING_MEASUREMENT
        );
        for series in self.execute_query(&query).await? {
            let Some(muid) = series.tag("muid") else {
                continue;
            };
            let count_idx = series.column("count").unwrap_or(1);
            let count = series
                .values
                .first()
                .and_then(|row| row.get(count_idx))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            counts.insert(muid.to_string(), count as usize);
        }

        Ok(counts
            .into_iter()
            .map(|(muid, reading_count)| MeterSummary {
                muid,
                reading_count,
            })
            .collect())
    }
}

fn build_select(filter: &ReadingFilter) -> String {
    let mut conditions = Vec::new();
    if let Some(muid) = &filter.meter_id {
        conditions.push(format!("\"muid\" = '{}'", escape_literal(muid)));
    }
    if let Some(start) = filter.start {
        conditions.push(format!("time >= '{}'", influx_time(start)));
    }
    if let Some(end) = filter.end {
        conditions.push(format!("time <= '{}'", influx_time(end)));
    }

    let mut query = format!(
        "SELECT \"value\", \"quality\", \"offset_seconds\" FROM {}",
        READING_MEASUREMENT
    );
    if !conditions.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&conditions.join(" AND "));
    }
    query.push_str(" GROUP BY \"muid\" ORDER BY time DESC");
    if let Some(limit) = filter.limit {
        query.push_str(&format!(" LIMIT {}", limit));
    }
    query
}

fn parse_readings(series: &InfluxQLSeries) -> Vec<Reading> {
    let Some(muid) = series.tag("muid") else {
        return Vec::new();
    };
    let time_idx = series.column("time").unwrap_or(0);
    let value_idx = series.column("value").unwrap_or(1);
    let quality_idx = series.column("quality");
    let offset_idx = series.column("offset_seconds");

    series
        .values
        .iter()
        .filter_map(|row| {
            let time = DateTime::parse_from_rfc3339(row.get(time_idx)?.as_str()?).ok()?;
            let value = row.get(value_idx)?.as_f64()?;
            let quality = quality_idx
                .and_then(|i| row.get(i))
                .and_then(|v| v.as_str())
                .map(Quality::from_label)
                .unwrap_or(Quality::Unknown);
            let offset = offset_idx
                .and_then(|i| row.get(i))
                .and_then(|v| v.as_i64())
                .and_then(|secs| FixedOffset::east_opt(i32::try_from(secs).ok()?))
                .unwrap_or(*time.offset());

            Some(Reading::new(muid, time.with_timezone(&offset), value, quality))
        })
        .collect()
}

fn reading_line(reading: &Reading, nanos: i64) -> String {
    format!(
        "{},muid={} value={},quality=\"{}\",offset_seconds={}i {}",
        READING_MEASUREMENT,
        escape_tag(&reading.meter_id),
        reading.value,
        reading.quality.as_str(),
        reading.timestamp.offset().local_minus_utc(),
        nanos
    )
}

/// Connection failures and timeouts mean the database is unreachable
fn request_error(err: reqwest::Error) -> StorageError {
    if err.is_connect() || err.is_timeout() {
        StorageError::Unavailable(err.to_string())
    } else {
        StorageError::Http(err)
    }
}

fn influx_time(timestamp: DateTime<FixedOffset>) -> String {
    timestamp
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Escape a string for use inside a single-quoted InfluxQL literal
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Escape a tag value for line protocol
fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
