// Query service - Time-windowed readings, statistics and pattern analysis
use crate::application::error::{Result, ServiceError};
use crate::application::reading_repository::{ReadingFilter, ReadingRepository};
use crate::domain::autocorrelation::{
    AutocorrelationResult, DailyPattern, autocorrelation_profile, daily_pattern,
};
use crate::domain::bucket::{AggregationMethod, Bucket, Interval, bucketize};
use crate::domain::reading::{Reading, TimeRange};
use crate::domain::statistics::{StatsSummary, mean_interval_minutes, summarize};
use crate::infrastructure::config::{AnalysisConfig, QueryConfig};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ReadingsQuery {
    pub muid: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    /// Rows in raw mode, most recent buckets in bucketed mode
    pub limit: Option<usize>,
    pub interval: Option<Interval>,
    /// Overrides the interval's default aggregation method
    pub method: Option<AggregationMethod>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryData {
    Raw(Vec<Reading>),
    Buckets(Vec<Bucket>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    /// Number of readings the response was computed from
    pub total: usize,
    pub interval: String,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingsPage {
    pub data: QueryData,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterStatistics {
    pub muid: String,
    #[serde(flatten)]
    pub summary: StatsSummary,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterAnalysis {
    pub muid: String,
    pub stats: StatsSummary,
    pub non_zero_ratio: f64,
    pub average_interval_minutes: Option<f64>,
    pub autocorrelation: Vec<AutocorrelationResult>,
    pub daily_pattern: DailyPattern,
}

#[derive(Clone)]
pub struct QueryService {
    repository: Arc<dyn ReadingRepository>,
    query_config: QueryConfig,
    analysis_config: AnalysisConfig,
}

impl QueryService {
    pub fn new(
        repository: Arc<dyn ReadingRepository>,
        query_config: QueryConfig,
        analysis_config: AnalysisConfig,
    ) -> Self {
        Self {
            repository,
            query_config,
            analysis_config,
        }
    }

    pub async fn query_readings(&self, query: ReadingsQuery) -> Result<ReadingsPage> {
        if let (Some(start), Some(end)) = (query.start, query.end) {
            if end < start {
                return Err(ServiceError::InvalidRange { start, end });
            }
        }

        // Bucketed mode reads the whole range so no bucket is cut short.
        let limit = match query.interval {
            Some(_) => None,
            None => Some(query.limit.unwrap_or(self.query_config.default_limit)),
        };
        let filter = ReadingFilter {
            meter_id: query.muid.clone(),
            start: query.start,
            end: query.end,
            limit,
        };
        let mut readings = self.repository.fetch_readings(&filter).await?;
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        tracing::debug!(
            "Fetched {} readings for {:?} ({:?}..{:?})",
            readings.len(),
            query.muid,
            query.start,
            query.end
        );

        let total = readings.len();
        let time_range = TimeRange::of(&readings);

        let (data, interval) = match query.interval {
            Some(interval) => {
                let method = query.method.unwrap_or_else(|| interval.default_method());
                let mut buckets = bucketize(&readings, interval, method);
                if let Some(limit) = query.limit {
                    let excess = buckets.len().saturating_sub(limit);
                    buckets.drain(..excess);
                }
                (QueryData::Buckets(buckets), interval.to_string())
            }
            None => (QueryData::Raw(readings), self.analysis_config.sampling_label()),
        };

        Ok(ReadingsPage {
            data,
            metadata: QueryMetadata {
                total,
                interval,
                time_range,
            },
        })
    }

    pub async fn statistics(&self, muid: &str) -> Result<MeterStatistics> {
        let readings = self.meter_readings(muid).await?;
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        let summary = summarize(&values)?;

        Ok(MeterStatistics {
            muid: muid.to_string(),
            summary,
            time_range: TimeRange::of(&readings),
        })
    }

    pub async fn analyze(&self, muid: &str) -> Result<MeterAnalysis> {
        let mut readings = self.meter_readings(muid).await?;
        readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        let stats = summarize(&values)?;
        let timestamps: Vec<_> = readings.iter().map(|r| r.timestamp).collect();
        let sampling = self.analysis_config.sampling_interval();

        let daily = daily_pattern(&values, sampling);
        tracing::info!(
            "Meter {}: daily autocorrelation {:.4} at lag {} ({:?})",
            muid,
            daily.coefficient,
            daily.lag,
            daily.strength
        );

        Ok(MeterAnalysis {
            muid: muid.to_string(),
            non_zero_ratio: stats.non_zero_ratio(),
            stats,
            average_interval_minutes: mean_interval_minutes(&timestamps),
            autocorrelation: autocorrelation_profile(&values, &self.analysis_config.lags, sampling),
            daily_pattern: daily,
        })
    }

    async fn meter_readings(&self, muid: &str) -> Result<Vec<Reading>> {
        Ok(self
            .repository
            .fetch_readings(&ReadingFilter::for_meter(muid))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::autocorrelation::PatternStrength;
    use crate::domain::error::AnalysisError;
    use crate::domain::reading::Quality;
    use crate::infrastructure::memory_repository::InMemoryRepository;
    use chrono::TimeDelta;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    async fn service_with(readings: Vec<Reading>) -> QueryService {
        service_with_config(readings, QueryConfig::default()).await
    }

    async fn service_with_config(readings: Vec<Reading>, config: QueryConfig) -> QueryService {
        let repository = Arc::new(InMemoryRepository::new());
        repository.upsert_meter("m1").await.unwrap();
        repository.bulk_insert_readings(&readings).await.unwrap();
        QueryService::new(repository, config, AnalysisConfig::default())
    }

    fn quarter_hours(start: &str, values: &[f64]) -> Vec<Reading> {
        let start = at(start);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                Reading::new(
                    "m1",
                    start + TimeDelta::minutes(15 * i as i64),
                    *v,
                    Quality::Measured,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_start_after_end_is_invalid_range() {
        let service = service_with(Vec::new()).await;
        let query = ReadingsQuery {
            start: Some(at("2023-02-02T00:00:00Z")),
            end: Some(at("2023-02-01T00:00:00Z")),
            ..ReadingsQuery::default()
        };

        let err = service.query_readings(query).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRange { .. }));
    }

    #[tokio::test]
    async fn test_raw_readings_most_recent_first_with_limit() {
        let service =
            service_with(quarter_hours("2023-02-01T10:00:00+01:00", &[1.0, 2.0, 3.0, 4.0])).await;
        let query = ReadingsQuery {
            muid: Some("m1".to_string()),
            limit: Some(2),
            ..ReadingsQuery::default()
        };

        let page = service.query_readings(query).await.unwrap();
        let QueryData::Raw(readings) = page.data else {
            panic!("expected raw readings");
        };
        assert_eq!(readings.iter().map(|r| r.value).collect::<Vec<_>>(), vec![4.0, 3.0]);
        assert_eq!(page.metadata.total, 2);
        assert_eq!(page.metadata.interval, "15min");
        assert_eq!(page.metadata.time_range.end, Some(at("2023-02-01T10:45:00+01:00")));
    }

    #[tokio::test]
    async fn test_inclusive_range_filter() {
        let service =
            service_with(quarter_hours("2023-02-01T10:00:00Z", &[1.0, 2.0, 3.0, 4.0])).await;
        let query = ReadingsQuery {
            start: Some(at("2023-02-01T10:15:00Z")),
            end: Some(at("2023-02-01T10:30:00Z")),
            ..ReadingsQuery::default()
        };

        let page = service.query_readings(query).await.unwrap();
        assert_eq!(page.metadata.total, 2);
    }

    #[tokio::test]
    async fn test_hourly_buckets_default_to_average() {
        let service =
            service_with(quarter_hours("2023-02-01T10:00:00Z", &[5.0, 0.0, 3.0, 4.0, 8.0])).await;
        let query = ReadingsQuery {
            muid: Some("m1".to_string()),
            interval: Some(Interval::Hour),
            ..ReadingsQuery::default()
        };

        let page = service.query_readings(query).await.unwrap();
        let QueryData::Buckets(buckets) = page.data else {
            panic!("expected buckets");
        };
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].method, AggregationMethod::Average);
        assert_eq!(buckets[0].count, 4);
        assert!((buckets[0].aggregate - 3.0).abs() < 1e-9);
        assert_eq!(buckets[1].count, 1);
        assert_eq!(page.metadata.interval, "1hour");
        assert_eq!(page.metadata.total, 5);
    }

    #[tokio::test]
    async fn test_daily_buckets_default_to_sum_and_method_override() {
        let service =
            service_with(quarter_hours("2023-02-01T00:00:00+01:00", &[1.0; 96])).await;

        let query = ReadingsQuery {
            interval: Some(Interval::Day),
            ..ReadingsQuery::default()
        };
        let page = service.query_readings(query.clone()).await.unwrap();
        let QueryData::Buckets(buckets) = page.data else {
            panic!("expected buckets");
        };
        assert_eq!(buckets.len(), 1);
        assert!((buckets[0].aggregate - 96.0).abs() < 1e-9);

        let query = ReadingsQuery {
            method: Some(AggregationMethod::Average),
            ..query
        };
        let page = service.query_readings(query).await.unwrap();
        let QueryData::Buckets(buckets) = page.data else {
            panic!("expected buckets");
        };
        assert!((buckets[0].aggregate - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_row_limit_does_not_truncate_buckets() {
        let config = QueryConfig { default_limit: 100 };
        let service =
            service_with_config(quarter_hours("2023-02-01T00:00:00+01:00", &[1.0; 192]), config)
                .await;
        let query = ReadingsQuery {
            muid: Some("m1".to_string()),
            interval: Some(Interval::Day),
            ..ReadingsQuery::default()
        };

        let page = service.query_readings(query).await.unwrap();
        let QueryData::Buckets(buckets) = page.data else {
            panic!("expected buckets");
        };
        assert_eq!(buckets.len(), 2);
        assert!(buckets.iter().all(|b| b.count == 96));
        assert!((buckets[0].aggregate - 96.0).abs() < 1e-9);
        assert_eq!(page.metadata.total, 192);
    }

    #[tokio::test]
    async fn test_bucket_limit_keeps_most_recent_buckets() {
        let values = [1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 4.0, 5.0, 9.0];
        let service = service_with(quarter_hours("2023-02-01T10:00:00Z", &values)).await;
        let query = ReadingsQuery {
            muid: Some("m1".to_string()),
            interval: Some(Interval::Hour),
            limit: Some(2),
            ..ReadingsQuery::default()
        };

        let page = service.query_readings(query).await.unwrap();
        let QueryData::Buckets(buckets) = page.data else {
            panic!("expected buckets");
        };
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_start, at("2023-02-01T11:00:00Z"));
        assert_eq!(buckets[0].count, 4);
        assert!((buckets[0].aggregate - 3.5).abs() < 1e-9);
        assert_eq!(buckets[1].bucket_start, at("2023-02-01T12:00:00Z"));
        assert_eq!(buckets[1].count, 1);
    }

    #[tokio::test]
    async fn test_statistics_for_meter() {
        let service =
            service_with(quarter_hours("2023-02-01T10:00:00Z", &[4.0, 4.0, 4.0, 4.0])).await;

        let stats = service.statistics("m1").await.unwrap();
        assert_eq!(stats.summary.total, 4);
        assert_eq!(stats.summary.std_dev, 0.0);
        assert_eq!(stats.time_range.start, Some(at("2023-02-01T10:00:00Z")));
        assert_eq!(stats.time_range.end, Some(at("2023-02-01T10:45:00Z")));
    }

    #[tokio::test]
    async fn test_statistics_for_unknown_meter_is_empty_input() {
        let service = service_with(Vec::new()).await;
        let err = service.statistics("nope").await.unwrap_err();
        assert!(matches!(err, ServiceError::Analysis(AnalysisError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_analysis_detects_daily_pattern() {
        // Two days of a repeating daily profile at 15-minute resolution.
        let values: Vec<f64> = (0..192).map(|i| ((i % 96) / 12) as f64).collect();
        let service = service_with(quarter_hours("2023-02-01T00:00:00+01:00", &values)).await;

        let analysis = service.analyze("m1").await.unwrap();
        assert_eq!(analysis.daily_pattern.lag, 96);
        assert_eq!(analysis.daily_pattern.strength, PatternStrength::Moderate);
        assert_eq!(analysis.average_interval_minutes, Some(15.0));
        assert_eq!(analysis.autocorrelation.len(), 4);
        assert_eq!(analysis.autocorrelation[3].span, "1.0days");
    }
}
