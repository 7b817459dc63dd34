// Raw meter export records -> canonical readings
use super::error::AnalysisError;
use super::reading::{Quality, Reading};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{Map, Value};

pub type RawRecord = Map<String, Value>;

/// Top-level shape of a meter export file: `{ "data": [ ... ] }`.
#[derive(Debug, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub data: Option<Vec<RawRecord>>,
}

/// Validates raw records against the export schema.
///
/// Exactly one field must start with the measurement-code prefix (an OBIS
/// code such as `0100011D00FF`); its value is the reading.
#[derive(Debug, Clone)]
pub struct Normalizer {
    measurement_prefix: String,
}

impl Normalizer {
    pub fn new(measurement_prefix: impl Into<String>) -> Self {
        Self {
            measurement_prefix: measurement_prefix.into(),
        }
    }

    pub fn normalize(&self, index: usize, record: &RawRecord) -> Result<Reading, AnalysisError> {
        let malformed = |reason: String| AnalysisError::MalformedRecord { index, reason };

        let raw_timestamp = record
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing 'timestamp'".to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
            .map_err(|e| malformed(format!("unparseable timestamp '{}': {}", raw_timestamp, e)))?;

        let tags = record.get("tags").and_then(Value::as_object);
        let meter_id = tags
            .and_then(|t| t.get("muid"))
            .and_then(Value::as_str)
            .filter(|muid| !muid.is_empty())
            .ok_or_else(|| malformed("missing 'tags.muid'".to_string()))?;
        let quality = tags
            .and_then(|t| t.get("quality"))
            .and_then(Value::as_str)
            .map(Quality::from_label)
            .unwrap_or(Quality::Unknown);

        let (field, value) = self.measurement_field(record).map_err(malformed)?;
        let value = value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(format!("field '{}' is not numeric", field)))?;

        Ok(Reading::new(meter_id, timestamp, value, quality))
    }

    fn measurement_field<'a>(&self, record: &'a RawRecord) -> Result<(&'a str, &'a Value), String> {
        let mut matches = record
            .iter()
            .filter(|(key, _)| key.starts_with(&self.measurement_prefix));

        let (key, value) = matches.next().ok_or_else(|| {
            format!("no field starting with '{}'", self.measurement_prefix)
        })?;
        if let Some((other, _)) = matches.next() {
            return Err(format!(
                "ambiguous measurement fields '{}' and '{}'",
                key, other
            ));
        }
        Ok((key.as_str(), value))
    }
}
