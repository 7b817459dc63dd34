// Lagged autocorrelation and daily-pattern classification
use chrono::TimeDelta;
use serde::Serialize;

/// Coefficient above which a daily pattern counts as strong.
const STRONG_THRESHOLD: f64 = 0.5;

/// Coefficient above which a daily pattern counts as moderate.
const MODERATE_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutocorrelationResult {
    pub lag: usize,
    pub coefficient: f64,
    /// Wall-clock duration of the lag, e.g. `1.0hrs`.
    pub span: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPattern {
    pub lag: usize,
    pub coefficient: f64,
    pub strength: PatternStrength,
}

/// Autocorrelation of `values` at `lag`.
///
/// Uses the full-series mean and the full-series sum of squares as
/// denominator. Returns `0.0` when `lag >= values.len()` or when the series
/// is constant.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if lag >= values.len() {
        return 0.0;
    }

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;

    let numerator: f64 = values
        .iter()
        .take(n - lag)
        .zip(values.iter().skip(lag))
        .map(|(x, y)| (x - mean) * (y - mean))
        .sum();
    let denominator: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Fixed three-tier policy: `> 0.5` strong, `> 0.2` moderate, else weak.
pub fn classify_daily_pattern(coefficient: f64) -> PatternStrength {
    if coefficient > STRONG_THRESHOLD {
        PatternStrength::Strong
    } else if coefficient > MODERATE_THRESHOLD {
        PatternStrength::Moderate
    } else {
        PatternStrength::Weak
    }
}

/// Number of samples spanning 24 hours at `sampling`.
pub fn daily_lag(sampling: TimeDelta) -> usize {
    let step = sampling.num_seconds();
    if step <= 0 {
        return 0;
    }
    (TimeDelta::days(1).num_seconds() / step) as usize
}

pub fn lag_span(lag: usize, sampling: TimeDelta) -> TimeDelta {
    TimeDelta::seconds(sampling.num_seconds().saturating_mul(lag as i64))
}

/// Human-readable span: minutes under an hour, hours under a day, else days.
pub fn describe_span(span: TimeDelta) -> String {
    let minutes = span.num_minutes();
    if minutes < 60 {
        format!("{}min", minutes)
    } else if minutes < 1440 {
        format!("{:.1}hrs", minutes as f64 / 60.0)
    } else {
        format!("{:.1}days", minutes as f64 / 1440.0)
    }
}

pub fn autocorrelation_profile(
    values: &[f64],
    lags: &[usize],
    sampling: TimeDelta,
) -> Vec<AutocorrelationResult> {
    lags.iter()
        .map(|&lag| AutocorrelationResult {
            lag,
            coefficient: autocorrelation(values, lag),
            span: describe_span(lag_span(lag, sampling)),
        })
        .collect()
}

pub fn daily_pattern(values: &[f64], sampling: TimeDelta) -> DailyPattern {
    let lag = daily_lag(sampling);
    let coefficient = autocorrelation(values, lag);
    DailyPattern {
        lag,
        coefficient,
        strength: classify_daily_pattern(coefficient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lag_zero_is_one() {
        let values = vec![0.3, 1.2, 0.0, 4.5, 2.2];
        assert!((autocorrelation(&values, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_lag_beyond_length_saturates() {
        let values = vec![1.0, 2.0, 3.0];
        assert_eq!(autocorrelation(&values, 3), 0.0);
        assert_eq!(autocorrelation(&values, 100), 0.0);
        assert_eq!(autocorrelation(&[], 0), 0.0);
    }

    #[test]
    fn test_constant_series_saturates() {
        assert_eq!(autocorrelation(&[4.0, 4.0, 4.0, 4.0], 1), 0.0);
    }

    #[test]
    fn test_alternating_series() {
        let values = vec![1.0, -1.0, 1.0, -1.0];
        assert!((autocorrelation(&values, 1) + 0.75).abs() < 1e-12);
        assert!((autocorrelation(&values, 2) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(classify_daily_pattern(0.51), PatternStrength::Strong);
        assert_eq!(classify_daily_pattern(0.5), PatternStrength::Moderate);
        assert_eq!(classify_daily_pattern(0.21), PatternStrength::Moderate);
        assert_eq!(classify_daily_pattern(0.2), PatternStrength::Weak);
        assert_eq!(classify_daily_pattern(-0.9), PatternStrength::Weak);
    }

    #[test]
    fn test_daily_lag_follows_sampling() {
        assert_eq!(daily_lag(TimeDelta::minutes(15)), 96);
        assert_eq!(daily_lag(TimeDelta::hours(1)), 24);
        assert_eq!(daily_lag(TimeDelta::zero()), 0);
    }

    #[test]
    fn test_describe_span() {
        let sampling = TimeDelta::minutes(15);
        assert_eq!(describe_span(lag_span(1, sampling)), "15min");
        assert_eq!(describe_span(lag_span(4, sampling)), "1.0hrs");
        assert_eq!(describe_span(lag_span(24, sampling)), "6.0hrs");
        assert_eq!(describe_span(lag_span(96, sampling)), "1.0days");
    }

    #[test]
    fn test_periodic_series_has_strong_daily_pattern() {
        // Six-hour sampling: a lag of 4 samples is one day.
        let values: Vec<f64> = (0..20).map(|i| (i % 4) as f64 + 1.0).collect();
        let pattern = daily_pattern(&values, TimeDelta::hours(6));
        assert_eq!(pattern.lag, 4);
        assert!((pattern.coefficient - 0.8).abs() < 1e-12);
        assert_eq!(pattern.strength, PatternStrength::Strong);
    }

    #[test]
    fn test_profile_reports_each_lag() {
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let profile = autocorrelation_profile(&values, &[1, 4, 96], TimeDelta::minutes(15));
        assert_eq!(profile.len(), 3);
        assert_eq!(profile[1].span, "1.0hrs");
        assert_eq!(profile[2].coefficient, 0.0);
    }
}
