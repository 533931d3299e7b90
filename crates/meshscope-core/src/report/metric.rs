//! Bounded sample windows attached to nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Samples retained per metric; older samples are dropped on merge.
pub const MAX_SAMPLES: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Time-ordered window of samples, newest first.
///
/// `min` and `max` always describe the retained window. Every constructor,
/// including deserialization, goes through the same normalisation so two
/// metrics holding the same samples compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMetric")]
pub struct Metric {
    samples: Vec<Sample>,
    min: f64,
    max: f64,
}

#[derive(Deserialize)]
struct WireMetric {
    #[serde(default)]
    samples: Vec<Sample>,
}

impl From<WireMetric> for Metric {
    fn from(wire: WireMetric) -> Self {
        Metric::from_samples(wire.samples)
    }
}

impl Metric {
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut samples: Vec<Sample> = samples.into_iter().filter(|s| !s.value.is_nan()).collect();
        // Newest first; the greater value leads a timestamp tie so dedup keeps it.
        samples.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.value.total_cmp(&a.value))
        });
        samples.dedup_by_key(|s| s.timestamp);
        samples.truncate(MAX_SAMPLES);

        let (min, max) = match samples.first() {
            Some(first) => samples.iter().fold((first.value, first.value), |(lo, hi), s| {
                (lo.min(s.value), hi.max(s.value))
            }),
            None => (0.0, 0.0),
        };
        Self { samples, min, max }
    }

    /// Append a sample. NaN values are refused and leave the metric unchanged.
    pub fn add(self, timestamp: DateTime<Utc>, value: f64) -> Self {
        if value.is_nan() {
            return self;
        }
        let mut samples = self.samples;
        samples.push(Sample { timestamp, value });
        Self::from_samples(samples)
    }

    pub fn merge(&self, other: &Metric) -> Metric {
        Self::from_samples(self.samples.iter().chain(other.samples.iter()).copied())
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Timestamp of the oldest retained sample.
    pub fn first(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// Timestamp of the newest sample.
    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.timestamp)
    }

    pub fn last_sample(&self) -> Option<&Sample> {
        self.samples.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn samples_are_kept_newest_first() {
        let m = Metric::default().add(at(1), 1.0).add(at(3), 3.0).add(at(2), 2.0);
        let ts: Vec<_> = m.samples().iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![at(3), at(2), at(1)]);
        assert_eq!(m.first(), Some(at(1)));
        assert_eq!(m.last(), Some(at(3)));
        assert_eq!(m.last_sample().map(|s| s.value), Some(3.0));
    }

    #[test]
    fn min_and_max_track_the_window() {
        let m = Metric::default().add(at(1), 5.0).add(at(2), -1.0).add(at(3), 2.5);
        assert_eq!(m.min(), -1.0);
        assert_eq!(m.max(), 5.0);
    }

    #[test]
    fn nan_is_refused() {
        let m = Metric::default().add(at(1), 1.0).add(at(2), f64::NAN);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn window_is_bounded() {
        let m = Metric::from_samples((0..(MAX_SAMPLES as i64 + 30)).map(|i| Sample {
            timestamp: at(i),
            value: i as f64,
        }));
        assert_eq!(m.len(), MAX_SAMPLES);
        assert_eq!(m.first(), Some(at(30)));
        assert_eq!(m.min(), 30.0);
    }

    #[test]
    fn merge_deduplicates_by_timestamp() {
        let a = Metric::default().add(at(1), 1.0).add(at(2), 2.0);
        let b = Metric::default().add(at(2), 7.0).add(at(3), 3.0);
        let merged = a.merge(&b);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged, b.merge(&a));
        assert_eq!(merged.samples()[1].value, 7.0);
        assert_eq!(merged.merge(&merged), merged);
    }

    #[test]
    fn deserialization_normalises() {
        let json = r#"{"samples":[
            {"timestamp":"2024-01-01T00:00:01Z","value":1.0},
            {"timestamp":"2024-01-01T00:00:03Z","value":3.0}
        ],"min":99.0,"max":-99.0}"#;
        let m: Metric = serde_json::from_str(json).unwrap();
        assert_eq!(m.min(), 1.0);
        assert_eq!(m.max(), 3.0);
        assert_eq!(m.last_sample().map(|s| s.value), Some(3.0));
    }
}
