//! Storage boundary
//!
//! The analytics core never touches a storage engine directly. Callers read
//! through [`SampleRepository`]; [`InMemoryRepository`] backs tests and the
//! CLI and can be snapshotted to JSON.

use crate::error::ComputeError;
use crate::types::{CalendarEvent, MonthlyBaseline, Sample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Narrow repository interface over sample, event and baseline-cache storage
pub trait SampleRepository {
    /// Samples with `start_ms <= timestamp < end_ms`, ascending by timestamp
    fn get_samples_in_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<Sample>, ComputeError>;

    /// Every stored sample, ascending by timestamp
    fn get_all_samples(&self) -> Result<Vec<Sample>, ComputeError>;

    /// Append a sample; ids must be unique
    fn save_sample(&mut self, sample: Sample) -> Result<(), ComputeError>;

    fn delete_sample(&mut self, id: &str) -> Result<(), ComputeError>;

    fn get_cached_monthly_baseline(
        &self,
        month_key: &str,
    ) -> Result<Option<MonthlyBaseline>, ComputeError>;

    /// Insert or replace the snapshot for its month
    fn save_monthly_baseline(&mut self, baseline: MonthlyBaseline) -> Result<(), ComputeError>;

    fn get_events(&self) -> Result<Vec<CalendarEvent>, ComputeError>;

    fn save_event(&mut self, event: CalendarEvent) -> Result<(), ComputeError>;
}

/// In-memory repository with a JSON snapshot format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryRepository {
    #[serde(default)]
    samples: Vec<Sample>,
    #[serde(default)]
    events: Vec<CalendarEvent>,
    #[serde(default)]
    baselines: BTreeMap<String, MonthlyBaseline>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from samples, dropping duplicate ids (first one wins)
    pub fn with_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut repo = Self::new();
        let mut duplicates = 0_usize;
        for sample in samples {
            if repo.save_sample(sample).is_err() {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "dropped samples with duplicate ids");
        }
        repo
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = CalendarEvent>) -> Self {
        for event in events {
            self.upsert_event(event);
        }
        self
    }

    fn upsert_event(&mut self, event: CalendarEvent) {
        match self.events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event,
            None => self.events.push(event),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Cached monthly snapshots, keyed by `YYYY-MM`
    pub fn baselines(&self) -> impl Iterator<Item = &MonthlyBaseline> {
        self.baselines.values()
    }

    /// Load a repository snapshot from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut repo: Self = serde_json::from_str(json)?;
        repo.samples.sort_by_key(|s| s.timestamp);
        Ok(repo)
    }

    /// Serialize the repository to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl SampleRepository for InMemoryRepository {
    fn get_samples_in_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<Sample>, ComputeError> {
        if end_ms < start_ms {
            return Err(ComputeError::InvalidWindow(format!(
                "range end {} precedes start {}",
                end_ms, start_ms
            )));
        }
        let from = self.samples.partition_point(|s| s.timestamp < start_ms);
        let to = self.samples.partition_point(|s| s.timestamp < end_ms);
        debug!(start_ms, end_ms, found = to - from, "range query");
        Ok(self.samples[from..to].to_vec())
    }

    fn get_all_samples(&self) -> Result<Vec<Sample>, ComputeError> {
        Ok(self.samples.clone())
    }

    fn save_sample(&mut self, sample: Sample) -> Result<(), ComputeError> {
        if self.samples.iter().any(|s| s.id == sample.id) {
            return Err(ComputeError::StorageError(format!(
                "sample id already exists: {}",
                sample.id
            )));
        }
        // Stable position among equal timestamps keeps input order
        let at = self.samples.partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(at, sample);
        Ok(())
    }

    fn delete_sample(&mut self, id: &str) -> Result<(), ComputeError> {
        let index = self
            .samples
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| ComputeError::NotFound(format!("sample {}", id)))?;
        self.samples.remove(index);
        Ok(())
    }

    fn get_cached_monthly_baseline(
        &self,
        month_key: &str,
    ) -> Result<Option<MonthlyBaseline>, ComputeError> {
        Ok(self.baselines.get(month_key).cloned())
    }

    fn save_monthly_baseline(&mut self, baseline: MonthlyBaseline) -> Result<(), ComputeError> {
        self.baselines.insert(baseline.month_key.clone(), baseline);
        Ok(())
    }

    fn get_events(&self) -> Result<Vec<CalendarEvent>, ComputeError> {
        Ok(self.events.clone())
    }

    fn save_event(&mut self, event: CalendarEvent) -> Result<(), ComputeError> {
        self.upsert_event(event);
        Ok(())
    }
}

/// Parse samples from a JSON array
pub fn parse_samples_json(input: &str) -> Result<Vec<Sample>, ComputeError> {
    Ok(serde_json::from_str(input)?)
}

/// Parse samples from NDJSON, one sample per non-blank line
pub fn parse_samples_ndjson(input: &str) -> Result<Vec<Sample>, ComputeError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .map_err(|e| ComputeError::ParseError(format!("line {}: {}", idx + 1, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::types::{validate_samples, TrinityValue};
    use pretty_assertions::assert_eq;

    fn sample(id: &str, ts: i64) -> Sample {
        let mut sample = Sample::new(ts, TrinityValue::new(5.0, 5.0, 5.0));
        sample.id = id.to_string();
        sample
    }

    #[test]
    fn test_range_is_half_open_and_sorted() {
        let repo = InMemoryRepository::with_samples(vec![
            sample("c", 300),
            sample("a", 100),
            sample("b", 200),
        ]);

        let ids: Vec<String> = repo
            .get_samples_in_range(100, 300)
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(repo.get_samples_in_range(300, 100).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut repo = InMemoryRepository::new();
        repo.save_sample(sample("a", 1)).unwrap();
        assert!(matches!(
            repo.save_sample(sample("a", 2)),
            Err(ComputeError::StorageError(_))
        ));

        let repo = InMemoryRepository::with_samples(vec![sample("x", 1), sample("x", 2)]);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_delete_sample() {
        let mut repo = InMemoryRepository::with_samples(vec![sample("a", 1), sample("b", 2)]);
        repo.delete_sample("a").unwrap();
        assert_eq!(repo.len(), 1);
        assert!(matches!(repo.delete_sample("a"), Err(ComputeError::NotFound(_))));
    }

    #[test]
    fn test_baseline_cache_replaces_by_month() {
        let mut repo = InMemoryRepository::new();
        let first = MonthlyBaseline::compute("2025-11", &[], 1);
        let second = MonthlyBaseline::compute("2025-11", &[], 2);
        repo.save_monthly_baseline(first).unwrap();
        repo.save_monthly_baseline(second).unwrap();

        let cached = repo.get_cached_monthly_baseline("2025-11").unwrap().unwrap();
        assert_eq!(cached.computed_at, 2);
        assert!(repo.get_cached_monthly_baseline("2025-10").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut repo = InMemoryRepository::with_samples(vec![sample("a", 1)]);
        repo.save_monthly_baseline(MonthlyBaseline::compute("2025-11", &[], 7))
            .unwrap();
        let restored = InMemoryRepository::from_json(&repo.to_json().unwrap()).unwrap();
        assert_eq!(restored, repo);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let input = "{\"id\":\"a\",\"timestamp\":1,\"values\":{\"p\":5,\"c\":5,\"s\":5}}\n\nnot json\n";
        match parse_samples_ndjson(input) {
            Err(ComputeError::ParseError(msg)) => assert!(msg.starts_with("line 3")),
            other => panic!("unexpected: {:?}", other),
        }

        let ok = parse_samples_ndjson("{\"id\":\"a\",\"timestamp\":1,\"values\":{\"p\":5,\"c\":5,\"s\":5}}\n").unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_malformed_values_do_not_abort_parsing() {
        let json = r#"[
            {"id":"a","timestamp":1,"values":{"p":5,"c":5,"s":5}},
            {"id":"b","timestamp":2}
        ]"#;
        let samples = parse_samples_json(json).unwrap();
        assert_eq!(samples.len(), 2);

        let ndjson = "{\"id\":\"a\",\"timestamp\":1,\"values\":{\"p\":5,\"c\":5,\"s\":5}}\n{\"id\":\"b\",\"timestamp\":2,\"values\":null}\n";
        let samples = parse_samples_ndjson(ndjson).unwrap();
        assert_eq!(samples.len(), 2);

        let failures = validate_samples(&samples);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert!(matches!(failures[0].1, ValidationError::NonFiniteValue { dimension: 'p' }));
    }
}
