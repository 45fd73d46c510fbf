//! Report encoding
//!
//! Wraps analytics output in a versioned JSON envelope carrying producer
//! metadata, so downstream consumers can tell which build and which process
//! instance produced a report.

use crate::error::ComputeError;
use crate::timezone::TimeZonePolicy;
use crate::{PRODUCER_NAME, TRINITY_VERSION};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current envelope schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Who produced a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Versioned wrapper around any serializable report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope<T> {
    pub report_version: String,
    pub producer: ReportProducer,
    /// RFC 3339 instant the envelope was produced
    pub computed_at_utc: String,
    /// Zone the report's local times are expressed in
    pub timezone: TimeZonePolicy,
    pub report: T,
}

/// Report encoder holding a per-process instance id
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn producer(&self) -> ReportProducer {
        ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: TRINITY_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        }
    }

    /// Wrap `report`, stamped with the current time
    pub fn encode<T: Serialize>(&self, report: T, timezone: TimeZonePolicy) -> ReportEnvelope<T> {
        self.encode_at(report, timezone, Utc::now())
    }

    /// Wrap `report` with an explicit production instant
    pub fn encode_at<T: Serialize>(
        &self,
        report: T,
        timezone: TimeZonePolicy,
        computed_at: DateTime<Utc>,
    ) -> ReportEnvelope<T> {
        ReportEnvelope {
            report_version: REPORT_VERSION.to_string(),
            producer: self.producer(),
            computed_at_utc: computed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            timezone,
            report,
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json<T: Serialize>(
        &self,
        report: T,
        timezone: TimeZonePolicy,
    ) -> Result<String, ComputeError> {
        let envelope = self.encode(report, timezone);
        serde_json::to_string_pretty(&envelope).map_err(ComputeError::JsonError)
    }
}
