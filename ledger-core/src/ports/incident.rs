//! Incident reporting port
//!
//! Incidents are things an operator must hear about even though the request
//! that caused them may have succeeded: a missing log record, a reversed
//! transfer, money stuck between two accounts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How loudly an incident should be escalated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    /// A balance change committed but its history record is missing
    DataQuality,
    /// A partial transfer was detected and reversed
    Warning,
    /// Money is in limbo and needs manual reconciliation
    Fatal,
}

impl IncidentSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentSeverity::DataQuality => "data_quality",
            IncidentSeverity::Warning => "warning",
            IncidentSeverity::Fatal => "fatal",
        }
    }
}

/// A reportable incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub severity: IncidentSeverity,
    pub event: String,
    pub message: String,
    /// Structured context (account numbers, amounts); never credentials
    pub details: serde_json::Value,
}

impl Incident {
    pub fn new(
        severity: IncidentSeverity,
        event: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            event: event.into(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Sink for incidents
///
/// Reporting is best effort: implementations swallow (and trace) their own
/// failures so that reporting can never fail the operation being reported on.
pub trait IncidentReporter: Send + Sync {
    fn report(&self, incident: &Incident);
}

impl<S> IncidentReporter for Arc<S>
where
    S: IncidentReporter + ?Sized,
{
    fn report(&self, incident: &Incident) {
        (**self).report(incident)
    }
}
