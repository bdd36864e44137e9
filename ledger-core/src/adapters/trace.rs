//! Incident reporter that only emits `tracing` events

use crate::ports::{Incident, IncidentReporter, IncidentSeverity};

/// Reports incidents to the process-wide tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingIncidentReporter;

impl IncidentReporter for TracingIncidentReporter {
    fn report(&self, incident: &Incident) {
        emit(incident);
    }
}

/// Emit an incident at the level matching its severity
pub(crate) fn emit(incident: &Incident) {
    match incident.severity {
        IncidentSeverity::Fatal => tracing::error!(
            severity = incident.severity.as_str(),
            event = %incident.event,
            details = %incident.details,
            "{}",
            incident.message
        ),
        IncidentSeverity::Warning | IncidentSeverity::DataQuality => tracing::warn!(
            severity = incident.severity.as_str(),
            event = %incident.event,
            details = %incident.details,
            "{}",
            incident.message
        ),
    }
}
