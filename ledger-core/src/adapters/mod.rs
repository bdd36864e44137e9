//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the AccountStore and TransactionLog ports (durable)
//! - In-memory maps for the same ports (tests, embedding)
//! - `tracing` and in-memory sinks for IncidentReporter

pub mod duckdb;
pub mod memory;
mod trace;

pub use trace::TracingIncidentReporter;
pub(crate) use trace::emit as trace_incident;
