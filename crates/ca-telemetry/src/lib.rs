//! Observability for the cli-agent workspace.
//!
//! Key components:
//! - **Logging**: Human-readable and JSON-formatted output via `tracing-subscriber`
//! - **Error log**: the [`error_log::ErrorLogger`] collaborator that engines
//!   report failures and retry warnings to, with file, tracing and in-memory sinks

pub mod error_log;
pub mod logging;
