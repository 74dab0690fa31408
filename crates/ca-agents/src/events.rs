use ca_core::types::StreamingUpdate;

/// Change notifications published on the engines' shared bus.
///
/// Subscribers re-read engine state on receipt; payloads carry only what a
/// live view needs to redraw incrementally.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Issue set or an issue status changed.
    IssuesChanged,
    ExecutionProgress { issue_id: String, progress: u8 },
    /// A timestamped line was appended to the issue output log.
    OutputAppended(String),
    /// The current session was created, changed state or ended.
    SessionChanged,
    /// An entry was appended to the session streaming log.
    Streaming(StreamingUpdate),
    AutoExecutionChanged(bool),
}
