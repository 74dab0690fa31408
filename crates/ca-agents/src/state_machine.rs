use ca_core::types::{IssueStatus, SessionStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueEvent {
    Start,
    Complete,
    Fail,
}

impl fmt::Display for IssueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueEvent::Start => "Start",
            IssueEvent::Complete => "Complete",
            IssueEvent::Fail => "Fail",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionEvent::Pause => "Pause",
            SessionEvent::Resume => "Resume",
            SessionEvent::Stop => "Stop",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// An event was applied in a state that does not accept it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    #[error("invalid transition: cannot apply {event} to issue in state {state}")]
    InvalidIssueTransition {
        state: IssueStatus,
        event: IssueEvent,
    },
    #[error("invalid transition: cannot apply {event} to session in state {state}")]
    InvalidSessionTransition {
        state: SessionStatus,
        event: SessionEvent,
    },
}

// ---------------------------------------------------------------------------
// Issue lifecycle
// ---------------------------------------------------------------------------

/// Apply `event` to an issue in `state`.
///
/// Valid transitions:
/// - Pending    + Start    -> InProgress
/// - Failed     + Start    -> InProgress
/// - InProgress + Start    -> InProgress
/// - InProgress + Complete -> Completed
/// - InProgress + Fail     -> Failed
pub fn issue_transition(
    state: IssueStatus,
    event: IssueEvent,
) -> Result<IssueStatus, StateMachineError> {
    let next = match (state, event) {
        (IssueStatus::Pending | IssueStatus::Failed | IssueStatus::InProgress, IssueEvent::Start) => {
            IssueStatus::InProgress
        }
        (IssueStatus::InProgress, IssueEvent::Complete) => IssueStatus::Completed,
        (IssueStatus::InProgress, IssueEvent::Fail) => IssueStatus::Failed,
        _ => return Err(StateMachineError::InvalidIssueTransition { state, event }),
    };
    tracing::debug!(from = %state, event = %event, to = %next, "issue state transition");
    Ok(next)
}

// ---------------------------------------------------------------------------
// SessionStateMachine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    current: SessionStatus,
    history: Vec<(SessionStatus, SessionEvent, SessionStatus)>,
}

impl SessionStateMachine {
    /// New sessions start `Active`.
    pub fn new() -> Self {
        Self {
            current: SessionStatus::Active,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionStatus {
        self.current
    }

    pub fn history(&self) -> &[(SessionStatus, SessionEvent, SessionStatus)] {
        &self.history
    }

    /// Attempt a state transition driven by `event`.
    ///
    /// Valid transitions:
    /// - Active + Pause  -> Paused
    /// - Paused + Resume -> Active
    /// - Active + Stop   -> Completed
    /// - Paused + Stop   -> Completed
    pub fn transition(&mut self, event: SessionEvent) -> Result<SessionStatus, StateMachineError> {
        let next = match (self.current, event) {
            (SessionStatus::Active, SessionEvent::Pause) => SessionStatus::Paused,
            (SessionStatus::Paused, SessionEvent::Resume) => SessionStatus::Active,
            (SessionStatus::Active | SessionStatus::Paused, SessionEvent::Stop) => {
                SessionStatus::Completed
            }
            _ => {
                return Err(StateMachineError::InvalidSessionTransition {
                    state: self.current,
                    event,
                });
            }
        };

        let from = self.current;
        self.current = next;
        self.history.push((from, event, next));
        tracing::debug!(from = %from, event = %event, to = %next, "session state transition");
        Ok(next)
    }

    /// Returns `true` if the given event is valid in the current state.
    pub fn can_transition(&self, event: SessionEvent) -> bool {
        matches!(
            (self.current, event),
            (SessionStatus::Active, SessionEvent::Pause)
                | (SessionStatus::Paused, SessionEvent::Resume)
                | (SessionStatus::Active | SessionStatus::Paused, SessionEvent::Stop)
        )
    }

    /// `Completed` accepts no further events.
    pub fn is_terminal(&self) -> bool {
        self.current == SessionStatus::Completed
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
