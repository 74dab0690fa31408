//! Simulated execution engines.
//!
//! [`issue_engine::IssueEngine`] steps issues through their lifecycle with
//! optional fault injection and retry-driven batch runs.
//! [`session_runner::SessionRunner`] owns autonomous sessions: demo task
//! queues, auto-execution with pause/resume, and the bounded streaming log.

pub mod demo;
pub mod events;
pub mod issue_engine;
pub mod session_runner;
pub mod state_machine;
