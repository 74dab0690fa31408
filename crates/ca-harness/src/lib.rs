//! Reliability infrastructure shared by the execution engines.
//!
//! - [`retry`]: linear-backoff retry policy that reports each retry to the
//!   error log
//! - [`error_handlers`]: first-match classification chain that turns raw
//!   failures into user-facing messages

pub mod error_handlers;
pub mod retry;
