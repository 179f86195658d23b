#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Turn loop driving live feedback sessions.
pub mod runner;
/// Session state machine and turn records.
pub mod state;

pub use runner::SessionRunner;
pub use state::{
    FeedbackSession, ReplyClassification, SessionError, SessionStatus, Turn, TurnOutcome,
};
