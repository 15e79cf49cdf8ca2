use thiserror::Error;

use crate::backend::BackendError;

/// Local validation failures. Raised before any backend call is attempted and
/// surfaced to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Messages can only be deleted for everyone within {window_mins} minutes of sending")]
    DeleteWindowElapsed { window_mins: i64 },
    #[error("This message hasn't been sent yet")]
    MessageNotConfirmed,
    #[error("This message was deleted")]
    MessageDeleted,
    #[error("Message not found")]
    MessageNotFound,
    #[error("This message can't be selected")]
    NotSelectable,
    #[error("Select a message first")]
    EmptySelection,
    #[error("Select a single message")]
    SelectionTooLarge,
    #[error("Select at least one member")]
    NoMembersSelected,
    #[error("Group name can't be empty")]
    EmptyGroupName,
    #[error("Message can't be empty")]
    EmptyMessage,
    #[error("Open a conversation first")]
    NoActiveRoom,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error("transport failure: {0}")]
    Transport(#[from] BackendError),
    #[error("stale response")]
    Stale,
    #[error("room {0} is not cached")]
    NotCached(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// What the UI is allowed to see. Transport details stay in the logs.
    pub fn user_message(&self) -> Option<String> {
        match self {
            CoreError::Policy(p) => Some(p.to_string()),
            CoreError::Transport(_) => Some("Something went wrong. Please try again.".into()),
            CoreError::Stale | CoreError::NotCached(_) => None,
        }
    }
}
