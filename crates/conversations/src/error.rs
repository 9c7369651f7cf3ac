use attendo_common::{types::ConversationStatus, FromMessage};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("conversation not found: {id}")]
    NotFound { id: String },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ConversationStatus,
        to: ConversationStatus,
    },

    /// The conversation was closed by a concurrent writer.
    #[error("conversation already closed: {id}")]
    AlreadyClosed { id: String },

    /// Forward target belongs to a different tenant (or does not exist in
    /// this one, which callers must not be able to distinguish).
    #[error("forward target not in tenant: {target}")]
    CrossTenantViolation { target: String },

    /// Optimistic write lost to a concurrent version bump.
    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error(transparent)]
    Directory(#[from] attendo_directory::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

attendo_common::impl_context!();
