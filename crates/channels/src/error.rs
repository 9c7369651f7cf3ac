use std::error::Error as StdError;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed channel errors shared across adapter traits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider address is malformed for this channel.
    #[error("invalid address for {channel}: {address}")]
    InvalidAddress { channel: String, address: String },

    /// A requested account ID is not registered.
    #[error("unknown channel account: {account_id}")]
    UnknownAccount { account_id: String },

    /// Operation is currently unavailable (not configured/ready).
    #[error("channel operation unavailable: {message}")]
    Unavailable { message: String },

    /// The provider rejected or failed the call. `reason` carries the
    /// provider's own wording and ends up in the delivery state.
    #[error("channel transport error: {reason}")]
    Transport { reason: String },

    /// Wrapped source error from an external dependency.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_address(channel: impl std::fmt::Display, address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            channel: channel.to_string(),
            address: address.into(),
        }
    }

    #[must_use]
    pub fn unknown_account(account_id: impl std::fmt::Display) -> Self {
        Self::UnknownAccount {
            account_id: account_id.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// The reason string persisted into a failed delivery state.
    #[must_use]
    pub fn delivery_reason(&self) -> String {
        match self {
            Self::Transport { reason } => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Whether retrying the same call can plausibly succeed. Malformed
    /// addresses and unknown accounts never heal on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Unavailable { .. })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_reason_is_verbatim() {
        let err = Error::transport("Forbidden: bot was blocked by the user");
        assert_eq!(
            err.delivery_reason(),
            "Forbidden: bot was blocked by the user"
        );
    }

    #[test]
    fn other_errors_use_display() {
        let err = Error::unknown_account("tg-main");
        assert_eq!(err.delivery_reason(), "unknown channel account: tg-main");
    }
}
