//! Maps domain errors onto HTTP responses.
//!
//! Every handler returns [`ApiError`] on failure; the wire body is always
//! `{ "error": { "code", "message" } }` so clients never parse two shapes.

use {
    attendo_protocol::{ErrorShape, error_codes},
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    tracing::error,
};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Conversations(#[from] attendo_conversations::Error),

    #[error(transparent)]
    Directory(#[from] attendo_directory::Error),

    #[error(transparent)]
    Channels(#[from] attendo_channels::Error),

    #[error(transparent)]
    Dispatch(#[from] attendo_dispatch::Error),

    /// Request body or parameters failed validation before reaching the
    /// engine.
    #[error("{message}")]
    Validation { message: String },

    /// A referenced resource does not exist (outside the conversation store,
    /// which carries its own NotFound).
    #[error("{message}")]
    NotFound { message: String },
}

impl ApiError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    fn status_and_shape(&self) -> (StatusCode, ErrorShape) {
        match self {
            Self::Conversations(e) => conversations_shape(e),
            Self::Dispatch(e) => match e {
                attendo_dispatch::Error::Conversations(inner) => conversations_shape(inner),
                attendo_dispatch::Error::Channel(inner) => channels_shape(inner),
                attendo_dispatch::Error::Directory(_) => internal_shape(e),
            },
            Self::Channels(e) => channels_shape(e),
            Self::Directory(e) => internal_shape(e),
            Self::Validation { message } => (
                StatusCode::BAD_REQUEST,
                ErrorShape::new(error_codes::INVALID_REQUEST, message.clone()),
            ),
            Self::NotFound { message } => (
                StatusCode::NOT_FOUND,
                ErrorShape::new(error_codes::NOT_FOUND, message.clone()),
            ),
        }
    }
}

fn conversations_shape(e: &attendo_conversations::Error) -> (StatusCode, ErrorShape) {
    use attendo_conversations::Error;
    match e {
        Error::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            ErrorShape::new(error_codes::NOT_FOUND, e.to_string()),
        ),
        Error::InvalidTransition { .. } => (
            StatusCode::CONFLICT,
            ErrorShape::new(error_codes::INVALID_TRANSITION, e.to_string()),
        ),
        Error::AlreadyClosed { .. } => (
            StatusCode::CONFLICT,
            ErrorShape::new(error_codes::ALREADY_CLOSED, e.to_string()),
        ),
        Error::CrossTenantViolation { .. } => (
            StatusCode::FORBIDDEN,
            ErrorShape::new(error_codes::CROSS_TENANT, e.to_string()),
        ),
        Error::Conflict { .. } => (
            StatusCode::CONFLICT,
            ErrorShape::new(error_codes::CONFLICT, e.to_string()).retryable(true),
        ),
        other => internal_shape(other),
    }
}

fn channels_shape(e: &attendo_channels::Error) -> (StatusCode, ErrorShape) {
    use attendo_channels::Error;
    match e {
        Error::UnknownAccount { .. } => (
            StatusCode::NOT_FOUND,
            ErrorShape::new(error_codes::NOT_FOUND, e.to_string()),
        ),
        Error::InvalidAddress { .. } => (
            StatusCode::BAD_REQUEST,
            ErrorShape::new(error_codes::INVALID_REQUEST, e.to_string()),
        ),
        Error::Transport { .. } | Error::Unavailable { .. } | Error::External { .. } => (
            StatusCode::BAD_GATEWAY,
            ErrorShape::new(error_codes::CHANNEL_TRANSPORT, e.to_string())
                .retryable(e.is_transient()),
        ),
        other => internal_shape(other),
    }
}

fn internal_shape(e: &dyn std::fmt::Display) -> (StatusCode, ErrorShape) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorShape::new(error_codes::INTERNAL, e.to_string()),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, shape) = self.status_and_shape();
        if status.is_server_error() {
            error!(status = %status, error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": shape }))).into_response()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use attendo_common::types::ConversationStatus;

    use super::*;

    #[test]
    fn not_found_is_404() {
        let err = ApiError::from(attendo_conversations::Error::not_found("c-9"));
        let (status, shape) = err.status_and_shape();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(shape.code, error_codes::NOT_FOUND);
    }

    #[test]
    fn lifecycle_conflicts_are_409() {
        let invalid = ApiError::from(attendo_conversations::Error::InvalidTransition {
            from: ConversationStatus::Closed,
            to: ConversationStatus::Resolved,
        });
        assert_eq!(invalid.status_and_shape().0, StatusCode::CONFLICT);

        let closed = ApiError::from(attendo_conversations::Error::AlreadyClosed {
            id: "c-1".into(),
        });
        let (status, shape) = closed.status_and_shape();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(shape.code, error_codes::ALREADY_CLOSED);
    }

    #[test]
    fn cross_tenant_is_403() {
        let err = ApiError::from(attendo_conversations::Error::CrossTenantViolation {
            target: "agt-other".into(),
        });
        let (status, shape) = err.status_and_shape();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(shape.code, error_codes::CROSS_TENANT);
    }

    #[test]
    fn transport_failures_are_502_and_retryable() {
        let err = ApiError::from(attendo_channels::Error::transport("bot was blocked"));
        let (status, shape) = err.status_and_shape();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(shape.code, error_codes::CHANNEL_TRANSPORT);
        assert_eq!(shape.retryable, Some(true));
    }

    #[test]
    fn validation_is_400() {
        let err = ApiError::validation("sender role is required");
        let (status, shape) = err.status_and_shape();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(shape.code, error_codes::INVALID_REQUEST);
    }

    #[test]
    fn dispatch_wrapping_preserves_the_inner_mapping() {
        let err = ApiError::from(attendo_dispatch::Error::from(
            attendo_conversations::Error::not_found("c-2"),
        ));
        assert_eq!(err.status_and_shape().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn wire_body_nests_the_shape_under_error() {
        let response =
            ApiError::from(attendo_conversations::Error::not_found("c-9")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
