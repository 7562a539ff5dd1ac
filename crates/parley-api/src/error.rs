use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use parley_types::api::ErrorBody;

/// Every failure a handler can surface. The client only ever sees the
/// fixed code/message pair below; provider and database detail stays in
/// the logs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing required fields")]
    MissingFields,
    #[error("invalid pagination cursor")]
    InvalidCursor,
    #[error("auth token rejected")]
    InvalidToken,
    #[error("csrf verification failed")]
    Csrf,
    #[error("conversation owned by another recruiter")]
    Forbidden,
    #[error("recruiter not found")]
    RecruiterNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields | ApiError::InvalidCursor => StatusCode::BAD_REQUEST,
            ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::Csrf | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RecruiterNotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingFields => "missing_fields",
            ApiError::InvalidCursor => "invalid_cursor",
            ApiError::InvalidToken => "invalid_token",
            ApiError::Csrf => "csrf",
            ApiError::Forbidden => "forbidden",
            ApiError::RecruiterNotFound => "not_found",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Human-readable message shown to the visitor.
    pub fn message(&self) -> &'static str {
        match self {
            ApiError::MissingFields => "Required fields are missing from the request.",
            ApiError::InvalidCursor => "The pagination cursor is not valid for this conversation.",
            ApiError::InvalidToken => "Your session is invalid or has expired. Please sign in again.",
            ApiError::Csrf => "The request could not be verified.",
            ApiError::Forbidden => "You don't have access to this conversation.",
            ApiError::RecruiterNotFound => "Recruiter not found.",
            ApiError::Internal(_) => "Something went wrong on our end. Please try again.",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            error!("internal error: {:#}", e);
        }
        let body = ErrorBody {
            error: self.message().to_string(),
            code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ApiError::MissingFields.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Csrf.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::RecruiterNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_never_reaches_the_message() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused to db at 10.0.0.5"));
        assert!(!err.message().contains("10.0.0.5"));
    }
}
