//! API error-handling module

use std::fmt;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::domain::communication::errors::SendEmailError;

/// Title of a failed request validation
pub const CONSTRAINT_VIOLATION: &str = "Constraint Violation";

/// A single failed validation
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct Violation {
    /// Path of the offending field
    #[schema(example = "sender.address")]
    pub field: String,

    /// What is wrong with it
    #[schema(example = "must be a well-formed email address")]
    pub message: String,
}

impl Violation {
    /// Create a new violation
    pub fn new(field: impl Into<String>, message: impl ToString) -> Self {
        Self {
            field: field.into(),
            message: message.to_string(),
        }
    }
}

/// An error response
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// The error message
    #[schema(example = "Unable to send e-mail")]
    pub error: String,

    /// Failed validations, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

/// An error raised in the API
#[derive(Debug, Deserialize, ToSchema)]
pub struct ApiError {
    /// The status code
    #[schema(example = 500, value_type = u16)]
    #[serde(with = "http_serde::status_code")]
    pub status: StatusCode,

    /// The error message
    #[schema(example = "Unable to send e-mail")]
    pub message: String,

    /// Failed validations
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
            violations: Vec::new(),
        }
    }

    /// Create a new constraint violation error
    pub fn new_400(violations: Vec<Violation>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: CONSTRAINT_VIOLATION.to_string(),
            violations,
        }
    }

    /// Create new internal server error
    pub fn new_500(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Create a new bad gateway error
    pub fn new_502(message: &str) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                violations: self.violations,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("{err:?}");

        ApiError::new_500("An unknown error occurred, please try again")
    }
}

impl From<SendEmailError> for ApiError {
    fn from(err: SendEmailError) -> Self {
        match err {
            SendEmailError::NoSenderConfigured { .. } => ApiError::new_502(&err.to_string()),
            SendEmailError::InvalidMessage(ref cause) => {
                error!("Unable to assemble e-mail: {cause:?}");
                ApiError::new_500(&err.to_string())
            }
            SendEmailError::SendFailed(ref cause) => {
                error!("Unable to send e-mail: {cause:?}");
                ApiError::new_500(&err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), &rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use testresult::TestResult;

    use crate::domain::communication::{
        envelope::MimeError, errors::SendEmailError, mailer::MailerError,
    };

    use super::*;

    #[tokio::test]
    async fn test_error_response() -> TestResult {
        let error = ApiError::new_500("Unable to send e-mail");

        let response = error.into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await?;

        assert_eq!(body, r#"{"error":"Unable to send e-mail"}"#);

        Ok(())
    }

    #[tokio::test]
    async fn test_violation_response() -> TestResult {
        let error = ApiError::new_400(vec![Violation::new("subject", "must not be blank")]);

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await?;

        assert_eq!(
            body,
            r#"{"error":"Constraint Violation","violations":[{"field":"subject","message":"must not be blank"}]}"#
        );

        Ok(())
    }

    #[test]
    fn test_api_error_from_error_hides_details() {
        let api_error = ApiError::from(anyhow!("database password is hunter2"));

        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api_error.message.contains("hunter2"));
    }

    #[test]
    fn test_no_sender_is_bad_gateway() {
        let api_error = ApiError::from(SendEmailError::NoSenderConfigured {
            municipality_id: "2281".to_string(),
        });

        assert_eq!(api_error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            api_error.message,
            "No mail sender exists for municipalityId 2281"
        );
    }

    #[test]
    fn test_send_failure_is_internal_server_error() {
        let api_error = ApiError::from(SendEmailError::SendFailed(MailerError::SendError(
            anyhow!("554 relay access denied"),
        )));

        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_error.message, "Unable to send e-mail");
    }

    #[test]
    fn test_invalid_html_is_internal_server_error() {
        let decode_error = base64::DecodeError::InvalidLength(3);
        let api_error = ApiError::from(SendEmailError::InvalidMessage(MimeError::HtmlNotBase64(
            decode_error,
        )));

        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_error.message, "Unable to send e-mail");
    }
}
