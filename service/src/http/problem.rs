//! RFC 7807 problem responses.

use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use cw_web::InputError;
use serde::{Serialize, Serializer};

fn serialize_status_code<S: Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

/// RFC 7807 Problem Details error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// URI reference identifying the problem type
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Short human-readable summary
    pub title: String,
    /// HTTP status code
    #[serde(serialize_with = "serialize_status_code")]
    pub status: StatusCode,
    /// Human-readable explanation specific to this occurrence
    pub detail: String,
    /// URI reference identifying the specific occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ProblemExtensions>,
}

#[derive(Debug, Serialize)]
pub struct ProblemExtensions {
    /// Machine-readable error code
    pub code: String,
    /// Field that caused the error (for validation errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ProblemDetails {
    /// A request field failed input validation.
    #[must_use]
    pub fn invalid_input(field: &str, err: &InputError) -> Self {
        let code = match err {
            InputError::Empty => "EMPTY_INPUT",
            InputError::TooLong { .. } => "INPUT_TOO_LONG",
            InputError::Forbidden(_) => "FORBIDDEN_CONTENT",
        };
        Self {
            problem_type: "about:blank#invalid-input".to_string(),
            title: "Invalid Input".to_string(),
            status: StatusCode::BAD_REQUEST,
            detail: err.to_string(),
            instance: None,
            extensions: Some(ProblemExtensions {
                code: code.to_string(),
                field: Some(field.to_string()),
            }),
        }
    }

    /// The request body could not be read as the expected JSON.
    ///
    /// Keeps the rejection's status: 400 for syntax errors, 415 for a missing
    /// content type, 422 for missing or mistyped fields.
    #[must_use]
    pub fn malformed_body(rejection: &JsonRejection) -> Self {
        let status = rejection.status();
        Self {
            problem_type: "about:blank#invalid-body".to_string(),
            title: status
                .canonical_reason()
                .unwrap_or("Invalid Request Body")
                .to_string(),
            status,
            detail: rejection.body_text(),
            instance: None,
            extensions: Some(ProblemExtensions {
                code: "INVALID_BODY".to_string(),
                field: None,
            }),
        }
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}
