use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use jobboard_core::lifecycle::RuleViolation;

/// Stable `type` identifiers carried by problem responses.
pub mod kind {
    pub const NOT_FOUND: &str = "not_found";
    pub const FORBIDDEN: &str = "forbidden";
    pub const DUPLICATE_APPLICATION: &str = "duplicate_application";
    pub const SELF_APPLICATION_FORBIDDEN: &str = "self_application_forbidden";
    pub const INVALID_ATTACHMENT: &str = "invalid_attachment";
    pub const STATUS_EDIT_NOT_ALLOWED: &str = "status_edit_not_allowed";
    pub const NO_NOTIFICATIONS: &str = "no_notifications";
    pub const INVALID_POSTING: &str = "invalid_posting";
    pub const DUPLICATE_SAVED_JOB: &str = "duplicate_saved_job";
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const TOKEN_EXPIRED: &str = "token_expired";
    pub const BAD_REQUEST: &str = "bad_request";
    pub const INTERNAL: &str = "internal";
}

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn not_found<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, kind::NOT_FOUND, detail)
    }

    pub fn internal<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, kind::INTERNAL, detail)
    }
}

/// Maps a lifecycle rule rejection onto its problem kind and status.
pub fn from_rule_violation(violation: &RuleViolation) -> ProblemResponse {
    let (status, problem_type) = match violation {
        RuleViolation::SelfApplication => {
            (StatusCode::FORBIDDEN, kind::SELF_APPLICATION_FORBIDDEN)
        }
        RuleViolation::AttachmentType | RuleViolation::AttachmentTooLarge => {
            (StatusCode::UNPROCESSABLE_ENTITY, kind::INVALID_ATTACHMENT)
        }
        RuleViolation::StatusEditNotAllowed => {
            (StatusCode::FORBIDDEN, kind::STATUS_EDIT_NOT_ALLOWED)
        }
        RuleViolation::NotPostingOwner
        | RuleViolation::NotApplicationOwner
        | RuleViolation::CompanyInactive => (StatusCode::FORBIDDEN, kind::FORBIDDEN),
        RuleViolation::SalaryRangeInverted | RuleViolation::DeadlinePassed => {
            (StatusCode::UNPROCESSABLE_ENTITY, kind::INVALID_POSTING)
        }
    };
    ProblemResponse::new(status, problem_type, violation.to_string())
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
