use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use shared::models::{ErrorResponse, FieldIssue};
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::services::RegistryError;

pub type AppResult<T> = Result<T, ApiError>;

/// Where a rejected value came from; the first element of each issue `loc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPart {
    Body,
    Query,
    Path,
}

impl RequestPart {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Query => "query",
            Self::Path => "path",
        }
    }
}

#[derive(Debug, Error)]
#[error("{status}: {body}")]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse::new(message),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[must_use]
    pub fn unprocessable(issues: Vec<FieldIssue>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorResponse::validation(issues),
        }
    }

    /// Single-issue 422 for `part`, optionally naming a field.
    #[must_use]
    pub fn invalid(part: RequestPart, field: Option<&str>, msg: &str, kind: &str) -> Self {
        let mut loc = vec![part.as_str().to_string()];
        if let Some(field) = field {
            loc.push(field.to_string());
        }
        Self::unprocessable(vec![FieldIssue::new(loc, msg, kind)])
    }

    /// Flattens `validator` output into one issue per failed rule.
    #[must_use]
    pub fn validation_failed(part: RequestPart, errors: &ValidationErrors) -> Self {
        let mut issues = Vec::new();
        collect_issues(&[part.as_str().to_string()], errors, &mut issues);
        issues.sort_by(|a, b| a.loc.cmp(&b.loc));
        Self::unprocessable(issues)
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub const fn body(&self) -> &ErrorResponse {
        &self.body
    }
}

fn collect_issues(prefix: &[String], errors: &ValidationErrors, issues: &mut Vec<FieldIssue>) {
    for (field, kind) in errors.errors() {
        let mut loc = prefix.to_vec();
        loc.push(field.to_string());

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let msg = error
                        .message
                        .as_ref()
                        .map_or_else(|| format!("failed `{}` check", error.code), ToString::to_string);
                    issues.push(FieldIssue::new(loc.clone(), msg, error.code.to_string()));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_issues(&loc, nested, issues),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    let mut item_loc = loc.clone();
                    item_loc.push(index.to_string());
                    collect_issues(&item_loc, nested, issues);
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateEmail => Self::bad_request(err.to_string()),
            RegistryError::NotFound(_) => Self::not_found(err.to_string()),
            RegistryError::IdSpaceExhausted => Self::internal_server_error(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let kind = match &rejection {
            JsonRejection::JsonDataError(_) => "value_error",
            JsonRejection::MissingJsonContentType(_) => "missing",
            _ => "json_invalid",
        };
        Self::invalid(RequestPart::Body, None, &rejection.body_text(), kind)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid(RequestPart::Query, None, &rejection.body_text(), "parsing")
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(inner) => {
                Self::invalid(RequestPart::Path, None, &inner.body_text(), "parsing")
            }
            other => Self::internal_server_error(other.body_text()),
        }
    }
}
