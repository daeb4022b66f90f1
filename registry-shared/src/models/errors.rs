use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// One structural problem found in a request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct FieldIssue {
    /// Where the problem is: the request part (`body`, `query`, `path`)
    /// followed by the field name when there is one.
    pub loc: Vec<String>,
    /// Human readable description.
    pub msg: String,
    /// Stable machine readable code such as `length` or `email`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldIssue {
    pub fn new(
        loc: impl IntoIterator<Item = impl Into<String>>,
        msg: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            loc: loc.into_iter().map(Into::into).collect(),
            msg: msg.into(),
            kind: kind.into(),
        }
    }
}

/// Payload of the `detail` field: a fixed message for business rule
/// failures, or the list of issues for validation failures.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Issues(Vec<FieldIssue>),
}

/// Represents an error response.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct ErrorResponse {
    pub detail: ErrorDetail,
}

impl ErrorResponse {
    /// Creates an error response carrying a single message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            detail: ErrorDetail::Message(message.into()),
        }
    }

    /// Creates an error response listing validation issues.
    #[must_use]
    pub fn validation(issues: Vec<FieldIssue>) -> Self {
        Self {
            detail: ErrorDetail::Issues(issues),
        }
    }

    /// Returns the message when this is a single-message response.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match &self.detail {
            ErrorDetail::Message(message) => Some(message),
            ErrorDetail::Issues(_) => None,
        }
    }

    /// Returns the validation issues, empty for single-message responses.
    #[must_use]
    pub fn issues(&self) -> &[FieldIssue] {
        match &self.detail {
            ErrorDetail::Message(_) => &[],
            ErrorDetail::Issues(issues) => issues,
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            ErrorDetail::Message(message) => f.write_str(message),
            ErrorDetail::Issues(issues) => {
                let rendered = issues
                    .iter()
                    .map(|issue| format!("{}: {}", issue.loc.join("."), issue.msg))
                    .collect::<Vec<_>>()
                    .join("; ");
                f.write_str(&rendered)
            }
        }
    }
}

impl std::error::Error for ErrorResponse {}
