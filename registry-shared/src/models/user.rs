use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

/// Confirmation returned after a user is created.
pub const USER_ADDED: &str = "User added successfully";
/// Confirmation returned after a user is updated.
pub const USER_UPDATED: &str = "User updated successfully";
/// Confirmation returned after a user is deleted.
pub const USER_DELETED: &str = "User deleted successfully";

/// Identifier assigned to a user by the registry.
pub type UserId = u64;

/// Fields stored for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    /// Stored and returned verbatim.
    pub password: String,
}

/// A stored user together with its id, as returned by the list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct User {
    #[schema(minimum = 1, example = 1)]
    pub id: UserId,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "secret1")]
    pub password: String,
}

impl User {
    #[must_use]
    pub fn from_record(id: UserId, record: &UserRecord) -> Self {
        Self {
            id,
            username: record.username.clone(),
            email: record.email.clone(),
            password: record.password.clone(),
        }
    }
}

/// Rejects single-label domains such as `a@localhost`, which the `email`
/// rule accepts. Label syntax is left to the `email` rule so a bad address
/// is reported once.
fn validate_email_domain(email: &str) -> Result<(), ValidationError> {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return Ok(());
    };

    if domain.contains('.') {
        Ok(())
    } else {
        Err(ValidationError::new("email"))
    }
}

/// Request to create a new user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "username must be between 3 and 50 characters"
    ))]
    #[schema(min_length = 3, max_length = 50, example = "alice")]
    pub username: String,

    #[validate(
        email(message = "value is not a valid email address"),
        custom(
            function = "validate_email_domain",
            message = "value is not a valid email address"
        )
    )]
    #[schema(example = "alice@example.com")]
    pub email: String,

    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    #[schema(min_length = 6, example = "secret1")]
    pub password: String,
}

impl From<CreateUserRequest> for UserRecord {
    fn from(request: CreateUserRequest) -> Self {
        Self {
            username: request.username,
            email: request.email,
            password: request.password,
        }
    }
}

/// Partial update of a user; omitted (or `null`) fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "username must be between 3 and 50 characters"
    ))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(min_length = 3, max_length = 50)]
    pub username: Option<String>,

    #[validate(
        email(message = "value is not a valid email address"),
        custom(
            function = "validate_email_domain",
            message = "value is not a valid email address"
        )
    )]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(min_length = 6)]
    pub password: Option<String>,
}

impl UpdateUserRequest {
    /// `true` when no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password.is_none()
    }

    /// Merges the supplied fields into `record`.
    pub fn apply_to(self, record: &mut UserRecord) {
        if let Some(username) = self.username {
            record.username = username;
        }
        if let Some(email) = self.email {
            record.email = email;
        }
        if let Some(password) = self.password {
            record.password = password;
        }
    }
}

/// Query string accepted by the list endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// Return at most this many users, in insertion order.
    #[validate(range(min = 1, message = "limit must be greater than or equal to 1"))]
    #[param(minimum = 1)]
    pub limit: Option<usize>,
}

/// Response to a successful create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CreateUserResponse {
    pub id: UserId,
    #[schema(example = "User added successfully")]
    pub message: String,
}

impl CreateUserResponse {
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            message: USER_ADDED.to_string(),
        }
    }
}

/// Confirmation body with no other content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
