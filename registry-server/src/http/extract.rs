//! Extractors that run structural validation before a handler sees the
//! request, turning every rejection into a 422 [`ApiError`].

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use shared::models::UserId;
use validator::Validate;

use super::error::{ApiError, RequestPart};

/// JSON body that has been deserialized and passed `validator` checks.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value
            .validate()
            .map_err(|errors| ApiError::validation_failed(RequestPart::Body, &errors))?;
        Ok(Self(value))
    }
}

/// Query string that has been deserialized and passed `validator` checks.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        value
            .validate()
            .map_err(|errors| ApiError::validation_failed(RequestPart::Query, &errors))?;
        Ok(Self(value))
    }
}

/// The `{user_id}` path segment, guaranteed to be an integer >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdPath(pub UserId);

impl<S> FromRequestParts<S> for UserIdPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state).await?;
        parse_user_id(&raw).map(Self)
    }
}

const USER_ID_FIELD: &str = "user_id";

/// Parses a user id, distinguishing non-integers from integers below 1.
///
/// # Errors
/// Returns a 422 [`ApiError`] naming `path.user_id`.
pub fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    let Ok(value) = raw.parse::<i128>() else {
        return Err(ApiError::invalid(
            RequestPart::Path,
            Some(USER_ID_FIELD),
            "Input should be a valid integer",
            "int_parsing",
        ));
    };

    if value < 1 {
        return Err(ApiError::invalid(
            RequestPart::Path,
            Some(USER_ID_FIELD),
            "Input should be greater than or equal to 1",
            "greater_than_equal",
        ));
    }

    UserId::try_from(value).map_err(|_| {
        ApiError::invalid(
            RequestPart::Path,
            Some(USER_ID_FIELD),
            "Input is too large for a user id",
            "int_too_large",
        )
    })
}
