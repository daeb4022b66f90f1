use std::sync::Arc;

use axum::{Json, extract::State};
use shared::models::{
    CreateUserRequest, CreateUserResponse, ErrorResponse, ListUsersQuery, MessageResponse,
    USER_DELETED, USER_UPDATED, UpdateUserRequest, User,
};
use tracing::{info, instrument};

use crate::{
    app_state::AppState,
    http::{
        error::AppResult,
        extract::{UserIdPath, ValidatedJson, ValidatedQuery},
    },
};

// Handler for registering a new user
#[utoipa::path(
    post,
    path = "/users/",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = CreateUserResponse),
        (status = 400, description = "Email already exists", body = ErrorResponse),
        (status = 422, description = "Request failed validation", body = ErrorResponse)
    ),
    tag = "Users"
)]
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> AppResult<Json<CreateUserResponse>> {
    let username = payload.username.clone();
    let id = state
        .registry
        .create(payload.into())
        .await
        .inspect_err(|err| info!(%username, error = %err, "user creation rejected"))?;

    info!(user_id = id, %username, "user created");
    Ok(Json(CreateUserResponse::new(id)))
}

// Handler for listing users in insertion order
#[utoipa::path(
    get,
    path = "/users/",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Stored users", body = [User]),
        (status = 422, description = "Invalid limit", body = ErrorResponse)
    ),
    tag = "Users"
)]
#[instrument(skip_all, fields(limit = ?query.0.limit))]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    query: ValidatedQuery<ListUsersQuery>,
) -> Json<Vec<User>> {
    let ValidatedQuery(ListUsersQuery { limit }) = query;
    Json(state.registry.list(limit).await)
}

// Handler for partially updating a user
#[utoipa::path(
    put,
    path = "/users/{user_id}",
    params(("user_id" = u64, Path, description = "Id of the user to update")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = MessageResponse),
        (status = 400, description = "Email already exists (uniqueness on update enabled)", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 422, description = "Request failed validation", body = ErrorResponse)
    ),
    tag = "Users"
)]
#[instrument(skip_all, fields(user_id = user_id.0))]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    user_id: UserIdPath,
    ValidatedJson(changes): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<MessageResponse>> {
    let UserIdPath(id) = user_id;
    let changed_email = changes.email.is_some();
    let no_op = changes.is_empty();

    state.registry.update(id, changes).await?;

    info!(changed_email, no_op, "user updated");
    Ok(Json(MessageResponse::new(USER_UPDATED)))
}

// Handler for removing a user
#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    params(("user_id" = u64, Path, description = "Id of the user to delete")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 422, description = "Malformed user id", body = ErrorResponse)
    ),
    tag = "Users"
)]
#[instrument(skip_all, fields(user_id = user_id.0))]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    user_id: UserIdPath,
) -> AppResult<Json<MessageResponse>> {
    let UserIdPath(id) = user_id;
    state.registry.delete(id).await?;

    info!("user deleted");
    Ok(Json(MessageResponse::new(USER_DELETED)))
}
