#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

use shared::models::{
    CreateUserRequest, CreateUserResponse, ErrorDetail, ErrorResponse, FieldIssue,
    MessageResponse, UpdateUserRequest, User,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "User Registry API",
        version = "1.0.0",
        description = "In-memory user registry: create, list, update, and delete users"
    ),
    paths(
        crate::handlers::users::create_user,
        crate::handlers::users::list_users,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
    ),
    components(
        schemas(
            CreateUserRequest,
            CreateUserResponse,
            UpdateUserRequest,
            MessageResponse,
            User,
            ErrorResponse,
            ErrorDetail,
            FieldIssue,
        )
    ),
    tags(
        (name = "Users", description = "User registry endpoints")
    )
)]
pub struct ApiDoc;
