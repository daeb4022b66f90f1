pub mod errors;
pub mod user;

pub use errors::{ErrorDetail, ErrorResponse, FieldIssue};
pub use user::{
    CreateUserRequest, CreateUserResponse, ListUsersQuery, MessageResponse, USER_ADDED,
    USER_DELETED, USER_UPDATED, UpdateUserRequest, User, UserId, UserRecord,
};
