use std::sync::Arc;

use crate::{
    app_state::AppState,
    handlers::users::{create_user, delete_user, list_users, update_user},
};
use axum::{
    Router,
    routing::{get, put},
};
use tracing::info;

/// Function to register the user registry routes
pub fn create_router_users() -> Router<Arc<AppState>> {
    info!("Creating users router");
    Router::new()
        .route("/users/", get(list_users).post(create_user))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{user_id}", put(update_user).delete(delete_user))
}
