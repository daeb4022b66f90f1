use crate::services::UserRegistry;

// Application state shared across all routes
#[derive(Debug, Default)]
pub struct AppState {
    pub registry: UserRegistry,
}

impl AppState {
    #[must_use]
    pub const fn new(registry: UserRegistry) -> Self {
        Self { registry }
    }
}
