/// In-memory user storage
pub mod user_registry;

pub use user_registry::{RegistryError, UserRegistry};
