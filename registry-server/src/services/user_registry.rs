//! In-memory user registry guarded by a single lock.

use indexmap::IndexMap;
use shared::{
    config::server::{IdStrategy, RegistryConfig},
    models::{UpdateUserRequest, User, UserId, UserRecord},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Business rule failures raised by [`UserRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Email already exists")]
    DuplicateEmail,
    #[error("User not found")]
    NotFound(UserId),
    #[error("user id space exhausted")]
    IdSpaceExhausted,
}

#[derive(Debug)]
struct RegistryTable {
    users: IndexMap<UserId, UserRecord>,
    next_id: UserId,
}

impl RegistryTable {
    fn new() -> Self {
        Self {
            users: IndexMap::new(),
            next_id: 1,
        }
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .iter()
            .any(|(id, record)| Some(*id) != except && record.email == email)
    }

    fn assign_id(&mut self, strategy: IdStrategy) -> Result<UserId, RegistryError> {
        match strategy {
            IdStrategy::Monotonic => {
                let id = self.next_id;
                self.next_id = id.checked_add(1).ok_or(RegistryError::IdSpaceExhausted)?;
                Ok(id)
            }
            IdStrategy::LiveCount => UserId::try_from(self.users.len())
                .ok()
                .and_then(|count| count.checked_add(1))
                .ok_or(RegistryError::IdSpaceExhausted),
        }
    }
}

/// The process-wide user table and the four operations over it.
///
/// Every operation holds the lock for its whole duration, so the uniqueness
/// scan and the insert in [`UserRegistry::create`] cannot interleave with
/// another request.
#[derive(Debug)]
pub struct UserRegistry {
    table: Mutex<RegistryTable>,
    id_strategy: IdStrategy,
    unique_email_on_update: bool,
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl UserRegistry {
    #[must_use]
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            table: Mutex::new(RegistryTable::new()),
            id_strategy: config.id_strategy,
            unique_email_on_update: config.unique_email_on_update,
        }
    }

    #[must_use]
    pub const fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Inserts a new user and returns its id.
    ///
    /// # Errors
    /// [`RegistryError::DuplicateEmail`] when another record already uses
    /// the email; the table is left untouched.
    pub async fn create(&self, record: UserRecord) -> Result<UserId, RegistryError> {
        let mut table = self.table.lock().await;

        if table.email_taken(&record.email, None) {
            record_operation("create", "duplicate_email");
            return Err(RegistryError::DuplicateEmail);
        }

        let id = table.assign_id(self.id_strategy)?;
        if let Some(previous) = table.users.insert(id, record) {
            warn!(
                user_id = id,
                overwritten_email = %previous.email,
                "live-count id collided with an existing user; record overwritten"
            );
        }

        record_operation("create", "ok");
        record_size(table.users.len());
        Ok(id)
    }

    /// Returns users in insertion order, truncated to `limit` when given.
    pub async fn list(&self, limit: Option<usize>) -> Vec<User> {
        let table = self.table.lock().await;
        let take = limit.unwrap_or(usize::MAX);

        let users: Vec<User> = table
            .users
            .iter()
            .take(take)
            .map(|(id, record)| User::from_record(*id, record))
            .collect();

        debug!(returned = users.len(), total = table.users.len(), "listed users");
        record_operation("list", "ok");
        users
    }

    /// Merges the supplied fields into an existing user.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] when `id` is absent, or
    /// [`RegistryError::DuplicateEmail`] when uniqueness on update is enabled
    /// and another user already has the new email.
    pub async fn update(&self, id: UserId, changes: UpdateUserRequest) -> Result<(), RegistryError> {
        let mut table = self.table.lock().await;

        if !table.users.contains_key(&id) {
            record_operation("update", "not_found");
            return Err(RegistryError::NotFound(id));
        }

        if self.unique_email_on_update {
            if let Some(email) = changes.email.as_deref() {
                if table.email_taken(email, Some(id)) {
                    record_operation("update", "duplicate_email");
                    return Err(RegistryError::DuplicateEmail);
                }
            }
        }

        let record = table
            .users
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?;
        changes.apply_to(record);

        record_operation("update", "ok");
        Ok(())
    }

    /// Removes a user and returns the removed record.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] when `id` is absent.
    pub async fn delete(&self, id: UserId) -> Result<UserRecord, RegistryError> {
        let mut table = self.table.lock().await;

        match table.users.shift_remove(&id) {
            Some(removed) => {
                record_operation("delete", "ok");
                record_size(table.users.len());
                Ok(removed)
            }
            None => {
                record_operation("delete", "not_found");
                Err(RegistryError::NotFound(id))
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.users.is_empty()
    }
}

fn record_operation(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "registry_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

#[allow(clippy::cast_precision_loss)]
fn record_size(size: usize) {
    metrics::gauge!("registry_users").set(size as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(username: &str, email: &str, password: &str) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn registry_with(strategy: IdStrategy) -> UserRegistry {
        UserRegistry::new(&RegistryConfig {
            id_strategy: strategy,
            unique_email_on_update: false,
        })
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let registry = UserRegistry::default();
        assert_eq!(registry.create(record("alice", "a@x.com", "secret1")).await, Ok(1));
        assert_eq!(registry.create(record("bob", "b@x.com", "secret2")).await, Ok(2));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email_without_mutation() {
        let registry = UserRegistry::default();
        registry.create(record("alice", "a@x.com", "secret1")).await.unwrap();

        let result = registry.create(record("eve", "a@x.com", "secret3")).await;
        assert_eq!(result, Err(RegistryError::DuplicateEmail));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.list(None).await[0].username, "alice");
    }

    #[tokio::test]
    async fn email_comparison_is_exact() {
        let registry = UserRegistry::default();
        registry.create(record("alice", "a@x.com", "secret1")).await.unwrap();
        assert!(registry.create(record("alice2", "A@x.com", "secret1")).await.is_ok());
    }

    #[tokio::test]
    async fn list_empty_registry_returns_nothing() {
        let registry = UserRegistry::default();
        assert!(registry.list(None).await.is_empty());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn list_truncates_to_limit_in_insertion_order() {
        let registry = UserRegistry::default();
        for n in 1..=5 {
            registry
                .create(record(&format!("user{n}"), &format!("u{n}@x.com"), "secret"))
                .await
                .unwrap();
        }

        let users = registry.list(Some(2)).await;
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, 1);
        assert_eq!(users[1].id, 2);
        assert_eq!(registry.list(Some(50)).await.len(), 5);
    }

    #[tokio::test]
    async fn update_missing_id_fails_and_leaves_registry_unchanged() {
        let registry = UserRegistry::default();
        registry.create(record("alice", "a@x.com", "secret1")).await.unwrap();
        let before = registry.list(None).await;

        let result = registry
            .update(
                42,
                UpdateUserRequest {
                    username: Some("ghost".to_string()),
                    ..UpdateUserRequest::default()
                },
            )
            .await;

        assert_eq!(result, Err(RegistryError::NotFound(42)));
        assert_eq!(registry.list(None).await, before);
    }

    #[tokio::test]
    async fn update_email_only_keeps_other_fields() {
        let registry = UserRegistry::default();
        let id = registry.create(record("bob", "b@x.com", "secret2")).await.unwrap();

        registry
            .update(
                id,
                UpdateUserRequest {
                    email: Some("new@x.com".to_string()),
                    ..UpdateUserRequest::default()
                },
            )
            .await
            .unwrap();

        let users = registry.list(None).await;
        assert_eq!(users[0].username, "bob");
        assert_eq!(users[0].email, "new@x.com");
        assert_eq!(users[0].password, "secret2");
    }

    #[tokio::test]
    async fn update_allows_duplicate_email_by_default() {
        let registry = UserRegistry::default();
        registry.create(record("alice", "a@x.com", "secret1")).await.unwrap();
        let bob = registry.create(record("bob", "b@x.com", "secret2")).await.unwrap();

        let changes = UpdateUserRequest {
            email: Some("a@x.com".to_string()),
            ..UpdateUserRequest::default()
        };
        assert!(registry.update(bob, changes).await.is_ok());
    }

    #[tokio::test]
    async fn update_rejects_duplicate_email_when_enabled() {
        let registry = UserRegistry::new(&RegistryConfig {
            id_strategy: IdStrategy::Monotonic,
            unique_email_on_update: true,
        });
        registry.create(record("alice", "a@x.com", "secret1")).await.unwrap();
        let bob = registry.create(record("bob", "b@x.com", "secret2")).await.unwrap();

        let clash = UpdateUserRequest {
            email: Some("a@x.com".to_string()),
            ..UpdateUserRequest::default()
        };
        assert_eq!(
            registry.update(bob, clash).await,
            Err(RegistryError::DuplicateEmail)
        );

        let own_email = UpdateUserRequest {
            email: Some("b@x.com".to_string()),
            ..UpdateUserRequest::default()
        };
        assert!(registry.update(bob, own_email).await.is_ok());
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found_the_second_time() {
        let registry = UserRegistry::default();
        let id = registry.create(record("alice", "a@x.com", "secret1")).await.unwrap();

        let removed = registry.delete(id).await.unwrap();
        assert_eq!(removed.email, "a@x.com");
        assert_eq!(registry.delete(id).await, Err(RegistryError::NotFound(id)));
    }

    #[tokio::test]
    async fn delete_preserves_order_of_remaining_users() {
        let registry = UserRegistry::default();
        for n in 1..=3 {
            registry
                .create(record(&format!("user{n}"), &format!("u{n}@x.com"), "secret"))
                .await
                .unwrap();
        }
        registry.delete(1).await.unwrap();

        let ids: Vec<UserId> = registry.list(None).await.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn monotonic_ids_are_never_reissued() {
        let registry = registry_with(IdStrategy::Monotonic);
        for n in 1..=3 {
            registry
                .create(record(&format!("user{n}"), &format!("u{n}@x.com"), "secret"))
                .await
                .unwrap();
        }
        registry.delete(1).await.unwrap();

        let id = registry.create(record("dave", "d@x.com", "secret")).await.unwrap();
        assert_eq!(id, 4);
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn live_count_ids_overwrite_after_deletion() {
        let registry = registry_with(IdStrategy::LiveCount);
        assert_eq!(registry.id_strategy(), IdStrategy::LiveCount);
        for n in 1..=3 {
            registry
                .create(record(&format!("user{n}"), &format!("u{n}@x.com"), "secret"))
                .await
                .unwrap();
        }
        registry.delete(1).await.unwrap();

        let id = registry.create(record("dave", "d@x.com", "secret")).await.unwrap();
        assert_eq!(id, 3);

        let users = registry.list(None).await;
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "user2");
        assert_eq!(users[1].id, 3);
        assert_eq!(users[1].username, "dave");
    }

    #[tokio::test]
    async fn concurrent_creates_with_same_email_admit_exactly_one() {
        let registry = Arc::new(UserRegistry::default());

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .create(record(&format!("user{n}"), "same@x.com", "secret"))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_creates_with_distinct_emails_get_distinct_ids() {
        let registry = Arc::new(UserRegistry::default());

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .create(record(&format!("user{n}"), &format!("u{n}@x.com"), "secret"))
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids.len(), 16);
        assert_eq!(registry.len().await, 16);
    }
}
