//! crates/classroom_agent_core/src/profile.rs
//!
//! Cached profile lookups for the signed-in user, and the sign-out reset.

use crate::cache::ContextCache;
use crate::domain::{ContextSnapshot, User};
use crate::ports::{ClassroomStore, PortResult};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub fn profile_key(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

pub struct ProfileService {
    store: Arc<dyn ClassroomStore>,
    profiles: ContextCache<User>,
    contexts: Arc<ContextCache<ContextSnapshot>>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ClassroomStore>, contexts: Arc<ContextCache<ContextSnapshot>>) -> Self {
        Self {
            store,
            profiles: ContextCache::new(),
            contexts,
        }
    }

    /// Concurrent lookups of the same user share one store read.
    pub async fn profile(&self, user_id: Uuid) -> PortResult<User> {
        let store = self.store.clone();
        self.profiles
            .get_or_fetch(&profile_key(user_id), move || async move {
                store.get_user(user_id).await
            })
            .await
    }

    pub fn invalidate(&self, user_id: Uuid) {
        self.profiles.invalidate(&profile_key(user_id));
    }

    /// Drops every cached profile and course context, for all users, so that nothing
    /// cached under the departing session's credentials outlives it.
    pub fn sign_out(&self) {
        self.profiles.invalidate_all();
        self.contexts.invalidate_all();
        info!("Profile and context caches cleared.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntryState;
    use crate::domain::{CourseContext, Role};
    use chrono::Utc;
    use crate::memory::InMemoryStore;
    use crate::ports::PortError;

    fn seeded() -> (Arc<InMemoryStore>, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let user_id = Uuid::new_v4();
        store.insert_user(User {
            id: user_id,
            role: Role::Teacher,
            display_name: "Ada".to_string(),
            email: None,
        });
        (store, user_id)
    }

    #[tokio::test]
    async fn profile_is_cached_under_user_key() {
        let (store, user_id) = seeded();
        let contexts = Arc::new(ContextCache::new());
        let profiles = ProfileService::new(store, contexts);

        let user = profiles.profile(user_id).await.unwrap();
        assert_eq!(user.display_name, "Ada");
        assert_eq!(
            profiles.profiles.state(&profile_key(user_id)),
            EntryState::Populated
        );

        profiles.invalidate(user_id);
        assert_eq!(profiles.profiles.state(&profile_key(user_id)), EntryState::Empty);
    }

    #[tokio::test]
    async fn missing_user_is_not_cached() {
        let (store, _) = seeded();
        let profiles = ProfileService::new(store, Arc::new(ContextCache::new()));
        let stranger = Uuid::new_v4();

        let err = profiles.profile(stranger).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        assert_eq!(profiles.profiles.state(&profile_key(stranger)), EntryState::Empty);
    }

    #[tokio::test]
    async fn sign_out_clears_profiles_and_contexts() {
        let (store, user_id) = seeded();
        let contexts: Arc<ContextCache<ContextSnapshot>> = Arc::new(ContextCache::new());
        let profiles = ProfileService::new(store, contexts.clone());
        profiles.profile(user_id).await.unwrap();

        let course_id = Uuid::new_v4();
        let course_key = format!("context:broadcast:{}", course_id);
        contexts
            .get_or_fetch(&course_key, move || async move {
                Ok(ContextSnapshot {
                    student: None,
                    course: CourseContext {
                        id: course_id,
                        title: "CS101".to_string(),
                        description: None,
                        assignments: Vec::new(),
                    },
                    built_at: Utc::now(),
                })
            })
            .await
            .unwrap();
        assert_eq!(contexts.state(&course_key), EntryState::Populated);

        profiles.sign_out();
        assert_eq!(profiles.profiles.state(&profile_key(user_id)), EntryState::Empty);
        assert_eq!(contexts.state(&course_key), EntryState::Empty);
    }
}
