//! In-memory repositories.
//!
//! Backs the test suites and the server's `--in-memory` mode. One
//! [`InMemoryStore`] implements every repository trait; clone the `Arc` into
//! each slot of [`Repositories`](crate::auth::Repositories).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::repository::{
    DirectoryRepository, TokenRepository, UserRepository, VerificationCodeRepository, Visibility,
};
use crate::auth::{
    AccessTokenRecord, AuthError, AuthResult, NewUser, NotificationPreferences,
    NotificationTokenRecord, Plan, PlanId, RefreshTokenRecord, Repositories, Role, RoleId, User,
    UserId, VerificationCode,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    roles: Vec<Role>,
    plans: Vec<Plan>,
    codes: HashMap<i64, VerificationCode>,
    access_tokens: HashMap<String, AccessTokenRecord>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    notification_tokens: HashMap<String, NotificationTokenRecord>,
    next_user_id: i64,
    next_code_id: i64,
}

/// Process-local store for all auth records
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Empty store without roles or plans
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with the default roles (`user`, `admin`) and plans
    /// (`free`, `standard`, `unlimited`)
    pub fn seeded() -> Self {
        let store = Self::new();
        store.add_role("user", 1);
        store.add_role("admin", 100);
        store.add_plan("free");
        store.add_plan("standard");
        store.add_plan("unlimited");
        store
    }

    pub fn add_role(&self, name: &str, priority: i32) -> Role {
        let mut state = self.lock();
        let role = Role {
            id: state.roles.len() as RoleId + 1,
            name: name.to_string(),
            priority,
        };
        state.roles.push(role.clone());
        role
    }

    pub fn add_plan(&self, name: &str) -> Plan {
        let mut state = self.lock();
        let plan = Plan {
            id: state.plans.len() as PlanId + 1,
            name: name.to_string(),
        };
        state.plans.push(plan.clone());
        plan
    }

    /// Number of stored refresh tokens
    pub fn refresh_token_count(&self) -> usize {
        self.lock().refresh_tokens.len()
    }

    /// Number of stored verification codes
    pub fn verification_code_count(&self) -> usize {
        self.lock().codes.len()
    }

    /// Bundle this store into every repository slot
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            users: self.clone(),
            directory: self.clone(),
            codes: self.clone(),
            tokens: self.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-update; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn pick_live_first<'a>(mut candidates: Vec<&'a User>) -> Option<&'a User> {
    candidates.sort_by_key(|u| (u.is_deleted, std::cmp::Reverse(u.id)));
    candidates.into_iter().next()
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create(&self, user: NewUser) -> AuthResult<User> {
        let mut state = self.lock();
        if state
            .users
            .values()
            .any(|u| !u.is_deleted && u.email == user.email)
        {
            return Err(AuthError::EmailTaken);
        }

        state.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: state.next_user_id,
            email: user.email,
            password_hash: user.password_hash,
            social_id: user.social_id,
            first_name: user.first_name,
            last_name: user.last_name,
            role_ids: user.role_ids,
            plan_id: user.plan_id,
            is_verified: user.is_verified,
            is_deleted: false,
            is_root: false,
            just_registered: true,
            notification_preferences: NotificationPreferences::default(),
            reset_password_code: None,
            reset_password_expires: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str, visibility: Visibility) -> AuthResult<Option<User>> {
        let state = self.lock();
        let candidates = state
            .users
            .values()
            .filter(|u| u.email == email && visibility.admits(u))
            .collect();
        Ok(pick_live_first(candidates).cloned())
    }

    async fn find_by_id(&self, id: UserId, visibility: Visibility) -> AuthResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .get(&id)
            .filter(|u| visibility.admits(u))
            .cloned())
    }

    async fn find_by_reset_code(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>> {
        let state = self.lock();
        Ok(state
            .users
            .values()
            .find(|u| {
                Visibility::DEFAULT.admits(u)
                    && u.email == email
                    && u.reset_password_code.as_deref() == Some(code)
                    && u.reset_password_expires.is_some_and(|exp| exp > now)
            })
            .cloned())
    }

    async fn update(&self, user: &User) -> AuthResult<User> {
        let mut state = self.lock();
        let stored = state.users.get_mut(&user.id).ok_or(AuthError::UserNotFound)?;
        *stored = User {
            updated_at: Utc::now(),
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn soft_delete(&self, id: UserId) -> AuthResult<()> {
        if let Some(user) = self.lock().users.get_mut(&id) {
            user.is_deleted = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn purge(&self, id: UserId) -> AuthResult<()> {
        let mut state = self.lock();
        state.users.remove(&id);
        state.codes.retain(|_, c| c.user_id != id);
        state.access_tokens.retain(|_, t| t.user_id != id);
        state.refresh_tokens.retain(|_, t| t.user_id != id);
        state.notification_tokens.retain(|_, t| t.user_id != id);
        Ok(())
    }

    async fn ping(&self) -> AuthResult<()> {
        Ok(())
    }
}

#[async_trait]
impl DirectoryRepository for InMemoryStore {
    async fn find_role(&self, name: &str) -> AuthResult<Option<Role>> {
        Ok(self.lock().roles.iter().find(|r| r.name == name).cloned())
    }

    async fn find_plan(&self, name: &str) -> AuthResult<Option<Plan>> {
        Ok(self.lock().plans.iter().find(|p| p.name == name).cloned())
    }

    async fn roles_by_ids(&self, ids: &[RoleId]) -> AuthResult<Vec<Role>> {
        Ok(self
            .lock()
            .roles
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect())
    }

    async fn plan_by_id(&self, id: PlanId) -> AuthResult<Option<Plan>> {
        Ok(self.lock().plans.iter().find(|p| p.id == id).cloned())
    }
}

#[async_trait]
impl VerificationCodeRepository for InMemoryStore {
    async fn replace_for_user(
        &self,
        user_id: UserId,
        code: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<VerificationCode> {
        let mut state = self.lock();
        state.codes.retain(|_, c| c.user_id != user_id);
        state.next_code_id += 1;
        let record = VerificationCode {
            id: state.next_code_id,
            user_id,
            code: code.to_string(),
            created_at,
            expires_at,
        };
        state.codes.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_code(&self, code: &str) -> AuthResult<Option<VerificationCode>> {
        Ok(self
            .lock()
            .codes
            .values()
            .filter(|c| c.code == code)
            .max_by_key(|c| c.id)
            .cloned())
    }

    async fn delete(&self, id: i64) -> AuthResult<()> {
        self.lock().codes.remove(&id);
        Ok(())
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.lock();
        let len = state.codes.len();
        state.codes.retain(|_, c| c.expires_at >= before);
        Ok((len - state.codes.len()) as u64)
    }
}

#[async_trait]
impl TokenRepository for InMemoryStore {
    async fn save_access(&self, record: &AccessTokenRecord) -> AuthResult<()> {
        self.lock()
            .access_tokens
            .insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn find_access(&self, token: &str) -> AuthResult<Option<AccessTokenRecord>> {
        Ok(self.lock().access_tokens.get(token).cloned())
    }

    async fn revoke_access_for_user(&self, user_id: UserId) -> AuthResult<u64> {
        let mut state = self.lock();
        let mut count = 0;
        for record in state.access_tokens.values_mut() {
            if record.user_id == user_id && !record.is_revoked {
                record.is_revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn save_refresh(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        self.lock()
            .refresh_tokens
            .insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn find_refresh(&self, token: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.lock().refresh_tokens.get(token).cloned())
    }

    async fn delete_refresh(&self, token: &str) -> AuthResult<()> {
        self.lock().refresh_tokens.remove(token);
        Ok(())
    }

    async fn delete_refresh_for_user(&self, user_id: UserId) -> AuthResult<u64> {
        let mut state = self.lock();
        let len = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok((len - state.refresh_tokens.len()) as u64)
    }

    async fn save_notification(&self, record: &NotificationTokenRecord) -> AuthResult<()> {
        self.lock()
            .notification_tokens
            .insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn find_notification(&self, token: &str) -> AuthResult<Option<NotificationTokenRecord>> {
        Ok(self.lock().notification_tokens.get(token).cloned())
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.lock();
        let len = state.access_tokens.len()
            + state.refresh_tokens.len()
            + state.notification_tokens.len();
        state.access_tokens.retain(|_, t| t.expires_at >= before);
        state.refresh_tokens.retain(|_, t| t.expires_at >= before);
        state.notification_tokens.retain(|_, t| t.expires_at >= before);
        let remaining = state.access_tokens.len()
            + state.refresh_tokens.len()
            + state.notification_tokens.len();
        Ok((len - remaining) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(email: &str, verified: bool) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: Some("hash".to_string()),
            social_id: None,
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role_ids: vec![1],
            plan_id: Some(1),
            is_verified: verified,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = InMemoryStore::seeded();
        let first = store.create(new_user("a@x.com", false)).await.unwrap();
        let second = store.create(new_user("b@x.com", false)).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(first.just_registered);
    }

    #[tokio::test]
    async fn test_email_unique_among_live_users() {
        let store = InMemoryStore::seeded();
        let user = store.create(new_user("a@x.com", true)).await.unwrap();
        assert!(matches!(
            store.create(new_user("a@x.com", true)).await,
            Err(AuthError::EmailTaken)
        ));

        store.soft_delete(user.id).await.unwrap();
        let reborn = store.create(new_user("a@x.com", true)).await.unwrap();

        let found = store.find_by_email("a@x.com", Visibility::ALL).await.unwrap().unwrap();
        assert_eq!(found.id, reborn.id, "live record wins over deleted one");
    }

    #[tokio::test]
    async fn test_visibility_filters() {
        let store = InMemoryStore::seeded();
        let pending = store.create(new_user("p@x.com", false)).await.unwrap();
        let deleted = store.create(new_user("d@x.com", true)).await.unwrap();
        store.soft_delete(deleted.id).await.unwrap();

        assert!(store.find_by_email("p@x.com", Visibility::DEFAULT).await.unwrap().is_none());
        assert!(store.find_by_email("p@x.com", Visibility::UNVERIFIED).await.unwrap().is_some());
        assert!(store.find_by_id(deleted.id, Visibility::UNVERIFIED).await.unwrap().is_none());
        assert!(store.find_by_id(deleted.id, Visibility::ALL).await.unwrap().is_some());
        assert!(store.find_by_id(pending.id, Visibility::ALL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_for_user_drops_previous_codes() {
        let store = InMemoryStore::seeded();
        let now = Utc::now();
        let first = store.replace_for_user(7, "111111", now, now + Duration::hours(1)).await.unwrap();
        store.replace_for_user(7, "222222", now, now + Duration::hours(1)).await.unwrap();

        assert!(store.find_by_code(&first.code).await.unwrap().is_none());
        assert!(store.find_by_code("222222").await.unwrap().is_some());
        assert_eq!(store.verification_code_count(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired_tokens() {
        let store = InMemoryStore::seeded();
        let now = Utc::now();
        store
            .save_refresh(&RefreshTokenRecord {
                token: "old".to_string(),
                user_id: 1,
                created_at: now - Duration::days(8),
                expires_at: now - Duration::days(1),
            })
            .await
            .unwrap();
        store
            .save_refresh(&RefreshTokenRecord {
                token: "fresh".to_string(),
                user_id: 1,
                created_at: now,
                expires_at: now + Duration::days(7),
            })
            .await
            .unwrap();

        let purged = TokenRepository::purge_expired(&store, now).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.find_refresh("fresh").await.unwrap().is_some());
        assert!(store.find_refresh("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_user_keeps_others() {
        let store = InMemoryStore::seeded();
        let a = store.create(new_user("a@x.com", true)).await.unwrap();
        let b = store.create(new_user("b@x.com", true)).await.unwrap();
        store.purge(a.id).await.unwrap();
        assert!(store.find_by_id(a.id, Visibility::ALL).await.unwrap().is_none());
        assert!(store.find_by_id(b.id, Visibility::ALL).await.unwrap().is_some());
    }
}
