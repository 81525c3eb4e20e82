use std::sync::{Arc, PoisonError, RwLock};

use kwave_core::Clock;
use kwave_core::model::AuthUser;
use storage::repository::{AuthRecord, AuthTokenRepository};

use crate::error::AuthError;

/// Sign-in state shared by the API client and the app.
///
/// Holds the access token in memory and mirrors it to storage so it survives restarts.
pub struct AuthState {
    repo: Arc<dyn AuthTokenRepository>,
    clock: Clock,
    current: RwLock<Option<AuthRecord>>,
}

impl AuthState {
    /// Creates a signed-out state. Call [`AuthState::init`] to restore a saved sign-in.
    #[must_use]
    pub fn new(repo: Arc<dyn AuthTokenRepository>, clock: Clock) -> Self {
        Self {
            repo,
            clock,
            current: RwLock::new(None),
        }
    }

    /// Loads the persisted token, if any.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the saved state cannot be read.
    pub async fn init(&self) -> Result<Option<AuthUser>, AuthError> {
        let record = self.repo.load_auth().await?;
        let user = record.as_ref().map(|r| r.user.clone());
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = record;
        if let Some(user) = &user {
            tracing::debug!(user_id = %user.id, "restored sign-in");
        }
        Ok(user)
    }

    /// Persists and activates a sign-in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmptyToken` for a blank token and `AuthError::Storage`
    /// if it cannot be saved. The in-memory state is only updated after saving.
    pub async fn login(&self, access_token: &str, user: AuthUser) -> Result<(), AuthError> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        let record = AuthRecord {
            access_token: access_token.to_owned(),
            user,
            saved_at: self.clock.now(),
        };
        self.repo.save_auth(&record).await?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(record);
        Ok(())
    }

    /// Clears the sign-in from memory and storage.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the saved state cannot be removed. Memory is cleared regardless.
    pub async fn logout(&self) -> Result<(), AuthError> {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.repo.clear_auth().await?;
        Ok(())
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.read(|r| r.access_token.clone())
    }

    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.read(|r| r.user.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read(|_| ()).is_some()
    }

    fn read<T>(&self, f: impl FnOnce(&AuthRecord) -> T) -> Option<T> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwave_core::model::{Role, UserId};
    use kwave_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn user() -> AuthUser {
        AuthUser {
            id: UserId::new(7),
            name: "Jisoo".into(),
            role: Role::Student,
        }
    }

    #[tokio::test]
    async fn login_persists_and_init_restores() {
        let repo = Arc::new(InMemoryRepository::new());
        let auth = AuthState::new(repo.clone(), fixed_clock());
        assert!(!auth.is_authenticated());

        auth.login(" token-1 ", user()).await.unwrap();
        assert_eq!(auth.token().as_deref(), Some("token-1"));

        let restored = AuthState::new(repo, fixed_clock());
        assert_eq!(restored.init().await.unwrap(), Some(user()));
        assert_eq!(restored.token().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn logout_clears_memory_and_storage() {
        let repo = Arc::new(InMemoryRepository::new());
        let auth = AuthState::new(repo.clone(), fixed_clock());
        auth.login("token-1", user()).await.unwrap();

        auth.logout().await.unwrap();
        assert!(auth.token().is_none());
        assert!(auth.user().is_none());
        assert!(repo.load_auth().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_token_is_rejected() {
        let auth = AuthState::new(Arc::new(InMemoryRepository::new()), fixed_clock());
        assert!(matches!(
            auth.login("   ", user()).await,
            Err(AuthError::EmptyToken)
        ));
        assert!(!auth.is_authenticated());
    }
}
