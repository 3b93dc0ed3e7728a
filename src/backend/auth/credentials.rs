/**
 * Credential Service
 *
 * Registration, login and token verification on top of the relational
 * store. Passwords are bcrypt-hashed on a blocking thread; plaintext
 * passwords and tokens are never logged.
 *
 * # Login failures
 *
 * An unknown email and a wrong password produce the same
 * `NotAuthorized("invalid email or password")`. For an unknown email one
 * bcrypt verification still runs against a dummy hash of the configured
 * cost, so both paths do the same amount of work.
 */

use std::sync::Arc;
use uuid::Uuid;

use crate::backend::auth::sessions::{Claims, Identity, TokenIssuer};
use crate::backend::auth::users::{normalize_email, validate_email, validate_name, validate_password};
use crate::backend::error::BackendError;
use crate::backend::store::{RelationalStore, StoreError, User};

const INVALID_CREDENTIALS: &str = "invalid email or password";

pub struct CredentialService {
    store: Arc<dyn RelationalStore>,
    tokens: TokenIssuer,
    bcrypt_cost: u32,
    dummy_hash: String,
}

impl CredentialService {
    pub fn new(store: Arc<dyn RelationalStore>, tokens: TokenIssuer, bcrypt_cost: u32) -> Result<Self, BackendError> {
        let dummy_hash = bcrypt::hash("collabspace-dummy-password", bcrypt_cost)
            .map_err(|e| BackendError::internal(format!("bcrypt setup failed: {}", e)))?;
        Ok(Self {
            store,
            tokens,
            bcrypt_cost,
            dummy_hash,
        })
    }

    /// Create an account and return it with a fresh token
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(User, String), BackendError> {
        let name = validate_name(name)?;
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;

        let password_hash = hash_password(password.to_string(), self.bcrypt_cost).await?;
        let user = self
            .store
            .create_user(&name, &email, &password_hash)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => BackendError::conflict("Email already registered"),
                other => other.into(),
            })?;

        tracing::info!("[Auth] Registered user {}", user.id);
        let token = self.tokens.issue(&user)?;
        Ok((user, token))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), BackendError> {
        let email = normalize_email(email);
        let user = self.store.get_user_by_email(&email).await?;

        let hash = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let valid = verify_password(password.to_string(), hash).await?;

        match user {
            Some(user) if valid => {
                tracing::info!("[Auth] User {} logged in", user.id);
                let token = self.tokens.issue(&user)?;
                Ok((user, token))
            }
            _ => {
                tracing::debug!("[Auth] Login rejected");
                Err(BackendError::not_authorized(INVALID_CREDENTIALS))
            }
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, BackendError> {
        self.tokens.verify(token)
    }

    /// Verify a token and turn it into an identity
    pub fn authenticate(&self, token: &str) -> Result<Identity, BackendError> {
        Identity::try_from(self.tokens.verify(token)?)
    }

    /// The user behind a token
    pub async fn current_user(&self, token: &str) -> Result<User, BackendError> {
        let identity = self.authenticate(token)?;
        self.user(identity.user_id).await
    }

    /// A user that a valid token referred to; gone users are `NotAuthorized`
    pub async fn user(&self, user_id: Uuid) -> Result<User, BackendError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| BackendError::not_authorized("user no longer exists"))
    }
}

async fn hash_password(password: String, cost: u32) -> Result<String, BackendError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| BackendError::internal(format!("hashing task failed: {}", e)))?
        .map_err(|e| BackendError::internal(format!("password hashing failed: {}", e)))
}

async fn verify_password(password: String, hash: String) -> Result<bool, BackendError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| BackendError::internal(format!("hashing task failed: {}", e)))?
        .map_err(|e| {
            tracing::error!("[Auth] Password verification error: {:?}", e);
            BackendError::internal("password verification failed")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::store::MemoryStore;
    use crate::shared::ErrorKind;
    use std::time::Duration;

    fn service() -> CredentialService {
        let tokens = TokenIssuer::new("test-secret", Duration::from_secs(3600));
        CredentialService::new(Arc::new(MemoryStore::new()), tokens, 4).unwrap()
    }

    #[tokio::test]
    async fn test_register_normalises_email_and_hashes() {
        let service = service();
        let (user, token) = service.register("Alice", " Alice@Example.com ", "secret1").await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_ne!(user.password_hash, "secret1");
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let service = service();
        service.register("Alice", "a@example.com", "secret1").await.unwrap();
        let err = service.register("Other", "A@example.com", "secret2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let service = service();
        service.register("Alice", "a@example.com", "secret1").await.unwrap();

        let wrong_password = service.login("a@example.com", "nope").await.unwrap_err();
        let unknown_email = service.login("b@example.com", "secret1").await.unwrap_err();
        assert_eq!(wrong_password.kind(), ErrorKind::NotAuthorized);
        assert_eq!(wrong_password.message(), unknown_email.message());
        assert_eq!(wrong_password.message(), INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let err = service().register("Alice", "a@example.com", "12345").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
