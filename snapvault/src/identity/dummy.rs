//! Dummy identity provider for development and testing.
//!
//! Keeps accounts and issued tokens in memory and mimics the hosted provider's
//! observable behavior: duplicate signups are rejected, unconfirmed accounts
//! cannot log in unless `autoconfirm` is set, and tokens are opaque strings
//! valid until the process exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::instrument;
use uuid::Uuid;

use super::{
    IdentityError, IdentityProvider, ProviderSession, ProviderUser, Result, SignIn, SignUp,
};
use crate::config::DummyIdentityConfig;

struct Account {
    id: String,
    password: String,
    email_confirmed: bool,
}

#[derive(Default)]
struct State {
    /// email -> account
    accounts: HashMap<String, Account>,
    /// access token -> email
    tokens: HashMap<String, String>,
}

pub struct DummyProvider {
    autoconfirm: bool,
    state: RwLock<State>,
    /// Total number of provider calls made, observable from tests.
    calls: AtomicUsize,
}

impl From<DummyIdentityConfig> for DummyProvider {
    fn from(config: DummyIdentityConfig) -> Self {
        Self {
            autoconfirm: config.autoconfirm,
            state: RwLock::new(State::default()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl DummyProvider {
    pub fn new(autoconfirm: bool) -> Self {
        Self::from(DummyIdentityConfig { autoconfirm })
    }

    /// Number of provider calls made so far (all operations counted).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn issue_session(state: &mut State, email: &str) -> ProviderSession {
        let access_token = format!("dummy-access-{}", Uuid::new_v4());
        state.tokens.insert(access_token.clone(), email.to_string());
        ProviderSession {
            access_token,
            refresh_token: format!("dummy-refresh-{}", Uuid::new_v4()),
            expires_in: Some(3600),
            token_type: Some("bearer".to_string()),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for DummyProvider {
    #[instrument(skip_all, fields(email = %email))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write();
        if state.accounts.contains_key(email) {
            return Err(IdentityError::AlreadyRegistered);
        }

        let account = Account {
            id: Uuid::new_v4().to_string(),
            password: password.to_string(),
            email_confirmed: self.autoconfirm,
        };
        let user = ProviderUser {
            id: account.id.clone(),
            email: email.to_string(),
            email_confirmed: account.email_confirmed,
        };
        state.accounts.insert(email.to_string(), account);

        let session = self
            .autoconfirm
            .then(|| Self::issue_session(&mut state, email));
        Ok(SignUp { user, session })
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write();
        let account = state
            .accounts
            .get(email)
            .ok_or(IdentityError::InvalidCredentials)?;
        if account.password != password {
            return Err(IdentityError::InvalidCredentials);
        }
        if !account.email_confirmed {
            return Err(IdentityError::EmailNotConfirmed);
        }

        let user = ProviderUser {
            id: account.id.clone(),
            email: email.to_string(),
            email_confirmed: true,
        };
        let session = Self::issue_session(&mut state, email);
        Ok(SignIn { user, session })
    }

    #[instrument(skip_all)]
    async fn get_user(&self, access_token: &str) -> Result<ProviderUser> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        let email = state
            .tokens
            .get(access_token)
            .ok_or(IdentityError::Provider {
                status: 401,
                message: "invalid or expired token".to_string(),
            })?;
        let account = state.accounts.get(email).ok_or(IdentityError::Provider {
            status: 401,
            message: "token refers to a deleted account".to_string(),
        })?;

        Ok(ProviderUser {
            id: account.id.clone(),
            email: email.clone(),
            email_confirmed: account.email_confirmed,
        })
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn resend_verification(&self, email: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        if !state.accounts.contains_key(email) {
            return Err(IdentityError::Provider {
                status: 400,
                message: "no account for this email".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_up_then_sign_in_with_autoconfirm() {
        let provider = DummyProvider::new(true);
        let signup = provider.sign_up("a@b.com", "secret").await.unwrap();
        assert!(signup.user.email_confirmed);
        assert!(signup.session.is_some());

        let signin = provider.sign_in("a@b.com", "secret").await.unwrap();
        assert_eq!(signin.user.id, signup.user.id);
        assert!(!signin.session.access_token.is_empty());
    }

    #[tokio::test]
    async fn test_unconfirmed_account_cannot_sign_in() {
        let provider = DummyProvider::new(false);
        let signup = provider.sign_up("a@b.com", "secret").await.unwrap();
        assert!(signup.session.is_none());

        let err = provider.sign_in("a@b.com", "secret").await.unwrap_err();
        assert!(matches!(err, IdentityError::EmailNotConfirmed));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let provider = DummyProvider::new(true);
        provider.sign_up("a@b.com", "secret").await.unwrap();

        let err = provider.sign_in("a@b.com", "wrong").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_rejected() {
        let provider = DummyProvider::new(true);
        provider.sign_up("a@b.com", "secret").await.unwrap();

        let err = provider.sign_up("a@b.com", "other").await.unwrap_err();
        assert!(matches!(err, IdentityError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_get_user_round_trip() {
        let provider = DummyProvider::new(true);
        let signin = {
            provider.sign_up("a@b.com", "secret").await.unwrap();
            provider.sign_in("a@b.com", "secret").await.unwrap()
        };

        let user = provider
            .get_user(&signin.session.access_token)
            .await
            .unwrap();
        assert_eq!(user.email, "a@b.com");

        let err = provider.get_user("not-a-token").await.unwrap_err();
        assert!(matches!(err, IdentityError::Provider { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_call_counter() {
        let provider = DummyProvider::new(true);
        assert_eq!(provider.calls(), 0);
        provider.sign_up("a@b.com", "secret").await.unwrap();
        provider.sign_in("a@b.com", "secret").await.unwrap();
        assert_eq!(provider.calls(), 2);
    }
}
