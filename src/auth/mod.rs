pub mod gate;
pub mod local;
pub mod messages;
pub mod remote;

use crate::auth::local::LocalIdentity;
use crate::auth::remote::RemoteIdentity;
use crate::config::{Config, IdentityBackendKind};
use crate::db::ProfileRow;
use crate::model::Role;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const MIN_PASSWORD_LENGTH: usize = 6;
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub metadata: UserMetadata,
}

impl AuthUser {
    pub fn to_profile(&self) -> ProfileRow {
        let full_name = if self.metadata.full_name.trim().is_empty() {
            self.email.clone()
        } else {
            self.metadata.full_name.trim().to_string()
        };

        ProfileRow {
            id: self.id.clone(),
            email: self.email.clone(),
            full_name,
            role: self.metadata.role,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub access_token: String,
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignUpOutcome {
    ConfirmationRequired { user: AuthUser },
    SignedIn { session: Session },
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub user: AuthUser,
    pub confirmation_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedUp { user_id: String },
    SignedIn { user_id: String },
    SignedOut,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("User already registered")]
    AlreadyRegistered,

    #[error("{0}")]
    Rejected(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Errors that mean "no valid user" rather than "could not find out".
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidSession | AuthError::InvalidCredentials
        )
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[derive(Clone)]
enum Backend {
    Local(LocalIdentity),
    Remote(RemoteIdentity),
}

#[derive(Clone)]
pub struct Identity {
    backend: Backend,
    events: broadcast::Sender<AuthEvent>,
}

impl Identity {
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = match config.identity_provider {
            IdentityBackendKind::Local => Backend::Local(LocalIdentity::new(
                config.db_path.clone(),
                config.require_email_confirmation,
                config.session_ttl_hours,
                config.password_iterations,
            )),
            IdentityBackendKind::Remote => Backend::Remote(RemoteIdentity::new(
                &config.auth_base_url,
                config.resolved_auth_api_key().as_deref(),
                config.auth_timeout_seconds,
            )?),
        };

        Ok(Self::with_backend(backend))
    }

    pub fn local(local: LocalIdentity) -> Self {
        Self::with_backend(Backend::Local(local))
    }

    fn with_backend(backend: Backend) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { backend, events }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Local(_) => "local",
            Backend::Remote(_) => "remote",
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> AuthResult<SignUpOutcome> {
        let email = normalize_email(email);
        validate_credentials(&email, password)?;
        if metadata.full_name.trim().is_empty() {
            return Err(AuthError::Rejected("Full name is required".to_string()));
        }

        let outcome = match &self.backend {
            Backend::Local(local) => local.sign_up(&email, password, &metadata)?,
            Backend::Remote(remote) => remote.sign_up(&email, password, &metadata).await?,
        };

        let user_id = match &outcome {
            SignUpOutcome::ConfirmationRequired { user } => user.id.clone(),
            SignUpOutcome::SignedIn { session } => session.user.id.clone(),
        };
        self.emit(AuthEvent::SignedUp { user_id });

        Ok(outcome)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> AuthResult<Registration> {
        let email = normalize_email(email);
        validate_credentials(&email, password)?;
        if metadata.full_name.trim().is_empty() {
            return Err(AuthError::Rejected("Full name is required".to_string()));
        }

        let registration = match &self.backend {
            Backend::Local(local) => local.register(&email, password, &metadata)?,
            Backend::Remote(remote) => match remote.sign_up(&email, password, &metadata).await? {
                SignUpOutcome::ConfirmationRequired { user } => Registration {
                    user,
                    confirmation_required: true,
                },
                SignUpOutcome::SignedIn { session } => {
                    if let Err(error) = remote.sign_out(&session.access_token).await {
                        warn!(user_id = %session.user.id, error = %error, "failed to revoke sign-up session");
                    }
                    Registration {
                        user: session.user,
                        confirmation_required: false,
                    }
                }
            },
        };
        self.emit(AuthEvent::SignedUp {
            user_id: registration.user.id.clone(),
        });

        Ok(registration)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let session = match &self.backend {
            Backend::Local(local) => local.sign_in(&email, password)?,
            Backend::Remote(remote) => remote.sign_in(&email, password).await?,
        };
        self.emit(AuthEvent::SignedIn {
            user_id: session.user.id.clone(),
        });

        Ok(session)
    }

    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        match &self.backend {
            Backend::Local(local) => local.sign_out(access_token)?,
            Backend::Remote(remote) => remote.sign_out(access_token).await?,
        }
        self.emit(AuthEvent::SignedOut);

        Ok(())
    }

    pub async fn resend_confirmation(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::Rejected(
                "Unable to validate email address: invalid format".to_string(),
            ));
        }

        match &self.backend {
            Backend::Local(local) => local.resend_confirmation(&email),
            Backend::Remote(remote) => remote.resend_confirmation(&email).await,
        }
    }

    pub async fn get_user(&self, access_token: &str) -> AuthResult<AuthUser> {
        if access_token.trim().is_empty() {
            return Err(AuthError::InvalidSession);
        }

        match &self.backend {
            Backend::Local(local) => local.get_user(access_token),
            Backend::Remote(remote) => remote.get_user(access_token).await,
        }
    }

    pub async fn confirm_email(&self, token: &str) -> AuthResult<AuthUser> {
        match &self.backend {
            Backend::Local(local) => local.confirm_email(token),
            Backend::Remote(_) => Err(AuthError::Rejected(
                "Email confirmation is handled by the hosted identity provider".to_string(),
            )),
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    Regex::new(EMAIL_PATTERN)
        .map(|pattern| pattern.is_match(email))
        .unwrap_or(false)
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if !is_valid_email(email) {
        return Err(AuthError::Rejected(
            "Unable to validate email address: invalid format".to_string(),
        ));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Rejected(format!(
            "Password should be at least {MIN_PASSWORD_LENGTH} characters."
        )));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::local::LocalIdentity;
    use super::{AuthError, AuthEvent, Identity, SignUpOutcome, UserMetadata, is_valid_email};
    use crate::model::Role;
    use std::path::Path;

    pub(crate) fn local_identity(db_path: &Path, require_confirmation: bool) -> Identity {
        Identity::local(LocalIdentity::new(
            db_path.to_path_buf(),
            require_confirmation,
            12,
            1_000,
        ))
    }

    pub(crate) fn metadata(name: &str, role: Role) -> UserMetadata {
        UserMetadata {
            full_name: name.to_string(),
            role,
        }
    }

    #[test]
    fn email_syntax_check() {
        assert!(is_valid_email("agent@company.com"));
        assert!(!is_valid_email("agent@company"));
        assert!(!is_valid_email("not an email"));
    }

    #[tokio::test]
    async fn sign_up_validates_before_reaching_backend() {
        let dir = tempfile::tempdir().expect("temp dir");
        let identity = local_identity(&dir.path().join("auth.db"), false);

        let short = identity
            .sign_up("a@b.co", "123", metadata("Ann", Role::Agent))
            .await;
        assert!(matches!(short, Err(AuthError::Rejected(_))));

        let nameless = identity
            .sign_up("a@b.co", "secret-pass", metadata("  ", Role::Agent))
            .await;
        assert!(matches!(nameless, Err(AuthError::Rejected(_))));
    }

    #[tokio::test]
    async fn register_announces_sign_up_without_signing_in() {
        let dir = tempfile::tempdir().expect("temp dir");
        let identity = local_identity(&dir.path().join("auth.db"), false);
        let mut events = identity.subscribe();

        let registration = identity
            .register(" Lead@Example.com", "secret-pass", metadata("Lead", Role::Admin))
            .await
            .expect("register");
        assert_eq!(registration.user.email, "lead@example.com");

        assert_eq!(
            events.recv().await.expect("event"),
            AuthEvent::SignedUp {
                user_id: registration.user.id
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn auth_events_are_broadcast() {
        let dir = tempfile::tempdir().expect("temp dir");
        let identity = local_identity(&dir.path().join("auth.db"), false);
        let mut events = identity.subscribe();

        let outcome = identity
            .sign_up("Ann@Example.com ", "secret-pass", metadata("Ann", Role::Agent))
            .await
            .expect("sign up");
        let user_id = match outcome {
            SignUpOutcome::SignedIn { session } => session.user.id,
            SignUpOutcome::ConfirmationRequired { .. } => panic!("confirmation not required"),
        };

        let session = identity
            .sign_in("ann@example.com", "secret-pass")
            .await
            .expect("sign in");
        identity
            .sign_out(&session.access_token)
            .await
            .expect("sign out");

        assert_eq!(
            events.recv().await.expect("event"),
            AuthEvent::SignedUp {
                user_id: user_id.clone()
            }
        );
        assert_eq!(
            events.recv().await.expect("event"),
            AuthEvent::SignedIn { user_id }
        );
        assert_eq!(events.recv().await.expect("event"), AuthEvent::SignedOut);
    }
}
