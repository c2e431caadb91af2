use crate::auth::{
    AuthError, AuthResult, AuthUser, Registration, Session, SignUpOutcome, UserMetadata,
};
use crate::db::Database;
use crate::db::credentials::{LocalUserRow, NewLocalUser};
use chrono::{Duration, Utc};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

const HASH_SCHEME: &str = "pbkdf2_sha256";

#[derive(Debug, Clone)]
pub struct LocalIdentity {
    db_path: PathBuf,
    require_confirmation: bool,
    session_ttl: Duration,
    password_iterations: u32,
}

impl LocalIdentity {
    pub fn new(
        db_path: PathBuf,
        require_confirmation: bool,
        session_ttl_hours: u32,
        password_iterations: u32,
    ) -> Self {
        Self {
            db_path,
            require_confirmation,
            session_ttl: Duration::hours(i64::from(session_ttl_hours.max(1))),
            password_iterations: password_iterations.max(1),
        }
    }

    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> AuthResult<SignUpOutcome> {
        let database = Database::open(&self.db_path)?;
        let (user, confirmation_token) = self.insert_user(&database, email, password, metadata)?;

        match confirmation_token {
            Some(token) => {
                announce_confirmation(email, &token);
                Ok(SignUpOutcome::ConfirmationRequired { user })
            }
            None => {
                let session = self.issue_session(&database, user)?;
                Ok(SignUpOutcome::SignedIn { session })
            }
        }
    }

    pub fn register(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> AuthResult<Registration> {
        let database = Database::open(&self.db_path)?;
        let (user, confirmation_token) = self.insert_user(&database, email, password, metadata)?;

        if let Some(token) = &confirmation_token {
            announce_confirmation(email, token);
        }

        Ok(Registration {
            user,
            confirmation_required: confirmation_token.is_some(),
        })
    }

    pub fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let database = Database::open(&self.db_path)?;
        let user = database
            .local_user_by_email(email)?
            .filter(|user| verify_password(&user.password_salt, password, &user.password_hash))
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.confirmed {
            return Err(AuthError::EmailNotConfirmed);
        }

        self.issue_session(&database, auth_user(&user))
    }

    pub fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let database = Database::open(&self.db_path)?;
        database.delete_session(access_token)?;
        Ok(())
    }

    /// Unknown or already-confirmed addresses succeed silently.
    pub fn resend_confirmation(&self, email: &str) -> AuthResult<()> {
        let database = Database::open(&self.db_path)?;
        let Some(user) = database.local_user_by_email(email)? else {
            return Ok(());
        };

        if user.confirmed {
            return Ok(());
        }

        let token = Uuid::new_v4().simple().to_string();
        database.set_confirmation_token(&user.id, &token)?;
        announce_confirmation(email, &token);

        Ok(())
    }

    pub fn get_user(&self, access_token: &str) -> AuthResult<AuthUser> {
        let database = Database::open(&self.db_path)?;
        let now = Utc::now().timestamp();

        let user_id = database
            .session_user_id(access_token, now)?
            .ok_or(AuthError::InvalidSession)?;
        let user = database
            .local_user_by_id(&user_id)?
            .ok_or(AuthError::InvalidSession)?;

        Ok(auth_user(&user))
    }

    pub fn confirm_email(&self, token: &str) -> AuthResult<AuthUser> {
        let database = Database::open(&self.db_path)?;
        let user_id = database
            .confirm_local_user(token.trim(), Utc::now().timestamp())?
            .ok_or_else(|| {
                AuthError::Rejected("Email link is invalid or has expired".to_string())
            })?;

        database
            .local_user_by_id(&user_id)?
            .map(|user| auth_user(&user))
            .ok_or(AuthError::InvalidSession)
    }

    fn insert_user(
        &self,
        database: &Database,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> AuthResult<(AuthUser, Option<String>)> {
        if database.local_user_by_email(email)?.is_some() {
            return Err(AuthError::AlreadyRegistered);
        }

        let id = Uuid::new_v4().to_string();
        let salt = Uuid::new_v4().simple().to_string();
        let hash = hash_password(&salt, password, self.password_iterations);
        let now = Utc::now().timestamp();
        let confirmation_token = self
            .require_confirmation
            .then(|| Uuid::new_v4().simple().to_string());

        database.insert_local_user(&NewLocalUser {
            id: &id,
            email,
            full_name: metadata.full_name.trim(),
            role: metadata.role,
            password_salt: &salt,
            password_hash: &hash,
            confirmed_at: (!self.require_confirmation).then_some(now),
            confirmation_token: confirmation_token.as_deref(),
            created_at: now,
        })?;

        let user = AuthUser {
            id,
            email: email.to_string(),
            metadata: metadata.clone(),
        };

        Ok((user, confirmation_token))
    }

    fn issue_session(&self, database: &Database, user: AuthUser) -> AuthResult<Session> {
        let now = Utc::now();
        let expires_at = (now + self.session_ttl).timestamp();
        let access_token = Uuid::new_v4().simple().to_string();

        database.purge_expired_sessions(now.timestamp())?;
        database.insert_session(&access_token, &user.id, expires_at)?;

        Ok(Session {
            access_token,
            expires_at: Some(expires_at),
            user,
        })
    }
}

pub fn hash_password(salt: &str, password: &str, iterations: u32) -> String {
    let iterations = iterations.max(1);
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
    format!("{HASH_SCHEME}${iterations}${}", hex::encode(key))
}

pub fn verify_password(salt: &str, password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(HASH_SCHEME), Some(iterations), Some(_)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };

    constant_time_eq(
        hash_password(salt, password, iterations).as_bytes(),
        stored.as_bytes(),
    )
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

fn auth_user(row: &LocalUserRow) -> AuthUser {
    AuthUser {
        id: row.id.clone(),
        email: row.email.clone(),
        metadata: UserMetadata {
            full_name: row.full_name.clone(),
            role: row.role,
        },
    }
}

// No mailer: the link goes to the service log.
fn announce_confirmation(email: &str, token: &str) {
    info!(
        email,
        confirm_path = %format!("/auth/confirm?token={token}"),
        "email confirmation required"
    );
}

#[cfg(test)]
mod tests {
    use super::{LocalIdentity, hash_password, verify_password};
    use crate::auth::tests::metadata;
    use crate::auth::{AuthError, SignUpOutcome};
    use crate::model::Role;

    #[test]
    fn password_digest_depends_on_salt_and_iterations() {
        let stored = hash_password("a", "secret", 1_000);
        assert!(stored.starts_with("pbkdf2_sha256$1000$"));
        assert_ne!(stored, hash_password("b", "secret", 1_000));
        assert_ne!(stored, hash_password("a", "secret", 2_000));

        assert!(verify_password("a", "secret", &stored));
        assert!(!verify_password("a", "Secret", &stored));
        assert!(!verify_password("b", "secret", &stored));
        assert!(!verify_password("a", "secret", "plain-sha256-digest"));
    }

    #[test]
    fn register_issues_no_session() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("auth.db");
        let identity = LocalIdentity::new(db_path.clone(), false, 12, 1_000);

        let registration = identity
            .register("cy@example.com", "secret-pass", &metadata("Cy", Role::Admin))
            .expect("register");
        assert!(!registration.confirmation_required);
        assert_eq!(registration.user.metadata.role, Role::Admin);

        let sessions: i64 = rusqlite::Connection::open(&db_path)
            .expect("raw connection")
            .query_row("SELECT COUNT(*) FROM local_sessions", [], |row| row.get(0))
            .expect("count");
        assert_eq!(sessions, 0);
        assert!(identity.sign_in("cy@example.com", "secret-pass").is_ok());
    }

    #[test]
    fn sign_in_rejects_wrong_password_and_duplicates() {
        let dir = tempfile::tempdir().expect("temp dir");
        let identity = LocalIdentity::new(dir.path().join("auth.db"), false, 12, 1_000);

        identity
            .sign_up("ann@example.com", "secret-pass", &metadata("Ann", Role::Agent))
            .expect("sign up");

        assert!(matches!(
            identity.sign_in("ann@example.com", "wrong-pass"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.sign_in("nobody@example.com", "secret-pass"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.sign_up("ann@example.com", "other-pass", &metadata("Ann", Role::Agent)),
            Err(AuthError::AlreadyRegistered)
        ));

        let session = identity
            .sign_in("ann@example.com", "secret-pass")
            .expect("sign in");
        let user = identity.get_user(&session.access_token).expect("user");
        assert_eq!(user.email, "ann@example.com");

        identity.sign_out(&session.access_token).expect("sign out");
        assert!(matches!(
            identity.get_user(&session.access_token),
            Err(AuthError::InvalidSession)
        ));
    }

    #[test]
    fn unconfirmed_account_cannot_sign_in_until_confirmed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("auth.db");
        let identity = LocalIdentity::new(db_path.clone(), true, 12, 1_000);

        let outcome = identity
            .sign_up("bo@example.com", "secret-pass", &metadata("Bo", Role::Agent))
            .expect("sign up");
        assert!(matches!(outcome, SignUpOutcome::ConfirmationRequired { .. }));

        assert!(matches!(
            identity.sign_in("bo@example.com", "secret-pass"),
            Err(AuthError::EmailNotConfirmed)
        ));

        identity
            .resend_confirmation("bo@example.com")
            .expect("resend");
        let token: String = rusqlite::Connection::open(&db_path)
            .expect("raw connection")
            .query_row(
                "SELECT confirmation_token FROM local_users WHERE email = 'bo@example.com'",
                [],
                |row| row.get(0),
            )
            .expect("token stored");

        assert!(identity.confirm_email("bogus").is_err());
        let confirmed = identity.confirm_email(&token).expect("confirm");
        assert_eq!(confirmed.email, "bo@example.com");
        assert!(identity.sign_in("bo@example.com", "secret-pass").is_ok());
    }
}
