use crate::auth::{AuthError, AuthResult, AuthUser, Session, SignUpOutcome, UserMetadata};
use crate::model::Role;
use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct RemoteIdentity {
    base_url: Url,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

#[derive(Debug, Deserialize)]
struct RemoteSession {
    access_token: String,
    expires_at: Option<i64>,
    user: RemoteUser,
}

impl RemoteIdentity {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout_seconds: u64) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid identity provider URL: {base_url}"))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
            headers.insert(
                "apikey",
                HeaderValue::from_str(key).context("Failed to build apikey header")?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds.max(2)))
            .default_headers(headers)
            .build()
            .context("Failed to create identity HTTP client")?;

        Ok(Self { base_url, client })
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> AuthResult<SignUpOutcome> {
        let body = json!({
            "email": email,
            "password": password,
            "data": {
                "full_name": metadata.full_name,
                "role": metadata.role.as_str(),
            },
        });

        let payload = self
            .send(self.request(Method::POST, "auth/v1/signup")?.json(&body))
            .await?;

        // Auto-confirming projects answer with a session, the rest with a bare user.
        if payload.get("access_token").is_some() {
            let session = parse_session(payload)?;
            return Ok(SignUpOutcome::SignedIn { session });
        }

        let user_value = payload.get("user").cloned().unwrap_or(payload);
        let user: RemoteUser =
            serde_json::from_value(user_value).context("Failed to parse sign-up response")?;

        Ok(SignUpOutcome::ConfirmationRequired {
            user: into_auth_user(user),
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let request = self
            .request(Method::POST, "auth/v1/token?grant_type=password")?
            .json(&json!({ "email": email, "password": password }));

        parse_session(self.send(request).await?)
    }

    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let request = self
            .request(Method::POST, "auth/v1/logout")?
            .header(AUTHORIZATION, bearer(access_token)?);

        match self.send(request).await {
            Ok(_) | Err(AuthError::InvalidSession) => Ok(()),
            Err(error) => Err(error),
        }
    }

    pub async fn resend_confirmation(&self, email: &str) -> AuthResult<()> {
        let request = self
            .request(Method::POST, "auth/v1/resend")?
            .json(&json!({ "type": "signup", "email": email }));

        self.send(request).await.map(|_| ())
    }

    pub async fn get_user(&self, access_token: &str) -> AuthResult<AuthUser> {
        let request = self
            .request(Method::GET, "auth/v1/user")?
            .header(AUTHORIZATION, bearer(access_token)?);

        let user: RemoteUser = serde_json::from_value(self.send(request).await?)
            .context("Failed to parse user response")?;

        Ok(into_auth_user(user))
    }

    fn request(&self, method: Method, path: &str) -> AuthResult<RequestBuilder> {
        let endpoint = self
            .base_url
            .join(path)
            .with_context(|| format!("Failed to build identity endpoint: {path}"))?;

        Ok(self.client.request(method, endpoint))
    }

    async fn send(&self, request: RequestBuilder) -> AuthResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|error| AuthError::Unavailable(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| AuthError::Unavailable(error.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse identity response: {body}"))
            .map_err(AuthError::from)
    }
}

pub fn classify_failure(status: StatusCode, body: &str) -> AuthError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| {
            ["msg", "error_description", "message", "error"]
                .into_iter()
                .find_map(|key| payload.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string());

    let lowered = message.to_lowercase();

    if lowered.contains("email not confirmed") {
        AuthError::EmailNotConfirmed
    } else if lowered.contains("invalid login credentials") {
        AuthError::InvalidCredentials
    } else if lowered.contains("already registered") {
        AuthError::AlreadyRegistered
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        AuthError::InvalidSession
    } else if status.is_server_error() {
        AuthError::Unavailable(format!("{status}: {message}"))
    } else if message.is_empty() {
        AuthError::Rejected(format!("Identity provider returned {status}"))
    } else {
        AuthError::Rejected(message)
    }
}

fn parse_session(payload: Value) -> AuthResult<Session> {
    let session: RemoteSession =
        serde_json::from_value(payload).context("Failed to parse session response")?;

    Ok(Session {
        access_token: session.access_token,
        expires_at: session.expires_at,
        user: into_auth_user(session.user),
    })
}

fn into_auth_user(user: RemoteUser) -> AuthUser {
    let full_name = user
        .user_metadata
        .get("full_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let role = user
        .user_metadata
        .get("role")
        .and_then(Value::as_str)
        .map(Role::from_db_str)
        .unwrap_or(Role::Agent);

    AuthUser {
        id: user.id,
        email: user.email.unwrap_or_default(),
        metadata: UserMetadata { full_name, role },
    }
}

fn bearer(access_token: &str) -> AuthResult<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|_| AuthError::InvalidSession)
}

#[cfg(test)]
mod tests {
    use super::{RemoteIdentity, classify_failure, into_auth_user, parse_session};
    use crate::auth::AuthError;
    use crate::model::Role;
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn classifies_provider_messages() {
        assert!(matches!(
            classify_failure(
                StatusCode::BAD_REQUEST,
                r#"{"error":"invalid_grant","error_description":"Email not confirmed"}"#
            ),
            AuthError::EmailNotConfirmed
        ));
        assert!(matches!(
            classify_failure(
                StatusCode::BAD_REQUEST,
                r#"{"error_description":"Invalid login credentials"}"#
            ),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, r#"{"msg":"invalid JWT"}"#),
            AuthError::InvalidSession
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "upstream down"),
            AuthError::Unavailable(_)
        ));

        match classify_failure(StatusCode::UNPROCESSABLE_ENTITY, r#"{"msg":"Signups not allowed"}"#) {
            AuthError::Rejected(message) => assert_eq!(message, "Signups not allowed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn session_payload_carries_metadata() {
        let session = parse_session(json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_at": 1_900_000_000,
            "user": {
                "id": "0b1f",
                "email": "lead@example.com",
                "user_metadata": { "full_name": "Lead", "role": "admin" }
            }
        }))
        .expect("session parses");

        assert_eq!(session.access_token, "tok");
        assert_eq!(session.user.metadata.role, Role::Admin);
        assert_eq!(session.user.metadata.full_name, "Lead");
    }

    #[test]
    fn missing_metadata_defaults_to_agent() {
        let user = into_auth_user(
            serde_json::from_value(json!({ "id": "x", "email": "a@b.co" })).expect("user parses"),
        );
        assert_eq!(user.metadata.role, Role::Agent);
        assert!(user.metadata.full_name.is_empty());
    }

    #[tokio::test]
    async fn unreachable_provider_is_reported_as_unavailable() {
        let identity =
            RemoteIdentity::new("http://127.0.0.1:9", None, 2).expect("client builds");
        let result = identity.get_user("token").await;
        assert!(matches!(result, Err(AuthError::Unavailable(_))));
    }
}
