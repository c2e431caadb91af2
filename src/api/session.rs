use crate::api::routes::ApiState;
use crate::auth::gate::{self, DASHBOARD_PATH, GateDecision, IdentityCheck, LOGIN_PATH};
use crate::auth::AuthUser;
use crate::config::Config;
use crate::db::{Database, ProfileRow};
use crate::model::Role;
use anyhow::Result;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{error, info, warn};

pub const SESSION_COOKIE: &str = "taskpulse_session";

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub profile: ProfileRow,
    pub access_token: String,
}

pub async fn session_gate(State(state): State<ApiState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let is_page_request = request.method() == Method::GET;
    let token = session_token(request.headers());

    let (check, current) = if gate::needs_identity_check(&path, is_page_request) {
        resolve(&state, token).await
    } else {
        (IdentityCheck::Anonymous, None)
    };

    match gate::decide(&path, is_page_request, check, state.config.auth_failure_policy) {
        GateDecision::Pass => {
            if let Some(user) = current {
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        GateDecision::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
        GateDecision::RedirectToDashboard => Redirect::to(DASHBOARD_PATH).into_response(),
    }
}

async fn resolve(state: &ApiState, token: Option<String>) -> (IdentityCheck, Option<CurrentUser>) {
    let Some(access_token) = token else {
        return (IdentityCheck::Anonymous, None);
    };

    match state.identity.get_user(&access_token).await {
        Ok(user) => match load_profile(&state.config, &user) {
            Ok(profile) if profile.is_active => (
                IdentityCheck::Authenticated,
                Some(CurrentUser {
                    profile,
                    access_token,
                }),
            ),
            Ok(profile) => {
                info!(user_id = %profile.id, "inactive profile refused");
                (IdentityCheck::Anonymous, None)
            }
            Err(error) => {
                error!(error = %error, "failed to load profile for session");
                (IdentityCheck::Failed, None)
            }
        },
        Err(error) if error.is_unauthenticated() => (IdentityCheck::Anonymous, None),
        Err(error) => {
            warn!(error = %error, "identity check failed");
            (IdentityCheck::Failed, None)
        }
    }
}

// Provider metadata is caller-controlled: first-sight profiles are agents.
pub fn load_profile(config: &Config, user: &AuthUser) -> Result<ProfileRow> {
    Database::open(&config.db_path)?.ensure_profile(&ProfileRow {
        role: Role::Agent,
        ..user.to_profile()
    })
}

pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned);

    bearer.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

pub fn session_cookie(token: &str, max_age_seconds: i64) -> Result<HeaderValue, header::InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age_seconds.max(0)
    ))
}

pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("taskpulse_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::{SESSION_COOKIE, load_profile, session_token};
    use crate::auth::AuthUser;
    use crate::auth::tests::metadata;
    use crate::config::Config;
    use crate::db::Database;
    use crate::model::Role;
    use axum::http::{HeaderMap, HeaderValue, header};

    fn user(id: &str, role: Role) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            metadata: metadata("Someone", role),
        }
    }

    #[test]
    fn first_sight_profile_ignores_claimed_admin_role() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config {
            db_path: dir.path().join("taskpulse.db"),
            ..Config::default()
        };

        let claimed = load_profile(&config, &user("self-made", Role::Admin)).expect("profile");
        assert_eq!(claimed.role, Role::Agent);

        Database::open(&config.db_path)
            .expect("database")
            .ensure_profile(&user("granted", Role::Admin).to_profile())
            .expect("admin row");
        let granted = load_profile(&config, &user("granted", Role::Agent)).expect("profile");
        assert_eq!(granted.role, Role::Admin);
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}=from-cookie"))
                .expect("cookie header"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("taskpulse_session="),
        );
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(session_token(&headers).is_none());
    }
}
