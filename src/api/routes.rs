use crate::api::session::{
    self, CurrentUser, clear_session_cookie, load_profile, session_cookie, session_token,
};
use crate::auth::gate::{DASHBOARD_PATH, LOGIN_PATH, SIGN_UP_PATH};
use crate::auth::messages::{resend_message, sign_in_message, sign_up_message};
use crate::auth::{AuthError, Identity, Session, SignUpOutcome, UserMetadata};
use crate::config::Config;
use crate::dashboard::agent::{StatusView, status_view};
use crate::dashboard::{self, Dashboard, DashboardQuery, HistoryWindow, admin};
use crate::db::{
    CoreTaskRow, DailySummaryRow, Database, NewDivertedTask, NewTaskLog, ProfileRow,
};
use crate::model::{LogType, Role};
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

const MAX_TIME_SPENT_MINUTES: i64 = 24 * 60;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub identity: Identity,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route(LOGIN_PATH, get(login_page).post(login))
        .route(SIGN_UP_PATH, get(sign_up_page).post(sign_up))
        .route("/auth/resend", post(resend))
        .route("/auth/confirm", get(confirm))
        .route("/auth/logout", post(logout))
        .route(DASHBOARD_PATH, get(dashboard_view))
        .route("/api/v1/me", get(me))
        .route("/api/v1/status", get(status_get).post(status_post))
        .route("/api/v1/core-tasks", get(core_tasks))
        .route("/api/v1/task-logs", post(task_log_create))
        .route("/api/v1/diverted-tasks", post(diverted_task_create))
        .route("/api/v1/history", get(history))
        .route("/api/v1/team", get(team))
        .route("/api/v1/users", post(user_create))
        .route("/api/v1/users/:id/active", put(user_active))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::session_gate,
        ))
        .with_state(state)
}

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct ApiJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
struct ApiQuery<T>(T);

#[derive(Debug, Deserialize)]
struct DashboardParams {
    days: Option<u32>,
    agent: Option<String>,
}

impl DashboardParams {
    fn into_query(self) -> ApiResult<DashboardQuery> {
        let window =
            HistoryWindow::from_days(self.days).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(DashboardQuery {
            window,
            agent_id: self.agent,
        })
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ConfirmParams {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SignInPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SignUpPayload {
    email: String,
    password: String,
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct ResendPayload {
    email: String,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    action: LogType,
}

#[derive(Debug, Deserialize)]
struct TaskLogPayload {
    core_task_id: i64,
    time_spent: i64,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DivertedTaskPayload {
    task_type: String,
    time_spent: i64,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateUserPayload {
    email: String,
    password: String,
    full_name: String,
    role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
struct ActivePayload {
    is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
struct SessionPayload {
    status: &'static str,
    access_token: String,
    expires_at: Option<i64>,
    profile: ProfileRow,
    redirect: &'static str,
}

#[derive(Debug, Serialize)]
struct CreatedPayload {
    id: i64,
}

#[derive(Debug, Serialize)]
struct HistoryPayload {
    days: u32,
    summaries: Vec<DailySummaryRow>,
}

#[derive(Debug, Serialize)]
struct CreatedUserPayload {
    profile: ProfileRow,
    confirmation_required: bool,
}

async fn index(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "name": "TaskPulse",
        "version": env!("CARGO_PKG_VERSION"),
        "identity_provider": state.identity.backend_name(),
        "login": LOGIN_PATH,
        "sign_up": SIGN_UP_PATH,
        "dashboard": DASHBOARD_PATH,
    }))
}

async fn login_page() -> Json<Value> {
    Json(json!({
        "form": "login",
        "action": LOGIN_PATH,
        "fields": ["email", "password"],
        "links": { "sign_up": SIGN_UP_PATH, "resend": "/auth/resend" },
    }))
}

async fn sign_up_page(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "form": "sign_up",
        "action": SIGN_UP_PATH,
        "fields": ["full_name", "email", "password"],
        "confirmation_required": state.config.require_email_confirmation,
        "links": { "login": LOGIN_PATH },
    }))
}

async fn login(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<SignInPayload>,
) -> ApiResult<Response> {
    let session = state
        .identity
        .sign_in(&payload.email, &payload.password)
        .await
        .map_err(|e| auth_failure(e, sign_in_message))?;

    let profile = load_profile(&state.config, &session.user)?;
    if !profile.is_active {
        // Leave no usable session behind for a deactivated account.
        if let Err(error) = state.identity.sign_out(&session.access_token).await {
            warn!(error = %error, "failed to revoke session of inactive profile");
        }
        return Err(ApiError::Forbidden(
            "This account has been deactivated".to_string(),
        ));
    }

    signed_in_response(&state.config, session, profile)
}

async fn sign_up(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<SignUpPayload>,
) -> ApiResult<Response> {
    let metadata = UserMetadata {
        full_name: payload.full_name.trim().to_string(),
        role: Role::Agent,
    };
    let outcome = state
        .identity
        .sign_up(&payload.email, &payload.password, metadata)
        .await
        .map_err(|e| auth_failure(e, sign_up_message))?;

    match outcome {
        SignUpOutcome::SignedIn { session } => {
            let profile = load_profile(&state.config, &session.user)?;
            signed_in_response(&state.config, session, profile)
        }
        SignUpOutcome::ConfirmationRequired { user } => {
            let profile = load_profile(&state.config, &user)?;
            Ok(Json(json!({
                "status": "confirmation_required",
                "message": "Check your email to confirm your account before signing in.",
                "profile": profile,
            }))
            .into_response())
        }
    }
}

async fn resend(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<ResendPayload>,
) -> ApiResult<Json<Value>> {
    state
        .identity
        .resend_confirmation(&payload.email)
        .await
        .map_err(|e| auth_failure(e, resend_message))?;

    Ok(Json(json!({ "sent": true })))
}

async fn confirm(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<ConfirmParams>,
) -> ApiResult<Json<Value>> {
    let user = state
        .identity
        .confirm_email(&params.token)
        .await
        .map_err(|e| auth_failure(e, |error| error.to_string()))?;
    load_profile(&state.config, &user)?;

    Ok(Json(json!({
        "confirmed": true,
        "email": user.email,
        "redirect": LOGIN_PATH,
    })))
}

async fn logout(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        if let Err(error) = state.identity.sign_out(&token).await {
            warn!(error = %error, "sign out failed; clearing cookie anyway");
        }
    }

    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(json!({ "signed_out": true, "redirect": LOGIN_PATH })),
    )
        .into_response()
}

async fn dashboard_view(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
    ApiQuery(params): ApiQuery<DashboardParams>,
) -> ApiResult<Json<Dashboard>> {
    let user = require_user(user)?;
    let query = params.into_query()?;
    let database = Database::open(&state.config.db_path)?;

    let view =
        dashboard::load_dashboard(&database, &state.config, &user.profile, &query, Local::now())?;
    Ok(Json(view))
}

async fn me(user: Option<Extension<CurrentUser>>) -> ApiResult<Json<ProfileRow>> {
    Ok(Json(require_user(user)?.profile))
}

async fn status_get(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<StatusView>> {
    let user = require_user(user)?;
    let database = Database::open(&state.config.db_path)?;
    Ok(Json(status_view(&database, &user.profile.id)?))
}

async fn status_post(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
    ApiJson(payload): ApiJson<StatusPayload>,
) -> ApiResult<Json<StatusView>> {
    let user = require_user(user)?;
    let database = Database::open(&state.config.db_path)?;

    let current = status_view(&database, &user.profile.id)?;
    if !current.status.accepts(payload.action) {
        return Err(ApiError::Conflict(format!(
            "Cannot record {} while {}",
            payload.action.as_str(),
            current.label
        )));
    }

    database
        .insert_time_log(&user.profile.id, payload.action, Local::now().timestamp())
        .inspect_err(|error| error!(error = %error, "failed to record time log"))?;
    info!(user_id = %user.profile.id, action = payload.action.as_str(), "status changed");

    Ok(Json(status_view(&database, &user.profile.id)?))
}

async fn core_tasks(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Vec<CoreTaskRow>>> {
    require_user(user)?;
    let database = Database::open(&state.config.db_path)?;
    Ok(Json(database.core_tasks()?))
}

async fn task_log_create(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
    ApiJson(payload): ApiJson<TaskLogPayload>,
) -> ApiResult<(StatusCode, Json<CreatedPayload>)> {
    let user = require_user(user)?;
    validate_time_spent(payload.time_spent)?;

    let database = Database::open(&state.config.db_path)?;
    if database.core_task(payload.core_task_id)?.is_none() {
        return Err(ApiError::BadRequest(format!(
            "Unknown core task: {}",
            payload.core_task_id
        )));
    }

    let id = database
        .insert_task_log(&NewTaskLog {
            user_id: user.profile.id.clone(),
            core_task_id: payload.core_task_id,
            time_spent: payload.time_spent,
            notes: non_blank(payload.notes),
            completed_at: Local::now().timestamp(),
        })
        .inspect_err(|error| error!(error = %error, "failed to save task log"))?;

    Ok((StatusCode::CREATED, Json(CreatedPayload { id })))
}

async fn diverted_task_create(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
    ApiJson(payload): ApiJson<DivertedTaskPayload>,
) -> ApiResult<(StatusCode, Json<CreatedPayload>)> {
    let user = require_user(user)?;
    validate_time_spent(payload.time_spent)?;

    let task_type = state
        .config
        .diverted_task_type(&payload.task_type)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unknown diverted task type: {}. Use one of: {}",
                payload.task_type,
                state.config.diverted_task_types.join(", ")
            ))
        })?;

    let database = Database::open(&state.config.db_path)?;
    let id = database
        .insert_diverted_task(&NewDivertedTask {
            user_id: user.profile.id.clone(),
            task_type,
            time_spent: payload.time_spent,
            description: non_blank(payload.description),
            completed_at: Local::now().timestamp(),
        })
        .inspect_err(|error| error!(error = %error, "failed to save diverted task"))?;

    Ok((StatusCode::CREATED, Json(CreatedPayload { id })))
}

async fn history(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> ApiResult<Json<HistoryPayload>> {
    let user = require_user(user)?;
    let window =
        HistoryWindow::from_days(params.days).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let (from, to) = window.date_range(Local::now().date_naive());

    let database = Database::open(&state.config.db_path)?;
    let summaries = database.daily_summaries(Some(&user.profile.id), from, to)?;

    Ok(Json(HistoryPayload {
        days: window.days,
        summaries,
    }))
}

async fn team(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
    ApiQuery(params): ApiQuery<DashboardParams>,
) -> ApiResult<Json<admin::AdminDashboard>> {
    let user = require_admin(user)?;
    let query = params.into_query()?;
    let database = Database::open(&state.config.db_path)?;

    Ok(Json(admin::load(
        &database,
        &state.config,
        &user.profile,
        &query,
        Local::now(),
    )?))
}

async fn user_create(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
    ApiJson(payload): ApiJson<CreateUserPayload>,
) -> ApiResult<(StatusCode, Json<CreatedUserPayload>)> {
    let admin_user = require_admin(user)?;
    let metadata = UserMetadata {
        full_name: payload.full_name.trim().to_string(),
        role: payload.role.unwrap_or(Role::Agent),
    };

    let registration = state
        .identity
        .register(&payload.email, &payload.password, metadata)
        .await
        .map_err(|e| auth_failure(e, sign_up_message))?;
    let confirmation_required = registration.confirmation_required;

    let profile = Database::open(&state.config.db_path)?
        .ensure_profile(&registration.user.to_profile())?;
    info!(
        admin_id = %admin_user.profile.id,
        user_id = %profile.id,
        role = profile.role.as_str(),
        "user created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatedUserPayload {
            profile,
            confirmation_required,
        }),
    ))
}

async fn user_active(
    State(state): State<ApiState>,
    user: Option<Extension<CurrentUser>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ProfileRow>> {
    let admin_user = require_admin(user)?;
    // An empty body toggles the flag.
    let payload: ActivePayload = if body.iter().all(u8::is_ascii_whitespace) {
        ActivePayload::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?
    };
    let database = Database::open(&state.config.db_path)?;

    let target = database
        .profile(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("No user with id {id}")))?;
    let is_active = payload.is_active.unwrap_or(!target.is_active);

    if !is_active && target.id == admin_user.profile.id {
        return Err(ApiError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    database.set_profile_active(&target.id, is_active)?;
    info!(user_id = %target.id, is_active, "user activation changed");

    Ok(Json(ProfileRow {
        is_active,
        ..target
    }))
}

fn signed_in_response(config: &Config, session: Session, profile: ProfileRow) -> ApiResult<Response> {
    let now = Local::now().timestamp();
    let max_age = session
        .expires_at
        .map(|expires_at| expires_at - now)
        .unwrap_or_else(|| i64::from(config.session_ttl_hours) * 3600);
    let cookie = session_cookie(&session.access_token, max_age)?;

    let payload = SessionPayload {
        status: "signed_in",
        access_token: session.access_token,
        expires_at: session.expires_at,
        profile,
        redirect: DASHBOARD_PATH,
    };

    Ok(([(header::SET_COOKIE, cookie)], Json(payload)).into_response())
}

fn require_user(user: Option<Extension<CurrentUser>>) -> ApiResult<CurrentUser> {
    user.map(|Extension(user)| user)
        .ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))
}

fn require_admin(user: Option<Extension<CurrentUser>>) -> ApiResult<CurrentUser> {
    let user = require_user(user)?;
    if !user.profile.role.is_admin() {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }
    Ok(user)
}

fn validate_time_spent(minutes: i64) -> ApiResult<()> {
    if minutes < 1 {
        return Err(ApiError::BadRequest(
            "Time spent must be at least 1 minute".to_string(),
        ));
    }
    if minutes > MAX_TIME_SPENT_MINUTES {
        return Err(ApiError::BadRequest(format!(
            "Time spent cannot exceed {MAX_TIME_SPENT_MINUTES} minutes"
        )));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn auth_failure(error: AuthError, message: impl Fn(&AuthError) -> String) -> ApiError {
    match error {
        AuthError::Unavailable(_) => {
            warn!(error = %error, "identity provider unavailable");
            ApiError::Unavailable(error.to_string())
        }
        AuthError::Internal(error) => ApiError::Internal(error),
        AuthError::AlreadyRegistered => ApiError::Conflict(message(&error)),
        other => ApiError::BadRequest(message(&other)),
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}

impl From<axum::http::header::InvalidHeaderValue> for ApiError {
    fn from(value: axum::http::header::InvalidHeaderValue) -> Self {
        Self::Internal(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal(error) => {
                error!(error = ?error, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
