//! Authentication API endpoints.
//!
//! - POST `/login` - Password login (`username` may be an email)
//! - POST `/signup` - Password signup with organization and department
//! - POST `/signup/validate-email` - Check an email is free before signup
//! - POST `/google` - Federated login or signup with a Google ID token
//! - POST `/refresh` - Exchange the refresh cookie for a new access token
//! - POST `/logout` - Revoke the current session and clear the cookie
//! - GET `/me` - The caller's auth context
//! - PATCH `/onboarding/dob`, `/onboarding/username` - Finish onboarding
//! - POST `/change-password` - Replace the password of the caller

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt, is_unique_violation, require_field};
use crate::auth::{
    self, Auth, CookieConfig, FederatedError, FederatedVerifier, IssuedTokens, PasswordHasher,
    issue_tokens,
};
use crate::db::{Database, NewUser, UserProfile};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::names::generate_username;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_signup};

/// bcrypt ignores input past 72 bytes.
const MAX_PASSWORD_LEN: usize = 72;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 100;
const MAX_USERNAME_LEN: usize = 32;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub cookies: Arc<CookieConfig>,
    pub passwords: PasswordHasher,
    pub federated: Option<Arc<dyn FederatedVerifier>>,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .route("/google", post(google))
        .route("/signup/validate-email", post(validate_email))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let signup_router = Router::new()
        .route("/signup", post(signup))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_signup,
        ));

    Router::new()
        .route("/refresh", post(refresh_token))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/onboarding/dob", patch(set_date_of_birth))
        .route("/onboarding/username", patch(set_username))
        .route("/change-password", post(change_password))
        .with_state(state)
        .merge(login_router)
        .merge(signup_router)
}

#[derive(Serialize)]
struct UserResponse {
    user: UserProfile,
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized(INVALID_CREDENTIALS)
}

fn validate_email_format(email: &str) -> Result<String, ApiError> {
    let email = require_field(email, "Email", MAX_EMAIL_LEN)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(email.to_lowercase())
        }
        _ => Err(ApiError::bad_request("Email is invalid")),
    }
}

fn validate_new_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password cannot be longer than {} bytes",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

async fn load_profile(state: &AuthState, user_id: i64) -> Result<UserProfile, ApiError> {
    state
        .db
        .users()
        .get_profile(user_id)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

// =============================================================================
// Login and signup
// =============================================================================

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<IssuedTokens, ApiError> {
    let username = payload.username.trim().to_lowercase();
    let users = state.db.users();

    let user = if username.contains('@') {
        users.get_by_email(&username).await
    } else {
        users.get_by_username(&username).await
    }
    .db_err("Failed to look up user")?
    .ok_or_else(invalid_credentials)?;

    let hashed = user
        .hashed_password
        .as_deref()
        .ok_or_else(invalid_credentials)?;

    let matches = state
        .passwords
        .verify(&payload.password, hashed)
        .await
        .internal_err("Failed to verify password")?;
    if !matches {
        return Err(invalid_credentials());
    }

    info!(user_id = user.id, "Password login");
    Ok(issue_tokens(&state, user.id).await?)
}

#[derive(Deserialize)]
struct SignupRequest {
    email: String,
    name: String,
    password: String,
    organization: String,
    department: String,
    #[serde(default, alias = "academicYear")]
    academic_year: Option<AcademicYear>,
    #[serde(default, alias = "rollNumber")]
    roll_number: Option<String>,
}

/// Forms submit the year either as a number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum AcademicYear {
    Number(i64),
    Text(String),
}

impl AcademicYear {
    fn value(self) -> Result<i64, ApiError> {
        match self {
            AcademicYear::Number(n) => Ok(n),
            AcademicYear::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ApiError::bad_request("Academic year must be a number")),
        }
    }
}

async fn signup(
    State(state): State<AuthState>,
    Json(payload): Json<SignupRequest>,
) -> Result<IssuedTokens, ApiError> {
    let email = validate_email_format(&payload.email)?;
    let name = require_field(&payload.name, "Name", MAX_NAME_LEN)?;
    let organization = require_field(&payload.organization, "Organization", MAX_NAME_LEN)?;
    let department = require_field(&payload.department, "Department", MAX_NAME_LEN)?;
    validate_new_password(&payload.password)?;
    let academic_year = payload.academic_year.map(AcademicYear::value).transpose()?;

    let available = state
        .db
        .users()
        .is_email_available(&email)
        .await
        .db_err("Failed to check email availability")?;
    if !available {
        return Err(ApiError::conflict("Email is already in use"));
    }

    let org = state
        .db
        .organizations()
        .find_or_create(organization)
        .await
        .db_err("Failed to find or create organization")?;
    let dept = state
        .db
        .organizations()
        .find_or_create_department(org.id, department)
        .await
        .db_err("Failed to find or create department")?;

    let hashed = state
        .passwords
        .hash(&payload.password)
        .await
        .internal_err("Failed to hash password")?;

    let mut new_user = NewUser::password(&email, &generate_username(name), &hashed, name);
    new_user.organization_id = Some(org.id);
    new_user.department_id = Some(dept.id);
    new_user.academic_year = academic_year;
    new_user.roll_number = payload
        .roll_number
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let user_id = match state.db.users().create(&new_user).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("Email is already in use"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    info!(user_id, organization_id = org.id, "User signed up");
    Ok(issue_tokens(&state, user_id).await?)
}

#[derive(Deserialize)]
struct ValidateEmailRequest {
    email: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn validate_email(
    State(state): State<AuthState>,
    Json(payload): Json<ValidateEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email_format(&payload.email)?;

    let available = state
        .db
        .users()
        .is_email_available(&email)
        .await
        .db_err("Failed to check email availability")?;
    if !available {
        return Err(ApiError::conflict("Email is already in use"));
    }

    Ok(Json(MessageResponse {
        message: "validation success",
    }))
}

#[derive(Deserialize)]
struct GoogleRequest {
    token: String,
}

async fn google(
    State(state): State<AuthState>,
    Json(payload): Json<GoogleRequest>,
) -> Result<IssuedTokens, ApiError> {
    let verifier = state
        .federated
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Federated login is not configured"))?;

    let identity = verifier.verify(&payload.token).await.map_err(|e| match e {
        FederatedError::Rejected(reason) => {
            tracing::debug!(reason = %reason, "Identity token rejected");
            ApiError::unauthorized("Invalid identity token")
        }
        FederatedError::Unavailable(e) => {
            ApiError::internal_error("Failed to reach identity provider", e)
        }
    })?;

    let users = state.db.users();
    let existing = users
        .get_by_email(&identity.email)
        .await
        .db_err("Failed to look up user")?;

    let user_id = match existing {
        Some(user) => user.id,
        None => {
            let new_user = NewUser::google(
                &identity.email,
                &generate_username(&identity.name),
                &identity.subject,
                &identity.name,
            );
            match users.create(&new_user).await {
                Ok(id) => {
                    info!(user_id = id, "User signed up with Google");
                    id
                }
                // Lost a race with a concurrent first login for the same account.
                Err(e) if is_unique_violation(&e) => users
                    .get_by_email(&identity.email)
                    .await
                    .db_err("Failed to look up user")?
                    .map(|user| user.id)
                    .ok_or_else(|| ApiError::conflict("Account already exists"))?,
                Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
            }
        }
    };

    Ok(issue_tokens(&state, user_id).await?)
}

// =============================================================================
// Session lifecycle
// =============================================================================

async fn refresh_token(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let outcome = auth::refresh(&headers, &state).await?;
    Ok(outcome.respond(&state.cookies))
}

/// Always answers 204 and clears the cookie, whether or not a session existed.
async fn logout(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    auth::logout(&headers, &state).await?;
    Ok((
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, state.cookies.clear_refresh_cookie())],
    ))
}

async fn me(Auth(ctx): Auth) -> impl IntoResponse {
    Json(ctx)
}

// =============================================================================
// Account updates
// =============================================================================

#[derive(Deserialize)]
struct DateOfBirthRequest {
    #[serde(rename = "dateOfBirth")]
    date_of_birth: String,
}

async fn set_date_of_birth(
    State(state): State<AuthState>,
    Auth(ctx): Auth,
    Json(payload): Json<DateOfBirthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let dob = chrono::NaiveDate::parse_from_str(payload.date_of_birth.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("Date of birth must be YYYY-MM-DD"))?;

    let updated = state
        .db
        .users()
        .set_date_of_birth(ctx.user_id, &dob.to_string())
        .await
        .db_err("Failed to update date of birth")?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    let user = load_profile(&state, ctx.user_id).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

#[derive(Deserialize)]
struct UsernameRequest {
    username: String,
}

async fn set_username(
    State(state): State<AuthState>,
    Auth(ctx): Auth,
    Json(payload): Json<UsernameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = require_field(&payload.username, "Username", MAX_USERNAME_LEN)?;

    // Only allow alphanumeric and underscores
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    let updated = match state.db.users().set_username(ctx.user_id, username).await {
        Ok(updated) => updated,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("Username is already taken"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to update username", e)),
    };
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    let user = load_profile(&state, ctx.user_id).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AuthState>,
    Auth(ctx): Auth,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_id(ctx.user_id)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(invalid_credentials)?;
    let hashed = user
        .hashed_password
        .as_deref()
        .ok_or_else(invalid_credentials)?;

    let matches = state
        .passwords
        .verify(&payload.current_password, hashed)
        .await
        .internal_err("Failed to verify password")?;
    if !matches {
        return Err(invalid_credentials());
    }

    validate_new_password(&payload.new_password)?;
    let new_hash = state
        .passwords
        .hash(&payload.new_password)
        .await
        .internal_err("Failed to hash password")?;

    state
        .db
        .users()
        .set_password(user.id, &new_hash)
        .await
        .db_err("Failed to update password")?;

    info!(user_id = user.id, "Password changed");
    let user = load_profile(&state, user.id).await?;
    Ok(Json(UserResponse { user }))
}
