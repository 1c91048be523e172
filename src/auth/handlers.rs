use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, EmailRequest, LoginRequest, MessageResponse, PublicUser,
            RegisterRequest, ResetPasswordRequest, VerifyPinRequest,
        },
        jwt::JwtKeys,
        password, pin,
        pin::PinChannel,
        repo::{Role, User},
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/register", post(register_admin))
        .route("/librarian/register", post(register_librarian))
        .route("/member/register", post(register_member))
        .route("/login", get(login).post(login))
        .route("/email-otp", post(send_verification_pin))
        .route("/resend-pin", post(resend_verification_pin))
        .route("/verify-email", post(verify_email))
        .route("/forget-password", post(send_reset_pin))
        .route("/resend-otp", post(resend_reset_pin))
        .route("/reset-password", post(reset_password))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

// --- registration, one entry point per role ---

async fn register_admin(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    register(state, Role::Admin, payload).await
}

async fn register_librarian(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    register(state, Role::Librarian, payload).await
}

async fn register_member(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    register(state, Role::Member, payload).await
}

#[instrument(skip(state, payload))]
async fn register(
    state: AppState,
    role: Role,
    payload: RegisterRequest,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide all required fields".into(),
        ));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation(
            "Please provide a valid email address.".into(),
        ));
    }

    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = password::hash_secret(&payload.password)?;
    let user = match User::create(&state.db, &name, &email, &hash, role).await {
        Ok(u) => u,
        // Lost the race on the unique email index
        Err(e) => {
            return Err(match ApiError::from(e) {
                ApiError::Validation(_) => ApiError::DuplicateEmail,
                other => other,
            })
        }
    };

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;

    info!(user_id = %user.id, email = %user.email, role = ?user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            status: "success",
            message: "User registered successfully",
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide both email and password".into(),
        ));
    }

    // Unknown email and wrong password fail identically
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| {
            warn!(email = %email, "login unknown email");
            ApiError::InvalidCredentials
        })?;

    if !password::verify_secret(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = JwtKeys::from_ref(&state).sign(user.id, user.role)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        status: "success",
        message: "User logged in successfully",
        token,
        user: PublicUser::from(&user),
    }))
}

// --- PIN lifecycle, two independent channels ---

/// Generate a fresh PIN, persist its hash+expiry on the channel (replacing any
/// prior challenge) and email the plaintext. Email failures propagate.
async fn issue_and_send_pin(
    state: &AppState,
    email: &str,
    channel: PinChannel,
) -> Result<(), ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::Validation("Enter your email".into()));
    }

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    let issued = pin::issue(state.config.pin_ttl_seconds)?;
    User::set_pin(&state.db, user.id, channel, &issued.hash, issued.expires_at).await?;

    match channel {
        PinChannel::Verification => {
            state
                .mailer
                .send_verification_pin(&user.email, &user.name, &issued.plaintext)
                .await?
        }
        PinChannel::Reset => {
            state
                .mailer
                .send_password_reset_pin(&user.email, &user.name, &issued.plaintext)
                .await?
        }
    }

    info!(user_id = %user.id, channel = ?channel, "pin issued and sent");
    Ok(())
}

/// Resend is clear-then-issue: a failure between the two steps leaves the
/// channel with no challenge, which the user recovers from by retrying.
async fn clear_and_resend_pin(
    state: &AppState,
    email: &str,
    channel: PinChannel,
) -> Result<(), ApiError> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(ApiError::Validation("Enter your email".into()));
    }
    let user = User::find_by_email(&state.db, &normalized)
        .await?
        .ok_or(ApiError::UserNotFound)?;
    User::clear_pin(&state.db, user.id, channel).await?;
    issue_and_send_pin(state, &normalized, channel).await
}

#[instrument(skip(state, payload))]
async fn send_verification_pin(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    issue_and_send_pin(&state, &payload.email, PinChannel::Verification).await?;
    Ok(Json(MessageResponse {
        message: "Verification PIN sent successfully.",
    }))
}

#[instrument(skip(state, payload))]
async fn resend_verification_pin(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    clear_and_resend_pin(&state, &payload.email, PinChannel::Verification).await?;
    Ok(Json(MessageResponse {
        message: "New verification PIN sent successfully.",
    }))
}

#[instrument(skip(state, payload))]
async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPinRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    pin::check(
        &payload.pin,
        user.verification_pin_hash.as_deref(),
        user.verification_pin_expires_at,
        OffsetDateTime::now_utc(),
    )?;

    // Single use: consume the challenge and mark the email verified
    User::consume_verification_pin(&state.db, user.id).await?;

    info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse {
        message: "PIN verified successfully.",
    }))
}

#[instrument(skip(state, payload))]
async fn send_reset_pin(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    issue_and_send_pin(&state, &payload.email, PinChannel::Reset).await?;
    Ok(Json(MessageResponse {
        message: "Password reset PIN sent successfully.",
    }))
}

#[instrument(skip(state, payload))]
async fn resend_reset_pin(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    clear_and_resend_pin(&state, &payload.email, PinChannel::Reset).await?;
    Ok(Json(MessageResponse {
        message: "New password reset PIN sent successfully.",
    }))
}

#[instrument(skip(state, payload))]
async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.pin.is_empty() || payload.new_password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide all required fields".into(),
        ));
    }

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    // Expired reset PINs are rejected the same way verification PINs are
    pin::check(
        &payload.pin,
        user.reset_pin_hash.as_deref(),
        user.reset_pin_expires_at,
        OffsetDateTime::now_utc(),
    )?;

    let hash = password::hash_secret(&payload.new_password)?;
    User::update_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password reset");
    Ok(Json(MessageResponse {
        message: "Password reset successful.",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_plain_addresses() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
    }

    #[test]
    fn email_regex_rejects_junk() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@x.com"));
        assert!(!is_valid_email("spaces in@x.com"));
    }
}
