use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, record},
    dto::auth::{
        ChangePasswordRequest, Claims, LoginRequest, LoginResponse, RegisterRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Account, Credential},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub async fn register(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<Account>> {
    if payload.username.trim().is_empty() {
        return Err(AppError::InvalidInput("username is required".into()));
    }
    if payload.password.len() < 6 {
        return Err(AppError::InvalidInput(
            "password must be at least 6 characters".into(),
        ));
    }

    let taken: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM credentials WHERE username = $1")
            .bind(payload.username.trim())
            .fetch_optional(&state.pool)
            .await?;
    if taken.is_some() {
        return Err(AppError::DuplicateUsername);
    }

    let password_hash = hash_password(&payload.password)?;

    let mut txn = state.pool.begin().await?;

    let account: Account = sqlx::query_as(
        r#"
        INSERT INTO accounts (id, first_name, last_name, birth_date, gender, national_id, phone, home_address)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(payload.birth_date)
    .bind(&payload.gender)
    .bind(&payload.national_id)
    .bind(&payload.phone)
    .bind(&payload.home_address)
    .fetch_one(&mut *txn)
    .await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO credentials (id, account_id, username, password_hash, email)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account.id)
    .bind(payload.username.trim())
    .bind(&password_hash)
    .bind(&payload.email)
    .execute(&mut *txn)
    .await;

    // A concurrent registration can still slip past the pre-check.
    if let Err(err) = inserted {
        if err
            .as_database_error()
            .is_some_and(|e| e.is_unique_violation())
        {
            return Err(AppError::DuplicateUsername);
        }
        return Err(err.into());
    }

    txn.commit().await?;

    record(
        &state.pool,
        Some(account.id),
        AuditAction::Register,
        Some(serde_json::json!({ "account_id": account.id })),
    )
    .await;

    Ok(ApiResponse::success("Account created", account, None))
}

pub async fn login(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let credential: Option<Credential> =
        sqlx::query_as("SELECT * FROM credentials WHERE username = $1")
            .bind(payload.username.trim())
            .fetch_optional(&state.pool)
            .await?;

    let credential = match credential {
        Some(c) if c.is_active => c,
        _ => return Err(AppError::InvalidCredentials),
    };

    if !verify_password(&payload.password, &credential.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let token = issue_token(credential.account_id, &credential.role)?;

    record(
        &state.pool,
        Some(credential.account_id),
        AuditAction::Login,
        Some(serde_json::json!({ "username": credential.username })),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token: format!("Bearer {token}"),
        },
        Some(Meta::empty()),
    ))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if payload.new_password.len() < 6 {
        return Err(AppError::InvalidInput(
            "password must be at least 6 characters".into(),
        ));
    }

    let credential: Option<Credential> =
        sqlx::query_as("SELECT * FROM credentials WHERE account_id = $1")
            .bind(user.account_id)
            .fetch_optional(&state.pool)
            .await?;

    let credential = match credential {
        Some(c) if c.is_active => c,
        _ => return Err(AppError::InvalidCredentials),
    };

    if !verify_password(&payload.current_password, &credential.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let new_hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE credentials SET password_hash = $2 WHERE id = $1")
        .bind(credential.id)
        .bind(&new_hash)
        .execute(&state.pool)
        .await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::PasswordChange,
        None,
    )
    .await;

    Ok(ApiResponse::success(
        "Password changed",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn issue_token(account_id: Uuid, role: &str) -> AppResult<String> {
    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(24))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: account_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}
