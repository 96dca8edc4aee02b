use uuid::Uuid;

use crate::{
    audit::{AuditAction, record},
    dto::account::{AddressList, AddressRequest, ProfileResponse, UpdateProfileRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Account, Address, Credential},
    response::{ApiResponse, Meta},
    state::AppState,
};

const MAX_ADDRESSES: i64 = 5;

pub async fn get_profile(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<ProfileResponse>> {
    let account: Option<Account> = sqlx::query_as("SELECT * FROM accounts WHERE id = $1")
        .bind(user.account_id)
        .fetch_optional(&state.pool)
        .await?;
    let account = account.ok_or(AppError::NotFound)?;

    let credential: Credential =
        sqlx::query_as("SELECT * FROM credentials WHERE account_id = $1")
            .bind(user.account_id)
            .fetch_one(&state.pool)
            .await?;

    Ok(ApiResponse::success(
        "OK",
        ProfileResponse {
            account,
            username: credential.username,
            email: credential.email,
        },
        Some(Meta::empty()),
    ))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<Account>> {
    let existing: Option<Account> = sqlx::query_as("SELECT * FROM accounts WHERE id = $1")
        .bind(user.account_id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = existing.ok_or(AppError::NotFound)?;

    let first_name = payload.first_name.unwrap_or(existing.first_name);
    let last_name = payload.last_name.unwrap_or(existing.last_name);
    let birth_date = payload.birth_date.or(existing.birth_date);
    let gender = payload.gender.or(existing.gender);
    let phone = payload.phone.or(existing.phone);
    let home_address = payload.home_address.or(existing.home_address);

    let account: Account = sqlx::query_as(
        r#"
        UPDATE accounts
        SET first_name = $2, last_name = $3, birth_date = $4, gender = $5,
            phone = $6, home_address = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user.account_id)
    .bind(&first_name)
    .bind(&last_name)
    .bind(birth_date)
    .bind(&gender)
    .bind(&phone)
    .bind(&home_address)
    .fetch_one(&state.pool)
    .await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::ProfileUpdate,
        None,
    )
    .await;

    Ok(ApiResponse::success("Profile updated", account, Some(Meta::empty())))
}

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items: Vec<Address> = sqlx::query_as(
        "SELECT * FROM addresses WHERE account_id = $1 ORDER BY is_default DESC, id",
    )
    .bind(user.account_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success("OK", AddressList { items }, Some(Meta::empty())))
}

pub async fn add_address(
    state: &AppState,
    user: &AuthUser,
    payload: AddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let mut txn = state.pool.begin().await?;

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM addresses WHERE account_id = $1")
            .bind(user.account_id)
            .fetch_one(&mut *txn)
            .await?;
    if count >= MAX_ADDRESSES {
        return Err(AppError::AddressLimitExceeded);
    }

    // The first address is always the default; otherwise honor the request,
    // clearing the previous default first.
    let make_default = payload.is_default || count == 0;
    if make_default {
        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE account_id = $1")
            .bind(user.account_id)
            .execute(&mut *txn)
            .await?;
    }

    let address: Address = sqlx::query_as(
        r#"
        INSERT INTO addresses (id, account_id, recipient, phone, street, district, province, is_default)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.account_id)
    .bind(&payload.recipient)
    .bind(&payload.phone)
    .bind(&payload.street)
    .bind(&payload.district)
    .bind(&payload.province)
    .bind(make_default)
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::AddressChange,
        Some(serde_json::json!({ "address_id": address.id, "op": "add" })),
    )
    .await;

    Ok(ApiResponse::success("Address added", address, Some(Meta::empty())))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    address_id: Uuid,
    payload: AddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let mut txn = state.pool.begin().await?;

    let existing = fetch_owned(&mut txn, address_id, user.account_id).await?;

    if payload.is_default {
        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE account_id = $1")
            .bind(user.account_id)
            .execute(&mut *txn)
            .await?;
    }
    // Unsetting the default directly is not allowed; the flag moves only
    // when another address claims it.
    let is_default = payload.is_default || existing.is_default;

    let address: Address = sqlx::query_as(
        r#"
        UPDATE addresses
        SET recipient = $2, phone = $3, street = $4, district = $5, province = $6, is_default = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(address_id)
    .bind(&payload.recipient)
    .bind(&payload.phone)
    .bind(&payload.street)
    .bind(&payload.district)
    .bind(&payload.province)
    .bind(is_default)
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::AddressChange,
        Some(serde_json::json!({ "address_id": address.id, "op": "update" })),
    )
    .await;

    Ok(ApiResponse::success("Address updated", address, Some(Meta::empty())))
}

pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    address_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let mut txn = state.pool.begin().await?;

    let existing = fetch_owned(&mut txn, address_id, user.account_id).await?;

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM addresses WHERE account_id = $1")
            .bind(user.account_id)
            .fetch_one(&mut *txn)
            .await?;
    if count <= 1 {
        return Err(AppError::LastAddress);
    }

    sqlx::query("DELETE FROM addresses WHERE id = $1")
        .bind(address_id)
        .execute(&mut *txn)
        .await?;

    // Never leave the remaining addresses without a default.
    if existing.is_default {
        sqlx::query(
            r#"
            UPDATE addresses SET is_default = TRUE
            WHERE id = (SELECT id FROM addresses WHERE account_id = $1 ORDER BY id LIMIT 1)
            "#,
        )
        .bind(user.account_id)
        .execute(&mut *txn)
        .await?;
    }

    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::AddressChange,
        Some(serde_json::json!({ "address_id": address_id, "op": "delete" })),
    )
    .await;

    Ok(ApiResponse::success(
        "Address deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn fetch_owned(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    address_id: Uuid,
    account_id: Uuid,
) -> AppResult<Address> {
    let address: Option<Address> =
        sqlx::query_as("SELECT * FROM addresses WHERE id = $1 FOR UPDATE")
            .bind(address_id)
            .fetch_optional(&mut **txn)
            .await?;

    match address {
        None => Err(AppError::NotFound),
        Some(a) if a.account_id != account_id => Err(AppError::Forbidden),
        Some(a) => Ok(a),
    }
}
