use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, record},
    dto::{
        cart::{AddToCartRequest, CartCount, CartLineView, CartView, UpdateCartLineRequest},
        catalog::ProductView,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartLine},
    response::{ApiResponse, Meta},
    state::AppState,
};

use super::catalog_service::resolve_image_url;

/// Lock an active product row for the rest of the transaction.
/// Inactive and missing products are indistinguishable to the caller.
async fn lock_product(
    txn: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
) -> AppResult<(i32, i64)> {
    let row: Option<(i32, i64)> = sqlx::query_as(
        "SELECT stock, sale_price FROM products WHERE id = $1 AND is_active = TRUE FOR UPDATE",
    )
    .bind(product_id)
    .fetch_optional(&mut **txn)
    .await?;
    row.ok_or(AppError::NotFound)
}

async fn get_or_create_cart(
    txn: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
) -> AppResult<Cart> {
    let cart: Cart = sqlx::query_as(
        r#"
        INSERT INTO carts (id, account_id)
        VALUES ($1, $2)
        ON CONFLICT (account_id) DO UPDATE SET account_id = EXCLUDED.account_id
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .fetch_one(&mut **txn)
    .await?;
    Ok(cart)
}

async fn find_cart(
    txn: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
) -> AppResult<Cart> {
    let cart: Option<Cart> = sqlx::query_as("SELECT * FROM carts WHERE account_id = $1")
        .bind(account_id)
        .fetch_optional(&mut **txn)
        .await?;
    cart.ok_or(AppError::NotFound)
}

/// Keep the cart's total-quantity counter equal to the sum of its lines.
/// Every mutation ends with this, inside the same transaction.
pub(crate) async fn recompute_counter(
    txn: &mut Transaction<'_, Postgres>,
    cart_id: Uuid,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE carts
        SET total_quantity = COALESCE(
            (SELECT SUM(quantity)::int FROM cart_lines WHERE cart_id = $1), 0)
        WHERE id = $1
        "#,
    )
    .bind(cart_id)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartLine>> {
    if payload.quantity <= 0 {
        return Err(AppError::InvalidInput(
            "quantity must be greater than 0".into(),
        ));
    }

    let mut txn = state.pool.begin().await?;

    let (stock, _) = lock_product(&mut txn, payload.product_id).await?;
    let cart = get_or_create_cart(&mut txn, user.account_id).await?;

    let existing: Option<(i32,)> = sqlx::query_as(
        "SELECT quantity FROM cart_lines WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart.id)
    .bind(payload.product_id)
    .fetch_optional(&mut *txn)
    .await?;

    let already = existing.map(|(q,)| q).unwrap_or(0);
    if stock < already + payload.quantity {
        return Err(AppError::OutOfStock);
    }

    // Single-statement upsert; the product row lock above serializes
    // concurrent adds for the same product.
    let line: CartLine = sqlx::query_as(
        r#"
        INSERT INTO cart_lines (cart_id, product_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (cart_id, product_id)
        DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity, updated_at = now()
        RETURNING *
        "#,
    )
    .bind(cart.id)
    .bind(payload.product_id)
    .bind(payload.quantity)
    .fetch_one(&mut *txn)
    .await?;

    recompute_counter(&mut txn, cart.id).await?;
    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::CartChange,
        Some(serde_json::json!({
            "product_id": payload.product_id,
            "quantity": payload.quantity,
            "op": "add",
        })),
    )
    .await;

    Ok(ApiResponse::success("Added to cart", line, None))
}

pub async fn update_line(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartLineRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if payload.quantity < 0 {
        return Err(AppError::InvalidInput("quantity must not be negative".into()));
    }
    if payload.quantity == 0 {
        return remove_line(state, user, product_id).await;
    }

    let mut txn = state.pool.begin().await?;

    let cart = find_cart(&mut txn, user.account_id).await?;
    let (stock, _) = lock_product(&mut txn, product_id).await?;
    if stock < payload.quantity {
        return Err(AppError::OutOfStock);
    }

    let updated = sqlx::query(
        r#"
        UPDATE cart_lines SET quantity = $3, updated_at = now()
        WHERE cart_id = $1 AND product_id = $2
        "#,
    )
    .bind(cart.id)
    .bind(product_id)
    .bind(payload.quantity)
    .execute(&mut *txn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    recompute_counter(&mut txn, cart.id).await?;
    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::CartChange,
        Some(serde_json::json!({
            "product_id": product_id,
            "quantity": payload.quantity,
            "op": "update",
        })),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart updated",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn remove_line(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let mut txn = state.pool.begin().await?;

    let cart = find_cart(&mut txn, user.account_id).await?;

    let deleted = sqlx::query(
        "DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart.id)
    .bind(product_id)
    .execute(&mut *txn)
    .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    recompute_counter(&mut txn, cart.id).await?;
    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::CartChange,
        Some(serde_json::json!({ "product_id": product_id, "op": "remove" })),
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let mut txn = state.pool.begin().await?;

    let cart = find_cart(&mut txn, user.account_id).await?;

    sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
        .bind(cart.id)
        .execute(&mut *txn)
        .await?;
    sqlx::query("UPDATE carts SET total_quantity = 0 WHERE id = $1")
        .bind(cart.id)
        .execute(&mut *txn)
        .await?;

    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::CartChange,
        Some(serde_json::json!({ "op": "clear" })),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

#[derive(FromRow)]
struct CartLineRow {
    product_id: Uuid,
    quantity: i32,
    name: String,
    category: String,
    brand: Option<String>,
    sale_price: i64,
    description: Option<String>,
    stock: i32,
    image: Option<String>,
}

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartView>> {
    let cart: Option<Cart> = sqlx::query_as("SELECT * FROM carts WHERE account_id = $1")
        .bind(user.account_id)
        .fetch_optional(&state.pool)
        .await?;

    let Some(cart) = cart else {
        return Ok(ApiResponse::success(
            "OK",
            CartView {
                items: Vec::new(),
                total_quantity: 0,
                total_amount: 0,
            },
            Some(Meta::empty()),
        ));
    };

    let rows: Vec<CartLineRow> = sqlx::query_as(
        r#"
        SELECT cl.product_id, cl.quantity,
               p.name, c.name AS category, p.brand, p.sale_price, p.description, p.stock, p.image
        FROM cart_lines cl
        JOIN products p ON p.id = cl.product_id
        JOIN categories c ON c.id = p.category_id
        WHERE cl.cart_id = $1
        ORDER BY cl.updated_at DESC
        "#,
    )
    .bind(cart.id)
    .fetch_all(&state.pool)
    .await?;

    let base = &state.config.media_base_url;
    let mut total_amount = 0i64;
    let items: Vec<CartLineView> = rows
        .into_iter()
        .map(|row| {
            total_amount += row.sale_price * row.quantity as i64;
            CartLineView {
                product: ProductView {
                    id: row.product_id,
                    name: row.name,
                    category: row.category,
                    brand: row.brand,
                    price: row.sale_price,
                    description: row.description,
                    stock: row.stock,
                    image_url: resolve_image_url(base, row.image.as_deref()),
                },
                quantity: row.quantity,
            }
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        CartView {
            items,
            total_quantity: cart.total_quantity,
            total_amount,
        },
        Some(Meta::empty()),
    ))
}

pub async fn cart_count(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartCount>> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(cl.quantity), 0)
        FROM cart_lines cl
        JOIN carts c ON c.id = cl.cart_id
        WHERE c.account_id = $1
        "#,
    )
    .bind(user.account_id)
    .fetch_optional(&state.pool)
    .await?;

    let (lines, total_quantity) = row.unwrap_or((0, 0));
    Ok(ApiResponse::success(
        "OK",
        CartCount {
            lines,
            total_quantity,
        },
        None,
    ))
}
