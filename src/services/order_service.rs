use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, record},
    dto::orders::{OrderList, OrderWithLines, PlaceOrderRequest, SelectedLine},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderLine, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

use super::cart_service::recompute_counter;

#[derive(Debug, FromRow)]
struct CartProductRow {
    product_id: Uuid,
    cart_quantity: i32,
    sale_price: i64,
    stock: i32,
}

/// One cart line chosen for checkout, with the quantity actually consumed.
struct Consumption {
    product_id: Uuid,
    quantity: i32,
    cart_quantity: i32,
    unit_price: i64,
    stock: i32,
}

/// Match an explicit selection against the current cart lines. Full-cart
/// checkout passes `None` and consumes every line entirely.
fn resolve_selection(
    rows: &[CartProductRow],
    selected: Option<&[SelectedLine]>,
) -> AppResult<Vec<Consumption>> {
    let Some(selected) = selected else {
        return Ok(rows
            .iter()
            .map(|r| Consumption {
                product_id: r.product_id,
                quantity: r.cart_quantity,
                cart_quantity: r.cart_quantity,
                unit_price: r.sale_price,
                stock: r.stock,
            })
            .collect());
    };

    let mut out = Vec::with_capacity(selected.len());
    for line in selected {
        let row = rows
            .iter()
            .find(|r| r.product_id == line.product_id)
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "product {} is not in the cart",
                    line.product_id
                ))
            })?;
        if line.quantity <= 0 || line.quantity > row.cart_quantity {
            return Err(AppError::InvalidInput(format!(
                "invalid quantity for product {}",
                line.product_id
            )));
        }
        if out
            .iter()
            .any(|c: &Consumption| c.product_id == line.product_id)
        {
            return Err(AppError::InvalidInput(format!(
                "product {} selected twice",
                line.product_id
            )));
        }
        out.push(Consumption {
            product_id: row.product_id,
            quantity: line.quantity,
            cart_quantity: row.cart_quantity,
            unit_price: row.sale_price,
            stock: row.stock,
        });
    }
    Ok(out)
}

pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderWithLines>> {
    let mut txn = state.pool.begin().await?;

    let address: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM addresses WHERE id = $1 AND account_id = $2",
    )
    .bind(payload.address_id)
    .bind(user.account_id)
    .fetch_optional(&mut *txn)
    .await?;
    if address.is_none() {
        return Err(AppError::NotFound);
    }

    let cart: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM carts WHERE account_id = $1")
        .bind(user.account_id)
        .fetch_optional(&mut *txn)
        .await?;
    let Some((cart_id,)) = cart else {
        return Err(AppError::EmptyCart);
    };

    // Lock every product backing the cart for the rest of the transaction;
    // the stock check and decrement below must see a stable counter.
    let rows: Vec<CartProductRow> = sqlx::query_as(
        r#"
        SELECT cl.product_id, cl.quantity AS cart_quantity, p.sale_price, p.stock
        FROM cart_lines cl
        JOIN products p ON p.id = cl.product_id
        WHERE cl.cart_id = $1
        FOR UPDATE OF p
        "#,
    )
    .bind(cart_id)
    .fetch_all(&mut *txn)
    .await?;

    let consumed = resolve_selection(&rows, payload.lines.as_deref())?;
    if consumed.is_empty() {
        return Err(AppError::EmptyCart);
    }

    if consumed.iter().any(|c| c.stock < c.quantity) {
        return Err(AppError::OutOfStock);
    }

    let total_amount: i64 = consumed
        .iter()
        .map(|c| c.unit_price * c.quantity as i64)
        .sum();

    let order: Order = sqlx::query_as(
        r#"
        INSERT INTO orders (id, account_id, address_id, total_amount, status)
        VALUES ($1, $2, $3, $4, 'pending')
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.account_id)
    .bind(payload.address_id)
    .bind(total_amount)
    .fetch_one(&mut *txn)
    .await?;

    let mut lines = Vec::with_capacity(consumed.len());
    for c in &consumed {
        let line: OrderLine = sqlx::query_as(
            r#"
            INSERT INTO order_lines (id, order_id, product_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(c.product_id)
        .bind(c.quantity)
        .bind(c.unit_price)
        .fetch_one(&mut *txn)
        .await?;
        lines.push(line);

        sqlx::query(
            "UPDATE products SET stock = stock - $2, updated_at = now() WHERE id = $1",
        )
        .bind(c.product_id)
        .bind(c.quantity)
        .execute(&mut *txn)
        .await?;

        consume_cart_line(&mut txn, cart_id, c).await?;
    }

    recompute_counter(&mut txn, cart_id).await?;
    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::OrderPlaced,
        Some(serde_json::json!({ "order_id": order.id, "total": total_amount })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order placed",
        OrderWithLines { order, lines },
        Some(Meta::empty()),
    ))
}

async fn consume_cart_line(
    txn: &mut Transaction<'_, Postgres>,
    cart_id: Uuid,
    c: &Consumption,
) -> AppResult<()> {
    if c.quantity == c.cart_quantity {
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(c.product_id)
            .execute(&mut **txn)
            .await?;
    } else {
        sqlx::query(
            r#"
            UPDATE cart_lines SET quantity = quantity - $3, updated_at = now()
            WHERE cart_id = $1 AND product_id = $2
            "#,
        )
        .bind(cart_id)
        .bind(c.product_id)
        .bind(c.quantity)
        .execute(&mut **txn)
        .await?;
    }
    Ok(())
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<OrderWithLines>> {
    let mut txn = state.pool.begin().await?;

    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *txn)
        .await?;
    let order = match order {
        None => return Err(AppError::NotFound),
        Some(o) if o.account_id != user.account_id => return Err(AppError::Forbidden),
        Some(o) => o,
    };

    if order.status != OrderStatus::Pending {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: OrderStatus::Canceled,
        });
    }

    restore_stock(&mut txn, order.id).await?;

    let order: Order = sqlx::query_as(
        "UPDATE orders SET status = 'canceled', updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(order.id)
    .fetch_one(&mut *txn)
    .await?;

    let lines: Vec<OrderLine> =
        sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1")
            .bind(order.id)
            .fetch_all(&mut *txn)
            .await?;

    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::OrderCanceled,
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order canceled",
        OrderWithLines { order, lines },
        Some(Meta::empty()),
    ))
}

/// Put every quantity an order consumed back on the shelf.
pub(crate) async fn restore_stock(
    txn: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE products p
        SET stock = p.stock + ol.quantity, updated_at = now()
        FROM order_lines ol
        WHERE ol.order_id = $1 AND ol.product_id = p.id
        "#,
    )
    .bind(order_id)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let status = parse_status_filter(query.status.as_deref())?;

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sql = format!(
        "SELECT * FROM orders WHERE account_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY created_at {} LIMIT $3 OFFSET $4",
        sort_order.as_sql(),
    );

    let items: Vec<Order> = sqlx::query_as(&sql)
        .bind(user.account_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM orders WHERE account_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(user.account_id)
    .bind(status.map(|s| s.as_str()))
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Orders",
        OrderList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<OrderWithLines>> {
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&state.pool)
        .await?;
    let order = match order {
        None => return Err(AppError::NotFound),
        Some(o) if o.account_id != user.account_id => return Err(AppError::Forbidden),
        Some(o) => o,
    };

    let lines: Vec<OrderLine> =
        sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1")
            .bind(order.id)
            .fetch_all(&state.pool)
            .await?;

    Ok(ApiResponse::success(
        "OK",
        OrderWithLines { order, lines },
        Some(Meta::empty()),
    ))
}

pub(crate) fn parse_status_filter(raw: Option<&str>) -> AppResult<Option<OrderStatus>> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => OrderStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown status '{s}'"))),
    }
}
