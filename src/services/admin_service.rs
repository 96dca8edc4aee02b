use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, record},
    dto::admin::{
        AdminOrderDetail, CategoryRequest, CreateProductRequest, CustomerList,
        CustomerSummary, InventoryAdjustRequest, ProductList, UpdateOrderStatusRequest,
        UpdateProductRequest,
    },
    dto::orders::OrderList,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Category, Order, OrderLine, OrderStatus, Product},
    response::{ApiResponse, Meta},
    routes::params::{
        AdminProductQuery, CustomerListQuery, LowStockQuery, OrderListQuery, ProductSortBy,
        SortOrder,
    },
    state::AppState,
};

use super::order_service::{parse_status_filter, restore_stock};

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.sale_price < 0 || payload.cost < 0 || payload.wholesale_price < 0 {
        return Err(AppError::InvalidInput("prices must not be negative".into()));
    }
    if payload.stock < 0 {
        return Err(AppError::InvalidInput("stock must not be negative".into()));
    }

    let category: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM categories WHERE id = $1")
        .bind(payload.category_id)
        .fetch_optional(&state.pool)
        .await?;
    if category.is_none() {
        return Err(AppError::InvalidInput("unknown category".into()));
    }

    let product: Product = sqlx::query_as(
        r#"
        INSERT INTO products
            (id, category_id, name, cost, wholesale_price, sale_price, stock, brand, description, image)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.category_id)
    .bind(&payload.name)
    .bind(payload.cost)
    .bind(payload.wholesale_price)
    .bind(payload.sale_price)
    .bind(payload.stock)
    .bind(&payload.brand)
    .bind(&payload.description)
    .bind(&payload.image)
    .fetch_one(&state.pool)
    .await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::ProductChange,
        Some(serde_json::json!({ "product_id": product.id, "op": "create" })),
    )
    .await;

    Ok(ApiResponse::success("Product created", product, Some(Meta::empty())))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;

    let existing: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = existing.ok_or(AppError::NotFound)?;

    if let Some(category_id) = payload.category_id {
        let category: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM categories WHERE id = $1")
                .bind(category_id)
                .fetch_optional(&state.pool)
                .await?;
        if category.is_none() {
            return Err(AppError::InvalidInput("unknown category".into()));
        }
    }

    let stock = payload.stock.unwrap_or(existing.stock);
    if stock < 0 {
        return Err(AppError::InvalidInput("stock must not be negative".into()));
    }

    let product: Product = sqlx::query_as(
        r#"
        UPDATE products
        SET category_id = $2, name = $3, cost = $4, wholesale_price = $5, sale_price = $6,
            stock = $7, brand = $8, description = $9, image = $10, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.category_id.unwrap_or(existing.category_id))
    .bind(payload.name.unwrap_or(existing.name))
    .bind(payload.cost.unwrap_or(existing.cost))
    .bind(payload.wholesale_price.unwrap_or(existing.wholesale_price))
    .bind(payload.sale_price.unwrap_or(existing.sale_price))
    .bind(stock)
    .bind(payload.brand.or(existing.brand))
    .bind(payload.description.or(existing.description))
    .bind(payload.image.or(existing.image))
    .fetch_one(&state.pool)
    .await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::ProductChange,
        Some(serde_json::json!({ "product_id": product.id, "op": "update" })),
    )
    .await;

    Ok(ApiResponse::success("Product updated", product, Some(Meta::empty())))
}

/// Soft delete: the row stays for order history, the storefront stops
/// listing it.
pub async fn deactivate_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let result = sqlx::query(
        "UPDATE products SET is_active = FALSE, updated_at = now() WHERE id = $1 AND is_active = TRUE",
    )
    .bind(id)
    .execute(&state.pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::ProductChange,
        Some(serde_json::json!({ "product_id": id, "op": "deactivate" })),
    )
    .await;

    Ok(ApiResponse::success(
        "Product deactivated",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_products(
    state: &AppState,
    user: &AuthUser,
    query: AdminProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.product.pagination.normalize();

    let search = query.product.q.as_deref().filter(|s| !s.trim().is_empty());
    let include_inactive = query.include_inactive.unwrap_or(false);
    let sort_by = query.product.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.product.sort_order.unwrap_or(SortOrder::Desc);

    let filter = r#"
        FROM products p
        WHERE ($1::bool OR p.is_active = TRUE)
          AND ($2::text IS NULL OR p.name ILIKE '%' || $2 || '%'
               OR COALESCE(p.brand, '') ILIKE '%' || $2 || '%')
          AND ($3::uuid IS NULL OR p.category_id = $3)
          AND ($4::bigint IS NULL OR p.sale_price >= $4)
          AND ($5::bigint IS NULL OR p.sale_price <= $5)
    "#;

    let sql = format!(
        "SELECT p.* {filter} ORDER BY {} {} LIMIT $6 OFFSET $7",
        sort_by.as_sql(),
        sort_order.as_sql(),
    );

    let items: Vec<Product> = sqlx::query_as(&sql)
        .bind(include_inactive)
        .bind(search)
        .bind(query.product.category_id)
        .bind(query.product.min_price)
        .bind(query.product.max_price)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let count_sql = format!("SELECT COUNT(*) {filter}");
    let (total,): (i64,) = sqlx::query_as(&count_sql)
        .bind(include_inactive)
        .bind(search)
        .bind(query.product.category_id)
        .bind(query.product.min_price)
        .bind(query.product.max_price)
        .fetch_one(&state.pool)
        .await?;

    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    if payload.name.trim().is_empty() {
        return Err(AppError::InvalidInput("category name is required".into()));
    }

    let category: Option<Category> = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, description)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .fetch_optional(&state.pool)
    .await?;

    let category = category.ok_or_else(|| {
        AppError::InvalidInput("a category with this name already exists".into())
    })?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::CategoryChange,
        Some(serde_json::json!({ "category_id": category.id, "op": "create" })),
    )
    .await;

    Ok(ApiResponse::success("Category created", category, Some(Meta::empty())))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;

    let category: Option<Category> = sqlx::query_as(
        "UPDATE categories SET name = $2, description = $3 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(payload.name.trim())
    .bind(&payload.description)
    .fetch_optional(&state.pool)
    .await?;
    let category = category.ok_or(AppError::NotFound)?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::CategoryChange,
        Some(serde_json::json!({ "category_id": category.id, "op": "update" })),
    )
    .await;

    Ok(ApiResponse::success("Category updated", category, Some(Meta::empty())))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();
    let status = parse_status_filter(query.status.as_deref())?;
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let sql = format!(
        "SELECT * FROM orders WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at {} LIMIT $2 OFFSET $3",
        sort_order.as_sql(),
    );

    let items: Vec<Order> = sqlx::query_as(&sql)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)",
    )
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
    id: Uuid,
) -> AppResult<ApiResponse<AdminOrderDetail>> {
    ensure_admin(user)?;

    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let order = order.ok_or(AppError::NotFound)?;

    let lines: Vec<OrderLine> =
        sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1")
            .bind(order.id)
            .fetch_all(&state.pool)
            .await?;

    let (buyer_name, buyer_phone): (String, Option<String>) = sqlx::query_as(
        "SELECT first_name || ' ' || last_name, phone FROM accounts WHERE id = $1",
    )
    .bind(order.account_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Order found",
        AdminOrderDetail {
            order,
            lines,
            buyer_name,
            buyer_phone,
        },
        Some(Meta::empty()),
    ))
}

/// Guarded transition: pending -> shipped -> delivered, pending -> canceled.
/// Canceling restores stock, exactly as a user cancellation does.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let mut txn = state.pool.begin().await?;

    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *txn)
        .await?;
    let order = order.ok_or(AppError::NotFound)?;

    if !order.status.can_transition(payload.status) {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: payload.status,
        });
    }

    if payload.status == OrderStatus::Canceled {
        restore_stock(&mut txn, order.id).await?;
    }

    let order: Order = sqlx::query_as(
        "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(order.id)
    .bind(payload.status.as_str())
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::OrderStatusChange,
        Some(serde_json::json!({ "order_id": order.id, "status": order.status.as_str() })),
    )
    .await;

    Ok(ApiResponse::success("Order updated", order, Some(Meta::empty())))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::InvalidInput("delta must not be 0".into()));
    }

    let mut txn = state.pool.begin().await?;

    let product: Option<Product> =
        sqlx::query_as("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *txn)
            .await?;
    let product = product.ok_or(AppError::NotFound)?;

    let new_stock = product.stock + payload.delta;
    if new_stock < 0 {
        return Err(AppError::InvalidInput("stock cannot go negative".into()));
    }

    let updated: Product = sqlx::query_as(
        "UPDATE products SET stock = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(product.id)
    .bind(new_stock)
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    record(
        &state.pool,
        Some(user.account_id),
        AuditAction::InventoryAdjust,
        Some(serde_json::json!({ "product_id": updated.id, "delta": payload.delta })),
    )
    .await;

    Ok(ApiResponse::success("Inventory updated", updated, Some(Meta::empty())))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination.normalize();

    let items: Vec<Product> = sqlx::query_as(
        r#"
        SELECT * FROM products
        WHERE is_active = TRUE AND stock <= $1
        ORDER BY stock ASC, created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(threshold)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM products WHERE is_active = TRUE AND stock <= $1",
    )
    .bind(threshold)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Low stock",
        ProductList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn list_customers(
    state: &AppState,
    user: &AuthUser,
    query: CustomerListQuery,
) -> AppResult<ApiResponse<CustomerList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();
    let search = query.q.as_deref().filter(|s| !s.trim().is_empty());

    #[derive(FromRow)]
    struct Row {
        account_id: Uuid,
        name: String,
        username: String,
        phone: Option<String>,
        order_count: i64,
        total_spent: i64,
    }

    // Spend only counts revenue-realized orders (shipped or delivered).
    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT a.id AS account_id,
               a.first_name || ' ' || a.last_name AS name,
               cr.username,
               a.phone,
               COUNT(o.id) AS order_count,
               COALESCE(SUM(o.total_amount) FILTER (WHERE o.status IN ('shipped', 'delivered')), 0)::bigint AS total_spent
        FROM accounts a
        JOIN credentials cr ON cr.account_id = a.id
        LEFT JOIN orders o ON o.account_id = a.id
        WHERE cr.role = 'customer'
          AND ($1::text IS NULL OR a.first_name ILIKE '%' || $1 || '%'
               OR a.last_name ILIKE '%' || $1 || '%'
               OR cr.username ILIKE '%' || $1 || '%')
        GROUP BY a.id, a.first_name, a.last_name, cr.username, a.phone
        ORDER BY total_spent DESC, a.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(search)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM accounts a
        JOIN credentials cr ON cr.account_id = a.id
        WHERE cr.role = 'customer'
          AND ($1::text IS NULL OR a.first_name ILIKE '%' || $1 || '%'
               OR a.last_name ILIKE '%' || $1 || '%'
               OR cr.username ILIKE '%' || $1 || '%')
        "#,
    )
    .bind(search)
    .fetch_one(&state.pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|r| CustomerSummary {
            account_id: r.account_id,
            name: r.name,
            username: r.username,
            phone: r.phone,
            order_count: r.order_count,
            total_spent: r.total_spent,
        })
        .collect();

    Ok(ApiResponse::success(
        "Customers",
        CustomerList { items },
        Some(Meta::new(page, limit, total)),
    ))
}
