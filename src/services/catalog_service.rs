use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    dto::catalog::{CategoryList, CategoryWithCount, ProductView, ProductViewList},
    error::{AppError, AppResult},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

#[derive(FromRow)]
pub(crate) struct ProductDisplayRow {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub brand: Option<String>,
    pub sale_price: i64,
    pub description: Option<String>,
    pub stock: i32,
    pub image: Option<String>,
}

/// Resolve a stored image reference against the configured media host.
/// Absolute URLs pass through untouched.
pub fn resolve_image_url(base: &str, image: Option<&str>) -> Option<String> {
    let image = image?;
    if image.starts_with("http://") || image.starts_with("https://") {
        return Some(image.to_string());
    }
    Some(format!("{}/{}", base.trim_end_matches('/'), image))
}

pub(crate) fn display_row_to_view(base: &str, row: ProductDisplayRow) -> ProductView {
    let image_url = resolve_image_url(base, row.image.as_deref());
    ProductView {
        id: row.id,
        name: row.name,
        category: row.category,
        brand: row.brand,
        price: row.sale_price,
        description: row.description,
        stock: row.stock,
        image_url,
    }
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductViewList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let search = query.q.as_deref().filter(|s| !s.trim().is_empty());
    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let filter = r#"
        FROM products p
        JOIN categories c ON c.id = p.category_id
        WHERE p.is_active = TRUE
          AND ($1::text IS NULL OR p.name ILIKE '%' || $1 || '%'
               OR COALESCE(p.brand, '') ILIKE '%' || $1 || '%')
          AND ($2::uuid IS NULL OR p.category_id = $2)
          AND ($3::bigint IS NULL OR p.sale_price >= $3)
          AND ($4::bigint IS NULL OR p.sale_price <= $4)
    "#;

    // Sort columns come from the enum, never from the raw query string.
    let sql = format!(
        "SELECT p.id, p.name, c.name AS category, p.brand, p.sale_price, p.description, p.stock, p.image \
         {filter} ORDER BY {} {} LIMIT $5 OFFSET $6",
        sort_by.as_sql(),
        sort_order.as_sql(),
    );

    let rows: Vec<ProductDisplayRow> = sqlx::query_as(&sql)
        .bind(search)
        .bind(query.category_id)
        .bind(query.min_price)
        .bind(query.max_price)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let count_sql = format!("SELECT COUNT(*) {filter}");
    let (total,): (i64,) = sqlx::query_as(&count_sql)
        .bind(search)
        .bind(query.category_id)
        .bind(query.min_price)
        .bind(query.max_price)
        .fetch_one(&state.pool)
        .await?;

    let base = state.config.media_base_url.clone();
    let items = rows
        .into_iter()
        .map(|row| display_row_to_view(&base, row))
        .collect();

    Ok(ApiResponse::success(
        "Products",
        ProductViewList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_product(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<ProductView>> {
    let row: Option<ProductDisplayRow> = sqlx::query_as(
        r#"
        SELECT p.id, p.name, c.name AS category, p.brand, p.sale_price, p.description, p.stock, p.image
        FROM products p
        JOIN categories c ON c.id = p.category_id
        WHERE p.id = $1 AND p.is_active = TRUE
        "#,
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let row = row.ok_or(AppError::NotFound)?;
    let view = display_row_to_view(&state.config.media_base_url, row);

    Ok(ApiResponse::success("Product", view, None))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    #[derive(FromRow)]
    struct Row {
        id: Uuid,
        name: String,
        description: Option<String>,
        product_count: i64,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT c.id, c.name, c.description,
               COUNT(p.id) FILTER (WHERE p.is_active) AS product_count
        FROM categories c
        LEFT JOIN products p ON p.category_id = c.id
        GROUP BY c.id, c.name, c.description
        ORDER BY c.name
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|r| CategoryWithCount {
            id: r.id,
            name: r.name,
            description: r.description,
            product_count: r.product_count,
        })
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}
