use uuid::Uuid;

use petshop_api::{
    config::AppConfig,
    db::create_pool,
    dto::{
        account::AddressRequest,
        admin::{
            CategoryRequest, CreateProductRequest, InventoryAdjustRequest,
            UpdateOrderStatusRequest, UpdateProductRequest,
        },
        auth::RegisterRequest,
        cart::AddToCartRequest,
        orders::PlaceOrderRequest,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::OrderStatus,
    routes::params::{
        AdminProductQuery, CustomerListQuery, LowStockQuery, Pagination, ProductQuery,
        RecentOrdersQuery, SalesChartQuery,
    },
    services::{
        account_service, admin_service, auth_service, cart_service, catalog_service,
        order_service, report_service,
    },
    state::AppState,
};

// Back-office flow: product lifecycle, guarded status transitions,
// inventory, dashboard statistics.
#[tokio::test]
async fn admin_manages_products_orders_and_reports() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        eprintln!(
            "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
        );
        return Ok(());
    };

    let admin = create_user(&state, "root", "admin").await?;
    let customer = create_user(&state, "carol", "customer").await?;

    // Role guard sits in front of every admin operation.
    let denied = admin_service::create_category(
        &state,
        &customer,
        CategoryRequest {
            name: "Nope".into(),
            description: None,
        },
    )
    .await;
    assert!(matches!(denied, Err(AppError::Forbidden)));

    // Category + product lifecycle.
    let category = admin_service::create_category(
        &state,
        &admin,
        CategoryRequest {
            name: "Cat Supplies".into(),
            description: Some("Food and toys".into()),
        },
    )
    .await?
    .data
    .expect("category");

    let duplicate = admin_service::create_category(
        &state,
        &admin,
        CategoryRequest {
            name: "Cat Supplies".into(),
            description: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::InvalidInput(_))));

    let product = admin_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            category_id: category.id,
            name: "Salmon Cat Food".into(),
            cost: 180_000,
            wholesale_price: 210_000,
            sale_price: 280_000,
            stock: 10,
            brand: Some("Whiskerly".into()),
            description: None,
            image: Some("salmon.jpg".into()),
        },
    )
    .await?
    .data
    .expect("product");

    let product = admin_service::update_product(
        &state,
        &admin,
        product.id,
        UpdateProductRequest {
            sale_price: Some(300_000),
            ..empty_update()
        },
    )
    .await?
    .data
    .expect("product");
    assert_eq!(product.sale_price, 300_000);

    // Customer buys two units before the product is touched further.
    let address = account_service::add_address(
        &state,
        &customer,
        AddressRequest {
            recipient: "Carol".into(),
            phone: "0911111111".into(),
            street: "5 Elm".into(),
            district: "D3".into(),
            province: "HCMC".into(),
            is_default: true,
        },
    )
    .await?
    .data
    .expect("address");

    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;
    let order = order_service::place_order(
        &state,
        &customer,
        PlaceOrderRequest {
            address_id: address.id,
            lines: None,
        },
    )
    .await?
    .data
    .expect("order")
    .order;
    assert_eq!(order.total_amount, 600_000);
    assert_eq!(stock_of(&state, product.id).await?, 8);

    // Status machine: no jumps, no rewinds.
    let jump = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Delivered,
        },
    )
    .await;
    assert!(matches!(jump, Err(AppError::InvalidTransition { .. })));

    let order = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Shipped,
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(order.status, OrderStatus::Shipped);

    let rewind = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Pending,
        },
    )
    .await;
    assert!(matches!(rewind, Err(AppError::InvalidTransition { .. })));

    let order = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Delivered,
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(order.status, OrderStatus::Delivered);

    let from_terminal = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Canceled,
        },
    )
    .await;
    assert!(matches!(from_terminal, Err(AppError::InvalidTransition { .. })));

    // Admin cancellation of a pending order restores stock.
    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 3,
        },
    )
    .await?;
    let pending = order_service::place_order(
        &state,
        &customer,
        PlaceOrderRequest {
            address_id: address.id,
            lines: None,
        },
    )
    .await?
    .data
    .expect("order")
    .order;
    assert_eq!(stock_of(&state, product.id).await?, 5);

    admin_service::update_order_status(
        &state,
        &admin,
        pending.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Canceled,
        },
    )
    .await?;
    assert_eq!(stock_of(&state, product.id).await?, 8);

    // Dashboard: only the delivered order is realized revenue.
    let overview = report_service::dashboard_overview(&state, &admin)
        .await?
        .data
        .expect("overview");
    assert_eq!(overview.orders.total, 2);
    assert_eq!(overview.orders.delivered, 1);
    assert_eq!(overview.orders.canceled, 1);
    assert_eq!(overview.revenue.this_month, 600_000);
    assert_eq!(overview.customers, 1);
    assert_eq!(overview.products.total, 1);
    assert_eq!(overview.products.low_stock, 1);

    let chart = report_service::sales_chart(
        &state,
        &admin,
        SalesChartQuery {
            period: Some("7".into()),
        },
    )
    .await?
    .data
    .expect("chart");
    assert_eq!(chart.values.iter().sum::<i64>(), 600_000);

    let bad_period = report_service::sales_chart(
        &state,
        &admin,
        SalesChartQuery {
            period: Some("365".into()),
        },
    )
    .await;
    assert!(matches!(bad_period, Err(AppError::InvalidInput(_))));

    let recent = report_service::recent_orders(
        &state,
        &admin,
        RecentOrdersQuery { limit: None },
    )
    .await?
    .data
    .expect("recent");
    assert_eq!(recent.items.len(), 2);
    assert!(recent.items.iter().all(|o| o.buyer_name.contains("Carol")));

    // Inventory.
    let low = admin_service::list_low_stock(
        &state,
        &admin,
        LowStockQuery {
            pagination: Pagination {
                page: None,
                per_page: None,
            },
            threshold: Some(100),
        },
    )
    .await?
    .data
    .expect("low stock");
    assert!(low.items.iter().any(|p| p.id == product.id));

    let drained = admin_service::adjust_inventory(
        &state,
        &admin,
        product.id,
        InventoryAdjustRequest { delta: -8 },
    )
    .await?
    .data
    .expect("product");
    assert_eq!(drained.stock, 0);

    let below_zero = admin_service::adjust_inventory(
        &state,
        &admin,
        product.id,
        InventoryAdjustRequest { delta: -1 },
    )
    .await;
    assert!(matches!(below_zero, Err(AppError::InvalidInput(_))));

    // Soft delete hides the product from the storefront but keeps the row.
    admin_service::deactivate_product(&state, &admin, product.id).await?;
    let hidden = catalog_service::get_product(&state, product.id).await;
    assert!(matches!(hidden, Err(AppError::NotFound)));

    let all = admin_service::list_products(
        &state,
        &admin,
        AdminProductQuery {
            product: ProductQuery {
                pagination: Pagination {
                    page: None,
                    per_page: None,
                },
                q: None,
                category_id: None,
                min_price: None,
                max_price: None,
                sort_by: None,
                sort_order: None,
            },
            include_inactive: Some(true),
        },
    )
    .await?
    .data
    .expect("products");
    assert!(all.items.iter().any(|p| p.id == product.id && !p.is_active));

    // Customer segmentation counts realized spend only.
    let customers = admin_service::list_customers(
        &state,
        &admin,
        CustomerListQuery {
            pagination: Pagination {
                page: None,
                per_page: None,
            },
            q: None,
        },
    )
    .await?
    .data
    .expect("customers");
    let carol = customers
        .items
        .iter()
        .find(|c| c.username == "carol")
        .expect("carol row");
    assert_eq!(carol.order_count, 2);
    assert_eq!(carol.total_spent, 600_000);

    Ok(())
}

fn empty_update() -> UpdateProductRequest {
    UpdateProductRequest {
        category_id: None,
        name: None,
        cost: None,
        wholesale_price: None,
        sale_price: None,
        stock: None,
        brand: None,
        description: None,
        image: None,
    }
}

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => return Ok(None),
    };

    let pool = create_pool(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    sqlx::query(
        "TRUNCATE TABLE order_lines, orders, cart_lines, carts, addresses, credentials, accounts, products, categories, audit_logs CASCADE",
    )
    .execute(&pool)
    .await?;

    Ok(Some(AppState {
        pool,
        config: AppConfig {
            database_url,
            host: "127.0.0.1".into(),
            port: 0,
            media_base_url: "https://media.test/petshop".into(),
        },
    }))
}

async fn create_user(state: &AppState, username: &str, role: &str) -> anyhow::Result<AuthUser> {
    let registered = auth_service::register(
        state,
        RegisterRequest {
            username: username.into(),
            password: "hunter22".into(),
            email: None,
            first_name: "Carol".into(),
            last_name: "Tester".into(),
            birth_date: None,
            gender: None,
            national_id: None,
            phone: None,
            home_address: None,
        },
    )
    .await?;
    let account_id = registered.data.expect("account").id;

    if role != "customer" {
        sqlx::query("UPDATE credentials SET role = $2 WHERE account_id = $1")
            .bind(account_id)
            .bind(role)
            .execute(&state.pool)
            .await?;
    }

    Ok(AuthUser {
        account_id,
        role: role.into(),
    })
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let (stock,): (i32,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(stock)
}
