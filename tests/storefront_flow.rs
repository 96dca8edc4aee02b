use uuid::Uuid;

use petshop_api::{
    config::AppConfig,
    db::create_pool,
    dto::{
        account::AddressRequest,
        auth::{LoginRequest, RegisterRequest},
        cart::{AddToCartRequest, UpdateCartLineRequest},
        orders::{PlaceOrderRequest, SelectedLine},
    },
    error::AppError,
    middleware::auth::AuthUser,
    services::{account_service, auth_service, cart_service, catalog_service, order_service},
    state::AppState,
};

// End-to-end storefront flow at the service layer: register -> login ->
// addresses -> cart -> checkout (full and partial) -> cancel.
#[tokio::test]
async fn register_cart_checkout_and_cancel_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let Some(state) = setup_state().await? else {
        eprintln!(
            "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
        );
        return Ok(());
    };

    unsafe { std::env::set_var("JWT_SECRET", "integration-secret") };

    // Register
    let registered = auth_service::register(&state, register_request("alice")).await?;
    let account = registered.data.expect("registered account");
    let alice = AuthUser {
        account_id: account.id,
        role: "customer".into(),
    };

    let duplicate = auth_service::register(&state, register_request("alice")).await;
    assert!(matches!(duplicate, Err(AppError::DuplicateUsername)));

    // Login
    let login = auth_service::login(
        &state,
        LoginRequest {
            username: "alice".into(),
            password: "hunter22".into(),
        },
    )
    .await?;
    assert!(login.data.expect("token").token.starts_with("Bearer "));

    let bad_login = auth_service::login(
        &state,
        LoginRequest {
            username: "alice".into(),
            password: "wrong".into(),
        },
    )
    .await;
    assert!(matches!(bad_login, Err(AppError::InvalidCredentials)));

    // Addresses: the first one becomes the default no matter what.
    let first = account_service::add_address(&state, &alice, address_request(false))
        .await?
        .data
        .expect("address");
    assert!(first.is_default);

    let second = account_service::add_address(&state, &alice, address_request(false))
        .await?
        .data
        .expect("address");
    assert!(!second.is_default);
    assert_eq!(default_count(&state, alice.account_id).await?, 1);

    // Deleting the default promotes a survivor.
    account_service::delete_address(&state, &alice, first.id).await?;
    let remaining = account_service::list_addresses(&state, &alice)
        .await?
        .data
        .expect("addresses")
        .items;
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].is_default);

    let last = account_service::delete_address(&state, &alice, remaining[0].id).await;
    assert!(matches!(last, Err(AppError::LastAddress)));
    let address_id = remaining[0].id;

    // Catalog
    let category_id = seed_category(&state, "Dog Supplies").await?;
    let product_a = seed_product(&state, category_id, "Kibble 5kg", 100_000, 10).await?;
    let product_b = seed_product(&state, category_id, "Rope Toy", 50_000, 5).await?;

    let view = catalog_service::get_product(&state, product_a)
        .await?
        .data
        .expect("product view");
    assert_eq!(view.price, 100_000);
    assert_eq!(view.category, "Dog Supplies");

    // Cart: add creates, adding again increments.
    let line = cart_service::add_to_cart(
        &state,
        &alice,
        AddToCartRequest {
            product_id: product_a,
            quantity: 3,
        },
    )
    .await?
    .data
    .expect("cart line");
    assert_eq!(line.quantity, 3);
    // Stock is untouched until checkout.
    assert_eq!(stock_of(&state, product_a).await?, 10);

    let line = cart_service::add_to_cart(
        &state,
        &alice,
        AddToCartRequest {
            product_id: product_a,
            quantity: 2,
        },
    )
    .await?
    .data
    .expect("cart line");
    assert_eq!(line.quantity, 5);

    let too_many = cart_service::add_to_cart(
        &state,
        &alice,
        AddToCartRequest {
            product_id: product_b,
            quantity: 99,
        },
    )
    .await;
    assert!(matches!(too_many, Err(AppError::OutOfStock)));

    cart_service::add_to_cart(
        &state,
        &alice,
        AddToCartRequest {
            product_id: product_b,
            quantity: 1,
        },
    )
    .await?;

    // Overwrite-style update, counter follows.
    cart_service::update_line(
        &state,
        &alice,
        product_a,
        UpdateCartLineRequest { quantity: 2 },
    )
    .await?;

    let cart = cart_service::list_cart(&state, &alice)
        .await?
        .data
        .expect("cart");
    assert_eq!(cart.total_quantity, 3);
    assert_eq!(cart.total_amount, 2 * 100_000 + 50_000);

    // Full checkout.
    let placed = order_service::place_order(
        &state,
        &alice,
        PlaceOrderRequest {
            address_id,
            lines: None,
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(placed.order.total_amount, 250_000);
    assert_eq!(placed.lines.len(), 2);
    assert_eq!(stock_of(&state, product_a).await?, 8);
    assert_eq!(stock_of(&state, product_b).await?, 4);

    let cart = cart_service::list_cart(&state, &alice)
        .await?
        .data
        .expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_quantity, 0);

    // Captured prices never move with the catalog.
    sqlx::query("UPDATE products SET sale_price = 999999 WHERE id = $1")
        .bind(product_a)
        .execute(&state.pool)
        .await?;
    let fetched = order_service::get_order(&state, &alice, placed.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(fetched.order.total_amount, 250_000);
    assert!(fetched
        .lines
        .iter()
        .any(|l| l.product_id == product_a && l.unit_price == 100_000));

    // Partial checkout consumes only the selection.
    cart_service::add_to_cart(
        &state,
        &alice,
        AddToCartRequest {
            product_id: product_a,
            quantity: 3,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state,
        &alice,
        AddToCartRequest {
            product_id: product_b,
            quantity: 2,
        },
    )
    .await?;

    let over_selected = order_service::place_order(
        &state,
        &alice,
        PlaceOrderRequest {
            address_id,
            lines: Some(vec![SelectedLine {
                product_id: product_a,
                quantity: 4,
            }]),
        },
    )
    .await;
    assert!(matches!(over_selected, Err(AppError::InvalidInput(_))));

    let partial = order_service::place_order(
        &state,
        &alice,
        PlaceOrderRequest {
            address_id,
            lines: Some(vec![SelectedLine {
                product_id: product_a,
                quantity: 2,
            }]),
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(partial.order.total_amount, 2 * 999_999);
    assert_eq!(stock_of(&state, product_a).await?, 6);

    let cart = cart_service::list_cart(&state, &alice)
        .await?
        .data
        .expect("cart");
    assert_eq!(cart.total_quantity, 3);
    assert!(cart
        .items
        .iter()
        .any(|l| l.product.id == product_a && l.quantity == 1));
    assert!(cart
        .items
        .iter()
        .any(|l| l.product.id == product_b && l.quantity == 2));

    // Cancel restores exactly what the order consumed.
    let canceled = order_service::cancel_order(&state, &alice, partial.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(canceled.order.status.as_str(), "canceled");
    assert_eq!(stock_of(&state, product_a).await?, 8);

    let again = order_service::cancel_order(&state, &alice, partial.order.id).await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));

    // Ownership checks.
    let registered = auth_service::register(&state, register_request("bob")).await?;
    let bob = AuthUser {
        account_id: registered.data.expect("account").id,
        role: "customer".into(),
    };

    let foreign_cancel = order_service::cancel_order(&state, &bob, placed.order.id).await;
    assert!(matches!(foreign_cancel, Err(AppError::Forbidden)));
    let foreign_get = order_service::get_order(&state, &bob, placed.order.id).await;
    assert!(matches!(foreign_get, Err(AppError::Forbidden)));

    // Bob has no cart at all.
    let empty = order_service::place_order(
        &state,
        &bob,
        PlaceOrderRequest {
            address_id,
            lines: None,
        },
    )
    .await;
    assert!(matches!(empty, Err(AppError::EmptyCart)));

    // An address that is not the caller's is rejected.
    let bob_address = account_service::add_address(&state, &bob, address_request(true))
        .await?
        .data
        .expect("address");
    let wrong_address = order_service::place_order(
        &state,
        &alice,
        PlaceOrderRequest {
            address_id: bob_address.id,
            lines: None,
        },
    )
    .await;
    assert!(matches!(wrong_address, Err(AppError::NotFound)));

    Ok(())
}

fn register_request(username: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.into(),
        password: "hunter22".into(),
        email: Some(format!("{username}@example.com")),
        first_name: username.to_uppercase(),
        last_name: "Tester".into(),
        birth_date: None,
        gender: None,
        national_id: None,
        phone: Some("0900000000".into()),
        home_address: None,
    }
}

fn address_request(is_default: bool) -> AddressRequest {
    AddressRequest {
        recipient: "Alice Tester".into(),
        phone: "0900000000".into(),
        street: "12 Harbor Lane".into(),
        district: "District 1".into(),
        province: "HCMC".into(),
        is_default,
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

    // Clean tables between runs.
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

async fn seed_category(state: &AppState, name: &str) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO categories (id, name) VALUES ($1, $2) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

async fn seed_product(
    state: &AppState,
    category_id: Uuid,
    name: &str,
    sale_price: i64,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO products (id, category_id, name, sale_price, stock)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(category_id)
    .bind(name)
    .bind(sale_price)
    .bind(stock)
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let (stock,): (i32,) = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(stock)
}

async fn default_count(state: &AppState, account_id: Uuid) -> anyhow::Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM addresses WHERE account_id = $1 AND is_default",
    )
    .bind(account_id)
    .fetch_one(&state.pool)
    .await?;
    Ok(count)
}
