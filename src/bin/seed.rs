use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use uuid::Uuid;

use petshop_api::{config::AppConfig, db::create_pool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_admin(&pool).await?;
    let category_ids = seed_categories(&pool).await?;
    seed_products(&pool, &category_ids).await?;

    println!("Seed completed. Admin account: {admin_id}");
    Ok(())
}

/// The admin credential comes from the environment; there is no default
/// password.
async fn ensure_admin(pool: &sqlx::PgPool) -> anyhow::Result<Uuid> {
    let username = std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("ADMIN_PASSWORD")
        .map_err(|_| anyhow::anyhow!("ADMIN_PASSWORD must be set to seed the admin account"))?;

    if let Some((account_id,)) = sqlx::query_as::<_, (Uuid,)>(
        "SELECT account_id FROM credentials WHERE username = $1",
    )
    .bind(&username)
    .fetch_optional(pool)
    .await?
    {
        println!("Admin '{username}' already present");
        return Ok(account_id);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let mut txn = pool.begin().await?;
    let account_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO accounts (id, first_name, last_name) VALUES ($1, 'Store', 'Admin')",
    )
    .bind(account_id)
    .execute(&mut *txn)
    .await?;
    sqlx::query(
        r#"
        INSERT INTO credentials (id, account_id, username, password_hash, role)
        VALUES ($1, $2, $3, $4, 'admin')
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(&username)
    .bind(&password_hash)
    .execute(&mut *txn)
    .await?;
    txn.commit().await?;

    println!("Created admin '{username}'");
    Ok(account_id)
}

async fn seed_categories(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Uuid>> {
    let categories = [
        ("Dog Supplies", "Food, treats and gear for dogs"),
        ("Cat Supplies", "Food, litter and toys for cats"),
        ("Aquarium", "Tanks, filters and fish food"),
        ("Small Pets", "Everything for hamsters, rabbits and birds"),
    ];

    let mut ids = Vec::with_capacity(categories.len());
    for (name, description) in categories {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO categories (id, name, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(pool)
        .await?;
        ids.push(id);
    }

    println!("Seeded {} categories", ids.len());
    Ok(ids)
}

async fn seed_products(pool: &sqlx::PgPool, category_ids: &[Uuid]) -> anyhow::Result<()> {
    // (name, category index, cost, wholesale, sale, stock, brand)
    let products = [
        ("Premium Puppy Kibble 5kg", 0, 320_000, 360_000, 450_000, 40, "NutriPaw"),
        ("Rope Tug Toy", 0, 25_000, 32_000, 60_000, 120, "PlayFetch"),
        ("Salmon Cat Food 2kg", 1, 180_000, 210_000, 280_000, 55, "Whiskerly"),
        ("Clumping Litter 10L", 1, 90_000, 105_000, 150_000, 80, "FreshNest"),
        ("Betta Starter Tank 20L", 2, 450_000, 520_000, 690_000, 12, "AquaHome"),
        ("Tropical Fish Flakes 100g", 2, 40_000, 48_000, 75_000, 200, "FinFeed"),
        ("Hamster Cage Deluxe", 3, 380_000, 430_000, 560_000, 8, "CozyCritter"),
        ("Bird Seed Mix 1kg", 3, 35_000, 42_000, 65_000, 150, "SkySong"),
    ];

    for (name, cat, cost, wholesale, sale, stock, brand) in products {
        let category_id = category_ids
            .get(cat)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing category for '{name}'"))?;
        sqlx::query(
            r#"
            INSERT INTO products
                (id, category_id, name, cost, wholesale_price, sale_price, stock, brand)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category_id)
        .bind(name)
        .bind(cost as i64)
        .bind(wholesale as i64)
        .bind(sale as i64)
        .bind(stock)
        .bind(brand)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
