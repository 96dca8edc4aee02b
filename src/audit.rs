use serde_json::Value;
use uuid::Uuid;

use crate::db::DbPool;

#[derive(Debug, Clone, Copy)]
pub enum AuditAction {
    Register,
    Login,
    PasswordChange,
    ProfileUpdate,
    AddressChange,
    CartChange,
    OrderPlaced,
    OrderCanceled,
    OrderStatusChange,
    ProductChange,
    CategoryChange,
    InventoryAdjust,
}

impl AuditAction {
    fn as_str(self) -> &'static str {
        match self {
            AuditAction::Register => "register",
            AuditAction::Login => "login",
            AuditAction::PasswordChange => "password_change",
            AuditAction::ProfileUpdate => "profile_update",
            AuditAction::AddressChange => "address_change",
            AuditAction::CartChange => "cart_change",
            AuditAction::OrderPlaced => "order_placed",
            AuditAction::OrderCanceled => "order_canceled",
            AuditAction::OrderStatusChange => "order_status_change",
            AuditAction::ProductChange => "product_change",
            AuditAction::CategoryChange => "category_change",
            AuditAction::InventoryAdjust => "inventory_adjust",
        }
    }

    fn resource(self) -> &'static str {
        match self {
            AuditAction::Register
            | AuditAction::Login
            | AuditAction::PasswordChange => "credentials",
            AuditAction::ProfileUpdate => "accounts",
            AuditAction::AddressChange => "addresses",
            AuditAction::CartChange => "cart_lines",
            AuditAction::OrderPlaced
            | AuditAction::OrderCanceled
            | AuditAction::OrderStatusChange => "orders",
            AuditAction::ProductChange | AuditAction::InventoryAdjust => "products",
            AuditAction::CategoryChange => "categories",
        }
    }
}

/// Append an audit row. Best-effort: a failed audit write is logged and
/// swallowed so it never rolls back the operation it describes.
pub async fn record(
    pool: &DbPool,
    account_id: Option<Uuid>,
    action: AuditAction,
    metadata: Option<Value>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_logs (id, account_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(action.as_str())
    .bind(action.resource())
    .bind(metadata)
    .execute(pool)
    .await;

    if let Err(err) = result {
        tracing::warn!(error = %err, action = action.as_str(), "audit log failed");
    }
}
