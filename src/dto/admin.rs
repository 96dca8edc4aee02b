use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderLine, OrderStatus, Product};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub category_id: Uuid,
    pub name: String,
    pub cost: i64,
    pub wholesale_price: i64,
    pub sale_price: i64,
    pub stock: i32,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub cost: Option<i64>,
    pub wholesale_price: Option<i64>,
    pub sale_price: Option<i64>,
    pub stock: Option<i32>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

/// Admin order detail: the buyer alongside the order itself.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminOrderDetail {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub buyer_name: String,
    pub buyer_phone: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerSummary {
    pub account_id: Uuid,
    pub name: String,
    pub username: String,
    pub phone: Option<String>,
    pub order_count: i64,
    pub total_spent: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerList {
    pub items: Vec<CustomerSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockBuckets {
    pub total: i64,
    pub in_stock: i64,
    pub low_stock: i64,
    pub out_of_stock: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderCounts {
    pub total: i64,
    pub pending: i64,
    pub shipped: i64,
    pub delivered: i64,
    pub canceled: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevenueSummary {
    pub today: i64,
    pub this_month: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardOverview {
    pub products: StockBuckets,
    pub orders: OrderCounts,
    pub revenue: RevenueSummary,
    pub customers: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalesChart {
    pub labels: Vec<String>,
    pub values: Vec<i64>,
    pub period: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecentOrder {
    pub id: Uuid,
    pub buyer_name: String,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecentOrderList {
    pub items: Vec<RecentOrder>,
}
