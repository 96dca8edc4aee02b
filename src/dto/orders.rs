use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderLine};

/// One line of a partial checkout. Quantity must not exceed what the cart
/// line holds.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectedLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    pub address_id: Uuid,
    /// Omitted means "everything currently in the cart".
    pub lines: Option<Vec<SelectedLine>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
