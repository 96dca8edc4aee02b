use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// A product shaped for display: the joined category name, the sale price
/// exposed as the price, and the image reference resolved to a URL.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub brand: Option<String>,
    pub price: i64,
    pub description: Option<String>,
    pub stock: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductViewList {
    pub items: Vec<ProductView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryWithCount {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub product_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryList {
    pub items: Vec<CategoryWithCount>,
}
