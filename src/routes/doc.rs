use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        account::{AddressList, ProfileResponse},
        admin::{
            AdminOrderDetail, CustomerList, DashboardOverview, ProductList,
            RecentOrderList, SalesChart,
        },
        cart::{CartCount, CartView},
        catalog::{CategoryList, ProductView, ProductViewList},
        orders::{OrderList, OrderWithLines},
    },
    models::{Account, Address, Category, CartLine, Order, OrderLine, OrderStatus, Product},
    response::{ApiResponse, Meta},
    routes::{account, admin, auth, cart, catalog, health, orders, params},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::change_password,
        account::get_profile,
        account::update_profile,
        account::list_addresses,
        account::add_address,
        account::update_address,
        account::delete_address,
        catalog::list_products,
        catalog::get_product,
        catalog::list_categories,
        cart::list_cart,
        cart::add_to_cart,
        cart::update_line,
        cart::remove_line,
        cart::clear_cart,
        cart::cart_count,
        orders::list_orders,
        orders::place_order,
        orders::get_order,
        orders::cancel_order,
        admin::list_products,
        admin::create_product,
        admin::update_product,
        admin::deactivate_product,
        admin::create_category,
        admin::update_category,
        admin::list_all_orders,
        admin::get_order,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::list_customers,
        admin::dashboard_overview,
        admin::sales_chart,
        admin::recent_orders,
    ),
    components(
        schemas(
            Account,
            Address,
            Category,
            Product,
            CartLine,
            Order,
            OrderLine,
            OrderStatus,
            ProfileResponse,
            AddressList,
            ProductView,
            ProductViewList,
            CategoryList,
            CartView,
            CartCount,
            OrderList,
            OrderWithLines,
            AdminOrderDetail,
            ProductList,
            CustomerList,
            DashboardOverview,
            SalesChart,
            RecentOrderList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductViewList>,
            ApiResponse<OrderWithLines>,
            ApiResponse<OrderList>,
            ApiResponse<CartView>,
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "Account", description = "Profile and shipping addresses"),
        (name = "Catalog", description = "Public product catalog"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Admin", description = "Back-office management and statistics"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
