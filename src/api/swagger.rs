use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

/// Multipart body with a single image under `file`.
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Multipart body with one or more images, each under `files`.
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct ImagesUpload {
    #[schema(value_type = Vec<String>)]
    pub files: Vec<Vec<u8>>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shop Service API",
        version = "1.0.0",
        description = "REST API for the shop backend.\n\n**Authentication:** customer and admin endpoints require a JWT Bearer token obtained from `/api/auth/login`.\n\n**Features:**\n- Catalog with nested categories, variations and images\n- Per-user carts with stock reconciliation\n- Vouchers and payment methods\n- Orders with status history and revenue reports\n- Product reviews",
        contact(
            name = "Shop Service Team",
            email = "support@shop-service.local"
        )
    ),
    paths(
        // Auth
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::auth::refresh_token,
        crate::api::auth::get_me,
        crate::api::auth::update_me,
        crate::api::auth::change_password,
        crate::api::auth::upload_avatar,

        // Health
        crate::api::health::health_check,

        // Categories
        crate::api::categories::list_categories,
        crate::api::categories::get_category,
        crate::api::categories::create_category,
        crate::api::categories::update_category,
        crate::api::categories::delete_category,

        // Products
        crate::api::products::list_products,
        crate::api::products::get_product,
        crate::api::products::create_product,
        crate::api::products::update_product,
        crate::api::products::delete_product,
        crate::api::products::upload_images,
        crate::api::products::remove_image,

        // Cart
        crate::api::cart::get_cart,
        crate::api::cart::add_item,
        crate::api::cart::update_item,
        crate::api::cart::remove_item,
        crate::api::cart::clear_cart,
        crate::api::cart::merge_cart,

        // Vouchers
        crate::api::vouchers::validate_voucher,
        crate::api::vouchers::list_vouchers,
        crate::api::vouchers::get_voucher,
        crate::api::vouchers::create_voucher,
        crate::api::vouchers::update_voucher,
        crate::api::vouchers::delete_voucher,

        // Payment methods
        crate::api::payment_methods::list_payment_methods,
        crate::api::payment_methods::create_payment_method,
        crate::api::payment_methods::update_payment_method,
        crate::api::payment_methods::delete_payment_method,

        // Orders
        crate::api::orders::create_order,
        crate::api::orders::list_my_orders,
        crate::api::orders::get_order,
        crate::api::orders::cancel_order,
        crate::api::orders::list_all_orders,
        crate::api::orders::update_order_status,
        crate::api::orders::update_payment_status,
        crate::api::orders::revenue_report,

        // Reviews
        crate::api::reviews::list_product_reviews,
        crate::api::reviews::list_my_reviews,
        crate::api::reviews::create_review,
        crate::api::reviews::update_review,
        crate::api::reviews::delete_review,
    ),
    components(
        schemas(
            ImageUpload,
            ImagesUpload,
            crate::api::health::HealthResponse,

            crate::models::user::UserRole,
            crate::models::user::Address,
            crate::models::user::RegisterRequest,
            crate::models::user::LoginRequest,
            crate::models::user::RefreshTokenRequest,
            crate::models::user::UpdateProfileRequest,
            crate::models::user::ChangePasswordRequest,
            crate::models::user::UserResponse,
            crate::models::user::AuthResponse,

            crate::models::category::CreateCategoryRequest,
            crate::models::category::UpdateCategoryRequest,
            crate::models::category::CategoryResponse,

            crate::models::product::Variation,
            crate::models::product::CreateProductRequest,
            crate::models::product::UpdateProductRequest,
            crate::models::product::RemoveImageRequest,
            crate::models::product::CategoryRef,
            crate::models::product::ProductResponse,

            crate::models::cart::AdjustmentKind,
            crate::models::cart::CartAdjustment,
            crate::models::cart::CartItemRequest,
            crate::models::cart::RemoveCartItemRequest,
            crate::models::cart::MergeCartRequest,
            crate::models::cart::CartItemResponse,
            crate::models::cart::CartResponse,

            crate::models::voucher::DiscountType,
            crate::models::voucher::CreateVoucherRequest,
            crate::models::voucher::UpdateVoucherRequest,
            crate::models::voucher::ValidateVoucherRequest,
            crate::models::voucher::ValidateVoucherResponse,
            crate::models::voucher::VoucherResponse,

            crate::models::payment_method::CreatePaymentMethodRequest,
            crate::models::payment_method::UpdatePaymentMethodRequest,
            crate::models::payment_method::PaymentMethodResponse,

            crate::models::order::OrderStatus,
            crate::models::order::PaymentStatus,
            crate::models::order::ShippingDetails,
            crate::models::order::CreateOrderRequest,
            crate::models::order::UpdateOrderStatusRequest,
            crate::models::order::UpdatePaymentStatusRequest,
            crate::models::order::RevenueBucket,
            crate::models::order::RevenueReport,
            crate::models::order::OrderItemResponse,
            crate::models::order::OrderPaymentMethodResponse,
            crate::models::order::OrderVoucherResponse,
            crate::models::order::StatusChangeResponse,
            crate::models::order::OrderResponse,

            crate::models::review::CreateReviewRequest,
            crate::models::review::UpdateReviewRequest,
            crate::models::review::ReviewResponse,
            crate::models::review::ProductReviewsResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login, token refresh and the caller's profile."),
        (name = "Health", description = "Liveness and database connectivity."),
        (name = "Categories", description = "Category tree. Writes require an admin token."),
        (name = "Products", description = "Catalog browsing, product management and product images."),
        (name = "Cart", description = "The caller's cart. Lines are reconciled against live stock and prices on every read."),
        (name = "Vouchers", description = "Voucher validation and admin management."),
        (name = "Payment Methods", description = "Payment methods offered at checkout."),
        (name = "Orders", description = "Checkout, order history, status changes and revenue."),
        (name = "Reviews", description = "Product reviews and ratings."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Access token from /api/auth/login"))
                        .build(),
                ),
            );
        }
    }
}
