pub mod auth_service;
pub mod cart_service;
pub mod category_service;
pub mod order_service;
pub mod payment_method_service;
pub mod product_service;
pub mod review_service;
pub mod upload_service;
pub mod voucher_service;

pub use auth_service::Claims;
