pub mod auth;
pub mod cart;
pub mod categories;
pub mod health;
pub mod orders;
pub mod payment_methods;
pub mod products;
pub mod reviews;
pub mod swagger;
pub mod vouchers;

use actix_web::web;

use crate::middleware::AuthMiddleware;
use crate::utils::{json_error_handler, query_error_handler};

/// Registers every API route. Cart, orders and the caller's profile sit
/// behind `AuthMiddleware`; mixed scopes rely on the `AuthUser`,
/// `AdminUser` and `MaybeUser` extractors instead.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        // Health check
        .route("/health", web::get().to(health::health_check))
        // Auth
        .service(
            web::scope("/api/auth")
                .route("/register", web::post().to(auth::register))
                .route("/login", web::post().to(auth::login))
                .route("/refresh", web::post().to(auth::refresh_token))
                .service(
                    web::scope("/me")
                        .wrap(AuthMiddleware)
                        .route("", web::get().to(auth::get_me))
                        .route("", web::put().to(auth::update_me))
                        .route("/password", web::put().to(auth::change_password))
                        .route("/avatar", web::post().to(auth::upload_avatar)),
                ),
        )
        // Catalog
        .service(
            web::scope("/api/categories")
                .route("", web::get().to(categories::list_categories))
                .route("", web::post().to(categories::create_category))
                .route("/{id_or_slug}", web::get().to(categories::get_category))
                .route("/{id}", web::put().to(categories::update_category))
                .route("/{id}", web::delete().to(categories::delete_category)),
        )
        .service(
            web::scope("/api/products")
                .route("", web::get().to(products::list_products))
                .route("", web::post().to(products::create_product))
                .route("/{id}/images", web::post().to(products::upload_images))
                .route("/{id}/images", web::delete().to(products::remove_image))
                .route("/{id_or_slug}", web::get().to(products::get_product))
                .route("/{id}", web::put().to(products::update_product))
                .route("/{id}", web::delete().to(products::delete_product)),
        )
        // Shopping
        .service(
            web::scope("/api/cart")
                .wrap(AuthMiddleware)
                .route("", web::get().to(cart::get_cart))
                .route("", web::delete().to(cart::clear_cart))
                .route("/items", web::post().to(cart::add_item))
                .route("/items", web::put().to(cart::update_item))
                .route("/items", web::delete().to(cart::remove_item))
                .route("/merge", web::post().to(cart::merge_cart)),
        )
        .service(
            web::scope("/api/vouchers")
                .route("/validate", web::post().to(vouchers::validate_voucher))
                .route("", web::get().to(vouchers::list_vouchers))
                .route("", web::post().to(vouchers::create_voucher))
                .route("/{id}", web::get().to(vouchers::get_voucher))
                .route("/{id}", web::put().to(vouchers::update_voucher))
                .route("/{id}", web::delete().to(vouchers::delete_voucher)),
        )
        .service(
            web::scope("/api/payment-methods")
                .route("", web::get().to(payment_methods::list_payment_methods))
                .route("", web::post().to(payment_methods::create_payment_method))
                .route("/{id}", web::put().to(payment_methods::update_payment_method))
                .route("/{id}", web::delete().to(payment_methods::delete_payment_method)),
        )
        // Orders: admin paths first so they never reach `/{id}`
        .service(
            web::scope("/api/orders")
                .wrap(AuthMiddleware)
                .route("/admin/all", web::get().to(orders::list_all_orders))
                .route("/admin/revenue", web::get().to(orders::revenue_report))
                .route("", web::post().to(orders::create_order))
                .route("", web::get().to(orders::list_my_orders))
                .route("/{id}", web::get().to(orders::get_order))
                .route("/{id}/cancel", web::post().to(orders::cancel_order))
                .route("/{id}/status", web::put().to(orders::update_order_status))
                .route("/{id}/payment-status", web::put().to(orders::update_payment_status)),
        )
        // Reviews
        .service(
            web::scope("/api/reviews")
                .route("", web::post().to(reviews::create_review))
                .route("/mine", web::get().to(reviews::list_my_reviews))
                .route("/product/{product_id}", web::get().to(reviews::list_product_reviews))
                .route("/{id}", web::put().to(reviews::update_review))
                .route("/{id}", web::delete().to(reviews::delete_review)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, JwtSettings};
    use actix_web::{test, App};

    fn config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: "mongodb://localhost:27017/shop_test".into(),
            jwt: JwtSettings::for_tests(),
            upload_dir: "./uploads".into(),
            max_upload_bytes: 1024,
            shipping_fee: 5.0,
            free_shipping_threshold: 100.0,
            cors_origins: vec![],
            admin: None,
        }
    }

    #[actix_web::test]
    async fn test_protected_scopes_reject_anonymous_requests() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        for (method, uri) in [
            (actix_web::http::Method::GET, "/api/cart"),
            (actix_web::http::Method::POST, "/api/cart/items"),
            (actix_web::http::Method::GET, "/api/orders"),
            (actix_web::http::Method::GET, "/api/orders/admin/all"),
            (actix_web::http::Method::GET, "/api/auth/me"),
        ] {
            let req = test::TestRequest::default().method(method).uri(uri).to_request();
            let err = test::try_call_service(&app, req).await.unwrap_err();
            assert_eq!(err.as_response_error().status_code(), 401, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_unknown_route_is_404() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/nowhere").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    async fn echo(
        _body: web::Json<crate::models::cart::CartItemRequest>,
        _page: web::Query<crate::utils::PageQuery>,
    ) -> actix_web::HttpResponse {
        actix_web::HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn test_malformed_input_uses_error_envelope() {
        let app = test::init_service(
            App::new()
                .configure(configure)
                .route("/echo", web::post().to(echo)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/echo")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"product_id\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

        let req = test::TestRequest::post()
            .uri("/echo?page=first")
            .set_json(serde_json::json!({ "product_id": "x", "quantity": 1 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid query string"));
    }
}
