use actix_web::{web, HttpResponse};

use crate::database::MongoDB;
use crate::models::cart::{CartItemRequest, CartResponse, MergeCartRequest, RemoveCartItemRequest};
use crate::services::{auth_service::Claims, cart_service};
use crate::utils::AppError;

#[utoipa::path(
    get,
    path = "/api/cart",
    tag = "Cart",
    responses((status = 200, description = "Reconciled cart", body = CartResponse)),
    security(("bearer_auth" = []))
)]
pub async fn get_cart(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, AppError> {
    let cart = cart_service::get(&db, &claims.user_id()?).await?;
    if !cart.adjustments.is_empty() {
        log::info!("🛒 Cart {} reconciled with {} change(s)", claims.sub, cart.adjustments.len());
    }
    Ok(HttpResponse::Ok().json(cart))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    tag = "Cart",
    request_body = CartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 400, description = "Not enough stock or variation required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_item(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CartItemRequest>,
) -> Result<HttpResponse, AppError> {
    let cart = cart_service::add_item(&db, &claims.user_id()?, &request).await?;
    Ok(HttpResponse::Ok().json(cart))
}

#[utoipa::path(
    put,
    path = "/api/cart/items",
    tag = "Cart",
    request_body = CartItemRequest,
    responses(
        (status = 200, description = "Updated cart; quantity 0 removes the line", body = CartResponse),
        (status = 404, description = "Line not in cart")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_item(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CartItemRequest>,
) -> Result<HttpResponse, AppError> {
    let cart = cart_service::update_item(&db, &claims.user_id()?, &request).await?;
    Ok(HttpResponse::Ok().json(cart))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items",
    tag = "Cart",
    request_body = RemoveCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Line not in cart")
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_item(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<RemoveCartItemRequest>,
) -> Result<HttpResponse, AppError> {
    let cart = cart_service::remove_item(&db, &claims.user_id()?, &request).await?;
    Ok(HttpResponse::Ok().json(cart))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    tag = "Cart",
    responses((status = 200, description = "Empty cart", body = CartResponse)),
    security(("bearer_auth" = []))
)]
pub async fn clear_cart(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, AppError> {
    let cart = cart_service::clear(&db, &claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(cart))
}

#[utoipa::path(
    post,
    path = "/api/cart/merge",
    tag = "Cart",
    request_body = MergeCartRequest,
    responses((status = 200, description = "Merged cart; skipped lines reported in adjustments", body = CartResponse)),
    security(("bearer_auth" = []))
)]
pub async fn merge_cart(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<MergeCartRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🛒 POST /cart/merge - user: {}, {} line(s)", claims.sub, request.items.len());
    let cart = cart_service::merge(&db, &claims.user_id()?, &request).await?;
    Ok(HttpResponse::Ok().json(cart))
}
