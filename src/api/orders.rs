use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::middleware::AdminUser;
use crate::models::order::{
    AdminOrdersQuery, CreateOrderRequest, MyOrdersQuery, OrderResponse, RevenueQuery,
    RevenueReport, UpdateOrderStatusRequest, UpdatePaymentStatusRequest,
};
use crate::services::{auth_service::Claims, order_service};
use crate::utils::AppError;

#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "Orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderResponse),
        (status = 400, description = "Empty cart, insufficient stock or voucher rejected")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_order(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🧾 POST /orders - user: {}", claims.sub);
    let order = order_service::create(&db, &config, &claims.user_id()?, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "order": order })))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    tag = "Orders",
    params(
        ("page" = Option<u64>, Query),
        ("limit" = Option<u64>, Query),
        ("status" = Option<String>, Query)
    ),
    responses((status = 200, description = "Caller's orders, newest first", body = [OrderResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_my_orders(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<MyOrdersQuery>,
) -> Result<HttpResponse, AppError> {
    let page = order_service::list_mine(&db, &claims.user_id()?, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "Orders",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "Order", body = OrderResponse),
        (status = 404, description = "Not found or not yours")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_order(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    let order = order_service::get(&db, &id, &claims).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "order": order })))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    tag = "Orders",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "Cancelled, stock restored", body = OrderResponse),
        (status = 400, description = "Order can no longer be cancelled")
    ),
    security(("bearer_auth" = []))
)]
pub async fn cancel_order(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🚫 POST /orders/{}/cancel - user: {}", id, claims.sub);
    let order = order_service::cancel(&db, &id, &claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "order": order })))
}

#[utoipa::path(
    get,
    path = "/api/orders/admin/all",
    tag = "Orders",
    params(
        ("page" = Option<u64>, Query),
        ("limit" = Option<u64>, Query),
        ("status" = Option<String>, Query),
        ("payment_status" = Option<String>, Query),
        ("search" = Option<String>, Query, description = "Order number or customer email"),
        ("from" = Option<String>, Query, description = "RFC 3339"),
        ("to" = Option<String>, Query, description = "RFC 3339")
    ),
    responses((status = 200, description = "All orders", body = [OrderResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_all_orders(
    db: web::Data<MongoDB>,
    _admin: AdminUser,
    query: web::Query<AdminOrdersQuery>,
) -> Result<HttpResponse, AppError> {
    let page = order_service::list_all(&db, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    tag = "Orders",
    params(("id" = String, Path)),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = OrderResponse),
        (status = 400, description = "Transition not allowed"),
        (status = 409, description = "Status changed concurrently")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_order_status(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
    request: web::Json<UpdateOrderStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("📦 PUT /orders/{}/status -> {} by {}", id, request.status, admin.0.email);
    let order = order_service::update_status(&db, &id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "order": order })))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/payment-status",
    tag = "Orders",
    params(("id" = String, Path)),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment status recorded", body = OrderResponse),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_payment_status(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
    request: web::Json<UpdatePaymentStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!(
        "💰 PUT /orders/{}/payment-status -> {} by {}",
        id,
        request.payment_status.as_str(),
        admin.0.email
    );
    let order = order_service::update_payment_status(&db, &id, request.payment_status).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "order": order })))
}

#[utoipa::path(
    get,
    path = "/api/orders/admin/revenue",
    tag = "Orders",
    params(
        ("from" = Option<String>, Query, description = "RFC 3339"),
        ("to" = Option<String>, Query, description = "RFC 3339"),
        ("group_by" = Option<String>, Query, description = "day | month")
    ),
    responses((status = 200, description = "Revenue of non-cancelled orders", body = RevenueReport)),
    security(("bearer_auth" = []))
)]
pub async fn revenue_report(
    db: web::Data<MongoDB>,
    _admin: AdminUser,
    query: web::Query<RevenueQuery>,
) -> Result<HttpResponse, AppError> {
    let report = order_service::revenue(&db, &query).await?;
    Ok(HttpResponse::Ok().json(report))
}
