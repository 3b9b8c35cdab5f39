use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::database::MongoDB;
use crate::middleware::{AdminUser, MaybeUser};
use crate::models::payment_method::{
    CreatePaymentMethodRequest, PaymentMethodQuery, PaymentMethodResponse,
    UpdatePaymentMethodRequest,
};
use crate::services::payment_method_service;
use crate::utils::AppError;

#[utoipa::path(
    get,
    path = "/api/payment-methods",
    tag = "Payment Methods",
    params(("include_inactive" = Option<bool>, Query, description = "Admins only")),
    responses((status = 200, description = "Payment methods by sort order", body = [PaymentMethodResponse]))
)]
pub async fn list_payment_methods(
    db: web::Data<MongoDB>,
    user: MaybeUser,
    query: web::Query<PaymentMethodQuery>,
) -> Result<HttpResponse, AppError> {
    let methods = payment_method_service::list(&db, &query, user.is_admin()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "items": methods })))
}

#[utoipa::path(
    post,
    path = "/api/payment-methods",
    tag = "Payment Methods",
    request_body = CreatePaymentMethodRequest,
    responses(
        (status = 201, description = "Created", body = PaymentMethodResponse),
        (status = 409, description = "Code already used")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_payment_method(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    request: web::Json<CreatePaymentMethodRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("💳 POST /payment-methods - {} by {}", request.code, admin.0.email);
    let method = payment_method_service::create(&db, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "payment_method": method })))
}

#[utoipa::path(
    put,
    path = "/api/payment-methods/{id}",
    tag = "Payment Methods",
    params(("id" = String, Path)),
    request_body = UpdatePaymentMethodRequest,
    responses(
        (status = 200, description = "Updated", body = PaymentMethodResponse),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_payment_method(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
    request: web::Json<UpdatePaymentMethodRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("✏️ PUT /payment-methods/{} by {}", id, admin.0.email);
    let method = payment_method_service::update(&db, &id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "payment_method": method })))
}

#[utoipa::path(
    delete,
    path = "/api/payment-methods/{id}",
    tag = "Payment Methods",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "Deleted, or deactivated when orders reference it"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_payment_method(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🗑️ DELETE /payment-methods/{} by {}", id, admin.0.email);
    let removed = payment_method_service::delete(&db, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": if removed { "Payment method deleted" } else { "Payment method deactivated" }
    })))
}
