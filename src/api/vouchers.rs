use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::database::MongoDB;
use crate::middleware::{AdminUser, AuthUser};
use crate::models::cart;
use crate::models::voucher::{
    CreateVoucherRequest, UpdateVoucherRequest, ValidateVoucherRequest, ValidateVoucherResponse,
    VoucherResponse,
};
use crate::services::{cart_service, voucher_service};
use crate::utils::{AppError, PageQuery};

#[utoipa::path(
    post,
    path = "/api/vouchers/validate",
    tag = "Vouchers",
    request_body = ValidateVoucherRequest,
    responses(
        (status = 200, description = "Voucher applies", body = ValidateVoucherResponse),
        (status = 400, description = "Unknown code or rejection reason")
    ),
    security(("bearer_auth" = []))
)]
pub async fn validate_voucher(
    db: web::Data<MongoDB>,
    user: AuthUser,
    request: web::Json<ValidateVoucherRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = user.0.user_id()?;
    log::info!("🎟️ POST /vouchers/validate - code: {}, user: {}", request.code, user_id);

    let subtotal = match request.subtotal {
        Some(s) if s.is_finite() && s >= 0.0 => s,
        Some(_) => return Err(AppError::Validation("Subtotal must be a non-negative number".to_string())),
        None => {
            let (items, _) = cart_service::current_items(&db, &user_id).await?;
            cart::subtotal(&items)
        }
    };

    let response = voucher_service::validate(&db, &request.code, subtotal, &user_id).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[utoipa::path(
    get,
    path = "/api/vouchers",
    tag = "Vouchers",
    params(
        ("page" = Option<u64>, Query),
        ("limit" = Option<u64>, Query)
    ),
    responses((status = 200, description = "Paginated vouchers", body = [VoucherResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_vouchers(
    db: web::Data<MongoDB>,
    _admin: AdminUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let page = voucher_service::list(&db, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/vouchers/{id}",
    tag = "Vouchers",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "Voucher", body = VoucherResponse),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_voucher(
    db: web::Data<MongoDB>,
    _admin: AdminUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    let voucher = voucher_service::get(&db, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "voucher": voucher })))
}

#[utoipa::path(
    post,
    path = "/api/vouchers",
    tag = "Vouchers",
    request_body = CreateVoucherRequest,
    responses(
        (status = 201, description = "Created", body = VoucherResponse),
        (status = 409, description = "Code already used")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_voucher(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    request: web::Json<CreateVoucherRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🎟️ POST /vouchers - {} by {}", request.code, admin.0.email);
    let voucher = voucher_service::create(&db, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "voucher": voucher })))
}

#[utoipa::path(
    put,
    path = "/api/vouchers/{id}",
    tag = "Vouchers",
    params(("id" = String, Path)),
    request_body = UpdateVoucherRequest,
    responses(
        (status = 200, description = "Updated", body = VoucherResponse),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_voucher(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
    request: web::Json<UpdateVoucherRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("✏️ PUT /vouchers/{} by {}", id, admin.0.email);
    let voucher = voucher_service::update(&db, &id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "voucher": voucher })))
}

#[utoipa::path(
    delete,
    path = "/api/vouchers/{id}",
    tag = "Vouchers",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_voucher(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🗑️ DELETE /vouchers/{} by {}", id, admin.0.email);
    voucher_service::delete(&db, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Voucher deleted"
    })))
}
