use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::database::MongoDB;
use crate::middleware::{AdminUser, MaybeUser};
use crate::models::category::{
    CategoryQuery, CategoryResponse, CreateCategoryRequest, UpdateCategoryRequest,
};
use crate::services::category_service;
use crate::utils::AppError;

#[utoipa::path(
    get,
    path = "/api/categories",
    tag = "Categories",
    params(
        ("tree" = Option<bool>, Query, description = "Return a nested tree"),
        ("include_inactive" = Option<bool>, Query, description = "Admins only")
    ),
    responses((status = 200, description = "Categories", body = [CategoryResponse]))
)]
pub async fn list_categories(
    db: web::Data<MongoDB>,
    user: MaybeUser,
    query: web::Query<CategoryQuery>,
) -> Result<HttpResponse, AppError> {
    let categories = category_service::list(&db, &query, user.is_admin()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "items": categories
    })))
}

#[utoipa::path(
    get,
    path = "/api/categories/{id_or_slug}",
    tag = "Categories",
    params(("id_or_slug" = String, Path, description = "Category id or slug")),
    responses(
        (status = 200, description = "Category with its direct children", body = CategoryResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_category(
    db: web::Data<MongoDB>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let category = category_service::get(&db, &path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "category": category })))
}

#[utoipa::path(
    post,
    path = "/api/categories",
    tag = "Categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Created", body = CategoryResponse),
        (status = 409, description = "Slug already used")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_category(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    request: web::Json<CreateCategoryRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📁 POST /categories - {} by {}", request.name, admin.0.email);
    let category = category_service::create(&db, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "category": category })))
}

#[utoipa::path(
    put,
    path = "/api/categories/{id}",
    tag = "Categories",
    params(("id" = String, Path, description = "Category id")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Updated", body = CategoryResponse),
        (status = 400, description = "Invalid parent")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_category(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
    request: web::Json<UpdateCategoryRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("✏️ PUT /categories/{} by {}", id, admin.0.email);
    let category = category_service::update(&db, &id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "category": category })))
}

#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    tag = "Categories",
    params(("id" = String, Path, description = "Category id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 409, description = "Products still reference the category")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_category(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🗑️ DELETE /categories/{} by {}", id, admin.0.email);
    category_service::delete(&db, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Category deleted"
    })))
}
