use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::middleware::{AdminUser, MaybeUser};
use crate::models::product::{
    CreateProductRequest, ProductQuery, ProductResponse, RemoveImageRequest, UpdateProductRequest,
};
use crate::services::product_service;
use crate::services::upload_service::{self, UploadFolder};
use crate::utils::AppError;

const MAX_IMAGES_PER_UPLOAD: usize = 10;

#[utoipa::path(
    get,
    path = "/api/products",
    tag = "Products",
    params(
        ("page" = Option<u64>, Query, description = "Page number, from 1"),
        ("limit" = Option<u64>, Query, description = "Page size, max 100"),
        ("search" = Option<String>, Query, description = "Name or SKU contains"),
        ("category" = Option<String>, Query, description = "Category id or slug, descendants included"),
        ("min_price" = Option<f64>, Query),
        ("max_price" = Option<f64>, Query),
        ("featured" = Option<bool>, Query),
        ("in_stock" = Option<bool>, Query),
        ("sort" = Option<String>, Query, description = "newest | price_asc | price_desc | best_selling | rating | name")
    ),
    responses((status = 200, description = "Paginated products", body = [ProductResponse]))
)]
pub async fn list_products(
    db: web::Data<MongoDB>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse, AppError> {
    let page = product_service::list(&db, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/products/{id_or_slug}",
    tag = "Products",
    params(("id_or_slug" = String, Path, description = "Product id or slug")),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_product(
    db: web::Data<MongoDB>,
    user: MaybeUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let product = product_service::get(&db, &path, user.is_admin()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "product": product })))
}

#[utoipa::path(
    post,
    path = "/api/products",
    tag = "Products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Created", body = ProductResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Slug or SKU already used")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_product(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    request: web::Json<CreateProductRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📦 POST /products - {} by {}", request.sku, admin.0.email);
    let product = product_service::create(&db, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "product": product })))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    tag = "Products",
    params(("id" = String, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated", body = ProductResponse),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_product(
    db: web::Data<MongoDB>,
    admin: AdminUser,
    path: web::Path<String>,
    request: web::Json<UpdateProductRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("✏️ PUT /products/{} by {}", id, admin.0.email);
    let product = product_service::update(&db, &id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "product": product })))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    tag = "Products",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Deleted with its reviews and cart lines"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_product(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    admin: AdminUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🗑️ DELETE /products/{} by {}", id, admin.0.email);

    let images = product_service::delete(&db, &id).await?;
    for url in &images {
        upload_service::delete_file(&config, url).await;
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Product deleted"
    })))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/images",
    tag = "Products",
    params(("id" = String, Path, description = "Product id")),
    request_body(content = crate::api::swagger::ImagesUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Images appended", body = ProductResponse),
        (status = 400, description = "Invalid image")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_images(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    admin: AdminUser,
    path: web::Path<String>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("📤 POST /products/{}/images by {}", id, admin.0.email);

    // fail before storing anything for an unknown product
    product_service::find_by_id(&db, &id).await?;

    let urls =
        upload_service::save_images(payload, &config, UploadFolder::Products, MAX_IMAGES_PER_UPLOAD)
            .await?;
    match product_service::add_images(&db, &id, &urls).await {
        Ok(product) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "product": product,
            "uploaded": urls
        }))),
        Err(e) => {
            for url in &urls {
                upload_service::delete_file(&config, url).await;
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}/images",
    tag = "Products",
    params(("id" = String, Path, description = "Product id")),
    request_body = RemoveImageRequest,
    responses(
        (status = 200, description = "Image removed", body = ProductResponse),
        (status = 404, description = "Image not on product")
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_image(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    admin: AdminUser,
    path: web::Path<String>,
    request: web::Json<RemoveImageRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🗑️ DELETE /products/{}/images {} by {}", id, request.url, admin.0.email);

    let product = product_service::remove_image(&db, &id, &request.url).await?;
    upload_service::delete_file(&config, &request.url).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "product": product })))
}
