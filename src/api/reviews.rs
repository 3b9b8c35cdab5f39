use actix_web::{web, HttpResponse};
use mongodb::bson::oid::ObjectId;

use crate::database::MongoDB;
use crate::middleware::AuthUser;
use crate::models::review::{
    CreateReviewRequest, ProductReviewsResponse, ReviewResponse, UpdateReviewRequest,
};
use crate::services::review_service;
use crate::utils::{AppError, PageQuery};

#[utoipa::path(
    get,
    path = "/api/reviews/product/{product_id}",
    tag = "Reviews",
    params(
        ("product_id" = String, Path),
        ("page" = Option<u64>, Query),
        ("limit" = Option<u64>, Query)
    ),
    responses((status = 200, description = "Reviews with rating summary", body = ProductReviewsResponse))
)]
pub async fn list_product_reviews(
    db: web::Data<MongoDB>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let product_id = ObjectId::parse_str(path.as_str())?;
    let reviews = review_service::list_for_product(&db, &product_id, &query).await?;
    Ok(HttpResponse::Ok().json(reviews))
}

#[utoipa::path(
    get,
    path = "/api/reviews/mine",
    tag = "Reviews",
    params(
        ("page" = Option<u64>, Query),
        ("limit" = Option<u64>, Query)
    ),
    responses((status = 200, description = "Caller's reviews", body = [ReviewResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_my_reviews(
    db: web::Data<MongoDB>,
    user: AuthUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let page = review_service::list_mine(&db, &user.0.user_id()?, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/reviews",
    tag = "Reviews",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = ReviewResponse),
        (status = 409, description = "Already reviewed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_review(
    db: web::Data<MongoDB>,
    user: AuthUser,
    request: web::Json<CreateReviewRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("⭐ POST /reviews - product: {}, user: {}", request.product_id, user.0.sub);
    let review = review_service::create(&db, &user.0.user_id()?, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "review": review })))
}

#[utoipa::path(
    put,
    path = "/api/reviews/{id}",
    tag = "Reviews",
    params(("id" = String, Path)),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Updated", body = ReviewResponse),
        (status = 403, description = "Not your review")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_review(
    db: web::Data<MongoDB>,
    user: AuthUser,
    path: web::Path<String>,
    request: web::Json<UpdateReviewRequest>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    let review = review_service::update(&db, &id, &user.0.user_id()?, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "review": review })))
}

#[utoipa::path(
    delete,
    path = "/api/reviews/{id}",
    tag = "Reviews",
    params(("id" = String, Path)),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not your review")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_review(
    db: web::Data<MongoDB>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = ObjectId::parse_str(path.as_str())?;
    log::info!("🗑️ DELETE /reviews/{} by {}", id, user.0.email);
    review_service::delete(&db, &id, &user.0).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Review deleted"
    })))
}
