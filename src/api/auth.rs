use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};

use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::models::user::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RefreshTokenRequest, RegisterRequest,
    UpdateProfileRequest, UserResponse,
};
use crate::services::auth_service::{self, Claims};
use crate::services::upload_service::{self, UploadFolder};
use crate::utils::AppError;

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("📝 POST /auth/register - email: {}", request.email);

    let response = auth_service::register(&db, &config.jwt, &request)
        .await
        .inspect_err(|e| log::warn!("❌ Registration failed: {} - {}", request.email, e))?;

    log::info!("✅ Registration successful: {}", response.user.email);
    Ok(HttpResponse::Created().json(response))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account inactive")
    )
)]
pub async fn login(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔐 POST /auth/login - email: {}", request.email);

    let response = auth_service::login(&db, &config.jwt, &request)
        .await
        .inspect_err(|e| log::warn!("❌ Login failed: {} - {}", request.email, e))?;

    log::info!("✅ Login successful: {}", request.email);
    Ok(HttpResponse::Ok().json(response))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthResponse),
        (status = 401, description = "Invalid refresh token")
    )
)]
pub async fn refresh_token(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔄 POST /auth/refresh");

    let response = auth_service::refresh_token(&db, &config.jwt, &request.refresh_token)
        .await
        .inspect_err(|e| log::warn!("❌ Token refresh failed: {}", e))?;

    Ok(HttpResponse::Ok().json(response))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, AppError> {
    let user = auth_service::get_current_user(&db, &claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": user })))
}

#[utoipa::path(
    put,
    path = "/api/auth/me",
    tag = "Auth",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Invalid input")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_me(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("✏️ PUT /auth/me - user: {}", claims.sub);
    let user = auth_service::update_profile(&db, &claims.user_id()?, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": user })))
}

#[utoipa::path(
    put,
    path = "/api/auth/me/password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Current password incorrect or new password too short")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    log::info!("🔑 PUT /auth/me/password - user: {}", claims.sub);
    auth_service::change_password(&db, &claims.user_id()?, &request).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Password changed"
    })))
}

#[utoipa::path(
    post,
    path = "/api/auth/me/avatar",
    tag = "Auth",
    request_body(content = crate::api::swagger::ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Avatar stored", body = UserResponse),
        (status = 400, description = "Missing or invalid image")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_avatar(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    claims: web::ReqData<Claims>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    log::info!("🖼️ POST /auth/me/avatar - user: {}", claims.sub);
    let user_id = claims.user_id()?;

    let urls = upload_service::save_images(payload, &config, UploadFolder::Avatars, 1).await?;
    let url = urls
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Validation("No file was uploaded".to_string()))?;

    let (user, previous) = auth_service::set_avatar(&db, &user_id, &url).await?;
    if let Some(old) = previous {
        upload_service::delete_file(&config, &old).await;
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": user })))
}
