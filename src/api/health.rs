use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::database::MongoDB;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: i64,
    /// `connected` or `unreachable`
    pub database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(db: web::Data<MongoDB>) -> HttpResponse {
    let connected = db.ping().await;
    let body = HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        service: "shop-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        database: if connected { "connected" } else { "unreachable" }.to_string(),
    };

    if connected {
        HttpResponse::Ok().json(body)
    } else {
        log::warn!("⚠️ Health check: database unreachable");
        HttpResponse::ServiceUnavailable().json(body)
    }
}
