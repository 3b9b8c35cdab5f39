use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use shop_service::services::{auth_service, upload_service};
use shop_service::{api, config::AppConfig, database, middleware};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    log::info!("🚀 Starting Shop Service...");

    // Initialize MongoDB connection (indexes are ensured on connect)
    let db = database::MongoDB::new(&config.database_url)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to MongoDB: {}", e)))?;
    log::info!("✅ MongoDB connected successfully");

    if let Some(admin) = &config.admin {
        match auth_service::ensure_admin(&db, admin).await {
            Ok(true) => log::info!("👑 Admin account created: {}", admin.email),
            Ok(false) => log::info!("👑 Admin account present: {}", admin.email),
            Err(e) => log::error!("❌ Could not bootstrap admin {}: {}", admin.email, e),
        }
    }

    for folder in [upload_service::UploadFolder::Products, upload_service::UploadFolder::Avatars] {
        tokio::fs::create_dir_all(std::path::Path::new(&config.upload_dir).join(folder.as_str())).await?;
    }

    let host = config.host.clone();
    let port = config.port;
    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    let db_data = web::Data::new(db);
    let config_data = web::Data::new(config);

    // Generate OpenAPI specification
    let openapi = api::swagger::ApiDoc::openapi();

    HttpServer::new(move || {
        let cors = config_data
            .cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::CACHE_CONTROL,
            ])
            .expose_headers(vec![header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
            .service(actix_files::Files::new(
                upload_service::PUBLIC_PREFIX,
                config_data.upload_dir.clone(),
            ))
            .configure(api::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
