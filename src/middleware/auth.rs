use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

use crate::config::AppConfig;
use crate::services::auth_service::{self, Claims};
use crate::utils::AppError;

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(req: &HttpRequest) -> Result<Claims, AppError> {
    if let Some(claims) = req.extensions().get::<Claims>() {
        return Ok(claims.clone());
    }
    let config = req
        .app_data::<web::Data<AppConfig>>()
        .ok_or_else(|| AppError::Internal("Configuration missing".to_string()))?;
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization token".to_string()))?;
    let claims = auth_service::verify_token(&config.jwt, token)?;
    req.extensions_mut().insert(claims.clone());
    Ok(claims)
}

/// Rejects requests without a valid access token and stores the verified
/// `Claims` in request extensions for `web::ReqData<Claims>`.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // CORS preflight never carries credentials
        if req.method() == actix_web::http::Method::OPTIONS {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        match authenticate(req.request()) {
            Ok(_) => {
                let fut = self.service.call(req);
                Box::pin(fut)
            }
            Err(e) => {
                log::debug!("🔒 Rejected {} {}: {}", req.method(), req.path(), e);
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}

/// Any authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req).map(AuthUser))
    }
}

/// An authenticated caller holding the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req).and_then(|claims| {
            if claims.is_admin() {
                Ok(AdminUser(claims))
            } else {
                Err(AppError::Forbidden("Admin access required".to_string()))
            }
        }))
    }
}

/// Caller identity on public routes; a missing or invalid token is anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Claims>);

impl MaybeUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(Claims::is_admin)
    }
}

impl FromRequest for MaybeUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(MaybeUser(authenticate(req).ok())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtSettings;
    use crate::models::{User, UserRole};
    use actix_web::{get, test, App, HttpResponse};
    use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};

    fn config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: "mongodb://localhost:27017/shop_test".into(),
            jwt: JwtSettings::for_tests(),
            upload_dir: "./uploads".into(),
            max_upload_bytes: 1024,
            shipping_fee: 5.0,
            free_shipping_threshold: 100.0,
            cors_origins: vec![],
            admin: None,
        }
    }

    fn user(role: UserRole) -> User {
        User {
            id: Some(ObjectId::new()),
            email: "someone@example.com".into(),
            password: String::new(),
            name: "Someone".into(),
            phone: None,
            address: None,
            avatar: None,
            role,
            is_active: true,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    fn bearer(role: UserRole) -> String {
        let token = auth_service::generate_jwt(&JwtSettings::for_tests(), &user(role)).unwrap();
        format!("Bearer {}", token)
    }

    #[get("/who")]
    async fn who(claims: web::ReqData<Claims>) -> HttpResponse {
        HttpResponse::Ok().body(claims.email.clone())
    }

    #[get("/admin")]
    async fn admin_only(admin: AdminUser) -> HttpResponse {
        HttpResponse::Ok().body(admin.0.roles.join(","))
    }

    #[get("/maybe")]
    async fn maybe(user: MaybeUser) -> HttpResponse {
        HttpResponse::Ok().body(if user.0.is_some() { "known" } else { "anonymous" })
    }

    #[actix_web::test]
    async fn test_bearer_token() {
        let req = test::TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()), Some("abc.def"));

        let req = test::TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()), None);
    }

    #[actix_web::test]
    async fn test_middleware_requires_valid_token() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config()))
                .service(web::scope("").wrap(AuthMiddleware).service(who)),
        )
        .await;

        let req = test::TestRequest::get().uri("/who").to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), 401);

        let req = test::TestRequest::get()
            .uri("/who")
            .insert_header((AUTHORIZATION, "Bearer not-a-jwt"))
            .to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), 401);

        let req = test::TestRequest::get()
            .uri("/who")
            .insert_header((AUTHORIZATION, bearer(UserRole::Customer)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "someone@example.com");
    }

    #[actix_web::test]
    async fn test_admin_extractor() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config()))
                .service(admin_only),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/admin")
            .insert_header((AUTHORIZATION, bearer(UserRole::Customer)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::get()
            .uri("/admin")
            .insert_header((AUTHORIZATION, bearer(UserRole::Admin)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "admin");
    }

    #[actix_web::test]
    async fn test_maybe_user_tolerates_bad_tokens() {
        let app = test::init_service(
            App::new().app_data(web::Data::new(config())).service(maybe),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/maybe")
            .insert_header((AUTHORIZATION, "Bearer garbage"))
            .to_request();
        assert_eq!(test::call_and_read_body(&app, req).await, "anonymous");

        let req = test::TestRequest::get()
            .uri("/maybe")
            .insert_header((AUTHORIZATION, bearer(UserRole::Customer)))
            .to_request();
        assert_eq!(test::call_and_read_body(&app, req).await, "known");
    }
}
