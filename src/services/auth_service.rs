use crate::{
    config::{AdminBootstrap, JwtSettings},
    database::{MongoDB, USERS},
    models::user::{
        normalize_email, AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest,
        UpdateProfileRequest, User, UserResponse, UserRole,
    },
    utils::{AppError, AppResult},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id (hex ObjectId)
    pub email: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
    /// `access` or `refresh`
    pub typ: String,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == UserRole::Admin.as_str())
    }

    pub fn user_id(&self) -> AppResult<ObjectId> {
        ObjectId::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))
    }
}

fn sign(settings: &JwtSettings, user: &User, typ: &str, ttl: Duration) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.map(|id| id.to_hex()).unwrap_or_default(),
        email: user.email.clone(),
        name: Some(user.name.clone()),
        roles: vec![user.role.as_str().to_string()],
        is_active: user.is_active,
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: settings.audience.clone(),
        iss: settings.issuer.clone(),
        typ: typ.to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.secret.as_ref()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

pub fn generate_jwt(settings: &JwtSettings, user: &User) -> AppResult<String> {
    sign(settings, user, ACCESS, Duration::hours(settings.access_ttl_hours))
}

pub fn generate_refresh_token(settings: &JwtSettings, user: &User) -> AppResult<String> {
    sign(settings, user, REFRESH, Duration::days(settings.refresh_ttl_days))
}

fn decode_claims(settings: &JwtSettings, token: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[settings.audience.as_str()]);
    validation.set_issuer(&[settings.issuer.as_str()]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.secret.as_ref()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Verifies an access token. Refresh tokens are rejected here.
pub fn verify_token(settings: &JwtSettings, token: &str) -> AppResult<Claims> {
    let claims = decode_claims(settings, token)?;
    if claims.typ != ACCESS {
        return Err(AppError::Unauthorized("Invalid token type".to_string()));
    }
    if !claims.is_active {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }
    Ok(claims)
}

fn auth_response(settings: &JwtSettings, user: User) -> AppResult<AuthResponse> {
    let token = generate_jwt(settings, &user)?;
    let refresh_token = generate_refresh_token(settings, &user)?;
    Ok(AuthResponse {
        success: true,
        token,
        refresh_token,
        user: UserResponse::from(user),
    })
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub async fn find_user(db: &MongoDB, user_id: &ObjectId) -> AppResult<User> {
    db.collection::<User>(USERS)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

// User registration
pub async fn register(
    db: &MongoDB,
    settings: &JwtSettings,
    request: &RegisterRequest,
) -> AppResult<AuthResponse> {
    let email = normalize_email(&request.email)
        .ok_or_else(|| AppError::Validation("A valid email is required".to_string()))?;
    validate_password(&request.password)?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let collection = db.collection::<User>(USERS);

    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let now = BsonDateTime::now();
    let mut user = User {
        id: None,
        email,
        password: hash(&request.password, DEFAULT_COST)?,
        name: name.to_string(),
        phone: request.phone.clone().filter(|p| !p.trim().is_empty()),
        address: None,
        avatar: None,
        role: UserRole::Customer,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    // A concurrent registration with the same email loses on the unique index.
    let result = collection.insert_one(&user).await.map_err(|e| {
        if crate::utils::is_duplicate_key(&e) {
            AppError::Conflict("Email is already registered".to_string())
        } else {
            AppError::from(e)
        }
    })?;
    user.id = result.inserted_id.as_object_id();

    log::info!("✅ User registered successfully: {}", user.email);

    auth_response(settings, user)
}

// User login
pub async fn login(
    db: &MongoDB,
    settings: &JwtSettings,
    request: &LoginRequest,
) -> AppResult<AuthResponse> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let email = normalize_email(&request.email).ok_or_else(invalid)?;

    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(invalid)?;

    if !verify(&request.password, &user.password)? {
        return Err(invalid());
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    auth_response(settings, user)
}

// Refresh token
pub async fn refresh_token(
    db: &MongoDB,
    settings: &JwtSettings,
    refresh_token: &str,
) -> AppResult<AuthResponse> {
    let claims = decode_claims(settings, refresh_token)?;
    if claims.typ != REFRESH {
        return Err(AppError::Unauthorized("Invalid token type".to_string()));
    }

    let user = find_user(db, &claims.user_id()?)
        .await
        .map_err(|_| AppError::Unauthorized("User not found".to_string()))?;

    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    auth_response(settings, user)
}

// Get current user
pub async fn get_current_user(db: &MongoDB, user_id: &ObjectId) -> AppResult<UserResponse> {
    find_user(db, user_id).await.map(UserResponse::from)
}

pub async fn update_profile(
    db: &MongoDB,
    user_id: &ObjectId,
    request: UpdateProfileRequest,
) -> AppResult<UserResponse> {
    let mut set = doc! { "updated_at": BsonDateTime::now() };

    if let Some(name) = request.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Name cannot be empty".to_string()));
        }
        set.insert("name", name);
    }
    if let Some(phone) = request.phone {
        set.insert("phone", phone.trim());
    }
    if let Some(address) = request.address {
        address.validate().map_err(AppError::Validation)?;
        set.insert("address", to_bson(&address)?);
    }

    let result = db
        .collection::<User>(USERS)
        .update_one(doc! { "_id": user_id }, doc! { "$set": set })
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found("User"));
    }

    get_current_user(db, user_id).await
}

pub async fn change_password(
    db: &MongoDB,
    user_id: &ObjectId,
    request: &ChangePasswordRequest,
) -> AppResult<()> {
    let user = find_user(db, user_id).await?;

    if !verify(&request.current_password, &user.password)? {
        return Err(AppError::Validation("Current password is incorrect".to_string()));
    }
    validate_password(&request.new_password)?;

    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": {
                "password": hash(&request.new_password, DEFAULT_COST)?,
                "updated_at": BsonDateTime::now(),
            }},
        )
        .await?;

    log::info!("🔑 Password changed for user {}", user_id);
    Ok(())
}

/// Stores the avatar URL and returns the previous one so the caller can delete the file.
pub async fn set_avatar(
    db: &MongoDB,
    user_id: &ObjectId,
    url: &str,
) -> AppResult<(UserResponse, Option<String>)> {
    let previous = find_user(db, user_id).await?.avatar;

    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { "avatar": url, "updated_at": BsonDateTime::now() } },
        )
        .await?;

    Ok((get_current_user(db, user_id).await?, previous))
}

/// Creates the configured admin account when no user holds that email.
pub async fn ensure_admin(db: &MongoDB, admin: &AdminBootstrap) -> AppResult<bool> {
    let email = normalize_email(&admin.email)
        .ok_or_else(|| AppError::Validation("ADMIN_EMAIL is not a valid email".to_string()))?;
    validate_password(&admin.password)?;

    let collection = db.collection::<User>(USERS);
    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Ok(false);
    }

    let now = BsonDateTime::now();
    let user = User {
        id: None,
        email,
        password: hash(&admin.password, DEFAULT_COST)?,
        name: admin.name.clone(),
        phone: None,
        address: None,
        avatar: None,
        role: UserRole::Admin,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    collection.insert_one(&user).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User {
            id: Some(ObjectId::new()),
            email: "jane@example.com".into(),
            password: String::new(),
            name: "Jane".into(),
            phone: None,
            address: None,
            avatar: None,
            role,
            is_active: true,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let settings = JwtSettings::for_tests();
        let u = user(UserRole::Admin);
        let token = generate_jwt(&settings, &u).unwrap();

        let claims = verify_token(&settings, &token).unwrap();
        assert_eq!(claims.sub, u.id.unwrap().to_hex());
        assert_eq!(claims.email, "jane@example.com");
        assert!(claims.is_admin());
        assert_eq!(claims.user_id().unwrap(), u.id.unwrap());
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let settings = JwtSettings::for_tests();
        let token = generate_refresh_token(&settings, &user(UserRole::Customer)).unwrap();
        assert!(matches!(verify_token(&settings, &token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_token_with_other_secret_is_rejected() {
        let settings = JwtSettings::for_tests();
        let token = generate_jwt(&settings, &user(UserRole::Customer)).unwrap();

        let mut other = JwtSettings::for_tests();
        other.secret = "another-secret".into();
        assert!(verify_token(&other, &token).is_err());

        let mut other = JwtSettings::for_tests();
        other.audience = "another-api".into();
        assert!(verify_token(&other, &token).is_err());
    }

    #[test]
    fn test_inactive_account_token_is_forbidden() {
        let settings = JwtSettings::for_tests();
        let mut u = user(UserRole::Customer);
        u.is_active = false;
        let token = generate_jwt(&settings, &u).unwrap();
        assert!(matches!(verify_token(&settings, &token), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_customer_is_not_admin() {
        let settings = JwtSettings::for_tests();
        let token = generate_jwt(&settings, &user(UserRole::Customer)).unwrap();
        assert!(!verify_token(&settings, &token).unwrap().is_admin());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
    }
}
