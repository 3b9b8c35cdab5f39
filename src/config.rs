use std::{env, fmt::Display, str::FromStr};

/// JWT signing settings shared by token issuance and the auth middleware.
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_hours: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt: JwtSettings,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub shipping_fee: f64,
    pub free_shipping_threshold: f64,
    pub cors_origins: Vec<String>,
    pub admin: Option<AdminBootstrap>,
}

impl AppConfig {
    /// Reads the process environment. `.env` must already be loaded.
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("⚠️  JWT_SECRET not set, using an insecure development secret");
            "default-secret-change-me".to_string()
        });

        let admin = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                Some(AdminBootstrap {
                    email,
                    password,
                    name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
                })
            }
            _ => None,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: try_load("PORT", 3002)?,
            database_url,
            jwt: JwtSettings {
                secret: jwt_secret,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "shop-service".to_string()),
                audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "shop-api".to_string()),
                access_ttl_hours: try_load("JWT_TTL_HOURS", 24)?,
                refresh_ttl_days: try_load("REFRESH_TTL_DAYS", 30)?,
            },
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            shipping_fee: try_load("SHIPPING_FEE", 5.0)?,
            free_shipping_threshold: try_load("FREE_SHIPPING_THRESHOLD", 100.0)?,
            cors_origins: parse_list(
                &env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ),
            admin,
        })
    }
}

fn try_load<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {} value '{}': {}", key, raw, e)),
        Err(_) => {
            log::debug!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
impl JwtSettings {
    pub fn for_tests() -> Self {
        JwtSettings {
            secret: "test-secret".to_string(),
            issuer: "shop-service".to_string(),
            audience: "shop-api".to_string(),
            access_ttl_hours: 1,
            refresh_ttl_days: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("http://a.test, http://b.test,,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_try_load_default_when_missing() {
        let value: u16 = try_load("SHOP_SERVICE_TEST_UNSET_PORT", 8080).unwrap();
        assert_eq!(value, 8080);
    }
}
