pub mod auth;
pub mod security_headers;

pub use auth::{AdminUser, AuthMiddleware, AuthUser, MaybeUser};
pub use security_headers::SecurityHeaders;
