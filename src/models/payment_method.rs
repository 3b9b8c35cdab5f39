use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::time::to_utc;

/// Stored in the `payment_methods` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    /// Stable lowercase identifier, e.g. `cod` or `bank_transfer`.
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

fn default_true() -> bool {
    true
}

/// Lowercase letters, digits and underscores only.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_lowercase();
    if code.is_empty()
        || !code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    Some(code)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreatePaymentMethodRequest {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdatePaymentMethodRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub icon: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentMethodQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaymentMethodResponse {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentMethod> for PaymentMethodResponse {
    fn from(m: PaymentMethod) -> Self {
        PaymentMethodResponse {
            id: m.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: m.name,
            code: m.code,
            description: m.description,
            instructions: m.instructions,
            icon: m.icon,
            sort_order: m.sort_order,
            is_active: m.is_active,
            created_at: to_utc(m.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" COD "), Some("cod".into()));
        assert_eq!(normalize_code("bank_transfer"), Some("bank_transfer".into()));
        assert_eq!(normalize_code("credit card"), None);
        assert_eq!(normalize_code(""), None);
    }
}
