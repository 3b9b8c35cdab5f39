use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::money::round_cents;
use crate::utils::time::{to_bson, to_utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// Stored in the `vouchers` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Always uppercase.
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: f64,
    #[serde(default)]
    pub min_order_value: f64,
    #[serde(default)]
    pub max_discount: Option<f64>,
    #[serde(default)]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub used_count: i64,
    #[serde(default)]
    pub once_per_user: bool,
    #[serde(default)]
    pub used_by: Vec<ObjectId>,
    #[serde(default)]
    pub starts_at: Option<BsonDateTime>,
    #[serde(default)]
    pub expires_at: Option<BsonDateTime>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

fn default_true() -> bool {
    true
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Why a voucher cannot be applied to an order.
#[derive(Debug, Clone, PartialEq)]
pub enum VoucherRejection {
    Inactive,
    NotStarted,
    Expired,
    UsageLimitReached,
    AlreadyUsed,
    BelowMinimum { min_order_value: f64 },
}

impl std::fmt::Display for VoucherRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoucherRejection::Inactive => write!(f, "Voucher is not active"),
            VoucherRejection::NotStarted => write!(f, "Voucher is not yet valid"),
            VoucherRejection::Expired => write!(f, "Voucher has expired"),
            VoucherRejection::UsageLimitReached => write!(f, "Voucher usage limit reached"),
            VoucherRejection::AlreadyUsed => write!(f, "You have already used this voucher"),
            VoucherRejection::BelowMinimum { min_order_value } => write!(
                f,
                "Order subtotal must be at least {:.2} to use this voucher",
                min_order_value
            ),
        }
    }
}

impl Voucher {
    /// Checks every redemption rule in order and returns the discount for `subtotal`.
    pub fn evaluate(
        &self,
        subtotal: f64,
        user_id: &ObjectId,
        now: DateTime<Utc>,
    ) -> Result<f64, VoucherRejection> {
        if !self.is_active {
            return Err(VoucherRejection::Inactive);
        }
        let now = to_bson(now);
        if matches!(self.starts_at, Some(start) if now < start) {
            return Err(VoucherRejection::NotStarted);
        }
        if matches!(self.expires_at, Some(end) if now >= end) {
            return Err(VoucherRejection::Expired);
        }
        if matches!(self.usage_limit, Some(limit) if self.used_count >= limit) {
            return Err(VoucherRejection::UsageLimitReached);
        }
        if self.once_per_user && self.used_by.contains(user_id) {
            return Err(VoucherRejection::AlreadyUsed);
        }
        if subtotal < self.min_order_value {
            return Err(VoucherRejection::BelowMinimum {
                min_order_value: self.min_order_value,
            });
        }
        Ok(self.discount_for(subtotal))
    }

    /// Never negative and never more than the subtotal.
    pub fn discount_for(&self, subtotal: f64) -> f64 {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let pct = subtotal * self.value / 100.0;
                match self.max_discount {
                    Some(cap) => pct.min(cap),
                    None => pct,
                }
            }
            DiscountType::Fixed => self.value,
        };
        round_cents(raw.clamp(0.0, subtotal.max(0.0)))
    }
}

pub fn validate_value(discount_type: DiscountType, value: f64) -> Result<(), String> {
    if !value.is_finite() {
        return Err("Voucher value is invalid".to_string());
    }
    match discount_type {
        DiscountType::Percentage if value <= 0.0 || value > 100.0 => {
            Err("Percentage vouchers must have a value in (0, 100]".to_string())
        }
        DiscountType::Fixed if value <= 0.0 => {
            Err("Fixed vouchers must have a positive value".to_string())
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateVoucherRequest {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: f64,
    #[serde(default)]
    pub min_order_value: f64,
    pub max_discount: Option<f64>,
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub once_per_user: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateVoucherRequest {
    pub code: Option<String>,
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub value: Option<f64>,
    pub min_order_value: Option<f64>,
    pub max_discount: Option<f64>,
    pub usage_limit: Option<i64>,
    pub once_per_user: Option<bool>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ValidateVoucherRequest {
    pub code: String,
    pub subtotal: Option<f64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ValidateVoucherResponse {
    pub success: bool,
    pub code: String,
    pub discount: f64,
    pub subtotal: f64,
    pub total_after_discount: f64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VoucherResponse {
    pub id: String,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: f64,
    pub min_order_value: f64,
    pub max_discount: Option<f64>,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub once_per_user: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Voucher> for VoucherResponse {
    fn from(v: Voucher) -> Self {
        VoucherResponse {
            id: v.id.map(|id| id.to_hex()).unwrap_or_default(),
            code: v.code,
            description: v.description,
            discount_type: v.discount_type,
            value: v.value,
            min_order_value: v.min_order_value,
            max_discount: v.max_discount,
            usage_limit: v.usage_limit,
            used_count: v.used_count,
            once_per_user: v.once_per_user,
            starts_at: v.starts_at.map(to_utc),
            expires_at: v.expires_at.map(to_utc),
            is_active: v.is_active,
            created_at: to_utc(v.created_at),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn voucher(discount_type: DiscountType, value: f64) -> Voucher {
        Voucher {
            id: Some(ObjectId::new()),
            code: "SAVE".to_string(),
            description: None,
            discount_type,
            value,
            min_order_value: 0.0,
            max_discount: None,
            usage_limit: None,
            used_count: 0,
            once_per_user: false,
            used_by: vec![],
            starts_at: None,
            expires_at: None,
            is_active: true,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::voucher;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_percentage_discount_with_cap() {
        let mut v = voucher(DiscountType::Percentage, 10.0);
        assert_eq!(v.discount_for(250.0), 25.0);

        v.max_discount = Some(20.0);
        assert_eq!(v.discount_for(250.0), 20.0);
        assert_eq!(v.discount_for(99.99), 10.0);
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        let v = voucher(DiscountType::Fixed, 15.0);
        assert_eq!(v.discount_for(100.0), 15.0);
        assert_eq!(v.discount_for(9.5), 9.5);
    }

    #[test]
    fn test_rejections_in_order() {
        let user = ObjectId::new();
        let now = Utc::now();

        let mut v = voucher(DiscountType::Fixed, 5.0);
        v.is_active = false;
        assert_eq!(v.evaluate(50.0, &user, now), Err(VoucherRejection::Inactive));

        let mut v = voucher(DiscountType::Fixed, 5.0);
        v.starts_at = Some(to_bson(now + Duration::days(1)));
        assert_eq!(v.evaluate(50.0, &user, now), Err(VoucherRejection::NotStarted));

        let mut v = voucher(DiscountType::Fixed, 5.0);
        v.expires_at = Some(to_bson(now - Duration::minutes(1)));
        assert_eq!(v.evaluate(50.0, &user, now), Err(VoucherRejection::Expired));

        let mut v = voucher(DiscountType::Fixed, 5.0);
        v.usage_limit = Some(3);
        v.used_count = 3;
        assert_eq!(v.evaluate(50.0, &user, now), Err(VoucherRejection::UsageLimitReached));

        let mut v = voucher(DiscountType::Fixed, 5.0);
        v.once_per_user = true;
        v.used_by = vec![user];
        assert_eq!(v.evaluate(50.0, &user, now), Err(VoucherRejection::AlreadyUsed));
        assert_eq!(v.evaluate(50.0, &ObjectId::new(), now), Ok(5.0));

        let mut v = voucher(DiscountType::Fixed, 5.0);
        v.min_order_value = 60.0;
        assert_eq!(
            v.evaluate(50.0, &user, now),
            Err(VoucherRejection::BelowMinimum { min_order_value: 60.0 })
        );
        assert_eq!(v.evaluate(60.0, &user, now), Ok(5.0));
    }

    #[test]
    fn test_rejection_messages() {
        let msg = VoucherRejection::BelowMinimum { min_order_value: 50.0 }.to_string();
        assert_eq!(msg, "Order subtotal must be at least 50.00 to use this voucher");
    }

    #[test]
    fn test_validate_value() {
        assert!(validate_value(DiscountType::Percentage, 100.0).is_ok());
        assert!(validate_value(DiscountType::Percentage, 0.0).is_err());
        assert!(validate_value(DiscountType::Percentage, 120.0).is_err());
        assert!(validate_value(DiscountType::Fixed, 0.01).is_ok());
        assert!(validate_value(DiscountType::Fixed, -1.0).is_err());
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" summer10 "), "SUMMER10");
    }
}
