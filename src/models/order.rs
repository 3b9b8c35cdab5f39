use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::user::Address;
use crate::utils::time::to_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }

    /// Customers may only cancel before the order is being prepared.
    pub fn customer_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ObjectId,
    pub sku: Option<String>,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: f64,
    pub quantity: i64,
    pub line_total: f64,
}

/// Customer details copied into the order at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CustomerSnapshot {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodSnapshot {
    pub id: ObjectId,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedVoucher {
    pub voucher_id: ObjectId,
    pub code: String,
    pub discount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    pub changed_at: BsonDateTime,
}

/// Stored in the `orders` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_number: String,
    pub user_id: ObjectId,
    pub items: Vec<OrderItem>,
    pub customer: CustomerSnapshot,
    pub payment_method: PaymentMethodSnapshot,
    #[serde(default)]
    pub voucher: Option<AppliedVoucher>,
    pub subtotal: f64,
    pub discount: f64,
    pub shipping_fee: f64,
    pub total: f64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// `ORD-YYYYMMDD-NNNNNN`; the numeric tail is random, collisions are retried by the caller.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let tail: u32 = rand::random_range(0..1_000_000);
    format!("ORD-{}-{:06}", now.format("%Y%m%d"), tail)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ShippingDetails {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Address,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateOrderRequest {
    pub shipping: ShippingDetails,
    pub payment_method_id: String,
    pub voucher_code: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Deserialize, Default)]
pub struct MyOrdersQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AdminOrdersQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueGrouping {
    #[default]
    Day,
    Month,
}

impl RevenueGrouping {
    pub fn date_format(&self) -> &'static str {
        match self {
            RevenueGrouping::Day => "%Y-%m-%d",
            RevenueGrouping::Month => "%Y-%m",
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RevenueQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_by: RevenueGrouping,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct RevenueBucket {
    pub period: String,
    pub revenue: f64,
    pub orders: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RevenueReport {
    pub success: bool,
    pub revenue: f64,
    pub orders: i64,
    pub average_order_value: f64,
    pub buckets: Vec<RevenueBucket>,
    pub status_counts: std::collections::BTreeMap<String, i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub sku: Option<String>,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: f64,
    pub quantity: i64,
    pub line_total: f64,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(i: OrderItem) -> Self {
        OrderItemResponse {
            product_id: i.product_id.to_hex(),
            sku: i.sku,
            name: i.name,
            image: i.image,
            unit_price: i.unit_price,
            quantity: i.quantity,
            line_total: i.line_total,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderPaymentMethodResponse {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderVoucherResponse {
    pub code: String,
    pub discount: f64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusChangeResponse {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub items: Vec<OrderItemResponse>,
    pub customer: CustomerSnapshot,
    pub payment_method: OrderPaymentMethodResponse,
    pub voucher: Option<OrderVoucherResponse>,
    pub subtotal: f64,
    pub discount: f64,
    pub shipping_fee: f64,
    pub total: f64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub note: Option<String>,
    pub status_history: Vec<StatusChangeResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        OrderResponse {
            id: o.id.map(|id| id.to_hex()).unwrap_or_default(),
            order_number: o.order_number,
            user_id: o.user_id.to_hex(),
            items: o.items.into_iter().map(OrderItemResponse::from).collect(),
            customer: o.customer,
            payment_method: OrderPaymentMethodResponse {
                id: o.payment_method.id.to_hex(),
                code: o.payment_method.code,
                name: o.payment_method.name,
            },
            voucher: o.voucher.map(|v| OrderVoucherResponse {
                code: v.code,
                discount: v.discount,
            }),
            subtotal: o.subtotal,
            discount: o.discount,
            shipping_fee: o.shipping_fee,
            total: o.total,
            status: o.status,
            payment_status: o.payment_status,
            note: o.note,
            status_history: o
                .status_history
                .into_iter()
                .map(|h| StatusChangeResponse {
                    status: h.status,
                    note: h.note,
                    changed_at: to_utc(h.changed_at),
                })
                .collect(),
            created_at: to_utc(o.created_at),
            updated_at: to_utc(o.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Processing.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));
        for next in OrderStatus::ALL {
            assert!(!Delivered.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_customer_cancellable() {
        assert!(OrderStatus::Pending.customer_cancellable());
        assert!(OrderStatus::Confirmed.customer_cancellable());
        assert!(!OrderStatus::Processing.customer_cancellable());
        assert!(!OrderStatus::Shipped.customer_cancellable());
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let number = generate_order_number(now);
        assert!(number.starts_with("ORD-20240309-"));
        assert_eq!(number.len(), "ORD-20240309-".len() + 6);
        assert!(number[13..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&OrderStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!(
            serde_json::from_str::<PaymentStatus>("\"refunded\"").unwrap(),
            PaymentStatus::Refunded
        );
    }
}
