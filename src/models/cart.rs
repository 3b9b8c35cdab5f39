use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::money::round_cents;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ObjectId,
    /// Variation sku; `None` for products without variations.
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub unit_price: f64,
    pub quantity: i64,
}

impl CartItem {
    pub fn same_line(&self, product_id: &ObjectId, sku: Option<&str>) -> bool {
        self.product_id == *product_id && self.sku.as_deref() == sku
    }

    pub fn line_total(&self) -> f64 {
        round_cents(self.unit_price * self.quantity as f64)
    }
}

/// Stored in the `carts` collection, one per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl Cart {
    pub fn empty(user_id: ObjectId) -> Self {
        Cart {
            id: None,
            user_id,
            items: vec![],
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }
}

pub fn subtotal(items: &[CartItem]) -> f64 {
    round_cents(items.iter().map(CartItem::line_total).sum())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Removed,
    QuantityReduced,
    PriceChanged,
}

/// A change applied to a cart line when it was reconciled with the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct CartAdjustment {
    pub product_id: String,
    pub sku: Option<String>,
    pub name: String,
    pub kind: AdjustmentKind,
    pub message: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CartItemRequest {
    pub product_id: String,
    pub sku: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RemoveCartItemRequest {
    pub product_id: String,
    pub sku: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MergeCartRequest {
    pub items: Vec<CartItemRequest>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CartItemResponse {
    pub product_id: String,
    pub sku: Option<String>,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: f64,
    pub quantity: i64,
    pub line_total: f64,
}

impl From<&CartItem> for CartItemResponse {
    fn from(item: &CartItem) -> Self {
        CartItemResponse {
            product_id: item.product_id.to_hex(),
            sku: item.sku.clone(),
            name: item.name.clone(),
            image: item.image.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
            line_total: item.line_total(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CartResponse {
    pub success: bool,
    pub items: Vec<CartItemResponse>,
    pub subtotal: f64,
    pub item_count: i64,
    pub adjustments: Vec<CartAdjustment>,
}

impl CartResponse {
    pub fn new(items: &[CartItem], adjustments: Vec<CartAdjustment>) -> Self {
        CartResponse {
            success: true,
            items: items.iter().map(CartItemResponse::from).collect(),
            subtotal: subtotal(items),
            item_count: items.iter().map(|i| i.quantity).sum(),
            adjustments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: f64, qty: i64) -> CartItem {
        CartItem {
            product_id: ObjectId::new(),
            sku: None,
            name: "Mug".into(),
            image: None,
            unit_price: price,
            quantity: qty,
        }
    }

    #[test]
    fn test_line_total_and_subtotal() {
        let items = vec![item(9.99, 3), item(0.1, 2)];
        assert_eq!(items[0].line_total(), 29.97);
        assert_eq!(subtotal(&items), 30.17);
    }

    #[test]
    fn test_same_line_matches_sku() {
        let mut line = item(1.0, 1);
        let pid = line.product_id;
        assert!(line.same_line(&pid, None));
        assert!(!line.same_line(&pid, Some("RED")));

        line.sku = Some("RED".into());
        assert!(line.same_line(&pid, Some("RED")));
        assert!(!line.same_line(&ObjectId::new(), Some("RED")));
    }

    #[test]
    fn test_cart_response_counts_units() {
        let items = vec![item(2.0, 3), item(5.0, 1)];
        let resp = CartResponse::new(&items, vec![]);
        assert_eq!(resp.item_count, 4);
        assert_eq!(resp.subtotal, 11.0);
        assert_eq!(resp.items.len(), 2);
    }
}
