use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::utils::time::to_utc;

/// A purchasable variant (size, colour, ...) embedded in its product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Variation {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Overrides the product price when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub stock: i64,
}

/// Stored in the `products` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub sku: String,
    pub price: f64,
    #[serde(default)]
    pub compare_at_price: Option<f64>,
    #[serde(default)]
    pub category_id: Option<ObjectId>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variations: Vec<Variation>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub sold: i64,
    #[serde(default)]
    pub rating_average: f64,
    #[serde(default)]
    pub rating_count: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

fn default_true() -> bool {
    true
}

/// What a (product, sku) pair resolves to when buying.
#[derive(Debug, PartialEq)]
pub enum Purchasable<'a> {
    Simple,
    Variation(&'a Variation),
}

impl Product {
    pub fn has_variations(&self) -> bool {
        !self.variations.is_empty()
    }

    pub fn variation(&self, sku: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.sku == sku)
    }

    /// A variation sku is required exactly when the product has variations.
    pub fn resolve(&self, sku: Option<&str>) -> Result<Purchasable<'_>, String> {
        match (self.has_variations(), sku) {
            (true, Some(sku)) => self
                .variation(sku)
                .map(Purchasable::Variation)
                .ok_or_else(|| format!("Variation {} not found for {}", sku, self.name)),
            (true, None) => Err(format!("Please choose a variation of {}", self.name)),
            (false, Some(sku)) if sku != self.sku => {
                Err(format!("{} has no variation {}", self.name, sku))
            }
            (false, _) => Ok(Purchasable::Simple),
        }
    }

    pub fn available_stock(&self, item: &Purchasable<'_>) -> i64 {
        match item {
            Purchasable::Simple => self.stock.max(0),
            Purchasable::Variation(v) => v.stock.max(0),
        }
    }

    pub fn unit_price(&self, item: &Purchasable<'_>) -> f64 {
        match item {
            Purchasable::Simple => self.price,
            Purchasable::Variation(v) => v.price.unwrap_or(self.price),
        }
    }

    pub fn display_name(&self, item: &Purchasable<'_>) -> String {
        match item {
            Purchasable::Simple => self.name.clone(),
            Purchasable::Variation(v) => format!("{} - {}", self.name, v.name),
        }
    }

    pub fn primary_image(&self) -> Option<String> {
        self.images.first().cloned()
    }
}

pub fn total_variation_stock(variations: &[Variation]) -> i64 {
    variations.iter().map(|v| v.stock.max(0)).sum()
}

/// Checks variation skus are unique, distinct from the product sku, and
/// that stock and prices are non-negative.
pub fn validate_variations(product_sku: &str, variations: &[Variation]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for v in variations {
        let sku = v.sku.trim();
        if sku.is_empty() {
            return Err("Variation sku is required".to_string());
        }
        if sku == product_sku {
            return Err(format!("Variation sku {} duplicates the product sku", sku));
        }
        if !seen.insert(sku) {
            return Err(format!("Duplicate variation sku {}", sku));
        }
        if v.stock < 0 {
            return Err(format!("Variation {} stock cannot be negative", sku));
        }
        if let Some(price) = v.price {
            if !crate::utils::money::is_valid_amount(price) {
                return Err(format!("Variation {} price is invalid", sku));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub sku: String,
    pub price: f64,
    pub compare_at_price: Option<f64>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variations: Vec<Variation>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
}

/// Every field optional; an empty `category_id` detaches the product.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub compare_at_price: Option<f64>,
    pub category_id: Option<String>,
    pub images: Option<Vec<String>>,
    pub variations: Option<Vec<Variation>>,
    pub stock: Option<i64>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    BestSelling,
    Rating,
    Name,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub featured: Option<bool>,
    pub in_stock: Option<bool>,
    pub sort: Option<ProductSort>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RemoveImageRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub sku: String,
    pub price: f64,
    pub compare_at_price: Option<f64>,
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryRef>,
    pub images: Vec<String>,
    pub variations: Vec<Variation>,
    pub stock: i64,
    pub in_stock: bool,
    pub sold: i64,
    pub rating_average: f64,
    pub rating_count: i64,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        ProductResponse {
            id: p.id.map(|id| id.to_hex()).unwrap_or_default(),
            in_stock: p.stock > 0,
            name: p.name,
            slug: p.slug,
            description: p.description,
            sku: p.sku,
            price: p.price,
            compare_at_price: p.compare_at_price,
            category_id: p.category_id.map(|id| id.to_hex()),
            category: None,
            images: p.images,
            variations: p.variations,
            stock: p.stock,
            sold: p.sold,
            rating_average: p.rating_average,
            rating_count: p.rating_count,
            is_active: p.is_active,
            is_featured: p.is_featured,
            created_at: to_utc(p.created_at),
            updated_at: to_utc(p.updated_at),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn product(sku: &str, price: f64, stock: i64) -> Product {
        Product {
            id: Some(ObjectId::new()),
            name: format!("Product {}", sku),
            slug: sku.to_lowercase(),
            description: String::new(),
            sku: sku.to_string(),
            price,
            compare_at_price: None,
            category_id: None,
            images: vec![format!("/uploads/products/{}.jpg", sku)],
            variations: vec![],
            stock,
            sold: 0,
            rating_average: 0.0,
            rating_count: 0,
            is_active: true,
            is_featured: false,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    pub fn variation(sku: &str, price: Option<f64>, stock: i64) -> Variation {
        Variation {
            sku: sku.to_string(),
            name: sku.to_string(),
            attributes: BTreeMap::new(),
            price,
            stock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_resolve_simple_product() {
        let p = product("TEE", 10.0, 3);
        assert_eq!(p.resolve(None), Ok(Purchasable::Simple));
        assert_eq!(p.resolve(Some("TEE")), Ok(Purchasable::Simple));
        assert!(p.resolve(Some("TEE-RED")).is_err());
        assert_eq!(p.available_stock(&Purchasable::Simple), 3);
    }

    #[test]
    fn test_resolve_requires_variation() {
        let mut p = product("TEE", 10.0, 0);
        p.variations = vec![variation("TEE-S", None, 2), variation("TEE-L", Some(12.5), 0)];

        assert!(p.resolve(None).unwrap_err().contains("choose a variation"));
        assert!(p.resolve(Some("TEE-XL")).is_err());

        let large = p.resolve(Some("TEE-L")).unwrap();
        assert_eq!(p.unit_price(&large), 12.5);
        assert_eq!(p.available_stock(&large), 0);
        assert_eq!(p.display_name(&large), "Product TEE - TEE-L");

        let small = p.resolve(Some("TEE-S")).unwrap();
        assert_eq!(p.unit_price(&small), 10.0);
    }

    #[test]
    fn test_total_variation_stock_ignores_negative() {
        let vs = vec![variation("A", None, 4), variation("B", None, -2), variation("C", None, 1)];
        assert_eq!(total_variation_stock(&vs), 5);
    }

    #[test]
    fn test_validate_variations() {
        assert!(validate_variations("TEE", &[variation("TEE-S", None, 1)]).is_ok());
        assert!(validate_variations("TEE", &[variation("TEE", None, 1)]).is_err());
        assert!(
            validate_variations("TEE", &[variation("TEE-S", None, 1), variation("TEE-S", None, 2)])
                .unwrap_err()
                .contains("Duplicate")
        );
        assert!(validate_variations("TEE", &[variation("TEE-S", None, -1)]).is_err());
        assert!(validate_variations("TEE", &[variation("TEE-S", Some(-5.0), 1)]).is_err());
    }
}
