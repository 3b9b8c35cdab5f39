use std::collections::HashMap;
use std::fmt;

use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime};

use crate::database::{MongoDB, CARTS, PRODUCTS};
use crate::models::product::total_variation_stock;
use crate::models::{Cart, CartItem, Product, Variation};
use crate::services::product_service;
use crate::utils::AppResult;

#[derive(Debug, Default, PartialEq)]
pub struct StockReport {
    pub products_scanned: usize,
    pub products_fixed: usize,
    pub carts_scanned: usize,
    pub carts_fixed: usize,
    pub lines_removed: usize,
}

impl fmt::Display for StockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "products: {} scanned, {} fixed | carts: {} scanned, {} fixed, {} line(s) removed",
            self.products_scanned,
            self.products_fixed,
            self.carts_scanned,
            self.carts_fixed,
            self.lines_removed
        )
    }
}

/// Corrected stock fields for a product, if anything was off.
#[derive(Debug, PartialEq)]
pub struct StockFix {
    pub stock: i64,
    pub variations: Vec<Variation>,
}

pub fn plan_product(product: &Product) -> Option<StockFix> {
    let variations: Vec<Variation> = product
        .variations
        .iter()
        .cloned()
        .map(|mut v| {
            v.stock = v.stock.max(0);
            v
        })
        .collect();

    let stock = if variations.is_empty() {
        product.stock.max(0)
    } else {
        total_variation_stock(&variations)
    };

    (stock != product.stock || variations != product.variations)
        .then_some(StockFix { stock, variations })
}

/// Drops lines whose product or variation no longer exists.
pub fn prune_lines(items: &[CartItem], products: &HashMap<ObjectId, Product>) -> Vec<CartItem> {
    items
        .iter()
        .filter(|line| {
            products
                .get(&line.product_id)
                .is_some_and(|p| p.resolve(line.sku.as_deref()).is_ok())
        })
        .cloned()
        .collect()
}

pub async fn run(db: &MongoDB) -> AppResult<StockReport> {
    let mut report = StockReport::default();
    let products = db.collection::<Product>(PRODUCTS);

    let mut cursor = products.find(doc! {}).await?;
    while let Some(product) = cursor.try_next().await? {
        report.products_scanned += 1;
        let (Some(id), Some(fix)) = (product.id, plan_product(&product)) else {
            continue;
        };

        log::info!("   🔧 {} ({}): stock {} -> {}", product.name, product.sku, product.stock, fix.stock);
        products
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "stock": fix.stock,
                    "variations": to_bson(&fix.variations)?,
                    "updated_at": BsonDateTime::now(),
                }},
            )
            .await?;
        report.products_fixed += 1;
    }

    let carts = db.collection::<Cart>(CARTS);
    let all_carts: Vec<Cart> = carts.find(doc! {}).await?.try_collect().await?;

    let mut ids: Vec<ObjectId> = all_carts
        .iter()
        .flat_map(|c| c.items.iter().map(|i| i.product_id))
        .collect();
    ids.sort();
    ids.dedup();
    let known = product_service::find_many(db, &ids).await?;

    for cart in &all_carts {
        report.carts_scanned += 1;
        let kept = prune_lines(&cart.items, &known);
        if kept.len() == cart.items.len() {
            continue;
        }

        report.lines_removed += cart.items.len() - kept.len();
        report.carts_fixed += 1;
        carts
            .update_one(
                doc! { "user_id": cart.user_id },
                doc! { "$set": { "items": to_bson(&kept)?, "updated_at": BsonDateTime::now() } },
            )
            .await?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::fixtures::{product, variation};

    #[test]
    fn test_plan_product_sums_variation_stock() {
        let mut p = product("Shirt", 10.0, 99);
        p.variations = vec![variation("SHIRT-S", None, 3), variation("SHIRT-M", None, 4)];

        let fix = plan_product(&p).unwrap();
        assert_eq!(fix.stock, 7);
        assert_eq!(fix.variations, p.variations);
    }

    #[test]
    fn test_plan_product_clamps_negative_stock() {
        let p = product("Mug", 5.0, -2);
        assert_eq!(plan_product(&p).unwrap().stock, 0);

        let mut p = product("Shirt", 10.0, 2);
        p.variations = vec![variation("SHIRT-S", None, -1), variation("SHIRT-M", None, 2)];
        let fix = plan_product(&p).unwrap();
        assert_eq!(fix.stock, 2);
        assert_eq!(fix.variations[0].stock, 0);
    }

    #[test]
    fn test_plan_product_leaves_consistent_products_alone() {
        let mut p = product("Shirt", 10.0, 5);
        p.variations = vec![variation("SHIRT-S", None, 2), variation("SHIRT-M", None, 3)];
        assert_eq!(plan_product(&p), None);
        assert_eq!(plan_product(&product("Mug", 5.0, 4)), None);
    }

    #[test]
    fn test_prune_lines() {
        let mut shirt = product("Shirt", 10.0, 2);
        shirt.variations = vec![variation("SHIRT-S", None, 2)];
        let mug = product("Mug", 5.0, 4);
        let gone = ObjectId::new();

        let line = |product_id: ObjectId, sku: Option<&str>| CartItem {
            product_id,
            sku: sku.map(String::from),
            name: "x".into(),
            image: None,
            unit_price: 1.0,
            quantity: 1,
        };
        let items = vec![
            line(shirt.id.unwrap(), Some("SHIRT-S")),
            line(shirt.id.unwrap(), Some("SHIRT-XL")),
            line(mug.id.unwrap(), None),
            line(gone, None),
        ];

        let products: HashMap<ObjectId, Product> = [shirt.clone(), mug.clone()]
            .into_iter()
            .map(|p| (p.id.unwrap(), p))
            .collect();

        let kept = prune_lines(&items, &products);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].sku.as_deref(), Some("SHIRT-S"));
        assert_eq!(kept[1].product_id, mug.id.unwrap());
    }
}
