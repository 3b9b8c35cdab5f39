use crate::{
    database::{MongoDB, CARTS},
    models::cart::{
        AdjustmentKind, Cart, CartAdjustment, CartItem, CartItemRequest, CartResponse,
        MergeCartRequest, RemoveCartItemRequest,
    },
    models::product::{Product, Purchasable},
    services::product_service,
    utils::{AppError, AppResult},
};
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime};
use std::collections::HashMap;

/// Lines for a simple product store no sku even if the client sent the product sku.
fn line_sku(item: &Purchasable<'_>) -> Option<String> {
    match item {
        Purchasable::Simple => None,
        Purchasable::Variation(v) => Some(v.sku.clone()),
    }
}

fn adjustment(item: &CartItem, kind: AdjustmentKind, message: String) -> CartAdjustment {
    CartAdjustment {
        product_id: item.product_id.to_hex(),
        sku: item.sku.clone(),
        name: item.name.clone(),
        kind,
        message,
    }
}

/// Brings cart lines in line with the live catalog.
///
/// Lines whose product is missing or inactive, whose variation no longer
/// exists, or which have no stock left are dropped. Quantities are clamped to
/// available stock and name, image and unit price are refreshed. Every change
/// is reported.
pub fn reconcile(
    items: Vec<CartItem>,
    products: &HashMap<ObjectId, Product>,
) -> (Vec<CartItem>, Vec<CartAdjustment>) {
    let mut kept = Vec::with_capacity(items.len());
    let mut adjustments = Vec::new();

    for mut line in items {
        let product = match products.get(&line.product_id).filter(|p| p.is_active) {
            Some(p) => p,
            None => {
                adjustments.push(adjustment(
                    &line,
                    AdjustmentKind::Removed,
                    format!("{} is no longer available", line.name),
                ));
                continue;
            }
        };

        let purchasable = match product.resolve(line.sku.as_deref()) {
            Ok(p) => p,
            Err(_) => {
                adjustments.push(adjustment(
                    &line,
                    AdjustmentKind::Removed,
                    format!("{} is no longer available", line.name),
                ));
                continue;
            }
        };

        if line.quantity <= 0 {
            adjustments.push(adjustment(
                &line,
                AdjustmentKind::Removed,
                format!("{} had an invalid quantity", line.name),
            ));
            continue;
        }

        line.name = product.display_name(&purchasable);
        line.image = product.primary_image();

        let available = product.available_stock(&purchasable);
        if available == 0 {
            adjustments.push(adjustment(
                &line,
                AdjustmentKind::Removed,
                format!("{} is out of stock", line.name),
            ));
            continue;
        }
        if line.quantity > available {
            adjustments.push(adjustment(
                &line,
                AdjustmentKind::QuantityReduced,
                format!(
                    "Only {} of {} left; quantity reduced from {}",
                    available, line.name, line.quantity
                ),
            ));
            line.quantity = available;
        }

        let price = product.unit_price(&purchasable);
        if (price - line.unit_price).abs() > f64::EPSILON {
            adjustments.push(adjustment(
                &line,
                AdjustmentKind::PriceChanged,
                format!("Price of {} changed from {:.2} to {:.2}", line.name, line.unit_price, price),
            ));
            line.unit_price = price;
        }

        kept.push(line);
    }

    (kept, adjustments)
}

async fn load(db: &MongoDB, user_id: &ObjectId) -> AppResult<Cart> {
    Ok(db
        .collection::<Cart>(CARTS)
        .find_one(doc! { "user_id": user_id })
        .await?
        .unwrap_or_else(|| Cart::empty(*user_id)))
}

async fn save(db: &MongoDB, user_id: &ObjectId, items: &[CartItem]) -> AppResult<()> {
    let now = BsonDateTime::now();
    db.collection::<Cart>(CARTS)
        .update_one(
            doc! { "user_id": user_id },
            doc! {
                "$set": { "items": to_bson(items)?, "updated_at": now },
                "$setOnInsert": { "created_at": now },
            },
        )
        .upsert(true)
        .await?;
    Ok(())
}

async fn products_for(db: &MongoDB, items: &[CartItem]) -> AppResult<HashMap<ObjectId, Product>> {
    let mut ids: Vec<ObjectId> = items.iter().map(|i| i.product_id).collect();
    ids.sort();
    ids.dedup();
    product_service::find_many(db, &ids).await
}

/// The user's reconciled cart items, persisted when reconciliation changed them.
pub async fn current_items(
    db: &MongoDB,
    user_id: &ObjectId,
) -> AppResult<(Vec<CartItem>, Vec<CartAdjustment>)> {
    let cart = load(db, user_id).await?;
    let products = products_for(db, &cart.items).await?;
    let (items, adjustments) = reconcile(cart.items.clone(), &products);

    if cart.id.is_none() || items != cart.items {
        save(db, user_id, &items).await?;
    }
    Ok((items, adjustments))
}

pub async fn get(db: &MongoDB, user_id: &ObjectId) -> AppResult<CartResponse> {
    let (items, adjustments) = current_items(db, user_id).await?;
    Ok(CartResponse::new(&items, adjustments))
}

/// Quantity of a line after adding `extra` units to it.
fn combined_quantity(current: i64, extra: i64) -> AppResult<i64> {
    current
        .checked_add(extra)
        .ok_or_else(|| AppError::Validation("Quantity is too large".to_string()))
}

async fn active_product(db: &MongoDB, raw_id: &str) -> AppResult<Product> {
    let id = ObjectId::parse_str(raw_id)?;
    let product = product_service::find_by_id(db, &id).await?;
    if !product.is_active {
        return Err(AppError::not_found("Product"));
    }
    Ok(product)
}

pub async fn add_item(
    db: &MongoDB,
    user_id: &ObjectId,
    request: &CartItemRequest,
) -> AppResult<CartResponse> {
    if request.quantity <= 0 {
        return Err(AppError::Validation("Quantity must be at least 1".to_string()));
    }
    let product = active_product(db, &request.product_id).await?;
    let purchasable = product.resolve(request.sku.as_deref()).map_err(AppError::Validation)?;
    let sku = line_sku(&purchasable);
    let product_id = product.id.ok_or_else(|| AppError::not_found("Product"))?;

    let (mut items, adjustments) = current_items(db, user_id).await?;
    let existing = items
        .iter()
        .position(|i| i.same_line(&product_id, sku.as_deref()));
    let current = existing.map(|idx| items[idx].quantity).unwrap_or(0);
    let wanted = combined_quantity(current, request.quantity)?;

    let available = product.available_stock(&purchasable);
    if wanted > available {
        return Err(AppError::Validation(format!(
            "Only {} of {} in stock",
            available,
            product.display_name(&purchasable)
        )));
    }

    match existing {
        Some(idx) => items[idx].quantity = wanted,
        None => items.push(CartItem {
            product_id,
            sku,
            name: product.display_name(&purchasable),
            image: product.primary_image(),
            unit_price: product.unit_price(&purchasable),
            quantity: wanted,
        }),
    }

    save(db, user_id, &items).await?;
    log::info!("🛒 Cart {}: added {} x {}", user_id, request.quantity, product.sku);
    Ok(CartResponse::new(&items, adjustments))
}

pub async fn update_item(
    db: &MongoDB,
    user_id: &ObjectId,
    request: &CartItemRequest,
) -> AppResult<CartResponse> {
    if request.quantity < 0 {
        return Err(AppError::Validation("Quantity cannot be negative".to_string()));
    }
    if request.quantity == 0 {
        return remove_item(
            db,
            user_id,
            &RemoveCartItemRequest {
                product_id: request.product_id.clone(),
                sku: request.sku.clone(),
            },
        )
        .await;
    }

    let product = active_product(db, &request.product_id).await?;
    let purchasable = product.resolve(request.sku.as_deref()).map_err(AppError::Validation)?;
    let sku = line_sku(&purchasable);
    let product_id = product.id.ok_or_else(|| AppError::not_found("Product"))?;

    let (mut items, adjustments) = current_items(db, user_id).await?;
    let idx = items
        .iter()
        .position(|i| i.same_line(&product_id, sku.as_deref()))
        .ok_or_else(|| AppError::not_found("Cart item"))?;

    let available = product.available_stock(&purchasable);
    if request.quantity > available {
        return Err(AppError::Validation(format!(
            "Only {} of {} in stock",
            available,
            product.display_name(&purchasable)
        )));
    }
    items[idx].quantity = request.quantity;

    save(db, user_id, &items).await?;
    Ok(CartResponse::new(&items, adjustments))
}

pub async fn remove_item(
    db: &MongoDB,
    user_id: &ObjectId,
    request: &RemoveCartItemRequest,
) -> AppResult<CartResponse> {
    let product_id = ObjectId::parse_str(&request.product_id)?;
    let cart = load(db, user_id).await?;

    let exact = cart
        .items
        .iter()
        .position(|i| i.same_line(&product_id, request.sku.as_deref()));
    // Simple products may be addressed by their own sku.
    let idx = exact
        .or_else(|| {
            request.sku.as_ref()?;
            cart.items.iter().position(|i| i.same_line(&product_id, None))
        })
        .ok_or_else(|| AppError::not_found("Cart item"))?;

    let mut items = cart.items;
    items.remove(idx);

    let products = products_for(db, &items).await?;
    let (items, adjustments) = reconcile(items, &products);
    save(db, user_id, &items).await?;
    Ok(CartResponse::new(&items, adjustments))
}

pub async fn clear(db: &MongoDB, user_id: &ObjectId) -> AppResult<CartResponse> {
    save(db, user_id, &[]).await?;
    log::info!("🧹 Cart {} cleared", user_id);
    Ok(CartResponse::new(&[], vec![]))
}

/// Folds guest lines into `items`. Unknown or unavailable lines are reported
/// and skipped; summed quantities are clamped to stock.
pub fn merge_lines(
    mut items: Vec<CartItem>,
    incoming: &[CartItemRequest],
    products: &HashMap<ObjectId, Product>,
) -> (Vec<CartItem>, Vec<CartAdjustment>) {
    let mut skipped = Vec::new();

    for request in incoming {
        let skip = |name: String, message: &str| CartAdjustment {
            product_id: request.product_id.clone(),
            sku: request.sku.clone(),
            name,
            kind: AdjustmentKind::Removed,
            message: message.to_string(),
        };

        if request.quantity <= 0 {
            skipped.push(skip(String::new(), "Invalid quantity"));
            continue;
        }
        let product = match ObjectId::parse_str(&request.product_id)
            .ok()
            .and_then(|id| products.get(&id))
            .filter(|p| p.is_active)
        {
            Some(p) => p,
            None => {
                skipped.push(skip(String::new(), "Product is not available"));
                continue;
            }
        };
        let purchasable = match product.resolve(request.sku.as_deref()) {
            Ok(p) => p,
            Err(message) => {
                skipped.push(skip(product.name.clone(), &message));
                continue;
            }
        };
        let available = product.available_stock(&purchasable);
        if available == 0 {
            skipped.push(skip(product.display_name(&purchasable), "Out of stock"));
            continue;
        }

        let Some(product_id) = product.id else { continue };
        let sku = line_sku(&purchasable);
        match items.iter_mut().find(|i| i.same_line(&product_id, sku.as_deref())) {
            Some(line) => line.quantity = line.quantity.saturating_add(request.quantity).min(available),
            None => items.push(CartItem {
                product_id,
                sku,
                name: product.display_name(&purchasable),
                image: product.primary_image(),
                unit_price: product.unit_price(&purchasable),
                quantity: request.quantity.min(available),
            }),
        }
    }

    (items, skipped)
}

pub async fn merge(
    db: &MongoDB,
    user_id: &ObjectId,
    request: &MergeCartRequest,
) -> AppResult<CartResponse> {
    let (items, mut adjustments) = current_items(db, user_id).await?;

    let mut ids: Vec<ObjectId> = request
        .items
        .iter()
        .filter_map(|i| ObjectId::parse_str(&i.product_id).ok())
        .collect();
    ids.sort();
    ids.dedup();
    let products = product_service::find_many(db, &ids).await?;

    let (items, skipped) = merge_lines(items, &request.items, &products);
    save(db, user_id, &items).await?;

    log::info!(
        "🛒 Cart {} merged {} guest line(s), {} skipped",
        user_id,
        request.items.len() - skipped.len(),
        skipped.len()
    );
    adjustments.extend(skipped);
    Ok(CartResponse::new(&items, adjustments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::fixtures::{product, variation};

    fn line(p: &Product, sku: Option<&str>, price: f64, qty: i64) -> CartItem {
        CartItem {
            product_id: p.id.unwrap(),
            sku: sku.map(String::from),
            name: p.name.clone(),
            image: None,
            unit_price: price,
            quantity: qty,
        }
    }

    fn catalog(products: &[Product]) -> HashMap<ObjectId, Product> {
        products.iter().map(|p| (p.id.unwrap(), p.clone())).collect()
    }

    #[test]
    fn test_reconcile_keeps_valid_lines() {
        let mug = product("MUG", 8.0, 10);
        let (items, adjustments) = reconcile(vec![line(&mug, None, 8.0, 2)], &catalog(&[mug.clone()]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].image.as_deref(), Some("/uploads/products/MUG.jpg"));
        assert!(adjustments.is_empty());
    }

    #[test]
    fn test_reconcile_drops_missing_inactive_and_sold_out() {
        let gone = product("GONE", 1.0, 5);
        let mut hidden = product("HIDDEN", 1.0, 5);
        hidden.is_active = false;
        let empty = product("EMPTY", 1.0, 0);

        let (items, adjustments) = reconcile(
            vec![line(&gone, None, 1.0, 1), line(&hidden, None, 1.0, 1), line(&empty, None, 1.0, 1)],
            &catalog(&[hidden, empty]),
        );
        assert!(items.is_empty());
        assert_eq!(adjustments.len(), 3);
        assert!(adjustments.iter().all(|a| a.kind == AdjustmentKind::Removed));
        assert!(adjustments[2].message.contains("out of stock"));
    }

    #[test]
    fn test_reconcile_drops_vanished_variation() {
        let mut tee = product("TEE", 10.0, 0);
        tee.variations = vec![variation("TEE-S", None, 3)];
        let (items, adjustments) = reconcile(vec![line(&tee, Some("TEE-XL"), 10.0, 1)], &catalog(&[tee]));
        assert!(items.is_empty());
        assert_eq!(adjustments[0].kind, AdjustmentKind::Removed);
    }

    #[test]
    fn test_reconcile_clamps_quantity_and_refreshes_price() {
        let mut tee = product("TEE", 10.0, 0);
        tee.variations = vec![variation("TEE-L", Some(12.0), 2)];
        let (items, adjustments) = reconcile(vec![line(&tee, Some("TEE-L"), 10.0, 5)], &catalog(&[tee]));

        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].unit_price, 12.0);
        assert_eq!(items[0].name, "Product TEE - TEE-L");
        let kinds: Vec<_> = adjustments.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AdjustmentKind::QuantityReduced, AdjustmentKind::PriceChanged]);
    }

    #[test]
    fn test_merge_sums_and_clamps() {
        let mug = product("MUG", 8.0, 4);
        let existing = vec![line(&mug, None, 8.0, 3)];
        let incoming = vec![CartItemRequest {
            product_id: mug.id.unwrap().to_hex(),
            sku: Some("MUG".into()),
            quantity: 3,
        }];
        let (items, skipped) = merge_lines(existing, &incoming, &catalog(&[mug]));
        assert!(skipped.is_empty());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 4);
    }

    #[test]
    fn test_combined_quantity_rejects_overflow() {
        assert_eq!(combined_quantity(1, 2).unwrap(), 3);
        assert!(matches!(combined_quantity(1, i64::MAX), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_merge_huge_quantity_clamps_instead_of_wrapping() {
        let mug = product("MUG", 8.0, 4);
        let incoming = vec![CartItemRequest {
            product_id: mug.id.unwrap().to_hex(),
            sku: None,
            quantity: i64::MAX,
        }];
        let (items, _) = merge_lines(vec![line(&mug, None, 8.0, 1)], &incoming, &catalog(&[mug]));
        assert_eq!(items[0].quantity, 4);
    }

    #[test]
    fn test_reconcile_drops_non_positive_quantities() {
        let mug = product("MUG", 8.0, 4);
        let (items, adjustments) = reconcile(
            vec![line(&mug, None, 8.0, i64::MIN), line(&mug, None, 8.0, 0)],
            &catalog(&[mug]),
        );
        assert!(items.is_empty());
        assert_eq!(adjustments.len(), 2);
        assert!(adjustments.iter().all(|a| a.kind == AdjustmentKind::Removed));
    }

    #[test]
    fn test_merge_skips_unavailable_lines() {
        let mut tee = product("TEE", 10.0, 0);
        tee.variations = vec![variation("TEE-S", None, 1)];
        let sold_out = product("OUT", 2.0, 0);
        let incoming = vec![
            CartItemRequest { product_id: "not-an-id".into(), sku: None, quantity: 1 },
            CartItemRequest { product_id: ObjectId::new().to_hex(), sku: None, quantity: 1 },
            CartItemRequest { product_id: tee.id.unwrap().to_hex(), sku: None, quantity: 1 },
            CartItemRequest { product_id: sold_out.id.unwrap().to_hex(), sku: None, quantity: 1 },
            CartItemRequest { product_id: tee.id.unwrap().to_hex(), sku: Some("TEE-S".into()), quantity: 0 },
            CartItemRequest { product_id: tee.id.unwrap().to_hex(), sku: Some("TEE-S".into()), quantity: 2 },
        ];
        let (items, skipped) = merge_lines(vec![], &incoming, &catalog(&[tee, sold_out]));

        assert_eq!(skipped.len(), 5);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku.as_deref(), Some("TEE-S"));
        assert_eq!(items[0].quantity, 1);
    }
}
