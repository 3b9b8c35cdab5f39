use crate::{
    database::{MongoDB, VOUCHERS},
    models::voucher::{
        normalize_code, validate_value, CreateVoucherRequest, UpdateVoucherRequest,
        ValidateVoucherResponse, Voucher, VoucherResponse,
    },
    utils::{money::round_cents, time::to_bson, AppError, AppResult, Page, PageQuery},
};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};

async fn find_by_code(db: &MongoDB, code: &str) -> AppResult<Option<Voucher>> {
    Ok(db
        .collection::<Voucher>(VOUCHERS)
        .find_one(doc! { "code": normalize_code(code) })
        .await?)
}

/// Runs every redemption rule against `subtotal` without consuming the voucher.
pub async fn check(
    db: &MongoDB,
    code: &str,
    subtotal: f64,
    user_id: &ObjectId,
) -> AppResult<(Voucher, f64)> {
    // An unknown code is a rejection like any other.
    let voucher = find_by_code(db, code)
        .await?
        .ok_or_else(|| AppError::Validation("Voucher not found".to_string()))?;
    let discount = voucher
        .evaluate(subtotal, user_id, Utc::now())
        .map_err(|rejection| AppError::Validation(rejection.to_string()))?;
    Ok((voucher, discount))
}

pub async fn validate(
    db: &MongoDB,
    code: &str,
    subtotal: f64,
    user_id: &ObjectId,
) -> AppResult<ValidateVoucherResponse> {
    let (voucher, discount) = check(db, code, subtotal, user_id).await?;
    Ok(ValidateVoucherResponse {
        success: true,
        code: voucher.code,
        discount,
        subtotal,
        total_after_discount: round_cents(subtotal - discount),
    })
}

/// Filter that only matches while the voucher can still be taken by `user_id`.
pub fn redemption_filter(voucher: &Voucher, user_id: &ObjectId) -> Document {
    let mut filter = doc! { "_id": voucher.id, "is_active": true };
    if let Some(limit) = voucher.usage_limit {
        filter.insert("used_count", doc! { "$lt": limit });
    }
    if voucher.once_per_user {
        filter.insert("used_by", doc! { "$ne": user_id });
    }
    filter
}

/// Consumes one use. Returns false when a concurrent order took the last one.
pub async fn redeem(db: &MongoDB, voucher: &Voucher, user_id: &ObjectId) -> AppResult<bool> {
    let result = db
        .collection::<Voucher>(VOUCHERS)
        .update_one(
            redemption_filter(voucher, user_id),
            doc! {
                "$inc": { "used_count": 1 },
                "$addToSet": { "used_by": user_id },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        )
        .await?;
    Ok(result.modified_count == 1)
}

/// Gives back one use. The user is only forgotten on once-per-user vouchers;
/// multi-use vouchers may still have other orders from them.
pub async fn release(db: &MongoDB, voucher_id: &ObjectId, user_id: &ObjectId) -> AppResult<()> {
    let collection = db.collection::<Voucher>(VOUCHERS);
    collection
        .update_one(
            doc! { "_id": voucher_id, "used_count": { "$gt": 0 } },
            doc! {
                "$inc": { "used_count": -1 },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        )
        .await?;
    collection
        .update_one(
            doc! { "_id": voucher_id, "once_per_user": true },
            doc! { "$pull": { "used_by": user_id } },
        )
        .await?;
    Ok(())
}

pub async fn list(db: &MongoDB, query: &PageQuery) -> AppResult<Page<VoucherResponse>> {
    let collection = db.collection::<Voucher>(VOUCHERS);
    let total = collection.count_documents(doc! {}).await?;
    let cursor = collection
        .find(doc! {})
        .sort(doc! { "created_at": -1 })
        .skip(query.skip())
        .limit(query.limit() as i64)
        .await?;
    let vouchers: Vec<Voucher> = cursor.try_collect().await?;
    Ok(Page::new(
        vouchers.into_iter().map(VoucherResponse::from).collect(),
        query,
        total,
    ))
}

pub async fn get(db: &MongoDB, id: &ObjectId) -> AppResult<VoucherResponse> {
    db.collection::<Voucher>(VOUCHERS)
        .find_one(doc! { "_id": id })
        .await?
        .map(VoucherResponse::from)
        .ok_or_else(|| AppError::not_found("Voucher"))
}

fn conflict_on_duplicate(e: mongodb::error::Error) -> AppError {
    if crate::utils::is_duplicate_key(&e) {
        AppError::Conflict("A voucher with this code already exists".to_string())
    } else {
        AppError::from(e)
    }
}

fn validate_limits(
    min_order_value: f64,
    max_discount: Option<f64>,
    usage_limit: Option<i64>,
) -> AppResult<()> {
    if min_order_value < 0.0 || !min_order_value.is_finite() {
        return Err(AppError::Validation("Minimum order value cannot be negative".to_string()));
    }
    if matches!(max_discount, Some(cap) if cap <= 0.0 || !cap.is_finite()) {
        return Err(AppError::Validation("Maximum discount must be positive".to_string()));
    }
    if matches!(usage_limit, Some(limit) if limit <= 0) {
        return Err(AppError::Validation("Usage limit must be positive".to_string()));
    }
    Ok(())
}

pub async fn create(db: &MongoDB, request: CreateVoucherRequest) -> AppResult<VoucherResponse> {
    let code = normalize_code(&request.code);
    if code.is_empty() {
        return Err(AppError::Validation("Voucher code is required".to_string()));
    }
    validate_value(request.discount_type, request.value).map_err(AppError::Validation)?;
    validate_limits(request.min_order_value, request.max_discount, request.usage_limit)?;
    if let (Some(start), Some(end)) = (request.starts_at, request.expires_at) {
        if end <= start {
            return Err(AppError::Validation("Expiry must be after the start date".to_string()));
        }
    }

    let now = BsonDateTime::now();
    let mut voucher = Voucher {
        id: None,
        code,
        description: request.description,
        discount_type: request.discount_type,
        value: request.value,
        min_order_value: request.min_order_value,
        max_discount: request.max_discount,
        usage_limit: request.usage_limit,
        used_count: 0,
        once_per_user: request.once_per_user,
        used_by: vec![],
        starts_at: request.starts_at.map(to_bson),
        expires_at: request.expires_at.map(to_bson),
        is_active: request.is_active,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Voucher>(VOUCHERS)
        .insert_one(&voucher)
        .await
        .map_err(conflict_on_duplicate)?;
    voucher.id = result.inserted_id.as_object_id();

    log::info!("🎟️ Voucher created: {}", voucher.code);
    Ok(VoucherResponse::from(voucher))
}

pub async fn update(
    db: &MongoDB,
    id: &ObjectId,
    request: UpdateVoucherRequest,
) -> AppResult<VoucherResponse> {
    let collection = db.collection::<Voucher>(VOUCHERS);
    let existing = collection
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Voucher"))?;

    let discount_type = request.discount_type.unwrap_or(existing.discount_type);
    let value = request.value.unwrap_or(existing.value);
    validate_value(discount_type, value).map_err(AppError::Validation)?;
    validate_limits(
        request.min_order_value.unwrap_or(existing.min_order_value),
        request.max_discount.or(existing.max_discount),
        request.usage_limit.or(existing.usage_limit),
    )?;

    let mut set = doc! {
        "discount_type": mongodb::bson::to_bson(&discount_type)?,
        "value": value,
        "updated_at": BsonDateTime::now(),
    };
    if let Some(code) = request.code {
        let code = normalize_code(&code);
        if code.is_empty() {
            return Err(AppError::Validation("Voucher code cannot be empty".to_string()));
        }
        set.insert("code", code);
    }
    if let Some(description) = request.description {
        set.insert("description", description);
    }
    if let Some(min) = request.min_order_value {
        set.insert("min_order_value", min);
    }
    if let Some(cap) = request.max_discount {
        set.insert("max_discount", cap);
    }
    if let Some(limit) = request.usage_limit {
        set.insert("usage_limit", limit);
    }
    if let Some(once) = request.once_per_user {
        set.insert("once_per_user", once);
    }
    if let Some(start) = request.starts_at {
        set.insert("starts_at", to_bson(start));
    }
    if let Some(end) = request.expires_at {
        set.insert("expires_at", to_bson(end));
    }
    if let Some(active) = request.is_active {
        set.insert("is_active", active);
    }

    collection
        .update_one(doc! { "_id": id }, doc! { "$set": set })
        .await
        .map_err(conflict_on_duplicate)?;

    get(db, id).await
}

pub async fn delete(db: &MongoDB, id: &ObjectId) -> AppResult<()> {
    let result = db
        .collection::<Voucher>(VOUCHERS)
        .delete_one(doc! { "_id": id })
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Voucher"));
    }
    log::info!("🗑️ Voucher {} deleted", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::voucher::{fixtures::voucher, DiscountType};

    #[test]
    fn test_redemption_filter_unlimited() {
        let v = voucher(DiscountType::Fixed, 5.0);
        let filter = redemption_filter(&v, &ObjectId::new());
        assert_eq!(filter, doc! { "_id": v.id, "is_active": true });
    }

    #[test]
    fn test_redemption_filter_guards_limit_and_user() {
        let user = ObjectId::new();
        let mut v = voucher(DiscountType::Percentage, 10.0);
        v.usage_limit = Some(100);
        v.once_per_user = true;

        let filter = redemption_filter(&v, &user);
        assert_eq!(filter.get_document("used_count").unwrap(), &doc! { "$lt": 100_i64 });
        assert_eq!(filter.get_document("used_by").unwrap(), &doc! { "$ne": user });
    }

    #[test]
    fn test_validate_limits() {
        assert!(validate_limits(0.0, None, None).is_ok());
        assert!(validate_limits(-1.0, None, None).is_err());
        assert!(validate_limits(10.0, Some(0.0), None).is_err());
        assert!(validate_limits(10.0, Some(5.0), Some(0)).is_err());
    }
}
