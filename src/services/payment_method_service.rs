use crate::{
    database::{MongoDB, ORDERS, PAYMENT_METHODS},
    models::payment_method::{
        normalize_code, CreatePaymentMethodRequest, PaymentMethod, PaymentMethodQuery,
        PaymentMethodResponse, UpdatePaymentMethodRequest,
    },
    utils::{AppError, AppResult},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};

fn invalid_code() -> AppError {
    AppError::Validation(
        "Payment method code may only contain lowercase letters, digits and underscores"
            .to_string(),
    )
}

fn conflict_on_duplicate(e: mongodb::error::Error) -> AppError {
    if crate::utils::is_duplicate_key(&e) {
        AppError::Conflict("A payment method with this code already exists".to_string())
    } else {
        AppError::from(e)
    }
}

pub async fn list(
    db: &MongoDB,
    query: &PaymentMethodQuery,
    is_admin: bool,
) -> AppResult<Vec<PaymentMethodResponse>> {
    let filter = if query.include_inactive && is_admin {
        doc! {}
    } else {
        doc! { "is_active": true }
    };
    let cursor = db
        .collection::<PaymentMethod>(PAYMENT_METHODS)
        .find(filter)
        .sort(doc! { "sort_order": 1, "name": 1 })
        .await?;
    let methods: Vec<PaymentMethod> = cursor.try_collect().await?;
    Ok(methods.into_iter().map(PaymentMethodResponse::from).collect())
}

pub async fn find_by_id(db: &MongoDB, id: &ObjectId) -> AppResult<PaymentMethod> {
    db.collection::<PaymentMethod>(PAYMENT_METHODS)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Payment method"))
}

/// Used at checkout; inactive methods are rejected as a validation error.
pub async fn find_active(db: &MongoDB, raw_id: &str) -> AppResult<PaymentMethod> {
    let id = ObjectId::parse_str(raw_id)?;
    let method = find_by_id(db, &id).await?;
    if !method.is_active {
        return Err(AppError::Validation(format!(
            "Payment method {} is not available",
            method.name
        )));
    }
    Ok(method)
}

pub async fn create(
    db: &MongoDB,
    request: CreatePaymentMethodRequest,
) -> AppResult<PaymentMethodResponse> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Payment method name is required".to_string()));
    }
    let code = normalize_code(&request.code).ok_or_else(invalid_code)?;

    let now = BsonDateTime::now();
    let mut method = PaymentMethod {
        id: None,
        name,
        code,
        description: request.description,
        instructions: request.instructions,
        icon: request.icon,
        sort_order: request.sort_order,
        is_active: request.is_active,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<PaymentMethod>(PAYMENT_METHODS)
        .insert_one(&method)
        .await
        .map_err(conflict_on_duplicate)?;
    method.id = result.inserted_id.as_object_id();

    log::info!("💳 Payment method created: {}", method.code);
    Ok(PaymentMethodResponse::from(method))
}

pub async fn update(
    db: &MongoDB,
    id: &ObjectId,
    request: UpdatePaymentMethodRequest,
) -> AppResult<PaymentMethodResponse> {
    let mut set = doc! { "updated_at": BsonDateTime::now() };
    if let Some(name) = request.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Payment method name cannot be empty".to_string()));
        }
        set.insert("name", name);
    }
    if let Some(code) = request.code {
        set.insert("code", normalize_code(&code).ok_or_else(invalid_code)?);
    }
    if let Some(description) = request.description {
        set.insert("description", description);
    }
    if let Some(instructions) = request.instructions {
        set.insert("instructions", instructions);
    }
    if let Some(icon) = request.icon {
        set.insert("icon", icon);
    }
    if let Some(sort_order) = request.sort_order {
        set.insert("sort_order", sort_order);
    }
    if let Some(is_active) = request.is_active {
        set.insert("is_active", is_active);
    }

    let result = db
        .collection::<PaymentMethod>(PAYMENT_METHODS)
        .update_one(doc! { "_id": id }, doc! { "$set": set })
        .await
        .map_err(conflict_on_duplicate)?;
    if result.matched_count == 0 {
        return Err(AppError::not_found("Payment method"));
    }

    find_by_id(db, id).await.map(PaymentMethodResponse::from)
}

/// Methods referenced by orders are deactivated instead of deleted.
/// Returns true when the document was actually removed.
pub async fn delete(db: &MongoDB, id: &ObjectId) -> AppResult<bool> {
    let method = find_by_id(db, id).await?;
    let referenced = db
        .collection::<Document>(ORDERS)
        .count_documents(doc! { "payment_method.id": id })
        .await?;

    if referenced > 0 {
        db.collection::<PaymentMethod>(PAYMENT_METHODS)
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "is_active": false, "updated_at": BsonDateTime::now() } },
            )
            .await?;
        log::info!("💳 Payment method {} deactivated ({} orders reference it)", method.code, referenced);
        return Ok(false);
    }

    db.collection::<PaymentMethod>(PAYMENT_METHODS)
        .delete_one(doc! { "_id": id })
        .await?;
    log::info!("🗑️ Payment method {} deleted", method.code);
    Ok(true)
}
