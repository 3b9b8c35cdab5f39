use crate::{
    config::AppConfig,
    database::{MongoDB, CARTS, ORDERS},
    models::cart::{Cart, CartItem},
    models::order::{
        generate_order_number, AdminOrdersQuery, AppliedVoucher, CreateOrderRequest,
        CustomerSnapshot, MyOrdersQuery, Order, OrderItem, OrderResponse, OrderStatus,
        PaymentMethodSnapshot, PaymentStatus, RevenueBucket, RevenueQuery, RevenueReport,
        StatusChange, UpdateOrderStatusRequest,
    },
    models::product::Product,
    models::voucher::Voucher,
    services::{auth_service, auth_service::Claims, payment_method_service, product_service, voucher_service},
    utils::{
        money::round_cents,
        time::to_bson,
        AppError, AppResult, Page, PageQuery,
    },
};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson as bson_value, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use std::collections::{BTreeMap, HashMap};

const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Turns cart lines into order lines at live prices, failing on the first
/// line that cannot be bought in the requested quantity.
pub fn price_lines(
    cart_items: &[CartItem],
    products: &HashMap<ObjectId, Product>,
) -> Result<Vec<OrderItem>, String> {
    cart_items
        .iter()
        .map(|line| {
            if line.quantity <= 0 {
                return Err(format!("{} has an invalid quantity", line.name));
            }
            let product = products
                .get(&line.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(|| format!("{} is no longer available", line.name))?;
            let purchasable = product
                .resolve(line.sku.as_deref())
                .map_err(|_| format!("{} is no longer available", line.name))?;

            let name = product.display_name(&purchasable);
            let available = product.available_stock(&purchasable);
            if line.quantity > available {
                return Err(format!(
                    "Insufficient stock for {}: {} requested, {} available",
                    name, line.quantity, available
                ));
            }

            let unit_price = product.unit_price(&purchasable);
            Ok(OrderItem {
                product_id: line.product_id,
                sku: line.sku.clone(),
                name,
                image: product.primary_image(),
                unit_price,
                quantity: line.quantity,
                line_total: round_cents(unit_price * line.quantity as f64),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub discount: f64,
    pub shipping_fee: f64,
    pub total: f64,
}

/// Shipping is waived once the discounted subtotal reaches the threshold.
pub fn compute_totals(items: &[OrderItem], discount: f64, shipping_fee: f64, free_threshold: f64) -> Totals {
    let subtotal = round_cents(items.iter().map(|i| i.line_total).sum());
    let discount = round_cents(discount.clamp(0.0, subtotal));
    let after_discount = subtotal - discount;
    let shipping_fee = if after_discount >= free_threshold { 0.0 } else { shipping_fee };
    Totals {
        subtotal,
        discount,
        shipping_fee,
        total: round_cents(after_discount + shipping_fee),
    }
}

/// Returns every unit reserved so far, then the voucher use.
async fn roll_back(
    db: &MongoDB,
    reserved: &[(ObjectId, Option<String>, i64)],
    voucher: Option<&AppliedVoucher>,
    user_id: &ObjectId,
) {
    for (product_id, sku, quantity) in reserved {
        if let Err(e) = product_service::release_stock(db, product_id, sku.as_deref(), *quantity).await {
            log::error!("❌ Failed to return stock for {}: {}", product_id, e);
        }
    }
    if let Some(applied) = voucher {
        if let Err(e) = voucher_service::release(db, &applied.voucher_id, user_id).await {
            log::error!("❌ Failed to release voucher {}: {}", applied.code, e);
        }
    }
}

/// Takes stock for every line, in order. On the first shortfall or error all
/// earlier reservations and the voucher use are given back.
async fn reserve_all(
    db: &MongoDB,
    items: &[OrderItem],
    applied: Option<&AppliedVoucher>,
    user_id: &ObjectId,
) -> AppResult<Vec<(ObjectId, Option<String>, i64)>> {
    let mut reserved: Vec<(ObjectId, Option<String>, i64)> = Vec::with_capacity(items.len());
    for item in items {
        match product_service::reserve_stock(db, &item.product_id, item.sku.as_deref(), item.quantity).await {
            Ok(true) => reserved.push((item.product_id, item.sku.clone(), item.quantity)),
            Ok(false) => {
                roll_back(db, &reserved, applied, user_id).await;
                return Err(AppError::Validation(format!("Insufficient stock for {}", item.name)));
            }
            Err(e) => {
                roll_back(db, &reserved, applied, user_id).await;
                return Err(e);
            }
        }
    }
    Ok(reserved)
}

async fn insert_with_fresh_number(
    db: &MongoDB,
    order: &mut Order,
    mut next_number: impl FnMut() -> String,
) -> AppResult<()> {
    let collection = db.collection::<Order>(ORDERS);
    for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
        order.order_number = next_number();
        match collection.insert_one(&*order).await {
            Ok(result) => {
                order.id = result.inserted_id.as_object_id();
                return Ok(());
            }
            Err(e) if crate::utils::is_duplicate_key(&e) => {
                log::warn!(
                    "⚠️ Order number {} already taken (attempt {}/{})",
                    order.order_number,
                    attempt,
                    ORDER_NUMBER_ATTEMPTS
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Internal("Could not allocate an order number".to_string()))
}

/// Places an order from the caller's cart.
pub async fn create(
    db: &MongoDB,
    config: &AppConfig,
    user_id: &ObjectId,
    request: CreateOrderRequest,
) -> AppResult<OrderResponse> {
    let shipping = &request.shipping;
    if shipping.name.trim().is_empty() {
        return Err(AppError::Validation("Shipping name is required".to_string()));
    }
    if shipping.phone.trim().is_empty() {
        return Err(AppError::Validation("Shipping phone is required".to_string()));
    }
    shipping.address.validate().map_err(AppError::Validation)?;

    let user = auth_service::find_user(db, user_id).await?;

    let cart = db
        .collection::<Cart>(CARTS)
        .find_one(doc! { "user_id": user_id })
        .await?
        .unwrap_or_else(|| Cart::empty(*user_id));
    if cart.items.is_empty() {
        return Err(AppError::Validation("Your cart is empty".to_string()));
    }

    let ids: Vec<ObjectId> = cart.items.iter().map(|i| i.product_id).collect();
    let products = product_service::find_many(db, &ids).await?;
    let items = price_lines(&cart.items, &products).map_err(AppError::Validation)?;

    let payment_method = payment_method_service::find_active(db, &request.payment_method_id).await?;

    let subtotal = round_cents(items.iter().map(|i| i.line_total).sum());
    let voucher: Option<(Voucher, f64)> = match request.voucher_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Some(voucher_service::check(db, code, subtotal, user_id).await?),
        _ => None,
    };

    let totals = compute_totals(
        &items,
        voucher.as_ref().map(|(_, d)| *d).unwrap_or(0.0),
        config.shipping_fee,
        config.free_shipping_threshold,
    );

    let applied = match &voucher {
        Some((v, _)) => {
            if !voucher_service::redeem(db, v, user_id).await? {
                return Err(AppError::Validation(
                    "Voucher is no longer available".to_string(),
                ));
            }
            Some(AppliedVoucher {
                voucher_id: v.id.ok_or_else(|| AppError::not_found("Voucher"))?,
                code: v.code.clone(),
                discount: totals.discount,
            })
        }
        None => None,
    };

    let reserved = reserve_all(db, &items, applied.as_ref(), user_id).await?;

    let now = BsonDateTime::now();
    let mut order = Order {
        id: None,
        order_number: String::new(),
        user_id: *user_id,
        items,
        customer: CustomerSnapshot {
            name: shipping.name.trim().to_string(),
            email: shipping
                .email
                .clone()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| user.email.clone()),
            phone: shipping.phone.trim().to_string(),
            address: shipping.address.clone(),
        },
        payment_method: PaymentMethodSnapshot {
            id: payment_method.id.ok_or_else(|| AppError::not_found("Payment method"))?,
            code: payment_method.code.clone(),
            name: payment_method.name.clone(),
        },
        voucher: applied.clone(),
        subtotal: totals.subtotal,
        discount: totals.discount,
        shipping_fee: totals.shipping_fee,
        total: totals.total,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        note: request.note.filter(|n| !n.trim().is_empty()),
        status_history: vec![StatusChange {
            status: OrderStatus::Pending,
            note: None,
            changed_at: now,
        }],
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = insert_with_fresh_number(db, &mut order, || generate_order_number(Utc::now())).await {
        roll_back(db, &reserved, applied.as_ref(), user_id).await;
        return Err(e);
    }

    // The order stands even if the cart cannot be emptied.
    if let Err(e) = db
        .collection::<Cart>(CARTS)
        .update_one(
            doc! { "user_id": user_id },
            doc! { "$set": { "items": [], "updated_at": BsonDateTime::now() } },
        )
        .await
    {
        log::error!("❌ Order {} placed but cart {} not cleared: {}", order.order_number, user_id, e);
    }

    log::info!(
        "🧾 Order {} placed by {}: {} item(s), total {:.2}",
        order.order_number,
        user_id,
        order.items.len(),
        order.total
    );
    Ok(OrderResponse::from(order))
}

async fn page_of(
    db: &MongoDB,
    filter: Document,
    page: &PageQuery,
) -> AppResult<Page<OrderResponse>> {
    let collection = db.collection::<Order>(ORDERS);
    let total = collection.count_documents(filter.clone()).await?;
    let cursor = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?;
    let orders: Vec<Order> = cursor.try_collect().await?;
    Ok(Page::new(
        orders.into_iter().map(OrderResponse::from).collect(),
        page,
        total,
    ))
}

pub async fn list_mine(
    db: &MongoDB,
    user_id: &ObjectId,
    query: &MyOrdersQuery,
) -> AppResult<Page<OrderResponse>> {
    let mut filter = doc! { "user_id": user_id };
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    page_of(db, filter, &PageQuery { page: query.page, limit: query.limit }).await
}

async fn find_by_id(db: &MongoDB, id: &ObjectId) -> AppResult<Order> {
    db.collection::<Order>(ORDERS)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Order"))
}

/// Owners see their own orders, admins see all.
pub async fn get(db: &MongoDB, id: &ObjectId, claims: &Claims) -> AppResult<OrderResponse> {
    let order = find_by_id(db, id).await?;
    if !claims.is_admin() && order.user_id != claims.user_id()? {
        return Err(AppError::not_found("Order"));
    }
    Ok(OrderResponse::from(order))
}

/// Moves an order to `next` only if it is still in `from`, so concurrent
/// changes cannot both succeed.
async fn transition(
    db: &MongoDB,
    id: &ObjectId,
    from: OrderStatus,
    next: OrderStatus,
    note: Option<String>,
) -> AppResult<Option<Order>> {
    let change = StatusChange {
        status: next,
        note,
        changed_at: BsonDateTime::now(),
    };
    let updated = db
        .collection::<Order>(ORDERS)
        .find_one_and_update(
            doc! { "_id": id, "status": from.as_str() },
            doc! {
                "$set": { "status": next.as_str(), "updated_at": change.changed_at },
                "$push": { "status_history": bson_value(&change)? },
            },
        )
        .return_document(ReturnDocument::After)
        .await?;
    Ok(updated)
}

/// Puts reserved stock back and frees the voucher of a cancelled order.
/// Every line is attempted; failures are logged.
async fn restore_inventory(db: &MongoDB, order: &Order) {
    let reserved: Vec<(ObjectId, Option<String>, i64)> = order
        .items
        .iter()
        .map(|i| (i.product_id, i.sku.clone(), i.quantity))
        .collect();
    roll_back(db, &reserved, order.voucher.as_ref(), &order.user_id).await;
}

pub async fn cancel(db: &MongoDB, id: &ObjectId, user_id: &ObjectId) -> AppResult<OrderResponse> {
    let order = find_by_id(db, id).await?;
    if order.user_id != *user_id {
        return Err(AppError::not_found("Order"));
    }
    if !order.status.customer_cancellable() {
        return Err(AppError::Validation(format!(
            "Order cannot be cancelled once it is {}",
            order.status
        )));
    }

    let cancelled = transition(
        db,
        id,
        order.status,
        OrderStatus::Cancelled,
        Some("Cancelled by customer".to_string()),
    )
    .await?
    .ok_or_else(|| AppError::Conflict("Order status changed, please reload".to_string()))?;

    restore_inventory(db, &cancelled).await;
    log::info!("🚫 Order {} cancelled by customer", cancelled.order_number);
    Ok(OrderResponse::from(cancelled))
}

pub fn admin_filter(query: &AdminOrdersQuery) -> Document {
    let mut filter = Document::new();
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(payment_status) = query.payment_status {
        filter.insert("payment_status", payment_status.as_str());
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = regex::escape(search);
        filter.insert(
            "$or",
            vec![
                doc! { "order_number": { "$regex": &pattern, "$options": "i" } },
                doc! { "customer.email": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }
    if let Some(range) = date_range(query.from, query.to) {
        filter.insert("created_at", range);
    }
    filter
}

fn date_range(
    from: Option<chrono::DateTime<Utc>>,
    to: Option<chrono::DateTime<Utc>>,
) -> Option<Document> {
    let mut range = Document::new();
    if let Some(from) = from {
        range.insert("$gte", to_bson(from));
    }
    if let Some(to) = to {
        range.insert("$lte", to_bson(to));
    }
    (!range.is_empty()).then_some(range)
}

pub async fn list_all(db: &MongoDB, query: &AdminOrdersQuery) -> AppResult<Page<OrderResponse>> {
    page_of(
        db,
        admin_filter(query),
        &PageQuery { page: query.page, limit: query.limit },
    )
    .await
}

pub async fn update_status(
    db: &MongoDB,
    id: &ObjectId,
    request: UpdateOrderStatusRequest,
) -> AppResult<OrderResponse> {
    let order = find_by_id(db, id).await?;
    if !order.status.can_transition_to(request.status) {
        return Err(AppError::Validation(format!(
            "Cannot change order status from {} to {}",
            order.status, request.status
        )));
    }

    let updated = transition(db, id, order.status, request.status, request.note)
        .await?
        .ok_or_else(|| AppError::Conflict("Order status changed, please reload".to_string()))?;

    if updated.status == OrderStatus::Cancelled {
        restore_inventory(db, &updated).await;
    }

    log::info!(
        "📦 Order {} status {} -> {}",
        updated.order_number,
        order.status,
        updated.status
    );
    Ok(OrderResponse::from(updated))
}

pub async fn update_payment_status(
    db: &MongoDB,
    id: &ObjectId,
    payment_status: PaymentStatus,
) -> AppResult<OrderResponse> {
    let updated = db
        .collection::<Order>(ORDERS)
        .find_one_and_update(
            doc! { "_id": id },
            doc! { "$set": {
                "payment_status": payment_status.as_str(),
                "updated_at": BsonDateTime::now(),
            } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    log::info!("💰 Order {} payment status -> {}", updated.order_number, payment_status.as_str());
    Ok(OrderResponse::from(updated))
}

/// Revenue per period over non-cancelled orders.
pub fn revenue_pipeline(query: &RevenueQuery) -> Vec<Document> {
    let mut matcher = doc! { "status": { "$ne": OrderStatus::Cancelled.as_str() } };
    if let Some(range) = date_range(query.from, query.to) {
        matcher.insert("created_at", range);
    }
    vec![
        doc! { "$match": matcher },
        doc! { "$group": {
            "_id": { "$dateToString": { "format": query.group_by.date_format(), "date": "$created_at" } },
            "revenue": { "$sum": "$total" },
            "orders": { "$sum": 1 },
        } },
        doc! { "$sort": { "_id": 1 } },
    ]
}

/// Order counts per status over the same date window.
pub fn status_count_pipeline(query: &RevenueQuery) -> Vec<Document> {
    let mut matcher = Document::new();
    if let Some(range) = date_range(query.from, query.to) {
        matcher.insert("created_at", range);
    }
    vec![
        doc! { "$match": matcher },
        doc! { "$group": { "_id": "$status", "count": { "$sum": 1 } } },
    ]
}

fn number(value: Option<&Bson>) -> f64 {
    match value {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => *v as f64,
        Some(Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    }
}

fn count(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

pub fn bucket_from(doc: &Document) -> Option<RevenueBucket> {
    Some(RevenueBucket {
        period: doc.get_str("_id").ok()?.to_string(),
        revenue: round_cents(number(doc.get("revenue"))),
        orders: count(doc.get("orders")),
    })
}

pub fn summarize(buckets: Vec<RevenueBucket>, status_counts: BTreeMap<String, i64>) -> RevenueReport {
    let revenue = round_cents(buckets.iter().map(|b| b.revenue).sum());
    let orders: i64 = buckets.iter().map(|b| b.orders).sum();
    let average_order_value = if orders > 0 {
        round_cents(revenue / orders as f64)
    } else {
        0.0
    };
    RevenueReport {
        success: true,
        revenue,
        orders,
        average_order_value,
        buckets,
        status_counts,
    }
}

pub async fn revenue(db: &MongoDB, query: &RevenueQuery) -> AppResult<RevenueReport> {
    let collection = db.collection::<Order>(ORDERS);

    let cursor = collection.aggregate(revenue_pipeline(query)).await?;
    let rows: Vec<Document> = cursor.try_collect().await?;
    let buckets: Vec<RevenueBucket> = rows.iter().filter_map(bucket_from).collect();

    let cursor = collection.aggregate(status_count_pipeline(query)).await?;
    let rows: Vec<Document> = cursor.try_collect().await?;
    let mut status_counts: BTreeMap<String, i64> = OrderStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for row in &rows {
        if let Ok(status) = row.get_str("_id") {
            status_counts.insert(status.to_string(), count(row.get("count")));
        }
    }

    Ok(summarize(buckets, status_counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{test_db, PRODUCTS, VOUCHERS};
    use crate::models::order::RevenueGrouping;
    use crate::models::product::fixtures::{product, variation};
    use crate::models::user::Address;
    use crate::models::voucher::{fixtures::voucher, normalize_code, DiscountType};
    use chrono::TimeZone;

    fn cart_line(p: &Product, sku: Option<&str>, qty: i64) -> CartItem {
        CartItem {
            product_id: p.id.unwrap(),
            sku: sku.map(String::from),
            name: p.name.clone(),
            image: None,
            unit_price: 0.0,
            quantity: qty,
        }
    }

    fn catalog(products: &[Product]) -> HashMap<ObjectId, Product> {
        products.iter().map(|p| (p.id.unwrap(), p.clone())).collect()
    }

    #[test]
    fn test_price_lines_uses_live_prices() {
        let mut tee = product("TEE", 10.0, 0);
        tee.variations = vec![variation("TEE-L", Some(12.5), 5)];
        let mug = product("MUG", 7.99, 3);

        let items = price_lines(
            &[cart_line(&tee, Some("TEE-L"), 2), cart_line(&mug, None, 3)],
            &catalog(&[tee, mug]),
        )
        .unwrap();

        assert_eq!(items[0].unit_price, 12.5);
        assert_eq!(items[0].line_total, 25.0);
        assert_eq!(items[0].name, "Product TEE - TEE-L");
        assert_eq!(items[1].line_total, 23.97);
    }

    #[test]
    fn test_price_lines_names_the_short_item() {
        let mug = product("MUG", 7.99, 1);
        let err = price_lines(&[cart_line(&mug, None, 2)], &catalog(&[mug])).unwrap_err();
        assert_eq!(err, "Insufficient stock for Product MUG: 2 requested, 1 available");

        let gone = product("GONE", 1.0, 1);
        let err = price_lines(&[cart_line(&gone, None, 1)], &HashMap::new()).unwrap_err();
        assert!(err.contains("no longer available"));
    }

    #[test]
    fn test_price_lines_rejects_non_positive_quantity() {
        let mug = product("MUG", 7.99, 5);
        let err = price_lines(&[cart_line(&mug, None, i64::MIN)], &catalog(&[mug.clone()])).unwrap_err();
        assert!(err.contains("invalid quantity"));
        assert!(price_lines(&[cart_line(&mug, None, 0)], &catalog(&[mug])).is_err());
    }

    fn order_item(total: f64) -> OrderItem {
        OrderItem {
            product_id: ObjectId::new(),
            sku: None,
            name: "x".into(),
            image: None,
            unit_price: total,
            quantity: 1,
            line_total: total,
        }
    }

    #[test]
    fn test_totals_charge_shipping_below_threshold() {
        let totals = compute_totals(&[order_item(40.0), order_item(19.5)], 5.0, 5.0, 100.0);
        assert_eq!(
            totals,
            Totals { subtotal: 59.5, discount: 5.0, shipping_fee: 5.0, total: 59.5 }
        );
    }

    #[test]
    fn test_totals_threshold_applies_after_discount() {
        let totals = compute_totals(&[order_item(105.0)], 10.0, 5.0, 100.0);
        assert_eq!(totals.shipping_fee, 5.0);
        assert_eq!(totals.total, 100.0);

        let totals = compute_totals(&[order_item(110.0)], 10.0, 5.0, 100.0);
        assert_eq!(totals.shipping_fee, 0.0);
        assert_eq!(totals.total, 100.0);
    }

    #[test]
    fn test_totals_discount_clamped_to_subtotal() {
        let totals = compute_totals(&[order_item(3.0)], 10.0, 5.0, 100.0);
        assert_eq!(totals.discount, 3.0);
        assert_eq!(totals.total, 5.0);
    }

    #[test]
    fn test_admin_filter() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let query = AdminOrdersQuery {
            status: Some(OrderStatus::Shipped),
            payment_status: Some(PaymentStatus::Paid),
            search: Some("ord-2024".into()),
            from: Some(from),
            ..Default::default()
        };
        let filter = admin_filter(&query);
        assert_eq!(filter.get_str("status").unwrap(), "shipped");
        assert_eq!(filter.get_str("payment_status").unwrap(), "paid");
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);
        assert_eq!(
            filter.get_document("created_at").unwrap(),
            &doc! { "$gte": to_bson(from) }
        );
        assert!(admin_filter(&AdminOrdersQuery::default()).is_empty());
    }

    #[test]
    fn test_revenue_pipeline_groups_by_month() {
        let query = RevenueQuery { group_by: RevenueGrouping::Month, ..Default::default() };
        let pipeline = revenue_pipeline(&query);
        assert_eq!(pipeline.len(), 3);
        assert_eq!(
            pipeline[0],
            doc! { "$match": { "status": { "$ne": "cancelled" } } }
        );
        let group = pipeline[1].get_document("$group").unwrap();
        let id = group.get_document("_id").unwrap().get_document("$dateToString").unwrap();
        assert_eq!(id.get_str("format").unwrap(), "%Y-%m");
    }

    #[test]
    fn test_summarize_revenue_rows() {
        let rows = vec![
            doc! { "_id": "2024-03-01", "revenue": 120.5, "orders": 2 },
            doc! { "_id": "2024-03-02", "revenue": 79.5_f64, "orders": 1_i64 },
            doc! { "_id": Bson::Null, "revenue": 1.0, "orders": 1 },
        ];
        let buckets: Vec<RevenueBucket> = rows.iter().filter_map(bucket_from).collect();
        assert_eq!(buckets.len(), 2);

        let report = summarize(buckets, BTreeMap::new());
        assert_eq!(report.revenue, 200.0);
        assert_eq!(report.orders, 3);
        assert_eq!(report.average_order_value, 66.67);

        let empty = summarize(vec![], BTreeMap::new());
        assert_eq!(empty.average_order_value, 0.0);
    }

    // The tests below need a running MongoDB (see `database::test_db`).

    fn unique(prefix: &str) -> String {
        format!("{}-{}", prefix, ObjectId::new().to_hex())
    }

    async fn stored_product(db: &MongoDB, stock: i64) -> Product {
        let p = product(&unique("LIVE"), 10.0, stock);
        db.collection::<Product>(PRODUCTS).insert_one(&p).await.unwrap();
        p
    }

    async fn stock_and_sold(db: &MongoDB, id: &ObjectId) -> (i64, i64) {
        let p = product_service::find_by_id(db, id).await.unwrap();
        (p.stock, p.sold)
    }

    async fn stored_voucher(db: &MongoDB, usage_limit: Option<i64>, once_per_user: bool) -> Voucher {
        let mut v = voucher(DiscountType::Fixed, 5.0);
        v.code = normalize_code(&unique("live"));
        v.usage_limit = usage_limit;
        v.once_per_user = once_per_user;
        db.collection::<Voucher>(VOUCHERS).insert_one(&v).await.unwrap();
        v
    }

    async fn reload_voucher(db: &MongoDB, id: &ObjectId) -> Voucher {
        db.collection::<Voucher>(VOUCHERS)
            .find_one(doc! { "_id": id })
            .await
            .unwrap()
            .unwrap()
    }

    fn applied(v: &Voucher) -> AppliedVoucher {
        AppliedVoucher { voucher_id: v.id.unwrap(), code: v.code.clone(), discount: 5.0 }
    }

    fn item_for(p: &Product, quantity: i64) -> OrderItem {
        OrderItem {
            product_id: p.id.unwrap(),
            sku: None,
            name: p.name.clone(),
            image: None,
            unit_price: p.price,
            quantity,
            line_total: round_cents(p.price * quantity as f64),
        }
    }

    fn pending_order(user_id: ObjectId, items: Vec<OrderItem>, voucher: Option<AppliedVoucher>) -> Order {
        let now = BsonDateTime::now();
        Order {
            id: None,
            order_number: String::new(),
            user_id,
            items,
            customer: CustomerSnapshot {
                name: "Test Customer".into(),
                email: "customer@example.com".into(),
                phone: "555-0100".into(),
                address: Address {
                    line1: "1 Main St".into(),
                    line2: None,
                    city: "Springfield".into(),
                    state: None,
                    postal_code: None,
                    country: "US".into(),
                },
            },
            payment_method: PaymentMethodSnapshot {
                id: ObjectId::new(),
                code: "cod".into(),
                name: "Cash on delivery".into(),
            },
            voucher,
            subtotal: 0.0,
            discount: 0.0,
            shipping_fee: 0.0,
            total: 0.0,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            note: None,
            status_history: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_failed_reservation_returns_earlier_lines_and_voucher() {
        let db = test_db().await;
        let user = ObjectId::new();
        let plenty = stored_product(&db, 5).await;
        let scarce = stored_product(&db, 1).await;
        let v = stored_voucher(&db, Some(1), true).await;
        assert!(voucher_service::redeem(&db, &v, &user).await.unwrap());

        let applied = applied(&v);
        let items = vec![item_for(&plenty, 2), item_for(&scarce, 3)];
        let err = reserve_all(&db, &items, Some(&applied), &user).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m.contains("Insufficient stock")));
        assert_eq!(stock_and_sold(&db, &plenty.id.unwrap()).await, (5, 0));
        assert_eq!(stock_and_sold(&db, &scarce.id.unwrap()).await, (1, 0));
        let v = reload_voucher(&db, &v.id.unwrap()).await;
        assert_eq!(v.used_count, 0);
        assert!(!v.used_by.contains(&user));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_order_number_is_regenerated_after_duplicate() {
        let db = test_db().await;
        let taken = unique("ORD-TEST");
        let fresh = unique("ORD-TEST");

        let mut first = pending_order(ObjectId::new(), vec![], None);
        insert_with_fresh_number(&db, &mut first, || taken.clone()).await.unwrap();

        let mut numbers = vec![fresh.clone(), taken.clone()];
        let mut second = pending_order(ObjectId::new(), vec![], None);
        insert_with_fresh_number(&db, &mut second, || numbers.pop().unwrap()).await.unwrap();
        assert_eq!(second.order_number, fresh);
        assert!(second.id.is_some());

        let mut third = pending_order(ObjectId::new(), vec![], None);
        let err = insert_with_fresh_number(&db, &mut third, || taken.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_cancel_returns_stock_and_voucher() {
        let db = test_db().await;
        let user = ObjectId::new();
        let mug = stored_product(&db, 5).await;
        let v = stored_voucher(&db, None, true).await;

        assert!(voucher_service::redeem(&db, &v, &user).await.unwrap());
        assert!(product_service::reserve_stock(&db, &mug.id.unwrap(), None, 2).await.unwrap());
        assert_eq!(stock_and_sold(&db, &mug.id.unwrap()).await, (3, 2));

        let mut order = pending_order(user, vec![item_for(&mug, 2)], Some(applied(&v)));
        insert_with_fresh_number(&db, &mut order, || unique("ORD-TEST")).await.unwrap();
        let id = order.id.unwrap();

        // Someone else's order is invisible to them.
        let err = cancel(&db, &id, &ObjectId::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        cancel(&db, &id, &user).await.unwrap();
        assert_eq!(find_by_id(&db, &id).await.unwrap().status, OrderStatus::Cancelled);
        assert_eq!(stock_and_sold(&db, &mug.id.unwrap()).await, (5, 0));
        let v = reload_voucher(&db, &v.id.unwrap()).await;
        assert_eq!(v.used_count, 0);
        assert!(!v.used_by.contains(&user));

        let err = cancel(&db, &id, &user).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_redeem_stops_at_usage_limit() {
        let db = test_db().await;
        let v = stored_voucher(&db, Some(1), false).await;

        assert!(voucher_service::redeem(&db, &v, &ObjectId::new()).await.unwrap());
        assert!(!voucher_service::redeem(&db, &v, &ObjectId::new()).await.unwrap());
        assert_eq!(reload_voucher(&db, &v.id.unwrap()).await.used_count, 1);
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_release_keeps_user_on_multi_use_voucher() {
        let db = test_db().await;
        let user = ObjectId::new();
        let v = stored_voucher(&db, None, false).await;

        assert!(voucher_service::redeem(&db, &v, &user).await.unwrap());
        assert!(voucher_service::redeem(&db, &v, &user).await.unwrap());
        voucher_service::release(&db, &v.id.unwrap(), &user).await.unwrap();

        let v = reload_voucher(&db, &v.id.unwrap()).await;
        assert_eq!(v.used_count, 1);
        assert!(v.used_by.contains(&user));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_unknown_voucher_code_is_rejected() {
        let db = test_db().await;
        let err = voucher_service::check(&db, &unique("nope"), 50.0, &ObjectId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Voucher not found"));
    }
}
