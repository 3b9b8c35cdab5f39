use crate::{
    database::{MongoDB, CARTS, CATEGORIES, PRODUCTS, REVIEWS},
    models::product::{
        total_variation_stock, validate_variations, CategoryRef, CreateProductRequest, Product,
        ProductQuery, ProductResponse, ProductSort, UpdateProductRequest, Variation,
    },
    models::Category,
    services::category_service,
    utils::{
        money::is_valid_amount,
        slug::slugify,
        AppError, AppResult, Page, PageQuery,
    },
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime, Document};
use std::collections::HashMap;

/// Builds the catalog filter. `category_ids` is the already-expanded category subtree.
pub fn build_list_filter(query: &ProductQuery, category_ids: Option<Vec<ObjectId>>) -> Document {
    let mut filter = doc! { "is_active": true };

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = regex::escape(search);
        filter.insert(
            "$or",
            vec![
                doc! { "name": { "$regex": &pattern, "$options": "i" } },
                doc! { "sku": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }

    if let Some(ids) = category_ids {
        filter.insert("category_id", doc! { "$in": ids });
    }

    let mut price = Document::new();
    if let Some(min) = query.min_price {
        price.insert("$gte", min);
    }
    if let Some(max) = query.max_price {
        price.insert("$lte", max);
    }
    if !price.is_empty() {
        filter.insert("price", price);
    }

    if let Some(featured) = query.featured {
        filter.insert("is_featured", featured);
    }

    match query.in_stock {
        Some(true) => {
            filter.insert("stock", doc! { "$gt": 0 });
        }
        Some(false) => {
            filter.insert("stock", doc! { "$lte": 0 });
        }
        None => {}
    }

    filter
}

pub fn sort_for(sort: ProductSort) -> Document {
    match sort {
        ProductSort::Newest => doc! { "created_at": -1, "_id": -1 },
        ProductSort::PriceAsc => doc! { "price": 1, "_id": 1 },
        ProductSort::PriceDesc => doc! { "price": -1, "_id": 1 },
        ProductSort::BestSelling => doc! { "sold": -1, "_id": 1 },
        ProductSort::Rating => doc! { "rating_average": -1, "rating_count": -1, "_id": 1 },
        ProductSort::Name => doc! { "name": 1, "_id": 1 },
    }
}

/// Fills `category` on each response with a follow-up query on `categories`.
async fn attach_categories(db: &MongoDB, responses: &mut [ProductResponse]) -> AppResult<()> {
    let ids: Vec<ObjectId> = responses
        .iter()
        .filter_map(|p| p.category_id.as_deref())
        .filter_map(|id| ObjectId::parse_str(id).ok())
        .collect();
    if ids.is_empty() {
        return Ok(());
    }

    let cursor = db
        .collection::<Category>(CATEGORIES)
        .find(doc! { "_id": { "$in": ids } })
        .await?;
    let categories: Vec<Category> = cursor.try_collect().await?;
    let by_id: HashMap<String, CategoryRef> = categories
        .into_iter()
        .filter_map(|c| {
            let id = c.id?.to_hex();
            Some((id.clone(), CategoryRef { id, name: c.name, slug: c.slug }))
        })
        .collect();

    for response in responses.iter_mut() {
        if let Some(id) = &response.category_id {
            response.category = by_id.get(id).cloned();
        }
    }
    Ok(())
}

pub async fn list(db: &MongoDB, query: &ProductQuery) -> AppResult<Page<ProductResponse>> {
    let page = PageQuery { page: query.page, limit: query.limit };

    let category_ids = match query.category.as_deref().filter(|c| !c.is_empty()) {
        Some(key) => match category_service::subtree_ids(db, key).await {
            Ok(ids) => Some(ids),
            // Unknown category: empty result rather than an error.
            Err(AppError::NotFound(_)) => Some(vec![]),
            Err(e) => return Err(e),
        },
        None => None,
    };

    let filter = build_list_filter(query, category_ids);
    let collection = db.collection::<Product>(PRODUCTS);

    let total = collection.count_documents(filter.clone()).await?;
    let cursor = collection
        .find(filter)
        .sort(sort_for(query.sort.unwrap_or_default()))
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?;
    let products: Vec<Product> = cursor.try_collect().await?;

    let mut responses: Vec<ProductResponse> = products.into_iter().map(ProductResponse::from).collect();
    attach_categories(db, &mut responses).await?;

    Ok(Page::new(responses, &page, total))
}

pub async fn find_by_id(db: &MongoDB, id: &ObjectId) -> AppResult<Product> {
    db.collection::<Product>(PRODUCTS)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Product"))
}

/// Products keyed by id; missing ids are simply absent from the map.
pub async fn find_many(db: &MongoDB, ids: &[ObjectId]) -> AppResult<HashMap<ObjectId, Product>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let cursor = db
        .collection::<Product>(PRODUCTS)
        .find(doc! { "_id": { "$in": ids } })
        .await?;
    let products: Vec<Product> = cursor.try_collect().await?;
    Ok(products
        .into_iter()
        .filter_map(|p| p.id.map(|id| (id, p)))
        .collect())
}

/// Public lookup by id or slug. Inactive products are only visible to admins.
pub async fn get(db: &MongoDB, key: &str, is_admin: bool) -> AppResult<ProductResponse> {
    let filter = match ObjectId::parse_str(key) {
        Ok(id) => doc! { "_id": id },
        Err(_) => doc! { "slug": key.to_lowercase() },
    };
    let product = db
        .collection::<Product>(PRODUCTS)
        .find_one(filter)
        .await?
        .filter(|p| p.is_active || is_admin)
        .ok_or_else(|| AppError::not_found("Product"))?;

    let mut responses = vec![ProductResponse::from(product)];
    attach_categories(db, &mut responses).await?;
    responses.pop().ok_or_else(|| AppError::not_found("Product"))
}

async fn resolve_category(db: &MongoDB, raw: &str) -> AppResult<ObjectId> {
    let id = ObjectId::parse_str(raw)?;
    let count = db
        .collection::<Category>(CATEGORIES)
        .count_documents(doc! { "_id": id })
        .await?;
    if count == 0 {
        return Err(AppError::Validation("Category not found".to_string()));
    }
    Ok(id)
}

/// Product and variation skus must not collide with any other product's skus.
async fn ensure_skus_free(
    db: &MongoDB,
    exclude: Option<ObjectId>,
    sku: &str,
    variations: &[Variation],
) -> AppResult<()> {
    let mut skus = vec![sku.to_string()];
    skus.extend(variations.iter().map(|v| v.sku.clone()));

    let mut filter = doc! {
        "$or": [
            { "sku": { "$in": &skus } },
            { "variations.sku": { "$in": &skus } },
        ]
    };
    if let Some(id) = exclude {
        filter.insert("_id", doc! { "$ne": id });
    }

    let taken = db.collection::<Product>(PRODUCTS).count_documents(filter).await?;
    if taken > 0 {
        return Err(AppError::Conflict("SKU is already used by another product".to_string()));
    }
    Ok(())
}

fn conflict_on_duplicate(e: mongodb::error::Error) -> AppError {
    if crate::utils::is_duplicate_key(&e) {
        AppError::Conflict("A product with this slug or SKU already exists".to_string())
    } else {
        AppError::from(e)
    }
}

fn validate_prices(price: f64, compare_at_price: Option<f64>) -> AppResult<()> {
    if !is_valid_amount(price) {
        return Err(AppError::Validation("Price must be a non-negative number".to_string()));
    }
    if let Some(compare) = compare_at_price {
        if !is_valid_amount(compare) {
            return Err(AppError::Validation("Compare-at price must be a non-negative number".to_string()));
        }
    }
    Ok(())
}

pub async fn create(db: &MongoDB, request: CreateProductRequest) -> AppResult<ProductResponse> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Product name is required".to_string()));
    }
    let sku = request.sku.trim().to_string();
    if sku.is_empty() {
        return Err(AppError::Validation("SKU is required".to_string()));
    }
    validate_prices(request.price, request.compare_at_price)?;
    validate_variations(&sku, &request.variations).map_err(AppError::Validation)?;
    if request.stock < 0 {
        return Err(AppError::Validation("Stock cannot be negative".to_string()));
    }

    let slug = slugify(request.slug.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or(&name));
    if slug.is_empty() {
        return Err(AppError::Validation("Product name must contain letters or digits".to_string()));
    }

    let category_id = match request.category_id.as_deref().filter(|c| !c.is_empty()) {
        Some(raw) => Some(resolve_category(db, raw).await?),
        None => None,
    };

    ensure_skus_free(db, None, &sku, &request.variations).await?;

    let stock = if request.variations.is_empty() {
        request.stock
    } else {
        total_variation_stock(&request.variations)
    };

    let now = BsonDateTime::now();
    let mut product = Product {
        id: None,
        name,
        slug,
        description: request.description,
        sku,
        price: request.price,
        compare_at_price: request.compare_at_price,
        category_id,
        images: request.images,
        variations: request.variations,
        stock,
        sold: 0,
        rating_average: 0.0,
        rating_count: 0,
        is_active: request.is_active,
        is_featured: request.is_featured,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Product>(PRODUCTS)
        .insert_one(&product)
        .await
        .map_err(conflict_on_duplicate)?;
    product.id = result.inserted_id.as_object_id();

    log::info!("📦 Product created: {} ({})", product.name, product.sku);

    let mut responses = vec![ProductResponse::from(product)];
    attach_categories(db, &mut responses).await?;
    responses.pop().ok_or_else(|| AppError::Internal("Product vanished after insert".to_string()))
}

pub async fn update(
    db: &MongoDB,
    id: &ObjectId,
    request: UpdateProductRequest,
) -> AppResult<ProductResponse> {
    let existing = find_by_id(db, id).await?;
    let mut set = doc! { "updated_at": BsonDateTime::now() };
    let mut unset = Document::new();

    if let Some(name) = &request.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Product name cannot be empty".to_string()));
        }
        set.insert("name", name);
    }
    if let Some(slug) = &request.slug {
        let slug = slugify(slug);
        if slug.is_empty() {
            return Err(AppError::Validation("Slug must contain letters or digits".to_string()));
        }
        set.insert("slug", slug);
    }
    if let Some(description) = &request.description {
        set.insert("description", description.as_str());
    }

    let price = request.price.unwrap_or(existing.price);
    let compare_at_price = request.compare_at_price.or(existing.compare_at_price);
    validate_prices(price, compare_at_price)?;
    if let Some(price) = request.price {
        set.insert("price", price);
    }
    if let Some(compare) = request.compare_at_price {
        set.insert("compare_at_price", compare);
    }

    match request.category_id.as_deref() {
        Some("") => {
            unset.insert("category_id", "");
        }
        Some(raw) => {
            set.insert("category_id", resolve_category(db, raw).await?);
        }
        None => {}
    }

    if let Some(images) = &request.images {
        set.insert("images", images.clone());
    }
    if let Some(is_active) = request.is_active {
        set.insert("is_active", is_active);
    }
    if let Some(is_featured) = request.is_featured {
        set.insert("is_featured", is_featured);
    }

    let sku = match &request.sku {
        Some(sku) if sku.trim().is_empty() => {
            return Err(AppError::Validation("SKU cannot be empty".to_string()));
        }
        Some(sku) => sku.trim().to_string(),
        None => existing.sku.clone(),
    };
    let variations = request.variations.clone().unwrap_or_else(|| existing.variations.clone());
    if request.sku.is_some() || request.variations.is_some() {
        validate_variations(&sku, &variations).map_err(AppError::Validation)?;
        ensure_skus_free(db, Some(*id), &sku, &variations).await?;
        set.insert("sku", &sku);
        set.insert("variations", to_bson(&variations)?);
    }

    if variations.is_empty() {
        if let Some(stock) = request.stock {
            if stock < 0 {
                return Err(AppError::Validation("Stock cannot be negative".to_string()));
            }
            set.insert("stock", stock);
        }
    } else if request.stock.is_some() && request.variations.is_none() {
        return Err(AppError::Validation(
            "Stock is managed per variation for this product".to_string(),
        ));
    } else {
        set.insert("stock", total_variation_stock(&variations));
    }

    let mut update = doc! { "$set": set };
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }

    db.collection::<Product>(PRODUCTS)
        .update_one(doc! { "_id": id }, update)
        .await
        .map_err(conflict_on_duplicate)?;

    get(db, &id.to_hex(), true).await
}

/// Deletes the product, its reviews and any cart lines; returns its image urls.
pub async fn delete(db: &MongoDB, id: &ObjectId) -> AppResult<Vec<String>> {
    let product = find_by_id(db, id).await?;

    db.collection::<Product>(PRODUCTS).delete_one(doc! { "_id": id }).await?;

    let reviews = db
        .collection::<Document>(REVIEWS)
        .delete_many(doc! { "product_id": id })
        .await?;
    let carts = db
        .collection::<Document>(CARTS)
        .update_many(
            doc! { "items.product_id": id },
            doc! { "$pull": { "items": { "product_id": id } } },
        )
        .await?;

    log::info!(
        "🗑️ Product {} deleted ({} reviews removed, {} carts updated)",
        product.sku,
        reviews.deleted_count,
        carts.modified_count
    );
    Ok(product.images)
}

pub async fn add_images(db: &MongoDB, id: &ObjectId, urls: &[String]) -> AppResult<ProductResponse> {
    let result = db
        .collection::<Product>(PRODUCTS)
        .update_one(
            doc! { "_id": id },
            doc! {
                "$push": { "images": { "$each": urls } },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found("Product"));
    }
    get(db, &id.to_hex(), true).await
}

pub async fn remove_image(db: &MongoDB, id: &ObjectId, url: &str) -> AppResult<ProductResponse> {
    let result = db
        .collection::<Product>(PRODUCTS)
        .update_one(
            doc! { "_id": id, "images": url },
            doc! {
                "$pull": { "images": url },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("Image not found on product".to_string()));
    }
    get(db, &id.to_hex(), true).await
}

/// Atomically takes `quantity` units if available. Returns false when stock is short.
pub async fn reserve_stock(
    db: &MongoDB,
    product_id: &ObjectId,
    sku: Option<&str>,
    quantity: i64,
) -> AppResult<bool> {
    if quantity <= 0 {
        return Ok(false);
    }
    let (filter, update) = match sku {
        Some(sku) => (
            doc! {
                "_id": product_id,
                "is_active": true,
                "variations": { "$elemMatch": { "sku": sku, "stock": { "$gte": quantity } } },
            },
            doc! {
                "$inc": { "variations.$.stock": -quantity, "stock": -quantity, "sold": quantity },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        ),
        None => (
            doc! { "_id": product_id, "is_active": true, "stock": { "$gte": quantity } },
            doc! {
                "$inc": { "stock": -quantity, "sold": quantity },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        ),
    };

    let result = db
        .collection::<Product>(PRODUCTS)
        .update_one(filter, update)
        .await?;
    Ok(result.modified_count == 1)
}

/// Gives back units taken by [`reserve_stock`].
pub async fn release_stock(
    db: &MongoDB,
    product_id: &ObjectId,
    sku: Option<&str>,
    quantity: i64,
) -> AppResult<()> {
    let (filter, update) = match sku {
        Some(sku) => (
            doc! { "_id": product_id, "variations.sku": sku },
            doc! {
                "$inc": { "variations.$.stock": quantity, "stock": quantity, "sold": -quantity },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        ),
        None => (
            doc! { "_id": product_id },
            doc! {
                "$inc": { "stock": quantity, "sold": -quantity },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        ),
    };

    let result = db
        .collection::<Product>(PRODUCTS)
        .update_one(filter, update)
        .await?;
    if result.matched_count == 0 {
        log::warn!(
            "⚠️ Could not return {} unit(s) of {}{}: product or variation no longer exists",
            quantity,
            product_id,
            sku.map(|s| format!(" ({})", s)).unwrap_or_default()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_hides_inactive() {
        let filter = build_list_filter(&ProductQuery::default(), None);
        assert_eq!(filter, doc! { "is_active": true });
    }

    #[test]
    fn test_filter_combines_criteria() {
        let cat = ObjectId::new();
        let query = ProductQuery {
            search: Some("t.shirt".into()),
            min_price: Some(10.0),
            max_price: Some(50.0),
            featured: Some(true),
            in_stock: Some(true),
            ..Default::default()
        };
        let filter = build_list_filter(&query, Some(vec![cat]));

        assert_eq!(filter.get_document("price").unwrap(), &doc! { "$gte": 10.0, "$lte": 50.0 });
        assert_eq!(filter.get_document("category_id").unwrap(), &doc! { "$in": [cat] });
        assert_eq!(filter.get_bool("is_featured").unwrap(), true);
        assert_eq!(filter.get_document("stock").unwrap(), &doc! { "$gt": 0 });

        let or = filter.get_array("$or").unwrap();
        assert_eq!(or.len(), 2);
        let name = or[0].as_document().unwrap().get_document("name").unwrap();
        assert_eq!(name.get_str("$regex").unwrap(), "t\\.shirt");
        assert_eq!(name.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let query = ProductQuery { search: Some("   ".into()), ..Default::default() };
        assert!(!build_list_filter(&query, None).contains_key("$or"));
    }

    #[test]
    fn test_out_of_stock_filter() {
        let query = ProductQuery { in_stock: Some(false), ..Default::default() };
        let filter = build_list_filter(&query, None);
        assert_eq!(filter.get_document("stock").unwrap(), &doc! { "$lte": 0 });
    }

    #[test]
    fn test_sort_documents() {
        assert_eq!(sort_for(ProductSort::PriceAsc), doc! { "price": 1, "_id": 1 });
        assert_eq!(sort_for(ProductSort::BestSelling), doc! { "sold": -1, "_id": 1 });
        assert_eq!(sort_for(ProductSort::default()), doc! { "created_at": -1, "_id": -1 });
    }

    #[test]
    fn test_validate_prices() {
        assert!(validate_prices(0.0, None).is_ok());
        assert!(validate_prices(-1.0, None).is_err());
        assert!(validate_prices(10.0, Some(f64::INFINITY)).is_err());
    }
}
