use crate::{
    database::{MongoDB, CATEGORIES, PRODUCTS},
    models::category::{
        build_tree, descendant_ids, would_create_cycle, Category, CategoryQuery, CategoryResponse,
        CreateCategoryRequest, UpdateCategoryRequest,
    },
    models::Product,
    utils::{slug::slugify, AppError, AppResult},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};

pub async fn all_categories(db: &MongoDB) -> AppResult<Vec<Category>> {
    let cursor = db.collection::<Category>(CATEGORIES).find(doc! {}).await?;
    Ok(cursor.try_collect().await?)
}

/// Looks up by ObjectId when the input parses as one, by slug otherwise.
pub async fn find_by_id_or_slug(db: &MongoDB, key: &str) -> AppResult<Category> {
    let filter = match ObjectId::parse_str(key) {
        Ok(id) => doc! { "_id": id },
        Err(_) => doc! { "slug": key.to_lowercase() },
    };
    db.collection::<Category>(CATEGORIES)
        .find_one(filter)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))
}

/// The category and all of its descendants, used for catalog filtering.
pub async fn subtree_ids(db: &MongoDB, key: &str) -> AppResult<Vec<ObjectId>> {
    let root = find_by_id_or_slug(db, key).await?;
    let root_id = root.id.ok_or_else(|| AppError::not_found("Category"))?;
    let all = all_categories(db).await?;
    Ok(descendant_ids(&all, root_id))
}

pub async fn list(db: &MongoDB, query: &CategoryQuery, is_admin: bool) -> AppResult<Vec<CategoryResponse>> {
    let mut categories = all_categories(db).await?;
    if !(query.include_inactive && is_admin) {
        categories.retain(|c| c.is_active);
    }

    if query.tree {
        return Ok(build_tree(categories));
    }

    categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
    Ok(categories.into_iter().map(CategoryResponse::from).collect())
}

pub async fn get(db: &MongoDB, key: &str) -> AppResult<CategoryResponse> {
    let category = find_by_id_or_slug(db, key).await?;
    let id = category.id;

    let cursor = db
        .collection::<Category>(CATEGORIES)
        .find(doc! { "parent_id": id, "is_active": true })
        .sort(doc! { "sort_order": 1, "name": 1 })
        .await?;
    let children: Vec<Category> = cursor.try_collect().await?;

    let mut response = CategoryResponse::from(category);
    response.children = Some(children.into_iter().map(CategoryResponse::from).collect());
    Ok(response)
}

async fn ensure_parent_exists(db: &MongoDB, parent: &ObjectId) -> AppResult<()> {
    let found = db
        .collection::<Category>(CATEGORIES)
        .count_documents(doc! { "_id": parent })
        .await?;
    if found == 0 {
        return Err(AppError::Validation("Parent category not found".to_string()));
    }
    Ok(())
}

fn resolve_slug(explicit: Option<&str>, name: &str) -> AppResult<String> {
    let slug = slugify(explicit.filter(|s| !s.trim().is_empty()).unwrap_or(name));
    if slug.is_empty() {
        return Err(AppError::Validation("Category name must contain letters or digits".to_string()));
    }
    Ok(slug)
}

fn conflict_on_duplicate(e: mongodb::error::Error) -> AppError {
    if crate::utils::is_duplicate_key(&e) {
        AppError::Conflict("A category with this slug already exists".to_string())
    } else {
        AppError::from(e)
    }
}

pub async fn create(db: &MongoDB, request: CreateCategoryRequest) -> AppResult<CategoryResponse> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Category name is required".to_string()));
    }
    let slug = resolve_slug(request.slug.as_deref(), &name)?;

    let parent_id = match request.parent_id.as_deref().filter(|p| !p.is_empty()) {
        Some(raw) => {
            let parent = ObjectId::parse_str(raw)?;
            ensure_parent_exists(db, &parent).await?;
            Some(parent)
        }
        None => None,
    };

    let now = BsonDateTime::now();
    let mut category = Category {
        id: None,
        name,
        slug,
        description: request.description,
        image: request.image,
        parent_id,
        sort_order: request.sort_order,
        is_active: request.is_active,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Category>(CATEGORIES)
        .insert_one(&category)
        .await
        .map_err(conflict_on_duplicate)?;
    category.id = result.inserted_id.as_object_id();

    log::info!("📁 Category created: {} ({})", category.name, category.slug);
    Ok(CategoryResponse::from(category))
}

pub async fn update(
    db: &MongoDB,
    id: &ObjectId,
    request: UpdateCategoryRequest,
) -> AppResult<CategoryResponse> {
    let collection = db.collection::<Category>(CATEGORIES);
    let existing = collection
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;

    let mut set = doc! { "updated_at": BsonDateTime::now() };
    let mut unset = Document::new();

    if let Some(name) = request.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Category name cannot be empty".to_string()));
        }
        set.insert("name", name);
    }
    if let Some(slug) = request.slug {
        set.insert("slug", resolve_slug(Some(&slug), &existing.name)?);
    }
    if let Some(description) = request.description {
        set.insert("description", description);
    }
    if let Some(image) = request.image {
        set.insert("image", image);
    }
    if let Some(sort_order) = request.sort_order {
        set.insert("sort_order", sort_order);
    }
    if let Some(is_active) = request.is_active {
        set.insert("is_active", is_active);
    }
    match request.parent_id.as_deref() {
        Some("") => {
            unset.insert("parent_id", "");
        }
        Some(raw) => {
            let parent = ObjectId::parse_str(raw)?;
            ensure_parent_exists(db, &parent).await?;
            let all = all_categories(db).await?;
            if would_create_cycle(&all, *id, parent) {
                return Err(AppError::Validation(
                    "A category cannot be moved under itself or one of its descendants".to_string(),
                ));
            }
            set.insert("parent_id", parent);
        }
        None => {}
    }

    let mut update = doc! { "$set": set };
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }

    collection
        .update_one(doc! { "_id": id }, update)
        .await
        .map_err(conflict_on_duplicate)?;

    get(db, &id.to_hex()).await
}

/// Refuses while products still reference the category; children move up one level.
pub async fn delete(db: &MongoDB, id: &ObjectId) -> AppResult<()> {
    let collection = db.collection::<Category>(CATEGORIES);
    let existing = collection
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;

    let product_count = db
        .collection::<Product>(PRODUCTS)
        .count_documents(doc! { "category_id": id })
        .await?;
    if product_count > 0 {
        return Err(AppError::Conflict(format!(
            "Category still has {} product(s); move them first",
            product_count
        )));
    }

    let new_parent = existing.parent_id.map(Bson::ObjectId).unwrap_or(Bson::Null);
    let reparented = collection
        .update_many(
            doc! { "parent_id": id },
            doc! { "$set": { "parent_id": new_parent, "updated_at": BsonDateTime::now() } },
        )
        .await?;

    collection.delete_one(doc! { "_id": id }).await?;

    log::info!(
        "🗑️ Category {} deleted ({} children re-parented)",
        existing.slug,
        reparented.modified_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_slug() {
        assert_eq!(resolve_slug(None, "Home & Garden").unwrap(), "home-garden");
        assert_eq!(resolve_slug(Some("Custom Slug"), "ignored").unwrap(), "custom-slug");
        assert_eq!(resolve_slug(Some("  "), "Kitchen").unwrap(), "kitchen");
        assert!(resolve_slug(None, "!!!").is_err());
    }
}
