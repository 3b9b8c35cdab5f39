use crate::{
    database::{MongoDB, ORDERS, PRODUCTS, REVIEWS, USERS},
    models::order::OrderStatus,
    models::review::{
        round_average, validate_rating, CreateReviewRequest, ProductReviewsResponse, Review,
        ReviewResponse, UpdateReviewRequest, MAX_RATING, MIN_RATING,
    },
    models::{Product, User},
    services::auth_service::Claims,
    utils::{AppError, AppResult, Page, PageQuery},
};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use std::collections::HashMap;

/// Average, count and per-star distribution of a product's reviews.
pub fn rating_pipeline(product_id: &ObjectId) -> Vec<Document> {
    vec![
        doc! { "$match": { "product_id": product_id } },
        doc! { "$group": { "_id": "$rating", "count": { "$sum": 1 } } },
    ]
}

/// Folds `{_id: rating, count}` rows into `(average, count, distribution)`.
pub fn fold_ratings(rows: &[Document]) -> (f64, i64, [i64; 5]) {
    let mut distribution = [0_i64; 5];
    for row in rows {
        let rating = match row.get("_id") {
            Some(Bson::Int32(r)) => *r as i64,
            Some(Bson::Int64(r)) => *r,
            _ => continue,
        };
        let count = match row.get("count") {
            Some(Bson::Int32(c)) => *c as i64,
            Some(Bson::Int64(c)) => *c,
            _ => 0,
        };
        if (MIN_RATING as i64..=MAX_RATING as i64).contains(&rating) {
            distribution[(rating - 1) as usize] += count;
        }
    }
    let count: i64 = distribution.iter().sum();
    let sum: i64 = distribution
        .iter()
        .enumerate()
        .map(|(idx, c)| (idx as i64 + 1) * c)
        .sum();
    (round_average(sum as f64, count), count, distribution)
}

async fn rating_summary(db: &MongoDB, product_id: &ObjectId) -> AppResult<(f64, i64, [i64; 5])> {
    let cursor = db
        .collection::<Review>(REVIEWS)
        .aggregate(rating_pipeline(product_id))
        .await?;
    let rows: Vec<Document> = cursor.try_collect().await?;
    Ok(fold_ratings(&rows))
}

/// Recomputes the cached rating fields on the product.
pub async fn refresh_product_rating(db: &MongoDB, product_id: &ObjectId) -> AppResult<()> {
    let (average, count, _) = rating_summary(db, product_id).await?;
    db.collection::<Product>(PRODUCTS)
        .update_one(
            doc! { "_id": product_id },
            doc! { "$set": { "rating_average": average, "rating_count": count } },
        )
        .await?;
    log::debug!("⭐ Product {} rating {} ({} reviews)", product_id, average, count);
    Ok(())
}

/// Attaches reviewer name and avatar.
async fn with_authors(db: &MongoDB, reviews: Vec<Review>) -> AppResult<Vec<ReviewResponse>> {
    let mut ids: Vec<ObjectId> = reviews.iter().map(|r| r.user_id).collect();
    ids.sort();
    ids.dedup();

    let users: HashMap<ObjectId, User> = if ids.is_empty() {
        HashMap::new()
    } else {
        let cursor = db
            .collection::<User>(USERS)
            .find(doc! { "_id": { "$in": ids } })
            .await?;
        let users: Vec<User> = cursor.try_collect().await?;
        users.into_iter().filter_map(|u| u.id.map(|id| (id, u))).collect()
    };

    Ok(reviews
        .into_iter()
        .map(|review| {
            let author = users.get(&review.user_id);
            let mut response = ReviewResponse::from(review);
            if let Some(user) = author {
                response.user_name = Some(user.name.clone());
                response.user_avatar = user.avatar.clone();
            }
            response
        })
        .collect())
}

pub async fn list_for_product(
    db: &MongoDB,
    product_id: &ObjectId,
    page: &PageQuery,
) -> AppResult<ProductReviewsResponse> {
    let collection = db.collection::<Review>(REVIEWS);
    let filter = doc! { "product_id": product_id };

    let total = collection.count_documents(filter.clone()).await?;
    let cursor = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?;
    let reviews: Vec<Review> = cursor.try_collect().await?;
    let items = with_authors(db, reviews).await?;
    let (rating_average, rating_count, distribution) = rating_summary(db, product_id).await?;

    let listing = Page::new(items, page, total);
    Ok(ProductReviewsResponse {
        success: true,
        items: listing.items,
        page: listing.page,
        limit: listing.limit,
        total: listing.total,
        total_pages: listing.total_pages,
        rating_average,
        rating_count,
        distribution,
    })
}

pub async fn list_mine(
    db: &MongoDB,
    user_id: &ObjectId,
    page: &PageQuery,
) -> AppResult<Page<ReviewResponse>> {
    let collection = db.collection::<Review>(REVIEWS);
    let filter = doc! { "user_id": user_id };
    let total = collection.count_documents(filter.clone()).await?;
    let cursor = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.limit() as i64)
        .await?;
    let reviews: Vec<Review> = cursor.try_collect().await?;
    Ok(Page::new(with_authors(db, reviews).await?, page, total))
}

/// A purchase is verified once an order containing the product was delivered.
async fn has_delivered_purchase(db: &MongoDB, user_id: &ObjectId, product_id: &ObjectId) -> AppResult<bool> {
    let count = db
        .collection::<Document>(ORDERS)
        .count_documents(doc! {
            "user_id": user_id,
            "status": OrderStatus::Delivered.as_str(),
            "items.product_id": product_id,
        })
        .await?;
    Ok(count > 0)
}

fn clean_title(title: Option<String>) -> Option<String> {
    title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

pub async fn create(
    db: &MongoDB,
    user_id: &ObjectId,
    request: CreateReviewRequest,
) -> AppResult<ReviewResponse> {
    validate_rating(request.rating).map_err(AppError::Validation)?;
    let product_id = ObjectId::parse_str(&request.product_id)?;

    let product_exists = db
        .collection::<Product>(PRODUCTS)
        .count_documents(doc! { "_id": product_id, "is_active": true })
        .await?;
    if product_exists == 0 {
        return Err(AppError::not_found("Product"));
    }

    let now = BsonDateTime::now();
    let mut review = Review {
        id: None,
        product_id,
        user_id: *user_id,
        rating: request.rating,
        title: clean_title(request.title),
        comment: request.comment.trim().to_string(),
        verified_purchase: has_delivered_purchase(db, user_id, &product_id).await?,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Review>(REVIEWS)
        .insert_one(&review)
        .await
        .map_err(|e| {
            if crate::utils::is_duplicate_key(&e) {
                AppError::Conflict("You have already reviewed this product".to_string())
            } else {
                AppError::from(e)
            }
        })?;
    review.id = result.inserted_id.as_object_id();

    refresh_product_rating(db, &product_id).await?;
    log::info!("⭐ Review by {} on {}: {} stars", user_id, product_id, review.rating);

    let mut responses = with_authors(db, vec![review]).await?;
    responses
        .pop()
        .ok_or_else(|| AppError::Internal("Review vanished after insert".to_string()))
}

async fn find_by_id(db: &MongoDB, id: &ObjectId) -> AppResult<Review> {
    db.collection::<Review>(REVIEWS)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Review"))
}

pub async fn update(
    db: &MongoDB,
    id: &ObjectId,
    user_id: &ObjectId,
    request: UpdateReviewRequest,
) -> AppResult<ReviewResponse> {
    let review = find_by_id(db, id).await?;
    if review.user_id != *user_id {
        return Err(AppError::Forbidden("You can only edit your own reviews".to_string()));
    }

    let mut set = doc! { "updated_at": BsonDateTime::now() };
    if let Some(rating) = request.rating {
        validate_rating(rating).map_err(AppError::Validation)?;
        set.insert("rating", rating);
    }
    if request.title.is_some() {
        match clean_title(request.title) {
            Some(title) => set.insert("title", title),
            None => set.insert("title", Bson::Null),
        };
    }
    if let Some(comment) = request.comment {
        set.insert("comment", comment.trim());
    }

    db.collection::<Review>(REVIEWS)
        .update_one(doc! { "_id": id }, doc! { "$set": set })
        .await?;
    refresh_product_rating(db, &review.product_id).await?;

    let updated = find_by_id(db, id).await?;
    let mut responses = with_authors(db, vec![updated]).await?;
    responses.pop().ok_or_else(|| AppError::not_found("Review"))
}

pub async fn delete(db: &MongoDB, id: &ObjectId, claims: &Claims) -> AppResult<()> {
    let review = find_by_id(db, id).await?;
    if !claims.is_admin() && review.user_id != claims.user_id()? {
        return Err(AppError::Forbidden("You can only delete your own reviews".to_string()));
    }

    db.collection::<Review>(REVIEWS).delete_one(doc! { "_id": id }).await?;
    refresh_product_rating(db, &review.product_id).await?;
    log::info!("🗑️ Review {} deleted", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_ratings() {
        let rows = vec![
            doc! { "_id": 5, "count": 3 },
            doc! { "_id": 4, "count": 1_i64 },
            doc! { "_id": 1, "count": 1 },
            doc! { "_id": 9, "count": 4 },
            doc! { "_id": "bogus", "count": 2 },
        ];
        let (average, count, distribution) = fold_ratings(&rows);
        assert_eq!(distribution, [1, 0, 0, 1, 3]);
        assert_eq!(count, 5);
        assert_eq!(average, 4.0);
    }

    #[test]
    fn test_fold_ratings_empty() {
        assert_eq!(fold_ratings(&[]), (0.0, 0, [0; 5]));
    }

    #[test]
    fn test_rating_pipeline_matches_product() {
        let id = ObjectId::new();
        let pipeline = rating_pipeline(&id);
        assert_eq!(pipeline[0], doc! { "$match": { "product_id": id } });
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title(Some("  Great  ".into())), Some("Great".into()));
        assert_eq!(clean_title(Some("   ".into())), None);
        assert_eq!(clean_title(None), None);
    }
}
