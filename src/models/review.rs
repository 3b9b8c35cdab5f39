use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::time::to_utc;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// Stored in the `reviews` collection; at most one per (user, product).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub product_id: ObjectId,
    pub user_id: ObjectId,
    pub rating: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub verified_purchase: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

pub fn validate_rating(rating: i32) -> Result<(), String> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(format!("Rating must be between {} and {}", MIN_RATING, MAX_RATING))
    }
}

/// Average rounded to one decimal place, 0 when there are no ratings.
pub fn round_average(sum: f64, count: i64) -> f64 {
    if count <= 0 {
        return 0.0;
    }
    ((sum / count as f64) * 10.0).round() / 10.0
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateReviewRequest {
    pub product_id: String,
    pub rating: i32,
    pub title: Option<String>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateReviewRequest {
    pub rating: Option<i32>,
    pub title: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ReviewResponse {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    pub rating: i32,
    pub title: Option<String>,
    pub comment: String,
    pub verified_purchase: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(r: Review) -> Self {
        ReviewResponse {
            id: r.id.map(|id| id.to_hex()).unwrap_or_default(),
            product_id: r.product_id.to_hex(),
            user_id: r.user_id.to_hex(),
            user_name: None,
            user_avatar: None,
            rating: r.rating,
            title: r.title,
            comment: r.comment,
            verified_purchase: r.verified_purchase,
            created_at: to_utc(r.created_at),
            updated_at: to_utc(r.updated_at),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductReviewsResponse {
    pub success: bool,
    pub items: Vec<ReviewResponse>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub rating_average: f64,
    pub rating_count: i64,
    /// Index 0 holds the number of 1-star reviews, index 4 the 5-star ones.
    pub distribution: [i64; 5],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rating() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn test_round_average() {
        assert_eq!(round_average(0.0, 0), 0.0);
        assert_eq!(round_average(14.0, 3), 4.7);
        assert_eq!(round_average(9.0, 2), 4.5);
    }
}
