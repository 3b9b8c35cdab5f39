use std::collections::BTreeMap;
use std::fmt;

use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};

use crate::database::{MongoDB, CATEGORIES, PAYMENT_METHODS, PRODUCTS, VOUCHERS};
use crate::models::product::total_variation_stock;
use crate::models::{Category, DiscountType, PaymentMethod, Product, Variation, Voucher};
use crate::services::category_service;
use crate::utils::slug::slugify;
use crate::utils::AppResult;

/// Inserted counts per collection; `None` means the collection already had data.
#[derive(Debug, Default)]
pub struct SeedReport {
    pub categories: Option<usize>,
    pub products: Option<usize>,
    pub payment_methods: Option<usize>,
    pub vouchers: Option<usize>,
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |n: Option<usize>| n.map_or("skipped".to_string(), |n| format!("{} inserted", n));
        write!(
            f,
            "categories: {}, products: {}, payment methods: {}, vouchers: {}",
            show(self.categories),
            show(self.products),
            show(self.payment_methods),
            show(self.vouchers)
        )
    }
}

async fn is_empty(db: &MongoDB, name: &str) -> AppResult<bool> {
    let count = db.collection::<Document>(name).count_documents(doc! {}).await?;
    if count > 0 {
        log::info!("📋 {}: {} documents already present, skipping seed", name, count);
    }
    Ok(count == 0)
}

/// Seeds each collection only while it is empty, so reruns are harmless.
pub async fn seed_sample_data(db: &MongoDB) -> AppResult<SeedReport> {
    let mut report = SeedReport::default();

    let categories = build_categories();
    if is_empty(db, CATEGORIES).await? {
        let result = db.collection::<Category>(CATEGORIES).insert_many(&categories).await?;
        log::info!("   ✅ Inserted {} categories", result.inserted_ids.len());
        report.categories = Some(result.inserted_ids.len());
    }

    if is_empty(db, PRODUCTS).await? {
        let stored = category_service::all_categories(db).await?;
        let by_slug: BTreeMap<&str, ObjectId> = stored
            .iter()
            .filter_map(|c| Some((c.slug.as_str(), c.id?)))
            .collect();

        let products = build_products(&by_slug);
        let result = db.collection::<Product>(PRODUCTS).insert_many(&products).await?;
        log::info!("   ✅ Inserted {} products", result.inserted_ids.len());
        report.products = Some(result.inserted_ids.len());
    }

    if is_empty(db, PAYMENT_METHODS).await? {
        let methods = build_payment_methods();
        let result = db.collection::<PaymentMethod>(PAYMENT_METHODS).insert_many(&methods).await?;
        log::info!("   ✅ Inserted {} payment methods", result.inserted_ids.len());
        report.payment_methods = Some(result.inserted_ids.len());
    }

    if is_empty(db, VOUCHERS).await? {
        let vouchers = build_vouchers();
        let result = db.collection::<Voucher>(VOUCHERS).insert_many(&vouchers).await?;
        log::info!("   ✅ Inserted {} vouchers", result.inserted_ids.len());
        report.vouchers = Some(result.inserted_ids.len());
    }

    Ok(report)
}

fn category(name: &str, parent: Option<ObjectId>, sort_order: i32) -> Category {
    let now = BsonDateTime::now();
    Category {
        id: Some(ObjectId::new()),
        name: name.into(),
        slug: slugify(name),
        description: None,
        image: None,
        parent_id: parent,
        sort_order,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn build_categories() -> Vec<Category> {
    let clothing = category("Clothing", None, 1);
    let home = category("Home & Kitchen", None, 2);
    let tshirts = category("T-Shirts", clothing.id, 1);
    let hoodies = category("Hoodies", clothing.id, 2);
    let mugs = category("Mugs", home.id, 1);
    vec![clothing, home, tshirts, hoodies, mugs]
}

fn sized(prefix: &str, stock: &[(&str, i64)]) -> Vec<Variation> {
    stock
        .iter()
        .map(|(size, qty)| Variation {
            sku: format!("{}-{}", prefix, size),
            name: format!("Size {}", size),
            attributes: BTreeMap::from([("size".to_string(), size.to_string())]),
            price: None,
            stock: *qty,
        })
        .collect()
}

struct SampleProduct<'a> {
    name: &'a str,
    sku: &'a str,
    category: &'a str,
    price: f64,
    compare_at_price: Option<f64>,
    stock: i64,
    variations: Vec<Variation>,
    featured: bool,
    description: &'a str,
}

fn build_products(categories: &BTreeMap<&str, ObjectId>) -> Vec<Product> {
    let samples = vec![
        SampleProduct {
            name: "Classic Cotton Tee",
            sku: "TEE-CLASSIC",
            category: "t-shirts",
            price: 19.9,
            compare_at_price: Some(24.9),
            stock: 0,
            variations: sized("TEE-CLASSIC", &[("S", 12), ("M", 20), ("L", 15), ("XL", 6)]),
            featured: true,
            description: "Soft 100% cotton t-shirt with a relaxed fit.",
        },
        SampleProduct {
            name: "Graphic Logo Tee",
            sku: "TEE-LOGO",
            category: "t-shirts",
            price: 24.5,
            compare_at_price: None,
            stock: 0,
            variations: sized("TEE-LOGO", &[("S", 4), ("M", 9), ("L", 0)]),
            featured: false,
            description: "Printed logo tee.",
        },
        SampleProduct {
            name: "Zip Hoodie",
            sku: "HOODIE-ZIP",
            category: "hoodies",
            price: 49.0,
            compare_at_price: Some(59.0),
            stock: 0,
            variations: sized("HOODIE-ZIP", &[("M", 7), ("L", 5)]),
            featured: true,
            description: "Fleece-lined hoodie with a full zip.",
        },
        SampleProduct {
            name: "Ceramic Mug 350ml",
            sku: "MUG-350",
            category: "mugs",
            price: 12.0,
            compare_at_price: None,
            stock: 40,
            variations: vec![],
            featured: false,
            description: "Dishwasher-safe stoneware mug.",
        },
        SampleProduct {
            name: "Travel Tumbler",
            sku: "TUMBLER-500",
            category: "mugs",
            price: 27.5,
            compare_at_price: None,
            stock: 18,
            variations: vec![],
            featured: true,
            description: "Insulated steel tumbler that keeps drinks hot for 6 hours.",
        },
    ];

    samples
        .into_iter()
        .map(|s| {
            let now = BsonDateTime::now();
            let stock = if s.variations.is_empty() {
                s.stock
            } else {
                total_variation_stock(&s.variations)
            };
            Product {
                id: None,
                name: s.name.into(),
                slug: slugify(s.name),
                description: s.description.into(),
                sku: s.sku.into(),
                price: s.price,
                compare_at_price: s.compare_at_price,
                category_id: categories.get(s.category).copied(),
                images: vec![],
                variations: s.variations,
                stock,
                sold: 0,
                rating_average: 0.0,
                rating_count: 0,
                is_active: true,
                is_featured: s.featured,
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}

fn build_payment_methods() -> Vec<PaymentMethod> {
    let method = |name: &str, code: &str, instructions: Option<&str>, sort_order: i32| {
        let now = BsonDateTime::now();
        PaymentMethod {
            id: None,
            name: name.into(),
            code: code.into(),
            description: None,
            instructions: instructions.map(String::from),
            icon: None,
            sort_order,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    };
    vec![
        method("Cash on delivery", "cod", Some("Pay the courier when the parcel arrives."), 1),
        method(
            "Bank transfer",
            "bank_transfer",
            Some("Transfer the order total and put the order number in the reference."),
            2,
        ),
    ]
}

fn build_vouchers() -> Vec<Voucher> {
    let now = BsonDateTime::now();
    let voucher = |code: &str, discount_type, value, min_order_value, max_discount, once_per_user| Voucher {
        id: None,
        code: code.into(),
        description: None,
        discount_type,
        value,
        min_order_value,
        max_discount,
        usage_limit: None,
        used_count: 0,
        once_per_user,
        used_by: vec![],
        starts_at: None,
        expires_at: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    vec![
        voucher("WELCOME10", DiscountType::Percentage, 10.0, 0.0, Some(20.0), true),
        voucher("SAVE5", DiscountType::Fixed, 5.0, 30.0, None, false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::voucher::normalize_code;

    #[test]
    fn test_sample_categories_nest_under_roots() {
        let categories = build_categories();
        let roots: Vec<_> = categories.iter().filter(|c| c.parent_id.is_none()).collect();
        assert_eq!(roots.len(), 2);
        assert!(categories.iter().any(|c| c.slug == "t-shirts"));
    }

    #[test]
    fn test_sample_products_keep_stock_in_sync() {
        let categories = build_categories();
        let by_slug: BTreeMap<&str, ObjectId> =
            categories.iter().map(|c| (c.slug.as_str(), c.id.unwrap())).collect();

        for p in build_products(&by_slug) {
            assert!(p.category_id.is_some(), "{} has no category", p.sku);
            if p.has_variations() {
                assert_eq!(p.stock, total_variation_stock(&p.variations));
            }
        }
        assert!(build_products(&BTreeMap::new()).iter().all(|p| p.category_id.is_none()));
    }

    #[test]
    fn test_sample_vouchers_use_normalized_codes() {
        for v in build_vouchers() {
            assert_eq!(normalize_code(&v.code), v.code);
        }
    }
}
