use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::error::Error;

pub const USERS: &str = "users";
pub const PRODUCTS: &str = "products";
pub const CATEGORIES: &str = "categories";
pub const CARTS: &str = "carts";
pub const ORDERS: &str = "orders";
pub const PAYMENT_METHODS: &str = "payment_methods";
pub const REVIEWS: &str = "reviews";
pub const VOUCHERS: &str = "vouchers";

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        let db_name = database_name(uri);
        let db = client.database(&db_name);

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { db };

        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Unique indexes carry the uniqueness and per-user cardinality rules;
    /// the rest back the hot read paths.
    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        log::info!("🔧 Creating database indexes...");

        let unique: &[(&str, Document)] = &[
            (USERS, doc! { "email": 1 }),
            (PRODUCTS, doc! { "slug": 1 }),
            (PRODUCTS, doc! { "sku": 1 }),
            (CATEGORIES, doc! { "slug": 1 }),
            (CARTS, doc! { "user_id": 1 }),
            (ORDERS, doc! { "order_number": 1 }),
            (PAYMENT_METHODS, doc! { "code": 1 }),
            (REVIEWS, doc! { "user_id": 1, "product_id": 1 }),
            (VOUCHERS, doc! { "code": 1 }),
        ];

        for (collection, keys) in unique {
            let index = IndexModel::builder()
                .keys(keys.clone())
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.create_index(collection, index).await?;
        }

        let plain: &[(&str, Document)] = &[
            (PRODUCTS, doc! { "category_id": 1, "is_active": 1 }),
            (PRODUCTS, doc! { "variations.sku": 1 }),
            (CATEGORIES, doc! { "parent_id": 1 }),
            (ORDERS, doc! { "user_id": 1, "created_at": -1 }),
            (ORDERS, doc! { "status": 1, "created_at": -1 }),
            (REVIEWS, doc! { "product_id": 1, "created_at": -1 }),
        ];

        for (collection, keys) in plain {
            let index = IndexModel::builder().keys(keys.clone()).build();
            self.create_index(collection, index).await?;
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> Result<(), Box<dyn Error>> {
        let keys = index.keys.clone();
        match self.collection::<Document>(collection).create_index(index).await {
            Ok(_) => {
                log::info!("   ✅ Index ready: {}({:?})", collection, keys.keys().collect::<Vec<_>>());
                Ok(())
            }
            // Existing data violating a unique index must stop startup.
            Err(e) if crate::utils::is_duplicate_key(&e) => Err(Box::new(e)),
            Err(e) => {
                log::debug!("   ℹ️  Index on {} not created: {}", collection, e);
                Ok(())
            }
        }
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub async fn ping(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }
}

/// Connection for `#[ignore]`d tests; `TEST_DATABASE_URL` or a local `shop_test`.
#[cfg(test)]
pub(crate) async fn test_db() -> MongoDB {
    dotenv::dotenv().ok();
    let uri = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "mongodb://localhost:27017/shop_test".to_string());
    MongoDB::new(&uri).await.expect("MongoDB must be running")
}

/// Database name from the URI path, `shop` when absent.
fn database_name(uri: &str) -> String {
    let without_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    without_scheme
        .split_once('/')
        .map(|(_, path)| path.split('?').next().unwrap_or(""))
        .filter(|name| !name.is_empty())
        .unwrap_or("shop")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_name_from_uri() {
        assert_eq!(database_name("mongodb://localhost:27017/ecommerce"), "ecommerce");
        assert_eq!(
            database_name("mongodb+srv://u:p@cluster.example.net/store?retryWrites=true"),
            "store"
        );
        assert_eq!(database_name("mongodb://localhost:27017"), "shop");
        assert_eq!(database_name("mongodb://localhost:27017/?replicaSet=rs0"), "shop");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_mongodb_connection() {
        let db = test_db().await;
        assert!(db.ping().await);
    }
}
