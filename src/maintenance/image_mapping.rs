use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};

use crate::database::{MongoDB, PRODUCTS};
use crate::models::Product;
use crate::services::upload_service::{UploadFolder, PUBLIC_PREFIX};
use crate::utils::AppResult;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, Default)]
pub struct ImageReport {
    pub files_scanned: usize,
    pub attached: usize,
    pub already_present: usize,
    pub unmatched: Vec<String>,
}

impl fmt::Display for ImageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s) scanned, {} attached, {} already present, {} unmatched",
            self.files_scanned,
            self.attached,
            self.already_present,
            self.unmatched.len()
        )
    }
}

pub fn is_image_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Lookup keys for a file stem: the stem itself, then the stem without a
/// trailing `-N` counter (`tshirt-red-2` also tries `tshirt-red`).
pub fn candidate_keys(stem: &str) -> Vec<String> {
    let stem = stem.to_lowercase();
    let mut keys = vec![stem.clone()];
    if let Some((base, counter)) = stem.rsplit_once('-') {
        if !base.is_empty() && !counter.is_empty() && counter.chars().all(|c| c.is_ascii_digit()) {
            keys.push(base.to_string());
        }
    }
    keys
}

/// Lowercased sku and slug of every product, mapped to its id. SKUs win
/// over slugs when both collide.
pub fn index_products(products: &[Product]) -> HashMap<String, ObjectId> {
    let mut index = HashMap::new();
    for p in products {
        if let Some(id) = p.id {
            index.entry(p.slug.to_lowercase()).or_insert(id);
        }
    }
    for p in products {
        if let Some(id) = p.id {
            index.insert(p.sku.to_lowercase(), id);
        }
    }
    index
}

pub fn match_file(file_name: &str, index: &HashMap<String, ObjectId>) -> Option<ObjectId> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    candidate_keys(stem).iter().find_map(|k| index.get(k).copied())
}

fn public_url(file_name: &str) -> String {
    format!("{}/{}/{}", PUBLIC_PREFIX, UploadFolder::Products.as_str(), file_name)
}

/// Attaches every image in `dir` to the product it is named after. Files
/// outside the served products folder are copied into it first.
pub async fn run(db: &MongoDB, upload_dir: &str, dir: Option<&str>) -> AppResult<ImageReport> {
    let served = Path::new(upload_dir).join(UploadFolder::Products.as_str());
    let scan: PathBuf = dir.map(PathBuf::from).unwrap_or_else(|| served.clone());
    log::info!("🖼️ Scanning {}", scan.display());

    let products: Vec<Product> = db
        .collection::<Product>(PRODUCTS)
        .find(doc! {})
        .await?
        .try_collect()
        .await?;
    let index = index_products(&products);
    let images: HashMap<ObjectId, &Vec<String>> =
        products.iter().filter_map(|p| Some((p.id?, &p.images))).collect();

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(&scan).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_image_file(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    let copy_needed = tokio::fs::canonicalize(&scan).await.ok()
        != tokio::fs::canonicalize(&served).await.ok();
    if copy_needed {
        tokio::fs::create_dir_all(&served).await?;
    }

    let mut report = ImageReport::default();
    for name in names {
        report.files_scanned += 1;
        let Some(product_id) = match_file(&name, &index) else {
            report.unmatched.push(name);
            continue;
        };

        let url = public_url(&name);
        if images.get(&product_id).is_some_and(|list| list.contains(&url)) {
            report.already_present += 1;
            continue;
        }

        if copy_needed {
            tokio::fs::copy(scan.join(&name), served.join(&name)).await?;
        }
        db.collection::<Product>(PRODUCTS)
            .update_one(
                doc! { "_id": product_id },
                doc! {
                    "$addToSet": { "images": url.as_str() },
                    "$set": { "updated_at": BsonDateTime::now() },
                },
            )
            .await?;
        log::info!("   ✅ {} -> {}", name, product_id);
        report.attached += 1;
    }

    for name in &report.unmatched {
        log::warn!("   ⚠️ No product for {}", name);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::fixtures::product;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file("a.JPG"));
        assert!(is_image_file("a.webp"));
        assert!(!is_image_file("notes.txt"));
        assert!(!is_image_file("noext"));
    }

    #[test]
    fn test_candidate_keys() {
        assert_eq!(candidate_keys("TSHIRT-RED-2"), vec!["tshirt-red-2", "tshirt-red"]);
        assert_eq!(candidate_keys("mug"), vec!["mug"]);
        assert_eq!(candidate_keys("mug-x"), vec!["mug-x"]);
        assert_eq!(candidate_keys("-3"), vec!["-3"]);
    }

    #[test]
    fn test_match_file_by_sku_or_slug() {
        let mut shirt = product("TS-001", 10.0, 1);
        shirt.slug = "classic-tee".into();
        let mug = product("MUG-1", 5.0, 1);
        let index = index_products(&[shirt.clone(), mug.clone()]);

        assert_eq!(match_file("ts-001.jpg", &index), shirt.id);
        assert_eq!(match_file("classic-tee-3.png", &index), shirt.id);
        // `mug-1` is a sku in its own right, not `mug` with a counter
        assert_eq!(match_file("MUG-1.webp", &index), mug.id);
        assert_eq!(match_file("unknown.jpg", &index), None);
    }
}
