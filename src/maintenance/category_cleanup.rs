use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime};

use crate::database::{MongoDB, CATEGORIES, PRODUCTS};
use crate::models::Category;
use crate::services::category_service;
use crate::utils::slug::slugify;
use crate::utils::AppResult;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CategoryFix {
    pub clear_parent: bool,
    pub slug: Option<String>,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub categories_scanned: usize,
    pub parents_cleared: usize,
    pub slugs_rewritten: usize,
    pub products_detached: u64,
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} categories scanned, {} parent link(s) cleared, {} slug(s) rewritten, {} product(s) detached",
            self.categories_scanned, self.parents_cleared, self.slugs_rewritten, self.products_detached
        )
    }
}

/// Parent links to drop: missing parents, self references, and one link per cycle.
fn broken_parents(categories: &[Category]) -> HashSet<ObjectId> {
    let known: HashSet<ObjectId> = categories.iter().filter_map(|c| c.id).collect();
    let mut parents: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();
    let mut broken = HashSet::new();

    for c in categories {
        let (Some(id), Some(parent)) = (c.id, c.parent_id) else {
            continue;
        };
        if parent == id || !known.contains(&parent) {
            broken.insert(id);
        } else {
            parents.insert(id, parent);
        }
    }

    let mut settled: HashSet<ObjectId> = HashSet::new();
    let starts: Vec<ObjectId> = parents.keys().copied().collect();
    for start in starts {
        let mut path: Vec<ObjectId> = Vec::new();
        let mut on_path: HashSet<ObjectId> = HashSet::new();
        let mut current = start;

        loop {
            if settled.contains(&current) {
                break;
            }
            path.push(current);
            on_path.insert(current);
            match parents.get(&current) {
                Some(next) if on_path.contains(next) => {
                    // `current` closes the loop
                    parents.remove(&current);
                    broken.insert(current);
                    break;
                }
                Some(next) => current = *next,
                None => break,
            }
        }
        settled.extend(path);
    }

    broken
}

/// Every category whose slug is empty or already taken gets a fresh one
/// derived from its name. Earlier categories keep theirs.
fn rewritten_slugs(categories: &[Category]) -> HashMap<ObjectId, String> {
    let mut ordered: Vec<&Category> = categories.iter().filter(|c| c.id.is_some()).collect();
    ordered.sort_by_key(|c| c.id);

    let mut taken: HashSet<String> = HashSet::new();
    let mut pending = Vec::new();
    for c in ordered {
        let slug = c.slug.trim().to_lowercase();
        if slug.is_empty() || !taken.insert(slug) {
            pending.push(c);
        }
    }

    let mut rewritten = HashMap::new();
    for c in pending {
        let base = match slugify(&c.name) {
            s if s.is_empty() => "category".to_string(),
            s => s,
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(&candidate) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        taken.insert(candidate.clone());
        if let Some(id) = c.id {
            rewritten.insert(id, candidate);
        }
    }
    rewritten
}

pub fn plan(categories: &[Category]) -> BTreeMap<ObjectId, CategoryFix> {
    let mut fixes: BTreeMap<ObjectId, CategoryFix> = BTreeMap::new();
    for id in broken_parents(categories) {
        fixes.entry(id).or_default().clear_parent = true;
    }
    for (id, slug) in rewritten_slugs(categories) {
        fixes.entry(id).or_default().slug = Some(slug);
    }
    fixes
}

pub async fn run(db: &MongoDB) -> AppResult<CleanupReport> {
    let categories = category_service::all_categories(db).await?;
    let fixes = plan(&categories);
    let collection = db.collection::<Category>(CATEGORIES);

    let mut report = CleanupReport {
        categories_scanned: categories.len(),
        ..Default::default()
    };

    for (id, fix) in &fixes {
        let mut set = doc! { "updated_at": BsonDateTime::now() };
        if fix.clear_parent {
            set.insert("parent_id", Bson::Null);
            report.parents_cleared += 1;
        }
        if let Some(slug) = &fix.slug {
            set.insert("slug", slug.as_str());
            report.slugs_rewritten += 1;
        }
        collection.update_one(doc! { "_id": id }, doc! { "$set": set }).await?;
        log::info!("   🔧 Category {}: {:?}", id, fix);
    }

    let known: Vec<ObjectId> = categories.iter().filter_map(|c| c.id).collect();
    let detached = db
        .collection::<mongodb::bson::Document>(PRODUCTS)
        .update_many(
            doc! { "category_id": { "$ne": Bson::Null, "$nin": known } },
            doc! {
                "$unset": { "category_id": "" },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        )
        .await?;
    report.products_detached = detached.modified_count;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, slug: &str, parent: Option<ObjectId>) -> Category {
        Category {
            id: Some(ObjectId::new()),
            name: name.into(),
            slug: slug.into(),
            description: None,
            image: None,
            parent_id: parent,
            sort_order: 0,
            is_active: true,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    #[test]
    fn test_missing_and_self_parents_are_cleared() {
        let root = category("Root", "root", None);
        let orphan = category("Orphan", "orphan", Some(ObjectId::new()));
        let mut selfish = category("Self", "self", None);
        selfish.parent_id = selfish.id;
        let child = category("Child", "child", root.id);

        let fixes = plan(&[root, orphan.clone(), selfish.clone(), child]);
        assert_eq!(fixes.len(), 2);
        assert!(fixes[&orphan.id.unwrap()].clear_parent);
        assert!(fixes[&selfish.id.unwrap()].clear_parent);
    }

    #[test]
    fn test_cycle_is_broken_once() {
        let mut a = category("A", "a", None);
        let mut b = category("B", "b", None);
        let mut c = category("C", "c", None);
        a.parent_id = b.id;
        b.parent_id = c.id;
        c.parent_id = a.id;
        let d = category("D", "d", a.id);

        let fixes = plan(&[a, b, c, d]);
        let cleared: Vec<_> = fixes.values().filter(|f| f.clear_parent).collect();
        assert_eq!(cleared.len(), 1);
    }

    #[test]
    fn test_empty_and_duplicate_slugs_are_regenerated() {
        let first = category("Shoes", "shoes", None);
        let second = category("Shoes", "shoes", None);
        let blank = category("Summer Sale!", "  ", None);

        let fixes = plan(&[first.clone(), second.clone(), blank.clone()]);
        assert!(!fixes.contains_key(&first.id.unwrap()));
        assert_eq!(fixes[&second.id.unwrap()].slug.as_deref(), Some("shoes-2"));
        assert_eq!(fixes[&blank.id.unwrap()].slug.as_deref(), Some("summer-sale"));
    }
}
