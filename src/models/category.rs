use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::utils::time::to_utc;

/// Stored in the `categories` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub parent_id: Option<ObjectId>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// An empty `parent_id` moves the category to the root.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    #[serde(default)]
    pub tree: bool,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(no_recursion)]
    pub children: Option<Vec<CategoryResponse>>,
}

impl From<Category> for CategoryResponse {
    fn from(c: Category) -> Self {
        CategoryResponse {
            id: c.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: c.name,
            slug: c.slug,
            description: c.description,
            image: c.image,
            parent_id: c.parent_id.map(|id| id.to_hex()),
            sort_order: c.sort_order,
            is_active: c.is_active,
            created_at: to_utc(c.created_at),
            children: None,
        }
    }
}

fn sort_categories(list: &mut [Category]) {
    list.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
}

/// Nests categories under their parents. Categories whose parent is missing
/// from `all` become roots.
pub fn build_tree(mut all: Vec<Category>) -> Vec<CategoryResponse> {
    sort_categories(&mut all);

    let known: HashSet<ObjectId> = all.iter().filter_map(|c| c.id).collect();
    let mut by_parent: HashMap<Option<ObjectId>, Vec<Category>> = HashMap::new();
    for c in all {
        let parent = c.parent_id.filter(|p| known.contains(p) && Some(*p) != c.id);
        by_parent.entry(parent).or_default().push(c);
    }

    fn attach(
        parent: Option<ObjectId>,
        by_parent: &mut HashMap<Option<ObjectId>, Vec<Category>>,
        depth: usize,
    ) -> Vec<CategoryResponse> {
        // Cycles never reach the root bucket; the depth bound stops any runaway.
        if depth > 64 {
            return vec![];
        }
        let children = by_parent.remove(&parent).unwrap_or_default();
        children
            .into_iter()
            .map(|c| {
                let id = c.id;
                let mut node = CategoryResponse::from(c);
                node.children = Some(attach(id, by_parent, depth + 1));
                node
            })
            .collect()
    }

    attach(None, &mut by_parent, 0)
}

/// `root` plus every category below it.
pub fn descendant_ids(all: &[Category], root: ObjectId) -> Vec<ObjectId> {
    let mut result = vec![root];
    let mut seen: HashSet<ObjectId> = HashSet::from([root]);
    let mut frontier = vec![root];

    while let Some(current) = frontier.pop() {
        for c in all {
            if let (Some(id), Some(parent)) = (c.id, c.parent_id) {
                if parent == current && seen.insert(id) {
                    result.push(id);
                    frontier.push(id);
                }
            }
        }
    }

    result
}

/// True when making `new_parent` the parent of `category` would form a loop.
pub fn would_create_cycle(all: &[Category], category: ObjectId, new_parent: ObjectId) -> bool {
    descendant_ids(all, category).contains(&new_parent)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn category(name: &str, parent: Option<ObjectId>) -> Category {
        Category {
            id: Some(ObjectId::new()),
            name: name.to_string(),
            slug: crate::utils::slug::slugify(name),
            description: None,
            image: None,
            parent_id: parent,
            sort_order: 0,
            is_active: true,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::category;
    use super::*;

    #[test]
    fn test_build_tree_nests_children() {
        let clothing = category("Clothing", None);
        let shirts = category("Shirts", clothing.id);
        let tees = category("Tees", shirts.id);
        let shoes = category("Shoes", None);

        let tree = build_tree(vec![tees.clone(), shoes, shirts, clothing]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "Clothing");
        let shirts_node = &tree[0].children.as_ref().unwrap()[0];
        assert_eq!(shirts_node.name, "Shirts");
        assert_eq!(shirts_node.children.as_ref().unwrap()[0].id, tees.id.unwrap().to_hex());
        assert!(tree[1].children.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_orphans_become_roots() {
        let orphan = category("Orphan", Some(ObjectId::new()));
        let tree = build_tree(vec![orphan]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "Orphan");
    }

    #[test]
    fn test_descendants_and_cycles() {
        let root = category("Root", None);
        let child = category("Child", root.id);
        let grandchild = category("Grandchild", child.id);
        let other = category("Other", None);
        let all = vec![root.clone(), child.clone(), grandchild.clone(), other.clone()];

        let ids = descendant_ids(&all, root.id.unwrap());
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&other.id.unwrap()));

        assert!(would_create_cycle(&all, root.id.unwrap(), grandchild.id.unwrap()));
        assert!(would_create_cycle(&all, root.id.unwrap(), root.id.unwrap()));
        assert!(!would_create_cycle(&all, grandchild.id.unwrap(), other.id.unwrap()));
    }
}
