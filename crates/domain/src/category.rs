//! Product categories and the category hierarchy.
//!
//! A category row only knows its parent. Hierarchy questions (level, path,
//! descendants, cycle checks) are answered by a [`CategoryTree`] built over
//! a snapshot of all categories. Traversals are iterative and stop on the
//! first repeated node, so a corrupted snapshot yields an error instead of
//! looping.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use common::{CategoryId, Version};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, required_text};

/// Separator used by [`CategoryTree::full_path`].
pub const PATH_SEPARATOR: &str = " > ";

/// URL-safe category key: lowercase ASCII letters, digits and dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub const MAX_LEN: usize = 100;

    /// Validates an explicit slug.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim().to_ascii_lowercase();
        let valid_chars = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if value.is_empty() || value.len() > Self::MAX_LEN || !valid_chars {
            return Err(DomainError::validation(
                "Slug must be 1-100 characters of a-z, 0-9 and '-'",
            ));
        }
        Ok(Self(value))
    }

    /// Derives a slug from a display name ("Laptops & Tablets" -> "laptops-tablets").
    pub fn from_name(name: &str) -> Result<Self, DomainError> {
        let mut slug = String::with_capacity(name.len());
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_end_matches('-');
        let slug: String = slug.chars().take(Self::MAX_LEN).collect();
        Self::parse(slug.trim_end_matches('-'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

/// A node of the category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub slug: Slug,
    pub parent_id: Option<CategoryId>,
    pub position: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl Category {
    /// Validates a category name.
    pub fn validate_name(name: &str) -> Result<String, DomainError> {
        required_text("Category name", name, 2, 255)
    }

    /// A root category has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Read-only index over a snapshot of categories.
#[derive(Debug)]
pub struct CategoryTree<'a> {
    by_id: HashMap<CategoryId, &'a Category>,
    children: HashMap<CategoryId, Vec<&'a Category>>,
}

impl<'a> CategoryTree<'a> {
    pub fn new(categories: &'a [Category]) -> Self {
        let by_id = categories.iter().map(|c| (c.id, c)).collect();
        let mut children: HashMap<CategoryId, Vec<&'a Category>> = HashMap::new();
        for category in categories {
            if let Some(parent) = category.parent_id {
                children.entry(parent).or_default().push(category);
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| a.position.cmp(&b.position).then(a.name.cmp(&b.name)));
        }
        Self { by_id, children }
    }

    pub fn get(&self, id: CategoryId) -> Option<&'a Category> {
        self.by_id.get(&id).copied()
    }

    /// Direct children ordered by position, then name.
    pub fn children(&self, id: CategoryId) -> &[&'a Category] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_leaf(&self, id: CategoryId) -> bool {
        self.children(id).is_empty()
    }

    /// Ancestors of `id`, nearest parent first.
    pub fn ancestors(&self, id: CategoryId) -> Result<Vec<&'a Category>, DomainError> {
        let mut node = self.require(id)?;
        let mut seen = HashSet::from([id]);
        let mut ancestors = Vec::new();
        while let Some(parent_id) = node.parent_id {
            if !seen.insert(parent_id) {
                return Err(DomainError::validation(format!(
                    "Category hierarchy contains a cycle at {parent_id}"
                )));
            }
            node = self.require(parent_id)?;
            ancestors.push(node);
        }
        Ok(ancestors)
    }

    /// Depth of `id`; roots are at level 0.
    pub fn level(&self, id: CategoryId) -> Result<usize, DomainError> {
        Ok(self.ancestors(id)?.len())
    }

    /// Root-to-node names joined by [`PATH_SEPARATOR`].
    pub fn full_path(&self, id: CategoryId) -> Result<String, DomainError> {
        let node = self.require(id)?;
        let mut names: Vec<&str> = self
            .ancestors(id)?
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        names.reverse();
        names.push(&node.name);
        Ok(names.join(PATH_SEPARATOR))
    }

    /// All categories below `id`, breadth first.
    pub fn descendants(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            for child in self.children(current) {
                if seen.insert(child.id) {
                    out.push(child.id);
                    queue.push_back(child.id);
                }
            }
        }
        out
    }

    /// Checks that giving `id` the parent `parent` keeps the hierarchy a tree.
    ///
    /// `id` need not exist yet, which covers new categories.
    pub fn validate_parent(
        &self,
        id: CategoryId,
        parent: Option<CategoryId>,
    ) -> Result<(), DomainError> {
        let Some(parent) = parent else {
            return Ok(());
        };
        if parent == id {
            return Err(DomainError::validation(
                "A category cannot be its own parent",
            ));
        }
        self.require(parent)?;
        if self.ancestors(parent)?.iter().any(|c| c.id == id) {
            return Err(DomainError::validation(
                "A category cannot be moved under one of its own descendants",
            ));
        }
        Ok(())
    }

    fn require(&self, id: CategoryId) -> Result<&'a Category, DomainError> {
        self.get(id)
            .ok_or_else(|| DomainError::validation(format!("Category {id} does not exist")))
    }
}
