use common::CategoryId;
use domain::Product;

/// Builder for product listing filters.
///
/// Filters combine with AND. Results are ordered by name, then SKU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    /// Filter by the active flag.
    pub active: Option<bool>,

    /// Only products at or below their reorder level.
    pub low_stock: bool,

    /// Filter by category.
    pub category_id: Option<CategoryId>,

    /// Case-insensitive substring match on name or SKU.
    pub search: Option<String>,

    /// Maximum number of products to return.
    pub limit: Option<usize>,

    /// Number of products to skip.
    pub offset: Option<usize>,
}

impl ProductQuery {
    /// Creates a query matching every product.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for the products of one category.
    pub fn in_category(category_id: CategoryId) -> Self {
        Self {
            category_id: Some(category_id),
            ..Default::default()
        }
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn low_stock(mut self) -> Self {
        self.low_stock = true;
        self
    }

    pub fn category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Blank search terms are ignored.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether `product` passes every filter (pagination excluded).
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(active) = self.active
            && product.is_active != active
        {
            return false;
        }
        if self.low_stock && !product.is_low_stock() {
            return false;
        }
        if let Some(category_id) = self.category_id
            && product.category_id != Some(category_id)
        {
            return false;
        }
        if let Some(ref term) = self.search {
            let term = term.to_lowercase();
            let in_name = product.name.to_lowercase().contains(&term);
            let in_sku = product.sku.as_str().to_lowercase().contains(&term);
            if !in_name && !in_sku {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Currency, Money, ProductId, Version};
    use domain::{ProductParts, Sku};

    fn product(name: &str, sku: &str, stock: i64, active: bool) -> Product {
        Product::from_parts(ProductParts {
            id: ProductId::new(),
            name: name.into(),
            description: None,
            sku: Sku::parse(sku).unwrap(),
            category_id: None,
            price: Money::from_minor_units(1_000, Currency::EUR),
            stock_quantity: stock,
            min_stock_level: 5,
            is_active: active,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        })
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(ProductQuery::new().matches(&product("Mouse", "MS-1", 0, false)));
    }

    #[test]
    fn filters_combine() {
        let query = ProductQuery::new().active(true).low_stock();
        assert!(query.matches(&product("Mouse", "MS-1", 2, true)));
        assert!(!query.matches(&product("Mouse", "MS-1", 50, true)));
        assert!(!query.matches(&product("Mouse", "MS-1", 2, false)));
    }

    #[test]
    fn search_is_case_insensitive_on_name_and_sku() {
        let p = product("Wireless Mouse", "WM-100", 10, true);
        assert!(ProductQuery::new().search("wireless").matches(&p));
        assert!(ProductQuery::new().search("wm-1").matches(&p));
        assert!(!ProductQuery::new().search("keyboard").matches(&p));
    }

    #[test]
    fn blank_search_is_ignored() {
        assert_eq!(ProductQuery::new().search("   ").search, None);
    }

    #[test]
    fn category_filter() {
        let category = CategoryId::new();
        let p = product("Mouse", "MS-1", 1, true);
        assert!(!ProductQuery::in_category(category).matches(&p));
    }
}
