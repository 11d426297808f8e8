//! Categories and products.

use chrono::Utc;
use common::{CategoryId, ProductId, StockMovementId, Version};
use domain::product::DEFAULT_MIN_STOCK_LEVEL;
use domain::{
    Category, CategoryTree, MovementReason, MovementType, Product, ProductParts, Sku, Slug,
    StockMovement, StockMovementParts,
};
use store::{ChangeSet, ProductQuery, Store};

use crate::commands::{CategoryInput, ProductInput, clean};
use crate::error::{Result, ServiceError};

/// A category with its position in the hierarchy.
#[derive(Debug, Clone)]
pub struct CategoryDetails {
    pub category: Category,
    pub level: usize,
    pub full_path: String,
    pub is_leaf: bool,
}

/// Service for the product catalog.
#[derive(Clone)]
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    // -- Categories --

    #[tracing::instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<CategoryDetails>> {
        let categories = self.store.list_categories().await?;
        let tree = CategoryTree::new(&categories);
        categories
            .iter()
            .map(|c| describe(&tree, c))
            .collect()
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_category(&self, id: CategoryId) -> Result<CategoryDetails> {
        let categories = self.store.list_categories().await?;
        let tree = CategoryTree::new(&categories);
        let category = tree
            .get(id)
            .ok_or_else(|| ServiceError::not_found("category", id))?;
        describe(&tree, category)
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(&self, input: CategoryInput) -> Result<CategoryDetails> {
        let id = CategoryId::new();
        let name = Category::validate_name(&input.name)?;
        let slug = self.unique_slug(id, input.slug.as_deref(), &name).await?;
        let categories = self.store.list_categories().await?;
        check_parent(&categories, id, input.parent_id)?;

        let category = Category {
            id,
            name,
            description: clean(input.description),
            slug,
            parent_id: input.parent_id,
            position: input.position,
            is_active: input.is_active,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        };

        let mut changes = ChangeSet::new();
        changes.insert_category(&category);
        self.store.commit(changes).await?;

        tracing::info!(category_id = %category.id, slug = %category.slug, "category created");
        self.get_category(category.id).await
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn update_category(
        &self,
        id: CategoryId,
        input: CategoryInput,
    ) -> Result<CategoryDetails> {
        let categories = self.store.list_categories().await?;
        let mut category = categories
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("category", id))?;

        let name = Category::validate_name(&input.name)?;
        category.slug = self.unique_slug(id, input.slug.as_deref(), &name).await?;
        check_parent(&categories, id, input.parent_id)?;

        category.name = name;
        category.description = clean(input.description);
        category.parent_id = input.parent_id;
        category.position = input.position;
        category.is_active = input.is_active;
        category.touch();

        let mut changes = ChangeSet::new();
        changes.update_category(&mut category);
        self.store.commit(changes).await?;

        self.get_category(id).await
    }

    /// Deletes a category that has neither products nor children.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        let categories = self.store.list_categories().await?;
        let tree = CategoryTree::new(&categories);
        let category = tree
            .get(id)
            .ok_or_else(|| ServiceError::not_found("category", id))?;

        if !tree.is_leaf(id) {
            return Err(ServiceError::validation(
                "Cannot delete a category that has child categories",
            ));
        }
        let products = self
            .store
            .list_products(ProductQuery::in_category(id).limit(1))
            .await?;
        if !products.is_empty() {
            return Err(ServiceError::validation(
                "Cannot delete a category that still has products",
            ));
        }

        let mut changes = ChangeSet::new();
        changes.delete_category(category);
        self.store.commit(changes).await?;
        Ok(())
    }

    /// Validates an explicit slug, or derives one from `name`, and checks
    /// that no other category uses it.
    async fn unique_slug(&self, id: CategoryId, slug: Option<&str>, name: &str) -> Result<Slug> {
        let slug = match slug.map(str::trim).filter(|s| !s.is_empty()) {
            Some(explicit) => Slug::parse(explicit)?,
            None => Slug::from_name(name)?,
        };
        if let Some(existing) = self.store.find_category_by_slug(&slug).await?
            && existing.id != id
        {
            return Err(ServiceError::validation(format!(
                "A category with slug '{slug}' already exists"
            )));
        }
        Ok(slug)
    }

    // -- Products --

    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>> {
        Ok(self.store.list_products(query).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("product", id))
    }

    /// Creates a product. A non-zero opening stock is recorded as an `in`
    /// movement in the same commit.
    #[tracing::instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_product(&self, input: ProductInput) -> Result<Product> {
        let id = ProductId::new();
        let (name, sku) = self.validate_product(id, &input).await?;
        let opening = input.stock.unwrap_or(0).max(0);

        let product = Product::from_parts(ProductParts {
            id,
            name,
            description: clean(input.description),
            sku,
            category_id: input.category_id,
            price: input.price,
            stock_quantity: opening,
            min_stock_level: input.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL),
            is_active: input.is_active.unwrap_or(true),
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        });

        let mut changes = ChangeSet::new();
        changes.insert_product(&product);
        if opening > 0 {
            let movement = inventory_movement(&product, MovementType::In, opening)?;
            changes.insert_stock_movement(&movement);
        }
        self.store.commit(changes).await?;
        if opening > 0 {
            metrics::counter!("stock_movements_total", "type" => "in").increment(1);
        }

        tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    /// Replaces a product. Absent stock, reorder level and active flag keep
    /// their current values. A changed stock level is recorded as an
    /// `adjustment` movement in the same commit.
    #[tracing::instrument(skip(self, input))]
    pub async fn update_product(&self, id: ProductId, input: ProductInput) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        let (name, sku) = self.validate_product(id, &input).await?;

        product.name = name;
        product.sku = sku;
        product.description = clean(input.description);
        product.price = input.price;
        if let Some(active) = input.is_active {
            product.is_active = active;
        }
        product.category_id = input.category_id;
        if let Some(level) = input.min_stock_level {
            product.set_min_stock_level(level);
        }
        product.touch();

        let mut changes = ChangeSet::new();
        let delta = match input.stock {
            Some(stock) => stock.max(0) - product.stock_quantity(),
            None => 0,
        };
        let movement = if delta != 0 {
            product.apply_stock_delta(delta)?;
            Some(inventory_movement(&product, MovementType::Adjustment, delta)?)
        } else {
            None
        };
        changes.update_product(&mut product);
        if let Some(ref movement) = movement {
            changes.insert_stock_movement(movement);
        }
        self.store.commit(changes).await?;
        if movement.is_some() {
            metrics::counter!("stock_movements_total", "type" => "adjustment").increment(1);
        }

        Ok(product)
    }

    /// Deletes a product and its stock ledger. Products on an order cannot
    /// be deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        let product = self.get_product(id).await?;
        if self.store.product_has_order_items(id).await? {
            return Err(ServiceError::validation(format!(
                "Product {} is referenced by orders and cannot be deleted",
                product.sku
            )));
        }

        let mut changes = ChangeSet::new();
        changes.delete_product(&product);
        self.store.commit(changes).await?;

        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    async fn validate_product(&self, id: ProductId, input: &ProductInput) -> Result<(String, Sku)> {
        let name = Product::validate_name(&input.name)?;
        let sku = Sku::parse(&input.sku)?;
        Product::validate_price(input.price)?;

        if let Some(existing) = self.store.find_product_by_sku(&sku).await?
            && existing.id != id
        {
            return Err(ServiceError::validation(format!(
                "A product with SKU '{sku}' already exists"
            )));
        }
        if let Some(category_id) = input.category_id
            && self.store.get_category(category_id).await?.is_none()
        {
            return Err(ServiceError::not_found("category", category_id));
        }
        Ok((name, sku))
    }
}

fn describe(tree: &CategoryTree<'_>, category: &Category) -> Result<CategoryDetails> {
    Ok(CategoryDetails {
        category: category.clone(),
        level: tree.level(category.id)?,
        full_path: tree.full_path(category.id)?,
        is_leaf: tree.is_leaf(category.id),
    })
}

fn check_parent(categories: &[Category], id: CategoryId, parent: Option<CategoryId>) -> Result<()> {
    let tree = CategoryTree::new(categories);
    if let Some(parent_id) = parent
        && tree.get(parent_id).is_none()
    {
        return Err(ServiceError::not_found("category", parent_id));
    }
    tree.validate_parent(id, parent)?;
    Ok(())
}

/// A stock count correction recorded against `product`.
fn inventory_movement(
    product: &Product,
    movement_type: MovementType,
    quantity: i64,
) -> Result<StockMovement> {
    let now = Utc::now();
    Ok(StockMovement::new(StockMovementParts {
        id: StockMovementId::new(),
        product_id: product.id,
        movement_type,
        quantity,
        reason: MovementReason::Inventory,
        unit_cost: None,
        reference: None,
        notes: None,
        movement_date: now,
        created_at: now,
        updated_at: None,
        version: Version::first(),
    })?)
}
