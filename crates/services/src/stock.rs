//! The stock ledger.
//!
//! Every movement is written together with the product row it changes, in
//! one commit that names the product version it read. Two concurrent
//! movements on the same product therefore cannot both apply against the
//! same starting stock: the second one fails with a conflict.

use chrono::Utc;
use common::{ProductId, StockMovementId, Version};
use domain::{MovementReason, StockMovement, StockMovementParts};
use store::{ChangeSet, Store};

use crate::commands::{NewStockMovement, StockMovementChanges, clean};
use crate::error::{Result, ServiceError};

#[derive(Clone)]
pub struct StockService<S: Store> {
    store: S,
}

impl<S: Store> StockService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Movements, newest first, optionally for one product.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, product_id: Option<ProductId>) -> Result<Vec<StockMovement>> {
        Ok(self.store.list_stock_movements(product_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: StockMovementId) -> Result<StockMovement> {
        self.store
            .get_stock_movement(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("stock movement", id))
    }

    /// Records a movement and applies it to the product's stock.
    #[tracing::instrument(
        skip(self, input),
        fields(product_id = %input.product_id, movement_type = %input.movement_type, quantity = input.quantity)
    )]
    pub async fn record(&self, input: NewStockMovement) -> Result<StockMovement> {
        let mut product = self
            .store
            .get_product(input.product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("product", input.product_id))?;

        let now = Utc::now();
        let movement = StockMovement::new(StockMovementParts {
            id: StockMovementId::new(),
            product_id: product.id,
            movement_type: input.movement_type,
            quantity: input.quantity,
            reason: input.reason.unwrap_or(MovementReason::Manual),
            unit_cost: input.unit_cost,
            reference: clean(input.reference),
            notes: clean(input.notes),
            movement_date: input.movement_date.unwrap_or(now),
            created_at: now,
            updated_at: None,
            version: Version::first(),
        })?;
        product.apply_stock_delta(movement.stock_delta())?;

        let mut changes = ChangeSet::new();
        changes
            .update_product(&mut product)
            .insert_stock_movement(&movement);
        self.store.commit(changes).await?;

        metrics::counter!("stock_movements_total", "type" => movement.movement_type().as_str())
            .increment(1);
        tracing::info!(
            movement_id = %movement.id,
            stock = product.stock_quantity(),
            "stock movement recorded"
        );
        Ok(movement)
    }

    /// Edits the descriptive fields of a movement. Absent fields are kept.
    ///
    /// Type, quantity and product are part of the ledger: a request may
    /// repeat the stored values but cannot change them.
    #[tracing::instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: StockMovementId,
        input: StockMovementChanges,
    ) -> Result<StockMovement> {
        let mut movement = self.get(id).await?;

        if input.product_id.is_some_and(|p| p != movement.product_id())
            || input
                .movement_type
                .is_some_and(|t| t != movement.movement_type())
            || input.quantity.is_some_and(|q| q != movement.quantity())
        {
            return Err(ServiceError::validation(
                "The type, quantity and product of a stock movement cannot be changed; \
                 delete it and record a new one",
            ));
        }

        if let Some(reason) = input.reason {
            movement.reason = reason;
        }
        if input.reference.is_some() {
            movement.reference = clean(input.reference);
        }
        if input.notes.is_some() {
            movement.notes = clean(input.notes);
        }
        if input.unit_cost.is_some() {
            movement.set_unit_cost(input.unit_cost)?;
        }
        movement.touch();

        let mut changes = ChangeSet::new();
        changes.update_stock_movement(&mut movement);
        self.store.commit(changes).await?;
        Ok(movement)
    }

    /// Deletes a movement and reverts its effect on the product's stock.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: StockMovementId) -> Result<()> {
        let movement = self.get(id).await?;
        let mut changes = ChangeSet::new();

        // The product may already be gone together with its ledger.
        if let Some(mut product) = self.store.get_product(movement.product_id()).await? {
            product.apply_stock_delta(-movement.stock_delta())?;
            changes.update_product(&mut product);
        }
        changes.delete_stock_movement(&movement);
        self.store.commit(changes).await?;

        tracing::info!(movement_id = %id, "stock movement reverted");
        Ok(())
    }
}
