//! Change sets: the unit of atomic writes.

use common::{CategoryId, CustomerId, InvoiceId, OrderId, ProductId, StockMovementId, Version};
use domain::{Category, Customer, Invoice, Order, Payment, Product, StockMovement};

/// A single write inside a [`ChangeSet`].
///
/// Updates and deletes carry the version the writer read. The store rejects
/// the whole change set if any row moved on since.
#[derive(Debug, Clone)]
pub enum Change {
    InsertCategory(Category),
    UpdateCategory { category: Category, expected: Version },
    DeleteCategory { id: CategoryId, expected: Version },

    InsertProduct(Product),
    UpdateProduct { product: Product, expected: Version },
    DeleteProduct { id: ProductId, expected: Version },

    InsertCustomer(Customer),
    UpdateCustomer { customer: Customer, expected: Version },
    DeleteCustomer { id: CustomerId, expected: Version },

    InsertStockMovement(StockMovement),
    UpdateStockMovement {
        movement: StockMovement,
        expected: Version,
    },
    DeleteStockMovement {
        id: StockMovementId,
        expected: Version,
    },

    /// Inserts the order together with its items.
    InsertOrder(Order),
    /// Rewrites the order header and replaces its items.
    UpdateOrder { order: Order, expected: Version },
    /// Deletes the order and its items.
    DeleteOrder { id: OrderId, expected: Version },

    /// Inserts the invoice together with its lines.
    InsertInvoice(Invoice),
    /// Rewrites the invoice header and replaces its lines.
    UpdateInvoice { invoice: Invoice, expected: Version },
    /// Deletes the invoice, its lines and its payments.
    DeleteInvoice { id: InvoiceId, expected: Version },

    InsertPayment(Payment),
}

impl Change {
    /// Entity name used in logs and errors.
    pub fn entity(&self) -> &'static str {
        match self {
            Change::InsertCategory(_)
            | Change::UpdateCategory { .. }
            | Change::DeleteCategory { .. } => "category",
            Change::InsertProduct(_)
            | Change::UpdateProduct { .. }
            | Change::DeleteProduct { .. } => "product",
            Change::InsertCustomer(_)
            | Change::UpdateCustomer { .. }
            | Change::DeleteCustomer { .. } => "customer",
            Change::InsertStockMovement(_)
            | Change::UpdateStockMovement { .. }
            | Change::DeleteStockMovement { .. } => "stock movement",
            Change::InsertOrder(_) | Change::UpdateOrder { .. } | Change::DeleteOrder { .. } => {
                "order"
            }
            Change::InsertInvoice(_)
            | Change::UpdateInvoice { .. }
            | Change::DeleteInvoice { .. } => "invoice",
            Change::InsertPayment(_) => "payment",
        }
    }
}

/// An ordered list of changes committed all-or-nothing.
///
/// The `update_*` builders take the entity mutably: they record the version
/// that was read and bump the entity to the version it will have once the
/// commit succeeds, so callers can return it as-is.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

macro_rules! versioned_writes {
    ($ty:ty, $insert:ident => $insert_variant:ident, $update:ident => $update_variant:ident { $field:ident }, $delete:ident => $delete_variant:ident) => {
        pub fn $insert(&mut self, entity: &$ty) -> &mut Self {
            self.changes.push(Change::$insert_variant(entity.clone()));
            self
        }

        pub fn $update(&mut self, entity: &mut $ty) -> &mut Self {
            let expected = entity.version;
            entity.version = expected.next();
            self.changes.push(Change::$update_variant {
                $field: entity.clone(),
                expected,
            });
            self
        }

        pub fn $delete(&mut self, entity: &$ty) -> &mut Self {
            self.changes.push(Change::$delete_variant {
                id: entity.id,
                expected: entity.version,
            });
            self
        }
    };
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    versioned_writes!(Category, insert_category => InsertCategory, update_category => UpdateCategory { category }, delete_category => DeleteCategory);
    versioned_writes!(Product, insert_product => InsertProduct, update_product => UpdateProduct { product }, delete_product => DeleteProduct);
    versioned_writes!(Customer, insert_customer => InsertCustomer, update_customer => UpdateCustomer { customer }, delete_customer => DeleteCustomer);
    versioned_writes!(StockMovement, insert_stock_movement => InsertStockMovement, update_stock_movement => UpdateStockMovement { movement }, delete_stock_movement => DeleteStockMovement);
    versioned_writes!(Order, insert_order => InsertOrder, update_order => UpdateOrder { order }, delete_order => DeleteOrder);
    versioned_writes!(Invoice, insert_invoice => InsertInvoice, update_invoice => UpdateInvoice { invoice }, delete_invoice => DeleteInvoice);

    pub fn insert_payment(&mut self, payment: &Payment) -> &mut Self {
        self.changes.push(Change::InsertPayment(payment.clone()));
        self
    }

    pub fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}
