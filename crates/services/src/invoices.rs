//! Invoices and payments.

use chrono::{Datelike, Utc};
use common::{InvoiceId, InvoiceLineId, Money, PaymentId, Version};
use domain::{
    DocumentKind, DocumentNumber, Invoice, InvoiceLine, InvoiceParts, InvoiceStatus, Order,
    OrderStatus, Payment, PaymentParts, PaymentStatus,
};
use store::{ChangeSet, Store};

use crate::commands::{InvoiceChanges, NewInvoice, NewInvoiceLine, NewPayment, TaxInput, clean};
use crate::error::{Result, ServiceError};
use crate::render;

/// A payment together with the invoice it was recorded against, as it
/// stands after the payment.
#[derive(Debug, Clone)]
pub struct RecordedPayment {
    pub payment: Payment,
    pub invoice: Invoice,
}

/// Service for invoices and the payments against them.
#[derive(Clone)]
pub struct InvoiceService<S: Store> {
    store: S,
}

impl<S: Store> InvoiceService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Invoice>> {
        Ok(self.store.list_invoices().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: InvoiceId) -> Result<Invoice> {
        self.store
            .get_invoice(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("invoice", id))
    }

    /// Issues the invoice of an order.
    ///
    /// Without explicit lines the order's items are copied. The tax is taken
    /// from the rate when given, else from the explicit amount, else zero.
    #[tracing::instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn create(&self, input: NewInvoice) -> Result<Invoice> {
        let order = self
            .store
            .get_order(input.order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", input.order_id))?;

        if order.status() == OrderStatus::Cancelled {
            return Err(ServiceError::validation(format!(
                "Order {} is cancelled and cannot be invoiced",
                order.order_number
            )));
        }
        if let Some(existing) = self.store.find_invoice_by_order(order.id).await? {
            return Err(ServiceError::validation(format!(
                "Order {} already has invoice {}",
                order.order_number, existing.invoice_number
            )));
        }

        let status = input.status.unwrap_or(InvoiceStatus::Draft);
        if !matches!(status, InvoiceStatus::Draft | InvoiceStatus::Sent) {
            return Err(ServiceError::validation(format!(
                "Invoices are created as draft or sent, not {status}"
            )));
        }

        let now = Utc::now();
        let issue_date = input.issue_date.unwrap_or(now);
        let due_date = input
            .due_date
            .unwrap_or_else(|| Invoice::default_due_date(issue_date));
        if due_date < issue_date {
            return Err(ServiceError::validation(
                "The due date cannot be before the issue date",
            ));
        }

        let lines = match input.lines {
            Some(lines) => self.build_lines(lines).await?,
            None => copy_order_lines(&order)?,
        };

        let last = self.store.last_invoice_sequence(issue_date.year()).await?;
        let invoice_number =
            DocumentNumber::next_after(DocumentKind::Invoice, issue_date.year(), last)?;

        let mut invoice = Invoice::from_parts(InvoiceParts {
            id: InvoiceId::new(),
            invoice_number,
            order_id: order.id,
            currency: order.currency(),
            lines,
            tax_amount: Money::zero(order.currency()),
            status: InvoiceStatus::Draft,
            issue_date,
            due_date,
            paid_date: None,
            notes: clean(input.notes),
            created_at: now,
            updated_at: None,
            version: Version::first(),
        })?;
        apply_tax(&mut invoice, input.tax)?;
        invoice.transition_to(status, now)?;
        invoice.updated_at = None;

        let mut changes = ChangeSet::new();
        changes.insert_invoice(&invoice);
        self.store.commit(changes).await?;

        metrics::counter!("invoices_created_total").increment(1);
        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total_amount(),
            "invoice created"
        );
        Ok(invoice)
    }

    /// Edits an invoice. Absent fields are kept.
    ///
    /// Lines and tax can only change while the invoice is a draft; they are
    /// applied before the status so a draft can be corrected and sent in
    /// one request.
    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, id: InvoiceId, input: InvoiceChanges) -> Result<Invoice> {
        let mut invoice = self.get(id).await?;
        let now = Utc::now();

        if input.touches_amounts() {
            if let Some(lines) = input.lines {
                let lines = self.build_lines(lines).await?;
                invoice.replace_lines(lines)?;
            }
            apply_tax(&mut invoice, input.tax)?;
        }
        if let Some(next) = input.status {
            let at = match next {
                InvoiceStatus::Paid => input.paid_date.unwrap_or(now),
                _ => now,
            };
            invoice.transition_to(next, at)?;
        }
        if let Some(due_date) = input.due_date {
            if due_date < invoice.issue_date {
                return Err(ServiceError::validation(
                    "The due date cannot be before the issue date",
                ));
            }
            invoice.due_date = due_date;
        }
        if input.notes.is_some() {
            invoice.notes = clean(input.notes);
        }
        invoice.touch();

        let mut changes = ChangeSet::new();
        changes.update_invoice(&mut invoice);
        self.store.commit(changes).await?;

        tracing::info!(invoice_id = %id, status = %invoice.status(), "invoice updated");
        Ok(invoice)
    }

    /// Deletes an invoice with its lines and payments. Paid invoices are
    /// kept.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: InvoiceId) -> Result<()> {
        let invoice = self.get(id).await?;
        if invoice.status() == InvoiceStatus::Paid {
            return Err(ServiceError::validation(format!(
                "Invoice {} is paid and cannot be deleted",
                invoice.invoice_number
            )));
        }

        let mut changes = ChangeSet::new();
        changes.delete_invoice(&invoice);
        self.store.commit(changes).await?;
        Ok(())
    }

    /// Payments of an invoice, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_payments(&self, id: InvoiceId) -> Result<Vec<Payment>> {
        let invoice = self.get(id).await?;
        Ok(self.store.list_payments(invoice.id).await?)
    }

    /// Records a payment. When the completed payments cover the total the
    /// invoice is marked paid in the same commit.
    ///
    /// The invoice row is rewritten on every payment so that two concurrent
    /// payments cannot both miss the moment the invoice becomes settled.
    #[tracing::instrument(skip(self, input), fields(method = %input.method))]
    pub async fn record_payment(&self, id: InvoiceId, input: NewPayment) -> Result<RecordedPayment> {
        let mut invoice = self.get(id).await?;
        if !invoice.status().accepts_payments() {
            return Err(ServiceError::validation(format!(
                "Payments cannot be recorded against a {} invoice",
                invoice.status()
            )));
        }
        if input.amount.currency() != invoice.currency() {
            return Err(ServiceError::CurrencyMismatch(format!(
                "Payment is in {} but invoice {} is in {}",
                input.amount.currency(),
                invoice.invoice_number,
                invoice.currency()
            )));
        }

        let now = Utc::now();
        let payment = Payment::new(PaymentParts {
            id: PaymentId::new(),
            invoice_id: invoice.id,
            amount: input.amount,
            status: input.status.unwrap_or(PaymentStatus::Completed),
            method: input.method,
            transaction_id: clean(input.transaction_id),
            payment_date: input.payment_date.unwrap_or(now),
            notes: clean(input.notes),
            created_at: now,
            updated_at: None,
            version: Version::first(),
        })?;

        let mut payments = self.store.list_payments(invoice.id).await?;
        payments.push(payment.clone());
        if invoice.is_settled_by(&payments)? {
            invoice.transition_to(InvoiceStatus::Paid, payment.payment_date)?;
        }
        invoice.touch();

        let mut changes = ChangeSet::new();
        changes
            .insert_payment(&payment)
            .update_invoice(&mut invoice);
        self.store.commit(changes).await?;

        metrics::counter!("payments_recorded_total", "method" => payment.method.as_str())
            .increment(1);
        tracing::info!(
            invoice_id = %invoice.id,
            amount = %payment.amount(),
            status = %invoice.status(),
            "payment recorded"
        );
        Ok(RecordedPayment { payment, invoice })
    }

    /// Renders the printable HTML document of an invoice.
    #[tracing::instrument(skip(self))]
    pub async fn render_html(&self, id: InvoiceId) -> Result<String> {
        let invoice = self.get(id).await?;
        let order = self.store.get_order(invoice.order_id).await?;
        let customer = match &order {
            Some(order) => self.store.get_customer(order.customer_id).await?,
            None => None,
        };
        let payments = self.store.list_payments(invoice.id).await?;
        render::invoice_html(&invoice, order.as_ref(), customer.as_ref(), &payments)
    }

    async fn build_lines(&self, lines: Vec<NewInvoiceLine>) -> Result<Vec<InvoiceLine>> {
        if lines.is_empty() {
            return Err(ServiceError::validation("An invoice needs at least one line"));
        }

        let mut built = Vec::with_capacity(lines.len());
        for line in lines {
            let product = match line.product_id {
                Some(product_id) => Some(
                    self.store
                        .get_product(product_id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("product", product_id))?,
                ),
                None => None,
            };
            let description = clean(line.description)
                .or_else(|| product.as_ref().map(|p| p.name.clone()))
                .unwrap_or_else(|| "Item".to_string());
            built.push(InvoiceLine::new(
                InvoiceLineId::new(),
                description,
                line.product_id,
                line.quantity,
                line.unit_price,
            )?);
        }
        Ok(built)
    }
}

fn copy_order_lines(order: &Order) -> Result<Vec<InvoiceLine>> {
    order
        .items()
        .iter()
        .map(|item| {
            Ok(InvoiceLine::new(
                InvoiceLineId::new(),
                item.product_name.clone(),
                Some(item.product_id),
                item.quantity(),
                item.unit_price(),
            )?)
        })
        .collect()
}

fn apply_tax(invoice: &mut Invoice, tax: TaxInput) -> Result<()> {
    match (tax.rate, tax.amount) {
        (Some(rate), _) => {
            invoice.calculate_tax(rate)?;
        }
        (None, Some(amount)) => invoice.set_tax_amount(amount)?,
        (None, None) => {}
    }
    Ok(())
}
