//! Invoices, invoice lines and the invoice status machine.

use chrono::{DateTime, Duration, Utc};
use common::{Currency, InvoiceId, InvoiceLineId, Money, OrderId, ProductId, Version};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::numbering::DocumentNumber;
use crate::payment::{Payment, PaymentStatus};

/// Payment term applied when no due date is given.
pub const DEFAULT_PAYMENT_TERM_DAYS: i64 = 30;

/// The status of an invoice.
///
/// Status transitions:
/// ```text
/// Draft ──► Sent ──┬──► Paid
///   │        │     └──► Overdue ──► Paid
///   │        │             │
///   └────────┴─────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    pub fn allowed_transitions(&self) -> &'static [InvoiceStatus] {
        match self {
            InvoiceStatus::Draft => &[InvoiceStatus::Sent, InvoiceStatus::Cancelled],
            InvoiceStatus::Sent => &[
                InvoiceStatus::Paid,
                InvoiceStatus::Overdue,
                InvoiceStatus::Cancelled,
            ],
            InvoiceStatus::Overdue => &[InvoiceStatus::Paid, InvoiceStatus::Cancelled],
            InvoiceStatus::Paid | InvoiceStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Payments can be recorded once the invoice went out and until it is
    /// closed.
    pub fn accepts_payments(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("Unknown invoice status: {s}")))
    }
}

/// A billed line. `total` is always `quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub id: InvoiceLineId,
    pub description: String,
    pub product_id: Option<ProductId>,
    quantity: i64,
    unit_price: Money,
    total: Money,
}

impl InvoiceLine {
    pub fn new(
        id: InvoiceLineId,
        description: impl Into<String>,
        product_id: Option<ProductId>,
        quantity: i64,
        unit_price: Money,
    ) -> Result<Self, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity {
                quantity,
                reason: "invoice line quantity must be positive",
            });
        }
        if unit_price.is_negative() {
            return Err(DomainError::validation("Unit price cannot be negative"));
        }
        Ok(Self {
            id,
            description: description.into(),
            product_id,
            quantity,
            unit_price,
            total: unit_price.multiply(quantity)?,
        })
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn total(&self) -> Money {
        self.total
    }
}

/// Every stored field of an invoice except the derived net and total.
#[derive(Debug, Clone)]
pub struct InvoiceParts {
    pub id: InvoiceId,
    pub invoice_number: DocumentNumber,
    pub order_id: OrderId,
    pub currency: Currency,
    pub lines: Vec<InvoiceLine>,
    pub tax_amount: Money,
    pub status: InvoiceStatus,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

/// A billing document derived from an order.
///
/// `net_amount` is the sum of the line totals and `total_amount` is
/// `net_amount + tax_amount`; both are recomputed on every amount change.
/// Amounts can only change while the invoice is a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: DocumentNumber,
    pub order_id: OrderId,
    currency: Currency,
    lines: Vec<InvoiceLine>,
    net_amount: Money,
    tax_amount: Money,
    total_amount: Money,
    status: InvoiceStatus,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    paid_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl Invoice {
    pub fn from_parts(parts: InvoiceParts) -> Result<Self, DomainError> {
        let mut invoice = Self {
            id: parts.id,
            invoice_number: parts.invoice_number,
            order_id: parts.order_id,
            currency: parts.currency,
            lines: parts.lines,
            net_amount: Money::zero(parts.currency),
            tax_amount: Money::zero(parts.currency),
            total_amount: Money::zero(parts.currency),
            status: parts.status,
            issue_date: parts.issue_date,
            due_date: parts.due_date,
            paid_date: parts.paid_date,
            notes: parts.notes,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        };
        invoice.apply_tax_amount(parts.tax_amount)?;
        Ok(invoice)
    }

    /// `issue_date` plus the default payment term.
    pub fn default_due_date(issue_date: DateTime<Utc>) -> DateTime<Utc> {
        issue_date + Duration::days(DEFAULT_PAYMENT_TERM_DAYS)
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn net_amount(&self) -> Money {
        self.net_amount
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn paid_date(&self) -> Option<DateTime<Utc>> {
        self.paid_date
    }

    /// Sets `tax_amount = net_amount * rate` and recomputes the total.
    pub fn calculate_tax(&mut self, rate: Decimal) -> Result<Money, DomainError> {
        self.ensure_draft()?;
        if rate.is_sign_negative() {
            return Err(DomainError::validation("Tax rate cannot be negative"));
        }
        let tax = self.net_amount.multiply_rate(rate)?;
        self.apply_tax_amount(tax)?;
        self.touch();
        Ok(tax)
    }

    /// Sets an explicit tax amount and recomputes the total.
    pub fn set_tax_amount(&mut self, tax: Money) -> Result<(), DomainError> {
        self.ensure_draft()?;
        self.apply_tax_amount(tax)?;
        self.touch();
        Ok(())
    }

    /// Replaces the lines, keeping the current tax amount.
    pub fn replace_lines(&mut self, lines: Vec<InvoiceLine>) -> Result<(), DomainError> {
        self.ensure_draft()?;
        let previous = std::mem::replace(&mut self.lines, lines);
        if let Err(err) = self.apply_tax_amount(self.tax_amount) {
            self.lines = previous;
            self.apply_tax_amount(self.tax_amount)?;
            return Err(err);
        }
        self.touch();
        Ok(())
    }

    /// Moves the invoice to `next`. Returns `Ok(false)` when nothing changes.
    ///
    /// Marking an invoice paid stamps `paid_date` with `at`.
    pub fn transition_to(
        &mut self,
        next: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        if next == self.status {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                entity: "invoice",
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        if next == InvoiceStatus::Paid {
            self.paid_date = Some(at);
        }
        self.status = next;
        self.updated_at = Some(at);
        Ok(true)
    }

    /// Sum of the completed payments among `payments`.
    pub fn amount_paid(&self, payments: &[Payment]) -> Result<Money, DomainError> {
        let completed = payments
            .iter()
            .filter(|p| p.invoice_id == self.id && p.status == PaymentStatus::Completed)
            .map(Payment::amount);
        Ok(Money::sum(completed, self.currency)?)
    }

    /// Whether completed payments cover the invoice total.
    pub fn is_settled_by(&self, payments: &[Payment]) -> Result<bool, DomainError> {
        Ok(self
            .amount_paid(payments)?
            .greater_than_or_equal(&self.total_amount)?)
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    fn ensure_draft(&self) -> Result<(), DomainError> {
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::validation(format!(
                "Invoice amounts can only be changed while draft (invoice is {})",
                self.status
            )));
        }
        Ok(())
    }

    fn apply_tax_amount(&mut self, tax: Money) -> Result<(), DomainError> {
        if tax.is_negative() {
            return Err(DomainError::validation("Tax amount cannot be negative"));
        }
        let net = Money::sum(self.lines.iter().map(InvoiceLine::total), self.currency)?;
        let total = net.add(tax)?;
        self.net_amount = net;
        self.tax_amount = tax;
        self.total_amount = total;
        Ok(())
    }
}
