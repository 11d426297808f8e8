//! Invoice and payment endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use chrono::{DateTime, Utc};
use common::{Currency, InvoiceId, InvoiceLineId, OrderId, PaymentId, ProductId, Version};
use domain::{Invoice, InvoiceLine, InvoiceStatus, Payment, PaymentMethod, PaymentStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use services::{
    InvoiceChanges, NewInvoice, NewInvoiceLine, NewPayment, RecordedPayment, TaxInput,
};
use store::Store;

use crate::dto::{Envelope, MoneyView, money};
use crate::error::ApiError;
use crate::extract::{ApiJson, parse_id};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineBody {
    pub description: Option<String>,
    pub product_id: Option<ProductId>,
    pub quantity: i64,
    pub unit_price: Decimal,
}

/// Body of `POST /api/invoices`. Amounts are in the order's currency.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceBody {
    pub order_id: OrderId,
    pub items: Option<Vec<LineBody>>,
    pub tax_amount: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub status: Option<InvoiceStatus>,
    pub issue_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Body of `PUT /api/invoices/{id}`. Amounts are in the invoice's currency.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceChangesBody {
    pub items: Option<Vec<LineBody>>,
    pub tax_amount: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub status: Option<InvoiceStatus>,
    pub paid_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl InvoiceChangesBody {
    fn touches_amounts(&self) -> bool {
        self.items.is_some() || self.tax_amount.is_some() || self.tax_rate.is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// Must match the invoice currency; defaults to it.
    pub currency: Option<Currency>,
    pub status: Option<PaymentStatus>,
    pub transaction_id: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

fn lines(
    items: Option<Vec<LineBody>>,
    currency: Currency,
) -> Result<Option<Vec<NewInvoiceLine>>, ApiError> {
    let Some(items) = items else {
        return Ok(None);
    };
    let lines = items
        .into_iter()
        .map(|line| {
            Ok(NewInvoiceLine {
                description: line.description,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: money(line.unit_price, currency)?,
            })
        })
        .collect::<Result<_, ApiError>>()?;
    Ok(Some(lines))
}

fn tax(
    rate: Option<Decimal>,
    amount: Option<Decimal>,
    currency: Currency,
) -> Result<TaxInput, ApiError> {
    Ok(TaxInput {
        rate,
        amount: amount.map(|a| money(a, currency)).transpose()?,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineView {
    pub id: InvoiceLineId,
    pub description: String,
    pub product_id: Option<ProductId>,
    pub quantity: i64,
    pub unit_price: MoneyView,
    pub total: MoneyView,
}

impl From<&InvoiceLine> for InvoiceLineView {
    fn from(line: &InvoiceLine) -> Self {
        Self {
            id: line.id,
            description: line.description.clone(),
            product_id: line.product_id,
            quantity: line.quantity(),
            unit_price: line.unit_price().into(),
            total: line.total().into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub order_id: OrderId,
    pub status: InvoiceStatus,
    pub currency: Currency,
    pub items: Vec<InvoiceLineView>,
    pub net_amount: MoneyView,
    pub tax_amount: MoneyView,
    pub total_amount: MoneyView,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl From<Invoice> for InvoiceView {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number.to_string(),
            order_id: invoice.order_id,
            status: invoice.status(),
            currency: invoice.currency(),
            items: invoice.lines().iter().map(InvoiceLineView::from).collect(),
            net_amount: invoice.net_amount().into(),
            tax_amount: invoice.tax_amount().into(),
            total_amount: invoice.total_amount().into(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            paid_date: invoice.paid_date(),
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
            version: invoice.version,
            notes: invoice.notes,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: MoneyView,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            invoice_id: payment.invoice_id,
            amount: payment.amount().into(),
            method: payment.method,
            status: payment.status,
            payment_date: payment.payment_date,
            created_at: payment.created_at,
            transaction_id: payment.transaction_id,
            notes: payment.notes,
        }
    }
}

/// A recorded payment and the invoice as it stands afterwards.
#[derive(Debug, Serialize)]
pub struct RecordedPaymentView {
    pub payment: PaymentView,
    pub invoice: InvoiceView,
}

impl From<RecordedPayment> for RecordedPaymentView {
    fn from(recorded: RecordedPayment) -> Self {
        Self {
            payment: recorded.payment.into(),
            invoice: recorded.invoice.into(),
        }
    }
}

pub async fn list<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<Json<Envelope<Vec<InvoiceView>>>, ApiError> {
    let invoices = state.services.invoices.list().await?;
    let views = invoices.into_iter().map(InvoiceView::from).collect();
    Ok(Envelope::ok(views, "Invoices retrieved successfully"))
}

pub async fn get<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<InvoiceView>>, ApiError> {
    let invoice = state.services.invoices.get(parse_id(&id)?).await?;
    Ok(Envelope::ok(invoice.into(), "Invoice retrieved successfully"))
}

pub async fn create<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiJson(body): ApiJson<InvoiceBody>,
) -> Result<(StatusCode, Json<Envelope<InvoiceView>>), ApiError> {
    let currency = state.services.orders.get(body.order_id).await?.currency();
    let input = NewInvoice {
        order_id: body.order_id,
        lines: lines(body.items, currency)?,
        tax: tax(body.tax_rate, body.tax_amount, currency)?,
        status: body.status,
        issue_date: body.issue_date,
        due_date: body.due_date,
        notes: body.notes,
    };
    let invoice = state.services.invoices.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(invoice.into(), "Invoice created successfully"),
    ))
}

pub async fn update<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<InvoiceChangesBody>,
) -> Result<Json<Envelope<InvoiceView>>, ApiError> {
    let id = parse_id(&id)?;
    let changes = if body.touches_amounts() {
        let currency = state.services.invoices.get(id).await?.currency();
        InvoiceChanges {
            lines: lines(body.items, currency)?,
            tax: tax(body.tax_rate, body.tax_amount, currency)?,
            status: body.status,
            paid_date: body.paid_date,
            due_date: body.due_date,
            notes: body.notes,
        }
    } else {
        InvoiceChanges {
            status: body.status,
            paid_date: body.paid_date,
            due_date: body.due_date,
            notes: body.notes,
            ..InvoiceChanges::default()
        }
    };
    let invoice = state.services.invoices.update(id, changes).await?;
    Ok(Envelope::ok(invoice.into(), "Invoice updated successfully"))
}

pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.services.invoices.delete(parse_id(&id)?).await?;
    Ok(Envelope::done("Invoice deleted successfully"))
}

/// Printable HTML rendition of the invoice.
pub async fn download<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let html = state.services.invoices.render_html(parse_id(&id)?).await?;
    Ok(Html(html))
}

pub async fn list_payments<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Vec<PaymentView>>>, ApiError> {
    let payments = state.services.invoices.list_payments(parse_id(&id)?).await?;
    let views = payments.into_iter().map(PaymentView::from).collect();
    Ok(Envelope::ok(views, "Payments retrieved successfully"))
}

pub async fn record_payment<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PaymentBody>,
) -> Result<(StatusCode, Json<Envelope<RecordedPaymentView>>), ApiError> {
    let id = parse_id(&id)?;
    let currency = match body.currency {
        Some(currency) => currency,
        None => state.services.invoices.get(id).await?.currency(),
    };
    let input = NewPayment {
        amount: money(body.amount, currency)?,
        method: body.method,
        status: body.status,
        transaction_id: body.transaction_id,
        payment_date: body.payment_date,
        notes: body.notes,
    };
    let recorded = state.services.invoices.record_payment(id, input).await?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(recorded.into(), "Payment recorded successfully"),
    ))
}
