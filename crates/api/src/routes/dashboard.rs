//! Dashboard statistics endpoint.

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use common::Currency;
use reporting::{
    CurrencyTotals, CustomerStats, DashboardStats, InvoiceStats, OrderStats, ProductStats,
};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::dto::{Envelope, MoneyView};
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// Cutoff for new customers; the start of the current month when absent.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatsView {
    pub total: usize,
    pub active: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
}

#[derive(Debug, Serialize)]
pub struct OrderStatsView {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub processing: usize,
    pub shipped: usize,
    pub delivered: usize,
    pub cancelled: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStatsView {
    pub total: usize,
    pub new_this_month: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyTotalsView {
    pub currency: Currency,
    pub invoice_count: usize,
    pub total_revenue: MoneyView,
    pub total_paid: MoneyView,
    pub outstanding: MoneyView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStatsView {
    pub total: usize,
    pub draft: usize,
    pub sent: usize,
    pub paid: usize,
    pub overdue: usize,
    pub cancelled: usize,
    pub total_revenue: MoneyView,
    pub total_paid: MoneyView,
    pub outstanding: MoneyView,
    pub currency: Currency,
    pub by_currency: Vec<CurrencyTotalsView>,
}

#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub products: ProductStatsView,
    pub orders: OrderStatsView,
    pub customers: CustomerStatsView,
    pub invoices: InvoiceStatsView,
}

impl From<ProductStats> for ProductStatsView {
    fn from(s: ProductStats) -> Self {
        Self {
            total: s.total,
            active: s.active,
            low_stock: s.low_stock,
            out_of_stock: s.out_of_stock,
        }
    }
}

impl From<OrderStats> for OrderStatsView {
    fn from(s: OrderStats) -> Self {
        Self {
            total: s.total,
            pending: s.pending,
            confirmed: s.confirmed,
            processing: s.processing,
            shipped: s.shipped,
            delivered: s.delivered,
            cancelled: s.cancelled,
        }
    }
}

impl From<CustomerStats> for CustomerStatsView {
    fn from(s: CustomerStats) -> Self {
        Self {
            total: s.total,
            new_this_month: s.new_this_month,
        }
    }
}

impl From<CurrencyTotals> for CurrencyTotalsView {
    fn from(t: CurrencyTotals) -> Self {
        Self {
            currency: t.currency,
            invoice_count: t.invoice_count,
            total_revenue: t.total_revenue.into(),
            total_paid: t.total_paid.into(),
            outstanding: t.outstanding.into(),
        }
    }
}

impl From<InvoiceStats> for InvoiceStatsView {
    fn from(s: InvoiceStats) -> Self {
        Self {
            total: s.total,
            draft: s.draft,
            sent: s.sent,
            paid: s.paid,
            overdue: s.overdue,
            cancelled: s.cancelled,
            total_revenue: s.total_revenue.into(),
            total_paid: s.total_paid.into(),
            outstanding: s.outstanding.into(),
            currency: s.currency,
            by_currency: s.by_currency.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<DashboardStats> for DashboardView {
    fn from(stats: DashboardStats) -> Self {
        Self {
            products: stats.products.into(),
            orders: stats.orders.into(),
            customers: stats.customers.into(),
            invoices: stats.invoices.into(),
        }
    }
}

pub async fn stats<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> Result<Json<Envelope<DashboardView>>, ApiError> {
    let stats = state
        .services
        .dashboard
        .stats(query.since, state.default_currency)
        .await?;
    Ok(Envelope::ok(stats.into(), "Dashboard statistics retrieved successfully"))
}
