use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use common::{Currency, Money, MoneyError};
use domain::{Customer, Invoice, InvoiceStatus, Order, OrderStatus, Product};

/// The collections the dashboard is computed from.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub products: &'a [Product],
    pub orders: &'a [Order],
    pub customers: &'a [Customer],
    pub invoices: &'a [Invoice],
}

/// First instant of the UTC month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductStats {
    pub total: usize,
    pub active: usize,
    /// Active products with `0 < stock <= min_stock_level`.
    pub low_stock: usize,
    /// Active products with no stock left.
    pub out_of_stock: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub processing: usize,
    pub shipped: usize,
    pub delivered: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerStats {
    pub total: usize,
    /// Customers created at or after the cutoff.
    pub new_this_month: usize,
}

/// Revenue figures for one currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyTotals {
    pub currency: Currency,
    pub invoice_count: usize,
    /// Sum of invoice net amounts.
    pub total_revenue: Money,
    /// Sum of net amounts of paid invoices.
    pub total_paid: Money,
    pub outstanding: Money,
}

impl CurrencyTotals {
    fn empty(currency: Currency) -> Self {
        Self {
            currency,
            invoice_count: 0,
            total_revenue: Money::zero(currency),
            total_paid: Money::zero(currency),
            outstanding: Money::zero(currency),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceStats {
    pub total: usize,
    pub draft: usize,
    pub sent: usize,
    pub paid: usize,
    pub overdue: usize,
    pub cancelled: usize,
    /// Reporting currency of the top-level revenue figures.
    pub currency: Currency,
    pub total_revenue: Money,
    pub total_paid: Money,
    pub outstanding: Money,
    /// One entry per invoiced currency, ordered by currency code.
    pub by_currency: Vec<CurrencyTotals>,
}

/// Summary counts and sums shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardStats {
    pub products: ProductStats,
    pub orders: OrderStats,
    pub customers: CustomerStats,
    pub invoices: InvoiceStats,
}

impl DashboardStats {
    /// Folds `snapshot` into dashboard statistics.
    ///
    /// `since` is the cutoff for new customers. Top-level revenue figures
    /// are those of `currency`; every other currency only shows up in
    /// `by_currency`.
    pub fn compute(
        snapshot: &Snapshot<'_>,
        since: DateTime<Utc>,
        currency: Currency,
    ) -> Result<Self, MoneyError> {
        Ok(Self {
            products: product_stats(snapshot.products),
            orders: order_stats(snapshot.orders),
            customers: customer_stats(snapshot.customers, since),
            invoices: invoice_stats(snapshot.invoices, currency)?,
        })
    }
}

fn product_stats(products: &[Product]) -> ProductStats {
    let mut stats = ProductStats {
        total: products.len(),
        ..Default::default()
    };
    for product in products.iter().filter(|p| p.is_active) {
        stats.active += 1;
        if product.is_out_of_stock() {
            stats.out_of_stock += 1;
        } else if product.is_low_stock() {
            stats.low_stock += 1;
        }
    }
    stats
}

fn order_stats(orders: &[Order]) -> OrderStats {
    let mut stats = OrderStats {
        total: orders.len(),
        ..Default::default()
    };
    for order in orders {
        let counter = match order.status() {
            OrderStatus::Pending => &mut stats.pending,
            OrderStatus::Confirmed => &mut stats.confirmed,
            OrderStatus::Processing => &mut stats.processing,
            OrderStatus::Shipped => &mut stats.shipped,
            OrderStatus::Delivered => &mut stats.delivered,
            OrderStatus::Cancelled => &mut stats.cancelled,
        };
        *counter += 1;
    }
    stats
}

fn customer_stats(customers: &[Customer], since: DateTime<Utc>) -> CustomerStats {
    CustomerStats {
        total: customers.len(),
        new_this_month: customers.iter().filter(|c| c.created_at >= since).count(),
    }
}

fn invoice_stats(invoices: &[Invoice], currency: Currency) -> Result<InvoiceStats, MoneyError> {
    let mut counts = [0usize; 5];
    let mut totals: BTreeMap<Currency, CurrencyTotals> = BTreeMap::new();

    for invoice in invoices {
        let slot = match invoice.status() {
            InvoiceStatus::Draft => 0,
            InvoiceStatus::Sent => 1,
            InvoiceStatus::Paid => 2,
            InvoiceStatus::Overdue => 3,
            InvoiceStatus::Cancelled => 4,
        };
        counts[slot] += 1;

        let entry = totals
            .entry(invoice.currency())
            .or_insert_with(|| CurrencyTotals::empty(invoice.currency()));
        entry.invoice_count += 1;
        entry.total_revenue = entry.total_revenue.add(invoice.net_amount())?;
        if invoice.status() == InvoiceStatus::Paid {
            entry.total_paid = entry.total_paid.add(invoice.net_amount())?;
        }
    }

    for entry in totals.values_mut() {
        entry.outstanding = entry.total_revenue.subtract(entry.total_paid)?;
    }

    let headline = totals
        .get(&currency)
        .cloned()
        .unwrap_or_else(|| CurrencyTotals::empty(currency));

    Ok(InvoiceStats {
        total: invoices.len(),
        draft: counts[0],
        sent: counts[1],
        paid: counts[2],
        overdue: counts[3],
        cancelled: counts[4],
        currency,
        total_revenue: headline.total_revenue,
        total_paid: headline.total_paid,
        outstanding: headline.outstanding,
        by_currency: totals.into_values().collect(),
    })
}
