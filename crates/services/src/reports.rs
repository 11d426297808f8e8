use chrono::{DateTime, Utc};
use common::Currency;
use reporting::{DashboardStats, Snapshot, month_start};
use store::{ProductQuery, Store};

use crate::error::Result;

/// Computes dashboard statistics from the current contents of the store.
#[derive(Clone)]
pub struct DashboardService<S: Store> {
    store: S,
}

impl<S: Store> DashboardService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Dashboard figures. `since` is the cutoff for new customers and
    /// defaults to the start of the current month; headline revenue is
    /// reported in `currency`.
    #[tracing::instrument(skip(self))]
    pub async fn stats(
        &self,
        since: Option<DateTime<Utc>>,
        currency: Currency,
    ) -> Result<DashboardStats> {
        let started = std::time::Instant::now();
        let since = since.unwrap_or_else(|| month_start(Utc::now()));

        let products = self.store.list_products(ProductQuery::new()).await?;
        let orders = self.store.list_orders(None).await?;
        let customers = self.store.list_customers().await?;
        let invoices = self.store.list_invoices().await?;

        let snapshot = Snapshot {
            products: &products,
            orders: &orders,
            customers: &customers,
            invoices: &invoices,
        };
        let stats = DashboardStats::compute(&snapshot, since, currency)?;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("dashboard_compute_seconds").record(duration);
        tracing::debug!(duration, "dashboard computed");
        Ok(stats)
    }
}
