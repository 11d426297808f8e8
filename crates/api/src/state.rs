//! Shared state handed to every route.

use std::sync::Arc;

use common::Currency;
use services::Services;
use store::Store;

use crate::auth::Authenticator;

/// Services plus the collaborators the HTTP layer needs directly.
pub struct AppState<S: Store + Clone> {
    pub services: Services<S>,
    /// Used by the health check.
    pub store: S,
    pub authenticator: Arc<dyn Authenticator>,
    /// Currency of amounts sent without one, and of the dashboard headline.
    pub default_currency: Currency,
}

impl<S: Store + Clone> AppState<S> {
    pub fn new(store: S, authenticator: Arc<dyn Authenticator>, default_currency: Currency) -> Self {
        Self {
            services: Services::new(store.clone()),
            store,
            authenticator,
            default_currency,
        }
    }
}

pub type SharedState<S> = Arc<AppState<S>>;
