//! Application state shared by all handlers.

use std::sync::Arc;

use crate::auth::AdminToken;
use crate::calendar::CalendarClient;
use crate::catalog::Catalog;
use crate::checkout::Checkout;
use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub catalog: Arc<Catalog>,
    pub checkout: Arc<Checkout>,
    pub calendar: Arc<dyn CalendarClient>,
    pub admin_token: AdminToken,
}

impl AppState {
    pub fn new(
        engine: Arc<Engine>,
        catalog: Arc<Catalog>,
        checkout: Arc<Checkout>,
        calendar: Arc<dyn CalendarClient>,
        admin_token: AdminToken,
    ) -> Self {
        Self {
            engine,
            catalog,
            checkout,
            calendar,
            admin_token,
        }
    }
}
