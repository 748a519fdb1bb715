//! Shared application state for the HTTP layer.

use std::sync::Arc;

use crate::accounts::AccountService;
use crate::ticketing::TicketingService;

pub struct AppState {
    pub ticketing: Arc<TicketingService>,
    pub accounts: Arc<AccountService>,
}

impl AppState {
    pub fn new(ticketing: Arc<TicketingService>, accounts: Arc<AccountService>) -> Self {
        Self {
            ticketing,
            accounts,
        }
    }
}
