use std::sync::Arc;
use std::time::Instant;

use crate::settlement::SettlementService;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SettlementService>,
    started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<SettlementService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
