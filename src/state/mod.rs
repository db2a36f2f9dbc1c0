use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Instant;

use crate::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub deposit_address: String,
    pub start_time: Instant,
    /// Epoch milliseconds of the last completed poller tick; 0 until the
    /// first tick finishes.
    pub last_check: Arc<AtomicI64>,
}

impl AppState {
    pub fn new(ledger: Ledger, deposit_address: String, last_check: Arc<AtomicI64>) -> Self {
        assert!(!deposit_address.is_empty(), "Deposit address must be set");
        assert!(
            Arc::strong_count(&last_check) >= 1,
            "Poller state must be shared"
        );
        Self {
            ledger,
            deposit_address,
            start_time: Instant::now(),
            last_check,
        }
    }
}
