use std::sync::Arc;

use crate::gateway::PaymentGateway;
use crate::ledger::LedgerStore;

pub mod callback;
pub mod initiate;
pub mod reference;

pub use callback::{CallbackEnvelope, CallbackOutcome};
pub use initiate::PaymentIntent;
pub use reference::{PaymentPurpose, PaymentReference};

/// Stateless bridge between payment intents, the push-payment gateway and
/// the ledger. Holds no state between calls; both operations are
/// independently invocable.
pub struct PaymentRelay {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentRelay {
    pub fn new(store: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        PaymentRelay { store, gateway }
    }
}
