//! One-shot handoff of order confirmations to the confirmation page.
//!
//! A confirmation is kept in memory only, under a random ticket, until it is
//! claimed once or its time-to-live passes. Reloading the confirmation page
//! therefore finds nothing, and the page renders that as its own state.

use std::sync::Arc;
use std::time::Duration;

use eshop_core::OrderConfirmation;
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

/// Upper bound on unclaimed confirmations held at once.
const MAX_PENDING: u64 = 64;

/// What a ticket resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffState {
    Ready(OrderConfirmation),
    /// Never issued, already claimed, or timed out.
    Expired,
}

/// Short-lived, in-memory slots keyed by one-time tickets.
#[derive(Clone)]
pub struct ConfirmationHandoff {
    slots: Cache<Uuid, Arc<OrderConfirmation>>,
}

impl ConfirmationHandoff {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Cache::builder()
                .max_capacity(MAX_PENDING)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Store a confirmation and return the ticket that claims it.
    pub async fn deposit(&self, confirmation: OrderConfirmation) -> Uuid {
        let ticket = Uuid::new_v4();
        self.slots.insert(ticket, Arc::new(confirmation)).await;
        debug!(%ticket, "Confirmation deposited");
        ticket
    }

    /// Take the confirmation for `ticket`. A second claim finds nothing.
    pub async fn claim(&self, ticket: Uuid) -> HandoffState {
        // `get` honours the TTL; `remove` decides between concurrent claims.
        if self.slots.get(&ticket).await.is_none() {
            return HandoffState::Expired;
        }
        match self.slots.remove(&ticket).await {
            Some(confirmation) => HandoffState::Ready(Arc::unwrap_or_clone(confirmation)),
            None => HandoffState::Expired,
        }
    }

    /// Drop every pending confirmation.
    pub fn clear(&self) {
        self.slots.invalidate_all();
    }
}
