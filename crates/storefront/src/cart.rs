//! Cart store: the client's copy of the backend cart.
//!
//! The backend owns the cart. Every successful write is followed by a full
//! re-read, and the local copy is only ever replaced wholesale. Each fetch
//! takes a ticket from a monotonic sequence and its result is applied only
//! if no newer fetch or reset was issued in the meantime, so an older
//! response can never overwrite a newer one.
//!
//! Any 401 from the backend clears the cart and logs the session out.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use eshop_core::{Cart, CartLine, ProductId};
use secrecy::SecretString;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::api::{ApiClient, ApiError, CartItem, CommerceBackend};
use crate::session::SessionStore;

/// Errors surfaced by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// No session token. The backend was not contacted.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The backend refused the token; the session has been cleared.
    #[error("Authorization denied")]
    AuthorizationDenied,

    /// The request was declined, by the backend or before sending.
    #[error("Cart update rejected: {}", .0.as_deref().unwrap_or("no detail"))]
    Rejected(Option<String>),

    /// Transport or unexpected backend failure.
    #[error("Cart backend error: {0}")]
    Backend(#[source] ApiError),
}

impl CartError {
    /// User-facing detail, when the backend provided one.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Rejected(detail) => detail.as_deref(),
            _ => None,
        }
    }
}

/// Image path used when the backend reports none for a line.
#[must_use]
pub fn fallback_image(product_id: &ProductId) -> String {
    format!("/static/products/{product_id}_small.webp")
}

/// The client's cart, kept in step with the backend by re-reading it.
pub struct CartStore<B = ApiClient> {
    backend: Arc<B>,
    session: Arc<SessionStore<B>>,
    cart: RwLock<Cart>,
    sequence: AtomicU64,
}

impl<B> CartStore<B> {
    /// The current cart.
    #[must_use]
    pub fn snapshot(&self) -> Cart {
        self.cart
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Empty the local cart and invalidate any fetch still in flight.
    pub fn reset(&self) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        *self.cart.write().unwrap_or_else(PoisonError::into_inner) = Cart::empty();
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<SessionStore<B>> {
        &self.session
    }

    #[must_use]
    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Start a fetch and return its ticket.
    fn issue_ticket(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the cart if `ticket` is still the newest one issued.
    fn apply(&self, ticket: u64, cart: Cart) -> bool {
        let mut current = self.cart.write().unwrap_or_else(PoisonError::into_inner);
        if self.sequence.load(Ordering::SeqCst) != ticket {
            return false;
        }
        *current = cart;
        true
    }

    /// Cascade after a 401: clear the cart, then the session.
    pub(crate) fn invalidate(&self) {
        warn!("Backend denied authorization; clearing session and cart");
        self.reset();
        self.session.logout();
    }

    fn require_token(&self) -> Result<SecretString, CartError> {
        self.session.token().ok_or(CartError::NotAuthenticated)
    }

    /// Map a failed write onto the error taxonomy, cascading on 401.
    fn write_failed(&self, action: &'static str, err: ApiError) -> CartError {
        match err {
            ApiError::Unauthorized => {
                self.invalidate();
                CartError::AuthorizationDenied
            }
            ApiError::Rejected { detail, .. } => {
                info!(action, detail = detail.as_deref(), "Cart update rejected");
                CartError::Rejected(detail)
            }
            other => {
                error!(action, error = %other, "Cart update failed");
                CartError::Backend(other)
            }
        }
    }
}

impl<B: CommerceBackend> CartStore<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, session: Arc<SessionStore<B>>) -> Self {
        Self {
            backend,
            session,
            cart: RwLock::new(Cart::empty()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Re-read the whole cart from the backend.
    ///
    /// On failure the previous cart is kept, except after a 401, which
    /// clears it along with the session.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotAuthenticated` without a token,
    /// `CartError::AuthorizationDenied` after a 401, and
    /// `CartError::Backend` for anything else.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<(), CartError> {
        let token = self.require_token()?;
        let ticket = self.issue_ticket();

        match self.load(&token).await {
            Ok(cart) => {
                let lines = cart.lines().len();
                if self.apply(ticket, cart) {
                    debug!(lines, "Cart refreshed");
                } else {
                    debug!(ticket, "Discarding stale cart response");
                }
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                self.invalidate();
                Err(CartError::AuthorizationDenied)
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch cart; keeping previous state");
                Err(CartError::Backend(e))
            }
        }
    }

    /// Add `quantity` units of a product, then refresh.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if there is no session or the backend declines or
    /// fails the write.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: &ProductId, quantity: u32) -> Result<(), CartError> {
        let token = self.require_token()?;
        if quantity == 0 {
            return Err(CartError::Rejected(Some("Quantity must be at least 1".to_string())));
        }

        self.backend
            .add_to_cart(&token, product_id, quantity)
            .await
            .map_err(|e| self.write_failed("add", e))?;

        self.refresh_after_write().await
    }

    /// Set a line's quantity, then refresh. Quantities below 1 are refused
    /// without contacting the backend; use [`CartStore::remove`] instead.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if there is no session, the quantity is below 1,
    /// or the backend declines or fails the write.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let token = self.require_token()?;
        if quantity < 1 {
            return Err(CartError::Rejected(Some("Quantity must be at least 1".to_string())));
        }

        self.backend
            .update_cart_line(&token, product_id, quantity)
            .await
            .map_err(|e| self.write_failed("update", e))?;

        self.refresh_after_write().await
    }

    /// Remove a line, then refresh.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if there is no session or the backend declines or
    /// fails the write.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: &ProductId) -> Result<(), CartError> {
        let token = self.require_token()?;

        self.backend
            .remove_from_cart(&token, product_id)
            .await
            .map_err(|e| self.write_failed("remove", e))?;

        self.refresh_after_write().await
    }

    /// Empty the cart. An emptied cart is the known post-state, so no
    /// refresh follows.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if there is no session or the backend declines or
    /// fails the write.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), CartError> {
        let token = self.require_token()?;

        self.backend
            .clear_cart(&token)
            .await
            .map_err(|e| self.write_failed("clear", e))?;

        self.reset();
        Ok(())
    }

    /// Keep the cart in step with the session: fetch when a token appears,
    /// reset when it goes away.
    ///
    /// The returned handle should be aborted when the store is torn down.
    pub fn follow_session(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut changes = self.session.subscribe();

        tokio::spawn(async move {
            let mut signed_in = changes.borrow_and_update().is_authenticated();
            if signed_in {
                store.fetch_in_background().await;
            }

            while changes.changed().await.is_ok() {
                signed_in = changes.borrow_and_update().is_authenticated();
                if signed_in {
                    store.fetch_in_background().await;
                } else {
                    store.reset();
                }
            }
            debug!("Session closed; cart follower stopping");
        })
    }

    async fn fetch_in_background(&self) {
        // `fetch` logs its own failures.
        if let Err(e) = self.fetch().await {
            debug!(error = %e, "Background cart fetch did not complete");
        }
    }

    /// The write already succeeded, so only a 401 during the refresh fails
    /// the operation.
    async fn refresh_after_write(&self) -> Result<(), CartError> {
        match self.fetch().await {
            Err(CartError::AuthorizationDenied) => Err(CartError::AuthorizationDenied),
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn load(&self, token: &SecretString) -> Result<Cart, ApiError> {
        let items = self.backend.list_cart(token).await?;
        let reported_total = self.backend.cart_total(token).await?;

        let cart = Cart::from_lines(items.into_iter().filter_map(build_line).collect());

        let total = cart.total();
        if total != reported_total {
            warn!(
                reported = %reported_total,
                computed = %total,
                "Backend cart total differs from line subtotals; using computed total"
            );
        }

        Ok(cart)
    }
}

/// Convert a backend cart entry into a line, dropping entries without units
/// and entries whose subtotal is not representable.
fn build_line(item: CartItem) -> Option<CartLine> {
    let Some(quantity) = u32::try_from(item.quantity).ok().and_then(NonZeroU32::new) else {
        warn!(
            product_id = %item.product_id,
            quantity = item.quantity,
            "Dropping cart entry without a positive quantity"
        );
        return None;
    };

    let product_id = ProductId::new(item.product_id);
    let image = item
        .image_url
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| fallback_image(&product_id));

    let line = CartLine::new(product_id, item.name, item.price, quantity, image);
    if line.checked_subtotal().is_none() {
        warn!(
            product_id = %line.product_id(),
            price = %line.unit_price(),
            quantity = line.quantity(),
            "Dropping cart entry whose subtotal overflows"
        );
        return None;
    }

    if let Some(reported) = item.subtotal
        && reported != line.subtotal()
    {
        warn!(
            product_id = %line.product_id(),
            reported = %reported,
            computed = %line.subtotal(),
            "Backend line subtotal differs from price × quantity"
        );
    }

    Some(line)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use eshop_core::{CartPhase, Price};

    use super::*;
    use crate::testing::{FakeBackend, signed_in};

    fn pid(raw: &str) -> ProductId {
        ProductId::new(raw)
    }

    fn assert_consistent(cart: &Cart) {
        let sum: Price = cart.lines().iter().map(CartLine::subtotal).sum();
        assert_eq!(cart.total(), sum);
        for line in cart.lines() {
            assert_eq!(line.subtotal(), line.unit_price().times(line.quantity()));
        }
    }

    #[tokio::test]
    async fn test_fetch_rebuilds_cart_with_derived_totals() {
        let (backend, _session, cart) = signed_in().await;
        backend.put_line("p1", 2);
        backend.put_line("p2", 1);

        cart.fetch().await.unwrap();

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.lines().len(), 2);
        assert_eq!(snapshot.phase(), CartPhase::Populated);
        assert_eq!(snapshot.total(), Price::from_units(2 * 1000 + 250));
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn test_fetch_computed_total_wins_over_backend_total() {
        let (backend, _session, cart) = signed_in().await;
        backend.put_line("p1", 2);
        backend.report_total(Price::from_units(1));

        cart.fetch().await.unwrap();

        assert_eq!(cart.snapshot().total(), Price::from_units(2000));
        assert_consistent(&cart.snapshot());
    }

    #[tokio::test]
    async fn test_fetch_fills_missing_images_and_drops_empty_lines() {
        let (backend, _session, cart) = signed_in().await;
        backend.put_line("p1", 1);
        backend.put_raw_line("ghost", 0);

        cart.fetch().await.unwrap();

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.lines().len(), 1);
        assert_eq!(snapshot.lines()[0].image(), "/static/products/p1_small.webp");
    }

    #[test]
    fn test_overflowing_line_is_dropped() {
        let item = |product_id: &str, price: Price, quantity: i64| CartItem {
            product_id: product_id.to_string(),
            name: product_id.to_uppercase(),
            price,
            quantity,
            subtotal: None,
            image_url: None,
        };

        let huge = Price::new(rust_decimal::Decimal::MAX / rust_decimal::Decimal::TWO);
        assert!(build_line(item("p1", huge, 3)).is_none());
        assert!(build_line(item("p2", Price::from_units(1), i64::from(u32::MAX))).is_some());
        assert!(build_line(item("p3", Price::from_units(1), i64::from(u32::MAX) + 1)).is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_cart() {
        let (backend, session, cart) = signed_in().await;
        backend.put_line("p1", 2);
        cart.fetch().await.unwrap();

        backend.go_offline();
        let err = cart.fetch().await.unwrap_err();

        assert!(matches!(err, CartError::Backend(_)));
        assert_eq!(cart.snapshot().item_count(), 2);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_update_quantity_scenario() {
        let (backend, _session, cart) = signed_in().await;
        backend.put_line("p1", 2);
        cart.fetch().await.unwrap();
        assert_eq!(cart.snapshot().total(), Price::from_units(2000));

        cart.update_quantity(&pid("p1"), 3).await.unwrap();

        assert_eq!(
            backend.calls_since("update"),
            vec!["update:p1:3", "list", "total"]
        );
        let snapshot = cart.snapshot();
        let line = snapshot.line(&pid("p1")).unwrap();
        assert_eq!(line.quantity(), 3);
        assert_eq!(line.subtotal(), Price::from_units(3000));
        assert_eq!(snapshot.total(), Price::from_units(3000));
    }

    #[tokio::test]
    async fn test_update_quantity_below_one_is_refused_locally() {
        let (backend, _session, cart) = signed_in().await;
        backend.put_line("p1", 2);
        cart.fetch().await.unwrap();
        let calls = backend.call_count();

        let err = cart.update_quantity(&pid("p1"), 0).await.unwrap_err();

        assert!(matches!(err, CartError::Rejected(Some(_))));
        assert_eq!(backend.call_count(), calls);
        assert_eq!(cart.snapshot().item_count(), 2);
    }

    #[tokio::test]
    async fn test_add_and_remove_refetch() {
        let (backend, _session, cart) = signed_in().await;

        cart.add(&pid("p2"), 1).await.unwrap();
        cart.add(&pid("p2"), 1).await.unwrap();
        assert_eq!(cart.snapshot().line(&pid("p2")).unwrap().quantity(), 2);

        cart.remove(&pid("p2")).await.unwrap();
        assert!(cart.snapshot().is_empty());
        assert_eq!(backend.calls_since("remove"), vec!["remove:p2", "list", "total"]);
    }

    #[tokio::test]
    async fn test_rejected_write_surfaces_detail() {
        let (_backend, _session, cart) = signed_in().await;

        let err = cart.add(&pid("missing"), 1).await.unwrap_err();

        assert_eq!(err.detail(), Some("Product not found"));
    }

    #[tokio::test]
    async fn test_write_failure_is_reraised_and_state_kept() {
        let (backend, _session, cart) = signed_in().await;
        backend.put_line("p1", 1);
        cart.fetch().await.unwrap();

        backend.go_offline();
        let err = cart.add(&pid("p1"), 1).await.unwrap_err();

        assert!(matches!(err, CartError::Backend(_)));
        assert_eq!(cart.snapshot().item_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_after_write_is_tolerated() {
        let (backend, _session, cart) = signed_in().await;
        backend.fail_reads();

        cart.add(&pid("p1"), 1).await.unwrap();

        assert!(cart.snapshot().is_empty());
        assert_eq!(backend.line_quantity("p1"), Some(1));
    }

    #[tokio::test]
    async fn test_clear_then_fetch_is_empty_with_zero_total() {
        let (backend, _session, cart) = signed_in().await;
        backend.put_line("p1", 2);
        cart.fetch().await.unwrap();

        cart.clear().await.unwrap();
        assert!(cart.snapshot().is_empty());
        assert_eq!(backend.calls_since("clear"), vec!["clear"]);

        cart.fetch().await.unwrap();
        assert!(cart.snapshot().is_empty());
        assert_eq!(cart.snapshot().total(), Price::ZERO);
    }

    #[tokio::test]
    async fn test_operations_without_session_fail_without_backend_contact() {
        let (backend, session, cart) = signed_in().await;
        backend.put_line("p1", 2);
        cart.fetch().await.unwrap();
        session.logout();
        let before = cart.snapshot();
        let calls = backend.call_count();

        assert!(matches!(cart.fetch().await, Err(CartError::NotAuthenticated)));
        assert!(matches!(cart.add(&pid("p1"), 1).await, Err(CartError::NotAuthenticated)));
        assert!(matches!(
            cart.update_quantity(&pid("p1"), 5).await,
            Err(CartError::NotAuthenticated)
        ));
        assert!(matches!(cart.remove(&pid("p1")).await, Err(CartError::NotAuthenticated)));
        assert!(matches!(cart.clear().await, Err(CartError::NotAuthenticated)));

        assert_eq!(backend.call_count(), calls);
        assert_eq!(cart.snapshot(), before);
    }

    async fn run(cart: &CartStore<FakeBackend>, op: &str) -> Result<(), CartError> {
        let p1 = pid("p1");
        match op {
            "fetch" => cart.fetch().await,
            "add" => cart.add(&p1, 1).await,
            "update" => cart.update_quantity(&p1, 4).await,
            "remove" => cart.remove(&p1).await,
            "clear" => cart.clear().await,
            other => panic!("unknown operation {other}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_cascades_from_every_operation() {
        for op in ["fetch", "add", "update", "remove", "clear"] {
            let (backend, session, cart) = signed_in().await;
            backend.put_line("p1", 2);
            cart.fetch().await.unwrap();
            assert!(!cart.snapshot().is_empty());

            backend.revoke_tokens();
            let err = run(&cart, op).await.unwrap_err();

            assert!(matches!(err, CartError::AuthorizationDenied), "{op}: {err}");
            assert!(!session.is_authenticated(), "{op}");
            assert!(session.claims().is_none(), "{op}");
            assert!(cart.snapshot().is_empty(), "{op}");
        }
    }

    #[test]
    fn test_stale_ticket_is_discarded() {
        let backend = Arc::new(FakeBackend::new());
        let session = Arc::new(SessionStore::new(
            Arc::clone(&backend),
            Arc::new(crate::session::MemoryTokenStorage::new()),
        ));
        let cart = CartStore::new(backend, session);
        let newer = Cart::from_lines(vec![CartLine::new(
            pid("new"),
            "New",
            Price::from_units(1),
            NonZeroU32::MIN,
            "",
        )]);
        let older = Cart::from_lines(vec![CartLine::new(
            pid("old"),
            "Old",
            Price::from_units(1),
            NonZeroU32::MIN,
            "",
        )]);

        let first = cart.issue_ticket();
        let second = cart.issue_ticket();

        assert!(cart.apply(second, newer.clone()));
        assert!(!cart.apply(first, older));
        assert_eq!(cart.snapshot(), newer);

        let third = cart.issue_ticket();
        cart.reset();
        assert!(!cart.apply(third, newer));
        assert!(cart.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_in_flight_during_logout_does_not_resurrect_cart() {
        let (backend, session, cart) = signed_in().await;
        backend.put_line("p1", 2);
        let gate = backend.hold_reads();

        let fetching = {
            let cart = Arc::clone(&cart);
            tokio::spawn(async move { cart.fetch().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        session.logout();
        cart.reset();
        gate.add_permits(1);

        fetching.await.unwrap().unwrap();
        assert!(cart.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_follower_fetches_on_login_and_resets_on_logout() {
        let (backend, session, cart) = crate::testing::signed_out();
        backend.put_line("p1", 2);
        let follower = cart.follow_session();

        crate::testing::login(&session).await;
        crate::testing::eventually(|| cart.snapshot().item_count() == 2).await;

        session.logout();
        crate::testing::eventually(|| cart.snapshot().is_empty()).await;

        follower.abort();
    }
}
