//! Session, cart, and checkout stores over real HTTP.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use eshop_core::{CartPhase, Email, ProductId};
use eshop_integration_tests::{DECLINED_CARD_PREFIX, DEMO_EMAIL, DEMO_PASSWORD, FakeCommerce, eventually};
use eshop_storefront::api::ApiClient;
use eshop_storefront::cart::{CartError, CartStore};
use eshop_storefront::checkout::{CardInput, Checkout, CheckoutError};
use eshop_storefront::handoff::{ConfirmationHandoff, HandoffState};
use eshop_storefront::session::{FileTokenStorage, SessionStore};
use secrecy::SecretString;
use tempfile::TempDir;

struct Client {
    session: Arc<SessionStore<ApiClient>>,
    cart: Arc<CartStore<ApiClient>>,
    checkout: Checkout<ApiClient>,
}

fn client(backend: &FakeCommerce, data_dir: &TempDir) -> Client {
    let api = Arc::new(backend.api_client());
    let storage = Arc::new(FileTokenStorage::new(data_dir.path()));
    let session = Arc::new(SessionStore::new(Arc::clone(&api), storage));
    session.restore();
    let cart = Arc::new(CartStore::new(api, Arc::clone(&session)));
    let checkout = Checkout::new(
        Arc::clone(&cart),
        ConfirmationHandoff::new(Duration::from_secs(60)),
    );
    Client {
        session,
        cart,
        checkout,
    }
}

async fn sign_in(client: &Client) {
    client
        .session
        .login(
            &Email::parse(DEMO_EMAIL).unwrap(),
            &SecretString::from(DEMO_PASSWORD),
        )
        .await
        .unwrap();
}

fn card(number: &str) -> CardInput {
    CardInput {
        number: SecretString::from(number.to_string()),
        holder_name: "Ana Perez".to_string(),
        expiry: "12/29".to_string(),
        cvv: SecretString::from("123".to_string()),
    }
}

// =============================================================================
// Session
// =============================================================================

#[tokio::test]
async fn test_session_survives_restart() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();

    sign_in(&client(&backend, &dir)).await;

    let restarted = client(&backend, &dir);
    assert!(restarted.session.is_authenticated());
    assert_eq!(restarted.session.claims().unwrap().email, DEMO_EMAIL);

    restarted.cart.fetch().await.unwrap();
    assert_eq!(backend.count("GET /cart/list"), 1);
}

#[tokio::test]
async fn test_logout_forgets_persisted_token() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();
    let first = client(&backend, &dir);
    sign_in(&first).await;

    first.session.logout();

    assert!(!client(&backend, &dir).session.is_authenticated());
}

// =============================================================================
// Cart
// =============================================================================

#[tokio::test]
async fn test_every_write_is_followed_by_a_full_read() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&backend, &dir);
    sign_in(&client).await;

    client.cart.add(&ProductId::new("p1"), 2).await.unwrap();
    client
        .cart
        .update_quantity(&ProductId::new("p1"), 4)
        .await
        .unwrap();

    let cart = client.cart.snapshot();
    assert_eq!(cart.phase(), CartPhase::Populated);
    assert_eq!(cart.item_count(), 4);
    assert_eq!(cart.total().to_string(), "$50.00");
    assert_eq!(backend.count("GET /cart/list"), 2);
    assert_eq!(backend.count("GET /cart/total"), 2);
}

#[tokio::test]
async fn test_cart_reflects_changes_made_elsewhere_on_fetch() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&backend, &dir);
    sign_in(&client).await;

    backend.put_in_cart(DEMO_EMAIL, "p3", 2);
    client.cart.fetch().await.unwrap();

    let cart = client.cart.snapshot();
    let line = cart.line(&ProductId::new("p3")).unwrap();
    assert_eq!(line.quantity(), 2);
    assert_eq!(line.image(), "/static/products/p3_small.webp");
}

#[tokio::test]
async fn test_revoked_token_cascades_to_logout_and_empty_cart() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&backend, &dir);
    sign_in(&client).await;
    client.cart.add(&ProductId::new("p1"), 1).await.unwrap();

    backend.revoke_tokens();
    let err = client.cart.add(&ProductId::new("p3"), 1).await.unwrap_err();

    assert!(matches!(err, CartError::AuthorizationDenied));
    assert!(!client.session.is_authenticated());
    assert!(client.cart.snapshot().is_empty());
    assert!(!FileTokenStorage::new(dir.path()).path().exists());
}

#[tokio::test]
async fn test_rejected_add_keeps_cart_and_reports_detail() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&backend, &dir);
    sign_in(&client).await;
    client.cart.add(&ProductId::new("p2"), 2).await.unwrap();

    let err = client.cart.add(&ProductId::new("p2"), 1).await.unwrap_err();

    assert_eq!(err.detail(), Some("Insufficient stock"));
    assert_eq!(client.cart.snapshot().item_count(), 2);
    assert!(client.session.is_authenticated());
}

#[tokio::test]
async fn test_follower_loads_cart_after_login() {
    let backend = FakeCommerce::start().await;
    backend.put_in_cart(DEMO_EMAIL, "p1", 1);
    let dir = TempDir::new().unwrap();
    let client = client(&backend, &dir);
    let follower = client.cart.follow_session();

    sign_in(&client).await;
    eventually(|| client.cart.snapshot().item_count() == 1).await;

    client.session.logout();
    eventually(|| client.cart.snapshot().is_empty()).await;
    follower.abort();
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_pays_once_and_hands_off_confirmation() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&backend, &dir);
    sign_in(&client).await;
    client.cart.add(&ProductId::new("p1"), 2).await.unwrap();

    let ticket = client.checkout.submit(card("4111111111111111")).await.unwrap();

    assert!(client.cart.snapshot().is_empty());
    assert!(backend.cart_of(DEMO_EMAIL).is_empty());
    assert_eq!(backend.stock_of("p1"), 8);
    assert_eq!(backend.count("POST /checkout/payment"), 1);

    match client.checkout.handoff().claim(ticket).await {
        HandoffState::Ready(confirmation) => {
            assert_eq!(confirmation.message, "Payment processed successfully");
            assert_eq!(confirmation.total.to_string(), "$25.00");
            assert_eq!(confirmation.items.len(), 1);
            assert_eq!(confirmation.items[0].name, "Ceramic Mug");
        }
        HandoffState::Expired => panic!("confirmation missing"),
    }
    assert_eq!(
        client.checkout.handoff().claim(ticket).await,
        HandoffState::Expired
    );
}

#[tokio::test]
async fn test_declined_card_keeps_cart() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&backend, &dir);
    sign_in(&client).await;
    client.cart.add(&ProductId::new("p1"), 1).await.unwrap();

    let err = client
        .checkout
        .submit(card(&format!("{DECLINED_CARD_PREFIX}000000000002")))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Rejected(Some(ref d)) if d == "Card declined"));
    assert_eq!(client.cart.snapshot().item_count(), 1);
    assert_eq!(backend.cart_of(DEMO_EMAIL).len(), 1);
}

#[tokio::test]
async fn test_empty_cart_never_reaches_payment() {
    let backend = FakeCommerce::start().await;
    let dir = TempDir::new().unwrap();
    let client = client(&backend, &dir);
    sign_in(&client).await;

    let err = client.checkout.submit(card("4111111111111111")).await.unwrap_err();

    assert!(matches!(err, CheckoutError::EmptyCart));
    assert_eq!(backend.count("POST /checkout/payment"), 0);
}
