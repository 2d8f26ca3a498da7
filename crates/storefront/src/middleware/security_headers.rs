//! Security headers for every storefront response.
//!
//! Pages only load their own stylesheet and the backend's product images, so
//! the policy denies everything else.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, header::CONTENT_SECURITY_POLICY},
    middleware::Next,
    response::Response,
};

/// Build the Content-Security-Policy for a storefront whose product images
/// are served from `image_origin`.
///
/// ```text
/// default-src 'none';
/// script-src 'self';
/// style-src 'self';
/// font-src 'self';
/// img-src 'self' <image_origin> https:;
/// connect-src 'self';
/// frame-src 'none';
/// object-src 'none';
/// base-uri 'self';
/// form-action 'self';
/// frame-ancestors 'none'
/// ```
///
/// `https:` stays in `img-src` because the backend may hand out absolute
/// image URLs on a CDN.
#[must_use]
pub fn content_security_policy(image_origin: &str) -> String {
    format!(
        "default-src 'none'; \
         script-src 'self'; \
         style-src 'self'; \
         font-src 'self'; \
         img-src 'self' {image_origin} https:; \
         connect-src 'self'; \
         frame-src 'none'; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self'; \
         frame-ancestors 'none'"
    )
}

/// Headers that are the same on every response.
///
/// `cross-origin-embedder-policy` is `credentialless` rather than
/// `require-corp`: product images come from the backend, which sends no CORP
/// headers. `cache-control` is `no-store` because pages render the visitor's
/// session and cart.
const FIXED_HEADERS: [(&str, &str); 9] = [
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    (
        "permissions-policy",
        "camera=(), geolocation=(), microphone=(), payment=(), usb=(), \
         interest-cohort=(), browsing-topics=()",
    ),
    ("cache-control", "no-store, max-age=0"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("cross-origin-embedder-policy", "credentialless"),
    ("x-dns-prefetch-control", "off"),
];

/// Add the fixed security headers and the Content-Security-Policy passed in
/// as state (see [`content_security_policy`]).
pub async fn security_headers_middleware(
    State(csp): State<HeaderValue>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in FIXED_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers.insert(CONTENT_SECURITY_POLICY, csp);

    response
}
