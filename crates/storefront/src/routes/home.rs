//! Catalog page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use eshop_core::Product;
use serde::Deserialize;
use tracing::instrument;

use super::{Flash, NavView};
use crate::api::CommerceBackend;
use crate::filters;
use crate::images::ImageResolver;
use crate::state::AppState;

/// Catalog query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    /// Name search.
    #[serde(default)]
    pub q: String,
    pub error: Option<String>,
    pub success: Option<String>,
    pub detail: Option<String>,
}

/// Product card display data for templates.
#[derive(Clone)]
pub struct ProductCard {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: String,
    pub stock: u32,
    pub low_stock: bool,
    pub image_url: String,
}

impl ProductCard {
    fn new(product: &Product, images: &ImageResolver) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price.to_string(),
            stock: product.stock,
            low_stock: product.is_low_stock(),
            image_url: images.resolve(&product.image_small),
        }
    }
}

/// What the catalog grid shows instead of products, if anything.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CatalogNotice {
    None,
    LoadFailed,
    Empty,
    NoMatch,
}

/// Catalog page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub nav: NavView,
    pub flash: Flash,
    pub query: String,
    pub products: Vec<ProductCard>,
    pub notice: CatalogNotice,
}

/// Display the catalog, filtered by `?q=`.
///
/// A backend failure renders the page with a load error rather than failing
/// the request.
#[instrument(skip(state, query))]
pub async fn home(State(state): State<AppState>, Query(query): Query<CatalogQuery>) -> impl IntoResponse {
    let search = query.q.trim().to_string();
    let flash = Flash::from(super::MessageQuery {
        error: query.error,
        success: query.success,
        detail: query.detail,
    });

    let (products, notice) = match state.api().list_products().await {
        Ok(catalog) if catalog.is_empty() => (Vec::new(), CatalogNotice::Empty),
        Ok(catalog) => {
            let products: Vec<_> = catalog
                .iter()
                .filter(|p| p.matches(&search))
                .map(|p| ProductCard::new(p, state.images()))
                .collect();
            let notice = if products.is_empty() {
                CatalogNotice::NoMatch
            } else {
                CatalogNotice::None
            };
            (products, notice)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load catalog");
            (Vec::new(), CatalogNotice::LoadFailed)
        }
    };

    HomeTemplate {
        nav: NavView::current(&state),
        flash,
        query: search,
        products,
        notice,
    }
}
