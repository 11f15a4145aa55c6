//! Route handlers for the reqtap server

pub mod feed;
pub mod ingress;

use crate::{config::Config, store::RequestStore};
use axum::Router;
use reqtap_common::Normalizer;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<RequestStore>,
    pub normalizer: Arc<Normalizer>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(RequestStore::new(config.subscriber_buffer));
        Self {
            config: Arc::new(config),
            store,
            normalizer: Arc::new(Normalizer::new()),
        }
    }
}

/// Build the full router: live feed endpoints plus catch-all capture
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(feed::router())
        .merge(ingress::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
