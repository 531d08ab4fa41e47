//! HTTP surface.

pub mod boost;
pub mod catalog;
pub mod l402;
pub mod lottery;
pub mod submit;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::config::API_GET_PRICE_SATS;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let mut directories = Router::new()
        .route("/api/apps", get(catalog::list_apps))
        .route("/api/apis", get(catalog::list_apis));
    // Directory reads are priced; with no gate configured they are free.
    if let Some(gate) = &state.gate {
        directories = directories
            .route_layer(gate.paywall(API_GET_PRICE_SATS, "L402 Apps — Directory access"));
    }

    Router::new()
        .route("/api/l402/status", get(l402::status))
        .route("/api/l402/qr/{payment_hash}", get(l402::qr))
        .route("/api/l402/check/{payment_hash}", get(l402::check))
        .route("/api/boost/price", get(boost::price))
        .route("/api/boost", post(boost::buy))
        .route("/api/lottery", get(lottery::current))
        .route("/api/lottery/history", get(lottery::history))
        .route("/api/lottery/enter", post(lottery::enter))
        .route("/api/apps/submit", post(submit::submit_app))
        .route("/api/apis/submit", post(submit::submit_api))
        .merge(directories)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
