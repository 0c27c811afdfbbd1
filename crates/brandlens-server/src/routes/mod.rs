pub mod data;
pub mod streaming;
pub mod summary;

use axum::Router;

use crate::state::AppState;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(streaming::routes(state.clone()))
        .merge(data::routes(state.clone()))
        .merge(summary::routes(state))
}
