/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /health は公開、/records 系は authorization middleware の内側
 */
use axum::{
    Router,
    routing::{get, post, put},
};

use crate::middleware;
use crate::state::AppState;

use crate::api::v1::handlers::{
    health::health,
    records::{create_record, get_record, transition_record},
};

pub fn routes(state: AppState) -> Router<AppState> {
    let records = Router::new()
        .route("/records", post(create_record))
        .route("/records/{record_id}", get(get_record))
        .route("/records/{record_id}/state", put(transition_record));

    Router::new()
        .route("/health", get(health))
        .merge(middleware::auth::access::apply(records, state))
}
