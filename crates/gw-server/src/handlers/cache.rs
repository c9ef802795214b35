//! `DELETE /api/cache/{key}` (spec §6): evict a cached response by the
//! `x-bf-cache-key` value it was stored under.

use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::state::AppState;

pub async fn evict(State(state): State<AppState>, Path(key): Path<String>) -> StatusCode {
    if state.cache.evict(&key) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
