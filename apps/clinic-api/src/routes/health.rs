use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::built_info;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": built_info::PKG_NAME,
        "version": built_info::PKG_VERSION,
        "rustc": built_info::RUSTC_VERSION,
    }))
}
