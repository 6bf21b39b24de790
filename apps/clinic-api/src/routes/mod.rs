//! Rotas HTTP agrupadas por papel

use axum::Router;

use crate::AppState;

pub mod admin;
pub mod auth;
pub mod doctor;
pub mod health;
pub mod patient;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/auth", auth::router())
        .nest("/api/patient", patient::router())
        .nest("/api/doctor", doctor::router())
        .nest("/api/admin", admin::router())
}
