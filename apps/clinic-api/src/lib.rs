//! Clinic API - serviço HTTP de agendamento de consultas
//!
//! Expõe o fluxo de agendamento de `clinic-core` para pacientes, médicos e
//! administradores, com autenticação por token.

use std::sync::Arc;

use axum::body::HttpBody;
use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::{Request, StatusCode};
use axum::{BoxError, Json, Router};
use clinic_core::AppointmentWorkflow;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use validator::Validate;

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use config::AppConfig;
use error::ApiError;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Estado compartilhado entre os handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub workflow: AppointmentWorkflow,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            workflow: AppointmentWorkflow::new(pool.clone()),
            pool,
            config: Arc::new(config),
        }
    }
}

/// Monta o router completo com as camadas de trace, CORS, compressão e limite
pub fn build_router(state: AppState) -> Router {
    let max_concurrent = state.config.max_concurrent_requests;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::router()
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Envelope das respostas bem-sucedidas
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse {
        success: true,
        data,
    }))
}

pub fn created<T: Serialize>(data: T) -> Result<(StatusCode, Json<ApiResponse<T>>), ApiError> {
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    ))
}

/// Corpo JSON desserializado e validado com `validator`
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S, B> FromRequest<S, B> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::BadRequest(rejection.body_text()))?;
        value
            .validate()
            .map_err(|errors| ApiError::BadRequest(errors.to_string()))?;
        Ok(ValidatedJson(value))
    }
}
