//! Cadastro de pacientes, login e conta atual

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clinic_core::accounts::{self, NewAccount};
use clinic_core::models::{PatientProfile, Profile, User};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::{issue_token, CallerContext};
use crate::error::ApiError;
use crate::{created, ok, ApiResponse, ApiResult, AppState, ValidatedJson};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Registered {
    pub user: User,
    pub patient: PatientProfile,
}

#[derive(Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub user: User,
    pub account: Profile,
}

/// Autocadastro sempre cria um paciente
async fn register(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Registered>>), ApiError> {
    let account = NewAccount {
        name: body.name.trim().to_string(),
        email: body.email,
        password: body.password,
        phone: body.phone,
    };
    let (user, patient) = accounts::register_patient(&state.pool, account).await?;
    created(Registered { user, patient })
}

async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> ApiResult<Session> {
    let user = accounts::authenticate(&state.pool, &body.email, &body.password).await?;
    let token = issue_token(&state.config, &user)?;
    info!("Login de {} ({})", user.id, user.role);
    ok(Session { token, user })
}

async fn me(State(state): State<AppState>, caller: CallerContext) -> ApiResult<Me> {
    let user = accounts::find_user(&state.pool, caller.user_id).await?;
    let account = accounts::load_profile(&state.pool, &user).await?;
    ok(Me { user, account })
}
