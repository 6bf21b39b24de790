//! Rotas administrativas: médicos, pacientes e todas as consultas

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use clinic_core::accounts::{self, NewAccount, NewDoctor};
use clinic_core::models::{Appointment, DoctorProfile, DoctorSummary, PatientSummary, Role};
use clinic_core::Actor;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CallerContext;
use crate::error::ApiError;
use crate::{created, ok, ApiResponse, ApiResult, AppState, ValidatedJson};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors).post(create_doctor))
        .route("/doctors/:id", delete(delete_doctor))
        .route("/doctors/:id/approval", patch(toggle_approval))
        .route("/patients", get(list_patients))
        .route("/patients/:id", delete(delete_patient))
        .route("/appointments", get(list_appointments))
        .route("/appointments/:id/cancel", patch(cancel))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDoctorRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub specialization: String,
    #[validate(range(min = 0, max = 80))]
    pub experience: i64,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    /// Valor em centavos
    #[validate(range(min = 0))]
    pub consultation_fee: i64,
    #[serde(default)]
    pub approved: bool,
}

async fn create_doctor(
    State(state): State<AppState>,
    caller: CallerContext,
    ValidatedJson(body): ValidatedJson<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DoctorSummary>>), ApiError> {
    caller.require(Role::Admin)?;
    let new = NewDoctor {
        account: NewAccount {
            name: body.name.trim().to_string(),
            email: body.email,
            password: body.password,
            phone: body.phone,
        },
        specialization: body.specialization,
        experience: body.experience,
        bio: body.bio,
        consultation_fee: body.consultation_fee,
        approved: body.approved,
    };
    created(accounts::create_doctor(&state.pool, new).await?)
}

async fn list_doctors(
    State(state): State<AppState>,
    caller: CallerContext,
) -> ApiResult<Vec<DoctorSummary>> {
    caller.require(Role::Admin)?;
    ok(accounts::list_doctors(&state.pool, false).await?)
}

async fn toggle_approval(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(doctor_id): Path<Uuid>,
) -> ApiResult<DoctorProfile> {
    caller.require(Role::Admin)?;
    ok(accounts::toggle_doctor_approval(&state.pool, doctor_id).await?)
}

async fn delete_doctor(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(doctor_id): Path<Uuid>,
) -> ApiResult<Value> {
    caller.require(Role::Admin)?;
    accounts::delete_doctor(&state.pool, doctor_id).await?;
    ok(json!({ "deleted": doctor_id }))
}

async fn list_patients(
    State(state): State<AppState>,
    caller: CallerContext,
) -> ApiResult<Vec<PatientSummary>> {
    caller.require(Role::Admin)?;
    ok(accounts::list_patients(&state.pool).await?)
}

async fn delete_patient(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Value> {
    caller.require(Role::Admin)?;
    accounts::delete_patient(&state.pool, patient_id).await?;
    ok(json!({ "deleted": patient_id }))
}

async fn list_appointments(
    State(state): State<AppState>,
    caller: CallerContext,
) -> ApiResult<Vec<Appointment>> {
    caller.require(Role::Admin)?;
    ok(state.workflow.all_appointments().await?)
}

async fn cancel(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(appointment_id): Path<Uuid>,
) -> ApiResult<Appointment> {
    caller.require(Role::Admin)?;
    ok(state.workflow.cancel(appointment_id, Actor::Admin).await?)
}
