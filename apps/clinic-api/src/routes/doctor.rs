//! Rotas do médico: agenda, consultas e perfil

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, put};
use axum::Router;
use chrono::Utc;
use clinic_core::accounts::{self, DoctorProfileChanges};
use clinic_core::ledger::parse_calendar_day;
use clinic_core::models::{Appointment, DoctorProfile};
use clinic_core::{Actor, AvailabilityLedger};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::CallerContext;
use crate::error::ApiError;
use crate::{ok, ApiResult, AppState, ValidatedJson};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slots", get(slots).post(add_slots))
        .route("/appointments", get(list_appointments))
        .route("/appointments/:id/advance", patch(advance))
        .route("/appointments/:id/cancel", patch(cancel))
        .route("/profile", put(update_profile))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddSlotsRequest {
    #[validate(length(min = 1))]
    pub date: String,
    #[validate(length(min = 1, max = 48))]
    pub times: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentsQuery {
    /// Só consultas de hoje em diante, exceto as canceladas
    #[serde(default)]
    pub upcoming: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDoctorRequest {
    #[validate(length(min = 1, max = 120))]
    pub specialization: Option<String>,
    #[validate(range(min = 0, max = 80))]
    pub experience: Option<i64>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    #[validate(range(min = 0))]
    pub consultation_fee: Option<i64>,
}

async fn slots(State(state): State<AppState>, caller: CallerContext) -> ApiResult<AvailabilityLedger> {
    let doctor_id = caller.doctor_id(&state.pool).await?;
    ok(accounts::doctor_ledger(&state.pool, doctor_id).await?)
}

async fn add_slots(
    State(state): State<AppState>,
    caller: CallerContext,
    ValidatedJson(body): ValidatedJson<AddSlotsRequest>,
) -> ApiResult<AvailabilityLedger> {
    let doctor_id = caller.doctor_id(&state.pool).await?;
    let date = parse_calendar_day(&body.date)
        .ok_or_else(|| ApiError::BadRequest(format!("data inválida: {}", body.date)))?;
    ok(accounts::add_doctor_slots(&state.pool, doctor_id, date, &body.times).await?)
}

async fn list_appointments(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<AppointmentsQuery>,
) -> ApiResult<Vec<Appointment>> {
    let doctor_id = caller.doctor_id(&state.pool).await?;
    let upcoming_from = query.upcoming.then(|| Utc::now().date_naive());
    ok(state
        .workflow
        .doctor_appointments(doctor_id, upcoming_from)
        .await?)
}

async fn advance(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(appointment_id): Path<Uuid>,
) -> ApiResult<Appointment> {
    let doctor_id = caller.doctor_id(&state.pool).await?;
    ok(state.workflow.advance(appointment_id, doctor_id).await?)
}

async fn cancel(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(appointment_id): Path<Uuid>,
) -> ApiResult<Appointment> {
    let doctor_id = caller.doctor_id(&state.pool).await?;
    ok(state
        .workflow
        .cancel(appointment_id, Actor::Doctor(doctor_id))
        .await?)
}

async fn update_profile(
    State(state): State<AppState>,
    caller: CallerContext,
    ValidatedJson(body): ValidatedJson<UpdateDoctorRequest>,
) -> ApiResult<DoctorProfile> {
    let doctor_id = caller.doctor_id(&state.pool).await?;
    let changes = DoctorProfileChanges {
        specialization: body.specialization,
        experience: body.experience,
        bio: body.bio,
        consultation_fee: body.consultation_fee,
    };
    ok(accounts::update_doctor_profile(&state.pool, doctor_id, changes).await?)
}
