//! Rotas do paciente: médicos disponíveis, agendamento, pagamentos e perfil

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use clinic_core::accounts::{self, PatientProfileChanges};
use clinic_core::ledger::parse_calendar_day;
use clinic_core::models::{Appointment, DoctorSummary, Gender, PatientProfile, Payment, PaymentMethod};
use clinic_core::workflow::{Booking, BookingRequest, GatewayResult};
use clinic_core::Actor;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::CallerContext;
use crate::error::ApiError;
use crate::{created, ok, ApiResponse, ApiResult, AppState, ValidatedJson};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors))
        .route("/appointments", post(book).get(list_appointments))
        .route("/appointments/:id/cancel", patch(cancel))
        .route("/appointments/:id/payment", post(record_payment))
        .route("/payments", get(list_payments))
        .route("/profile", put(update_profile))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BookRequest {
    pub doctor_id: Uuid,
    /// `YYYY-MM-DD` ou data/hora RFC 3339
    #[validate(length(min = 1))]
    pub date: String,
    #[validate(length(min = 1, max = 32))]
    pub time_slot: String,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentResultRequest {
    #[validate(length(min = 1, max = 128))]
    pub order_id: String,
    #[validate(length(max = 128))]
    pub payment_id: Option<String>,
    pub succeeded: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePatientRequest {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[validate(length(max = 300))]
    pub address: Option<String>,
    #[validate(length(max = 5000))]
    pub medical_history: Option<String>,
}

async fn list_doctors(
    State(state): State<AppState>,
    caller: CallerContext,
) -> ApiResult<Vec<DoctorSummary>> {
    caller.patient_id(&state.pool).await?;
    ok(accounts::list_doctors(&state.pool, true).await?)
}

async fn book(
    State(state): State<AppState>,
    caller: CallerContext,
    ValidatedJson(body): ValidatedJson<BookRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Booking>>), ApiError> {
    let patient_id = caller.patient_id(&state.pool).await?;
    let date = parse_calendar_day(&body.date)
        .ok_or_else(|| ApiError::BadRequest(format!("data inválida: {}", body.date)))?;

    let booking = state
        .workflow
        .book(BookingRequest {
            doctor_id: body.doctor_id,
            patient_id,
            date,
            time_slot: body.time_slot,
            payment_method: body.payment_method,
            notes: body.notes,
        })
        .await?;
    created(booking)
}

async fn list_appointments(
    State(state): State<AppState>,
    caller: CallerContext,
) -> ApiResult<Vec<Appointment>> {
    let patient_id = caller.patient_id(&state.pool).await?;
    ok(state.workflow.patient_appointments(patient_id).await?)
}

async fn cancel(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(appointment_id): Path<Uuid>,
) -> ApiResult<Appointment> {
    let patient_id = caller.patient_id(&state.pool).await?;
    ok(state
        .workflow
        .cancel(appointment_id, Actor::Patient(patient_id))
        .await?)
}

async fn record_payment(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(appointment_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<PaymentResultRequest>,
) -> ApiResult<Payment> {
    let patient_id = caller.patient_id(&state.pool).await?;
    let result = GatewayResult {
        order_id: body.order_id,
        payment_id: body.payment_id,
        succeeded: body.succeeded,
    };
    ok(state
        .workflow
        .record_gateway_result(appointment_id, patient_id, result)
        .await?)
}

async fn list_payments(State(state): State<AppState>, caller: CallerContext) -> ApiResult<Vec<Payment>> {
    let patient_id = caller.patient_id(&state.pool).await?;
    ok(state.workflow.patient_payments(patient_id).await?)
}

async fn update_profile(
    State(state): State<AppState>,
    caller: CallerContext,
    ValidatedJson(body): ValidatedJson<UpdatePatientRequest>,
) -> ApiResult<PatientProfile> {
    let patient_id = caller.patient_id(&state.pool).await?;
    let changes = PatientProfileChanges {
        date_of_birth: body.date_of_birth,
        gender: body.gender,
        address: body.address,
        medical_history: body.medical_history,
    };
    ok(accounts::update_patient_profile(&state.pool, patient_id, changes).await?)
}
