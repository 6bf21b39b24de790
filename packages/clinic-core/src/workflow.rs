//! Fluxo de agendamento de consultas
//!
//! Agendamento contra a agenda do médico, avanço de status, cancelamento e
//! conciliação do registro de pagamento. Cada operação roda numa única
//! transação; a primeira instrução de cada transação é uma escrita, de modo
//! que o lock de escrita do SQLite é obtido antes de qualquer leitura.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::accounts::{read_ledger, write_ledger};
use crate::error::{ClinicError, DbError};
use crate::lifecycle;
use crate::models::{
    Appointment, AppointmentStatus, DoctorProfile, Payment, PaymentMethod, PaymentRecordStatus,
    PaymentStatus,
};

const MAX_NOTES_LEN: usize = 1000;

/// Quem está pedindo a operação, já resolvido para o perfil
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Patient(Uuid),
    Doctor(Uuid),
    Admin,
}

impl Actor {
    fn patient_id(&self) -> Option<Uuid> {
        match self {
            Actor::Patient(id) => Some(*id),
            _ => None,
        }
    }

    fn doctor_id(&self) -> Option<Uuid> {
        match self {
            Actor::Doctor(id) => Some(*id),
            _ => None,
        }
    }
}

/// Pedido de agendamento
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: String,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// Consulta recém-criada com seu registro de pagamento
#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub appointment: Appointment,
    pub payment: Payment,
}

/// Resultado final informado pelo gateway de pagamento
#[derive(Debug, Clone)]
pub struct GatewayResult {
    pub order_id: String,
    pub payment_id: Option<String>,
    pub succeeded: bool,
}

/// Violação do índice único (médico, data, horário)
fn booking_conflict(error: sqlx::Error) -> ClinicError {
    match DbError::from(error) {
        DbError::ConstraintViolation(_) => ClinicError::DuplicateBooking,
        other => other.into(),
    }
}

async fn fetch_appointment(
    conn: &mut SqliteConnection,
    appointment_id: Uuid,
) -> Result<Appointment, ClinicError> {
    sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = ? AND is_deleted = 0")
        .bind(appointment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ClinicError::not_found("Consulta"))
}

/// Marca a consulta como alterada, exigindo que pertença ao ator
async fn lock_appointment(
    conn: &mut SqliteConnection,
    appointment_id: Uuid,
    actor: Actor,
) -> Result<(), ClinicError> {
    let patient_id = actor.patient_id();
    let doctor_id = actor.doctor_id();

    let result = sqlx::query(
        "UPDATE appointments SET updated_at = ?
         WHERE id = ? AND is_deleted = 0
           AND (? IS NULL OR patient_id = ?)
           AND (? IS NULL OR doctor_id = ?)",
    )
    .bind(Utc::now())
    .bind(appointment_id)
    .bind(patient_id)
    .bind(patient_id)
    .bind(doctor_id)
    .bind(doctor_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ClinicError::not_found("Consulta"));
    }
    Ok(())
}

/// Orquestra o ciclo de vida das consultas sobre o banco compartilhado
#[derive(Debug, Clone)]
pub struct AppointmentWorkflow {
    pool: SqlitePool,
}

impl AppointmentWorkflow {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Agenda uma consulta no horário pedido.
    ///
    /// Pré-condições, nesta ordem: médico existe, está aprovado e não foi
    /// excluído; o paciente existe; o horário está livre na agenda. Qualquer
    /// falha deixa o estado intacto. Um agendamento concorrente do mesmo
    /// horário falha com `DuplicateBooking`.
    pub async fn book(&self, request: BookingRequest) -> Result<Booking, ClinicError> {
        let time_slot = request.time_slot.trim().to_string();
        if time_slot.is_empty() {
            return Err(ClinicError::Validation("horário é obrigatório".to_string()));
        }
        if request
            .notes
            .as_ref()
            .map_or(false, |notes| notes.chars().count() > MAX_NOTES_LEN)
        {
            return Err(ClinicError::Validation(format!(
                "observações devem ter no máximo {} caracteres",
                MAX_NOTES_LEN
            )));
        }

        info!(
            "Agendando consulta: paciente {} com médico {} em {} {}",
            request.patient_id, request.doctor_id, request.date, time_slot
        );

        let doctor = sqlx::query_as::<_, DoctorProfile>(
            "SELECT * FROM doctors WHERE id = ? AND is_deleted = 0",
        )
        .bind(request.doctor_id)
        .fetch_optional(&self.pool)
        .await?
        .filter(|doctor| doctor.is_approved)
        .ok_or_else(|| ClinicError::not_found("Médico"))?;

        let patient: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM patients WHERE id = ? AND is_deleted = 0")
                .bind(request.patient_id)
                .fetch_optional(&self.pool)
                .await?;
        if patient.is_none() {
            return Err(ClinicError::not_found("Paciente"));
        }

        if !doctor.available_slots.contains(request.date, &time_slot) {
            warn!(
                "Horário {} {} indisponível para o médico {}",
                request.date, time_slot, doctor.id
            );
            return Err(ClinicError::SlotUnavailable);
        }

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            patient_id: request.patient_id,
            appointment_date: request.date,
            time_slot,
            consultation_fee: doctor.consultation_fee,
            payment_method: request.payment_method,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            notes: request.notes,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO appointments (id, doctor_id, patient_id, appointment_date, time_slot, consultation_fee,
                payment_method, status, payment_status, notes, is_deleted, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(appointment.id)
        .bind(appointment.doctor_id)
        .bind(appointment.patient_id)
        .bind(appointment.appointment_date)
        .bind(&appointment.time_slot)
        .bind(appointment.consultation_fee)
        .bind(appointment.payment_method.as_str())
        .bind(appointment.status.as_str())
        .bind(appointment.payment_status.as_str())
        .bind(&appointment.notes)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let err = booking_conflict(e);
            if matches!(err, ClinicError::DuplicateBooking) {
                warn!(
                    "Agendamento concorrente para o médico {} em {} {}",
                    appointment.doctor_id, appointment.appointment_date, appointment.time_slot
                );
            }
            err
        })?;

        // Relê a agenda já com o lock de escrita
        let mut ledger = read_ledger(&mut tx, doctor.id).await?;
        ledger
            .reserve(appointment.appointment_date, &appointment.time_slot)
            .map_err(|e| {
                warn!("{}", e);
                ClinicError::SlotUnavailable
            })?;
        write_ledger(&mut tx, doctor.id, &ledger).await?;

        let payment = Payment {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            amount: appointment.consultation_fee,
            payment_method: appointment.payment_method,
            status: PaymentRecordStatus::Created,
            gateway_order_id: None,
            gateway_payment_id: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO payments (id, appointment_id, patient_id, doctor_id, amount, payment_method, status,
                is_deleted, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(payment.id)
        .bind(payment.appointment_id)
        .bind(payment.patient_id)
        .bind(payment.doctor_id)
        .bind(payment.amount)
        .bind(payment.payment_method.as_str())
        .bind(payment.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Consulta {} agendada com sucesso", appointment.id);
        Ok(Booking {
            appointment,
            payment,
        })
    }

    /// Avança a consulta do médico: `pending -> confirmed -> completed`
    pub async fn advance(
        &self,
        appointment_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Appointment, ClinicError> {
        let mut tx = self.pool.begin().await?;
        lock_appointment(&mut tx, appointment_id, Actor::Doctor(doctor_id)).await?;

        let mut appointment = fetch_appointment(&mut tx, appointment_id).await?;
        let next = lifecycle::next_on_advance(appointment.status)?;

        if next == AppointmentStatus::Completed {
            appointment.payment_status = PaymentStatus::Paid;

            if appointment.payment_method == PaymentMethod::Cash {
                sqlx::query(
                    "UPDATE payments SET status = ?, updated_at = ? WHERE appointment_id = ?",
                )
                .bind(PaymentRecordStatus::Success.as_str())
                .bind(Utc::now())
                .bind(appointment_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        let previous = appointment.status;
        appointment.status = next;
        appointment.updated_at = Utc::now();

        sqlx::query(
            "UPDATE appointments SET status = ?, payment_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(appointment.status.as_str())
        .bind(appointment.payment_status.as_str())
        .bind(appointment.updated_at)
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Consulta {}: {} -> {}",
            appointment_id, previous, appointment.status
        );
        Ok(appointment)
    }

    /// Cancela a consulta, devolvendo o horário à agenda do médico.
    /// Pagamento eletrônico vinculado passa a `failed`.
    pub async fn cancel(&self, appointment_id: Uuid, actor: Actor) -> Result<Appointment, ClinicError> {
        let mut tx = self.pool.begin().await?;
        lock_appointment(&mut tx, appointment_id, actor).await?;

        let mut appointment = fetch_appointment(&mut tx, appointment_id).await?;
        lifecycle::ensure_cancellable(appointment.status)?;

        if appointment.payment_method == PaymentMethod::Electronic {
            appointment.payment_status = PaymentStatus::Failed;

            let failed = sqlx::query(
                "UPDATE payments SET status = ?, updated_at = ? WHERE appointment_id = ?",
            )
            .bind(PaymentRecordStatus::Failed.as_str())
            .bind(Utc::now())
            .bind(appointment_id)
            .execute(&mut *tx)
            .await?;
            debug!(
                "Pagamentos eletrônicos marcados como falhos: {}",
                failed.rows_affected()
            );
        }

        appointment.status = AppointmentStatus::Cancelled;
        appointment.updated_at = Utc::now();

        sqlx::query(
            "UPDATE appointments SET status = ?, payment_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(appointment.status.as_str())
        .bind(appointment.payment_status.as_str())
        .bind(appointment.updated_at)
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;

        let mut ledger = read_ledger(&mut tx, appointment.doctor_id).await?;
        ledger.release(appointment.appointment_date, &appointment.time_slot);
        write_ledger(&mut tx, appointment.doctor_id, &ledger).await?;

        tx.commit().await?;

        info!("Consulta {} cancelada ({:?})", appointment_id, actor);
        Ok(appointment)
    }

    /// Registra o desfecho informado pelo gateway para um pagamento eletrônico
    pub async fn record_gateway_result(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        result: GatewayResult,
    ) -> Result<Payment, ClinicError> {
        if result.order_id.trim().is_empty() {
            return Err(ClinicError::Validation(
                "identificador do pedido é obrigatório".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        lock_appointment(&mut tx, appointment_id, Actor::Patient(patient_id)).await?;

        let appointment = fetch_appointment(&mut tx, appointment_id).await?;
        if appointment.payment_method != PaymentMethod::Electronic {
            return Err(ClinicError::Validation(
                "consulta com pagamento em dinheiro não usa gateway".to_string(),
            ));
        }
        match appointment.status {
            AppointmentStatus::Cancelled => return Err(ClinicError::AppointmentCancelled),
            AppointmentStatus::Completed => return Err(ClinicError::AlreadyCompleted),
            AppointmentStatus::Pending | AppointmentStatus::Confirmed => {}
        }

        // Sucesso e falha são finais; só um pagamento `created` aceita o resultado
        let current: String = sqlx::query_scalar(
            "SELECT status FROM payments WHERE appointment_id = ? AND is_deleted = 0",
        )
        .bind(appointment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ClinicError::not_found("Pagamento"))?;
        if current != PaymentRecordStatus::Created.as_str() {
            warn!(
                "Resultado do gateway ignorado: pagamento da consulta {} já está {}",
                appointment_id, current
            );
            return Err(ClinicError::PaymentAlreadySettled);
        }

        let (record_status, payment_status) = if result.succeeded {
            (PaymentRecordStatus::Success, PaymentStatus::Paid)
        } else {
            (PaymentRecordStatus::Failed, PaymentStatus::Failed)
        };
        let now = Utc::now();

        let payment = sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = ?, gateway_order_id = ?, gateway_payment_id = ?, updated_at = ?
             WHERE appointment_id = ? AND is_deleted = 0
             RETURNING *",
        )
        .bind(record_status.as_str())
        .bind(result.order_id.trim())
        .bind(&result.payment_id)
        .bind(now)
        .bind(appointment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ClinicError::not_found("Pagamento"))?;

        sqlx::query("UPDATE appointments SET payment_status = ?, updated_at = ? WHERE id = ?")
            .bind(payment_status.as_str())
            .bind(now)
            .bind(appointment_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "Pagamento da consulta {} registrado como {}",
            appointment_id, payment.status
        );
        Ok(payment)
    }

    pub async fn appointment(&self, appointment_id: Uuid) -> Result<Appointment, ClinicError> {
        let mut conn = self.pool.acquire().await?;
        fetch_appointment(&mut conn, appointment_id).await
    }

    pub async fn payment_for(&self, appointment_id: Uuid) -> Result<Payment, ClinicError> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE appointment_id = ? AND is_deleted = 0",
        )
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ClinicError::not_found("Pagamento"))
    }

    pub async fn patient_appointments(&self, patient_id: Uuid) -> Result<Vec<Appointment>, ClinicError> {
        let appointments = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE patient_id = ? AND is_deleted = 0
             ORDER BY appointment_date DESC, time_slot",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    /// Consultas do médico; com `upcoming_from`, só as não canceladas a partir do dia
    pub async fn doctor_appointments(
        &self,
        doctor_id: Uuid,
        upcoming_from: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, ClinicError> {
        let appointments = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments
             WHERE doctor_id = ? AND is_deleted = 0
               AND (? IS NULL OR (appointment_date >= ? AND status <> 'cancelled'))
             ORDER BY appointment_date, time_slot",
        )
        .bind(doctor_id)
        .bind(upcoming_from)
        .bind(upcoming_from)
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    pub async fn all_appointments(&self) -> Result<Vec<Appointment>, ClinicError> {
        let appointments = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE is_deleted = 0 ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    pub async fn patient_payments(&self, patient_id: Uuid) -> Result<Vec<Payment>, ClinicError> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE patient_id = ? AND is_deleted = 0 ORDER BY created_at DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{self, DoctorProfileChanges};
    use crate::testing::TestDb;

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn request(doctor_id: Uuid, patient_id: Uuid, slot: &str, method: PaymentMethod) -> BookingRequest {
        BookingRequest {
            doctor_id,
            patient_id,
            date: june_first(),
            time_slot: slot.to_string(),
            payment_method: method,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_book_advance_complete_with_cash() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00", "10:30"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let booking = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Cash))
            .await?;
        assert_eq!(booking.appointment.status, AppointmentStatus::Pending);
        assert_eq!(booking.appointment.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.appointment.consultation_fee, doctor.consultation_fee);
        assert_eq!(booking.payment.status, PaymentRecordStatus::Created);

        let ledger = accounts::doctor_ledger(&db.pool, doctor.id).await?;
        assert_eq!(ledger.times_for(june_first()).unwrap(), ["10:30"]);

        let id = booking.appointment.id;
        let confirmed = workflow.advance(id, doctor.id).await?;
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        let completed = workflow.advance(id, doctor.id).await?;
        assert_eq!(completed.status, AppointmentStatus::Completed);
        assert_eq!(completed.payment_status, PaymentStatus::Paid);

        let payment = workflow.payment_for(id).await?;
        assert_eq!(payment.status, PaymentRecordStatus::Success);

        assert!(matches!(
            workflow.advance(id, doctor.id).await,
            Err(ClinicError::AlreadyCompleted)
        ));
        assert!(matches!(
            workflow.cancel(id, Actor::Patient(patient.id)).await,
            Err(ClinicError::CannotCancelCompleted)
        ));

        let stored = workflow.appointment(id).await?;
        assert_eq!(stored.status, AppointmentStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_restores_slot_and_fails_electronic_payment() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00", "10:30"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let booking = workflow
            .book(request(doctor.id, patient.id, "10:30", PaymentMethod::Electronic))
            .await?;
        let id = booking.appointment.id;

        let cancelled = workflow.cancel(id, Actor::Patient(patient.id)).await?;
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Failed);

        let ledger = accounts::doctor_ledger(&db.pool, doctor.id).await?;
        let mut times = ledger.times_for(june_first()).unwrap().to_vec();
        times.sort();
        assert_eq!(times, ["10:00", "10:30"]);

        let payment = workflow.payment_for(id).await?;
        assert_eq!(payment.status, PaymentRecordStatus::Failed);

        assert!(matches!(
            workflow.cancel(id, Actor::Patient(patient.id)).await,
            Err(ClinicError::AlreadyCancelled)
        ));
        assert!(matches!(
            workflow.advance(id, doctor.id).await,
            Err(ClinicError::AppointmentCancelled)
        ));

        // O horário liberado pode ser agendado de novo
        let rebooked = workflow
            .book(request(doctor.id, patient.id, "10:30", PaymentMethod::Cash))
            .await?;
        assert_eq!(rebooked.appointment.status, AppointmentStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_cash_keeps_payment_pending() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["09:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let booking = workflow
            .book(request(doctor.id, patient.id, "09:00", PaymentMethod::Cash))
            .await?;
        workflow.advance(booking.appointment.id, doctor.id).await?;

        let cancelled = workflow
            .cancel(booking.appointment.id, Actor::Doctor(doctor.id))
            .await?;
        assert_eq!(cancelled.payment_status, PaymentStatus::Pending);

        let payment = workflow.payment_for(booking.appointment.id).await?;
        assert_eq!(payment.status, PaymentRecordStatus::Created);
        Ok(())
    }

    #[tokio::test]
    async fn test_booking_preconditions_leave_state_untouched() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let unknown_doctor = workflow
            .book(request(Uuid::new_v4(), patient.id, "10:00", PaymentMethod::Cash))
            .await;
        assert!(matches!(unknown_doctor, Err(ClinicError::NotFound(_))));

        let unknown_patient = workflow
            .book(request(doctor.id, Uuid::new_v4(), "10:00", PaymentMethod::Cash))
            .await;
        assert!(matches!(unknown_patient, Err(ClinicError::NotFound(_))));

        let missing_slot = workflow
            .book(request(doctor.id, patient.id, "18:00", PaymentMethod::Cash))
            .await;
        assert!(matches!(missing_slot, Err(ClinicError::SlotUnavailable)));

        accounts::toggle_doctor_approval(&db.pool, doctor.id).await?;
        let unapproved = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Cash))
            .await;
        assert!(matches!(unapproved, Err(ClinicError::NotFound(_))));

        let ledger = accounts::doctor_ledger(&db.pool, doctor.id).await?;
        assert_eq!(ledger.times_for(june_first()).unwrap(), ["10:00"]);
        assert!(workflow.all_appointments().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_booking_of_same_slot_fails() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Cash))
            .await?;
        let second = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Cash))
            .await;
        assert!(matches!(second, Err(ClinicError::SlotUnavailable)));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_bookings_only_one_wins() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00"]).await?;
        let (_, first) = db.patient("a@example.com").await?;
        let (_, second) = db.patient("b@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let (a, b) = tokio::join!(
            workflow.book(request(doctor.id, first.id, "10:00", PaymentMethod::Cash)),
            workflow.book(request(doctor.id, second.id, "10:00", PaymentMethod::Cash)),
        );

        let outcomes = [a, b];
        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for outcome in &outcomes {
            if let Err(e) = outcome {
                assert!(
                    matches!(e, ClinicError::SlotUnavailable | ClinicError::DuplicateBooking),
                    "erro inesperado: {e}"
                );
            }
        }

        assert_eq!(workflow.doctor_appointments(doctor.id, None).await?.len(), 1);
        let ledger = accounts::doctor_ledger(&db.pool, doctor.id).await?;
        assert!(ledger.times_for(june_first()).unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_fee_is_snapshotted() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let booking = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Cash))
            .await?;
        accounts::update_doctor_profile(
            &db.pool,
            doctor.id,
            DoctorProfileChanges {
                consultation_fee: Some(doctor.consultation_fee * 2),
                ..Default::default()
            },
        )
        .await?;

        let stored = workflow.appointment(booking.appointment.id).await?;
        assert_eq!(stored.consultation_fee, doctor.consultation_fee);
        assert_eq!(workflow.payment_for(stored.id).await?.amount, doctor.consultation_fee);
        Ok(())
    }

    #[tokio::test]
    async fn test_actor_must_own_appointment() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00"]).await?;
        let other_doctor = db.doctor_with_slots("outro@example.com", june_first(), &["10:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let (_, stranger) = db.patient("x@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let booking = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Cash))
            .await?;
        let id = booking.appointment.id;

        assert!(matches!(
            workflow.advance(id, other_doctor.id).await,
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(
            workflow.cancel(id, Actor::Patient(stranger.id)).await,
            Err(ClinicError::NotFound(_))
        ));

        let cancelled = workflow.cancel(id, Actor::Admin).await?;
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn test_gateway_result_updates_payment() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00", "11:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let electronic = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Electronic))
            .await?;
        let payment = workflow
            .record_gateway_result(
                electronic.appointment.id,
                patient.id,
                GatewayResult {
                    order_id: "order_123".to_string(),
                    payment_id: Some("pay_456".to_string()),
                    succeeded: true,
                },
            )
            .await?;
        assert_eq!(payment.status, PaymentRecordStatus::Success);
        assert_eq!(payment.gateway_order_id.as_deref(), Some("order_123"));

        let stored = workflow.appointment(electronic.appointment.id).await?;
        assert_eq!(stored.payment_status, PaymentStatus::Paid);

        let cash = workflow
            .book(request(doctor.id, patient.id, "11:00", PaymentMethod::Cash))
            .await?;
        let rejected = workflow
            .record_gateway_result(
                cash.appointment.id,
                patient.id,
                GatewayResult {
                    order_id: "order_789".to_string(),
                    payment_id: None,
                    succeeded: true,
                },
            )
            .await;
        assert!(matches!(rejected, Err(ClinicError::Validation(_))));

        let history = workflow.patient_payments(patient.id).await?;
        assert_eq!(history.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_upcoming_excludes_cancelled() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00", "11:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let kept = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Cash))
            .await?;
        let dropped = workflow
            .book(request(doctor.id, patient.id, "11:00", PaymentMethod::Cash))
            .await?;
        workflow
            .cancel(dropped.appointment.id, Actor::Patient(patient.id))
            .await?;

        let upcoming = workflow
            .doctor_appointments(doctor.id, Some(june_first()))
            .await?;
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, kept.appointment.id);

        let later = workflow
            .doctor_appointments(doctor.id, june_first().succ_opt())
            .await?;
        assert!(later.is_empty());

        assert_eq!(workflow.patient_appointments(patient.id).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_doctor_cascades() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let booking = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Cash))
            .await?;
        accounts::delete_doctor(&db.pool, doctor.id).await?;

        assert!(matches!(
            workflow.appointment(booking.appointment.id).await,
            Err(ClinicError::NotFound(_))
        ));
        assert!(workflow.patient_payments(patient.id).await?.is_empty());
        assert!(accounts::list_doctors(&db.pool, false).await?.is_empty());
        Ok(())
    }

    fn gateway(order_id: &str, succeeded: bool) -> GatewayResult {
        GatewayResult {
            order_id: order_id.to_string(),
            payment_id: Some(format!("pay_{}", order_id)),
            succeeded,
        }
    }

    #[tokio::test]
    async fn test_gateway_result_is_final() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00", "11:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let paid = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Electronic))
            .await?;
        let id = paid.appointment.id;
        workflow
            .record_gateway_result(id, patient.id, gateway("o1", true))
            .await?;

        assert!(matches!(
            workflow
                .record_gateway_result(id, patient.id, gateway("o2", false))
                .await,
            Err(ClinicError::PaymentAlreadySettled)
        ));

        workflow.advance(id, doctor.id).await?;
        workflow.advance(id, doctor.id).await?;
        assert!(matches!(
            workflow
                .record_gateway_result(id, patient.id, gateway("o3", false))
                .await,
            Err(ClinicError::AlreadyCompleted)
        ));

        let stored = workflow.appointment(id).await?;
        assert_eq!(stored.status, AppointmentStatus::Completed);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        let payment = workflow.payment_for(id).await?;
        assert_eq!(payment.status, PaymentRecordStatus::Success);
        assert_eq!(payment.gateway_order_id.as_deref(), Some("o1"));

        // Uma falha também encerra o pagamento
        let failed = workflow
            .book(request(doctor.id, patient.id, "11:00", PaymentMethod::Electronic))
            .await?;
        workflow
            .record_gateway_result(failed.appointment.id, patient.id, gateway("o4", false))
            .await?;
        assert!(matches!(
            workflow
                .record_gateway_result(failed.appointment.id, patient.id, gateway("o5", true))
                .await,
            Err(ClinicError::PaymentAlreadySettled)
        ));
        assert_eq!(
            workflow.appointment(failed.appointment.id).await?.payment_status,
            PaymentStatus::Failed
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_confirmed_electronic_fails_payment() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let booking = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Electronic))
            .await?;
        let id = booking.appointment.id;
        let confirmed = workflow.advance(id, doctor.id).await?;
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        let cancelled = workflow.cancel(id, Actor::Doctor(doctor.id)).await?;
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Failed);
        assert_eq!(workflow.payment_for(id).await?.status, PaymentRecordStatus::Failed);

        let ledger = accounts::doctor_ledger(&db.pool, doctor.id).await?;
        assert_eq!(ledger.times_for(june_first()).unwrap(), ["10:00"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_after_gateway_success_fails_payment() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00"]).await?;
        let (_, patient) = db.patient("pac@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        let booking = workflow
            .book(request(doctor.id, patient.id, "10:00", PaymentMethod::Electronic))
            .await?;
        let id = booking.appointment.id;
        workflow
            .record_gateway_result(id, patient.id, gateway("o1", true))
            .await?;
        assert_eq!(workflow.appointment(id).await?.payment_status, PaymentStatus::Paid);

        let cancelled = workflow.cancel(id, Actor::Patient(patient.id)).await?;
        assert_eq!(cancelled.payment_status, PaymentStatus::Failed);

        let payment = workflow.payment_for(id).await?;
        assert_eq!(payment.status, PaymentRecordStatus::Failed);
        assert_eq!(payment.gateway_order_id.as_deref(), Some("o1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_patient_returns_open_slots() -> anyhow::Result<()> {
        let db = TestDb::new().await?;
        let doctor = db.doctor_with_slots("dr@example.com", june_first(), &["10:00", "10:30"]).await?;
        let (_, leaving) = db.patient("sai@example.com").await?;
        let (_, staying) = db.patient("fica@example.com").await?;
        let workflow = AppointmentWorkflow::new(db.pool.clone());

        workflow
            .book(request(doctor.id, leaving.id, "10:00", PaymentMethod::Cash))
            .await?;
        let electronic = workflow
            .book(request(doctor.id, leaving.id, "10:30", PaymentMethod::Electronic))
            .await?;
        accounts::delete_patient(&db.pool, leaving.id).await?;

        let ledger = accounts::doctor_ledger(&db.pool, doctor.id).await?;
        let mut times = ledger.times_for(june_first()).unwrap().to_vec();
        times.sort();
        assert_eq!(times, ["10:00", "10:30"]);

        let payment_status: String =
            sqlx::query_scalar("SELECT status FROM payments WHERE appointment_id = ?")
                .bind(electronic.appointment.id)
                .fetch_one(&db.pool)
                .await?;
        assert_eq!(payment_status, "failed");

        let rebooked = workflow
            .book(request(doctor.id, staying.id, "10:00", PaymentMethod::Cash))
            .await?;
        assert_eq!(rebooked.appointment.status, AppointmentStatus::Pending);
        Ok(())
    }
}
