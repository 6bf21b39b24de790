//! Contas de acesso e perfis de médicos e pacientes
//!
//! Criação de contas, autenticação por senha, manutenção dos perfis, agenda
//! de horários dos médicos e exclusão lógica em cascata.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{NaiveDate, Utc};
use rand::rngs::OsRng;
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ClinicError, DbError};
use crate::ledger::AvailabilityLedger;
use crate::models::{
    Appointment, AppointmentStatus, DoctorProfile, DoctorSummary, Gender, PatientProfile,
    PatientSummary, PaymentMethod, PaymentRecordStatus, PaymentStatus, Profile, Role, User,
};

/// Dados para criar uma conta
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

/// Dados para o administrador cadastrar um médico
#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub account: NewAccount,
    pub specialization: String,
    pub experience: i64,
    pub bio: Option<String>,
    pub consultation_fee: i64,
    pub approved: bool,
}

/// Alterações parciais do perfil de médico; `None` mantém o valor atual
#[derive(Debug, Clone, Default)]
pub struct DoctorProfileChanges {
    pub specialization: Option<String>,
    pub experience: Option<i64>,
    pub bio: Option<String>,
    pub consultation_fee: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct PatientProfileChanges {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub medical_history: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String, ClinicError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ClinicError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, ClinicError> {
    let parsed =
        PasswordHash::new(password_hash).map_err(|e| ClinicError::PasswordHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ClinicError::PasswordHash(e.to_string())),
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Violação de unicidade na tabela de usuários só pode ser o e-mail
fn email_conflict(error: sqlx::Error) -> ClinicError {
    match DbError::from(error) {
        DbError::ConstraintViolation(_) => ClinicError::EmailTaken,
        other => other.into(),
    }
}

async fn insert_user(
    conn: &mut SqliteConnection,
    account: &NewAccount,
    role: Role,
) -> Result<User, ClinicError> {
    if account.name.trim().is_empty() || account.email.trim().is_empty() {
        return Err(ClinicError::Validation(
            "nome e e-mail são obrigatórios".to_string(),
        ));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: account.name.trim().to_string(),
        email: normalize_email(&account.email),
        password_hash: hash_password(&account.password)?,
        phone: account.phone.clone(),
        role,
        is_active: true,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, phone, role, is_active, is_deleted, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 1, 0, ?, ?)",
    )
    .bind(user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.phone)
    .bind(role.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(email_conflict)?;

    Ok(user)
}

/// Cadastra um paciente com perfil vazio
pub async fn register_patient(
    pool: &SqlitePool,
    account: NewAccount,
) -> Result<(User, PatientProfile), ClinicError> {
    let mut tx = pool.begin().await?;
    let user = insert_user(&mut tx, &account, Role::Patient).await?;

    let now = Utc::now();
    let profile = PatientProfile {
        id: Uuid::new_v4(),
        user_id: user.id,
        date_of_birth: None,
        gender: None,
        address: None,
        medical_history: None,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO patients (id, user_id, is_deleted, created_at, updated_at) VALUES (?, ?, 0, ?, ?)",
    )
    .bind(profile.id)
    .bind(user.id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Paciente cadastrado: {}", user.id);
    Ok((user, profile))
}

/// Cadastra um médico (conta + perfil)
pub async fn create_doctor(pool: &SqlitePool, new: NewDoctor) -> Result<DoctorSummary, ClinicError> {
    if new.specialization.trim().is_empty() {
        return Err(ClinicError::Validation(
            "especialidade é obrigatória".to_string(),
        ));
    }
    if new.consultation_fee < 0 || new.experience < 0 {
        return Err(ClinicError::Validation(
            "valor da consulta e experiência não podem ser negativos".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    let user = insert_user(&mut tx, &new.account, Role::Doctor).await?;

    let now = Utc::now();
    let profile = DoctorProfile {
        id: Uuid::new_v4(),
        user_id: user.id,
        specialization: new.specialization.trim().to_string(),
        experience: new.experience,
        bio: new.bio,
        consultation_fee: new.consultation_fee,
        available_slots: AvailabilityLedger::new(),
        is_approved: new.approved,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO doctors (id, user_id, specialization, experience, bio, consultation_fee, available_slots, is_approved, is_deleted, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(profile.id)
    .bind(user.id)
    .bind(&profile.specialization)
    .bind(profile.experience)
    .bind(&profile.bio)
    .bind(profile.consultation_fee)
    .bind(Json(&profile.available_slots))
    .bind(profile.is_approved)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Médico cadastrado: {} ({})", profile.id, profile.specialization);

    Ok(DoctorSummary {
        name: user.name,
        email: user.email,
        phone: user.phone,
        profile,
    })
}

/// Garante a existência da conta de administrador inicial
pub async fn ensure_admin(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
) -> Result<User, ClinicError> {
    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?;

    match existing {
        Some(user) if user.role == Role::Admin => Ok(user),
        Some(_) => Err(ClinicError::EmailTaken),
        None => {
            let account = NewAccount {
                name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                phone: None,
            };
            let mut conn = pool.acquire().await?;
            let user = insert_user(&mut conn, &account, Role::Admin).await?;
            info!("Conta de administrador criada: {}", user.email);
            Ok(user)
        }
    }
}

/// Valida e-mail e senha, devolvendo a conta
pub async fn authenticate(pool: &SqlitePool, email: &str, password: &str) -> Result<User, ClinicError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?
        .ok_or(ClinicError::InvalidCredentials)?;

    if !user.is_active || user.is_deleted {
        warn!("Tentativa de login em conta inativa: {}", user.id);
        return Err(ClinicError::AccountInactive);
    }

    if !verify_password(password, &user.password_hash)? {
        return Err(ClinicError::InvalidCredentials);
    }

    Ok(user)
}

pub async fn find_user(pool: &SqlitePool, user_id: Uuid) -> Result<User, ClinicError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ? AND is_deleted = 0")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ClinicError::not_found("Usuário"))
}

/// Perfil da conta conforme o papel
pub async fn load_profile(pool: &SqlitePool, user: &User) -> Result<Profile, ClinicError> {
    match user.role {
        Role::Patient => patient_for_user(pool, user.id).await.map(Profile::Patient),
        Role::Doctor => doctor_for_user(pool, user.id).await.map(Profile::Doctor),
        Role::Admin => Ok(Profile::Admin),
    }
}

pub async fn doctor_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<DoctorProfile, ClinicError> {
    debug!("Buscando perfil de médico do usuário {}", user_id);
    sqlx::query_as::<_, DoctorProfile>(
        "SELECT * FROM doctors WHERE user_id = ? AND is_deleted = 0",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ClinicError::not_found("Perfil de médico"))
}

pub async fn patient_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<PatientProfile, ClinicError> {
    debug!("Buscando perfil de paciente do usuário {}", user_id);
    sqlx::query_as::<_, PatientProfile>(
        "SELECT * FROM patients WHERE user_id = ? AND is_deleted = 0",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ClinicError::not_found("Perfil de paciente"))
}

pub async fn find_doctor(pool: &SqlitePool, doctor_id: Uuid) -> Result<DoctorProfile, ClinicError> {
    sqlx::query_as::<_, DoctorProfile>("SELECT * FROM doctors WHERE id = ? AND is_deleted = 0")
        .bind(doctor_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ClinicError::not_found("Médico"))
}

pub async fn list_doctors(pool: &SqlitePool, approved_only: bool) -> Result<Vec<DoctorSummary>, ClinicError> {
    let doctors = sqlx::query_as::<_, DoctorSummary>(
        "SELECT d.*, u.name, u.email, u.phone
         FROM doctors d JOIN users u ON u.id = d.user_id
         WHERE d.is_deleted = 0 AND (d.is_approved = 1 OR ? = 0)
         ORDER BY u.name",
    )
    .bind(approved_only)
    .fetch_all(pool)
    .await?;
    Ok(doctors)
}

pub async fn list_patients(pool: &SqlitePool) -> Result<Vec<PatientSummary>, ClinicError> {
    let patients = sqlx::query_as::<_, PatientSummary>(
        "SELECT p.*, u.name, u.email, u.phone
         FROM patients p JOIN users u ON u.id = p.user_id
         WHERE p.is_deleted = 0
         ORDER BY u.name",
    )
    .fetch_all(pool)
    .await?;
    Ok(patients)
}

/// Marca a linha do médico como alterada. Sendo a primeira escrita da
/// transação, garante o lock de escrita antes de qualquer leitura.
pub(crate) async fn lock_doctor(conn: &mut SqliteConnection, doctor_id: Uuid) -> Result<(), ClinicError> {
    let result = sqlx::query("UPDATE doctors SET updated_at = ? WHERE id = ? AND is_deleted = 0")
        .bind(Utc::now())
        .bind(doctor_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ClinicError::not_found("Médico"));
    }
    Ok(())
}

pub(crate) async fn read_ledger(
    conn: &mut SqliteConnection,
    doctor_id: Uuid,
) -> Result<AvailabilityLedger, ClinicError> {
    let Json(ledger): Json<AvailabilityLedger> =
        sqlx::query_scalar("SELECT available_slots FROM doctors WHERE id = ?")
            .bind(doctor_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ClinicError::not_found("Médico"))?;
    Ok(ledger)
}

pub(crate) async fn write_ledger(
    conn: &mut SqliteConnection,
    doctor_id: Uuid,
    ledger: &AvailabilityLedger,
) -> Result<(), ClinicError> {
    sqlx::query("UPDATE doctors SET available_slots = ?, updated_at = ? WHERE id = ?")
        .bind(Json(ledger))
        .bind(Utc::now())
        .bind(doctor_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn doctor_ledger(pool: &SqlitePool, doctor_id: Uuid) -> Result<AvailabilityLedger, ClinicError> {
    find_doctor(pool, doctor_id)
        .await
        .map(|doctor| doctor.available_slots)
}

/// Abre novos horários na agenda do médico
pub async fn add_doctor_slots(
    pool: &SqlitePool,
    doctor_id: Uuid,
    date: NaiveDate,
    labels: &[String],
) -> Result<AvailabilityLedger, ClinicError> {
    let labels: Vec<&str> = labels
        .iter()
        .map(|label| label.trim())
        .filter(|label| !label.is_empty())
        .collect();
    if labels.is_empty() {
        return Err(ClinicError::Validation(
            "informe ao menos um horário".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    lock_doctor(&mut tx, doctor_id).await?;

    let mut ledger = read_ledger(&mut tx, doctor_id).await?;
    ledger.add_slots(date, labels);
    write_ledger(&mut tx, doctor_id, &ledger).await?;

    tx.commit().await?;
    info!("Horários adicionados para o médico {} em {}", doctor_id, date);
    Ok(ledger)
}

pub async fn toggle_doctor_approval(pool: &SqlitePool, doctor_id: Uuid) -> Result<DoctorProfile, ClinicError> {
    let result = sqlx::query(
        "UPDATE doctors SET is_approved = NOT is_approved, updated_at = ? WHERE id = ? AND is_deleted = 0",
    )
    .bind(Utc::now())
    .bind(doctor_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ClinicError::not_found("Médico"));
    }

    let doctor = find_doctor(pool, doctor_id).await?;
    info!("Aprovação do médico {} alterada para {}", doctor_id, doctor.is_approved);
    Ok(doctor)
}

/// Atualiza o perfil do médico. Consultas já agendadas mantêm o valor antigo.
pub async fn update_doctor_profile(
    pool: &SqlitePool,
    doctor_id: Uuid,
    changes: DoctorProfileChanges,
) -> Result<DoctorProfile, ClinicError> {
    if changes.consultation_fee.map_or(false, |fee| fee < 0)
        || changes.experience.map_or(false, |years| years < 0)
    {
        return Err(ClinicError::Validation(
            "valor da consulta e experiência não podem ser negativos".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE doctors SET
            specialization = COALESCE(?, specialization),
            experience = COALESCE(?, experience),
            bio = COALESCE(?, bio),
            consultation_fee = COALESCE(?, consultation_fee),
            updated_at = ?
         WHERE id = ? AND is_deleted = 0",
    )
    .bind(changes.specialization)
    .bind(changes.experience)
    .bind(changes.bio)
    .bind(changes.consultation_fee)
    .bind(Utc::now())
    .bind(doctor_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ClinicError::not_found("Médico"));
    }
    find_doctor(pool, doctor_id).await
}

pub async fn update_patient_profile(
    pool: &SqlitePool,
    patient_id: Uuid,
    changes: PatientProfileChanges,
) -> Result<PatientProfile, ClinicError> {
    let result = sqlx::query(
        "UPDATE patients SET
            date_of_birth = COALESCE(?, date_of_birth),
            gender = COALESCE(?, gender),
            address = COALESCE(?, address),
            medical_history = COALESCE(?, medical_history),
            updated_at = ?
         WHERE id = ? AND is_deleted = 0",
    )
    .bind(changes.date_of_birth)
    .bind(changes.gender.map(|g| g.as_str()))
    .bind(changes.address)
    .bind(changes.medical_history)
    .bind(Utc::now())
    .bind(patient_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ClinicError::not_found("Paciente"));
    }

    sqlx::query_as::<_, PatientProfile>("SELECT * FROM patients WHERE id = ?")
        .bind(patient_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
}

/// Exclusão lógica do médico, da conta e de suas consultas e pagamentos
pub async fn delete_doctor(pool: &SqlitePool, doctor_id: Uuid) -> Result<(), ClinicError> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let user_id: Uuid = sqlx::query_scalar(
        "UPDATE doctors SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0 RETURNING user_id",
    )
    .bind(now)
    .bind(doctor_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ClinicError::not_found("Médico"))?;

    cascade_soft_delete(&mut tx, user_id, "doctor_id", doctor_id).await?;

    tx.commit().await?;
    info!("Médico {} excluído", doctor_id);
    Ok(())
}

/// Exclusão lógica do paciente, da conta e de suas consultas e pagamentos
pub async fn delete_patient(pool: &SqlitePool, patient_id: Uuid) -> Result<(), ClinicError> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let user_id: Uuid = sqlx::query_scalar(
        "UPDATE patients SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0 RETURNING user_id",
    )
    .bind(now)
    .bind(patient_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ClinicError::not_found("Paciente"))?;

    cascade_soft_delete(&mut tx, user_id, "patient_id", patient_id).await?;

    tx.commit().await?;
    info!("Paciente {} excluído", patient_id);
    Ok(())
}

/// `owner_column` é sempre um nome fixo ("doctor_id" ou "patient_id")
async fn cascade_soft_delete(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    owner_column: &'static str,
    owner_id: Uuid,
) -> Result<(), ClinicError> {
    let now = Utc::now();

    sqlx::query("UPDATE users SET is_deleted = 1, is_active = 0, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let released = release_open_appointments(conn, owner_column, owner_id).await?;

    let appointments = sqlx::query(&format!(
        "UPDATE appointments SET is_deleted = 1, updated_at = ? WHERE {owner_column} = ? AND is_deleted = 0"
    ))
    .bind(now)
    .bind(owner_id)
    .execute(&mut *conn)
    .await?;

    let payments = sqlx::query(&format!(
        "UPDATE payments SET is_deleted = 1, updated_at = ? WHERE {owner_column} = ? AND is_deleted = 0"
    ))
    .bind(now)
    .bind(owner_id)
    .execute(&mut *conn)
    .await?;

    debug!(
        "Exclusão em cascata: {} consultas ({} horários devolvidos), {} pagamentos",
        appointments.rows_affected(),
        released,
        payments.rows_affected()
    );
    Ok(())
}

/// Cancela as consultas em aberto do titular como `cancel` faria: o horário
/// volta à agenda do médico e o pagamento eletrônico passa a `failed`.
async fn release_open_appointments(
    conn: &mut SqliteConnection,
    owner_column: &'static str,
    owner_id: Uuid,
) -> Result<usize, ClinicError> {
    let open = sqlx::query_as::<_, Appointment>(&format!(
        "SELECT * FROM appointments
         WHERE {owner_column} = ? AND is_deleted = 0 AND status IN ('pending', 'confirmed')"
    ))
    .bind(owner_id)
    .fetch_all(&mut *conn)
    .await?;

    let now = Utc::now();
    for appointment in &open {
        let mut ledger = read_ledger(conn, appointment.doctor_id).await?;
        ledger.release(appointment.appointment_date, &appointment.time_slot);
        write_ledger(conn, appointment.doctor_id, &ledger).await?;

        let payment_status = if appointment.payment_method == PaymentMethod::Electronic {
            sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE appointment_id = ?")
                .bind(PaymentRecordStatus::Failed.as_str())
                .bind(now)
                .bind(appointment.id)
                .execute(&mut *conn)
                .await?;
            PaymentStatus::Failed
        } else {
            appointment.payment_status
        };

        sqlx::query(
            "UPDATE appointments SET status = ?, payment_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(AppointmentStatus::Cancelled.as_str())
        .bind(payment_status.as_str())
        .bind(now)
        .bind(appointment.id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(open.len())
}
