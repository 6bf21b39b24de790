//! Modelos de dados compartilhados entre aplicações
//!
//! Este módulo define as estruturas de dados principais do agendamento da clínica

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::ledger::AvailabilityLedger;

/// Enum persistido como texto, com conversão nos dois sentidos
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!(
                        "Valor inválido para {}: {}",
                        stringify!($name),
                        s
                    )),
                }
            }
        }
    };
}

text_enum! {
    /// Papel de um usuário no sistema
    Role {
        Patient => "patient",
        Doctor => "doctor",
        Admin => "admin",
    }
}

text_enum! {
    Gender {
        Male => "male",
        Female => "female",
        Other => "other",
    }
}

text_enum! {
    /// Status possíveis de uma consulta
    AppointmentStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Situação do pagamento vista pela consulta
    PaymentStatus {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
    }
}

text_enum! {
    /// Forma de pagamento escolhida no agendamento
    PaymentMethod {
        Cash => "cash",
        Electronic => "electronic",
    }
}

text_enum! {
    /// Status do registro de pagamento
    PaymentRecordStatus {
        Created => "created",
        Success => "success",
        Failed => "failed",
    }
}

/// Lê uma coluna de texto e converte para um dos enums acima
fn parse_column<T>(row: &SqliteRow, column: &str) -> sqlx::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
    })
}

fn parse_optional_column<T>(row: &SqliteRow, column: &str) -> sqlx::Result<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    match row.try_get::<Option<String>, _>(column)? {
        Some(_) => parse_column(row, column).map(Some),
        None => Ok(None),
    }
}

/// Conta de acesso
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Hash Argon2id no formato PHC
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            phone: row.try_get("phone")?,
            role: parse_column(row, "role")?,
            is_active: row.try_get("is_active")?,
            is_deleted: row.try_get("is_deleted")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Perfil de médico, um para um com um usuário de papel `doctor`
#[derive(Debug, Clone, Serialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialization: String,
    /// Anos de experiência
    pub experience: i64,
    pub bio: Option<String>,
    /// Valor da consulta em centavos
    pub consultation_fee: i64,
    pub available_slots: AvailabilityLedger,
    pub is_approved: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for DoctorProfile {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let Json(available_slots): Json<AvailabilityLedger> = row.try_get("available_slots")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            specialization: row.try_get("specialization")?,
            experience: row.try_get("experience")?,
            bio: row.try_get("bio")?,
            consultation_fee: row.try_get("consultation_fee")?,
            available_slots,
            is_approved: row.try_get("is_approved")?,
            is_deleted: row.try_get("is_deleted")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Médico com os dados de contato do usuário, para listagens
#[derive(Debug, Clone, Serialize)]
pub struct DoctorSummary {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(flatten)]
    pub profile: DoctorProfile,
}

impl FromRow<'_, SqliteRow> for DoctorSummary {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            profile: DoctorProfile::from_row(row)?,
        })
    }
}

/// Perfil de paciente, um para um com um usuário de papel `patient`
#[derive(Debug, Clone, Serialize)]
pub struct PatientProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub medical_history: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for PatientProfile {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            date_of_birth: row.try_get("date_of_birth")?,
            gender: parse_optional_column(row, "gender")?,
            address: row.try_get("address")?,
            medical_history: row.try_get("medical_history")?,
            is_deleted: row.try_get("is_deleted")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(flatten)]
    pub profile: PatientProfile,
}

impl FromRow<'_, SqliteRow> for PatientSummary {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            profile: PatientProfile::from_row(row)?,
        })
    }
}

/// Perfil associado a uma conta, conforme o papel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", content = "profile", rename_all = "snake_case")]
pub enum Profile {
    Patient(PatientProfile),
    Doctor(DoctorProfile),
    Admin,
}

/// Representa uma consulta agendada
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    /// Dia da consulta
    pub appointment_date: NaiveDate,
    /// Rótulo do horário, comparado por igualdade exata
    pub time_slot: String,
    /// Valor copiado do médico no momento do agendamento
    pub consultation_fee: i64,
    pub payment_method: PaymentMethod,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Appointment {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            doctor_id: row.try_get("doctor_id")?,
            patient_id: row.try_get("patient_id")?,
            appointment_date: row.try_get("appointment_date")?,
            time_slot: row.try_get("time_slot")?,
            consultation_fee: row.try_get("consultation_fee")?,
            payment_method: parse_column(row, "payment_method")?,
            status: parse_column(row, "status")?,
            payment_status: parse_column(row, "payment_status")?,
            notes: row.try_get("notes")?,
            is_deleted: row.try_get("is_deleted")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Registro financeiro, um para um com a consulta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub status: PaymentRecordStatus,
    /// Identificadores devolvidos pelo gateway (somente pagamento eletrônico)
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Payment {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            appointment_id: row.try_get("appointment_id")?,
            patient_id: row.try_get("patient_id")?,
            doctor_id: row.try_get("doctor_id")?,
            amount: row.try_get("amount")?,
            payment_method: parse_column(row, "payment_method")?,
            status: parse_column(row, "status")?,
            gateway_order_id: row.try_get("gateway_order_id")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
