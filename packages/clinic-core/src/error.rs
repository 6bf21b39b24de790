//! Definições de erro para a biblioteca clinic-core
//!
//! `DbError` cobre falhas do banco de dados; `ClinicError` é a taxonomia
//! vista pelos chamadores do fluxo de agendamento.

use thiserror::Error;

/// Códigos SQLite (e SQLSTATE genérico) de violação de unicidade/chave
const CONSTRAINT_CODES: &[&str] = &["23000", "1555", "2067"];

/// Erros específicos para operações de banco de dados
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Erro de conexão com banco de dados: {0}")]
    ConnectionError(String),

    #[error("Erro de migração: {0}")]
    MigrationError(String),

    #[error("Erro de consulta: {0}")]
    QueryError(String),

    #[error("Entidade não encontrada: {0}")]
    NotFound(String),

    #[error("Violação de restrição: {0}")]
    ConstraintViolation(String),

    #[error("Erro interno: {0}")]
    InternalError(String),
}

impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DbError::NotFound("registro".to_string()),
            sqlx::Error::Database(dbe) => match dbe.code() {
                Some(code) if CONSTRAINT_CODES.contains(&code.as_ref()) => {
                    DbError::ConstraintViolation(dbe.message().to_string())
                }
                _ => DbError::QueryError(dbe.message().to_string()),
            },
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => DbError::QueryError(error.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut => DbError::ConnectionError(error.to_string()),
            _ => DbError::InternalError(error.to_string()),
        }
    }
}

/// Categoria de um erro, usada na fronteira HTTP para escolher o status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Validation,
    Unauthorized,
    Forbidden,
    Internal,
}

/// Erros do fluxo de agendamento, contas e perfis
#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("Entidade não encontrada: {0}")]
    NotFound(String),

    #[error("Horário indisponível")]
    SlotUnavailable,

    #[error("Horário já reservado por outra consulta")]
    DuplicateBooking,

    #[error("Consulta já concluída")]
    AlreadyCompleted,

    #[error("Consulta cancelada não pode avançar")]
    AppointmentCancelled,

    #[error("Consulta concluída não pode ser cancelada")]
    CannotCancelCompleted,

    #[error("Consulta já cancelada")]
    AlreadyCancelled,

    #[error("Pagamento já liquidado")]
    PaymentAlreadySettled,

    #[error("E-mail já cadastrado")]
    EmailTaken,

    #[error("Dados inválidos: {0}")]
    Validation(String),

    #[error("E-mail ou senha inválidos")]
    InvalidCredentials,

    #[error("Conta inativa")]
    AccountInactive,

    #[error("Falha ao processar senha: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl ClinicError {
    pub fn not_found(entity: &str) -> Self {
        ClinicError::NotFound(entity.to_string())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ClinicError::NotFound(_) => ErrorCategory::NotFound,
            ClinicError::SlotUnavailable
            | ClinicError::DuplicateBooking
            | ClinicError::AlreadyCompleted
            | ClinicError::AppointmentCancelled
            | ClinicError::CannotCancelCompleted
            | ClinicError::AlreadyCancelled
            | ClinicError::PaymentAlreadySettled
            | ClinicError::EmailTaken => ErrorCategory::Conflict,
            ClinicError::Validation(_) => ErrorCategory::Validation,
            ClinicError::InvalidCredentials => ErrorCategory::Unauthorized,
            ClinicError::AccountInactive => ErrorCategory::Forbidden,
            ClinicError::PasswordHash(_) => ErrorCategory::Internal,
            ClinicError::Database(DbError::NotFound(_)) => ErrorCategory::NotFound,
            ClinicError::Database(_) => ErrorCategory::Internal,
        }
    }
}

impl From<sqlx::Error> for ClinicError {
    fn from(error: sqlx::Error) -> Self {
        ClinicError::Database(error.into())
    }
}
