//! Erros da API com respostas JSON estruturadas

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clinic_core::{ClinicError, ErrorCategory};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// Erros da camada HTTP com mapeamento para status
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Autenticação necessária")]
    Unauthorized,
    #[error("Acesso negado: {0}")]
    Forbidden(String),
    #[error("Requisição inválida: {0}")]
    BadRequest(String),
    #[error("Erro interno: {0}")]
    Internal(String),
    #[error(transparent)]
    Clinic(#[from] ClinicError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Autenticação necessária".to_string(),
            ),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "Erro interno da API");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Ocorreu um erro interno".to_string(),
                )
            }
            ApiError::Clinic(err) => clinic_parts(err),
        }
    }
}

fn clinic_parts(err: &ClinicError) -> (StatusCode, &'static str, String) {
    let code = match err {
        ClinicError::NotFound(_) => "NOT_FOUND",
        // O cliente vê a corrida perdida como horário indisponível
        ClinicError::SlotUnavailable | ClinicError::DuplicateBooking => "SLOT_UNAVAILABLE",
        ClinicError::AlreadyCompleted => "ALREADY_COMPLETED",
        ClinicError::AppointmentCancelled => "APPOINTMENT_CANCELLED",
        ClinicError::CannotCancelCompleted => "CANNOT_CANCEL_COMPLETED",
        ClinicError::AlreadyCancelled => "ALREADY_CANCELLED",
        ClinicError::PaymentAlreadySettled => "PAYMENT_SETTLED",
        ClinicError::EmailTaken => "EMAIL_TAKEN",
        ClinicError::Validation(_) => "VALIDATION",
        ClinicError::InvalidCredentials => "INVALID_CREDENTIALS",
        ClinicError::AccountInactive => "ACCOUNT_INACTIVE",
        ClinicError::PasswordHash(_) | ClinicError::Database(_) => "INTERNAL",
    };

    let message = match err {
        ClinicError::DuplicateBooking => ClinicError::SlotUnavailable.to_string(),
        other => other.to_string(),
    };

    match err.category() {
        ErrorCategory::NotFound => (StatusCode::NOT_FOUND, code, message),
        ErrorCategory::Conflict => (StatusCode::CONFLICT, code, message),
        ErrorCategory::Validation => (StatusCode::BAD_REQUEST, code, message),
        ErrorCategory::Unauthorized => (StatusCode::UNAUTHORIZED, code, message),
        ErrorCategory::Forbidden => (StatusCode::FORBIDDEN, code, message),
        ErrorCategory::Internal => {
            tracing::error!(error = %err, "Falha interna no fluxo de agendamento");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "Ocorreu um erro interno".to_string(),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ErrorBody {
            success: false,
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Clinic(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::DbError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_returns_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn test_duplicate_booking_looks_like_slot_unavailable() {
        let response = ApiError::from(ClinicError::DuplicateBooking).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "SLOT_UNAVAILABLE");
        assert_eq!(json["error"]["message"], "Horário indisponível");
    }

    #[tokio::test]
    async fn test_transition_errors_return_409() {
        let response = ApiError::from(ClinicError::AlreadyCancelled).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "ALREADY_CANCELLED");
    }

    #[tokio::test]
    async fn test_not_found_returns_404() {
        let response = ApiError::from(ClinicError::not_found("Consulta")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "Entidade não encontrada: Consulta"
        );
    }

    #[tokio::test]
    async fn test_validation_returns_400() {
        let response =
            ApiError::from(ClinicError::Validation("horário é obrigatório".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_database_errors_hide_details() {
        let err = ClinicError::Database(DbError::QueryError("no such table: x".into()));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "Ocorreu um erro interno"
        );
    }
}
