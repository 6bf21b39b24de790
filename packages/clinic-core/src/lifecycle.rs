//! Máquina de estados das consultas
//!
//! `pending -> confirmed -> completed`, com cancelamento possível antes da
//! conclusão. `completed` e `cancelled` são terminais.

use tracing::{debug, warn};

use crate::error::ClinicError;
use crate::models::AppointmentStatus;

/// Próximo status ao avançar a consulta
pub fn next_on_advance(current: AppointmentStatus) -> Result<AppointmentStatus, ClinicError> {
    let next = match current {
        AppointmentStatus::Pending => Ok(AppointmentStatus::Confirmed),
        AppointmentStatus::Confirmed => Ok(AppointmentStatus::Completed),
        AppointmentStatus::Completed => Err(ClinicError::AlreadyCompleted),
        AppointmentStatus::Cancelled => Err(ClinicError::AppointmentCancelled),
    };

    match &next {
        Ok(status) => debug!("Transição de status: {} -> {}", current, status),
        Err(e) => warn!("Transição inválida a partir de {}: {}", current, e),
    }
    next
}

/// Verifica se a consulta ainda pode ser cancelada
pub fn ensure_cancellable(current: AppointmentStatus) -> Result<(), ClinicError> {
    match current {
        AppointmentStatus::Pending | AppointmentStatus::Confirmed => Ok(()),
        AppointmentStatus::Completed => Err(ClinicError::CannotCancelCompleted),
        AppointmentStatus::Cancelled => Err(ClinicError::AlreadyCancelled),
    }
}
