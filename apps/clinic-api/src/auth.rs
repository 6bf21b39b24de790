//! Tokens de sessão (JWT HS256) e extração do chamador autenticado

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use clinic_core::accounts;
use clinic_core::models::{Role, User};
use clinic_core::ErrorCategory;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::AppState;

/// Claims gravadas no token de sessão
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Id da conta
    pub sub: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

pub fn issue_token(config: &AppConfig, user: &User) -> Result<String, ApiError> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(config.token_ttl_hours);
    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role,
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Falha ao gerar token: {}", e)))
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("Token rejeitado: {}", e);
        ApiError::Unauthorized
    })
}

/// Chamador autenticado de uma requisição protegida
#[derive(Debug, Clone, Copy)]
pub struct CallerContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl CallerContext {
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "operação restrita ao papel {}",
                role
            )))
        }
    }

    /// Id do perfil de paciente do chamador
    pub async fn patient_id(&self, pool: &SqlitePool) -> Result<Uuid, ApiError> {
        self.require(Role::Patient)?;
        Ok(accounts::patient_for_user(pool, self.user_id).await?.id)
    }

    /// Id do perfil de médico do chamador
    pub async fn doctor_id(&self, pool: &SqlitePool) -> Result<Uuid, ApiError> {
        self.require(Role::Doctor)?;
        Ok(accounts::doctor_for_user(pool, self.user_id).await?.id)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CallerContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let claims = validate_token(&state.config.jwt_secret, token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;

        // Contas excluídas ou desativadas perdem o acesso mesmo com token válido
        let user = match accounts::find_user(&state.pool, user_id).await {
            Ok(user) => user,
            Err(err) if err.category() == ErrorCategory::NotFound => {
                return Err(ApiError::Unauthorized)
            }
            Err(err) => return Err(err.into()),
        };
        if !user.is_active || user.role != claims.role {
            return Err(ApiError::Unauthorized);
        }

        Ok(CallerContext {
            user_id,
            role: user.role,
        })
    }
}
