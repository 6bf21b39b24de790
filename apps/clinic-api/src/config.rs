//! Configuração de inicialização do serviço
//!
//! Lida uma única vez das variáveis de ambiente `CLINIC_*` e repassada por
//! referência aos componentes que precisam dela.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use clinic_core::DbConfig;

/// Tamanho mínimo do segredo HS256
const MIN_SECRET_LEN: usize = 32;

/// Validade máxima de um token: 30 dias
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Conta de administrador criada na inicialização, se configurada
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub db: DbConfig,
    pub jwt_secret: String,
    /// Validade dos tokens emitidos no login
    pub token_ttl_hours: i64,
    /// Limite de requisições processadas simultaneamente
    pub max_concurrent_requests: usize,
    pub log_format: LogFormat,
    pub admin_bootstrap: Option<AdminBootstrap>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Monta a configuração a partir de uma função de busca de variáveis
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DbConfig::default();

        let bind_addr = lookup("CLINIC_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:5000".to_string())
            .parse::<SocketAddr>()
            .context("CLINIC_BIND_ADDR inválido")?;

        let jwt_secret = lookup("CLINIC_JWT_SECRET").context("CLINIC_JWT_SECRET não definido")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!(
                "CLINIC_JWT_SECRET deve ter ao menos {} bytes",
                MIN_SECRET_LEN
            );
        }

        let db = DbConfig {
            db_path: lookup("CLINIC_DB_PATH").unwrap_or(defaults.db_path),
            max_connections: parse_or("CLINIC_DB_MAX_CONNECTIONS", &lookup, defaults.max_connections)?,
            busy_timeout_secs: parse_or("CLINIC_DB_BUSY_TIMEOUT_SECS", &lookup, defaults.busy_timeout_secs)?,
        };

        let log_format = match lookup("CLINIC_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("CLINIC_LOG_FORMAT inválido: {}", other),
        };

        let admin_bootstrap = match (lookup("CLINIC_ADMIN_EMAIL"), lookup("CLINIC_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap {
                name: lookup("CLINIC_ADMIN_NAME").unwrap_or_else(|| "Administrador".to_string()),
                email,
                password,
            }),
            (None, None) => None,
            _ => bail!("CLINIC_ADMIN_EMAIL e CLINIC_ADMIN_PASSWORD devem ser definidos juntos"),
        };

        let token_ttl_hours: i64 = parse_or("CLINIC_TOKEN_TTL_HOURS", &lookup, 24)?;
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            bail!(
                "CLINIC_TOKEN_TTL_HOURS deve estar entre 1 e {}: {}",
                MAX_TOKEN_TTL_HOURS,
                token_ttl_hours
            );
        }

        Ok(Self {
            bind_addr,
            db,
            jwt_secret,
            token_ttl_hours,
            max_concurrent_requests: parse_or("CLINIC_MAX_CONCURRENT_REQUESTS", &lookup, 256)?,
            log_format,
            admin_bootstrap,
        })
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} inválido: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("CLINIC_JWT_SECRET", SECRET)]).unwrap();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.db.db_path, "data/clinic.db");
        assert_eq!(config.token_ttl_hours, 24);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.admin_bootstrap.is_none());
    }

    #[test]
    fn test_secret_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("CLINIC_JWT_SECRET", "curto")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("CLINIC_JWT_SECRET", SECRET),
            ("CLINIC_BIND_ADDR", "127.0.0.1:8080"),
            ("CLINIC_DB_MAX_CONNECTIONS", "9"),
            ("CLINIC_LOG_FORMAT", "json"),
            ("CLINIC_ADMIN_EMAIL", "admin@clinica.med.br"),
            ("CLINIC_ADMIN_PASSWORD", "admin-pass"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.db.max_connections, 9);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.admin_bootstrap.unwrap().name, "Administrador");
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let err = config_from(&[
            ("CLINIC_JWT_SECRET", SECRET),
            ("CLINIC_TOKEN_TTL_HOURS", "um dia"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("CLINIC_TOKEN_TTL_HOURS"));
    }

    #[test]
    fn test_token_ttl_must_be_in_range() {
        for ttl in ["0", "-5", "9999999999999"] {
            let err = config_from(&[
                ("CLINIC_JWT_SECRET", SECRET),
                ("CLINIC_TOKEN_TTL_HOURS", ttl),
            ])
            .unwrap_err();
            assert!(err.to_string().contains("CLINIC_TOKEN_TTL_HOURS"), "{ttl}");
        }

        let config = config_from(&[
            ("CLINIC_JWT_SECRET", SECRET),
            ("CLINIC_TOKEN_TTL_HOURS", "720"),
        ])
        .unwrap();
        assert_eq!(config.token_ttl_hours, 720);
    }

    #[test]
    fn test_admin_requires_both_fields() {
        assert!(config_from(&[
            ("CLINIC_JWT_SECRET", SECRET),
            ("CLINIC_ADMIN_EMAIL", "admin@clinica.med.br"),
        ])
        .is_err());
    }
}
