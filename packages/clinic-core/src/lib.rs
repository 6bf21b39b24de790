//! Clinic Core - Biblioteca compartilhada de agendamento da clínica
//!
//! Esta biblioteca fornece:
//! - Modelos de dados (usuários, perfis, consultas e pagamentos)
//! - Migrações automáticas do banco de dados
//! - Agenda de horários livres de cada médico
//! - Fluxo de agendamento, avanço de status e cancelamento de consultas
//! - Pool de conexão e funções de utilidades para SQLite

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod accounts;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod migrations;
pub mod models;
pub mod workflow;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{ClinicError, DbError, ErrorCategory};
pub use ledger::{AvailabilityLedger, SlotDay};
pub use workflow::{Actor, AppointmentWorkflow};

/// Configuração da conexão com o banco de dados
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
    /// Tempo máximo de espera pelo lock de escrita, em segundos
    pub busy_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_path: "data/clinic.db".to_string(),
            max_connections: 5,
            busy_timeout_secs: 5,
        }
    }
}

fn connect_options(config: &DbConfig) -> SqliteConnectOptions {
    // Escritores concorrentes esperam o lock em vez de falhar na hora;
    // a unicidade de (médico, data, horário) fica a cargo do índice único.
    SqliteConnectOptions::new()
        .filename(&config.db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
}

/// Abre o pool sobre `config.db_path`, criando o diretório se preciso, e
/// aplica as migrações pendentes
pub async fn init_db_pool(config: &DbConfig) -> Result<SqlitePool> {
    match Path::new(&config.db_path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .with_context(|| format!("Diretório do banco inacessível: {}", dir.display()))?,
        _ => {}
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options(config))
        .await
        .with_context(|| format!("Banco SQLite indisponível em {}", config.db_path))?;

    migrations::run_migrations(&pool).await?;

    info!(
        "Pool SQLite pronto: {} ({} conexões)",
        config.db_path, config.max_connections
    );
    Ok(pool)
}
