//! Utilidades de teste: banco temporário e cadastros de exemplo

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::accounts::{self, NewAccount, NewDoctor};
use crate::models::{DoctorProfile, PatientProfile, User};
use crate::{init_db_pool, DbConfig};

/// Senha usada por todas as contas de exemplo
pub const PASSWORD: &str = "senha-de-teste";

/// Valor de consulta padrão dos médicos de exemplo, em centavos
pub const SAMPLE_FEE: i64 = 15_000;

/// Banco SQLite num diretório temporário, removido ao sair de escopo
pub struct TestDb {
    pub pool: SqlitePool,
    pub config: DbConfig,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("clinic-test.db");
        let config = DbConfig {
            db_path: db_path.to_string_lossy().into_owned(),
            max_connections: 5,
            busy_timeout_secs: 5,
        };
        let pool = init_db_pool(&config).await?;
        Ok(Self {
            pool,
            config,
            _dir: dir,
        })
    }

    pub async fn patient(&self, email: &str) -> Result<(User, PatientProfile)> {
        let account = sample_account(email);
        Ok(accounts::register_patient(&self.pool, account).await?)
    }

    /// Médico aprovado com os horários informados em `date`
    pub async fn doctor_with_slots(
        &self,
        email: &str,
        date: NaiveDate,
        labels: &[&str],
    ) -> Result<DoctorProfile> {
        let doctor = accounts::create_doctor(&self.pool, sample_doctor(email, true)).await?;
        let labels: Vec<String> = labels.iter().map(|label| label.to_string()).collect();
        accounts::add_doctor_slots(&self.pool, doctor.profile.id, date, &labels).await?;
        Ok(accounts::find_doctor(&self.pool, doctor.profile.id).await?)
    }
}

pub fn sample_account(email: &str) -> NewAccount {
    let name = email.split('@').next().unwrap_or(email).to_string();
    NewAccount {
        name,
        email: email.to_string(),
        password: PASSWORD.to_string(),
        phone: Some("0000000000".to_string()),
    }
}

pub fn sample_doctor(email: &str, approved: bool) -> NewDoctor {
    NewDoctor {
        account: sample_account(email),
        specialization: "Clínica Geral".to_string(),
        experience: 5,
        bio: None,
        consultation_fee: SAMPLE_FEE,
        approved,
    }
}
