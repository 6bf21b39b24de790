//! Esquema do banco, versionado por `PRAGMA user_version`

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Migrações em ordem; o índice + 1 é a versão do esquema
const MIGRATIONS: &[&str] = &[
    // 001_initial_schema.sql
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        phone TEXT,
        role TEXT NOT NULL CHECK (role IN ('patient', 'doctor', 'admin')),
        is_active BOOLEAN NOT NULL DEFAULT 1,
        is_deleted BOOLEAN NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE TABLE IF NOT EXISTS doctors (
        id BLOB PRIMARY KEY NOT NULL,
        user_id BLOB NOT NULL UNIQUE,
        specialization TEXT NOT NULL,
        experience INTEGER NOT NULL DEFAULT 0 CHECK (experience >= 0),
        bio TEXT,
        consultation_fee INTEGER NOT NULL CHECK (consultation_fee >= 0),
        -- JSON: [{"date": "YYYY-MM-DD", "times": ["10:00", ...]}, ...]
        available_slots TEXT NOT NULL DEFAULT '[]',
        is_approved BOOLEAN NOT NULL DEFAULT 0,
        is_deleted BOOLEAN NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users (id)
    );

    CREATE TABLE IF NOT EXISTS patients (
        id BLOB PRIMARY KEY NOT NULL,
        user_id BLOB NOT NULL UNIQUE,
        date_of_birth DATE,
        gender TEXT CHECK (gender IN ('male', 'female', 'other')),
        address TEXT,
        medical_history TEXT,
        is_deleted BOOLEAN NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users (id)
    );

    CREATE TABLE IF NOT EXISTS appointments (
        id BLOB PRIMARY KEY NOT NULL,
        doctor_id BLOB NOT NULL,
        patient_id BLOB NOT NULL,
        appointment_date DATE NOT NULL,
        time_slot TEXT NOT NULL,
        consultation_fee INTEGER NOT NULL,
        payment_method TEXT NOT NULL CHECK (payment_method IN ('cash', 'electronic')),
        status TEXT NOT NULL CHECK (status IN ('pending', 'confirmed', 'completed', 'cancelled')),
        payment_status TEXT NOT NULL CHECK (payment_status IN ('pending', 'paid', 'failed')),
        notes TEXT,
        is_deleted BOOLEAN NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        FOREIGN KEY (doctor_id) REFERENCES doctors (id),
        FOREIGN KEY (patient_id) REFERENCES patients (id)
    );

    CREATE TABLE IF NOT EXISTS payments (
        id BLOB PRIMARY KEY NOT NULL,
        appointment_id BLOB NOT NULL UNIQUE,
        patient_id BLOB NOT NULL,
        doctor_id BLOB NOT NULL,
        amount INTEGER NOT NULL,
        payment_method TEXT NOT NULL CHECK (payment_method IN ('cash', 'electronic')),
        status TEXT NOT NULL CHECK (status IN ('created', 'success', 'failed')),
        gateway_order_id TEXT,
        gateway_payment_id TEXT,
        is_deleted BOOLEAN NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        FOREIGN KEY (appointment_id) REFERENCES appointments (id)
    );

    -- Um horário só pode estar ocupado por uma consulta ativa
    CREATE UNIQUE INDEX IF NOT EXISTS idx_appointments_active_slot
        ON appointments (doctor_id, appointment_date, time_slot)
        WHERE is_deleted = 0 AND status <> 'cancelled';

    CREATE INDEX IF NOT EXISTS idx_doctors_specialization ON doctors (specialization);
    CREATE INDEX IF NOT EXISTS idx_appointments_doctor_id ON appointments (doctor_id);
    CREATE INDEX IF NOT EXISTS idx_appointments_patient_id ON appointments (patient_id);
    CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments (status);
    CREATE INDEX IF NOT EXISTS idx_payments_patient_id ON payments (patient_id);
    "#,
];

/// Aplica, em ordem, as migrações acima da `user_version` atual. Cada
/// migração e o novo `user_version` são gravados na mesma transação.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .context("Não foi possível ler a versão do esquema")?;

    let pending = MIGRATIONS
        .iter()
        .enumerate()
        .map(|(i, sql)| (i as i64 + 1, *sql))
        .filter(|(version, _)| *version > current);

    let mut applied = 0;
    for (version, sql) in pending {
        apply_migration(pool, version, sql)
            .await
            .with_context(|| format!("Migração {} falhou", version))?;
        applied += 1;
    }

    if applied > 0 {
        info!(
            "Esquema atualizado de {} para {} ({} migrações)",
            current,
            MIGRATIONS.len(),
            applied
        );
    } else {
        debug!("Esquema já está na versão {}", current);
    }
    Ok(())
}

async fn apply_migration(pool: &SqlitePool, version: i64, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(sql).execute(&mut *tx).await?;
    // PRAGMA não aceita parâmetros vinculados
    sqlx::query(&format!("PRAGMA user_version = {}", version))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migrations.db");

        let conn_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(conn_options).await?;

        run_migrations(&pool).await?;
        // Segunda execução não reaplica nada
        run_migrations(&pool).await?;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await?;

        assert_eq!(version, MIGRATIONS.len() as i64);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&pool)
        .await?;

        for expected in ["users", "doctors", "patients", "appointments", "payments"] {
            assert!(tables.contains(&expected.to_string()), "tabela {expected} ausente");
        }

        let indexes: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='index'")
                .fetch_all(&pool)
                .await?;
        assert!(indexes.contains(&"idx_appointments_active_slot".to_string()));

        Ok(())
    }
}
