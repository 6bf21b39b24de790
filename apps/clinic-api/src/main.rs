use anyhow::{Context, Result};
use clinic_api::config::{AppConfig, LogFormat};
use clinic_api::{build_router, built_info, AppState};
use clinic_core::{accounts, init_db_pool};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Falha ao aguardar sinal de encerramento: {}", e);
    }
    info!("Encerrando servidor");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    info!(
        "Iniciando {} v{} em {}",
        built_info::PKG_NAME,
        built_info::PKG_VERSION,
        config.bind_addr
    );

    let pool = init_db_pool(&config.db).await?;

    if let Some(admin) = &config.admin_bootstrap {
        accounts::ensure_admin(&pool, &admin.name, &admin.email, &admin.password)
            .await
            .context("Falha ao criar conta de administrador")?;
    }

    let addr = config.bind_addr;
    let app = build_router(AppState::new(pool, config));

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Servidor HTTP encerrado com erro")?;

    Ok(())
}
