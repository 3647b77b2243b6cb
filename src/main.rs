//! Opens the configured profile database and brings its schema up to date.

use anyhow::Context;

use actor_onboarding::config::AppConfig;
use actor_onboarding::store::LibSqlBackend;
use actor_onboarding::store::migrations;
use actor_onboarding::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        db_path = %config.db_path.display(),
        smtp = config.smtp.is_some(),
        "Starting actor-onboarding migrator"
    );

    let db = LibSqlBackend::new_local(&config.db_path)
        .await
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;

    let version = db.schema_version().await?;
    anyhow::ensure!(
        version == migrations::latest_version(),
        "database at V{version}, expected V{}",
        migrations::latest_version()
    );
    tracing::info!(version, "Database schema is current");
    Ok(())
}
