use anyhow::Context;
use mentorhub::{config::Config, db, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mentorhub=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url)
        .await
        .map_err(|e| e.0)
        .with_context(|| format!("can't open database {}", config.database_url))?;

    tokio::fs::create_dir_all(&config.avatar_dir)
        .await
        .with_context(|| format!("can't create avatar directory {}", config.avatar_dir.display()))?;

    let bind_addr = config.bind_addr;
    let app = mentorhub::app(AppState::new(db_pool, config))?;

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
