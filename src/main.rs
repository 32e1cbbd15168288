use sysportal::{auth, config::Config, db, permissions, AppResult, AppState};
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sysportal=debug,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_minutes)));

    let db_pool = db::connect(&config.database_url, config.max_connections).await?;
    permissions::provision(&db_pool).await?;
    if let Some(seed) = &config.superuser {
        auth::seed_superuser(&db_pool, seed).await?;
    }

    let clients = auth::Clients::load(&config.client_secret_path, &config.public_url).await?;
    tokio::fs::create_dir_all(config.media_root.join("photos")).await?;

    let app_state = AppState {
        db_pool,
        clients,
        media_root: config.media_root.clone(),
    };

    let app = sysportal::app(app_state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
