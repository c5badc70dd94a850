//! Legacy Extractor server.

use legacy_extractor::config::{AppConfig, StoreBackend};
use legacy_extractor::extractor::Extractor;
use legacy_extractor::openrouter::OpenRouterClient;
use legacy_extractor::store::{MemoryStore, Store, SupabaseStore};
use legacy_extractor::{app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONNECT_RETRY: Duration = Duration::from_secs(5);
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "legacy_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match &config.store {
        StoreBackend::Memory => {
            warn!("SUPABASE_URL not configured; records are kept in memory only");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Supabase { url, service_role_key } => {
            let supabase = SupabaseStore::new(url.clone(), service_role_key.clone())?;
            supabase.connect(CONNECT_RETRY).await;
            supabase.spawn_health_probe(HEALTH_PROBE_INTERVAL);
            Arc::new(supabase)
        }
    };
    info!("Using {} store", store.name());

    let extractor = match (&config.ai.api_key, config.ai.is_active()) {
        (Some(key), true) => {
            let client = OpenRouterClient::new(key.clone(), config.ai.model.clone())?;
            info!("AI extraction enabled (model={})", client.model());
            Extractor::with_backend(Arc::new(client))
        }
        _ => {
            info!("AI extraction disabled; using basic tokenizer");
            Extractor::basic()
        }
    };

    let bind_addr = config.bind_addr();
    let state = AppState::new(config, store, extractor);

    // Run server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
