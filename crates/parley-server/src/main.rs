use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::create_router;
use parley_api::state::{ApiConfig, AppState, AppStateInner, Environment};
use parley_llm::CompletionProvider;
use parley_llm::mock::MockProvider;
use parley_llm::openai::{OpenAiConfig, OpenAiProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config. Every key is optional with a safe fallback; a missing LLM
    // key degrades to the mock provider instead of failing startup.
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let environment = Environment::parse(
        &std::env::var("PARLEY_ENV").unwrap_or_else(|_| "development".into()),
    );
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let owner_name = std::env::var("PARLEY_OWNER_NAME").unwrap_or_else(|_| "Dean".into());

    // Init database
    let db = parley_db::Database::open(&PathBuf::from(&db_path))?;

    // LLM provider
    let llm: Arc<dyn CompletionProvider> = match (
        std::env::var("PARLEY_LLM_ENDPOINT").ok(),
        std::env::var("PARLEY_LLM_API_KEY").ok(),
    ) {
        (Some(endpoint), Some(api_key)) if !api_key.is_empty() => {
            let deployment = std::env::var("PARLEY_LLM_DEPLOYMENT")
                .unwrap_or_else(|_| "gpt-4o-mini".into());
            info!("Using LLM endpoint {} (deployment {})", endpoint, deployment);
            Arc::new(OpenAiProvider::new(OpenAiConfig {
                endpoint,
                api_key,
                deployment,
                api_version: std::env::var("PARLEY_LLM_API_VERSION").ok(),
            }))
        }
        _ => {
            warn!("No LLM endpoint/key configured, serving placeholder replies");
            Arc::new(MockProvider)
        }
    };

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        llm,
        config: ApiConfig { environment, jwt_secret, owner_name },
    });

    let app = create_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
