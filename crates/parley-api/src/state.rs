use std::sync::Arc;

use parley_db::Database;
use parley_llm::CompletionProvider;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler needs, constructed once at startup and injected.
/// No module-level singletons: lifecycle is scoped to the process.
pub struct AppStateInner {
    pub db: Database,
    pub llm: Arc<dyn CompletionProvider>,
    pub config: ApiConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,
    pub jwt_secret: String,
    /// Name of the portfolio owner the bot answers questions about.
    pub owner_name: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            jwt_secret: "dev-secret-change-me".into(),
            owner_name: "Dean".into(),
        }
    }
}

/// CSRF enforcement is production-only; everything else behaves the same
/// in both environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn parse(s: &str) -> Self {
        match s {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}
