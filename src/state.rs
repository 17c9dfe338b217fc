use crate::gateway::Gateway;
use crate::lifecycle::Lifecycle;
use crate::notify::Notifier;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub db_schema: Option<String>,
    pub env_name: String,
    pub jwt_secret: String,
    pub engine: Lifecycle,
    pub notifier: Notifier,
    pub gateway: Option<Gateway>,
    pub gateway_provider: String,
}

impl AppState {
    pub fn table(&self, name: &str) -> String {
        match &self.db_schema {
            Some(s) => format!("{s}.{name}"),
            None => name.to_string(),
        }
    }
}
