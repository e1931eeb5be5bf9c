//! Shared application state.

use pharma_db::Database;

use crate::auth::JwtManager;
use crate::config::ApiConfig;

/// Handed to every handler as `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub jwt: JwtManager,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(db: Database, config: ApiConfig) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_access_lifetime_secs);
        AppState { db, jwt, config }
    }
}
