use std::sync::Arc;

use mongodb::Database;

use crate::config::AppConfig;
use crate::services::daraja::DarajaGateway;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub daraja: Option<Arc<DarajaGateway>>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        AppState {
            db,
            config: Arc::new(config),
            daraja: None,
        }
    }

    pub fn with_daraja(mut self, daraja: Arc<DarajaGateway>) -> Self {
        self.daraja = Some(daraja);
        self
    }
}
