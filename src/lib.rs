pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::EngineSettings;
use crate::database::store::Store;
use crate::services::{
    analytics_service::AnalyticsService, attempt_service::AttemptService,
    audit_service::AuditService, test_service::TestService,
};

#[derive(Clone)]
pub struct AppState {
    pub jwt_secret: Arc<str>,
    pub test_service: TestService,
    pub attempt_service: AttemptService,
    pub analytics_service: AnalyticsService,
    pub audit_service: AuditService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, jwt_secret: &str, settings: EngineSettings) -> Self {
        let audit_service = AuditService::new(store.clone());
        let test_service = TestService::new(store.clone());
        let analytics_service =
            AnalyticsService::new(store.clone(), settings.common_mistakes_limit);
        let attempt_service = AttemptService::new(store, audit_service.clone(), settings);

        Self {
            jwt_secret: Arc::from(jwt_secret),
            test_service,
            attempt_service,
            analytics_service,
            audit_service,
        }
    }
}
