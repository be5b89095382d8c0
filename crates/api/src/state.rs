//! Application state

use std::sync::Arc;

use revlens_analytics::{AnalyticsService, EventStore, PgEventStore};
use sqlx::PgPool;

use crate::{
    auth::{AuthState, JwtManager, MembershipStore, PgMembershipStore},
    config::Config,
};

/// Shared application state
///
/// Everything here is read-only; requests never share mutable data.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub memberships: Arc<dyn MembershipStore>,
    pub analytics: AnalyticsService,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool.clone()));
        let memberships: Arc<dyn MembershipStore> = Arc::new(PgMembershipStore::new(pool));
        Self::with_stores(config, store, memberships)
    }

    /// Build state over explicit stores (tests use the in-memory ones)
    pub fn with_stores(
        config: Config,
        store: Arc<dyn EventStore>,
        memberships: Arc<dyn MembershipStore>,
    ) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        let analytics = AnalyticsService::from_env(store);
        tracing::info!(
            thresholds = ?analytics.thresholds,
            "Analytics service initialized"
        );

        Self {
            config,
            jwt_manager,
            memberships,
            analytics,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            memberships: self.memberships.clone(),
        }
    }
}
