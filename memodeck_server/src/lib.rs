pub mod auth;
pub mod handlers;
pub mod route;

use crate::auth::{AuthGate, SqliteUserStore};
use memodeck::clock::Clock;
use memodeck::collection::StoreOptions;
use memodeck::config::ServerConfig;
use memodeck::session::{RegistryOptions, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub config: ServerConfig,
    pub clock: Arc<dyn Clock>,
    pub registry: SessionRegistry,
    pub users: SqliteUserStore,
    pub gate: AuthGate,
}

pub async fn build_state(
    config: ServerConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<AppState>, String> {
    let users = SqliteUserStore::open(&config.data_dir)
        .await
        .map_err(|e| format!("Failed to open the user store: {}", e))?;
    let registry = SessionRegistry::new(
        RegistryOptions {
            ttl: config.session_ttl,
            store: StoreOptions {
                busy_retry_attempts: config.busy_retry_attempts,
            },
        },
        clock.clone(),
    );
    let gate = AuthGate::new(config.secret_key.clone());
    Ok(Arc::new(AppState {
        config,
        clock,
        registry,
        users,
        gate,
    }))
}

/// Periodic TTL sweep of cached sessions.
pub fn spawn_sweeper(state: Arc<AppState>) {
    let interval = state.config.sweep_interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            state.registry.sweep().await;
        }
    });
}
