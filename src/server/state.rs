//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Database;
use crate::events::EventBus;
use crate::storage::Storage;
use crate::toc::TocService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Upload storage.
    pub storage: Storage,
    /// Change-notification bus.
    pub events: EventBus,
    /// Table-of-contents service.
    pub toc: TocService,
}

impl AppState {
    /// Create new application state with database.
    pub fn new_with_db(config: Config, db: Database) -> Self {
        let auth = AuthService::new(
            db.clone(),
            config.auth.session_days,
            config.auth.registration_enabled(),
        );
        let storage = Storage::new(
            config.storage.uploads_dir.clone(),
            config.storage.max_upload_bytes as u64,
        );
        let toc = TocService::new(db.clone(), config.toc.clone());

        Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            storage,
            events: EventBus::default(),
            toc,
        }
    }

    /// Spawn the background table-of-contents refresher.
    pub fn spawn_toc_refresher(&self) {
        let toc = self.toc.clone();
        let bus = self.events.clone();
        tokio::spawn(async move {
            toc.run_refresher(bus).await;
        });
    }
}
