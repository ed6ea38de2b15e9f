//! Application context.
//!
//! [`AppContext`] wires the queue components to one storage backend and one
//! engine. It only holds `Arc`s and is cheap to clone.

use crate::config::AppConfig;
use crate::engine::ConversionEngine;
use crate::events::EventApplier;
use crate::ingest::Ingestor;
use crate::notify::Notifier;
use crate::queue::ItemStore;
use crate::scheduler::ConversionScheduler;
use crate::session::SessionManager;
use crate::settings::SettingsStore;
use crate::storage::KeyValueStore;
use crate::thumbnails::ThumbnailService;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub engine: Arc<dyn ConversionEngine>,
    pub notifier: Arc<Notifier>,
    pub settings: Arc<SettingsStore>,
    pub store: Arc<ItemStore>,
    pub ingestor: Arc<Ingestor>,
    pub scheduler: Arc<ConversionScheduler>,
    pub thumbnails: Arc<ThumbnailService>,
    pub session: Arc<SessionManager>,
}

impl AppContext {
    pub fn new(config: AppConfig, storage: Arc<dyn KeyValueStore>, engine: Arc<dyn ConversionEngine>) -> Self {
        let config = Arc::new(config);
        let notifier = Arc::new(Notifier::default());
        let settings = SettingsStore::load(Arc::clone(&storage));
        let store = ItemStore::new(storage);

        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            Arc::clone(&notifier),
            config.ingest.clone(),
        ));
        let scheduler = Arc::new(ConversionScheduler::new(
            Arc::clone(&store),
            Arc::clone(&settings),
            Arc::clone(&engine),
            Arc::clone(&notifier),
        ));
        let thumbnails = Arc::new(ThumbnailService::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            config.ingest.chunk_size,
        ));
        let session = Arc::new(SessionManager::new(
            Arc::clone(&store),
            Arc::clone(&settings),
            Arc::clone(&engine),
            Arc::clone(&notifier),
            config.ingest.clone(),
        ));

        Self {
            config,
            engine,
            notifier,
            settings,
            store,
            ingestor,
            scheduler,
            thumbnails,
            session,
        }
    }

    /// Start applying engine push events to the store until `cancel` fires.
    pub fn spawn_event_applier(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let applier = EventApplier::new(Arc::clone(&self.store), Arc::clone(&self.scheduler));
        let rx = self.engine.subscribe();
        tokio::spawn(applier.run(rx, cancel))
    }
}
