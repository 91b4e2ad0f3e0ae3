//! Engine facade with whole-snapshot persistence, a credential seam, and the
//! HTTP/WebSocket request layer.

mod credentials;
mod persistence;
mod server;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use claim_core::table::lock;
use claim_core::{ClaimEngine, Clock, SystemClock};
use contracts::EngineConfig;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use credentials::{bearer_token, CredentialService, PlayerIdCredentials};
pub use persistence::{
    DurableStore, JsonFileStore, MemoryStore, PersistedSnapshotSummary, PersistenceError,
    SqliteSnapshotStore,
};
pub use server::{router, serve, AppState, ServerError};

#[derive(Debug)]
struct PersistenceState {
    store: Arc<dyn DurableStore>,
    /// Held across snapshot and write so an older snapshot never lands after
    /// a newer one.
    flush_lock: Mutex<()>,
    last_error: Mutex<Option<String>>,
}

/// Shared handle to the engine plus its optional durable store. Cloning is
/// cheap; every clone sees the same state.
#[derive(Debug, Clone)]
pub struct EngineApi {
    engine: Arc<ClaimEngine>,
    persistence: Option<Arc<PersistenceState>>,
}

impl EngineApi {
    pub fn from_config(config: EngineConfig) -> Self {
        Self::from_engine(ClaimEngine::new(config))
    }

    pub fn from_engine(engine: ClaimEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            persistence: None,
        }
    }

    /// Loads the latest checkpoint from `store` (or starts empty) and keeps
    /// the store attached for later flushes.
    pub fn open(
        config: EngineConfig,
        store: Arc<dyn DurableStore>,
    ) -> Result<Self, PersistenceError> {
        Self::open_with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        config: EngineConfig,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PersistenceError> {
        let engine = match store.load_all()? {
            Some(snapshot) => {
                info!(store = %store.describe(), %snapshot, "loaded checkpoint");
                ClaimEngine::from_snapshot(config, clock, snapshot)
            }
            None => {
                info!(store = %store.describe(), "no checkpoint found, starting empty");
                ClaimEngine::with_clock(config, clock)
            }
        };

        Ok(Self {
            engine: Arc::new(engine),
            persistence: Some(Arc::new(PersistenceState {
                store,
                flush_lock: Mutex::new(()),
                last_error: Mutex::new(None),
            })),
        })
    }

    pub fn engine(&self) -> &ClaimEngine {
        &self.engine
    }

    pub fn shared_engine(&self) -> Arc<ClaimEngine> {
        Arc::clone(&self.engine)
    }

    pub fn has_store(&self) -> bool {
        self.persistence.is_some()
    }

    /// Writes a fresh snapshot. The in-memory state is authoritative: a
    /// failed write is reported, never rolled back.
    pub fn flush_persistence_checked(&self) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_ref() else {
            return Err(PersistenceError::NotAttached);
        };

        let _guard = lock(&state.flush_lock);
        let snapshot = self.engine.snapshot();
        let result = state.store.save_all(&snapshot);
        *lock(&state.last_error) = result.as_ref().err().map(ToString::to_string);
        if result.is_ok() {
            debug!(%snapshot, "checkpoint written");
        }
        result
    }

    pub fn flush_persistence_if_enabled(&self) {
        if self.persistence.is_none() {
            return;
        }

        if let Err(err) = self.flush_persistence_checked() {
            warn!(error = %err, "checkpoint write failed; in-memory state kept");
        }
    }

    pub fn last_persistence_error(&self) -> Option<String> {
        self.persistence
            .as_ref()
            .and_then(|state| lock(&state.last_error).clone())
    }

    /// Spawns the background writer: it wakes on committed events, waits out
    /// the debounce window so bursts collapse into one write, then saves on a
    /// blocking thread. Returns `None` when no store is attached.
    pub fn spawn_persistence_worker(&self) -> Option<JoinHandle<()>> {
        self.persistence.as_ref()?;
        let debounce = Duration::from_millis(self.engine.config().persist_debounce_ms);
        let rx = self.engine.subscribe();
        let api = self.clone();
        Some(tokio::spawn(run_persistence_worker(api, rx, debounce)))
    }
}

async fn run_persistence_worker(
    api: EngineApi,
    mut rx: tokio::sync::broadcast::Receiver<claim_core::EngineEvent>,
    debounce: Duration,
) {
    loop {
        match rx.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }

        tokio::time::sleep(debounce).await;
        let mut closed = false;
        loop {
            match rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    closed = true;
                    break;
                }
            }
        }

        let writer = api.clone();
        let flushed =
            tokio::task::spawn_blocking(move || writer.flush_persistence_if_enabled()).await;
        if let Err(err) = flushed {
            warn!(error = %err, "checkpoint task panicked");
        }
        if closed {
            break;
        }
    }
    debug!("persistence worker stopped");
}
