//! Playback orchestrator.
//!
//! A [`Player`] owns the track queue and the set of registered music
//! services. It loads tracks with automatic failover across services,
//! switches services while preserving the playback position, and keeps the
//! active service's paused/playing state converging toward the user's
//! intent. Every observable change is published on its [`EventBus`].
//!
//! All mutable state sits behind one mutex which is never held across an
//! `.await` nor while events are published, so subscribers may call back
//! into the player.

pub mod catalog;
mod loader;
mod reconciler;
mod state;
mod switch;
mod transport;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time;
use tracing::{debug, error, warn};

use crate::config::PlaybackConfig;
use crate::errors::{PlayerError, ServiceError};
use crate::events::{EventBus, Handler};
use crate::model::{TimeInfo, Track, TrackState};
use crate::music_service::{MusicService, ServiceRegistration, ServiceRegistry};
use crate::queue::QueueSnapshot;
use crate::ticker::Ticker;

pub use state::{BusyFlags, Intent};
pub use switch::SwitchOutcome;

use state::PlayerState;

/// Boxed future returned by the recursive player operations.
pub(crate) type PlayerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PlayerError>> + Send + 'a>>;

pub(crate) struct PlayerInner {
    config: PlaybackConfig,
    bus: EventBus,
    state: Mutex<PlayerState>,
    reconciler: Mutex<Option<Ticker>>,
}

/// Cheap to clone handle on a shared player.
#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("bus", &self.inner.bus)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Player {
    /// Builds a player with its own bus, validating according to
    /// `config.validate_events`.
    pub fn new(services: Vec<ServiceRegistration>, config: PlaybackConfig) -> Result<Self, PlayerError> {
        let bus = EventBus::new(config.validate_events);
        Self::with_bus(services, bus, config)
    }

    /// Builds a player publishing on an existing bus. The player events
    /// must not be registered on it yet.
    ///
    /// The first registration is the default service. Services are
    /// initialized lazily, the first time they are used.
    pub fn with_bus(
        services: Vec<ServiceRegistration>,
        bus: EventBus,
        config: PlaybackConfig,
    ) -> Result<Self, PlayerError> {
        config
            .validate()
            .map_err(|e| PlayerError::InvalidConfiguration(e.to_string()))?;
        let registry = ServiceRegistry::new(services)?;
        catalog::register(&bus)?;

        let inner = Arc::new(PlayerInner {
            state: Mutex::new(PlayerState::new(registry, config.initial_volume)),
            config,
            bus,
            reconciler: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        inner
            .bus
            .subscribe(catalog::TIME_UPDATE, auto_advance_handler(weak))?;

        debug!(services = ?inner.state().services.names(), "Player created");
        Ok(Self { inner })
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, PlayerState> {
        self.inner.state()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    // --- Inspection ---

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.state().queue.snapshot()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state().queue.current_index()
    }

    pub fn current_track(&self) -> Option<Arc<Track>> {
        self.state().queue.current_track()
    }

    pub fn queue_len(&self) -> usize {
        self.state().queue.len()
    }

    /// Index recorded by a coalesced load request, if any.
    pub fn waiting_to_load(&self) -> Option<usize> {
        self.state().queue.waiting_to_load()
    }

    pub fn is_shuffled(&self) -> bool {
        self.state().queue.is_shuffled()
    }

    pub fn intent(&self) -> Intent {
        self.state().intent
    }

    pub fn busy(&self) -> BusyFlags {
        self.state().busy
    }

    pub fn is_track_loaded(&self) -> bool {
        self.state().track_loaded
    }

    pub fn track_state(&self) -> TrackState {
        let st = self.state();
        if st.busy.load || st.busy.load_track || st.busy.dynamic_switch {
            TrackState::Loading
        } else if !st.track_loaded {
            TrackState::Idle
        } else if st.intent.paused {
            TrackState::Paused
        } else {
            TrackState::Playing
        }
    }

    /// Services attempted for the track currently being loaded.
    pub fn services_tried(&self) -> HashSet<String> {
        self.state().services_tried.clone()
    }

    pub fn active_service(&self) -> String {
        self.state().services.active().name().to_string()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.state().services.names()
    }

    pub fn is_service_initialized(&self, name: &str) -> Result<bool, PlayerError> {
        let st = self.state();
        let index = st.services.index_of(name)?;
        Ok(st.services.get(index).is_some_and(|s| s.is_initialized()))
    }

    pub fn automatic_next_allowed(&self) -> bool {
        self.state().automatic_next_allowed
    }

    /// Position reported by the active service, when a track is loaded.
    pub fn time_info(&self) -> Option<TimeInfo> {
        let service = {
            let st = self.state();
            if !st.track_loaded {
                return None;
            }
            st.services.active().service()
        };
        Some(read_time(service.as_ref()))
    }

    // --- Internal helpers shared by the submodules ---

    pub(crate) fn active(&self) -> (String, Arc<dyn MusicService>) {
        let st = self.state();
        let active = st.services.active();
        (active.name().to_string(), active.service())
    }

    /// Pushes volume, mute and play/pause intent to the active service.
    pub(crate) fn apply_intent(&self) {
        let (service, intent) = {
            let st = self.state();
            (st.services.active().service(), st.intent)
        };
        service.set_volume(intent.effective_volume());
        if intent.paused {
            service.pause();
        } else {
            service.play();
        }
    }

    /// Sets the paused intent and announces it when it changed.
    pub(crate) fn set_paused_intent(&self, paused: bool) {
        let changed = self.store_paused_intent(paused);
        if changed {
            self.emit(catalog::PLAY_PAUSE_CHANGED, &[json!(paused)]);
        }
    }

    /// Sets the paused intent and always announces it. Used by explicit
    /// play and pause commands.
    pub(crate) fn announce_paused_intent(&self, paused: bool) {
        self.store_paused_intent(paused);
        self.emit(catalog::PLAY_PAUSE_CHANGED, &[json!(paused)]);
    }

    fn store_paused_intent(&self, paused: bool) -> bool {
        let mut st = self.state();
        let changed = st.intent.paused != paused;
        st.intent.paused = paused;
        changed
    }

    /// Publishes a player event. The state lock must not be held.
    pub(crate) fn emit(&self, event: &str, args: &[Value]) {
        if let Err(e) = self.inner.bus.publish(event, args) {
            error!(event, error = %e, "Failed to publish player event");
        }
    }

    pub(crate) fn emit_index_updated(&self) {
        let index = self.current_index();
        let args = match index {
            Some(i) => vec![json!(i)],
            None => Vec::new(),
        };
        self.emit(catalog::INDEX_UPDATED, &args);
    }

    pub(crate) fn emit_queue_changed(&self) {
        let len = self.queue_len();
        self.emit(catalog::QUEUE_CHANGED, &[json!(len)]);
    }
}

impl PlayerInner {
    fn state(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn read_time(service: &dyn MusicService) -> TimeInfo {
    TimeInfo::new(
        service.current_time(),
        service.duration(),
        service.percentage_loaded(),
    )
}

/// Runs a service call on its own task and waits for it at most `budget`.
///
/// On timeout the task is left running; whatever it returns later is
/// ignored.
pub(crate) async fn with_budget<F>(
    service: &str,
    operation: &'static str,
    budget: Duration,
    call: F,
) -> Result<(), PlayerError>
where
    F: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    match time::timeout(budget, tokio::spawn(call)).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(PlayerError::rejected(service, e)),
        Ok(Err(join)) => Err(PlayerError::rejected(
            service,
            ServiceError::Failed(join.to_string()),
        )),
        Err(_) => {
            warn!(service, operation, budget_ms = budget.as_millis() as u64, "Service call timed out");
            Err(PlayerError::Timeout { operation, budget })
        }
    }
}

/// Starts `next()` once per track end, when a `time_update` reports the
/// track as complete.
fn auto_advance_handler(player: Weak<PlayerInner>) -> Handler {
    Handler::new(4, move |args| {
        let complete = args
            .get(2)
            .and_then(Value::as_f64)
            .is_some_and(|p| p >= 1.0);
        if !complete {
            return;
        }
        if let Some(inner) = player.upgrade() {
            Player { inner }.auto_advance();
        }
    })
}

impl Player {
    fn auto_advance(&self) {
        {
            let mut st = self.state();
            if st.busy.any() || !st.automatic_next_allowed {
                return;
            }
            st.automatic_next_allowed = false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Track ended outside of a tokio runtime, not advancing");
            self.state().automatic_next_allowed = true;
            return;
        };

        debug!("Track ended, advancing automatically");
        let player = self.clone();
        runtime.spawn(async move {
            if let Err(e) = player.next().await {
                warn!(error = %e, "Automatic advance failed");
            }
        });
    }
}
