//! Music service selection.
//!
//! Services are initialized lazily, the first time they become active.
//! A dynamic switch moves the playing track to another service and seeks it
//! back to where it was; when the new service cannot take over, playback
//! falls back to the previous one.

use std::sync::Arc;

use serde_json::json;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::errors::PlayerError;
use crate::model::Track;
use crate::player::{Player, PlayerFuture, catalog, read_time, with_budget};

/// Result of [`Player::dynamically_change_music_service`].
#[derive(Clone, Debug, PartialEq)]
pub enum SwitchOutcome {
    /// The requested service is active.
    Switched { service: String },
    /// The requested service could not take over; playback went back to
    /// `service`. `error` is why the requested one failed.
    FellBack {
        requested: String,
        service: String,
        error: PlayerError,
    },
}

impl SwitchOutcome {
    /// Service active after the switch.
    pub fn service(&self) -> &str {
        match self {
            SwitchOutcome::Switched { service } | SwitchOutcome::FellBack { service, .. } => service,
        }
    }
}

/// Playback position captured before a dynamic switch.
struct Snapshot {
    track: Arc<Track>,
    percentage: f64,
}

impl Player {
    /// Makes `name` the active service, initializing it first if needed.
    ///
    /// The track loaded on the previous service is unloaded: call
    /// [`load_track`](Self::load_track) or use
    /// [`dynamically_change_music_service`](Self::dynamically_change_music_service)
    /// to keep playing.
    pub async fn change_music_service(&self, name: &str) -> Result<(), PlayerError> {
        let index = {
            let st = self.state();
            if st.busy.dynamic_switch {
                return Err(PlayerError::Busy("dynamic music service switch"));
            }
            if st.busy.load_track {
                return Err(PlayerError::Busy("track load"));
            }
            st.services.index_of(name)?
        };
        self.switch_service(index).await?;
        self.state().failed_over = false;
        Ok(())
    }

    /// Moves the current track to `name`, keeping its position.
    ///
    /// When nothing is loaded this is a plain service change.
    pub async fn dynamically_change_music_service(&self, name: &str) -> Result<SwitchOutcome, PlayerError> {
        let (target, snapshot) = {
            let st = self.state();
            let target = st.services.index_of(name)?;
            let track = st.queue.current_track().filter(|_| st.track_loaded);
            (target, track.map(|t| (t, st.services.active().service())))
        };

        let Some((track, service)) = snapshot else {
            self.change_music_service(name).await?;
            return Ok(SwitchOutcome::Switched {
                service: name.to_string(),
            });
        };

        let snapshot = Snapshot {
            track,
            percentage: read_time(service.as_ref()).percentage,
        };
        self.switch_preserving(target, &snapshot, true).await
    }

    fn switch_preserving<'a>(
        &'a self,
        target: usize,
        snapshot: &'a Snapshot,
        allow_fallback: bool,
    ) -> PlayerFuture<'a, SwitchOutcome> {
        Box::pin(async move {
            let (previous, target_name) = {
                let mut st = self.state();
                if st.busy.dynamic_switch {
                    return Err(PlayerError::Busy("dynamic music service switch"));
                }
                if st.busy.load || st.busy.load_track {
                    return Err(PlayerError::Busy("track load"));
                }
                let target_name = st
                    .services
                    .get(target)
                    .map(|s| s.name().to_string())
                    .ok_or_else(|| PlayerError::UnknownService(target.to_string()))?;
                let previous = st.services.active_index();
                if previous == target && st.track_loaded {
                    debug!(service = target_name.as_str(), "Service already playing the track");
                    return Ok(SwitchOutcome::Switched { service: target_name });
                }
                st.busy.dynamic_switch = true;
                (previous, target_name)
            };

            info!(
                to = target_name.as_str(),
                track = snapshot.track.id.as_str(),
                percentage = snapshot.percentage,
                "Switching music service while playing"
            );

            let result: Result<(), PlayerError> = async {
                self.switch_service(target).await?;
                self.load_on_active(&snapshot.track).await
            }
            .await;

            match result {
                Ok(()) => {
                    let index = {
                        let mut st = self.state();
                        st.track_loaded = true;
                        st.failed_over = false;
                        st.queue.index_of(&snapshot.track)
                    };
                    self.apply_intent();
                    self.correct_seek(snapshot.percentage).await;
                    self.state().busy.dynamic_switch = false;

                    if let Some(i) = index {
                        self.emit(catalog::TRACK_LOADED, &[json!(i), json!(target_name)]);
                    }
                    Ok(SwitchOutcome::Switched {
                        service: target_name,
                    })
                }
                Err(error) => {
                    self.state().busy.dynamic_switch = false;
                    if !allow_fallback {
                        return Err(error);
                    }

                    let previous_name = self
                        .state()
                        .services
                        .get(previous)
                        .map(|s| s.name().to_string())
                        .unwrap_or_default();
                    warn!(
                        requested = target_name.as_str(),
                        fallback = previous_name.as_str(),
                        error = %error,
                        "Dynamic switch failed, falling back"
                    );

                    match self.switch_preserving(previous, snapshot, false).await {
                        Ok(_) => Ok(SwitchOutcome::FellBack {
                            requested: target_name,
                            service: previous_name,
                            error,
                        }),
                        Err(fallback) => {
                            error!(
                                service = previous_name.as_str(),
                                error = %fallback,
                                "Fallback after failed switch also failed"
                            );
                            Err(error)
                        }
                    }
                }
            }
        })
    }

    /// Activates the service at `index`: initializes it if needed, then
    /// unloads the previous service and hands the volume over.
    pub(crate) async fn switch_service(&self, index: usize) -> Result<(), PlayerError> {
        let (name, service, initialized, is_active) = {
            let st = self.state();
            let reg = st
                .services
                .get(index)
                .ok_or_else(|| PlayerError::UnknownService(index.to_string()))?;
            (
                reg.name().to_string(),
                reg.service(),
                reg.is_initialized(),
                st.services.active_index() == index,
            )
        };

        if !initialized {
            {
                let mut st = self.state();
                if st.busy.loading_service {
                    return Err(PlayerError::Busy("music service initialization"));
                }
                st.busy.loading_service = true;
            }

            info!(service = name.as_str(), "Initializing music service");
            let task_service = Arc::clone(&service);
            let result = with_budget(
                &name,
                "initialize",
                self.inner.config.initialize_timeout(),
                async move { task_service.initialize().await },
            )
            .await;

            {
                let mut st = self.state();
                st.busy.loading_service = false;
                if result.is_ok() {
                    st.services.mark_initialized(index);
                }
            }
            if let Err(e) = result {
                warn!(service = name.as_str(), error = %e, "Music service initialization failed");
                return Err(e);
            }
        }

        let volume = self.intent().effective_volume();
        if is_active {
            service.set_volume(volume);
            return Ok(());
        }

        let previous = {
            let mut st = self.state();
            let previous = st.services.active();
            let previous = (previous.name().to_string(), previous.service());
            st.services.set_active(index);
            st.track_loaded = false;
            st.reconcile.reset();
            previous
        };
        previous.1.pause();
        previous.1.unload();
        service.set_volume(volume);

        info!(from = previous.0.as_str(), to = name.as_str(), "Music service changed");
        self.emit(catalog::MUSIC_SERVICE_CHANGED, &[json!(name)]);
        Ok(())
    }

    /// Seeks the active service to `percentage` and re-issues the seek until
    /// the reported position is within tolerance or the budget runs out.
    async fn correct_seek(&self, percentage: f64) {
        let (name, service) = self.active();
        service.seek_to_percentage(percentage);

        let duration = service.duration();
        if duration == 0 {
            debug!(service = name.as_str(), "Unknown duration, skipping seek correction");
            return;
        }

        let config = &self.inner.config;
        let target = (percentage * duration as f64).round() as u64;
        let tolerance = config.seek_tolerance_ms;
        let poll = config.seek_poll_interval();
        let budget = config.seek_timeout();

        let converge = async {
            let mut ticks = time::interval_at(Instant::now() + poll, poll);
            loop {
                ticks.tick().await;
                let observed = service.current_time();
                if observed.abs_diff(target) <= tolerance {
                    return observed;
                }
                debug!(observed, target, "Position off target, seeking again");
                service.seek_to_percentage(percentage);
            }
        };

        match time::timeout(budget, converge).await {
            Ok(observed) => debug!(service = name.as_str(), observed, target, "Seek correction done"),
            Err(_) => warn!(
                service = name.as_str(),
                target,
                budget_ms = budget.as_millis() as u64,
                "Seek correction did not converge"
            ),
        }
    }
}
