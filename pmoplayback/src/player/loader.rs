//! Track loading with failover across music services.
//!
//! A load walks the registered services starting from the active one,
//! wrapping around, until one of them accepts the track. When none does,
//! the track is reported as failed and playback advances to the next track
//! that has not failed yet. Requests arriving while a load is in flight are
//! coalesced: only the latest one is kept and served afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::errors::PlayerError;
use crate::model::Track;
use crate::player::{Player, PlayerFuture, catalog, with_budget};
use crate::player::state::PlayerState;
use crate::queue::Step;

/// Why a load procedure stopped, and for which track.
struct LoadFailure {
    index: usize,
    track_id: Option<String>,
    error: PlayerError,
}

impl Player {
    /// Loads the track at `index` of the active queue.
    ///
    /// With `try_default_first`, the default service is selected before the
    /// first attempt. If a load is already in flight the request is recorded
    /// and [`PlayerError::LoadCoalesced`] is returned; the in-flight
    /// procedure loads it once it is done.
    pub async fn load_track(&self, index: usize, try_default_first: bool) -> Result<(), PlayerError> {
        self.load_track_with(index, try_default_first, HashSet::new())
            .await
    }

    /// Loads `index` and keeps the current play/pause intent.
    pub async fn play_index(&self, index: usize) -> Result<(), PlayerError> {
        let prefer_default = self.state().failed_over;
        self.load_track_with(index, prefer_default, HashSet::new())
            .await
    }

    /// `tracks_tried` holds the ids of tracks that already failed on every
    /// service during this chain of automatic advances.
    pub(crate) fn load_track_with(
        &self,
        index: usize,
        try_default_first: bool,
        mut tracks_tried: HashSet<String>,
    ) -> PlayerFuture<'_, ()> {
        Box::pin(async move {
            {
                let mut st = self.state();
                let admitted = admit_load(&mut st, index, &tracks_tried);
                // A coalesced request leaves the latch to the load in flight.
                if !matches!(admitted, Ok(()) | Err(PlayerError::LoadCoalesced { .. })) {
                    st.automatic_next_allowed = true;
                }
                admitted?;
            }

            let outcome = self.run_loads(index, try_default_first).await;

            {
                let mut st = self.state();
                st.busy.load_track = false;
                st.automatic_next_allowed = true;
            }

            let failure = match outcome {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };
            let track_id = match failure.track_id {
                Some(id) if matches!(failure.error, PlayerError::ServicesExhausted { .. }) => id,
                _ => return Err(failure.error),
            };

            error!(
                index = failure.index,
                track = track_id.as_str(),
                "Track could not be loaded on any music service"
            );
            tracks_tried.insert(track_id);
            self.emit(
                catalog::TRACK_LOAD_FAILED,
                &[json!(failure.index), json!(failure.error.to_string())],
            );

            let waiting = self.state().queue.take_waiting_to_load();
            if let Some(waiting) = waiting {
                return self.load_track_with(waiting, false, tracks_tried).await;
            }
            self.advance_after_failure(failure.index, tracks_tried)
                .await
        })
    }

    /// Loads `index`, then every index recorded by coalesced requests
    /// meanwhile, until the waiting slot is empty.
    async fn run_loads(&self, mut index: usize, mut try_default_first: bool) -> Result<(), LoadFailure> {
        loop {
            let track = self.state().queue.get(index).cloned();
            let Some(track) = track else {
                let len = self.queue_len();
                return Err(LoadFailure {
                    index,
                    track_id: None,
                    error: PlayerError::queue_bounds(index, len),
                });
            };

            let service = self
                .load_with_failover(index, &track, try_default_first)
                .await
                .map_err(|error| LoadFailure {
                    index,
                    track_id: Some(track.id.clone()),
                    error,
                })?;

            let (loaded_index, waiting) = {
                let mut st = self.state();
                let loaded_index = st.queue.index_of(&track);
                st.queue.point_to(loaded_index);
                st.track_loaded = loaded_index.is_some();
                (loaded_index, st.queue.take_waiting_to_load())
            };

            match loaded_index {
                Some(i) => {
                    info!(index = i, track = track.id.as_str(), service = service.as_str(), "Track loaded");
                    self.apply_intent();
                    self.emit(catalog::TRACK_LOADED, &[json!(i), json!(service)]);
                }
                None => {
                    warn!(track = track.id.as_str(), "Track left the queue while loading, unloading it");
                    self.active().1.unload();
                }
            }
            self.emit_index_updated();

            match waiting {
                Some(w) if Some(w) != loaded_index => {
                    debug!(index = w, "Serving coalesced load request");
                    index = w;
                    try_default_first = false;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Tries `track` on each service in turn, starting from the active one.
    ///
    /// Returns the name of the service that accepted it, which is then the
    /// active one.
    async fn load_with_failover(
        &self,
        index: usize,
        track: &Arc<Track>,
        try_default_first: bool,
    ) -> Result<String, PlayerError> {
        let active = {
            let mut st = self.state();
            st.services_tried.clear();
            st.services.active_index()
        };

        let mut cursor = active;
        if try_default_first && active != 0 {
            match self.switch_service(0).await {
                Ok(()) => cursor = 0,
                Err(e) => {
                    warn!(error = %e, "Cannot switch to the default music service, keeping the current one");
                }
            }
        }
        let start = cursor;

        loop {
            let name = self.state().services.get(cursor).map(|s| s.name().to_string());
            let Some(name) = name else {
                return Err(PlayerError::ServicesExhausted {
                    track: track.id.clone(),
                });
            };

            self.emit(catalog::TRACK_LOADING, &[json!(index), json!(name)]);
            let attempt = match self.switch_service(cursor).await {
                Ok(()) => self.load_on_active(track).await,
                Err(e) => Err(e),
            };

            match attempt {
                Ok(()) => {
                    let mut st = self.state();
                    st.services_tried.clear();
                    if cursor != start {
                        st.failed_over = true;
                    } else if try_default_first {
                        st.failed_over = false;
                    }
                    return Ok(name);
                }
                Err(e) => {
                    warn!(
                        service = name.as_str(),
                        track = track.id.as_str(),
                        error = %e,
                        "Music service failed to load track"
                    );
                    let mut st = self.state();
                    st.services_tried.insert(name);
                    cursor = st.services.next_index(cursor);
                    let next_tried = st
                        .services
                        .get(cursor)
                        .is_none_or(|s| st.services_tried.contains(s.name()));
                    if next_tried {
                        return Err(PlayerError::ServicesExhausted {
                            track: track.id.clone(),
                        });
                    }
                }
            }
        }
    }

    /// One `load` call on the active service, bounded by the load timeout.
    pub(crate) async fn load_on_active(&self, track: &Arc<Track>) -> Result<(), PlayerError> {
        let (name, service) = {
            let mut st = self.state();
            st.busy.load = true;
            st.track_loaded = false;
            let active = st.services.active();
            (active.name().to_string(), active.service())
        };

        debug!(service = name.as_str(), track = track.id.as_str(), "Loading track");
        let task_track = Arc::clone(track);
        let result = with_budget(&name, "load", self.inner.config.load_timeout(), async move {
            service.load(&task_track).await
        })
        .await;

        self.state().busy.load = false;
        result
    }

    /// Moves on after `failed_index` could not be loaded anywhere, unless
    /// the next candidate already failed or the queue ends there.
    async fn advance_after_failure(
        &self,
        failed_index: usize,
        tracks_tried: HashSet<String>,
    ) -> Result<(), PlayerError> {
        let target = {
            let st = self.state();
            match st.queue.next_step_from(Some(failed_index), st.intent.repeat) {
                Some(Step::Load(i)) => st
                    .queue
                    .get(i)
                    .filter(|t| !tracks_tried.contains(&t.id))
                    .map(|_| i),
                _ => None,
            }
        };

        match target {
            Some(next) => {
                info!(from = failed_index, to = next, "Skipping to next track after load failure");
                self.load_track_with(next, true, tracks_tried).await
            }
            None => {
                self.settle_exhausted("no remaining track could be loaded");
                Err(PlayerError::TracksExhausted)
            }
        }
    }

    /// Leaves the player idle and paused after a failed advance chain.
    fn settle_exhausted(&self, reason: &str) {
        let service = {
            let mut st = self.state();
            st.track_loaded = false;
            st.queue.point_to(None);
            st.services.active().service()
        };
        service.unload();
        warn!(reason, "Playback exhausted");

        self.set_paused_intent(true);
        self.emit_index_updated();
        self.emit(catalog::PLAYBACK_EXHAUSTED, &[json!(reason)]);
    }
}

/// Checks that a load of `index` may start and marks it in flight.
fn admit_load(
    st: &mut PlayerState,
    index: usize,
    tracks_tried: &HashSet<String>,
) -> Result<(), PlayerError> {
    st.queue.check_bounds(index)?;
    if st.busy.load_track {
        st.queue.set_waiting_to_load(Some(index));
        debug!(index, "Load in progress, request coalesced");
        return Err(PlayerError::LoadCoalesced { index });
    }
    if st.busy.dynamic_switch {
        return Err(PlayerError::Busy("dynamic music service switch"));
    }
    if st.queue.all_tried(tracks_tried) {
        return Err(PlayerError::TracksExhausted);
    }
    st.busy.load_track = true;
    Ok(())
}
