//! User-facing transport and queue commands.

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, info};

use crate::errors::PlayerError;
use crate::model::{RepeatMode, Track};
use crate::player::{Player, catalog};
use crate::queue::{DequeueEffect, QueueMove, Step};

fn check_unit(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl Player {
    // --- Queue ---

    /// Appends tracks to the queue. Returns the new length.
    pub fn queue<I>(&self, tracks: I) -> usize
    where
        I: IntoIterator<Item = Track>,
    {
        let len = self.state().queue.queue(tracks);
        debug!(len, "Tracks queued");
        self.emit(catalog::QUEUE_CHANGED, &[json!(len)]);
        len
    }

    /// Removes the track at `index` and makes playback follow: the removed
    /// current track is replaced by its successor, or playback stops.
    pub async fn dequeue(&self, index: usize) -> Result<(), PlayerError> {
        let effect = {
            let mut st = self.state();
            let repeat = st.intent.repeat;
            st.queue.dequeue(index, repeat)?
        };
        self.emit_queue_changed();

        let result = match effect {
            DequeueEffect::None => {
                self.emit_index_updated();
                Ok(())
            }
            DequeueEffect::Unload => {
                self.unload();
                Ok(())
            }
            DequeueEffect::Load(next) => self.play_index(next).await,
            DequeueEffect::LoadPaused(next) => {
                self.set_paused_intent(true);
                self.play_index(next).await
            }
        };

        match result {
            Err(PlayerError::LoadCoalesced { .. }) => Ok(()),
            other => other,
        }
    }

    /// Applies `moves` in order. Invalid moves are skipped; the first one
    /// is reported once all valid moves have been applied.
    pub fn reorder_queue(&self, moves: &[QueueMove]) -> Result<(), PlayerError> {
        let result = self.state().queue.reorder(moves);
        self.emit_queue_changed();
        self.emit_index_updated();
        result
    }

    /// Empties the queue and unloads the current track.
    pub fn clear_queue(&self) {
        self.state().queue.clear();
        self.unload();
        self.emit_queue_changed();
    }

    /// Turns shuffle on (drawing a new order) or off. The current track
    /// stays current.
    pub fn set_shuffle(&self, enabled: bool) {
        self.state().queue.set_shuffle(enabled);
        self.emit(catalog::SHUFFLE_CHANGED, &[json!(enabled)]);
        self.emit_queue_changed();
        self.emit_index_updated();
    }

    pub fn set_repeat(&self, mode: RepeatMode) {
        self.state().intent.repeat = mode;
        self.emit(catalog::REPEAT_CHANGED, &[json!(mode.as_str())]);
    }

    // --- Transport ---

    /// Goes to the next track according to the repeat mode. Past the last
    /// track without repeat, playback pauses on it.
    pub async fn next(&self) -> Result<(), PlayerError> {
        let (service, step, prefer_default) = {
            let st = self.state();
            (
                st.services.active().service(),
                st.queue.next_step(st.intent.repeat),
                st.failed_over,
            )
        };
        service.pause();
        self.follow_step(step, prefer_default).await
    }

    /// Restarts the current track when it has played for longer than the
    /// restart threshold, otherwise goes to the previous track.
    pub async fn previous(&self) -> Result<(), PlayerError> {
        let (service, loaded, step, prefer_default) = {
            let st = self.state();
            (
                st.services.active().service(),
                st.track_loaded,
                st.queue.previous_step(st.intent.repeat),
                st.failed_over,
            )
        };

        let threshold = self.inner.config.previous_restart_threshold_ms;
        if loaded && service.current_time() > threshold {
            debug!("Restarting current track");
            service.seek_to_percentage(0.0);
            return Ok(());
        }

        service.pause();
        self.follow_step(step, prefer_default).await
    }

    async fn follow_step(&self, step: Option<Step>, prefer_default: bool) -> Result<(), PlayerError> {
        match step {
            None => {
                debug!("Queue is empty, nothing to play");
                self.state().automatic_next_allowed = true;
                Ok(())
            }
            Some(Step::Load(index)) => {
                self.load_track_with(index, prefer_default, HashSet::new())
                    .await
            }
            Some(Step::StopAt(index)) => {
                info!(index, "Reached the end of the queue, pausing");
                let service = {
                    let mut st = self.state();
                    st.queue.point_to(Some(index));
                    // The rewind below keeps the same track end from firing twice.
                    st.automatic_next_allowed = true;
                    st.track_loaded.then(|| st.services.active().service())
                };
                if let Some(service) = service {
                    service.seek_to_percentage(0.0);
                }
                self.set_paused_intent(true);
                self.emit_index_updated();
                Ok(())
            }
        }
    }

    /// Plays the loaded track. With nothing loaded, loads the current track
    /// (or the first one) and plays it.
    pub async fn play(&self) -> Result<(), PlayerError> {
        let (service, loaded, loading, start_at) = {
            let st = self.state();
            let start_at = (!st.queue.is_empty()).then(|| st.queue.current_index().unwrap_or(0));
            let loading = st.busy.load_track || st.busy.dynamic_switch;
            (st.services.active().service(), st.track_loaded, loading, start_at)
        };

        self.announce_paused_intent(false);
        if loaded {
            service.play();
            return Ok(());
        }
        if loading {
            // The intent is applied once the pending load settles.
            return Ok(());
        }
        match start_at {
            Some(index) => self.play_index(index).await,
            None => Ok(()),
        }
    }

    pub fn pause(&self) {
        let (service, loaded) = {
            let st = self.state();
            (st.services.active().service(), st.track_loaded)
        };
        self.announce_paused_intent(true);
        if loaded {
            service.pause();
        }
    }

    pub async fn toggle_play_pause(&self) -> Result<(), PlayerError> {
        if self.intent().paused {
            self.play().await
        } else {
            self.pause();
            Ok(())
        }
    }

    /// Seeks within the loaded track, `p` in [0, 1]. Ignored while a
    /// dynamic switch is repositioning the track itself.
    pub fn seek_to_percentage(&self, p: f64) -> Result<(), PlayerError> {
        if !check_unit(p) {
            return Err(PlayerError::InvalidPercentage(p));
        }
        let service = {
            let st = self.state();
            if st.busy.dynamic_switch {
                debug!(percentage = p, "Seek ignored during dynamic switch");
                return Ok(());
            }
            st.track_loaded.then(|| st.services.active().service())
        };
        if let Some(service) = service {
            service.seek_to_percentage(p);
        }
        Ok(())
    }

    /// Sets the volume, `v` in [0, 1]. While muted the service keeps
    /// receiving 0.
    pub fn set_volume(&self, v: f64) -> Result<(), PlayerError> {
        if !check_unit(v) {
            return Err(PlayerError::InvalidVolume(v));
        }
        let (service, effective) = {
            let mut st = self.state();
            st.intent.volume = v;
            (st.services.active().service(), st.intent.effective_volume())
        };
        service.set_volume(effective);
        self.emit(catalog::VOLUME_CHANGED, &[json!(v)]);
        Ok(())
    }

    pub fn set_muted(&self, muted: bool) {
        let (service, effective) = {
            let mut st = self.state();
            st.intent.muted = muted;
            (st.services.active().service(), st.intent.effective_volume())
        };
        service.set_volume(effective);
        self.emit(catalog::MUTE_CHANGED, &[json!(muted)]);
    }

    /// Unloads the active service's track. The current index is kept.
    pub fn unload(&self) {
        let service = {
            let mut st = self.state();
            st.track_loaded = false;
            st.reconcile.reset();
            st.services.active().service()
        };
        service.unload();
        self.emit_index_updated();
    }
}
