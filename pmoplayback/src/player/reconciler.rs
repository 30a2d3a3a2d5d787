//! Periodic convergence of the active service toward the play/pause intent.
//!
//! Each tick publishes a `time_update` and, unless an operation is in
//! flight or the track is about to end, compares the intended paused state
//! with the one the service reports. A mismatch is only corrected once it
//! has lasted longer than the cooldown, so that services reporting their
//! state with some lag are not flooded with commands.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, trace};

use crate::player::state::Correction;
use crate::player::{Player, catalog, read_time};
use crate::ticker::Ticker;

impl Player {
    /// Starts the reconciliation loop. Does nothing if it already runs.
    /// Must be called from within a tokio runtime.
    pub fn start_reconciling(&self) {
        let mut slot = self
            .inner
            .reconciler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(Ticker::is_running) {
            debug!("Reconciler already running");
            return;
        }

        let player = Arc::downgrade(&self.inner);
        *slot = Some(Ticker::spawn(
            "reconciler",
            self.inner.config.reconcile_interval(),
            move |elapsed| {
                if let Some(inner) = player.upgrade() {
                    Player { inner }.reconcile_tick(elapsed);
                }
            },
        ));
    }

    /// Stops the reconciliation loop. No tick runs afterwards.
    pub fn stop_reconciling(&self) {
        let ticker = self
            .inner
            .reconciler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ticker) = ticker {
            ticker.cancel();
        }
    }

    pub fn is_reconciling(&self) -> bool {
        self.inner
            .reconciler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Ticker::is_running)
    }

    /// One reconciliation step, `elapsed` being the time since the
    /// previous one.
    pub fn reconcile_tick(&self, elapsed: Duration) {
        let service = {
            let mut st = self.state();
            if st.busy.any() || !st.track_loaded {
                st.reconcile.reset();
                return;
            }
            st.services.active().service()
        };

        let info = read_time(service.as_ref());
        self.emit(
            catalog::TIME_UPDATE,
            &[
                json!(info.time_ms),
                json!(info.duration_ms),
                json!(info.percentage),
                json!(info.percentage_loaded),
            ],
        );

        let end_guard = self.inner.config.end_guard_ms;
        if info.duration_ms > 0 && info.remaining_ms() <= end_guard {
            trace!(remaining_ms = info.remaining_ms(), "Near track end, not reconciling");
            return;
        }

        let actual_paused = service.paused();
        let correction = {
            let mut st = self.state();
            // A time_update subscriber may have started an operation.
            if st.busy.any() || !st.track_loaded {
                st.reconcile.reset();
                return;
            }
            let intent_paused = st.intent.paused;
            let cooldown = self.inner.config.reconcile_cooldown();
            st.reconcile
                .observe(intent_paused, actual_paused, elapsed, cooldown)
        };

        match correction {
            Some(Correction::Pause) => {
                info!("Service playing against intent, pausing it");
                service.pause();
            }
            Some(Correction::Play) => {
                info!("Service paused against intent, resuming it");
                service.play();
            }
            None => {}
        }
    }
}
