use std::collections::HashSet;
use std::time::Duration;

use crate::model::RepeatMode;
use crate::music_service::ServiceRegistry;
use crate::queue::TrackQueue;

/// Desired playback state. The active service's reported state is kept
/// converging toward it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intent {
    pub paused: bool,
    pub muted: bool,
    pub volume: f64,
    pub repeat: RepeatMode,
}

impl Intent {
    pub(crate) fn new(volume: f64) -> Self {
        Self {
            paused: true,
            muted: false,
            volume,
            repeat: RepeatMode::Off,
        }
    }

    /// Volume actually sent to a service.
    pub fn effective_volume(&self) -> f64 {
        if self.muted { 0.0 } else { self.volume }
    }
}

/// One flag per category of in-flight operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusyFlags {
    /// A service `load` call is pending.
    pub load: bool,
    /// A whole failover procedure (including track advances) is running.
    pub load_track: bool,
    /// A service `initialize` call is pending.
    pub loading_service: bool,
    /// A position-preserving service switch is running.
    pub dynamic_switch: bool,
}

impl BusyFlags {
    pub fn any(&self) -> bool {
        self.load || self.load_track || self.loading_service || self.dynamic_switch
    }
}

/// Corrective command issued by the reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Correction {
    Pause,
    Play,
}

/// Time during which a paused/playing mismatch has been observed.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ReconcileState {
    pause_due: Option<Duration>,
    play_due: Option<Duration>,
}

impl ReconcileState {
    pub(crate) fn reset(&mut self) {
        self.pause_due = None;
        self.play_due = None;
    }

    /// Feeds one observation. Returns a correction once a mismatch has
    /// lasted longer than `cooldown`, and restarts the count after it.
    pub(crate) fn observe(
        &mut self,
        intent_paused: bool,
        actual_paused: bool,
        elapsed: Duration,
        cooldown: Duration,
    ) -> Option<Correction> {
        let (due, other, correction) = match (intent_paused, actual_paused) {
            (true, false) => (&mut self.pause_due, &mut self.play_due, Correction::Pause),
            (false, true) => (&mut self.play_due, &mut self.pause_due, Correction::Play),
            _ => {
                self.reset();
                return None;
            }
        };
        *other = None;

        match due {
            None => {
                *due = Some(Duration::ZERO);
                None
            }
            Some(acc) => {
                *acc += elapsed;
                if *acc > cooldown {
                    *due = None;
                    Some(correction)
                } else {
                    None
                }
            }
        }
    }
}

/// Everything the player mutates. Guarded by a single mutex that is never
/// held across an `.await` or while publishing events.
#[derive(Debug)]
pub(crate) struct PlayerState {
    pub queue: TrackQueue,
    pub services: ServiceRegistry,
    pub intent: Intent,
    pub busy: BusyFlags,
    /// Services already attempted for the track being loaded.
    pub services_tried: HashSet<String>,
    pub track_loaded: bool,
    /// The active service was reached by failover rather than chosen.
    pub failed_over: bool,
    /// One-shot latch preventing several auto-advances for one track end.
    pub automatic_next_allowed: bool,
    pub reconcile: ReconcileState,
}

impl PlayerState {
    pub(crate) fn new(services: ServiceRegistry, volume: f64) -> Self {
        Self {
            queue: TrackQueue::new(),
            services,
            intent: Intent::new(volume),
            busy: BusyFlags::default(),
            services_tried: HashSet::new(),
            track_loaded: false,
            failed_over: false,
            automatic_next_allowed: true,
            reconcile: ReconcileState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(250);
    const COOLDOWN: Duration = Duration::from_millis(1000);

    #[test]
    fn test_correction_waits_for_cooldown() {
        let mut state = ReconcileState::default();
        let mut corrections = Vec::new();
        for _ in 0..6 {
            corrections.push(state.observe(true, false, TICK, COOLDOWN));
        }
        assert_eq!(
            corrections,
            vec![None, None, None, None, None, Some(Correction::Pause)]
        );
        assert_eq!(state.observe(true, false, TICK, COOLDOWN), None);
    }

    #[test]
    fn test_agreement_resets_accumulators() {
        let mut state = ReconcileState::default();
        for _ in 0..5 {
            assert_eq!(state.observe(false, true, TICK, COOLDOWN), None);
        }
        assert_eq!(state.observe(false, false, TICK, COOLDOWN), None);
        for _ in 0..5 {
            assert_eq!(state.observe(false, true, TICK, COOLDOWN), None);
        }
        assert_eq!(
            state.observe(false, true, TICK, COOLDOWN),
            Some(Correction::Play)
        );
    }

    #[test]
    fn test_effective_volume() {
        let mut intent = Intent::new(0.7);
        assert_eq!(intent.effective_volume(), 0.7);
        intent.muted = true;
        assert_eq!(intent.effective_volume(), 0.0);
    }
}
