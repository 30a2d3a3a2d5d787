//! Contract every backend music service integration exposes to the player.
//!
//! The synchronous capabilities are split by concern, as the renderers of
//! the control point do; [`MusicService`] adds the two asynchronous
//! operations that may fail or take time.

use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::model::Track;

/// Transport commands. They never fail: a service that cannot honour one
/// is expected to log it, and the reconciler will retry when needed.
pub trait TransportControl {
    fn play(&self);

    fn pause(&self);

    /// Stops playback and releases the current track.
    fn unload(&self);

    /// Seeks to a fraction of the track duration, `p` in [0, 1].
    fn seek_to_percentage(&self, p: f64);
}

pub trait VolumeControl {
    /// Sets the output volume, `v` in [0, 1]. Mute is expressed as 0.
    fn set_volume(&self, v: f64);
}

/// State actually reported by the service.
pub trait PlaybackStatus {
    fn paused(&self) -> bool;

    /// Elapsed time of the current track, in milliseconds.
    fn current_time(&self) -> u64;

    /// Duration of the current track in milliseconds, 0 when unknown.
    fn duration(&self) -> u64;

    /// Buffered fraction of the current track, in [0, 1].
    fn percentage_loaded(&self) -> f64;
}

/// A backend media service (streaming provider SDK, local player, ...).
#[async_trait]
pub trait MusicService: TransportControl + VolumeControl + PlaybackStatus + Send + Sync {
    /// One-time setup, run lazily the first time the service is selected.
    async fn initialize(&self) -> Result<(), ServiceError>;

    /// Prepares `track` for playback. Fails when the service has no locator
    /// for it or cannot reach it.
    async fn load(&self, track: &Track) -> Result<(), ServiceError>;
}
