//! Events published by the [`Player`](crate::player::Player).
//!
//! They are all registered on the player's bus by [`register`] under the
//! registrant [`REGISTRANT`]; subscribe to them by name.

use crate::errors::BusError;
use crate::events::{EventBus, ParamDef, ParamType};

pub const REGISTRANT: &str = "pmoplayback";

/// `(length: number)`
pub const QUEUE_CHANGED: &str = "queue_changed";
/// `(index: number, service: string)`
pub const TRACK_LOADING: &str = "track_loading";
/// `(index: number, service: string)`
pub const TRACK_LOADED: &str = "track_loaded";
/// `(index: number, reason: string)`
pub const TRACK_LOAD_FAILED: &str = "track_load_failed";
/// `(index?: number)`, absent when nothing is current.
pub const INDEX_UPDATED: &str = "index_updated";
/// `(paused: boolean)`
pub const PLAY_PAUSE_CHANGED: &str = "play_pause_changed";
/// `(volume: number)`
pub const VOLUME_CHANGED: &str = "volume_changed";
/// `(muted: boolean)`
pub const MUTE_CHANGED: &str = "mute_changed";
/// `(mode: string)`
pub const REPEAT_CHANGED: &str = "repeat_changed";
/// `(shuffle: boolean)`
pub const SHUFFLE_CHANGED: &str = "shuffle_changed";
/// `(time: number, duration: number, percentage: number, percentage_loaded: number)`
pub const TIME_UPDATE: &str = "time_update";
/// `(service: string)`
pub const MUSIC_SERVICE_CHANGED: &str = "music_service_changed";
/// `(reason: string)`
pub const PLAYBACK_EXHAUSTED: &str = "playback_exhausted";

fn definitions() -> Vec<(&'static str, Vec<ParamDef>, &'static str)> {
    use ParamType::*;

    vec![
        (
            QUEUE_CHANGED,
            vec![ParamDef::required("length", Number)],
            "Tracks were added, removed or moved",
        ),
        (
            TRACK_LOADING,
            vec![
                ParamDef::required("index", Number),
                ParamDef::required("service", String),
            ],
            "A track load started",
        ),
        (
            TRACK_LOADED,
            vec![
                ParamDef::required("index", Number),
                ParamDef::required("service", String),
            ],
            "A track is loaded on a music service",
        ),
        (
            TRACK_LOAD_FAILED,
            vec![
                ParamDef::required("index", Number),
                ParamDef::required("reason", String),
            ],
            "A track failed on every music service",
        ),
        (
            INDEX_UPDATED,
            vec![ParamDef::optional("index", Number)],
            "The current queue index changed",
        ),
        (
            PLAY_PAUSE_CHANGED,
            vec![ParamDef::required("paused", Boolean)],
            "The play/pause intent changed",
        ),
        (
            VOLUME_CHANGED,
            vec![ParamDef::required("volume", Number)],
            "The volume changed",
        ),
        (
            MUTE_CHANGED,
            vec![ParamDef::required("muted", Boolean)],
            "Mute was toggled",
        ),
        (
            REPEAT_CHANGED,
            vec![ParamDef::required("mode", String)],
            "The repeat mode changed",
        ),
        (
            SHUFFLE_CHANGED,
            vec![ParamDef::required("shuffle", Boolean)],
            "Shuffle was toggled",
        ),
        (
            TIME_UPDATE,
            vec![
                ParamDef::required("time", Number).with_description("elapsed milliseconds"),
                ParamDef::required("duration", Number).with_description("milliseconds"),
                ParamDef::required("percentage", Number),
                ParamDef::required("percentage_loaded", Number),
            ],
            "Periodic playback position",
        ),
        (
            MUSIC_SERVICE_CHANGED,
            vec![ParamDef::required("service", String)],
            "Another music service became active",
        ),
        (
            PLAYBACK_EXHAUSTED,
            vec![ParamDef::required("reason", String)],
            "Playback stopped because nothing more could be loaded",
        ),
    ]
}

/// Registers every player event on `bus`.
pub fn register(bus: &EventBus) -> Result<(), BusError> {
    for (name, params, description) in definitions() {
        bus.register(name, params, Some(description), Some(REGISTRANT))?;
    }
    Ok(())
}

/// Names of every player event.
pub fn names() -> Vec<&'static str> {
    definitions().into_iter().map(|(name, _, _)| name).collect()
}
