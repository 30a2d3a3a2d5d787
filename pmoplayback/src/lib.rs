//! # pmoplayback - Playback orchestration over several music services
//!
//! `pmoplayback` drives a queue of tracks across interchangeable backend
//! music services (streaming SDKs, local players...). It picks the service
//! that can play each track, fails over to the next one when a service
//! rejects a track or times out, switches services while a track plays
//! without losing its position, and keeps each service's paused/playing
//! state in line with what the user asked for.
//!
//! ## Main pieces
//!
//! - [`EventBus`]: typed publish/subscribe registry carrying every state
//!   change ([`player::catalog`] lists the player's events)
//! - [`TrackQueue`]: ordered/shuffled queue with repeat-aware navigation
//! - [`MusicService`]: the contract a backend implements
//! - [`Player`]: the orchestrator tying them together
//! - [`PlaybackConfig`]: timings and policies, loaded from YAML and the
//!   environment
//!
//! ## Example
//!
//! ```rust,ignore
//! use pmoplayback::{PlaybackConfig, Player, ServiceRegistration, Track};
//!
//! let player = Player::new(
//!     vec![
//!         ServiceRegistration::new("primary", primary),
//!         ServiceRegistration::new("backup", backup),
//!     ],
//!     PlaybackConfig::load(None)?,
//! )?;
//!
//! let volume = player.bus().listen(pmoplayback::catalog::VOLUME_CHANGED)?;
//! player.queue([Track::new("t1", "Song").with_locator("primary", "id:42")]);
//! player.start_reconciling();
//! player.play().await?;
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod model;
pub mod music_service;
pub mod player;
pub mod queue;
pub mod ticker;

pub use config::PlaybackConfig;
pub use errors::{BusError, ErrorKind, PlayerError, ServiceError};
pub use events::{EventBus, EventDefinition, Handler, ParamDef, ParamType, SubscriptionId};
pub use model::{RepeatMode, TimeInfo, Track, TrackState};
pub use music_service::{
    MusicService, PlaybackStatus, ServiceRegistration, ServiceRegistry, TransportControl,
    VolumeControl,
};
pub use player::{BusyFlags, Intent, Player, SwitchOutcome, catalog};
pub use queue::{DequeueEffect, QueueMove, QueueSnapshot, Step, TrackQueue};
pub use ticker::Ticker;
