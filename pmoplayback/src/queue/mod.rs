//! Queue management for the player.
//!
//! The queue keeps two parallel sequences of the same tracks: the ordered
//! one (insertion order) and, while shuffle is enabled, a shuffled
//! permutation of it. Every index-based operation works on the *active*
//! sequence. This module never talks to a music service: operations that
//! require a load or an unload return a [`DequeueEffect`] or a [`Step`]
//! that the player applies.

mod snapshot;
mod track_queue;

pub use snapshot::{DequeueEffect, QueueMove, QueueSnapshot, Step};
pub use track_queue::TrackQueue;
