use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::Track;

/// Point-in-time copy of the active queue.
#[derive(Clone, Debug)]
pub struct QueueSnapshot {
    /// Tracks of the active queue, in play order.
    pub tracks: Vec<Arc<Track>>,
    /// Index of the current track in `tracks`.
    pub current_index: Option<usize>,
    pub shuffled: bool,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_track(&self) -> Option<&Arc<Track>> {
        self.current_index.and_then(|i| self.tracks.get(i))
    }
}

/// Moves the track at `old_index` so that it ends up at `new_index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMove {
    pub old_index: usize,
    pub new_index: usize,
}

impl QueueMove {
    pub fn new(old_index: usize, new_index: usize) -> Self {
        Self {
            old_index,
            new_index,
        }
    }
}

/// What the player must do after a track has been removed from the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DequeueEffect {
    /// Nothing to reload.
    None,
    /// Stop and unload the service.
    Unload,
    /// Load the track now at this index.
    Load(usize),
    /// Load the track at this index and leave it paused.
    LoadPaused(usize),
}

/// Navigation target computed from the current index and repeat mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Load the track at this index.
    Load(usize),
    /// Queue boundary reached without repeat: stay on this index, paused.
    StopAt(usize),
}
