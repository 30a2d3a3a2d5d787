//! In-memory ordered/shuffled track queue.
//!
//! Track identity is pointer identity: each queued [`Track`] is wrapped in
//! its own `Arc`, so the same track queued twice yields two distinct
//! entries, and the current track can be followed across shuffles and
//! moves by comparing pointers.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::errors::PlayerError;
use crate::model::{RepeatMode, Track};
use crate::queue::{DequeueEffect, QueueMove, QueueSnapshot, Step};

#[derive(Clone, Debug, Default)]
pub struct TrackQueue {
    ordered: Vec<Arc<Track>>,
    shuffled: Option<Vec<Arc<Track>>>,
    current_index: Option<usize>,
    waiting_to_load: Option<usize>,
}

fn position_of(tracks: &[Arc<Track>], track: &Arc<Track>) -> Option<usize> {
    tracks.iter().position(|t| Arc::ptr_eq(t, track))
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence every index refers to: shuffled when shuffle is on.
    pub fn active(&self) -> &[Arc<Track>] {
        self.shuffled.as_deref().unwrap_or(&self.ordered)
    }

    fn active_mut(&mut self) -> &mut Vec<Arc<Track>> {
        match self.shuffled {
            Some(ref mut shuffled) => shuffled,
            None => &mut self.ordered,
        }
    }

    pub fn ordered(&self) -> &[Arc<Track>] {
        &self.ordered
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled.is_some()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Track>> {
        self.active().get(index)
    }

    pub fn index_of(&self, track: &Arc<Track>) -> Option<usize> {
        position_of(self.active(), track)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_track(&self) -> Option<Arc<Track>> {
        self.current_index.and_then(|i| self.get(i)).cloned()
    }

    pub fn set_current_index(&mut self, index: Option<usize>) -> Result<(), PlayerError> {
        if let Some(i) = index {
            self.check_bounds(i)?;
        }
        self.current_index = index;
        Ok(())
    }

    /// Moves the current pointer to a position the caller got from this
    /// queue, or clears it. Out-of-range positions clear the pointer.
    pub(crate) fn point_to(&mut self, index: Option<usize>) {
        self.current_index = index.filter(|&i| i < self.len());
    }

    pub fn waiting_to_load(&self) -> Option<usize> {
        self.waiting_to_load
    }

    /// Records a pending load request, replacing any older one.
    pub fn set_waiting_to_load(&mut self, index: Option<usize>) {
        self.waiting_to_load = index;
    }

    pub fn take_waiting_to_load(&mut self) -> Option<usize> {
        self.waiting_to_load.take()
    }

    pub fn check_bounds(&self, index: usize) -> Result<(), PlayerError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(PlayerError::queue_bounds(index, self.len()))
        }
    }

    /// True when every queued track id appears in `tried`.
    pub fn all_tried(&self, tried: &HashSet<String>) -> bool {
        !self.is_empty() && self.ordered.iter().all(|t| tried.contains(&t.id))
    }

    /// Appends tracks at the end of the ordered sequence and, when shuffle
    /// is on, at the end of the shuffled one as well.
    ///
    /// Returns the new queue length.
    pub fn queue<I>(&mut self, tracks: I) -> usize
    where
        I: IntoIterator<Item = Track>,
    {
        for track in tracks {
            let track = Arc::new(track);
            if let Some(shuffled) = self.shuffled.as_mut() {
                shuffled.push(Arc::clone(&track));
            }
            self.ordered.push(track);
        }
        self.len()
    }

    /// Enables or disables shuffle while keeping the current track.
    ///
    /// Enabling always draws a fresh permutation, even if shuffle was
    /// already on. The pending load slot is cleared since its index
    /// referred to the previous order.
    pub fn set_shuffle(&mut self, enabled: bool) {
        let current = self.current_track();

        if enabled {
            let mut shuffled = self.ordered.clone();
            shuffled.shuffle(&mut rand::rng());
            self.shuffled = Some(shuffled);
        } else {
            self.shuffled = None;
        }

        self.current_index = current.and_then(|t| self.index_of(&t));
        self.waiting_to_load = None;
        debug!(
            shuffle = enabled,
            current_index = ?self.current_index,
            "Queue shuffle changed"
        );
    }

    /// Removes the track at `index` of the active queue from both
    /// sequences and tells the caller how playback must follow.
    pub fn dequeue(&mut self, index: usize, repeat: RepeatMode) -> Result<DequeueEffect, PlayerError> {
        self.check_bounds(index)?;

        let removed = self.active_mut().remove(index);
        if self.shuffled.is_some() {
            if let Some(pos) = position_of(&self.ordered, &removed) {
                self.ordered.remove(pos);
            }
        }

        match self.waiting_to_load {
            Some(w) if w == index => self.waiting_to_load = None,
            Some(w) if w > index => self.waiting_to_load = Some(w - 1),
            _ => {}
        }

        let len = self.len();
        if len == 0 {
            self.current_index = None;
            return Ok(DequeueEffect::Unload);
        }

        let effect = match self.current_index {
            Some(current) if current == index => match repeat {
                RepeatMode::One => {
                    self.current_index = None;
                    DequeueEffect::Unload
                }
                _ if index < len => {
                    self.current_index = Some(index);
                    DequeueEffect::Load(index)
                }
                RepeatMode::All => {
                    self.current_index = Some(0);
                    DequeueEffect::Load(0)
                }
                RepeatMode::Off => {
                    self.current_index = Some(len - 1);
                    DequeueEffect::LoadPaused(len - 1)
                }
            },
            Some(current) if current > index => {
                self.current_index = Some(current - 1);
                DequeueEffect::None
            }
            _ => DequeueEffect::None,
        };

        debug!(
            removed = removed.id.as_str(),
            index,
            effect = ?effect,
            "Track dequeued"
        );
        Ok(effect)
    }

    /// Applies `moves` one after the other to the active queue.
    ///
    /// Each move is checked on its own: an out-of-range move is skipped and
    /// the following ones still apply. Returns the first rejection, if any.
    pub fn reorder(&mut self, moves: &[QueueMove]) -> Result<(), PlayerError> {
        let mut first_error = None;

        for mv in moves {
            let len = self.len();
            if mv.old_index >= len || mv.new_index >= len {
                warn!(
                    old_index = mv.old_index,
                    new_index = mv.new_index,
                    len,
                    "Ignoring out-of-range queue move"
                );
                first_error.get_or_insert(PlayerError::queue_bounds(
                    mv.old_index.max(mv.new_index),
                    len,
                ));
                continue;
            }

            let current = self.current_track();
            let waiting = self.waiting_to_load.and_then(|i| self.get(i)).cloned();

            let active = self.active_mut();
            let track = active.remove(mv.old_index);
            active.insert(mv.new_index, track);

            self.current_index = current.and_then(|t| self.index_of(&t));
            self.waiting_to_load = waiting.and_then(|t| self.index_of(&t));
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        if let Some(shuffled) = self.shuffled.as_mut() {
            shuffled.clear();
        }
        self.current_index = None;
        self.waiting_to_load = None;
    }

    /// Target of a "next" command under `repeat`, `None` on an empty queue.
    pub fn next_step(&self, repeat: RepeatMode) -> Option<Step> {
        self.next_step_from(self.current_index, repeat)
    }

    /// Same as [`next_step`](Self::next_step), starting from `from` instead
    /// of the current index.
    pub fn next_step_from(&self, from: Option<usize>, repeat: RepeatMode) -> Option<Step> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let Some(current) = from.map(|c| c.min(len - 1)) else {
            return Some(Step::Load(0));
        };

        Some(match repeat {
            RepeatMode::One => Step::Load(current),
            RepeatMode::All => Step::Load((current + 1) % len),
            RepeatMode::Off if current + 1 < len => Step::Load(current + 1),
            RepeatMode::Off => Step::StopAt(current),
        })
    }

    /// Target of a "previous" command under `repeat`, `None` on an empty queue.
    pub fn previous_step(&self, repeat: RepeatMode) -> Option<Step> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let Some(current) = self.current_index.map(|c| c.min(len - 1)) else {
            return Some(Step::Load(0));
        };

        Some(match repeat {
            RepeatMode::One => Step::Load(current),
            RepeatMode::All => Step::Load((current + len - 1) % len),
            RepeatMode::Off if current > 0 => Step::Load(current - 1),
            RepeatMode::Off => Step::StopAt(0),
        })
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.active().to_vec(),
            current_index: self.current_index,
            shuffled: self.is_shuffled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| Track::new(*id, id.to_uppercase())).collect()
    }

    fn ids(queue: &TrackQueue) -> Vec<String> {
        queue.active().iter().map(|t| t.id.clone()).collect()
    }

    fn queue_of(ids: &[&str]) -> TrackQueue {
        let mut queue = TrackQueue::new();
        queue.queue(tracks(ids));
        queue
    }

    #[test]
    fn test_queue_appends_to_both_sequences() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_shuffle(true);
        assert_eq!(queue.queue(tracks(&["d"])), 4);

        assert_eq!(queue.active().last().unwrap().id, "d");
        assert_eq!(queue.ordered().last().unwrap().id, "d");
        assert_eq!(queue.active().len(), queue.ordered().len());
    }

    #[test]
    fn test_shuffle_preserves_current_track() {
        let mut queue = queue_of(&["a", "b", "c", "d", "e", "f"]);
        queue.set_current_index(Some(3)).unwrap();
        let before = queue.current_track().unwrap();

        queue.set_shuffle(true);
        let shuffled = queue.current_track().unwrap();
        assert!(Arc::ptr_eq(&before, &shuffled));

        let mut sorted = ids(&queue);
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d", "e", "f"]);

        queue.set_shuffle(false);
        assert_eq!(queue.current_index(), Some(3));
        assert!(Arc::ptr_eq(&before, &queue.current_track().unwrap()));
    }

    #[test]
    fn test_shuffle_without_current() {
        let mut queue = queue_of(&["a", "b"]);
        queue.set_waiting_to_load(Some(1));
        queue.set_shuffle(true);
        assert_eq!(queue.current_index(), None);
        assert_eq!(queue.waiting_to_load(), None);
    }

    #[test]
    fn test_dequeue_out_of_bounds() {
        let mut queue = queue_of(&["a"]);
        assert_eq!(
            queue.dequeue(1, RepeatMode::Off),
            Err(PlayerError::queue_bounds(1, 1))
        );
    }

    #[test]
    fn test_dequeue_last_track_unloads() {
        let mut queue = queue_of(&["a"]);
        queue.set_current_index(Some(0)).unwrap();
        assert_eq!(queue.dequeue(0, RepeatMode::All), Ok(DequeueEffect::Unload));
        assert!(queue.is_empty());
        assert_eq!(queue.current_index(), None);
    }

    #[test]
    fn test_dequeue_current_repeat_all_loads_successor() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_current_index(Some(1)).unwrap();
        assert_eq!(queue.dequeue(1, RepeatMode::All), Ok(DequeueEffect::Load(1)));
        assert_eq!(queue.current_track().unwrap().id, "c");
    }

    #[test]
    fn test_dequeue_current_at_end_wraps_or_stops() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_current_index(Some(2)).unwrap();
        assert_eq!(queue.dequeue(2, RepeatMode::All), Ok(DequeueEffect::Load(0)));

        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_current_index(Some(2)).unwrap();
        assert_eq!(
            queue.dequeue(2, RepeatMode::Off),
            Ok(DequeueEffect::LoadPaused(1))
        );
        assert_eq!(queue.current_index(), Some(1));
    }

    #[test]
    fn test_dequeue_current_repeat_one_unloads() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_current_index(Some(0)).unwrap();
        assert_eq!(queue.dequeue(0, RepeatMode::One), Ok(DequeueEffect::Unload));
        assert_eq!(queue.current_index(), None);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_dequeue_before_current_shifts_index() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_current_index(Some(2)).unwrap();
        assert_eq!(queue.dequeue(0, RepeatMode::Off), Ok(DequeueEffect::None));
        assert_eq!(queue.current_index(), Some(1));
        assert_eq!(queue.current_track().unwrap().id, "c");

        assert_eq!(queue.dequeue(1, RepeatMode::Off), Ok(DequeueEffect::LoadPaused(0)));
    }

    #[test]
    fn test_dequeue_clears_waiting_slot() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_waiting_to_load(Some(1));
        queue.dequeue(1, RepeatMode::Off).unwrap();
        assert_eq!(queue.waiting_to_load(), None);

        queue.set_waiting_to_load(Some(1));
        queue.dequeue(0, RepeatMode::Off).unwrap();
        assert_eq!(queue.waiting_to_load(), Some(0));
    }

    #[test]
    fn test_dequeue_in_shuffle_removes_from_both() {
        let mut queue = queue_of(&["a", "b", "c", "d"]);
        queue.set_shuffle(true);
        let removed = queue.get(2).unwrap().id.clone();
        queue.dequeue(2, RepeatMode::Off).unwrap();

        assert_eq!(queue.ordered().len(), 3);
        assert_eq!(queue.active().len(), 3);
        assert!(queue.ordered().iter().all(|t| t.id != removed));

        queue.set_shuffle(false);
        assert!(ids(&queue).iter().all(|id| *id != removed));
    }

    #[test]
    fn test_reorder_follows_current_track() {
        let mut queue = queue_of(&["a", "b", "c", "d"]);
        queue.set_current_index(Some(0)).unwrap();

        queue
            .reorder(&[QueueMove::new(0, 3), QueueMove::new(0, 1)])
            .unwrap();
        assert_eq!(ids(&queue), vec!["c", "b", "d", "a"]);
        assert_eq!(queue.current_index(), Some(3));
    }

    #[test]
    fn test_reorder_validates_each_move() {
        let mut queue = queue_of(&["a", "b", "c"]);
        let result = queue.reorder(&[QueueMove::new(5, 0), QueueMove::new(2, 0)]);
        assert!(matches!(result, Err(PlayerError::QueueBounds { .. })));
        assert_eq!(ids(&queue), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_next_and_previous_steps() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.next_step(RepeatMode::Off), Some(Step::Load(0)));

        queue.set_current_index(Some(2)).unwrap();
        assert_eq!(queue.next_step(RepeatMode::Off), Some(Step::StopAt(2)));
        assert_eq!(queue.next_step(RepeatMode::All), Some(Step::Load(0)));
        assert_eq!(queue.next_step(RepeatMode::One), Some(Step::Load(2)));

        queue.set_current_index(Some(0)).unwrap();
        assert_eq!(queue.previous_step(RepeatMode::Off), Some(Step::StopAt(0)));
        assert_eq!(queue.previous_step(RepeatMode::All), Some(Step::Load(2)));

        assert_eq!(TrackQueue::new().next_step(RepeatMode::All), None);
    }

    #[test]
    fn test_all_tried() {
        let queue = queue_of(&["a", "b"]);
        let mut tried = HashSet::new();
        tried.insert("a".to_string());
        assert!(!queue.all_tried(&tried));
        tried.insert("b".to_string());
        assert!(queue.all_tried(&tried));
        assert!(!TrackQueue::new().all_tried(&tried));
    }

    #[test]
    fn test_point_to() {
        let mut queue = queue_of(&["a", "b"]);
        queue.point_to(Some(1));
        assert_eq!(queue.current_track().unwrap().id, "b");
        queue.point_to(Some(5));
        assert_eq!(queue.current_index(), None);
        queue.point_to(Some(0));
        queue.point_to(None);
        assert_eq!(queue.current_index(), None);
    }
}
