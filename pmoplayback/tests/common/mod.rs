//! Service de musique factice, scriptable, partagé par les tests d'intégration.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use pmoplayback::{
    MusicService, PlaybackConfig, PlaybackStatus, Player, ServiceError, ServiceRegistration, Track,
    TransportControl, VolumeControl,
};
use serde_json::Value;

pub const TRACK_DURATION_MS: u64 = 180_000;

#[derive(Default)]
struct MockState {
    paused: bool,
    time: u64,
    duration: u64,
    volume: f64,
    current: Option<String>,
    loads: Vec<String>,
    load_attempts: usize,
    init_calls: usize,
    commands: Vec<String>,
    fail_init: bool,
    fail_all_loads: bool,
    refused: HashSet<String>,
    init_delay: Duration,
    load_delay: Duration,
    ignored_seeks: usize,
}

pub struct MockService {
    name: String,
    state: Mutex<MockState>,
}

impl MockService {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(MockState {
                paused: true,
                volume: 1.0,
                ..Default::default()
            }),
        })
    }

    fn st(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn registration(self: &Arc<Self>) -> ServiceRegistration {
        ServiceRegistration::new(self.name.clone(), Arc::clone(self) as Arc<dyn MusicService>)
    }

    // --- Scénario ---

    pub fn fail_init(&self, fail: bool) {
        self.st().fail_init = fail;
    }

    pub fn fail_all_loads(&self, fail: bool) {
        self.st().fail_all_loads = fail;
    }

    pub fn refuse(&self, track_id: &str) {
        self.st().refused.insert(track_id.to_string());
    }

    pub fn set_init_delay(&self, delay: Duration) {
        self.st().init_delay = delay;
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.st().load_delay = delay;
    }

    /// The next `n` seeks are acknowledged but have no effect.
    pub fn ignore_seeks(&self, n: usize) {
        self.st().ignored_seeks = n;
    }

    pub fn set_time(&self, ms: u64) {
        self.st().time = ms;
    }

    /// Changes the reported paused state without going through the player.
    pub fn force_paused(&self, paused: bool) {
        self.st().paused = paused;
    }

    // --- Observations ---

    pub fn loads(&self) -> Vec<String> {
        self.st().loads.clone()
    }

    pub fn load_attempts(&self) -> usize {
        self.st().load_attempts
    }

    pub fn init_calls(&self) -> usize {
        self.st().init_calls
    }

    pub fn commands(&self) -> Vec<String> {
        self.st().commands.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.st()
            .commands
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    pub fn current(&self) -> Option<String> {
        self.st().current.clone()
    }

    pub fn time(&self) -> u64 {
        self.st().time
    }

    pub fn volume(&self) -> f64 {
        self.st().volume
    }

    pub fn is_paused(&self) -> bool {
        self.st().paused
    }
}

impl TransportControl for MockService {
    fn play(&self) {
        let mut st = self.st();
        st.paused = false;
        st.commands.push("play".into());
    }

    fn pause(&self) {
        let mut st = self.st();
        st.paused = true;
        st.commands.push("pause".into());
    }

    fn unload(&self) {
        let mut st = self.st();
        st.paused = true;
        st.current = None;
        st.time = 0;
        st.commands.push("unload".into());
    }

    fn seek_to_percentage(&self, p: f64) {
        let mut st = self.st();
        st.commands.push("seek".into());
        if st.ignored_seeks > 0 {
            st.ignored_seeks -= 1;
            return;
        }
        st.time = (p * st.duration as f64).round() as u64;
    }
}

impl VolumeControl for MockService {
    fn set_volume(&self, v: f64) {
        self.st().volume = v;
    }
}

impl PlaybackStatus for MockService {
    fn paused(&self) -> bool {
        self.st().paused
    }

    fn current_time(&self) -> u64 {
        self.st().time
    }

    fn duration(&self) -> u64 {
        self.st().duration
    }

    fn percentage_loaded(&self) -> f64 {
        if self.st().current.is_some() { 1.0 } else { 0.0 }
    }
}

#[async_trait]
impl MusicService for MockService {
    async fn initialize(&self) -> Result<(), ServiceError> {
        let (delay, fail) = {
            let mut st = self.st();
            st.init_calls += 1;
            (st.init_delay, st.fail_init)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ServiceError::Unavailable(format!("{} is down", self.name)));
        }
        Ok(())
    }

    async fn load(&self, track: &Track) -> Result<(), ServiceError> {
        let delay = {
            let mut st = self.st();
            st.load_attempts += 1;
            st.load_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut st = self.st();
        if st.fail_all_loads || st.refused.contains(&track.id) {
            return Err(ServiceError::NoLocator {
                service: self.name.clone(),
                track: track.id.clone(),
            });
        }
        st.current = Some(track.id.clone());
        st.loads.push(track.id.clone());
        st.time = 0;
        st.duration = TRACK_DURATION_MS;
        st.paused = true;
        Ok(())
    }
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter()
        .map(|id| Track::new(*id, format!("Track {id}")))
        .collect()
}

pub fn player_with(services: &[&Arc<MockService>]) -> Player {
    let registrations = services.iter().map(|s| s.registration()).collect();
    Player::new(registrations, PlaybackConfig::default()).unwrap()
}

pub fn drain(rx: &Receiver<Vec<Value>>) -> Vec<Vec<Value>> {
    rx.try_iter().collect()
}

/// Lets spawned tasks (automatic advance, late service calls) run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
