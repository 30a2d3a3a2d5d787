// examples/failover_demo.rs
//
// Démo de la bascule entre services de musique :
//   - deux services en mémoire, "streaming" (défaut) et "local"
//   - "streaming" ne connaît pas certaines pistes : le player bascule sur "local"
//   - changement dynamique de service en cours de lecture
//   - affichage des événements publiés sur le bus
//
// Build et run (depuis la racine du crate pmoplayback) :
//   RUST_LOG=pmoplayback=debug cargo run --example failover_demo

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pmoplayback::{
    EventBus, Handler, MusicService, PlaybackConfig, PlaybackStatus, Player, ServiceError,
    ServiceRegistration, Track, TransportControl, VolumeControl, catalog,
};
use tracing_subscriber::EnvFilter;

/// Lecteur simulé : le temps avance de 250 ms à chaque lecture de position
/// tant qu'il joue.
struct SimulatedService {
    name: &'static str,
    known: HashSet<&'static str>,
    state: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    playing: bool,
    time: u64,
    duration: u64,
}

impl SimulatedService {
    fn new(name: &'static str, known: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            name,
            known: known.iter().copied().collect(),
            state: Mutex::new(SimState::default()),
        })
    }

    fn st(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }
}

impl TransportControl for SimulatedService {
    fn play(&self) {
        self.st().playing = true;
    }

    fn pause(&self) {
        self.st().playing = false;
    }

    fn unload(&self) {
        *self.st() = SimState::default();
    }

    fn seek_to_percentage(&self, p: f64) {
        let mut st = self.st();
        st.time = (p * st.duration as f64) as u64;
    }
}

impl VolumeControl for SimulatedService {
    fn set_volume(&self, v: f64) {
        println!("  [{}] volume -> {v:.2}", self.name);
    }
}

impl PlaybackStatus for SimulatedService {
    fn paused(&self) -> bool {
        !self.st().playing
    }

    fn current_time(&self) -> u64 {
        let mut st = self.st();
        if st.playing {
            st.time = (st.time + 250).min(st.duration);
        }
        st.time
    }

    fn duration(&self) -> u64 {
        self.st().duration
    }

    fn percentage_loaded(&self) -> f64 {
        1.0
    }
}

#[async_trait]
impl MusicService for SimulatedService {
    async fn initialize(&self) -> Result<(), ServiceError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    async fn load(&self, track: &Track) -> Result<(), ServiceError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !self.known.contains(track.id.as_str()) {
            return Err(ServiceError::NoLocator {
                service: self.name.to_string(),
                track: track.id.clone(),
            });
        }
        *self.st() = SimState {
            playing: false,
            time: 0,
            duration: 5_000,
        };
        Ok(())
    }
}

fn print_events(bus: &EventBus) -> anyhow::Result<()> {
    for name in catalog::names() {
        if name == catalog::TIME_UPDATE {
            continue;
        }
        bus.subscribe(
            name,
            Handler::new(4, move |args| {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                println!("  event {name}({})", args.join(", "));
            }),
        )?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
    println!("Starting pmoplayback failover demo...");

    let streaming = SimulatedService::new("streaming", &["intro", "outro"]);
    let local = SimulatedService::new("local", &["intro", "b-side", "outro"]);

    let player = Player::new(
        vec![
            ServiceRegistration::new("streaming", streaming),
            ServiceRegistration::new("local", local),
        ],
        PlaybackConfig::load(None)?,
    )?;
    print_events(player.bus())?;

    player.queue([
        Track::new("intro", "Intro"),
        Track::new("b-side", "B-Side"),
        Track::new("outro", "Outro"),
    ]);
    player.start_reconciling();

    println!("\n1. Playing the first track");
    player.play().await?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    println!("\n2. Moving playback to 'local' without losing the position");
    let outcome = player.dynamically_change_music_service("local").await?;
    println!("  -> {outcome:?}");

    println!("\n3. Next track: only 'local' has it");
    player.next().await?;
    println!("  -> playing on '{}'", player.active_service());

    println!("\n4. Letting the queue play to its end");
    tokio::time::sleep(Duration::from_secs(12)).await;

    player.stop_reconciling();
    println!("\nDone, final state: {:?}", player.track_state());
    Ok(())
}
