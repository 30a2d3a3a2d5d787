mod capabilities;
mod registry;

pub use capabilities::{MusicService, PlaybackStatus, TransportControl, VolumeControl};
pub use registry::{ServiceRegistration, ServiceRegistry};
