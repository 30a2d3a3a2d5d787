use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A playable track as supplied by the library layer.
///
/// `locators` maps a music service name to that service's opaque reference
/// for the track. A service without an entry cannot load the track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub locators: HashMap<String, String>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: None,
            album: None,
            locators: HashMap::new(),
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_locator(mut self, service: impl Into<String>, locator: impl Into<String>) -> Self {
        self.locators.insert(service.into(), locator.into());
        self
    }

    /// Returns the locator registered for `service`, if any.
    pub fn locator(&self, service: &str) -> Option<&str> {
        self.locators.get(service).map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "one" => Ok(RepeatMode::One),
            "all" => Ok(RepeatMode::All),
            other => Err(format!("unknown repeat mode '{other}'")),
        }
    }
}

/// Lifecycle of the track at the current index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    Idle,
    Loading,
    Paused,
    Playing,
}

/// Playback position as reported by the active service.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeInfo {
    /// Elapsed time in milliseconds.
    pub time_ms: u64,
    /// Track duration in milliseconds (0 when unknown).
    pub duration_ms: u64,
    /// `time_ms / duration_ms`, clamped to [0, 1].
    pub percentage: f64,
    /// Buffered fraction reported by the service.
    pub percentage_loaded: f64,
}

impl TimeInfo {
    pub fn new(time_ms: u64, duration_ms: u64, percentage_loaded: f64) -> Self {
        let percentage = if duration_ms == 0 {
            0.0
        } else {
            (time_ms as f64 / duration_ms as f64).clamp(0.0, 1.0)
        };
        Self {
            time_ms,
            duration_ms,
            percentage,
            percentage_loaded: percentage_loaded.clamp(0.0, 1.0),
        }
    }

    pub fn remaining_ms(&self) -> u64 {
        self.duration_ms.saturating_sub(self.time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_mode_parse() {
        assert_eq!("all".parse::<RepeatMode>(), Ok(RepeatMode::All));
        assert_eq!(" One ".parse::<RepeatMode>(), Ok(RepeatMode::One));
        assert!("twice".parse::<RepeatMode>().is_err());
        assert_eq!(RepeatMode::Off.to_string(), "off");
    }

    #[test]
    fn test_time_info_percentage() {
        let info = TimeInfo::new(30_000, 120_000, 0.5);
        assert_eq!(info.percentage, 0.25);
        assert_eq!(info.remaining_ms(), 90_000);

        let unknown = TimeInfo::new(1_000, 0, 2.0);
        assert_eq!(unknown.percentage, 0.0);
        assert_eq!(unknown.percentage_loaded, 1.0);
    }

    #[test]
    fn test_track_locator() {
        let track = Track::new("t1", "Song").with_locator("alpha", "alpha:42");
        assert_eq!(track.locator("alpha"), Some("alpha:42"));
        assert_eq!(track.locator("beta"), None);
    }
}
