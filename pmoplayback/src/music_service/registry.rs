use std::fmt;
use std::sync::Arc;

use crate::errors::PlayerError;
use crate::music_service::MusicService;

/// One backend known to the player.
#[derive(Clone)]
pub struct ServiceRegistration {
    name: String,
    service: Arc<dyn MusicService>,
    initialized: bool,
}

impl ServiceRegistration {
    pub fn new(name: impl Into<String>, service: Arc<dyn MusicService>) -> Self {
        Self {
            name: name.into(),
            service,
            initialized: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> Arc<dyn MusicService> {
        Arc::clone(&self.service)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("name", &self.name)
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Fixed, ordered set of registrations. Index 0 is the default service.
#[derive(Debug)]
pub struct ServiceRegistry {
    entries: Vec<ServiceRegistration>,
    active: usize,
}

impl ServiceRegistry {
    pub fn new(entries: Vec<ServiceRegistration>) -> Result<Self, PlayerError> {
        if entries.is_empty() {
            return Err(PlayerError::InvalidConfiguration(
                "at least one music service is required".to_string(),
            ));
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(PlayerError::InvalidConfiguration(format!(
                    "duplicate music service '{}'",
                    entry.name
                )));
            }
        }
        Ok(Self { entries, active: 0 })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ServiceRegistration> {
        self.entries.get(index)
    }

    pub fn index_of(&self, name: &str) -> Result<usize, PlayerError> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| PlayerError::UnknownService(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &ServiceRegistration {
        &self.entries[self.active]
    }

    pub(crate) fn set_active(&mut self, index: usize) {
        if index < self.entries.len() {
            self.active = index;
        }
    }

    pub(crate) fn mark_initialized(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.initialized = true;
        }
    }

    /// Index following `index`, wrapping around.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.entries.len()
    }
}
