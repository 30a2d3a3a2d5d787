use std::time::Duration;

use thiserror::Error;

/// Contract violations raised by the [`EventBus`](crate::events::EventBus).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("Event name must not be empty")]
    EmptyEventName,
    #[error("Event '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("Event '{0}' is not registered")]
    NotRegistered(String),
    #[error("Invalid parameter type '{0}'")]
    InvalidParamType(String),
    #[error("Event '{event}': parameter name must not be empty")]
    EmptyParamName { event: String },
    #[error("Event '{event}': duplicate parameter '{param}'")]
    DuplicateParam { event: String, param: String },
    #[error("Event '{event}': required parameter '{param}' follows an optional one")]
    RequiredAfterOptional { event: String, param: String },
    #[error("Event '{event}': handler accepts {accepted} parameters, {required} required")]
    HandlerArity {
        event: String,
        accepted: usize,
        required: usize,
    },
    #[error("Event '{event}': invalid argument for '{param}' (expected {expected})")]
    InvalidArgument {
        event: String,
        param: String,
        expected: String,
    },
    #[error("Event '{event}': expected at most {expected} arguments, got {got}")]
    TooManyArguments {
        event: String,
        expected: usize,
        got: usize,
    },
}

/// Failures reported by a [`MusicService`](crate::music_service::MusicService).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Track '{track}' has no locator for service '{service}'")]
    NoLocator { service: String, track: String },
    #[error("{0}")]
    Failed(String),
}

/// Broad classification of [`PlayerError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments or bad event usage. Never retried.
    ContractViolation,
    /// An initialize/load/switch exceeded its budget.
    OperationTimeout,
    /// A backend explicitly refused the operation.
    AdapterRejection,
    /// Every service (or every track) has been tried.
    Exhaustion,
    /// Index not present in the active queue.
    QueueBounds,
    /// Another operation of the same category is in flight.
    Busy,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),
    #[error("Invalid percentage {0}, expected a value in [0, 1]")]
    InvalidPercentage(f64),
    #[error("Invalid volume {0}, expected a value in [0, 1]")]
    InvalidVolume(f64),
    #[error("Unknown music service '{0}'")]
    UnknownService(String),
    #[error("Invalid player configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Index {index} out of bounds for queue of length {len}")]
    QueueBounds { index: usize, len: usize },
    #[error("Operation '{operation}' timed out after {budget:?}")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },
    #[error("Service '{service}' rejected the operation: {source}")]
    Rejected {
        service: String,
        #[source]
        source: ServiceError,
    },
    #[error("Track '{track}' failed on every music service")]
    ServicesExhausted { track: String },
    #[error("Every track in the queue failed to load")]
    TracksExhausted,
    #[error("Busy: {0} already in progress")]
    Busy(&'static str),
    #[error("Load already in progress, index {index} is waiting")]
    LoadCoalesced { index: usize },
}

impl PlayerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::Bus(_)
            | PlayerError::InvalidPercentage(_)
            | PlayerError::InvalidVolume(_)
            | PlayerError::UnknownService(_)
            | PlayerError::InvalidConfiguration(_) => ErrorKind::ContractViolation,
            PlayerError::QueueBounds { .. } => ErrorKind::QueueBounds,
            PlayerError::Timeout { .. } => ErrorKind::OperationTimeout,
            PlayerError::Rejected { .. } => ErrorKind::AdapterRejection,
            PlayerError::ServicesExhausted { .. } | PlayerError::TracksExhausted => {
                ErrorKind::Exhaustion
            }
            PlayerError::Busy(_) | PlayerError::LoadCoalesced { .. } => ErrorKind::Busy,
        }
    }

    /// Timeouts and backend rejections feed the failover logic; everything
    /// else is final for the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::OperationTimeout | ErrorKind::AdapterRejection
        )
    }

    pub fn rejected(service: &str, source: ServiceError) -> Self {
        PlayerError::Rejected {
            service: service.to_string(),
            source,
        }
    }

    pub fn queue_bounds(index: usize, len: usize) -> Self {
        PlayerError::QueueBounds { index, len }
    }
}
