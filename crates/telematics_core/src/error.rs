//! Error types for configuration, routing, spawning, transport and manual triggers.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to load or validate a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure to supply a route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no routes loaded")]
    NoRoutes,
    #[error("route `{0}` has no waypoints")]
    EmptyRoute(String),
    #[error("failed to read route file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse route file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A driver could not be initialized and was skipped.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("driver {driver_id}: {source}")]
    Route {
        driver_id: u32,
        #[source]
        source: RouteError,
    },
    #[error("driver {driver_id}: invalid home coordinates ({latitude}, {longitude})")]
    InvalidHome {
        driver_id: u32,
        latitude: f64,
        longitude: f64,
    },
    #[error("driver {0} is already registered")]
    Duplicate(u32),
}

/// Error reported by a message transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("message rejected: {0}")]
    Rejected(String),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Routine publish failure. Lost crash events are not errors; see
/// [`crate::publish::PublishOutcome::CrashLost`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to publish record for driver {driver_id}: {source}")]
    Send {
        driver_id: u32,
        #[source]
        source: TransportError,
    },
}

/// Error from a dashboard broadcast sink. Always swallowed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("broadcast channel is full")]
    Full,
    #[error("broadcast channel is disconnected")]
    Disconnected,
}

/// Structured refusal of a manual crash request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("driver {0} not found")]
    DriverNotFound(u32),
    #[error("driver {0} is already in post-crash idle")]
    AlreadyCrashed(u32),
    #[error("driver {driver_id} crashed too recently ({remaining_secs}s of cooldown left)")]
    CooldownActive { driver_id: u32, remaining_secs: u64 },
    #[error("no driver is eligible for a crash")]
    NoEligibleDriver,
    #[error("simulation has no drivers")]
    NoDrivers,
    #[error("simulation loop did not answer the crash request")]
    LoopUnavailable,
}
