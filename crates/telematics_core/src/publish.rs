//! Publish gateway: hands records to the message transport.
//!
//! Routine records are sent once, fire-and-forget; a failure is counted and
//! returned to the caller, which does not retry. Crash records at or above the
//! G-force threshold go through confirmed delivery: up to `max_attempts`
//! attempts, each with a fresh correlation token and a bounded wait for the
//! broker acknowledgment, separated by `backoff_base_ms * attempt`. Running
//! out of attempts is a lost crash event: logged, counted, never an error.
//!
//! Every successful delivery is also handed to the broadcast sink. Broadcast
//! failures are logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use bevy_ecs::prelude::Resource;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::{Backoff, ThreadBackoff};
use crate::config::PublishConfig;
use crate::error::{BroadcastError, PublishError, TransportError};
use crate::metrics::PublishMetrics;
use crate::record::TelemetryRecord;
use crate::telemetry::DriverSnapshot;

/// Message transport. Implementations must be `Send + Sync` so the gateway
/// can live in a shared ECS resource.
pub trait Transport: Send + Sync {
    /// Fire-and-forget send.
    fn send(&self, exchange: &str, record: &TelemetryRecord) -> Result<(), TransportError>;

    /// Sends and blocks for up to `timeout` for the broker acknowledgment.
    /// `Ok(false)` is a negative acknowledgment or a timeout.
    fn send_confirmed(
        &self,
        exchange: &str,
        record: &TelemetryRecord,
        token: Uuid,
        timeout: Duration,
    ) -> Result<bool, TransportError>;
}

/// Live-dashboard sink. Must not block the caller.
pub trait BroadcastSink: Send + Sync {
    fn notify(&self, snapshot: &DriverSnapshot, record: &TelemetryRecord) -> Result<(), BroadcastError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcast;

impl BroadcastSink for NoopBroadcast {
    fn notify(&self, _: &DriverSnapshot, _: &TelemetryRecord) -> Result<(), BroadcastError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Routine record handed to the transport.
    Sent,
    /// Crash record acknowledged on attempt `attempts`.
    Confirmed { attempts: u32 },
    /// Crash record never acknowledged.
    CrashLost { attempts: u32 },
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, PublishOutcome::CrashLost { .. })
    }
}

pub struct PublishGateway {
    transport: Box<dyn Transport>,
    broadcast: Box<dyn BroadcastSink>,
    backoff: Box<dyn Backoff>,
    config: PublishConfig,
    metrics: Arc<PublishMetrics>,
}

impl PublishGateway {
    pub fn new(transport: Box<dyn Transport>, config: PublishConfig) -> Self {
        Self {
            transport,
            broadcast: Box::new(NoopBroadcast),
            backoff: Box::new(ThreadBackoff),
            config,
            metrics: Arc::new(PublishMetrics::default()),
        }
    }

    pub fn with_broadcast(mut self, broadcast: Box<dyn BroadcastSink>) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn with_backoff(mut self, backoff: Box<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn metrics(&self) -> Arc<PublishMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Publishes `record`. Only routine send failures are errors.
    pub fn publish(
        &self,
        record: TelemetryRecord,
        snapshot: &DriverSnapshot,
    ) -> Result<PublishOutcome, PublishError> {
        if record.requires_confirmation(self.config.crash_g_threshold) {
            return Ok(self.publish_confirmed(&record, snapshot));
        }

        if let Err(source) = self.transport.send(&self.config.exchange, &record) {
            self.metrics.record_send_failure();
            error!(
                "failed to publish telemetry for driver {}: {source}",
                record.driver_id
            );
            return Err(PublishError::Send {
                driver_id: record.driver_id,
                source,
            });
        }
        self.metrics.record_routine_sent();
        self.metrics
            .record_delivery(record.event_time.timestamp_millis());
        info!(
            "TELEMETRY | driver {} | VEH:{} | VIN:{} | {} | {:.1} mph (limit {}) | {:.2}g",
            record.driver_id,
            record.vehicle_id,
            record.vin,
            record.current_street,
            record.speed_mph,
            record.speed_limit_mph,
            record.g_force
        );
        self.broadcast(snapshot, &record);
        Ok(PublishOutcome::Sent)
    }

    fn publish_confirmed(&self, record: &TelemetryRecord, snapshot: &DriverSnapshot) -> PublishOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = Duration::from_millis(self.config.confirm_timeout_ms);
        for attempt in 1..=max_attempts {
            let token = Uuid::new_v4();
            match self
                .transport
                .send_confirmed(&self.config.exchange, record, token, timeout)
            {
                Ok(true) => {
                    self.metrics.record_crash_confirmed();
                    self.metrics
                        .record_delivery(record.event_time.timestamp_millis());
                    info!(
                        "CRASH | driver {} | {} | {:.2}g at {:.1} mph | confirmed on attempt {attempt} ({token})",
                        record.driver_id,
                        record
                            .accident_type
                            .map(|a| a.as_str())
                            .unwrap_or("UNKNOWN"),
                        record.g_force,
                        record.speed_mph
                    );
                    self.broadcast(snapshot, record);
                    return PublishOutcome::Confirmed { attempts: attempt };
                }
                Ok(false) => warn!(
                    "crash event for driver {} not acknowledged (attempt {attempt}/{max_attempts}, token {token})",
                    record.driver_id
                ),
                Err(err) => warn!(
                    "crash event for driver {} failed (attempt {attempt}/{max_attempts}, token {token}): {err}",
                    record.driver_id
                ),
            }
            if attempt < max_attempts {
                self.metrics.record_confirm_retry();
                self.backoff
                    .sleep(Duration::from_millis(self.config.backoff_base_ms * u64::from(attempt)));
            }
        }
        self.metrics.record_crash_lost();
        error!(
            "LOST CRASH EVENT | driver {} | {} | {:.2}g | no acknowledgment after {max_attempts} attempts",
            record.driver_id,
            record
                .accident_type
                .map(|a| a.as_str())
                .unwrap_or("UNKNOWN"),
            record.g_force
        );
        PublishOutcome::CrashLost {
            attempts: max_attempts,
        }
    }

    fn broadcast(&self, snapshot: &DriverSnapshot, record: &TelemetryRecord) {
        if let Err(err) = self.broadcast.notify(snapshot, record) {
            self.metrics.record_broadcast_failure();
            warn!("dashboard broadcast for driver {} dropped: {err}", record.driver_id);
        }
    }
}

/// ECS resource wrapping the gateway.
#[derive(Resource)]
pub struct GatewayResource(pub PublishGateway);

/// Transport that logs each record as JSON and always acknowledges.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl Transport for LogTransport {
    fn send(&self, exchange: &str, record: &TelemetryRecord) -> Result<(), TransportError> {
        debug!("{exchange} <- {}", record.to_json()?);
        Ok(())
    }

    fn send_confirmed(
        &self,
        exchange: &str,
        record: &TelemetryRecord,
        token: Uuid,
        _timeout: Duration,
    ) -> Result<bool, TransportError> {
        debug!("{exchange} <- [{token}] {}", record.to_json()?);
        Ok(true)
    }
}

/// One dashboard update.
#[derive(Debug, Clone)]
pub struct BroadcastUpdate {
    pub snapshot: DriverSnapshot,
    pub record: TelemetryRecord,
}

/// Broadcast sink backed by a bounded channel. Drops updates when full.
#[derive(Debug, Clone)]
pub struct ChannelBroadcastSink {
    tx: Sender<BroadcastUpdate>,
}

impl ChannelBroadcastSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<BroadcastUpdate>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl BroadcastSink for ChannelBroadcastSink {
    fn notify(&self, snapshot: &DriverSnapshot, record: &TelemetryRecord) -> Result<(), BroadcastError> {
        self.tx
            .try_send(BroadcastUpdate {
                snapshot: snapshot.clone(),
                record: record.clone(),
            })
            .map_err(|err| match err {
                TrySendError::Full(_) => BroadcastError::Full,
                TrySendError::Disconnected(_) => BroadcastError::Disconnected,
            })
    }
}
