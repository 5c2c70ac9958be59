//! Runtime control surface.
//!
//! Flags live in [`SimulationControl`] as atomics so a control thread can flip
//! them without locking; the loop reads them every iteration. Manual crash
//! requests travel over a channel and are answered on a per-request channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy_ecs::prelude::Resource;
use crossbeam_channel::{Receiver, Sender};
use log::info;

use crate::accident::AccidentType;
use crate::error::TriggerError;
use crate::publish::PublishOutcome;

pub const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug)]
pub struct SimulationControl {
    paused: AtomicBool,
    stopped: AtomicBool,
    interval_ms: AtomicU64,
    random_accidents_enabled: AtomicBool,
}

impl Default for SimulationControl {
    fn default() -> Self {
        Self::new(500, false)
    }
}

impl SimulationControl {
    pub fn new(interval_ms: u64, random_accidents_enabled: bool) -> Self {
        Self {
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            interval_ms: AtomicU64::new(interval_ms.max(MIN_INTERVAL_MS)),
            random_accidents_enabled: AtomicBool::new(random_accidents_enabled),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Acquire)
    }

    /// Values below [`MIN_INTERVAL_MS`] are raised to it.
    pub fn set_interval_ms(&self, interval_ms: u64) -> u64 {
        let applied = interval_ms.max(MIN_INTERVAL_MS);
        self.interval_ms.store(applied, Ordering::Release);
        applied
    }

    pub fn random_accidents_enabled(&self) -> bool {
        self.random_accidents_enabled.load(Ordering::Acquire)
    }

    pub fn set_random_accidents_enabled(&self, enabled: bool) {
        self.random_accidents_enabled.store(enabled, Ordering::Release);
    }
}

/// ECS resource sharing the control flags with systems.
#[derive(Debug, Clone, Resource)]
pub struct ControlResource(pub Arc<SimulationControl>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashTarget {
    /// Any driver not in post-crash idle and out of cooldown.
    Random,
    Driver(u32),
}

/// Result of a successful manual crash.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashReport {
    pub driver_id: u32,
    pub accident: AccidentType,
    pub speed_at_impact_mph: f64,
    /// `None` when the crash record failed to publish.
    pub publish_outcome: Option<PublishOutcome>,
}

/// Manual crash request queued for the simulation loop.
#[derive(Debug)]
pub struct CrashRequest {
    pub target: CrashTarget,
    pub reply: Sender<Result<CrashReport, TriggerError>>,
    /// The requester stops waiting at this instant; the loop must not apply
    /// the crash afterwards.
    pub deadline: Instant,
}

impl CrashRequest {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Cloneable handle for controlling a running simulation from another thread.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    control: Arc<SimulationControl>,
    commands: Sender<CrashRequest>,
}

impl ControlHandle {
    pub fn new(control: Arc<SimulationControl>, commands: Sender<CrashRequest>) -> Self {
        Self { control, commands }
    }

    /// Handle plus the receiving end the loop drains.
    pub fn channel(control: Arc<SimulationControl>) -> (Self, Receiver<CrashRequest>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(control, tx), rx)
    }

    pub fn control(&self) -> &SimulationControl {
        &self.control
    }

    pub fn pause(&self) {
        self.control.set_paused(true);
        info!("simulation paused");
    }

    pub fn resume(&self) {
        self.control.set_paused(false);
        info!("simulation resumed");
    }

    pub fn stop(&self) {
        self.control.stop();
        info!("simulation stop requested");
    }

    pub fn set_interval_ms(&self, interval_ms: u64) -> u64 {
        let applied = self.control.set_interval_ms(interval_ms);
        info!("message interval set to {applied} ms");
        applied
    }

    pub fn set_random_accidents(&self, enabled: bool) {
        self.control.set_random_accidents_enabled(enabled);
        info!(
            "random accidents {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Queues a manual crash and waits up to `timeout` for the loop's answer.
    /// A request the loop reaches after `timeout` is discarded unapplied.
    pub fn trigger_crash(
        &self,
        target: CrashTarget,
        timeout: Duration,
    ) -> Result<CrashReport, TriggerError> {
        let (reply, answer) = crossbeam_channel::bounded(1);
        let deadline = Instant::now() + timeout;
        self.commands
            .send(CrashRequest {
                target,
                reply,
                deadline,
            })
            .map_err(|_| TriggerError::LoopUnavailable)?;
        answer
            .recv_timeout(timeout)
            .map_err(|_| TriggerError::LoopUnavailable)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_has_a_floor() {
        let control = SimulationControl::new(10, false);
        assert_eq!(control.interval_ms(), MIN_INTERVAL_MS);
        assert_eq!(control.set_interval_ms(50), MIN_INTERVAL_MS);
        assert_eq!(control.set_interval_ms(750), 750);
        assert_eq!(control.interval_ms(), 750);
    }

    #[test]
    fn flags_are_visible_across_threads() {
        let control = Arc::new(SimulationControl::default());
        let (handle, _rx) = ControlHandle::channel(Arc::clone(&control));
        std::thread::spawn(move || {
            handle.pause();
            handle.set_random_accidents(true);
            handle.stop();
        })
        .join()
        .expect("control thread");
        assert!(control.is_paused());
        assert!(control.random_accidents_enabled());
        assert!(control.is_stopped());
    }

    #[test]
    fn trigger_without_a_loop_reports_unavailable() {
        let control = Arc::new(SimulationControl::default());
        let (handle, rx) = ControlHandle::channel(control);
        drop(rx);
        assert_eq!(
            handle.trigger_crash(CrashTarget::Random, Duration::from_millis(10)),
            Err(TriggerError::LoopUnavailable)
        );
    }

    #[test]
    fn trigger_receives_the_loop_reply() {
        let control = Arc::new(SimulationControl::default());
        let (handle, rx) = ControlHandle::channel(control);
        let worker = std::thread::spawn(move || {
            let request = rx.recv().expect("request");
            assert_eq!(request.target, CrashTarget::Driver(4));
            request
                .reply
                .send(Err(TriggerError::DriverNotFound(4)))
                .expect("reply");
        });
        let result = handle.trigger_crash(CrashTarget::Driver(4), Duration::from_secs(5));
        worker.join().expect("worker");
        assert_eq!(result, Err(TriggerError::DriverNotFound(4)));
    }
}
