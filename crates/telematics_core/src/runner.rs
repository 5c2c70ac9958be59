//! Simulation runner: selects a driver, sets the clock and runs the tick schedule.
//!
//! Clock progression and driver selection happen here, outside systems. Each
//! tick inserts the chosen entity as [`CurrentTick`], resets [`TickOutcome`],
//! then runs `behavior -> movement -> synthesize -> publish`. Manual crashes
//! apply the crash transition directly and run `synthesize -> publish` so the
//! crash record goes out at the instant of the trigger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy_ecs::prelude::{Entity, Mut, Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use rand::Rng;

use crate::accident::{AccidentCatalog, AccidentType};
use crate::clock::{
    Backoff, CurrentTick, SimulationClock, SystemTimeSource, ThreadBackoff, TimeSource, ONE_MIN_MS,
};
use crate::config::{cap_drivers, CrashConfig, DriverConfig, SimulationConfig};
use crate::control::{ControlHandle, CrashReport, CrashRequest, CrashTarget, SimulationControl};
use crate::ecs::{BehaviorState, Driver};
use crate::error::{ConfigError, PublishError, SpawnError, TriggerError};
use crate::metrics::PublishMetrics;
use crate::publish::{BroadcastSink, LogTransport, PublishGateway, PublishOutcome, Transport};
use crate::record::TelemetryRecord;
use crate::routing::{FileRouteSource, RouteSource};
use crate::scenario::{build_world, SimRng};
use crate::spawner::{spawn_drivers, SpawnReport};
use crate::systems::{
    behavior::{behavior_system, check_manual_trigger, crash_driver},
    movement::movement_system,
    publish::publish_system,
    synthesize::synthesize_system,
    TickOutcome,
};
use crate::telemetry::{DriverFinalStats, DriverSnapshot, SharedSnapshots, SimCounts};

/// Per-tick pipeline for one driver.
pub fn tick_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            behavior_system,
            movement_system,
            synthesize_system,
            publish_system,
        )
            .chain(),
    );
    schedule
}

/// Emits the crash record for a driver whose crash transition was applied by the caller.
pub fn crash_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((synthesize_system, publish_system).chain());
    schedule
}

/// What one tick produced.
#[derive(Debug)]
pub struct TickReport {
    pub driver_id: u32,
    pub state: BehaviorState,
    pub crash: Option<AccidentType>,
    pub record: Option<TelemetryRecord>,
    pub publish: Option<Result<PublishOutcome, PublishError>>,
}

impl TickReport {
    pub fn delivered(&self) -> bool {
        matches!(&self.publish, Some(Ok(outcome)) if outcome.is_delivered())
    }
}

pub struct SimulationBuilder {
    config: SimulationConfig,
    drivers: Vec<DriverConfig>,
    routes: Option<Box<dyn RouteSource>>,
    transport: Option<Box<dyn Transport>>,
    broadcast: Option<Box<dyn BroadcastSink>>,
    backoff: Option<Box<dyn Backoff>>,
    sleeper: Option<Box<dyn Backoff>>,
    time: Option<Box<dyn TimeSource>>,
}

impl SimulationBuilder {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            drivers: Vec::new(),
            routes: None,
            transport: None,
            broadcast: None,
            backoff: None,
            sleeper: None,
            time: None,
        }
    }

    pub fn drivers(mut self, drivers: Vec<DriverConfig>) -> Self {
        self.drivers = drivers;
        self
    }

    pub fn routes(mut self, routes: Box<dyn RouteSource>) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn broadcast(mut self, broadcast: Box<dyn BroadcastSink>) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    /// Delay between confirmed-publish attempts.
    pub fn backoff(mut self, backoff: Box<dyn Backoff>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Pacing between ticks and while paused.
    pub fn sleeper(mut self, sleeper: Box<dyn Backoff>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn time_source(mut self, time: Box<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn build(self) -> Result<Simulation, ConfigError> {
        self.config.validate()?;
        let config = self.config;
        let time = self.time.unwrap_or_else(|| Box::new(SystemTimeSource));
        let now = time.now_ms();

        let mut gateway = PublishGateway::new(
            self.transport.unwrap_or_else(|| Box::new(LogTransport)),
            config.publish.clone(),
        );
        if let Some(broadcast) = self.broadcast {
            gateway = gateway.with_broadcast(broadcast);
        }
        if let Some(backoff) = self.backoff {
            gateway = gateway.with_backoff(backoff);
        }
        let metrics = gateway.metrics();

        let control = Arc::new(SimulationControl::new(
            config.interval_ms,
            config.crash.random_accidents_enabled,
        ));
        let (handle, commands) = ControlHandle::channel(Arc::clone(&control));

        let mut world = World::new();
        build_world(
            &mut world,
            &config,
            self.routes.unwrap_or_else(|| Box::new(FileRouteSource::demo())),
            gateway,
            Arc::clone(&control),
            now,
        );

        let mut sim = Simulation {
            world,
            tick_schedule: tick_schedule(),
            crash_schedule: crash_schedule(),
            drivers: Vec::new(),
            control,
            handle,
            commands,
            snapshots: SharedSnapshots::default(),
            metrics,
            time,
            sleeper: self.sleeper.unwrap_or_else(|| Box::new(ThreadBackoff)),
            messages: 0,
            config,
        };
        let drivers = cap_drivers(self.drivers, sim.config.max_drivers);
        let report = sim.spawn(&drivers);
        info!(
            "simulation ready: {} drivers, {} skipped, random accidents {}",
            report.spawned.len(),
            report.skipped.len(),
            if sim.control.random_accidents_enabled() {
                "enabled"
            } else {
                "disabled"
            }
        );
        Ok(sim)
    }
}

pub struct Simulation {
    world: World,
    tick_schedule: Schedule,
    crash_schedule: Schedule,
    /// Sorted by driver id; random selection indexes into it.
    drivers: Vec<(u32, Entity)>,
    control: Arc<SimulationControl>,
    handle: ControlHandle,
    commands: Receiver<CrashRequest>,
    snapshots: SharedSnapshots,
    metrics: Arc<PublishMetrics>,
    time: Box<dyn TimeSource>,
    sleeper: Box<dyn Backoff>,
    messages: u64,
    config: SimulationConfig,
}

impl Simulation {
    pub fn builder(config: SimulationConfig) -> SimulationBuilder {
        SimulationBuilder::new(config)
    }

    fn spawn(&mut self, configs: &[DriverConfig]) -> SpawnReport {
        let now = self.sync_clock();
        let report = spawn_drivers(&mut self.world, configs, now);
        self.refresh_driver_index();
        report
    }

    /// Adds one driver to a running simulation.
    pub fn add_driver(&mut self, config: DriverConfig) -> Result<u32, SpawnError> {
        let mut report = self.spawn(std::slice::from_ref(&config));
        match report.skipped.pop() {
            Some(err) => Err(err),
            None => Ok(config.driver_id),
        }
    }

    fn refresh_driver_index(&mut self) {
        let mut query = self.world.query::<(Entity, &Driver)>();
        let mut drivers: Vec<(u32, Entity)> = query
            .iter(&self.world)
            .map(|(entity, driver)| (driver.driver_id(), entity))
            .collect();
        drivers.sort_by_key(|(id, _)| *id);
        self.snapshots.replace_all(
            query
                .iter(&self.world)
                .map(|(_, driver)| DriverSnapshot::from_driver(driver))
                .collect(),
        );
        self.drivers = drivers;
    }

    fn sync_clock(&mut self) -> u64 {
        let now = self.time.now_ms();
        let mut clock = self.world.resource_mut::<SimulationClock>();
        clock.set(now);
        clock.now()
    }

    fn entity_of(&self, driver_id: u32) -> Option<Entity> {
        self.drivers
            .iter()
            .find(|(id, _)| *id == driver_id)
            .map(|(_, entity)| *entity)
    }

    /// Runs one tick for a uniformly chosen driver. `None` without drivers.
    pub fn tick(&mut self) -> Option<TickReport> {
        if self.drivers.is_empty() {
            return None;
        }
        let len = self.drivers.len();
        let index = self.world.resource_mut::<SimRng>().0.gen_range(0..len);
        let entity = self.drivers[index].1;
        Some(self.run_tick(entity))
    }

    /// Runs one tick for the given driver.
    pub fn tick_driver(&mut self, driver_id: u32) -> Option<TickReport> {
        let entity = self.entity_of(driver_id)?;
        Some(self.run_tick(entity))
    }

    fn run_tick(&mut self, entity: Entity) -> TickReport {
        self.sync_clock();
        self.world.insert_resource(TickOutcome::default());
        self.world.insert_resource(CurrentTick(entity));
        self.tick_schedule.run(&mut self.world);
        self.finish_tick(entity)
    }

    fn finish_tick(&mut self, entity: Entity) -> TickReport {
        let outcome = std::mem::take(&mut *self.world.resource_mut::<TickOutcome>());
        let (driver_id, state) = self
            .world
            .get::<Driver>(entity)
            .map(|d| (d.driver_id(), d.state()))
            .unwrap_or((0, BehaviorState::Parked));
        if let Some(snapshot) = outcome.snapshot {
            self.snapshots.upsert(snapshot);
        }
        if outcome.record.is_some() {
            self.messages += 1;
            if self.config.summary_every > 0 && self.messages % self.config.summary_every == 0 {
                self.log_summary();
            }
        }
        TickReport {
            driver_id,
            state,
            crash: outcome.crash,
            record: outcome.record,
            publish: outcome.publish,
        }
    }

    /// Crashes a driver on demand. Bypasses the probability gate but not the
    /// cooldown; the crash record is synthesized and published immediately.
    pub fn trigger_crash(&mut self, target: CrashTarget) -> Result<CrashReport, TriggerError> {
        let now = self.sync_clock();
        let cooldown = self.world.resource::<CrashConfig>().manual_cooldown_secs;
        let entity = match self.resolve_target(target, cooldown, now) {
            Ok(entity) => entity,
            Err(err) => {
                warn!("manual crash rejected: {err}");
                return Err(err);
            }
        };

        let snapshot = self.world.resource_scope(|world, catalog: Mut<AccidentCatalog>| {
            world.resource_scope(|world, mut rng: Mut<SimRng>| {
                world
                    .get_mut::<Driver>(entity)
                    .map(|mut driver| crash_driver(&mut driver, &catalog, now, &mut rng.0))
            })
        });
        let Some(snapshot) = snapshot else {
            return Err(TriggerError::LoopUnavailable);
        };

        self.world.insert_resource(TickOutcome {
            crash: Some(snapshot.accident),
            ..TickOutcome::default()
        });
        self.world.insert_resource(CurrentTick(entity));
        self.crash_schedule.run(&mut self.world);
        let report = self.finish_tick(entity);
        Ok(CrashReport {
            driver_id: report.driver_id,
            accident: snapshot.accident,
            speed_at_impact_mph: snapshot.speed_at_impact_mph,
            publish_outcome: match report.publish {
                Some(Ok(outcome)) => Some(outcome),
                _ => None,
            },
        })
    }

    fn resolve_target(
        &mut self,
        target: CrashTarget,
        cooldown_secs: u64,
        now: u64,
    ) -> Result<Entity, TriggerError> {
        match target {
            CrashTarget::Driver(id) => {
                let entity = self.entity_of(id).ok_or(TriggerError::DriverNotFound(id))?;
                let driver = self
                    .world
                    .get::<Driver>(entity)
                    .ok_or(TriggerError::DriverNotFound(id))?;
                check_manual_trigger(driver, cooldown_secs, now)?;
                Ok(entity)
            }
            CrashTarget::Random => {
                if self.drivers.is_empty() {
                    return Err(TriggerError::NoDrivers);
                }
                let eligible: Vec<Entity> = self
                    .drivers
                    .iter()
                    .filter(|(_, entity)| {
                        self.world
                            .get::<Driver>(*entity)
                            .is_some_and(|d| check_manual_trigger(d, cooldown_secs, now).is_ok())
                    })
                    .map(|(_, entity)| *entity)
                    .collect();
                if eligible.is_empty() {
                    return Err(TriggerError::NoEligibleDriver);
                }
                let index = self
                    .world
                    .resource_mut::<SimRng>()
                    .0
                    .gen_range(0..eligible.len());
                Ok(eligible[index])
            }
        }
    }

    /// Answers queued manual crash requests. Requests whose caller already
    /// gave up are dropped without touching any driver and are not counted.
    pub fn drain_commands(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(request) = self.commands.try_recv() {
            if request.is_expired(Instant::now()) {
                warn!(
                    "discarding expired manual crash request for {:?}",
                    request.target
                );
                continue;
            }
            let result = self.trigger_crash(request.target);
            if request.reply.send(result).is_err() {
                debug!("crash requester went away before the reply");
            }
            handled += 1;
        }
        handled
    }

    /// Delay before the next tick: interval plus uniform jitter, floored.
    pub fn next_delay(&mut self) -> Duration {
        let interval = self.control.interval_ms() as i64;
        let jitter = self.config.jitter_ms as i64;
        let offset = if jitter > 0 {
            self.world
                .resource_mut::<SimRng>()
                .0
                .gen_range(-jitter..=jitter)
        } else {
            0
        };
        let ms = (interval + offset).max(self.config.min_sleep_ms as i64);
        Duration::from_millis(ms as u64)
    }

    /// Runs until stopped, then logs per-driver totals.
    pub fn run(&mut self) {
        info!("simulation loop started with {} drivers", self.drivers.len());
        while self.step() {}
        info!(
            "simulation loop stopped after {} messages ({})",
            self.messages,
            self.metrics.summary()
        );
        self.log_final_stats();
    }

    /// Runs at most `iterations` loop iterations, fewer if stopped first.
    /// Paused iterations count. Returns the iterations run.
    pub fn run_for(&mut self, iterations: usize) -> usize {
        let mut done = 0;
        while done < iterations && self.step() {
            done += 1;
        }
        done
    }

    /// One loop iteration. Returns `false` once stopped.
    fn step(&mut self) -> bool {
        self.drain_commands();
        if self.control.is_stopped() {
            return false;
        }
        if self.control.is_paused() {
            self.sleeper
                .sleep(Duration::from_millis(self.config.pause_poll_ms));
            return true;
        }
        self.tick();
        let delay = self.next_delay();
        self.sleeper.sleep(delay);
        true
    }

    /// Per-driver totals ordered by driver id.
    pub fn final_stats(&mut self) -> Vec<DriverFinalStats> {
        let mut query = self.world.query::<&Driver>();
        let mut stats: Vec<DriverFinalStats> = query
            .iter(&self.world)
            .map(DriverFinalStats::from_driver)
            .collect();
        stats.sort_by_key(|s| s.driver_id);
        stats
    }

    pub fn log_final_stats(&mut self) -> Vec<DriverFinalStats> {
        let stats = self.final_stats();
        info!("final driver statistics:");
        for s in &stats {
            info!(
                "  driver {}{} | {} msgs | final state {} | crashed {}",
                s.driver_id,
                s.driver_name
                    .as_deref()
                    .map(|name| format!(" ({name})"))
                    .unwrap_or_default(),
                s.message_count,
                s.state,
                if s.crashed { "yes" } else { "no" }
            );
        }
        stats
    }

    fn log_summary(&mut self) {
        let now = self.world.resource::<SimulationClock>().now();
        let mut counts = SimCounts::default();
        let mut query = self.world.query::<&Driver>();
        for driver in query.iter(&self.world) {
            counts.add_driver(driver.state());
            let since_crash = match driver.last_crash_at_ms {
                Some(at) => format!("{}m", now.saturating_sub(at) / ONE_MIN_MS),
                None => "never".to_string(),
            };
            info!(
                "  driver {} | {} | {:.1} mph | {} msgs | last crash {}",
                driver.driver_id(),
                driver.state(),
                driver.speed_mph(),
                driver.message_count,
                since_crash
            );
        }
        info!(
            "SUMMARY | {} messages | driving {} parked {} stopped {} break {} crashed {} | {}",
            self.messages,
            counts.driving,
            counts.parked,
            counts.traffic_stop,
            counts.break_time,
            counts.post_crash_idle,
            self.metrics.summary()
        );
    }

    pub fn control_handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn control(&self) -> &SimulationControl {
        &self.control
    }

    pub fn snapshots(&self) -> SharedSnapshots {
        self.snapshots.clone()
    }

    pub fn metrics(&self) -> Arc<PublishMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn driver(&self, driver_id: u32) -> Option<&Driver> {
        self.world.get::<Driver>(self.entity_of(driver_id)?)
    }

    /// Direct mutable access, for tests and tooling that need to stage a state.
    pub fn driver_mut(&mut self, driver_id: u32) -> Option<Mut<'_, Driver>> {
        let entity = self.entity_of(driver_id)?;
        self.world.get_mut::<Driver>(entity)
    }

    pub fn driver_ids(&self) -> Vec<u32> {
        self.drivers.iter().map(|(id, _)| *id).collect()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages
    }

    pub fn counts(&self) -> SimCounts {
        self.snapshots.counts()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::test_helpers::{
        test_driver_config, test_route_source, RecordingBackoff, RecordingTransport,
    };

    const START_MS: u64 = 1_709_303_400_000;

    fn sim(drivers: u32) -> (Simulation, ManualTimeSource, RecordingTransport, RecordingBackoff) {
        let time = ManualTimeSource::new(START_MS);
        let transport = RecordingTransport::default();
        let sleeper = RecordingBackoff::default();
        let config = SimulationConfig {
            seed: Some(11),
            ..SimulationConfig::default()
        };
        let sim = Simulation::builder(config)
            .drivers((1..=drivers).map(test_driver_config).collect())
            .routes(Box::new(test_route_source()))
            .transport(Box::new(transport.clone()))
            .backoff(Box::new(RecordingBackoff::default()))
            .sleeper(Box::new(sleeper.clone()))
            .time_source(Box::new(time.clone()))
            .build()
            .expect("simulation");
        (sim, time, transport, sleeper)
    }

    #[test]
    fn builder_spawns_and_snapshots_drivers() {
        let (sim, _, _, _) = sim(3);
        assert_eq!(sim.driver_ids(), vec![1, 2, 3]);
        assert_eq!(sim.snapshots().len(), 3);
        assert_eq!(sim.counts().total(), 3);
    }

    #[test]
    fn each_tick_publishes_one_record() {
        let (mut sim, time, transport, _) = sim(2);
        for _ in 0..10 {
            time.advance(Duration::from_millis(500));
            let report = sim.tick().expect("tick");
            assert!(report.delivered());
        }
        assert_eq!(transport.sent().len(), 10);
        assert_eq!(sim.messages_sent(), 10);
    }

    #[test]
    fn tick_without_drivers_is_none() {
        let (mut sim, _, _, _) = sim(0);
        assert!(sim.tick().is_none());
        assert_eq!(
            sim.trigger_crash(CrashTarget::Random),
            Err(TriggerError::NoDrivers)
        );
    }

    #[test]
    fn pacing_is_jittered_and_floored() {
        let (mut sim, _, _, _) = sim(1);
        for _ in 0..100 {
            let delay = sim.next_delay();
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn paused_loop_skips_generation() {
        let (mut sim, _, transport, sleeper) = sim(2);
        sim.control_handle().pause();
        assert_eq!(sim.run_for(0), 0);
        assert!(sim.step());
        assert!(transport.sent().is_empty());
        assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(300)]);
    }

    #[test]
    fn stop_ends_the_loop() {
        let (mut sim, _, _, _) = sim(2);
        sim.control_handle().stop();
        sim.run();
        assert_eq!(sim.messages_sent(), 0);
    }

    #[test]
    fn final_stats_cover_every_driver() {
        let (mut sim, time, _, _) = sim(3);
        for _ in 0..3 {
            time.advance(Duration::from_millis(500));
            sim.tick();
        }
        if let Some(mut d) = sim.driver_mut(2) {
            d.set_state(BehaviorState::Driving, START_MS);
            d.set_speed(30.0);
        }
        sim.trigger_crash(CrashTarget::Driver(2)).expect("crash");

        let stats = sim.log_final_stats();
        assert_eq!(
            stats.iter().map(|s| s.driver_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(stats.iter().map(|s| s.message_count).sum::<u64>(), sim.messages_sent());
        assert!(stats[1].crashed);
        assert_eq!(stats[1].state, BehaviorState::PostCrashIdle);
        assert!(!stats[0].crashed && !stats[2].crashed);
    }

    #[test]
    fn manual_crash_reports_and_publishes() {
        let (mut sim, _, transport, _) = sim(1);
        if let Some(mut d) = sim.driver_mut(1) {
            d.set_state(BehaviorState::Driving, START_MS);
            d.set_speed(42.0);
        }
        let report = sim.trigger_crash(CrashTarget::Driver(1)).expect("crash");
        assert_eq!(report.speed_at_impact_mph, 42.0);
        assert!(matches!(
            report.publish_outcome,
            Some(PublishOutcome::Confirmed { attempts: 1 })
        ));
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].speed_mph, 42.0);
        assert!(sent[0].g_force >= 6.0);
        assert_eq!(
            sim.driver(1).map(|d| d.state()),
            Some(BehaviorState::PostCrashIdle)
        );
    }

    #[test]
    fn unknown_driver_is_reported() {
        let (mut sim, _, _, _) = sim(1);
        assert_eq!(
            sim.trigger_crash(CrashTarget::Driver(99)),
            Err(TriggerError::DriverNotFound(99))
        );
    }

    #[test]
    fn queued_requests_are_answered_by_the_loop() {
        let (mut sim, _, _, _) = sim(1);
        let handle = sim.control_handle();
        let requester = std::thread::spawn(move || {
            handle.trigger_crash(CrashTarget::Driver(1), Duration::from_secs(10))
        });
        while sim.drain_commands() == 0 {
            std::thread::yield_now();
        }
        let result = requester.join().expect("requester");
        assert_eq!(result.map(|r| r.driver_id), Ok(1));
    }
}
