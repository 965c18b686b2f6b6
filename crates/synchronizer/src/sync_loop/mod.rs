//! SynchronizationLoop implementation

mod mirror;
mod riders;

use std::collections::BTreeSet;
use std::time::Instant;

use actor_bridge::{
    ActorRegistry, BlueprintCatalog, NetOffset, Origin, TickReport, TrafficSimulator,
    VehicleSimulator, WorldSettings,
};
use contracts::{CosimConfig, CosimError, Engine, MeasurementSink, TlsManager, VehicleActorId};
use metrics::counter;
use observability::{record_tick_metrics, TickSample, TickStatsAggregator};
use perception::{EgoState, EgoTracker, PerceptionSelector};
use sensor_rig::SensorRigManager;
use traffic_lights::{sync_traffic_to_vehicle, sync_vehicle_to_traffic, TrafficLightBridge};
use tracing::{error, info, instrument, warn, Span};

use crate::report::{MirrorCounters, RunReport, StopReason};
use crate::roles::RoleHighlighter;
use crate::session::{Session, StopHandle};
use crate::Result;

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Running,
    Draining,
    /// Terminal
    Stopped,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Ego arrived at the start of the tick; nothing was stepped
    EgoArrived,
}

/// Lockstep driver owning every manager of the run
pub struct SynchronizationLoop<T, V, S> {
    config: CosimConfig,
    session: Session<T, V>,
    sink: S,
    state: LoopState,
    registry: ActorRegistry,
    catalog: BlueprintCatalog,
    bridge: Option<TrafficLightBridge>,
    ego: EgoTracker,
    selector: PerceptionSelector,
    rig: SensorRigManager,
    roles: RoleHighlighter,
    offset: NetOffset,
    previous_settings: Option<WorldSettings>,
    lights_frozen: bool,
    /// Mirrors carrying riders, destroyed once their riders are detached
    deferred_destroys: BTreeSet<VehicleActorId>,
    tick_limit: Option<u64>,
    tick: u64,
    frame: u64,
    mirrors: MirrorCounters,
    payloads_delivered: u64,
    lights_synced: u64,
    stats: TickStatsAggregator,
}

impl<T, V, S> SynchronizationLoop<T, V, S>
where
    T: TrafficSimulator,
    V: VehicleSimulator,
    S: MeasurementSink,
{
    pub fn new(config: CosimConfig, session: Session<T, V>, sink: S) -> Self {
        Self {
            registry: ActorRegistry::new(config.sync.max_spawn_retries),
            ego: EgoTracker::from_config(&config.perception),
            selector: PerceptionSelector::new(config.perception.sample_size),
            rig: SensorRigManager::new(&config.sensors),
            offset: NetOffset::from(config.sync.net_offset),
            catalog: BlueprintCatalog::default(),
            bridge: None,
            roles: RoleHighlighter::new(),
            previous_settings: None,
            lights_frozen: false,
            deferred_destroys: BTreeSet::new(),
            tick_limit: None,
            state: LoopState::Init,
            tick: 0,
            frame: 0,
            mirrors: MirrorCounters::default(),
            payloads_delivered: 0,
            lights_synced: 0,
            stats: TickStatsAggregator::new(),
            session,
            sink,
            config,
        }
    }

    /// Leave `Running` after `ticks` ticks
    pub fn with_tick_limit(mut self, ticks: u64) -> Self {
        self.tick_limit = Some(ticks);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn ego_state(&self) -> EgoState {
        self.ego.state()
    }

    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    pub fn rig(&self) -> &SensorRigManager {
        &self.rig
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run to completion.
    ///
    /// Fatal errors trigger a best-effort cleanup before they are returned.
    #[instrument(name = "sync_loop_run", skip(self, stop), fields(ego = %self.config.perception.ego_id))]
    pub async fn run(&mut self, stop: StopHandle) -> Result<RunReport> {
        if let Err(err) = self.start().await {
            error!(error = %err, "Initialization failed");
            self.abort().await;
            return Err(err);
        }

        let reason = loop {
            if stop.is_stopped() {
                info!(tick = self.tick, "Stop requested");
                break StopReason::StopRequested;
            }
            if self.tick_limit.is_some_and(|limit| self.tick >= limit) {
                break StopReason::TickLimit;
            }
            match self.tick().await {
                Ok(TickOutcome::Continue) => {}
                Ok(TickOutcome::EgoArrived) => break StopReason::EgoArrived,
                Err(err) if err.is_fatal() => {
                    error!(tick = self.tick, error = %err, "Fatal error, cleaning up");
                    self.abort().await;
                    return Err(err);
                }
                Err(err) => {
                    warn!(tick = self.tick, error = %err, category = err.category(), "Tick cut short");
                }
            }
        };

        self.finish().await?;
        Ok(self.report(reason))
    }

    /// `Init`: connect, take synchronous control and traffic-light ownership.
    ///
    /// Enters `Running` only when every step succeeded.
    #[instrument(name = "sync_loop_start", skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        self.state = LoopState::Init;
        if let Some(path) = &self.config.sync.vtypes_path {
            self.catalog = BlueprintCatalog::load(path)?;
        }

        self.session.traffic.connect(&self.config.traffic).await?;
        self.session.vehicle.connect(&self.config.vehicle).await?;

        let previous = self
            .session
            .vehicle
            .apply_settings(WorldSettings {
                synchronous_mode: true,
                fixed_delta_seconds: Some(self.config.step_length),
            })
            .await?;
        self.previous_settings = Some(previous);

        match self.config.sync.tls_manager {
            TlsManager::None => {}
            TlsManager::Traffic => {
                self.bridge = Some(TrafficLightBridge::load(&self.session.traffic).await?);
                self.session.vehicle.freeze_traffic_lights(true).await?;
                self.lights_frozen = true;
            }
            TlsManager::Vehicle => {
                let mut bridge = TrafficLightBridge::load(&self.session.traffic).await?;
                bridge.take_external_control();
                self.bridge = Some(bridge);
            }
        }

        self.state = LoopState::Running;
        info!(
            step_length = self.config.step_length,
            direction = ?self.config.sync.vehicle_direction,
            tls_manager = ?self.config.sync.tls_manager,
            blueprints = self.catalog.len(),
            "Synchronization running"
        );
        Ok(())
    }

    /// One lockstep tick
    #[instrument(name = "sync_tick", skip(self), fields(tick = tracing::field::Empty))]
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let started = Instant::now();
        self.tick += 1;
        let tick = self.tick;
        Span::current().record("tick", tick);

        if let EgoState::Arrived { .. } = self.ego.begin_tick(tick) {
            return Ok(TickOutcome::EgoArrived);
        }
        let timeouts_before = self.rig.metrics().drain_timeouts;

        self.session.traffic.step().await?;
        let spawned_traffic = self.session.traffic.spawned().await?;
        let destroyed_traffic = self.session.traffic.destroyed().await?;
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.tick(&self.session.traffic).await?;
        }
        self.ego.observe_departures(tick, &spawned_traffic);

        let step = self.session.vehicle.step().await?;
        self.frame = step.frame;
        let spawned_vehicle = self.session.vehicle.spawned().await?;
        let destroyed_vehicle = self.session.vehicle.destroyed().await?;

        let plan = self.registry.reconcile(&TickReport {
            spawned_traffic,
            destroyed_traffic,
            spawned_vehicle,
            destroyed_vehicle,
        });
        self.execute_plan(plan).await?;
        self.push_transforms().await?;
        self.sync_traffic_lights().await?;

        let actors = self.session.vehicle.vehicles().await?;
        recover(self.sink.write_actors(self.frame, &actors).await, "write actor rows")?;

        let (subset_size, payloads) = self.update_riders().await?;

        let sample = TickSample {
            tick,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            mirrors_active: self.registry.len(),
            subset_size,
            payloads,
            drain_timeouts: self.rig.metrics().drain_timeouts - timeouts_before,
        };
        record_tick_metrics(&sample);
        self.stats.update(&sample);
        Ok(TickOutcome::Continue)
    }

    /// `Draining` then `Stopped`.
    ///
    /// Release runs even when draining failed; the first error is returned.
    pub async fn finish(&mut self) -> Result<()> {
        let drained = self.drain_out().await;
        if let Err(err) = &drained {
            warn!(error = %err, "Draining failed, releasing engines anyway");
        }
        let released = self.release().await;
        drained.and(released)
    }

    pub fn report(&self, stop_reason: StopReason) -> RunReport {
        RunReport {
            ticks: self.tick,
            last_frame: self.frame,
            stop_reason,
            ego_state: self.ego.state(),
            mirrors: self.mirrors,
            payloads_delivered: self.payloads_delivered,
            lights_synced: self.lights_synced,
            rig: self.rig.metrics(),
            summary: self.stats.summary(),
        }
    }

    async fn abort(&mut self) {
        if let Err(err) = self.finish().await {
            warn!(error = %err, "Cleanup after failure was incomplete");
        }
    }

    async fn sync_traffic_lights(&mut self) -> Result<()> {
        let Some(bridge) = self.bridge.as_mut() else {
            return Ok(());
        };
        let written = match self.config.sync.tls_manager {
            TlsManager::None => Ok(0),
            TlsManager::Traffic => sync_traffic_to_vehicle(bridge, &self.session.vehicle).await,
            TlsManager::Vehicle => {
                sync_vehicle_to_traffic(bridge, &self.session.traffic, &self.session.vehicle).await
            }
        };
        if let Some(written) = recover(written, "sync traffic lights")? {
            self.lights_synced += written as u64;
        }
        Ok(())
    }

    /// Final drain, detach every rider, flush, lights off
    #[instrument(name = "sync_loop_drain", skip(self))]
    async fn drain_out(&mut self) -> Result<()> {
        self.state = LoopState::Draining;

        // detaching first stages whatever is still queued, so the drain
        // below returns it without waiting for another frame
        let detached = self.rig.detach_all(&self.session.vehicle).await?;
        self.selector.clear();
        let leftovers = self.rig.drain(self.frame).await;
        let leftover_count = leftovers.len();
        for measurement in &leftovers {
            if recover(self.sink.write_measurement(measurement).await, "write measurement")?.is_some() {
                self.payloads_delivered += 1;
            }
        }
        self.release_deferred().await?;

        recover(self.sink.flush().await, "flush sink")?;
        if let Some(bridge) = self.bridge.as_mut() {
            recover(bridge.switch_off(&self.session.traffic).await, "switch off traffic lights")?;
        }
        info!(detached, leftovers = leftover_count, "Drained");
        Ok(())
    }

    /// Destroy mirrors, restore settings and close everything
    #[instrument(name = "sync_loop_release", skip(self))]
    async fn release(&mut self) -> Result<()> {
        self.state = LoopState::Stopped;
        let mut first_error = None;

        for link in self.registry.teardown() {
            let result = match link.origin {
                Origin::Traffic => self.session.vehicle.destroy_actor(link.vehicle).await,
                Origin::Vehicle => self.session.traffic.destroy_actor(&link.traffic).await,
            };
            if result.is_ok() {
                self.mirrors.destroyed += 1;
            }
            note(&mut first_error, result, "destroy mirror");
        }
        for vehicle_id in std::mem::take(&mut self.deferred_destroys) {
            let result = self.session.vehicle.destroy_actor(vehicle_id).await;
            if result.is_ok() {
                self.mirrors.destroyed += 1;
            }
            note(&mut first_error, result, "destroy mirror");
        }

        if let Some(previous) = self.previous_settings.take() {
            let result = self.session.vehicle.apply_settings(previous).await.map(|_| ());
            note(&mut first_error, result, "restore world settings");
        }
        if self.lights_frozen {
            let result = self.session.vehicle.freeze_traffic_lights(false).await;
            note(&mut first_error, result, "unfreeze traffic lights");
            self.lights_frozen = false;
        }

        let result = self.session.traffic.close().await;
        note(&mut first_error, result, "close traffic simulator");
        let result = self.session.vehicle.close().await;
        note(&mut first_error, result, "close vehicle simulator");
        let result = self.sink.close().await;
        note(&mut first_error, result, "close sink");

        info!(
            ticks = self.tick,
            mirrors_destroyed = self.mirrors.destroyed,
            clean = first_error.is_none(),
            "Synchronization stopped"
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Absorb a per-actor error: log it and carry on. Fatal errors pass through.
fn recover<T, E: Into<CosimError>>(
    result: std::result::Result<T, E>,
    context: &'static str,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            let err = err.into();
            if err.is_fatal() {
                return Err(err);
            }
            warn!(context, category = err.category(), error = %err, "Recovered error");
            counter!("cosim_recovered_errors_total", "category" => err.category()).increment(1);
            Ok(None)
        }
    }
}

/// Keep the first error of a cleanup sequence
fn note<E: Into<CosimError>>(
    first_error: &mut Option<CosimError>,
    result: std::result::Result<(), E>,
    context: &'static str,
) {
    if let Err(err) = result {
        let err = err.into();
        warn!(context, error = %err, "Cleanup step failed");
        first_error.get_or_insert(err);
    }
}

fn engine_label(engine: Engine) -> &'static str {
    match engine {
        Engine::Traffic => "traffic",
        Engine::Vehicle => "vehicle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_bridge::{
        MirrorStatus, MockTrafficConfig, MockTrafficSim, MockVehicleConfig, MockVehicleSim,
        ScriptedAgent, ScriptedVehicle,
    };
    use contracts::{Location, Rotation, SensorRigConfig, SyncDirection, TrafficActorId, Transform};
    use recorder::LogSink;

    type TestLoop = SynchronizationLoop<MockTrafficSim, MockVehicleSim, LogSink>;

    fn test_config() -> CosimConfig {
        CosimConfig {
            sensors: SensorRigConfig {
                drain_timeout_ms: 2000,
                riders: Vec::new(),
            },
            ..Default::default()
        }
    }

    fn build(
        config: CosimConfig,
        traffic: MockTrafficConfig,
        vehicle: MockVehicleConfig,
    ) -> (TestLoop, MockTrafficSim, MockVehicleSim) {
        let traffic = MockTrafficSim::new(traffic);
        let vehicle = MockVehicleSim::new(vehicle);
        let session = Session::new(traffic.clone(), vehicle.clone());
        (
            SynchronizationLoop::new(config, session, LogSink::new("test")),
            traffic,
            vehicle,
        )
    }

    fn one_agent(arrive_tick: Option<u64>) -> MockTrafficConfig {
        let mut agent = ScriptedAgent::parked("1", 1, 10.0, 0.0);
        agent.arrive_tick = arrive_tick;
        MockTrafficConfig {
            agents: vec![agent],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_traffic_agent_mirrored_then_removed() {
        let (mut sync, traffic, vehicle) =
            build(test_config(), one_agent(Some(3)), MockVehicleConfig::default());
        sync.start().await.unwrap();
        assert_eq!(sync.state(), LoopState::Running);
        assert!(vehicle.settings().synchronous_mode);

        sync.tick().await.unwrap();
        let agent = TrafficActorId::from("1");
        let mirror = sync.registry().vehicle_for(&agent).unwrap();
        assert!(vehicle.vehicle_ids().contains(&mirror));
        // the first transform push drops the mirror from its spawn height
        assert!(vehicle.transform_of(mirror).unwrap().location.z.abs() < 1e-9);

        sync.tick().await.unwrap();
        sync.tick().await.unwrap();
        assert!(!vehicle.vehicle_ids().contains(&mirror));
        assert!(sync.registry().is_empty());
        sync.registry().check_invariants().unwrap();

        sync.finish().await.unwrap();
        assert_eq!(sync.state(), LoopState::Stopped);
        assert_eq!(vehicle.settings(), WorldSettings::default());
        assert!(vehicle.is_closed());
        assert!(traffic.is_closed());
    }

    #[tokio::test]
    async fn test_vehicle_origin_actor_mirrored_into_traffic() {
        let mut config = test_config();
        config.sync.vehicle_direction = SyncDirection::VehicleToTraffic;
        let scripted = ScriptedVehicle {
            blueprint: "vehicle.audi.a2".to_string(),
            spawn_frame: 1,
            destroy_frame: Some(3),
            transform: Transform::new(Location::new(5.0, 5.0, 0.0), Rotation::default()),
        };
        let (mut sync, traffic, vehicle) = build(
            config,
            MockTrafficConfig::default(),
            MockVehicleConfig {
                scripted: vec![scripted],
                ..Default::default()
            },
        );
        sync.start().await.unwrap();

        sync.tick().await.unwrap();
        let origin = *vehicle.vehicle_ids().iter().next().unwrap();
        let mirror = sync.registry().traffic_for(origin).cloned().unwrap();

        // the traffic mirror departs on the next step and follows the vehicle
        sync.tick().await.unwrap();
        let location = traffic.location_of(mirror.as_str()).unwrap();
        assert!(location.x > 5.0);
        assert_eq!(sync.registry().len(), 1);

        sync.tick().await.unwrap();
        assert!(!traffic.live_ids().contains(&mirror));
        assert!(sync.registry().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_retries_exhausted_drops_agent() {
        let (mut sync, _traffic, vehicle) = build(
            test_config(),
            one_agent(None),
            MockVehicleConfig {
                fail_spawns: 10,
                ..Default::default()
            },
        );
        sync.start().await.unwrap();
        for _ in 0..4 {
            sync.tick().await.unwrap();
        }
        assert_eq!(
            sync.registry().traffic_status(&"1".into()),
            MirrorStatus::Dropped
        );

        sync.tick().await.unwrap();
        let report = sync.report(StopReason::TickLimit);
        assert_eq!(report.mirrors.spawn_failures, 4);
        assert_eq!(report.mirrors.dropped, 1);
        assert!(vehicle.vehicle_ids().is_empty());
    }

    #[tokio::test]
    async fn test_configuration_error_never_runs() {
        let mut config = test_config();
        config.sync.vtypes_path = Some("/nonexistent/vtypes.json".into());
        let (mut sync, traffic, _vehicle) =
            build(config, one_agent(None), MockVehicleConfig::default());

        let err = sync.run(StopHandle::new()).await.unwrap_err();
        assert!(matches!(err, CosimError::Configuration { .. }));
        assert_eq!(sync.state(), LoopState::Stopped);
        assert_eq!(sync.tick_count(), 0);
        assert_eq!(traffic.current_tick(), 0);
    }

    #[tokio::test]
    async fn test_engine_unavailable_cleans_up() {
        let (mut sync, traffic, vehicle) =
            build(test_config(), one_agent(None), MockVehicleConfig::default());
        sync.start().await.unwrap();
        sync.tick().await.unwrap();
        assert_eq!(vehicle.vehicle_ids().len(), 1);

        traffic.set_unavailable(true);
        let err = sync.tick().await.unwrap_err();
        assert!(matches!(err, CosimError::EngineUnavailable { .. }));

        sync.finish().await.unwrap();
        assert!(vehicle.vehicle_ids().is_empty());
        assert_eq!(vehicle.settings(), WorldSettings::default());
        assert!(vehicle.is_closed());
    }

    #[tokio::test]
    async fn test_stop_checked_before_first_tick() {
        let (mut sync, traffic, _vehicle) =
            build(test_config(), one_agent(None), MockVehicleConfig::default());
        let stop = StopHandle::new();
        stop.stop();

        let report = sync.run(stop).await.unwrap();
        assert_eq!(report.stop_reason, StopReason::StopRequested);
        assert_eq!(report.ticks, 0);
        assert_eq!(traffic.current_tick(), 0);
    }

    #[tokio::test]
    async fn test_tick_limit() {
        let (sync, _traffic, _vehicle) =
            build(test_config(), one_agent(None), MockVehicleConfig::default());
        let mut sync = sync.with_tick_limit(3);

        let report = sync.run(StopHandle::new()).await.unwrap();
        assert_eq!(report.stop_reason, StopReason::TickLimit);
        assert_eq!(report.ticks, 3);
        assert_eq!(report.last_frame, 3);
        assert_eq!(report.mirrors.spawned, 1);
        // teardown destroys the remaining mirror
        assert_eq!(report.mirrors.destroyed, 1);
        assert_eq!(report.summary.total_ticks, 3);
    }
}
