//! Mock traffic simulator
//!
//! Scripted agents depart, move in straight lines and arrive on fixed ticks.
//! Supports failure injection for registry and loop tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use contracts::{
    Color, ControllerProgram, ControllerStatus, Engine, Extent, LinkState, Location, Rotation,
    TrafficActor, TrafficActorId, TrafficEndpoint, Transform, VehicleClass, VehicleSignals,
    EXTERNAL_PROGRAM_ID,
};
use tracing::instrument;

use crate::client::{Neighbor, StepReport, TrafficSimulator};
use crate::error::{Result, SimulatorError};
use crate::lock;

/// One scripted agent
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    pub id: TrafficActorId,
    pub type_id: String,
    pub vclass: VehicleClass,
    /// Tick on which the agent appears in the spawned set
    pub depart_tick: u64,
    /// Tick on which the agent appears in the destroyed set
    pub arrive_tick: Option<u64>,
    pub start: Location,
    /// Displacement per tick on the ground plane
    pub velocity: (f64, f64),
    pub extent: Extent,
    pub signals: VehicleSignals,
}

impl ScriptedAgent {
    /// Passenger car standing still at (x, y)
    pub fn parked(id: &str, depart_tick: u64, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            type_id: "vehicle.tesla.model3".to_string(),
            vclass: VehicleClass::Passenger,
            depart_tick,
            arrive_tick: None,
            start: Location::new(x, y, 0.0),
            velocity: (0.0, 0.0),
            extent: Extent::new(2.4, 1.0, 0.75),
            signals: VehicleSignals::default(),
        }
    }

    pub fn moving(mut self, dx: f64, dy: f64) -> Self {
        self.velocity = (dx, dy);
        self
    }

    pub fn arriving_at(mut self, tick: u64) -> Self {
        self.arrive_tick = Some(tick);
        self
    }

    pub fn with_class(mut self, vclass: VehicleClass) -> Self {
        self.vclass = vclass;
        self
    }

    pub fn with_type(mut self, type_id: &str) -> Self {
        self.type_id = type_id.to_string();
        self
    }
}

/// One scripted signal controller
#[derive(Debug, Clone)]
pub struct ScriptedController {
    pub program: ControllerProgram,
    /// Ticks per phase
    pub phase_ticks: u64,
    /// Reports the external program id instead of its own
    pub external: bool,
}

/// Mock traffic simulator configuration
#[derive(Debug, Clone, Default)]
pub struct MockTrafficConfig {
    pub agents: Vec<ScriptedAgent>,
    pub controllers: Vec<ScriptedController>,
    /// Number of upcoming spawn_actor calls that fail
    pub fail_spawns: u32,
    /// Vehicle types that never spawn
    pub fail_types: Vec<String>,
}

#[derive(Debug, Clone)]
struct LiveAgent {
    actor: TrafficActor,
    velocity: (f64, f64),
    driven_externally: bool,
}

#[derive(Debug)]
struct ControllerRuntime {
    program: ControllerProgram,
    phase_ticks: u64,
    external: bool,
    phase_index: usize,
    links: Vec<LinkState>,
}

#[derive(Debug, Default)]
struct TrafficState {
    connected: bool,
    tick: u64,
    live: BTreeMap<TrafficActorId, LiveAgent>,
    departed: BTreeSet<TrafficActorId>,
    arrived: BTreeSet<TrafficActorId>,
    pending_departures: Vec<(TrafficActorId, LiveAgent)>,
    pending_arrivals: BTreeSet<TrafficActorId>,
    controllers: BTreeMap<String, ControllerRuntime>,
    link_log: Vec<(String, usize, LinkState)>,
    next_spawn: u32,
    closed: bool,
}

/// Mock traffic simulator
///
/// Cheap to clone; clones share state, so tests keep a handle for inspection
/// while the loop owns another.
#[derive(Clone)]
pub struct MockTrafficSim {
    config: Arc<MockTrafficConfig>,
    state: Arc<Mutex<TrafficState>>,
    fail_spawns: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
}

impl MockTrafficSim {
    pub fn new(config: MockTrafficConfig) -> Self {
        let mut controllers = BTreeMap::new();
        for scripted in &config.controllers {
            let links = phase_links(&scripted.program, 0);
            controllers.insert(
                scripted.program.controller_id.clone(),
                ControllerRuntime {
                    program: scripted.program.clone(),
                    phase_ticks: scripted.phase_ticks.max(1),
                    external: scripted.external,
                    phase_index: 0,
                    links,
                },
            );
        }
        let fail_spawns = Arc::new(AtomicU32::new(config.fail_spawns));
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(TrafficState {
                controllers,
                ..Default::default()
            })),
            fail_spawns,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every later call fails with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn current_tick(&self) -> u64 {
        lock(&self.state).tick
    }

    pub fn live_ids(&self) -> BTreeSet<TrafficActorId> {
        lock(&self.state).live.keys().cloned().collect()
    }

    pub fn location_of(&self, id: &str) -> Option<Location> {
        lock(&self.state)
            .live
            .get(id)
            .map(|a| a.actor.transform.location)
    }

    pub fn color_of(&self, id: &str) -> Option<Color> {
        lock(&self.state).live.get(id).and_then(|a| a.actor.color)
    }

    /// Every set_link_state call so far
    pub fn link_log(&self) -> Vec<(String, usize, LinkState)> {
        lock(&self.state).link_log.clone()
    }

    pub fn link_state(&self, controller_id: &str, link_index: usize) -> Option<LinkState> {
        lock(&self.state)
            .controllers
            .get(controller_id)
            .and_then(|c| c.links.get(link_index).copied())
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SimulatorError::connection(Engine::Traffic, "connection reset"));
        }
        if !lock(&self.state).connected {
            return Err(SimulatorError::connection(Engine::Traffic, "not connected"));
        }
        Ok(())
    }
}

fn phase_links(program: &ControllerProgram, phase_index: usize) -> Vec<LinkState> {
    program
        .phases
        .get(phase_index)
        .map(|phase| phase.chars().filter_map(LinkState::from_char).collect())
        .unwrap_or_default()
}

fn scripted_actor(agent: &ScriptedAgent) -> TrafficActor {
    TrafficActor {
        type_id: agent.type_id.clone(),
        vclass: agent.vclass,
        transform: Transform::new(agent.start, Rotation::default()),
        extent: agent.extent,
        signals: agent.signals,
        color: None,
    }
}

fn distance_2d(a: &Location, b: &Location) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

impl TrafficSimulator for MockTrafficSim {
    #[instrument(name = "mock_traffic_connect", skip(self, endpoint), fields(host = %endpoint.host, port = endpoint.port))]
    async fn connect(&mut self, endpoint: &TrafficEndpoint) -> Result<()> {
        lock(&self.state).connected = true;
        Ok(())
    }

    async fn step(&self) -> Result<StepReport> {
        self.ensure_available()?;
        let mut state = lock(&self.state);
        state.tick += 1;
        let tick = state.tick;

        state.departed.clear();
        state.arrived.clear();

        // scripted motion of agents already on the network
        for agent in state.live.values_mut() {
            if !agent.driven_externally {
                agent.actor.transform.location.x += agent.velocity.0;
                agent.actor.transform.location.y += agent.velocity.1;
            }
        }

        for agent in self.config.agents.iter().filter(|a| a.depart_tick == tick) {
            state.live.insert(
                agent.id.clone(),
                LiveAgent {
                    actor: scripted_actor(agent),
                    velocity: agent.velocity,
                    driven_externally: false,
                },
            );
            state.departed.insert(agent.id.clone());
        }
        let departures = std::mem::take(&mut state.pending_departures);
        for (id, agent) in departures {
            state.live.insert(id.clone(), agent);
            state.departed.insert(id);
        }

        for agent in self
            .config
            .agents
            .iter()
            .filter(|a| a.arrive_tick == Some(tick))
        {
            if state.live.remove(&agent.id).is_some() {
                state.arrived.insert(agent.id.clone());
            }
        }
        let removals = std::mem::take(&mut state.pending_arrivals);
        state.arrived.extend(removals);

        for controller in state.controllers.values_mut() {
            if controller.external || controller.program.phases.is_empty() {
                continue;
            }
            let phase_index = ((tick / controller.phase_ticks) as usize) % controller.program.phases.len();
            if phase_index != controller.phase_index {
                controller.phase_index = phase_index;
                controller.links = phase_links(&controller.program, phase_index);
            }
        }

        Ok(StepReport {
            frame: tick,
            timestamp: tick as f64,
        })
    }

    async fn spawned(&self) -> Result<BTreeSet<TrafficActorId>> {
        self.ensure_available()?;
        Ok(lock(&self.state).departed.clone())
    }

    async fn destroyed(&self) -> Result<BTreeSet<TrafficActorId>> {
        self.ensure_available()?;
        Ok(lock(&self.state).arrived.clone())
    }

    async fn actor(&self, id: &TrafficActorId) -> Result<Option<TrafficActor>> {
        self.ensure_available()?;
        Ok(lock(&self.state).live.get(id).map(|a| a.actor.clone()))
    }

    #[instrument(name = "mock_traffic_spawn_actor", skip(self, color))]
    async fn spawn_actor(&self, type_id: &str, color: Option<Color>) -> Result<TrafficActorId> {
        self.ensure_available()?;
        if self.config.fail_types.iter().any(|t| t == type_id) {
            return Err(SimulatorError::spawn_rejected(Engine::Traffic, type_id, "vehicle type not on network"));
        }
        if self
            .fail_spawns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SimulatorError::spawn_rejected(Engine::Traffic, type_id, "mock failure"));
        }

        let mut state = lock(&self.state);
        let id: TrafficActorId = format!("carla{}", state.next_spawn).into();
        state.next_spawn += 1;
        let agent = LiveAgent {
            actor: TrafficActor {
                type_id: type_id.to_string(),
                vclass: VehicleClass::Passenger,
                transform: Transform::default(),
                extent: Extent::new(2.4, 1.0, 0.75),
                signals: VehicleSignals::default(),
                color,
            },
            velocity: (0.0, 0.0),
            driven_externally: true,
        };
        state.pending_departures.push((id.clone(), agent));
        Ok(id)
    }

    async fn destroy_actor(&self, id: &TrafficActorId) -> Result<()> {
        self.ensure_available()?;
        let mut state = lock(&self.state);
        // Idempotent: unknown ids are Ok
        if state.live.remove(id).is_some() {
            state.pending_arrivals.insert(id.clone());
        }
        state.pending_departures.retain(|(pending, _)| pending != id);
        Ok(())
    }

    async fn set_transform(
        &self,
        id: &TrafficActorId,
        transform: Transform,
        signals: Option<VehicleSignals>,
    ) -> Result<()> {
        self.ensure_available()?;
        let mut state = lock(&self.state);
        let agent = state
            .live
            .get_mut(id)
            .ok_or_else(|| SimulatorError::actor_not_found(Engine::Traffic, id))?;
        agent.actor.transform = transform;
        agent.driven_externally = true;
        if let Some(signals) = signals {
            agent.actor.signals = signals;
        }
        Ok(())
    }

    async fn set_color(&self, id: &TrafficActorId, color: Color) -> Result<()> {
        self.ensure_available()?;
        let mut state = lock(&self.state);
        let agent = state
            .live
            .get_mut(id)
            .ok_or_else(|| SimulatorError::actor_not_found(Engine::Traffic, id))?;
        agent.actor.color = Some(color);
        Ok(())
    }

    async fn neighbors(&self, ego: &TrafficActorId, radius: f64) -> Result<Vec<Neighbor>> {
        self.ensure_available()?;
        let state = lock(&self.state);
        let Some(center) = state.live.get(ego).map(|a| a.actor.transform.location) else {
            return Ok(Vec::new());
        };
        Ok(state
            .live
            .iter()
            .filter(|(_, a)| distance_2d(&a.actor.transform.location, &center) <= radius)
            .map(|(id, a)| Neighbor {
                id: id.clone(),
                location: a.actor.transform.location,
                vclass: a.actor.vclass,
            })
            .collect())
    }

    async fn controller_programs(&self) -> Result<Vec<ControllerProgram>> {
        self.ensure_available()?;
        Ok(lock(&self.state)
            .controllers
            .values()
            .map(|c| c.program.clone())
            .collect())
    }

    async fn controller_status(&self, controller_id: &str) -> Result<ControllerStatus> {
        self.ensure_available()?;
        let state = lock(&self.state);
        let controller = state
            .controllers
            .get(controller_id)
            .ok_or_else(|| SimulatorError::actor_not_found(Engine::Traffic, controller_id))?;
        let program_id = if controller.external {
            EXTERNAL_PROGRAM_ID.to_string()
        } else {
            controller.program.program_id.clone()
        };
        Ok(ControllerStatus {
            program_id,
            phase_index: controller.phase_index,
        })
    }

    async fn set_link_state(&self, controller_id: &str, link_index: usize, state: LinkState) -> Result<()> {
        self.ensure_available()?;
        let mut guard = lock(&self.state);
        let controller = guard
            .controllers
            .get_mut(controller_id)
            .ok_or_else(|| SimulatorError::actor_not_found(Engine::Traffic, controller_id))?;
        if let Some(link) = controller.links.get_mut(link_index) {
            *link = state;
        }
        // Setting a link hands the controller to the external program
        controller.external = true;
        guard
            .link_log
            .push((controller_id.to_string(), link_index, state));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.closed = true;
        state.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(config: MockTrafficConfig) -> MockTrafficSim {
        let sim = MockTrafficSim::new(config);
        lock(&sim.state).connected = true;
        sim
    }

    #[tokio::test]
    async fn test_scripted_departure_and_arrival() {
        let sim = connected(MockTrafficConfig {
            agents: vec![ScriptedAgent::parked("0", 2, 0.0, 0.0).arriving_at(4)],
            ..Default::default()
        });

        sim.step().await.unwrap();
        assert!(sim.spawned().await.unwrap().is_empty());

        sim.step().await.unwrap();
        assert!(sim.spawned().await.unwrap().contains("0"));

        sim.step().await.unwrap();
        assert!(sim.spawned().await.unwrap().is_empty());

        sim.step().await.unwrap();
        assert!(sim.destroyed().await.unwrap().contains("0"));
        assert!(sim.actor(&"0".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spawned_mirror_departs_next_step() {
        let sim = connected(MockTrafficConfig::default());
        let id = sim.spawn_actor("vehicle.audi.a2", None).await.unwrap();
        assert_eq!(id, "carla0");
        assert!(sim.actor(&id).await.unwrap().is_none());

        sim.step().await.unwrap();
        assert!(sim.spawned().await.unwrap().contains("carla0"));

        sim.destroy_actor(&id).await.unwrap();
        sim.destroy_actor(&id).await.unwrap();
        sim.step().await.unwrap();
        assert!(sim.destroyed().await.unwrap().contains("carla0"));
    }

    #[tokio::test]
    async fn test_spawn_failure_injection() {
        let sim = connected(MockTrafficConfig {
            fail_spawns: 1,
            ..Default::default()
        });
        assert!(sim.spawn_actor("vehicle.audi.a2", None).await.is_err());
        assert!(sim.spawn_actor("vehicle.audi.a2", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_neighbors_within_radius() {
        let sim = connected(MockTrafficConfig {
            agents: vec![
                ScriptedAgent::parked("0", 1, 0.0, 0.0),
                ScriptedAgent::parked("near", 1, 30.0, 40.0),
                ScriptedAgent::parked("far", 1, 30.0, 41.0),
            ],
            ..Default::default()
        });
        sim.step().await.unwrap();
        let ids: Vec<TrafficActorId> = sim
            .neighbors(&"0".into(), 50.0)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![TrafficActorId::from("0"), TrafficActorId::from("near")]);
        assert!(sim.neighbors(&"missing".into(), 50.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_is_connection_error() {
        let sim = connected(MockTrafficConfig::default());
        sim.set_unavailable(true);
        let err = sim.step().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
