//! Demo scenario for the in-process engines
//!
//! An ego agent drives east through a ring of traffic, past one signalized
//! junction, with a single vehicle-simulator native car parked on the map.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use actor_bridge::{
    MockTrafficConfig, MockVehicleConfig, ScriptedAgent, ScriptedController, ScriptedVehicle,
};
use contracts::{ControllerProgram, LandmarkId, Location, Rotation, Transform, VehicleClass};

/// Ego speed in meters per tick
const CRUISE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct DemoScenario {
    pub ego_id: String,
    /// Agents around ego
    pub agents: usize,
    /// Tick on which ego leaves the network
    pub ego_arrival: u64,
}

impl DemoScenario {
    pub fn new(ego_id: impl Into<String>, agents: usize, ego_arrival: u64) -> Self {
        Self {
            ego_id: ego_id.into(),
            agents,
            ego_arrival: ego_arrival.max(2),
        }
    }

    pub fn traffic_config(&self) -> MockTrafficConfig {
        let mut agents = vec![ScriptedAgent::parked(&self.ego_id, 1, 0.0, 0.0)
            .moving(CRUISE, 0.0)
            .arriving_at(self.ego_arrival)];

        for i in 0..self.agents {
            let angle = TAU * i as f64 / self.agents as f64;
            let radius = 8.0 + 6.0 * (i % 3) as f64;
            let mut agent = ScriptedAgent::parked(
                &format!("veh_{i}"),
                1 + (i as u64 % 4),
                radius * angle.cos(),
                radius * angle.sin(),
            )
            .moving(CRUISE, 0.0)
            .arriving_at(self.ego_arrival + 10 + i as u64);
            if i % 4 == 3 {
                agent = agent
                    .with_class(VehicleClass::Bicycle)
                    .with_type("vehicle.bh.crossbike");
            }
            agents.push(agent);
        }

        MockTrafficConfig {
            agents,
            controllers: vec![ScriptedController {
                program: junction_program(),
                phase_ticks: 30,
                external: false,
            }],
            ..Default::default()
        }
    }

    pub fn vehicle_config(&self) -> MockVehicleConfig {
        MockVehicleConfig {
            landmarks: vec![LandmarkId::from("101"), LandmarkId::from("102")],
            scripted: vec![ScriptedVehicle {
                blueprint: "vehicle.lincoln.mkz_2020".to_string(),
                spawn_frame: 3,
                destroy_frame: Some(self.ego_arrival / 2 + 3),
                transform: Transform::new(Location::new(40.0, -12.0, 0.0), Rotation::default()),
            }],
            ..Default::default()
        }
    }
}

/// Two approaches, two signals each
fn junction_program() -> ControllerProgram {
    let landmark_links: BTreeMap<usize, LandmarkId> = [(0, "101"), (1, "101"), (2, "102"), (3, "102")]
        .into_iter()
        .map(|(link, landmark)| (link, LandmarkId::from(landmark)))
        .collect();

    ControllerProgram {
        controller_id: "J1".to_string(),
        program_id: "0".to_string(),
        phases: ["GGrr", "yyrr", "rrGG", "rryy"]
            .into_iter()
            .map(String::from)
            .collect(),
        landmark_links,
    }
}
