//! Light state mirroring between the simulators

use std::collections::BTreeSet;

use actor_bridge::bridge_helper::{to_link_state, to_vehicle_light_state};
use actor_bridge::{TrafficSimulator, VehicleSimulator};
use contracts::LandmarkId;
use tracing::debug;

use crate::{Result, TrafficLightBridge};

/// Landmarks known to both simulators
pub async fn common_landmarks<V: VehicleSimulator>(
    bridge: &TrafficLightBridge,
    vehicle: &V,
) -> Result<BTreeSet<LandmarkId>> {
    let vehicle_landmarks = vehicle.traffic_light_landmarks().await?;
    Ok(bridge
        .landmarks()
        .filter(|l| vehicle_landmarks.contains(*l))
        .cloned()
        .collect())
}

/// Push traffic simulator states onto the vehicle simulator's lights.
///
/// Returns the number of lights written.
pub async fn sync_traffic_to_vehicle<V: VehicleSimulator>(
    bridge: &TrafficLightBridge,
    vehicle: &V,
) -> Result<usize> {
    let mut written = 0;
    for landmark in common_landmarks(bridge, vehicle).await? {
        let Some(state) = bridge.get_state(&landmark) else {
            continue;
        };
        if vehicle
            .set_traffic_light_state(&landmark, to_vehicle_light_state(state))
            .await?
        {
            written += 1;
        }
    }
    debug!(written, "Synced traffic lights to vehicle simulator");
    Ok(written)
}

/// Push vehicle simulator light states into the traffic simulator.
///
/// Returns the number of landmarks written.
pub async fn sync_vehicle_to_traffic<T: TrafficSimulator, V: VehicleSimulator>(
    bridge: &mut TrafficLightBridge,
    traffic: &T,
    vehicle: &V,
) -> Result<usize> {
    let mut written = 0;
    for landmark in common_landmarks(bridge, vehicle).await? {
        let Some(state) = vehicle.traffic_light_state(&landmark).await? else {
            continue;
        };
        let link_state = to_link_state(state);
        if bridge.get_state(&landmark) == Some(link_state) {
            continue;
        }
        if bridge.set_state(traffic, &landmark, link_state).await? {
            written += 1;
        }
    }
    debug!(written, "Synced traffic lights to traffic simulator");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_bridge::{
        MockTrafficConfig, MockTrafficSim, MockVehicleConfig, MockVehicleSim, ScriptedController,
    };
    use contracts::{
        ControllerProgram, LinkState, TrafficEndpoint, TrafficLightState, VehicleEndpoint,
    };

    async fn engines() -> (MockTrafficSim, MockVehicleSim) {
        let program = ControllerProgram {
            controller_id: "c1".into(),
            program_id: "0".into(),
            phases: vec!["Gr".into(), "yr".into()],
            landmark_links: [(0, LandmarkId::from("L1")), (1, LandmarkId::from("L2"))]
                .into_iter()
                .collect(),
        };
        let mut traffic = MockTrafficSim::new(MockTrafficConfig {
            controllers: vec![ScriptedController {
                program,
                phase_ticks: 1,
                external: false,
            }],
            ..Default::default()
        });
        traffic.connect(&TrafficEndpoint::default()).await.unwrap();
        let mut vehicle = MockVehicleSim::new(MockVehicleConfig {
            landmarks: vec!["L1".into(), "L3".into()],
            ..Default::default()
        });
        vehicle.connect(&VehicleEndpoint::default()).await.unwrap();
        (traffic, vehicle)
    }

    #[tokio::test]
    async fn test_common_landmarks_only() {
        let (traffic, vehicle) = engines().await;
        let bridge = TrafficLightBridge::load(&traffic).await.unwrap();
        let common = common_landmarks(&bridge, &vehicle).await.unwrap();
        assert_eq!(common.into_iter().collect::<Vec<_>>(), vec![LandmarkId::from("L1")]);
    }

    #[tokio::test]
    async fn test_traffic_to_vehicle() {
        let (traffic, vehicle) = engines().await;
        let bridge = TrafficLightBridge::load(&traffic).await.unwrap();
        assert_eq!(sync_traffic_to_vehicle(&bridge, &vehicle).await.unwrap(), 1);
        assert_eq!(vehicle.light_state(&"L1".into()), Some(TrafficLightState::Green));
        assert_eq!(vehicle.light_state(&"L3".into()), Some(TrafficLightState::Red));
    }

    #[tokio::test]
    async fn test_vehicle_to_traffic_writes_changes_only() {
        let (traffic, vehicle) = engines().await;
        let mut bridge = TrafficLightBridge::load(&traffic).await.unwrap();
        bridge.take_external_control();

        // L1 is green in traffic, red in vehicle
        assert_eq!(sync_vehicle_to_traffic(&mut bridge, &traffic, &vehicle).await.unwrap(), 1);
        assert_eq!(traffic.link_state("c1", 0), Some(LinkState::Red));
        assert_eq!(sync_vehicle_to_traffic(&mut bridge, &traffic, &vehicle).await.unwrap(), 0);
    }
}
