//! # Integration Tests
//!
//! End-to-end scenarios against the in-process engines.
//!
//! Covers:
//! - Configuration contract checks
//! - Mirror lifecycle across both simulators
//! - Perception subset, sensor riders and recording
//! - Traffic-light ownership in both directions
//! - Cleanup when an engine goes away

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::CosimConfig;

    #[test]
    fn test_default_config_round_trips_and_validates() {
        let toml = ConfigLoader::to_toml(&CosimConfig::default()).unwrap();
        let config = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.sensors.riders.len(), 4);
        assert_eq!(config.traffic.port, 8813);
        assert_eq!(config.vehicle.port, 2000);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::{BTreeMap, BTreeSet};

    use actor_bridge::{
        MockTrafficConfig, MockTrafficSim, MockVehicleConfig, MockVehicleSim, ScriptedAgent,
        ScriptedController, ScriptedVehicle, VehicleSimulator, WorldSettings,
    };
    use contracts::{
        Color, ControllerProgram, CosimConfig, CosimError, LandmarkId, LinkState, Location,
        MeasurementSink, RiderSpec, Rotation, SensorChannel, TlsManager, TrafficActorId,
        TrafficLightState, Transform,
    };
    use perception::EgoState;
    use recorder::{FileSink, LogSink};
    use synchronizer::{LoopState, Session, StopHandle, StopReason, SynchronizationLoop};

    fn attributes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Tiny camera and lidar so payloads stay small
    fn small_riders() -> Vec<RiderSpec> {
        let mount = Transform::new(Location::new(0.0, 0.0, 0.3), Rotation::default());
        vec![
            RiderSpec::new(
                SensorChannel::Camera,
                mount,
                attributes(&[("image_size_x", "8"), ("image_size_y", "6")]),
            ),
            RiderSpec::new(
                SensorChannel::Lidar,
                mount,
                attributes(&[("channels", "2"), ("points_per_second", "100")]),
            ),
        ]
    }

    fn config(riders: Vec<RiderSpec>) -> CosimConfig {
        let mut config = CosimConfig::default();
        config.sensors.riders = riders;
        config.sensors.drain_timeout_ms = 2000;
        config
    }

    fn engines(
        traffic: MockTrafficConfig,
        vehicle: MockVehicleConfig,
    ) -> (MockTrafficSim, MockVehicleSim) {
        (MockTrafficSim::new(traffic), MockVehicleSim::new(vehicle))
    }

    fn log_loop(
        config: CosimConfig,
        traffic: &MockTrafficSim,
        vehicle: &MockVehicleSim,
    ) -> SynchronizationLoop<MockTrafficSim, MockVehicleSim, LogSink> {
        SynchronizationLoop::new(
            config,
            Session::new(traffic.clone(), vehicle.clone()),
            LogSink::new("e2e"),
        )
    }

    fn ids(list: &[&str]) -> BTreeSet<TrafficActorId> {
        list.iter().map(|id| TrafficActorId::from(*id)).collect()
    }

    /// Every live actor has exactly one live counterpart after each tick
    #[tokio::test]
    async fn test_mirror_invariant_every_tick() {
        let agents = vec![
            ScriptedAgent::parked("a", 1, 0.0, 0.0).moving(1.0, 0.0).arriving_at(6),
            ScriptedAgent::parked("b", 2, 5.0, 5.0).arriving_at(4),
            ScriptedAgent::parked("c", 2, -5.0, 5.0).moving(0.0, 1.0),
            ScriptedAgent::parked("d", 4, 9.0, 0.0).arriving_at(9),
            ScriptedAgent::parked("e", 5, 0.0, -9.0).with_type("vehicle.unknown.kart"),
        ];
        let scripted = vec![ScriptedVehicle {
            blueprint: "vehicle.lincoln.mkz_2020".to_string(),
            spawn_frame: 2,
            destroy_frame: Some(7),
            transform: Transform::new(Location::new(30.0, 30.0, 0.0), Rotation::default()),
        }];
        let (traffic, vehicle) = engines(
            MockTrafficConfig {
                agents,
                ..Default::default()
            },
            MockVehicleConfig {
                scripted,
                ..Default::default()
            },
        );
        let mut sync = log_loop(config(Vec::new()), &traffic, &vehicle);
        sync.start().await.unwrap();

        for _ in 0..10 {
            sync.tick().await.unwrap();
            let registry = sync.registry();
            registry.check_invariants().unwrap();

            let vehicle_ids = vehicle.vehicle_ids();
            for id in traffic.live_ids() {
                let mirror = registry.vehicle_for(&id);
                assert!(
                    mirror.is_some_and(|v| vehicle_ids.contains(&v)),
                    "traffic actor {id} has no live mirror at tick {}",
                    sync.tick_count()
                );
            }
            for id in &vehicle_ids {
                assert!(
                    registry.traffic_for(*id).is_some(),
                    "vehicle actor {id} has no mirror at tick {}",
                    sync.tick_count()
                );
            }
        }

        // c and e stay on the network; everything else has left
        assert_eq!(traffic.live_ids(), ids(&["c", "e"]));
        assert_eq!(sync.registry().len(), 2);

        sync.finish().await.unwrap();
        assert!(vehicle.vehicle_ids().is_empty());
        assert!(traffic.is_closed());
    }

    /// The farthest-point subset around ego carries the riders
    #[tokio::test]
    async fn test_perception_subset_carries_riders() {
        let agents = vec![
            ScriptedAgent::parked("0", 1, 0.0, 0.0),
            ScriptedAgent::parked("1", 1, 1.0, 0.0),
            ScriptedAgent::parked("2", 1, 10.0, 0.0),
            ScriptedAgent::parked("3", 1, 0.0, 10.0),
            ScriptedAgent::parked("4", 1, -10.0, -10.0),
            ScriptedAgent::parked("5", 1, 5.0, 5.0),
            ScriptedAgent::parked("6", 1, -5.0, 5.0),
            ScriptedAgent::parked("9", 1, 100.0, 0.0),
        ];
        let (traffic, vehicle) = engines(
            MockTrafficConfig {
                agents,
                ..Default::default()
            },
            MockVehicleConfig::default(),
        );
        let mut config = config(small_riders());
        config.perception.sample_size = 4;
        config.sync.highlight_roles = true;

        let mut sync = log_loop(config, &traffic, &vehicle);
        sync.start().await.unwrap();

        sync.tick().await.unwrap();
        assert_eq!(sync.rig().attached_agents(), ids(&["0", "2", "3", "4"]));
        assert_eq!(vehicle.sensor_count(), 8);
        let ego_mirror = sync.registry().vehicle_for(&"0".into()).unwrap();
        assert_eq!(vehicle.sensors_on(ego_mirror).len(), 2);

        assert_eq!(traffic.color_of("0"), Some(Color::RED));
        assert_eq!(traffic.color_of("2"), Some(Color::MAGENTA));
        assert_eq!(traffic.color_of("1"), Some(Color::GREEN));
        assert_eq!(traffic.color_of("9"), Some(Color::YELLOW));

        sync.tick().await.unwrap();
        sync.tick().await.unwrap();
        let report = sync.report(StopReason::TickLimit);
        // two channels on four agents, delivered on ticks 2 and 3
        assert_eq!(report.payloads_delivered, 16);
        assert_eq!(report.rig.drain_timeouts, 0);

        sync.finish().await.unwrap();
        assert_eq!(vehicle.sensor_count(), 0);
        assert!(vehicle.vehicle_ids().is_empty());
    }

    /// A newcomer displaces a member: its riders drain, detach, then move
    #[tokio::test]
    async fn test_subset_change_moves_riders() {
        let dir = tempfile::tempdir().unwrap();
        let agents = vec![
            ScriptedAgent::parked("0", 1, 0.0, 0.0),
            ScriptedAgent::parked("1", 1, 10.0, 0.0),
            ScriptedAgent::parked("2", 1, 0.0, 10.0),
            ScriptedAgent::parked("3", 1, 1.0, 1.0),
            ScriptedAgent::parked("5", 2, -20.0, -20.0),
        ];
        let (traffic, vehicle) = engines(
            MockTrafficConfig {
                agents,
                ..Default::default()
            },
            MockVehicleConfig::default(),
        );
        let mut config = config(small_riders());
        config.perception.sample_size = 3;
        config.output.root_path = dir.path().to_path_buf();
        let sink = FileSink::new("e2e_subset", &config.output).unwrap();
        let mut sync = SynchronizationLoop::new(
            config,
            Session::new(traffic.clone(), vehicle.clone()),
            sink,
        );
        sync.start().await.unwrap();

        sync.tick().await.unwrap();
        assert_eq!(sync.rig().attached_agents(), ids(&["0", "1", "2"]));
        let displaced = sync.registry().vehicle_for(&"2".into()).unwrap();
        assert_eq!(vehicle.sensors_on(displaced).len(), 2);
        assert_eq!(vehicle.sensor_count(), 6);

        sync.tick().await.unwrap();
        assert_eq!(sync.rig().attached_agents(), ids(&["0", "1", "5"]));
        assert!(vehicle.sensors_on(displaced).is_empty());
        let newcomer = sync.registry().vehicle_for(&"5".into()).unwrap();
        assert_eq!(vehicle.sensors_on(newcomer).len(), 2);
        assert_eq!(vehicle.sensor_count(), 6);
        // the displaced member's frame 2 data was written before its detach
        assert_eq!(sync.report(StopReason::TickLimit).payloads_delivered, 6);
        let displaced_camera = dir.path().join(displaced.to_string()).join("camera");
        assert!(displaced_camera.join("000002.png").exists());

        sync.tick().await.unwrap();
        let report = sync.report(StopReason::TickLimit);
        assert_eq!(report.payloads_delivered, 12);
        assert_eq!(report.rig.drain_timeouts, 0);
        assert!(!displaced_camera.join("000003.png").exists());
        let newcomer_camera = dir.path().join(newcomer.to_string()).join("camera");
        assert!(newcomer_camera.join("000003.png").exists());
        // the displaced mirror itself stays in the world
        assert!(vehicle.vehicle_ids().contains(&displaced));

        sync.finish().await.unwrap();
        assert_eq!(vehicle.sensor_count(), 0);
    }

    /// Ego departs late, loses its neighbors, and ends the run after the grace
    #[tokio::test]
    async fn test_ego_lifecycle_ends_run() {
        let agents = vec![
            ScriptedAgent::parked("0", 5, 0.0, 0.0).moving(1.0, 0.0),
            ScriptedAgent::parked("7", 1, 8.0, 0.0).moving(1.0, 0.0).arriving_at(8),
        ];
        let (traffic, vehicle) = engines(
            MockTrafficConfig {
                agents,
                ..Default::default()
            },
            MockVehicleConfig::default(),
        );
        let mut config = config(small_riders());
        config.perception.grace_ticks = 4;
        config.perception.max_active_ticks = 100;

        let mut sync = log_loop(config, &traffic, &vehicle);
        let report = sync.run(StopHandle::new()).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::EgoArrived);
        assert_eq!(report.ticks, 10);
        assert_eq!(report.ego_state, EgoState::Arrived { at_tick: 10 });
        assert!(report.payloads_delivered > 0);
        assert_eq!(sync.state(), LoopState::Stopped);
        assert_eq!(vehicle.sensor_count(), 0);
        assert!(vehicle.vehicle_ids().is_empty());
        assert!(traffic.is_closed());
    }

    /// A silent channel costs one bounded wait per tick; the other still records
    #[tokio::test]
    async fn test_drain_timeout_on_muted_channel() {
        let (traffic, vehicle) = engines(
            MockTrafficConfig {
                agents: vec![ScriptedAgent::parked("0", 1, 0.0, 0.0)],
                ..Default::default()
            },
            MockVehicleConfig {
                muted_channels: vec![SensorChannel::Lidar],
                ..Default::default()
            },
        );
        let mut config = config(small_riders());
        config.sensors.drain_timeout_ms = 50;

        let mut sync = log_loop(config, &traffic, &vehicle).with_tick_limit(3);
        let report = sync.run(StopHandle::new()).await.unwrap();

        assert_eq!(report.ticks, 3);
        assert_eq!(report.rig.drain_timeouts, 2);
        assert_eq!(report.summary.total_drain_timeouts, 2);
        assert_eq!(report.payloads_delivered, 2);
    }

    /// Losing the traffic simulator mid-run still releases the vehicle side
    #[tokio::test]
    async fn test_engine_unavailable_cleanup() {
        let (traffic, vehicle) = engines(
            MockTrafficConfig {
                agents: vec![
                    ScriptedAgent::parked("0", 1, 0.0, 0.0),
                    ScriptedAgent::parked("1", 1, 5.0, 0.0),
                ],
                ..Default::default()
            },
            MockVehicleConfig::default(),
        );
        let mut sync = log_loop(config(small_riders()), &traffic, &vehicle);
        sync.start().await.unwrap();
        sync.tick().await.unwrap();
        sync.tick().await.unwrap();
        assert_eq!(vehicle.vehicle_ids().len(), 2);
        assert_eq!(vehicle.sensor_count(), 4);

        traffic.set_unavailable(true);
        let err = sync.tick().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, CosimError::EngineUnavailable { .. }));

        sync.finish().await.unwrap();
        assert_eq!(sync.state(), LoopState::Stopped);
        assert!(vehicle.vehicle_ids().is_empty());
        assert_eq!(vehicle.sensor_count(), 0);
        assert_eq!(vehicle.settings(), WorldSettings::default());
        assert!(vehicle.is_closed());
        assert!(traffic.is_closed());
    }

    fn junction() -> (MockTrafficConfig, MockVehicleConfig) {
        let program = ControllerProgram {
            controller_id: "J1".to_string(),
            program_id: "0".to_string(),
            phases: vec!["GGrr".into(), "yyrr".into(), "rrGG".into(), "rryy".into()],
            landmark_links: [(0, "101"), (1, "101"), (2, "102"), (3, "102")]
                .into_iter()
                .map(|(link, landmark)| (link, LandmarkId::from(landmark)))
                .collect(),
        };
        (
            MockTrafficConfig {
                controllers: vec![ScriptedController {
                    program,
                    phase_ticks: 2,
                    external: false,
                }],
                ..Default::default()
            },
            MockVehicleConfig {
                landmarks: vec!["101".into(), "102".into(), "999".into()],
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_traffic_owned_lights_follow_program() {
        let (traffic_config, vehicle_config) = junction();
        let (traffic, vehicle) = engines(traffic_config, vehicle_config);
        let mut config = config(Vec::new());
        config.sync.tls_manager = TlsManager::Traffic;

        let mut sync = log_loop(config, &traffic, &vehicle);
        sync.start().await.unwrap();
        assert!(vehicle.lights_frozen());

        sync.tick().await.unwrap();
        assert_eq!(vehicle.light_state(&"101".into()), Some(TrafficLightState::Green));
        assert_eq!(vehicle.light_state(&"102".into()), Some(TrafficLightState::Red));
        // not controlled by the traffic simulator
        assert_eq!(vehicle.light_state(&"999".into()), Some(TrafficLightState::Red));

        sync.tick().await.unwrap();
        assert_eq!(vehicle.light_state(&"101".into()), Some(TrafficLightState::Yellow));

        sync.tick().await.unwrap();
        sync.tick().await.unwrap();
        assert_eq!(vehicle.light_state(&"101".into()), Some(TrafficLightState::Red));
        assert_eq!(vehicle.light_state(&"102".into()), Some(TrafficLightState::Green));

        sync.finish().await.unwrap();
        assert!(!vehicle.lights_frozen());
        assert_eq!(traffic.link_state("J1", 0), Some(LinkState::Off));
        assert_eq!(traffic.link_state("J1", 3), Some(LinkState::Off));
    }

    #[tokio::test]
    async fn test_vehicle_owned_lights_drive_controller() {
        let (traffic_config, vehicle_config) = junction();
        let (traffic, vehicle) = engines(traffic_config, vehicle_config);
        let mut config = config(Vec::new());
        config.sync.tls_manager = TlsManager::Vehicle;

        let mut sync = log_loop(config, &traffic, &vehicle);
        sync.start().await.unwrap();

        // the vehicle simulator starts every light on red
        sync.tick().await.unwrap();
        assert_eq!(traffic.link_state("J1", 0), Some(LinkState::Red));
        assert_eq!(traffic.link_state("J1", 1), Some(LinkState::Red));

        vehicle
            .set_traffic_light_state(&"102".into(), TrafficLightState::Green)
            .await
            .unwrap();
        for _ in 0..4 {
            sync.tick().await.unwrap();
        }
        // the controller no longer cycles on its own
        assert_eq!(traffic.link_state("J1", 0), Some(LinkState::Red));
        assert_eq!(traffic.link_state("J1", 2), Some(LinkState::Green));
        assert_eq!(traffic.link_state("J1", 3), Some(LinkState::Green));

        sync.finish().await.unwrap();
        assert_eq!(traffic.link_state("J1", 2), Some(LinkState::Off));
    }

    #[tokio::test]
    async fn test_file_sink_output_layout() {
        let dir = tempfile::tempdir().unwrap();
        let (traffic, vehicle) = engines(
            MockTrafficConfig {
                agents: vec![
                    ScriptedAgent::parked("0", 1, 0.0, 0.0),
                    ScriptedAgent::parked("1", 1, 6.0, 0.0),
                ],
                ..Default::default()
            },
            MockVehicleConfig::default(),
        );
        let mut config = config(small_riders());
        config.output.root_path = dir.path().to_path_buf();
        let sink = FileSink::new("e2e_file", &config.output).unwrap();

        let mut sync = SynchronizationLoop::new(
            config,
            Session::new(traffic.clone(), vehicle.clone()),
            sink,
        );
        sync.start().await.unwrap();
        for _ in 0..3 {
            sync.tick().await.unwrap();
        }
        let ego_mirror = sync.registry().vehicle_for(&"0".into()).unwrap();
        sync.finish().await.unwrap();

        let stats = sync.sink().stats();
        assert_eq!(stats.payloads_written, 8);
        assert_eq!(stats.actor_rows, 6);

        let csv = std::fs::read_to_string(dir.path().join("info.csv")).unwrap();
        assert_eq!(csv.lines().count(), 7);

        let camera = dir.path().join(ego_mirror.to_string()).join("camera");
        assert!(camera.join("000002.png").exists());
        assert!(camera.join("000002_meta.json").exists());
        let lidar = dir.path().join(ego_mirror.to_string()).join("lidar");
        assert!(lidar.join("000003.ply").exists());
        assert!(dir.path().join("manifest.json").exists());
        assert_eq!(sync.sink().name(), "e2e_file");
    }
}
