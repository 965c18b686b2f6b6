//! TrafficLightBridge implementation

use std::collections::{BTreeMap, BTreeSet};

use actor_bridge::TrafficSimulator;
use contracts::{ControllerProgram, CosimError, LandmarkId, LinkState};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use crate::Result;

/// One signal of a controller
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SignalLink {
    pub controller_id: String,
    pub link_index: usize,
}

#[derive(Debug)]
struct ProgramLogic {
    phases: Vec<Vec<LinkState>>,
}

#[derive(Debug)]
struct ControllerLogic {
    programs: BTreeMap<String, ProgramLogic>,
    program_id: String,
    phase_index: usize,
    signal_count: usize,
    /// Link states written through the bridge since the last poll
    overrides: BTreeMap<usize, LinkState>,
}

impl ControllerLogic {
    fn link_state(&self, link_index: usize) -> Option<LinkState> {
        if let Some(state) = self.overrides.get(&link_index) {
            return Some(*state);
        }
        self.programs
            .get(&self.program_id)?
            .phases
            .get(self.phase_index)?
            .get(link_index)
            .copied()
    }
}

/// Landmark addressed traffic-light bridge
#[derive(Debug)]
pub struct TrafficLightBridge {
    controllers: BTreeMap<String, ControllerLogic>,
    landmarks: BTreeMap<LandmarkId, Vec<SignalLink>>,
    switched_off: bool,
    external_control: bool,
}

impl TrafficLightBridge {
    /// Build from the reported controller programs.
    ///
    /// Every phase of a program must have one state per signal (the length of
    /// its first phase) and every landmark link must be below that count.
    pub fn from_programs(programs: Vec<ControllerProgram>) -> Result<Self> {
        let mut controllers: BTreeMap<String, ControllerLogic> = BTreeMap::new();
        let mut landmarks: BTreeMap<LandmarkId, BTreeSet<SignalLink>> = BTreeMap::new();

        for program in programs {
            let field = format!("traffic_lights.{}.{}", program.controller_id, program.program_id);
            let signal_count = program.phases.first().map(|p| p.chars().count()).unwrap_or(0);

            let mut phases = Vec::with_capacity(program.phases.len());
            for (index, phase) in program.phases.iter().enumerate() {
                if phase.chars().count() != signal_count {
                    return Err(CosimError::configuration(
                        field,
                        format!(
                            "phase {} has {} states, expected {}",
                            index,
                            phase.chars().count(),
                            signal_count
                        ),
                    ));
                }
                let states = phase
                    .chars()
                    .map(|c| {
                        LinkState::from_char(c).ok_or_else(|| {
                            CosimError::configuration(
                                field.clone(),
                                format!("invalid state '{}' in phase {}", c, index),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                phases.push(states);
            }

            for (&link_index, landmark) in &program.landmark_links {
                if link_index >= signal_count {
                    return Err(CosimError::configuration(
                        field,
                        format!(
                            "link {} of landmark {} exceeds signal count {}",
                            link_index, landmark, signal_count
                        ),
                    ));
                }
                landmarks.entry(landmark.clone()).or_default().insert(SignalLink {
                    controller_id: program.controller_id.clone(),
                    link_index,
                });
            }

            let controller = controllers
                .entry(program.controller_id.clone())
                .or_insert_with(|| ControllerLogic {
                    programs: BTreeMap::new(),
                    program_id: program.program_id.clone(),
                    phase_index: 0,
                    signal_count,
                    overrides: BTreeMap::new(),
                });
            controller.signal_count = controller.signal_count.max(signal_count);
            controller
                .programs
                .insert(program.program_id, ProgramLogic { phases });
        }

        Ok(Self {
            controllers,
            landmarks: landmarks
                .into_iter()
                .map(|(landmark, links)| (landmark, links.into_iter().collect()))
                .collect(),
            switched_off: false,
            external_control: false,
        })
    }

    /// Query controller programs and current status from the traffic simulator
    #[instrument(name = "traffic_lights_load", skip(sim))]
    pub async fn load<T: TrafficSimulator>(sim: &T) -> Result<Self> {
        let programs = sim.controller_programs().await?;
        let mut bridge = Self::from_programs(programs)?;
        bridge.tick(sim).await?;
        info!(
            controllers = bridge.controllers.len(),
            landmarks = bridge.landmarks.len(),
            "Traffic light bridge ready"
        );
        Ok(bridge)
    }

    pub fn landmarks(&self) -> impl Iterator<Item = &LandmarkId> {
        self.landmarks.keys()
    }

    pub fn links(&self, landmark: &LandmarkId) -> &[SignalLink] {
        self.landmarks.get(landmark).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_switched_off(&self) -> bool {
        self.switched_off
    }

    /// Another client drives the controllers; `tick` stops polling
    pub fn take_external_control(&mut self) {
        self.external_control = true;
    }

    /// Current state of a landmark.
    ///
    /// Disagreeing links resolve to `Red` with a warning. Unknown landmarks
    /// give `None`.
    pub fn get_state(&self, landmark: &LandmarkId) -> Option<LinkState> {
        match self.resolve(landmark)? {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(landmark = %landmark, error = %err, "Ambiguous traffic light state, using red");
                counter!("cosim_signal_ambiguous_total").increment(1);
                Some(LinkState::Red)
            }
        }
    }

    fn resolve(&self, landmark: &LandmarkId) -> Option<Result<LinkState>> {
        let states: BTreeSet<char> = self
            .links(landmark)
            .iter()
            .filter_map(|link| {
                self.controllers
                    .get(&link.controller_id)?
                    .link_state(link.link_index)
            })
            .map(|s| s.as_char())
            .collect();

        let mut iter = states.iter();
        let first = *iter.next()?;
        if iter.next().is_none() {
            return LinkState::from_char(first).map(Ok);
        }
        Some(Err(CosimError::AmbiguousSignalState {
            landmark: landmark.to_string(),
            states: states.into_iter().collect(),
        }))
    }

    /// Apply `state` to every link of `landmark`.
    ///
    /// Returns false for unknown landmarks and after `switch_off`.
    pub async fn set_state<T: TrafficSimulator>(
        &mut self,
        sim: &T,
        landmark: &LandmarkId,
        state: LinkState,
    ) -> Result<bool> {
        if self.switched_off {
            return Ok(false);
        }
        let Some(links) = self.landmarks.get(landmark) else {
            return Ok(false);
        };
        for link in links {
            sim.set_link_state(&link.controller_id, link.link_index, state)
                .await?;
            if let Some(controller) = self.controllers.get_mut(&link.controller_id) {
                controller.overrides.insert(link.link_index, state);
            }
        }
        Ok(true)
    }

    /// Poll program and phase of every controller not driven externally
    pub async fn tick<T: TrafficSimulator>(&mut self, sim: &T) -> Result<()> {
        if self.switched_off || self.external_control {
            return Ok(());
        }
        for (controller_id, controller) in self.controllers.iter_mut() {
            let status = sim.controller_status(controller_id).await?;
            if status.is_external() {
                continue;
            }
            if !controller.programs.contains_key(&status.program_id) {
                debug!(
                    controller = %controller_id,
                    program = %status.program_id,
                    "Controller runs an unknown program, keeping previous phase"
                );
                continue;
            }
            controller.program_id = status.program_id;
            controller.phase_index = status.phase_index;
            controller.overrides.clear();
        }
        Ok(())
    }

    /// Turn every landmark-linked signal off and stop accepting writes
    #[instrument(name = "traffic_lights_switch_off", skip(self, sim))]
    pub async fn switch_off<T: TrafficSimulator>(&mut self, sim: &T) -> Result<()> {
        if self.switched_off {
            return Ok(());
        }
        let links: BTreeSet<&SignalLink> = self.landmarks.values().flatten().collect();
        for link in &links {
            sim.set_link_state(&link.controller_id, link.link_index, LinkState::Off)
                .await?;
        }
        for controller in self.controllers.values_mut() {
            controller.overrides.clear();
            for index in 0..controller.signal_count {
                controller.overrides.insert(index, LinkState::Off);
            }
        }
        self.switched_off = true;
        info!(links = links.len(), "Traffic lights switched off");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_bridge::{MockTrafficConfig, MockTrafficSim, ScriptedController};
    use contracts::TrafficEndpoint;

    fn program(controller: &str, phases: &[&str], links: &[(usize, &str)]) -> ControllerProgram {
        ControllerProgram {
            controller_id: controller.to_string(),
            program_id: "0".to_string(),
            phases: phases.iter().map(|p| p.to_string()).collect(),
            landmark_links: links.iter().map(|(i, l)| (*i, LandmarkId::from(*l))).collect(),
        }
    }

    #[test]
    fn test_invalid_phase_length_is_configuration_error() {
        let err = TrafficLightBridge::from_programs(vec![program("c1", &["rrG", "rr"], &[])])
            .unwrap_err();
        assert!(matches!(err, CosimError::Configuration { .. }));
    }

    #[test]
    fn test_link_index_out_of_range() {
        let err = TrafficLightBridge::from_programs(vec![program("c1", &["rG"], &[(2, "L1")])])
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_agreeing_links() {
        let bridge =
            TrafficLightBridge::from_programs(vec![program("c1", &["GGr"], &[(0, "L1"), (1, "L1"), (2, "L2")])])
                .unwrap();
        assert_eq!(bridge.get_state(&"L1".into()), Some(LinkState::Green));
        assert_eq!(bridge.get_state(&"L2".into()), Some(LinkState::Red));
        assert_eq!(bridge.get_state(&"L9".into()), None);
    }

    #[test]
    fn test_disagreeing_links_fail_safe_red() {
        let bridge =
            TrafficLightBridge::from_programs(vec![program("c1", &["Gy"], &[(0, "L1"), (1, "L1")])])
                .unwrap();
        assert_eq!(bridge.get_state(&"L1".into()), Some(LinkState::Red));
        assert!(matches!(
            bridge.resolve(&"L1".into()),
            Some(Err(CosimError::AmbiguousSignalState { .. }))
        ));
    }

    #[test]
    fn test_landmark_spanning_controllers() {
        let bridge = TrafficLightBridge::from_programs(vec![
            program("c1", &["G"], &[(0, "L1")]),
            program("c2", &["rG"], &[(1, "L1")]),
        ])
        .unwrap();
        assert_eq!(bridge.links(&"L1".into()).len(), 2);
        assert_eq!(bridge.get_state(&"L1".into()), Some(LinkState::Green));
    }

    async fn mock_with(programs: Vec<ControllerProgram>, external: bool) -> MockTrafficSim {
        let mut sim = MockTrafficSim::new(MockTrafficConfig {
            controllers: programs
                .into_iter()
                .map(|program| ScriptedController {
                    program,
                    phase_ticks: 2,
                    external,
                })
                .collect(),
            ..Default::default()
        });
        sim.connect(&TrafficEndpoint::default()).await.unwrap();
        sim
    }

    #[tokio::test]
    async fn test_tick_follows_phase() {
        let sim = mock_with(vec![program("c1", &["Gr", "yr", "rG"], &[(0, "L1")])], false).await;
        let mut bridge = TrafficLightBridge::load(&sim).await.unwrap();
        assert_eq!(bridge.get_state(&"L1".into()), Some(LinkState::Green));

        sim.step().await.unwrap();
        sim.step().await.unwrap();
        bridge.tick(&sim).await.unwrap();
        assert_eq!(bridge.get_state(&"L1".into()), Some(LinkState::Yellow));
    }

    #[tokio::test]
    async fn test_set_state_writes_every_link() {
        let sim = mock_with(vec![program("c1", &["GGr"], &[(0, "L1"), (1, "L1")])], false).await;
        let mut bridge = TrafficLightBridge::load(&sim).await.unwrap();

        assert!(bridge.set_state(&sim, &"L1".into(), LinkState::Red).await.unwrap());
        assert!(!bridge.set_state(&sim, &"nope".into(), LinkState::Red).await.unwrap());
        assert_eq!(sim.link_state("c1", 0), Some(LinkState::Red));
        assert_eq!(sim.link_state("c1", 1), Some(LinkState::Red));
        assert_eq!(bridge.get_state(&"L1".into()), Some(LinkState::Red));

        // Controller now reports the external program, so the write sticks
        sim.step().await.unwrap();
        sim.step().await.unwrap();
        bridge.tick(&sim).await.unwrap();
        assert_eq!(bridge.get_state(&"L1".into()), Some(LinkState::Red));
    }

    #[tokio::test]
    async fn test_switch_off_then_writes_are_noops() {
        let sim = mock_with(vec![program("c1", &["GG"], &[(0, "L1"), (1, "L2")])], false).await;
        let mut bridge = TrafficLightBridge::load(&sim).await.unwrap();

        bridge.switch_off(&sim).await.unwrap();
        assert_eq!(sim.link_state("c1", 0), Some(LinkState::Off));
        assert_eq!(sim.link_state("c1", 1), Some(LinkState::Off));
        assert_eq!(bridge.get_state(&"L1".into()), Some(LinkState::Off));

        assert!(!bridge.set_state(&sim, &"L1".into(), LinkState::Green).await.unwrap());
        assert_eq!(sim.link_state("c1", 0), Some(LinkState::Off));
    }
}
