//! Swarm scenarios for deterministic simulation runs.

use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use swarmsync_core::{AgentStatus, BehaviorType};

use crate::error::SimError;
use crate::harness::HarnessConfig;
use crate::swarm::{SimAgent, SimSwarm, SwarmConfig};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Tight formation moving together, plus far stragglers
    Flock,

    /// SIM-002: Position-less agents reporting in lockstep
    Metronome,

    /// SIM-003: Agents agreeing on a shared score
    Consensus,

    /// SIM-004: Two camps with very different load
    Fractured,

    /// SIM-005: Flaky adapter and hanging test runs
    Blackout,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Flock,
            ScenarioId::Metronome,
            ScenarioId::Consensus,
            ScenarioId::Fractured,
            ScenarioId::Blackout,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Flock => "flock",
            ScenarioId::Metronome => "metronome",
            ScenarioId::Consensus => "consensus",
            ScenarioId::Fractured => "fractured",
            ScenarioId::Blackout => "blackout",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Flock => "Formation flying in lockstep with two stragglers, expect a spatial cluster",
            ScenarioId::Metronome => "Agents without positions reporting every tick, expect periodic and synchronized updates",
            ScenarioId::Consensus => "Agents settling on the same score, expect metric convergence",
            ScenarioId::Fractured => "Fleet split between light and heavy load, expect metric clustering",
            ScenarioId::Blackout => "30% adapter failures and stalling test runs, session must still complete",
        }
    }

    /// Behaviors a run of this scenario must detect.
    pub fn expected_behaviors(&self) -> &'static [BehaviorType] {
        match self {
            ScenarioId::Flock => &[BehaviorType::SpatialClustering],
            ScenarioId::Metronome => &[BehaviorType::PeriodicUpdates, BehaviorType::SynchronizedUpdates],
            ScenarioId::Consensus => &[BehaviorType::MetricConvergence],
            ScenarioId::Fractured => &[BehaviorType::MetricClustering],
            ScenarioId::Blackout => &[],
        }
    }

    /// Fewest agents for which the expected behaviors are reachable.
    pub fn min_agents(&self) -> usize {
        match self {
            ScenarioId::Flock => 5,
            ScenarioId::Fractured => 6,
            _ => 3,
        }
    }

    pub fn swarm_config(&self) -> SwarmConfig {
        match self {
            ScenarioId::Blackout => SwarmConfig {
                failure_rate: 0.3,
                ..SwarmConfig::default()
            },
            _ => SwarmConfig::default(),
        }
    }

    pub fn harness_config(&self) -> HarnessConfig {
        match self {
            ScenarioId::Blackout => HarnessConfig {
                failure_rate: 0.3,
                stall_probability: 0.25,
                generation_failure_rate: 0.1,
            },
            _ => HarnessConfig::default(),
        }
    }

    /// Spawns `num_agents` agents (at least [`Self::min_agents`]) into the swarm.
    pub fn populate(&self, swarm: &SimSwarm, num_agents: usize, rng: &mut ChaCha8Rng) {
        let n = num_agents.max(self.min_agents());
        let name = |i: usize| format!("agent_{:03}", i);

        match self {
            ScenarioId::Flock => {
                let heading = Vector3::new(2.0, 1.0, 0.0);
                let stragglers = 2;
                for i in 0..n {
                    let agent = if i < n - stragglers {
                        let offset = Vector3::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5), 0.0);
                        SimAgent::new(name(i)).at(offset).moving(heading)
                    } else {
                        let far = 200.0 * (i as f64 + 1.0);
                        SimAgent::new(name(i))
                            .at(Vector3::new(far, -far, 50.0))
                            .moving(Vector3::new(-1.0, 0.0, 0.0))
                    };
                    swarm.add_agent(agent.with_metric("battery", rng.gen_range(0.2..1.0)));
                }
            }
            ScenarioId::Metronome => {
                for i in 0..n {
                    swarm.add_agent(SimAgent::new(name(i)).with_metric("ticks", i as f64 * 10.0));
                }
            }
            ScenarioId::Consensus => {
                for i in 0..n {
                    swarm.add_agent(
                        SimAgent::new(name(i))
                            .with_metric("score", 0.9)
                            .with_metric("tier", "gold"),
                    );
                }
            }
            ScenarioId::Fractured => {
                for i in 0..n {
                    let load = if i % 2 == 0 { 1.0 } else { 10.0 };
                    swarm.add_agent(SimAgent::new(name(i)).with_metric("load", load));
                }
            }
            ScenarioId::Blackout => {
                for i in 0..n {
                    let status = if i % 4 == 3 { AgentStatus::Error } else { AgentStatus::Active };
                    let position = Vector3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0), 0.0);
                    swarm.add_agent(
                        SimAgent::new(name(i))
                            .at(position)
                            .with_status(status)
                            .with_metric("load", rng.gen_range(0.0..5.0)),
                    );
                }
            }
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flock" | "sim-001" => Ok(ScenarioId::Flock),
            "metronome" | "sim-002" => Ok(ScenarioId::Metronome),
            "consensus" | "sim-003" => Ok(ScenarioId::Consensus),
            "fractured" | "sim-004" => Ok(ScenarioId::Fractured),
            "blackout" | "sim-005" => Ok(ScenarioId::Blackout),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}
