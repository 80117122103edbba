//! Ground truth swarm for simulation.
//!
//! The SimSwarm holds the "God's eye view" of every simulated agent and
//! answers adapter queries from it:
//! - True positions (constant-velocity kinematics on the virtual clock)
//! - Status and metrics, reported with Gaussian noise
//! - Injected query failures at a configurable rate

use async_trait::async_trait;
use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use swarmsync_core::{AgentAdapter, AgentStatus, MetricValue};
use swarmsync_env::{EnvError, SyncContext};

use crate::context::SimContext;

/// RNG stream reserved for agent physics and reporting noise.
const PHYSICS_STREAM: u64 = 0x5eed_0001;

/// A ground truth agent in the simulation.
#[derive(Debug, Clone)]
pub struct SimAgent {
    pub id: String,

    /// `None` for agents without a positioning system
    pub position: Option<Vector3<f64>>,

    /// Velocity in units per second
    pub velocity: Vector3<f64>,

    pub status: AgentStatus,

    pub metrics: BTreeMap<String, MetricValue>,
}

impl SimAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: None,
            velocity: Vector3::zeros(),
            status: AgentStatus::Active,
            metrics: BTreeMap::new(),
        }
    }

    pub fn at(mut self, position: Vector3<f64>) -> Self {
        self.position = Some(position);
        self
    }

    pub fn moving(mut self, velocity: Vector3<f64>) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }
}

/// Reporting behaviour of the simulated fleet.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Position noise standard deviation (units)
    pub position_noise_std: f64,

    /// Absolute noise standard deviation on numeric metrics
    pub metric_noise_std: f64,

    /// Probability that any single adapter query fails
    pub failure_rate: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            position_noise_std: 0.05,
            metric_noise_std: 0.01,
            failure_rate: 0.0,
        }
    }
}

struct SwarmInner {
    rng: ChaCha8Rng,
    agents: BTreeMap<String, SimAgent>,
    /// Virtual time (seconds) the kinematics were last advanced to
    current_time: f64,
}

/// The simulated fleet, queried through [`AgentAdapter`].
pub struct SimSwarm {
    ctx: Arc<SimContext>,
    config: SwarmConfig,
    position_noise: Option<Normal<f64>>,
    metric_noise: Option<Normal<f64>>,
    inner: Mutex<SwarmInner>,
}

fn noise(std: f64) -> Option<Normal<f64>> {
    if std > 0.0 {
        Normal::new(0.0, std).ok()
    } else {
        None
    }
}

impl SimSwarm {
    pub fn new(ctx: Arc<SimContext>, config: SwarmConfig) -> Self {
        let rng = ctx.fork_rng(PHYSICS_STREAM);
        Self {
            position_noise: noise(config.position_noise_std),
            metric_noise: noise(config.metric_noise_std),
            config,
            inner: Mutex::new(SwarmInner {
                rng,
                agents: BTreeMap::new(),
                current_time: ctx.now().as_secs_f64(),
            }),
            ctx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SwarmInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds (or replaces) an agent.
    pub fn add_agent(&self, agent: SimAgent) {
        self.lock().agents.insert(agent.id.clone(), agent);
    }

    /// Ids of every simulated agent, sorted.
    pub fn agent_ids(&self) -> Vec<String> {
        self.lock().agents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_status(&self, agent_id: &str, status: AgentStatus) -> bool {
        match self.lock().agents.get_mut(agent_id) {
            Some(agent) => {
                agent.status = status;
                true
            }
            None => false,
        }
    }

    /// Ground truth for one agent, advanced to the current virtual time.
    pub fn ground_truth(&self, agent_id: &str) -> Option<SimAgent> {
        let mut inner = self.lock();
        Self::step_to(&mut inner, self.ctx.now().as_secs_f64());
        inner.agents.get(agent_id).cloned()
    }

    fn step_to(inner: &mut SwarmInner, time: f64) {
        let dt = time - inner.current_time;
        if dt <= 0.0 {
            return;
        }
        for agent in inner.agents.values_mut() {
            if let Some(position) = agent.position.as_mut() {
                *position += agent.velocity * dt;
            }
        }
        inner.current_time = time;
    }

    /// Advance kinematics, roll for an injected failure, then hand the
    /// agent to `read` together with the RNG.
    fn query<T>(
        &self,
        agent_id: &str,
        what: &str,
        read: impl FnOnce(&SimAgent, &mut ChaCha8Rng) -> T,
    ) -> Result<T, EnvError> {
        let mut inner = self.lock();
        Self::step_to(&mut inner, self.ctx.now().as_secs_f64());

        let SwarmInner { rng, agents, .. } = &mut *inner;
        let agent = agents
            .get(agent_id)
            .ok_or_else(|| EnvError::unavailable(format!("unknown agent {}", agent_id)))?;

        if self.config.failure_rate > 0.0 && rng.gen_bool(self.config.failure_rate.min(1.0)) {
            return Err(EnvError::unavailable(format!("{} of {} dropped", what, agent_id)));
        }

        Ok(read(agent, rng))
    }
}

#[async_trait]
impl AgentAdapter for SimSwarm {
    async fn get_status(&self, agent_id: &str) -> Result<String, EnvError> {
        self.query(agent_id, "status", |agent, _| agent.status.as_str().to_string())
    }

    async fn get_position(&self, agent_id: &str) -> Result<Option<Vector3<f64>>, EnvError> {
        let noise = self.position_noise;
        self.query(agent_id, "position", |agent, rng| {
            agent.position.map(|truth| match noise {
                Some(dist) => Vector3::new(
                    truth.x + dist.sample(rng),
                    truth.y + dist.sample(rng),
                    truth.z + dist.sample(rng),
                ),
                None => truth,
            })
        })
    }

    async fn get_metrics(&self, agent_id: &str) -> Result<BTreeMap<String, MetricValue>, EnvError> {
        let noise = self.metric_noise;
        self.query(agent_id, "metrics", |agent, rng| {
            agent
                .metrics
                .iter()
                .map(|(name, value)| {
                    let reported = match (value, noise) {
                        (MetricValue::Number(v), Some(dist)) => MetricValue::Number(v + dist.sample(rng)),
                        _ => value.clone(),
                    };
                    (name.clone(), reported)
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quiet() -> SwarmConfig {
        SwarmConfig {
            position_noise_std: 0.0,
            metric_noise_std: 0.0,
            failure_rate: 0.0,
        }
    }

    #[tokio::test]
    async fn test_swarm_kinematics_follow_virtual_clock() {
        let ctx = SimContext::shared(42);
        let swarm = SimSwarm::new(ctx.clone(), quiet());
        swarm.add_agent(
            SimAgent::new("a")
                .at(Vector3::zeros())
                .moving(Vector3::new(1.0, 0.0, 0.0)),
        );

        ctx.sleep(Duration::from_secs(2)).await;

        let position = swarm.get_position("a").await.unwrap().unwrap();
        assert!((position.x - 2.0).abs() < 1e-9);
        assert_eq!(position.y, 0.0);
    }

    #[tokio::test]
    async fn test_swarm_reports_status_and_metrics() {
        let swarm = SimSwarm::new(SimContext::shared(1), quiet());
        swarm.add_agent(
            SimAgent::new("a")
                .with_status(AgentStatus::Idle)
                .with_metric("load", 0.5)
                .with_metric("tier", "gold"),
        );

        assert_eq!(swarm.get_status("a").await.unwrap(), "idle");
        assert_eq!(swarm.get_position("a").await.unwrap(), None);

        let metrics = swarm.get_metrics("a").await.unwrap();
        assert_eq!(metrics["load"], MetricValue::Number(0.5));
        assert_eq!(metrics["tier"], MetricValue::Text("gold".into()));

        assert!(swarm.set_status("a", AgentStatus::Error));
        assert_eq!(swarm.get_status("a").await.unwrap(), "error");
    }

    #[tokio::test]
    async fn test_unknown_agent_is_unavailable() {
        let swarm = SimSwarm::new(SimContext::shared(1), SwarmConfig::default());
        assert!(swarm.get_status("ghost").await.is_err());
        assert!(!swarm.set_status("ghost", AgentStatus::Idle));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let config = SwarmConfig {
            failure_rate: 1.0,
            ..quiet()
        };
        let swarm = SimSwarm::new(SimContext::shared(3), config);
        swarm.add_agent(SimAgent::new("a"));

        assert!(swarm.get_status("a").await.is_err());
        assert!(swarm.get_metrics("a").await.is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_ground_truth_is_linear_in_time(
            vx in -50.0f64..50.0,
            vy in -50.0f64..50.0,
            steps in proptest::collection::vec(0u64..5_000, 1..8),
        ) {
            let ctx = SimContext::shared(1);
            let swarm = SimSwarm::new(ctx.clone(), quiet());
            swarm.add_agent(SimAgent::new("a").at(Vector3::zeros()).moving(Vector3::new(vx, vy, 0.0)));

            for ms in steps {
                ctx.advance_time(Duration::from_millis(ms));
                // Observing mid-flight must not change the trajectory
                let _ = swarm.ground_truth("a");
            }

            let t = ctx.now().as_secs_f64();
            let position = swarm.ground_truth("a").unwrap().position.unwrap();
            proptest::prop_assert!((position.x - vx * t).abs() < 1e-6);
            proptest::prop_assert!((position.y - vy * t).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_noise_is_deterministic() {
        async fn sample(seed: u64) -> Vector3<f64> {
            let swarm = SimSwarm::new(SimContext::shared(seed), SwarmConfig::default());
            swarm.add_agent(SimAgent::new("a").at(Vector3::new(10.0, 10.0, 0.0)));
            swarm.get_position("a").await.unwrap().unwrap()
        }

        let a = sample(99).await;
        let b = sample(99).await;
        let c = sample(100).await;

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!((a - Vector3::new(10.0, 10.0, 0.0)).norm() < 1.0);
    }
}
