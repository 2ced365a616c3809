use crate::health::state::HealthState;
use crate::pool::server::ServerId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Minimum time between state transitions for one server.
const STATE_CHANGE_COOLDOWN: Duration = Duration::from_secs(5);

const DEFAULT_FAILURE_PROBABILITY: f64 = 0.01;
const DEFAULT_RECOVERY_PROBABILITY: f64 = 0.2;

/// Health bookkeeping for one registered server.
pub struct ServerHealth {
    server_id: ServerId,
    state: HealthState,
    /// [0.0, 1.0]
    health_score: f64,
    failure_probability: f64,
    recovery_probability: f64,
    last_state_change: Instant,
    /// [0.0, 1.0]
    performance_multiplier: f64,
}

impl ServerHealth {
    fn new(server_id: ServerId, failure_probability: f64, recovery_probability: f64) -> Self {
        Self {
            server_id,
            state: HealthState::Healthy,
            health_score: 1.0,
            failure_probability,
            recovery_probability,
            last_state_change: Instant::now(),
            performance_multiplier: 1.0,
        }
    }

    fn transition(&mut self, state: HealthState, score: f64, multiplier: f64, now: Instant) {
        self.state = state;
        self.health_score = score;
        self.performance_multiplier = multiplier;
        self.last_state_change = now;
    }

    fn event(&self) -> HealthEvent {
        HealthEvent {
            server_id: self.server_id,
            state: self.state,
            performance_multiplier: self.performance_multiplier,
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn health_score(&self) -> f64 {
        self.health_score
    }

    pub fn performance_multiplier(&self) -> f64 {
        self.performance_multiplier
    }
}

/// A state or performance change the driver still has to apply to the pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HealthEvent {
    pub server_id: ServerId,
    pub state: HealthState,
    pub performance_multiplier: f64,
}

/// Per-server stochastic degradation and recovery.
///
/// Every mutation returns the resulting [`HealthEvent`]s instead of firing
/// callbacks; the driver applies them to the engine explicitly.
pub struct HealthSimulator {
    rng: StdRng,
    servers: Vec<ServerHealth>,
    failure_probability: f64,
    recovery_probability: f64,
}

impl HealthSimulator {
    pub fn new(seed: u64) -> Self {
        Self::with_probabilities(
            seed,
            DEFAULT_FAILURE_PROBABILITY,
            DEFAULT_RECOVERY_PROBABILITY,
        )
    }

    /// Probabilities apply to servers registered afterwards.
    pub fn with_probabilities(seed: u64, failure: f64, recovery: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            servers: Vec::new(),
            failure_probability: failure.clamp(0.0, 1.0),
            recovery_probability: recovery.clamp(0.0, 1.0),
        }
    }

    pub fn register(&mut self, server_id: ServerId) {
        if self.servers.iter().any(|sh| sh.server_id == server_id) {
            warn!(server = %server_id, "server already registered with health simulator");
            return;
        }
        self.servers.push(ServerHealth::new(
            server_id,
            self.failure_probability,
            self.recovery_probability,
        ));
    }

    pub fn unregister(&mut self, server_id: ServerId) {
        self.servers.retain(|sh| sh.server_id != server_id);
    }

    pub fn entries(&self) -> &[ServerHealth] {
        &self.servers
    }

    pub fn state_of(&self, server_id: ServerId) -> Option<HealthState> {
        self.entry(server_id).map(|sh| sh.state)
    }

    pub fn health_score_of(&self, server_id: ServerId) -> Option<f64> {
        self.entry(server_id).map(|sh| sh.health_score)
    }

    pub fn performance_multiplier_of(&self, server_id: ServerId) -> Option<f64> {
        self.entry(server_id).map(|sh| sh.performance_multiplier)
    }

    fn entry(&self, server_id: ServerId) -> Option<&ServerHealth> {
        self.servers.iter().find(|sh| sh.server_id == server_id)
    }

    fn entry_mut(&mut self, server_id: ServerId) -> Option<&mut ServerHealth> {
        self.servers.iter_mut().find(|sh| sh.server_id == server_id)
    }

    /// Run one stochastic update over every registered server.
    pub fn tick(&mut self) -> Vec<HealthEvent> {
        self.tick_at(Instant::now())
    }

    /// One uniform draw per eligible server; servers inside the cooldown
    /// window are skipped so a state never flips twice in quick succession.
    pub fn tick_at(&mut self, now: Instant) -> Vec<HealthEvent> {
        let mut events = Vec::new();
        for entry in &mut self.servers {
            if now.duration_since(entry.last_state_change) < STATE_CHANGE_COOLDOWN {
                continue;
            }

            let r: f64 = self.rng.gen_range(0.0..1.0);
            let next = match entry.state {
                HealthState::Healthy if r < entry.failure_probability => {
                    Some((HealthState::Degraded, 0.7, 0.7))
                }
                HealthState::Degraded if r < entry.recovery_probability => {
                    Some((HealthState::Healthy, 1.0, 1.0))
                }
                HealthState::Degraded if r > 1.0 - 2.0 * entry.failure_probability => {
                    Some((HealthState::Critical, 0.3, 0.4))
                }
                HealthState::Critical if r < entry.recovery_probability / 2.0 => {
                    Some((HealthState::Degraded, 0.6, 0.6))
                }
                HealthState::Critical if r > 1.0 - 3.0 * entry.failure_probability => {
                    Some((HealthState::Offline, 0.0, 0.0))
                }
                HealthState::Offline if r < entry.recovery_probability / 3.0 => {
                    Some((HealthState::Critical, 0.2, 0.3))
                }
                _ => None,
            };

            if let Some((state, score, multiplier)) = next {
                info!(server = %entry.server_id, from = %entry.state, to = %state, "health transition");
                entry.transition(state, score, multiplier, now);
                events.push(entry.event());
            }
        }
        events
    }

    /// Force a state directly; score and multiplier come from the canonical
    /// per-state table.
    pub fn set_state(&mut self, server_id: ServerId, state: HealthState) -> Option<HealthEvent> {
        let Some(entry) = self.entry_mut(server_id) else {
            warn!(server = %server_id, "unknown server in health simulator");
            return None;
        };
        entry.transition(
            state,
            state.health_score(),
            state.performance_multiplier(),
            Instant::now(),
        );
        Some(entry.event())
    }

    /// Multiply the current performance multiplier and re-derive the discrete
    /// state from it. No-op for offline servers.
    pub fn degrade_performance(
        &mut self,
        server_id: ServerId,
        factor: f64,
    ) -> Option<HealthEvent> {
        let factor = factor.clamp(0.0, 1.0);
        let Some(entry) = self.entry_mut(server_id) else {
            warn!(server = %server_id, "unknown server in health simulator");
            return None;
        };
        if entry.state == HealthState::Offline {
            return None;
        }

        entry.performance_multiplier *= factor;
        if entry.performance_multiplier < 0.1 {
            entry.state = HealthState::Offline;
            entry.health_score = 0.0;
            entry.performance_multiplier = 0.0;
        } else if entry.performance_multiplier < 0.5 {
            entry.state = HealthState::Critical;
            entry.health_score = 0.3;
        } else if entry.performance_multiplier < 0.9 {
            entry.state = HealthState::Degraded;
            entry.health_score = 0.7;
        }
        entry.last_state_change = Instant::now();
        Some(entry.event())
    }

    /// Force a server back to full health.
    pub fn recover(&mut self, server_id: ServerId) -> Option<HealthEvent> {
        self.set_state(server_id, HealthState::Healthy)
    }

    /// Fail one uniformly chosen server with a random severity.
    pub fn random_failure(&mut self) -> Option<HealthEvent> {
        if self.servers.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.servers.len());
        let server_id = self.servers[index].server_id;
        let severity: f64 = self.rng.gen_range(0.0..1.0);
        let state = if severity < 0.2 {
            HealthState::Degraded
        } else if severity < 0.7 {
            HealthState::Critical
        } else {
            HealthState::Offline
        };
        self.set_state(server_id, state)
    }

    /// Cut every listed server off entirely.
    pub fn network_partition(&mut self, server_ids: &[ServerId]) -> Vec<HealthEvent> {
        server_ids
            .iter()
            .filter_map(|id| self.set_state(*id, HealthState::Offline))
            .collect()
    }

    /// Degrade a server by a random factor in [0.5, 0.8), as sustained
    /// overload would.
    pub fn high_load(&mut self, server_id: ServerId) -> Option<HealthEvent> {
        match self.state_of(server_id) {
            None | Some(HealthState::Offline) => None,
            Some(_) => {
                let factor = self.rng.gen_range(0.5..0.8);
                self.degrade_performance(server_id, factor)
            }
        }
    }
}
