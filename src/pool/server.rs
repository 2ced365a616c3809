use crate::health::state::HealthState;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServerId(pub u32);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Server {
    id: ServerId,
    capacity: u32,
    /// clamped to >= 0 on every write
    current_load: u32,
    online: bool,
    /// [0.0, 1.0]
    performance_multiplier: f64,
    status: HealthState,
}

impl Server {
    pub fn new(id: ServerId, capacity: u32) -> Self {
        Self {
            id,
            capacity,
            current_load: 0,
            online: true,
            performance_multiplier: 1.0,
            status: HealthState::Healthy,
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn current_load(&self) -> u32 {
        self.current_load
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn performance_multiplier(&self) -> f64 {
        self.performance_multiplier
    }

    pub fn status(&self) -> HealthState {
        self.status
    }

    pub fn set_current_load(&mut self, load: u32) {
        self.current_load = load;
    }

    pub fn add_load(&mut self, amount: u32) {
        self.current_load = self.current_load.saturating_add(amount);
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn set_performance_multiplier(&mut self, multiplier: f64) {
        self.performance_multiplier = multiplier.clamp(0.0, 1.0);
    }

    pub fn set_status(&mut self, status: HealthState) {
        self.status = status;
    }

    /// Spare room for new load; zero when offline or already at capacity.
    pub fn available_capacity(&self) -> u32 {
        if !self.online {
            return 0;
        }
        self.capacity.saturating_sub(self.current_load)
    }

    /// Nominal capacity scaled by the performance multiplier; zero when offline.
    pub fn effective_capacity(&self) -> f64 {
        if !self.online {
            return 0.0;
        }
        self.capacity as f64 * self.performance_multiplier
    }

    pub fn load_percentage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.current_load as f64 / self.capacity as f64 * 100.0
    }
}
