use std::fmt;

/// Simulated operational condition of a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Critical,
    Offline,
}

impl HealthState {
    pub fn label(self) -> &'static str {
        match self {
            HealthState::Healthy => "HEALTHY",
            HealthState::Degraded => "DEGRADED",
            HealthState::Critical => "CRITICAL",
            HealthState::Offline => "OFFLINE",
        }
    }

    /// Canonical health score assigned when a state is forced directly.
    pub fn health_score(self) -> f64 {
        match self {
            HealthState::Healthy => 1.0,
            HealthState::Degraded => 0.7,
            HealthState::Critical => 0.3,
            HealthState::Offline => 0.0,
        }
    }

    /// Canonical performance multiplier assigned when a state is forced directly.
    pub fn performance_multiplier(self) -> f64 {
        match self {
            HealthState::Healthy => 1.0,
            HealthState::Degraded => 0.7,
            HealthState::Critical => 0.4,
            HealthState::Offline => 0.0,
        }
    }

    pub fn is_online(self) -> bool {
        !matches!(self, HealthState::Offline)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_offline_is_off() {
        assert!(HealthState::Healthy.is_online());
        assert!(HealthState::Degraded.is_online());
        assert!(HealthState::Critical.is_online());
        assert!(!HealthState::Offline.is_online());
    }

    #[test]
    fn test_labels() {
        assert_eq!("HEALTHY", HealthState::Healthy.to_string());
        assert_eq!("OFFLINE", HealthState::Offline.to_string());
    }
}
