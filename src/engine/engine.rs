use crate::engine::algorithm::Algorithm;
use crate::health::simulator::HealthEvent;
use crate::pool::pool::ServerPool;
use crate::pool::server::{Server, ServerId};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("server #{0} not found")]
    ServerNotFound(ServerId),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Outcome of one distribution call. Whatever was placed is committed;
/// `dropped` is the shortfall that found no capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub requested: u32,
    pub placed: u32,
    pub dropped: u32,
}

impl Placement {
    fn complete(amount: u32) -> Self {
        Self {
            requested: amount,
            placed: amount,
            dropped: 0,
        }
    }

    fn rejected(amount: u32) -> Self {
        Self {
            requested: amount,
            placed: 0,
            dropped: amount,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.dropped == 0
    }
}

/// Distributes load units over the server pool under the active algorithm.
pub struct DistributionEngine {
    pool: ServerPool,
    algorithm: Algorithm,
    /// round-robin start position, counted over online servers
    cursor: usize,
    random_load_amount: u32,
}

impl DistributionEngine {
    pub fn new() -> Self {
        Self {
            pool: ServerPool::new(),
            algorithm: Algorithm::RoundRobin,
            cursor: 0,
            random_load_amount: 10,
        }
    }

    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    pub fn servers(&self) -> &[Server] {
        self.pool.servers()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = algorithm;
        info!(algorithm = algorithm.name(), "switched balancing algorithm");
    }

    pub fn random_load_amount(&self) -> u32 {
        self.random_load_amount
    }

    pub fn set_random_load_amount(&mut self, amount: u32) {
        self.random_load_amount = amount;
    }

    pub fn add_server(&mut self, capacity: u32) -> ServerId {
        let id = self.pool.add(capacity);
        info!(server = %id, capacity, "server added");
        id
    }

    /// Removes a server after re-placing its load on the survivors. With no
    /// online survivors the stranded load is reported dropped.
    pub fn remove_server(&mut self, id: ServerId) -> EngineResult<Placement> {
        let removed = self
            .pool
            .remove(id)
            .ok_or(EngineError::ServerNotFound(id))?;
        let stranded = removed.current_load();
        info!(server = %id, stranded, "server removed");
        if stranded == 0 {
            return Ok(Placement::complete(0));
        }
        Ok(self.distribute(stranded))
    }

    /// Direct load on one server, clamped to its spare room.
    pub fn add_load_to_server(&mut self, id: ServerId, amount: u32) -> EngineResult<Placement> {
        let server = self
            .pool
            .get_mut(id)
            .ok_or(EngineError::ServerNotFound(id))?;
        if !server.is_online() {
            warn!(server = %id, "server is offline; load rejected");
            return Ok(Placement::rejected(amount));
        }
        let available = server.available_capacity();
        let placed = amount.min(available);
        server.add_load(placed);
        if placed < amount {
            warn!(server = %id, placed, clamped = amount - placed, "load clamped to available capacity");
        }
        Ok(Placement {
            requested: amount,
            placed,
            dropped: amount - placed,
        })
    }

    pub fn add_system_load(&mut self, amount: u32) -> Placement {
        self.distribute(amount)
    }

    pub fn add_random_load(&mut self) -> Placement {
        self.distribute(self.random_load_amount)
    }

    /// Runs the active algorithm over the online servers. Partial placement
    /// commits; the shortfall is reported, never queued.
    pub fn distribute(&mut self, amount: u32) -> Placement {
        if amount == 0 {
            return Placement::complete(0);
        }
        if self.pool.is_empty() {
            warn!(amount, "no servers available to distribute load");
            return Placement::rejected(amount);
        }
        if self.pool.online_count() == 0 {
            warn!(amount, "no online servers available");
            return Placement::rejected(amount);
        }

        let placed = match self.algorithm {
            Algorithm::RoundRobin => self.distribute_round_robin(amount),
            Algorithm::LeastLoaded => self.distribute_least_loaded(amount),
            Algorithm::WeightedOptimization => self.distribute_weighted(amount),
        };
        let dropped = amount - placed;
        if dropped > 0 {
            warn!(dropped, "insufficient capacity; load units were not distributed");
        }
        Placement {
            requested: amount,
            placed,
            dropped,
        }
    }

    /// Bulk-spread round robin: an even base share to every online server in
    /// pool order from the cursor, the remainder one unit each to the first
    /// servers in that order. The cursor advances by the remainder so the
    /// extra units rotate across calls.
    fn distribute_round_robin(&mut self, amount: u32) -> u32 {
        let online: Vec<usize> = self
            .pool
            .servers()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_online())
            .map(|(i, _)| i)
            .collect();
        let n = online.len();
        let start = self.cursor % n;
        let base = amount / n as u32;
        let remainder = (amount % n as u32) as usize;

        let servers = self.pool.servers_mut();
        let mut leftover = 0;
        for offset in 0..n {
            let index = online[(start + offset) % n];
            let share = base + u32::from(offset < remainder);
            let placed = share.min(servers[index].available_capacity());
            servers[index].add_load(placed);
            leftover += share - placed;
        }

        // shares capped by full servers cycle to whoever still has room
        while leftover > 0 {
            let mut progressed = false;
            for offset in 0..n {
                if leftover == 0 {
                    break;
                }
                let index = online[(start + offset) % n];
                if servers[index].available_capacity() > 0 {
                    servers[index].add_load(1);
                    leftover -= 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        self.cursor = (start + remainder) % n;
        amount - leftover
    }

    /// Greedy fill of whichever online server has the most spare room, raw
    /// capacity minus load, ignoring the health multiplier.
    fn distribute_least_loaded(&mut self, amount: u32) -> u32 {
        let servers = self.pool.servers_mut();
        let mut remaining = amount;
        while remaining > 0 {
            // most spare room wins; ties go to the earliest server
            let mut best: Option<usize> = None;
            let mut best_avail = 0;
            let mut runner_up = 0;
            for (i, server) in servers.iter().enumerate() {
                if !server.is_online() {
                    continue;
                }
                let avail = server.available_capacity();
                if avail > best_avail {
                    runner_up = best_avail;
                    best_avail = avail;
                    best = Some(i);
                } else if avail > runner_up {
                    runner_up = avail;
                }
            }
            let Some(index) = best else { break };

            // pour only down to the runner-up's level so the pick rotates
            let chunk = (best_avail - runner_up).max(1).min(remaining);
            servers[index].add_load(chunk);
            remaining -= chunk;
        }
        amount - remaining
    }

    /// Proportional split over effective capacities, shortfall cycled one
    /// unit at a time to servers with spare room. Offline servers get zero.
    fn distribute_weighted(&mut self, amount: u32) -> u32 {
        let servers = self.pool.servers_mut();
        let total_effective: f64 = servers.iter().map(|s| s.effective_capacity()).sum();
        if total_effective <= 0.0 {
            warn!("no effective capacity available");
            return 0;
        }

        let mut planned = vec![0u32; servers.len()];
        let mut assigned = 0;
        for (i, server) in servers.iter().enumerate() {
            if !server.is_online() {
                continue;
            }
            let ratio = server.effective_capacity() / total_effective;
            let ideal = (amount as f64 * ratio).floor() as u32;
            planned[i] = ideal.min(server.available_capacity());
            assigned += planned[i];
        }

        let mut shortfall = amount - assigned;
        while shortfall > 0 {
            let mut progressed = false;
            for (i, server) in servers.iter().enumerate() {
                if shortfall == 0 {
                    break;
                }
                if !server.is_online() {
                    continue;
                }
                if server.available_capacity() > planned[i] {
                    planned[i] += 1;
                    shortfall -= 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        for (i, server) in servers.iter_mut().enumerate() {
            if planned[i] > 0 {
                server.add_load(planned[i]);
            }
        }
        amount - shortfall
    }

    /// Zero every load and re-derive the whole distribution from scratch
    /// under the active algorithm.
    pub fn rebalance(&mut self) -> Placement {
        let total = self.pool.total_load();
        for server in self.pool.servers_mut() {
            server.set_current_load(0);
        }
        info!(total, algorithm = self.algorithm.name(), "rebalancing");
        self.distribute(total)
    }

    /// Population variance of per-server utilization percentage, online
    /// servers only.
    pub fn load_variance_percent(&self) -> f64 {
        let percentages: Vec<f64> = self
            .pool
            .servers()
            .iter()
            .filter(|s| s.is_online())
            .map(|s| s.load_percentage())
            .collect();
        if percentages.is_empty() {
            return 0.0;
        }
        let mean = percentages.iter().sum::<f64>() / percentages.len() as f64;
        percentages
            .iter()
            .map(|p| (p - mean) * (p - mean))
            .sum::<f64>()
            / percentages.len() as f64
    }

    /// Total load over total online capacity, as a ratio.
    pub fn system_utilization(&self) -> f64 {
        let capacity = self.pool.total_online_capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.pool.total_load() as f64 / capacity as f64
    }

    /// Fold a simulator event into the pool record it concerns.
    pub fn apply_health_event(&mut self, event: HealthEvent) {
        let Some(server) = self.pool.get_mut(event.server_id) else {
            warn!(server = %event.server_id, "health event for unknown server");
            return;
        };
        server.set_status(event.state);
        server.set_online(event.state.is_online());
        server.set_performance_multiplier(event.performance_multiplier);
    }
}

impl Default for DistributionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state::HealthState;
    use approx::assert_relative_eq;

    fn engine_with(capacities: &[u32]) -> DistributionEngine {
        let mut engine = DistributionEngine::new();
        for &capacity in capacities {
            engine.add_server(capacity);
        }
        engine
    }

    fn loads(engine: &DistributionEngine) -> Vec<u32> {
        engine.servers().iter().map(|s| s.current_load()).collect()
    }

    fn set_offline(engine: &mut DistributionEngine, id: ServerId) {
        engine.apply_health_event(HealthEvent {
            server_id: id,
            state: HealthState::Offline,
            performance_multiplier: 0.0,
        });
    }

    #[test]
    fn test_equal_pool_spreads_evenly_under_every_algorithm() {
        for algorithm in [
            Algorithm::RoundRobin,
            Algorithm::LeastLoaded,
            Algorithm::WeightedOptimization,
        ] {
            let mut engine = engine_with(&[100, 100, 100]);
            engine.set_algorithm(algorithm);
            let placement = engine.add_system_load(90);
            assert_eq!(vec![30, 30, 30], loads(&engine), "{algorithm}");
            assert!(placement.is_complete());
        }
    }

    #[test]
    fn test_weighted_splits_proportionally() {
        let mut engine = engine_with(&[50, 100, 150]);
        engine.set_algorithm(Algorithm::WeightedOptimization);
        let placement = engine.add_system_load(60);
        assert_eq!(vec![10, 20, 30], loads(&engine));
        assert_eq!(60, placement.placed);
    }

    #[test]
    fn test_round_robin_rotates_the_remainder() {
        let mut engine = engine_with(&[100, 100, 100]);
        engine.add_system_load(10);
        assert_eq!(vec![4, 3, 3], loads(&engine));

        // cursor moved past the server that got the extra unit
        engine.add_system_load(10);
        assert_eq!(vec![7, 7, 6], loads(&engine));

        let spread = loads(&engine);
        let max = *spread.iter().max().unwrap();
        let min = *spread.iter().min().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn test_round_robin_skips_offline_servers() {
        let mut engine = engine_with(&[100, 100, 100]);
        set_offline(&mut engine, ServerId(2));
        engine.add_system_load(40);
        assert_eq!(vec![20, 0, 20], loads(&engine));
    }

    #[test]
    fn test_round_robin_reroutes_capped_shares() {
        let mut engine = engine_with(&[10, 100, 100]);
        let placement = engine.add_system_load(90);
        assert_eq!(vec![10, 40, 40], loads(&engine));
        assert_eq!(90, placement.placed);
    }

    #[test]
    fn test_partial_placement_commits_and_reports_the_rest() {
        let mut engine = engine_with(&[10, 10, 10]);
        let placement = engine.add_system_load(90);
        assert_eq!(vec![10, 10, 10], loads(&engine));
        assert_eq!(30, placement.placed);
        assert_eq!(60, placement.dropped);
    }

    #[test]
    fn test_least_loaded_fills_the_most_available_first() {
        let mut engine = engine_with(&[100, 100]);
        engine.set_algorithm(Algorithm::LeastLoaded);
        engine
            .add_load_to_server(ServerId(1), 50)
            .unwrap();

        engine.add_system_load(30);
        assert_eq!(vec![50, 30], loads(&engine));
    }

    #[test]
    fn test_least_loaded_never_overfills() {
        let mut engine = engine_with(&[20, 20]);
        engine.set_algorithm(Algorithm::LeastLoaded);
        let placement = engine.add_system_load(100);
        assert_eq!(vec![20, 20], loads(&engine));
        assert_eq!(40, placement.placed);
        assert_eq!(60, placement.dropped);
    }

    #[test]
    fn test_least_loaded_ignores_offline_servers() {
        let mut engine = engine_with(&[100, 100]);
        engine.set_algorithm(Algorithm::LeastLoaded);
        set_offline(&mut engine, ServerId(1));
        engine.add_system_load(30);
        assert_eq!(vec![0, 30], loads(&engine));
    }

    #[test]
    fn test_weighted_gives_offline_servers_nothing() {
        let mut engine = engine_with(&[50, 100, 150]);
        engine.set_algorithm(Algorithm::WeightedOptimization);
        set_offline(&mut engine, ServerId(3));
        engine.add_system_load(30);
        assert_eq!(vec![10, 20, 0], loads(&engine));
    }

    #[test]
    fn test_weighted_cycles_the_flooring_shortfall() {
        let mut engine = engine_with(&[100, 100, 100]);
        engine.set_algorithm(Algorithm::WeightedOptimization);
        engine.add_system_load(10);
        assert_eq!(vec![4, 3, 3], loads(&engine));
    }

    #[test]
    fn test_weighted_respects_degraded_multipliers() {
        let mut engine = engine_with(&[100, 100]);
        engine.set_algorithm(Algorithm::WeightedOptimization);
        engine.apply_health_event(HealthEvent {
            server_id: ServerId(2),
            state: HealthState::Critical,
            performance_multiplier: 0.4,
        });

        // effective capacities 100 vs 40
        engine.add_system_load(70);
        assert_eq!(vec![50, 20], loads(&engine));
    }

    #[test]
    fn test_weighted_with_zero_effective_capacity_drops_everything() {
        let mut engine = engine_with(&[100]);
        engine.set_algorithm(Algorithm::WeightedOptimization);
        engine.apply_health_event(HealthEvent {
            server_id: ServerId(1),
            state: HealthState::Degraded,
            performance_multiplier: 0.0,
        });

        let placement = engine.add_system_load(25);
        assert_eq!(0, placement.placed);
        assert_eq!(25, placement.dropped);
    }

    #[test]
    fn test_direct_load_clamps_to_available() {
        let mut engine = engine_with(&[100]);
        engine.add_load_to_server(ServerId(1), 95).unwrap();
        let placement = engine.add_load_to_server(ServerId(1), 10).unwrap();
        assert_eq!(5, placement.placed);
        assert_eq!(5, placement.dropped);
        assert_eq!(vec![100], loads(&engine));
    }

    #[test]
    fn test_direct_load_on_offline_server_is_rejected() {
        let mut engine = engine_with(&[100]);
        set_offline(&mut engine, ServerId(1));
        let placement = engine.add_load_to_server(ServerId(1), 10).unwrap();
        assert_eq!(0, placement.placed);
        assert_eq!(10, placement.dropped);
    }

    #[test]
    fn test_unknown_server_is_an_error() {
        let mut engine = engine_with(&[100]);
        assert_eq!(
            Err(EngineError::ServerNotFound(ServerId(9))),
            engine.add_load_to_server(ServerId(9), 10)
        );
        assert_eq!(
            Err(EngineError::ServerNotFound(ServerId(9))),
            engine.remove_server(ServerId(9))
        );
    }

    #[test]
    fn test_remove_server_redistributes_its_load() {
        let mut engine = engine_with(&[100, 100, 100]);
        engine.add_load_to_server(ServerId(1), 30).unwrap();

        let placement = engine.remove_server(ServerId(1)).unwrap();
        assert_eq!(30, placement.placed);
        assert_eq!(vec![15, 15], loads(&engine));
        assert_eq!(2, engine.pool().len());
    }

    #[test]
    fn test_removing_the_last_server_reports_the_load_dropped() {
        let mut engine = engine_with(&[100]);
        engine.add_load_to_server(ServerId(1), 40).unwrap();

        let placement = engine.remove_server(ServerId(1)).unwrap();
        assert_eq!(40, placement.requested);
        assert_eq!(0, placement.placed);
        assert_eq!(40, placement.dropped);
        assert!(engine.pool().is_empty());
    }

    #[test]
    fn test_rebalance_rederives_from_scratch() {
        let mut engine = engine_with(&[50, 100, 150]);
        engine.set_algorithm(Algorithm::WeightedOptimization);
        engine.add_load_to_server(ServerId(1), 40).unwrap();

        let placement = engine.rebalance();
        assert_eq!(40, placement.placed);
        assert_eq!(vec![7, 13, 20], loads(&engine));
    }

    #[test]
    fn test_rebalance_pulls_load_off_offline_servers() {
        let mut engine = engine_with(&[100, 100, 100]);
        engine.add_load_to_server(ServerId(2), 20).unwrap();
        set_offline(&mut engine, ServerId(2));

        engine.rebalance();
        assert_eq!(vec![10, 0, 10], loads(&engine));
    }

    #[test]
    fn test_distribution_on_an_empty_pool_is_a_reported_no_op() {
        let mut engine = DistributionEngine::new();
        let placement = engine.add_system_load(50);
        assert_eq!(50, placement.dropped);
        assert_eq!(0, placement.placed);
    }

    #[test]
    fn test_variance_is_zero_for_a_balanced_pool() {
        let mut engine = engine_with(&[100, 100]);
        engine.add_system_load(100);
        assert_relative_eq!(0.0, engine.load_variance_percent());
    }

    #[test]
    fn test_variance_reflects_imbalance_over_online_servers_only() {
        let mut engine = engine_with(&[100, 100, 100]);
        engine.add_load_to_server(ServerId(1), 100).unwrap();
        set_offline(&mut engine, ServerId(3));

        // percentages 100 and 0, mean 50, population variance 2500
        assert_relative_eq!(2500.0, engine.load_variance_percent());
    }

    #[test]
    fn test_weighted_keeps_variance_near_zero_as_load_grows() {
        let mut engine = engine_with(&[50, 100, 150]);
        engine.set_algorithm(Algorithm::WeightedOptimization);
        let mut previous = engine.load_variance_percent();
        for _ in 0..3 {
            engine.add_system_load(60);
            let variance = engine.load_variance_percent();
            assert!(variance <= previous + 1.0);
            assert!(variance < 5.0);
            previous = variance;
        }
    }

    #[test]
    fn test_system_utilization() {
        let mut engine = engine_with(&[100, 100]);
        engine.add_system_load(50);
        assert_relative_eq!(0.25, engine.system_utilization());

        let empty = DistributionEngine::new();
        assert_relative_eq!(0.0, empty.system_utilization());
    }

    #[test]
    fn test_health_events_update_the_pool_record() {
        let mut engine = engine_with(&[100]);
        engine.apply_health_event(HealthEvent {
            server_id: ServerId(1),
            state: HealthState::Offline,
            performance_multiplier: 0.0,
        });

        let server = engine.pool().get(ServerId(1)).unwrap();
        assert!(!server.is_online());
        assert_eq!(HealthState::Offline, server.status());
        assert_relative_eq!(0.0, server.performance_multiplier());

        engine.apply_health_event(HealthEvent {
            server_id: ServerId(1),
            state: HealthState::Healthy,
            performance_multiplier: 1.0,
        });
        let server = engine.pool().get(ServerId(1)).unwrap();
        assert!(server.is_online());
        assert_eq!(HealthState::Healthy, server.status());
    }
}
