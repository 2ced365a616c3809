use crate::engine::engine::{DistributionEngine, Placement};
use crate::health::simulator::HealthSimulator;
use crate::monitor::monitor::LoadMonitor;
use crate::pattern::pattern::LoadPattern;
use crate::pool::server::ServerId;
use crossterm::event::KeyCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::warn;

pub struct App {
    pub engine: DistributionEngine,
    pub simulator: HealthSimulator,
    pub monitor: LoadMonitor,
    pattern: Option<LoadPattern>,
    /// driver-side randomness: interactive capacities and failure targets
    rng: StdRng,
    pub running: bool,
    last_placement: Option<Placement>,
}

impl App {
    pub fn new(
        engine: DistributionEngine,
        simulator: HealthSimulator,
        monitor: LoadMonitor,
        pattern: Option<LoadPattern>,
        seed: u64,
    ) -> Self {
        Self {
            engine,
            simulator,
            monitor,
            pattern,
            rng: StdRng::seed_from_u64(seed),
            running: true,
            last_placement: None,
        }
    }

    pub fn last_placement(&self) -> Option<Placement> {
        self.last_placement
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') => self.running = false,
            KeyCode::Char('a') => {
                let started = Instant::now();
                let placement = self.engine.add_random_load();
                self.last_placement = Some(placement);
                self.record(started);
            }
            KeyCode::Char('s') => {
                let capacity = self.rng.gen_range(50..=200);
                let id = self.engine.add_server(capacity);
                self.simulator.register(id);
                self.monitor.log_server_addition();
            }
            KeyCode::Char('d') => self.remove_newest_server(),
            KeyCode::Char('r') => {
                let started = Instant::now();
                let placement = self.engine.rebalance();
                self.last_placement = Some(placement);
                self.monitor.log_rebalancing();
                self.record(started);
            }
            KeyCode::Char('m') => {
                let algorithm = self.engine.algorithm().next();
                self.engine.set_algorithm(algorithm);
                self.monitor.set_algorithm(algorithm.name());
            }
            KeyCode::Char('f') => {
                if let Some(event) = self.simulator.random_failure() {
                    self.engine.apply_health_event(event);
                }
            }
            KeyCode::Char('p') => self.partition_back_half(),
            KeyCode::Char('l') => self.overload_random_server(),
            KeyCode::Char('+') => {
                let amount = self.engine.random_load_amount() + 5;
                self.engine.set_random_load_amount(amount);
            }
            KeyCode::Char('-') => {
                let amount = self.engine.random_load_amount();
                if amount > 5 {
                    self.engine.set_random_load_amount(amount - 5);
                }
            }
            KeyCode::Char(c @ '1'..='9') => {
                let id = ServerId(c.to_digit(10).unwrap_or(0));
                let amount = self.engine.random_load_amount();
                let started = Instant::now();
                match self.engine.add_load_to_server(id, amount) {
                    Ok(placement) => {
                        self.last_placement = Some(placement);
                        self.record(started);
                    }
                    Err(error) => warn!(%error, "ignoring per-server load request"),
                }
            }
            _ => {}
        }
    }

    /// Health tick plus, when a pattern is configured, one generated load.
    pub fn on_tick(&mut self) {
        for event in self.simulator.tick() {
            self.engine.apply_health_event(event);
        }
        if let Some(pattern) = &mut self.pattern {
            let amount = pattern.next_load();
            if amount > 0 {
                self.inject(amount);
            }
        }
    }

    fn inject(&mut self, amount: u32) {
        let started = Instant::now();
        let placement = self.engine.add_system_load(amount);
        self.last_placement = Some(placement);
        self.record(started);
    }

    fn record(&mut self, started: Instant) {
        let response_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.monitor
            .record_metrics(&self.engine.pool().current_loads(), response_ms);
    }

    fn remove_newest_server(&mut self) {
        let Some(id) = self
            .engine
            .servers()
            .iter()
            .map(|s| s.id())
            .max_by_key(|id| id.0)
        else {
            warn!("no servers to remove");
            return;
        };
        if let Ok(placement) = self.engine.remove_server(id) {
            self.last_placement = Some(placement);
            self.simulator.unregister(id);
            self.monitor.log_server_removal();
        }
    }

    fn partition_back_half(&mut self) {
        let ids: Vec<ServerId> = self.engine.servers().iter().map(|s| s.id()).collect();
        if ids.len() < 2 {
            return;
        }
        let affected = &ids[ids.len() / 2..];
        for event in self.simulator.network_partition(affected) {
            self.engine.apply_health_event(event);
        }
    }

    fn overload_random_server(&mut self) {
        let servers = self.engine.servers();
        if servers.is_empty() {
            return;
        }
        let id = servers[self.rng.gen_range(0..servers.len())].id();
        if let Some(event) = self.simulator.high_load(id) {
            self.engine.apply_health_event(event);
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        ratatui::restore();
    }
}
