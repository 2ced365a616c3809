use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::warn;

struct MetricsSnapshot {
    timestamp: f64,
    avg_load: f64,
    load_variance: f64,
    response_time_ms: f64,
    server_count: usize,
    algorithm: String,
}

/// Read-only consumer of distribution results: keeps metrics snapshots,
/// appends them to an optional CSV log, and renders the aggregate report.
pub struct LoadMonitor {
    log: Option<BufWriter<File>>,
    start: Instant,
    algorithm: String,
    metrics: Vec<MetricsSnapshot>,
}

impl LoadMonitor {
    pub fn new() -> Self {
        Self {
            log: None,
            start: Instant::now(),
            algorithm: String::new(),
            metrics: Vec::new(),
        }
    }

    pub fn with_log_file(path: &Path) -> io::Result<Self> {
        let mut log = BufWriter::new(File::create(path)?);
        writeln!(
            log,
            "elapsed_seconds,algorithm,server_count,avg_load,load_variance,response_ms"
        )?;
        let mut monitor = Self::new();
        monitor.log = Some(log);
        Ok(monitor)
    }

    pub fn set_algorithm(&mut self, algorithm: &str) {
        self.algorithm = algorithm.to_string();
        let elapsed = self.elapsed_seconds();
        self.log_line(&format!("{elapsed:.3},algorithm changed to {algorithm}"));
    }

    pub fn record_metrics(&mut self, server_loads: &[u32], response_time_ms: f64) {
        let snapshot = MetricsSnapshot {
            timestamp: self.elapsed_seconds(),
            avg_load: Self::average_load(server_loads),
            load_variance: Self::load_variance(server_loads),
            response_time_ms,
            server_count: server_loads.len(),
            algorithm: self.algorithm.clone(),
        };
        self.log_line(&format!(
            "{:.3},{},{},{:.2},{:.2},{:.3}",
            snapshot.timestamp,
            snapshot.algorithm,
            snapshot.server_count,
            snapshot.avg_load,
            snapshot.load_variance,
            snapshot.response_time_ms
        ));
        self.metrics.push(snapshot);
    }

    pub fn log_server_addition(&mut self) {
        let elapsed = self.elapsed_seconds();
        self.log_line(&format!("{elapsed:.3},server added"));
    }

    pub fn log_server_removal(&mut self) {
        let elapsed = self.elapsed_seconds();
        self.log_line(&format!("{elapsed:.3},server removed"));
    }

    pub fn log_rebalancing(&mut self) {
        let elapsed = self.elapsed_seconds();
        self.log_line(&format!("{elapsed:.3},load rebalanced"));
    }

    fn log_line(&mut self, line: &str) {
        if let Some(log) = &mut self.log {
            if writeln!(log, "{line}").and_then(|_| log.flush()).is_err() {
                warn!("failed to append to metrics log");
            }
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn sample_count(&self) -> usize {
        self.metrics.len()
    }

    pub fn average_load(server_loads: &[u32]) -> f64 {
        if server_loads.is_empty() {
            return 0.0;
        }
        server_loads.iter().map(|&l| l as f64).sum::<f64>() / server_loads.len() as f64
    }

    /// Population variance of the raw per-server loads.
    pub fn load_variance(server_loads: &[u32]) -> f64 {
        if server_loads.is_empty() {
            return 0.0;
        }
        let avg = Self::average_load(server_loads);
        server_loads
            .iter()
            .map(|&l| (l as f64 - avg) * (l as f64 - avg))
            .sum::<f64>()
            / server_loads.len() as f64
    }

    /// Aggregate text report: snapshots grouped by algorithm with sample
    /// count, average variance, and average response time.
    pub fn generate_report(&self, path: &Path) -> io::Result<()> {
        let mut report = BufWriter::new(File::create(path)?);

        writeln!(report, "=== LOAD BALANCER PERFORMANCE REPORT ===")?;
        writeln!(report, "Total runtime: {:.1} seconds", self.elapsed_seconds())?;
        writeln!(report, "Current algorithm: {}", self.algorithm)?;
        writeln!(report, "Number of metrics recorded: {}", self.metrics.len())?;
        writeln!(report)?;
        writeln!(report, "PERFORMANCE BY ALGORITHM:")?;
        writeln!(report, "--------------------------")?;

        let mut by_algorithm: BTreeMap<&str, Vec<&MetricsSnapshot>> = BTreeMap::new();
        for snapshot in &self.metrics {
            by_algorithm
                .entry(snapshot.algorithm.as_str())
                .or_default()
                .push(snapshot);
        }

        for (algorithm, snapshots) in &by_algorithm {
            let count = snapshots.len() as f64;
            let avg_variance =
                snapshots.iter().map(|s| s.load_variance).sum::<f64>() / count;
            let avg_response =
                snapshots.iter().map(|s| s.response_time_ms).sum::<f64>() / count;

            writeln!(report, "Algorithm: {algorithm}")?;
            writeln!(report, "  Samples: {}", snapshots.len())?;
            writeln!(report, "  Avg Load Variance: {avg_variance:.2}")?;
            writeln!(report, "  Avg Response Time: {avg_response:.3} ms")?;
            writeln!(report)?;
        }

        writeln!(report, "=== END OF REPORT ===")?;
        report.flush()
    }
}

impl Default for LoadMonitor {
    fn default() -> Self {
        Self::new()
    }
}
