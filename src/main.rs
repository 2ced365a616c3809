use crate::engine::algorithm::Algorithm;
use crate::engine::engine::DistributionEngine;
use crate::health::simulator::HealthSimulator;
use crate::monitor::monitor::LoadMonitor;
use crate::pattern::pattern::{LoadPattern, PatternKind};
use crate::tui::app::App;
use crate::tui::draw::draw_app;
use clap::Parser;
use crossterm::event::{Event, KeyEventKind};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

mod engine;
mod health;
mod monitor;
mod pattern;
mod pool;
mod tui;

#[derive(Parser)]
#[command(name = "loadsim", about = "Interactive load distribution simulator")]
struct Args {
    /// seed for the health and pattern random sources
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// number of servers at startup
    #[arg(long, default_value_t = 3)]
    servers: u32,

    /// nominal capacity of the initial servers
    #[arg(long, default_value_t = 100)]
    capacity: u32,

    /// load units injected per keypress
    #[arg(long, default_value_t = 10)]
    load_amount: u32,

    /// balancing algorithm at startup
    #[arg(long, value_enum, default_value = "round-robin")]
    algorithm: Algorithm,

    /// drive load injection from a synthetic pattern instead of keypresses only
    #[arg(long, value_enum)]
    pattern: Option<PatternKind>,

    /// append CSV metrics to this file
    #[arg(long)]
    metrics_log: Option<PathBuf>,

    /// write the performance report here on exit
    #[arg(long)]
    report: Option<PathBuf>,

    /// append tracing diagnostics to this file
    #[arg(long)]
    debug_log: Option<PathBuf>,

    /// milliseconds between simulator ticks
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.debug_log {
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    let mut engine = DistributionEngine::new();
    engine.set_random_load_amount(args.load_amount);
    engine.set_algorithm(args.algorithm);
    let mut simulator = HealthSimulator::new(args.seed);
    for _ in 0..args.servers {
        let id = engine.add_server(args.capacity);
        simulator.register(id);
    }

    let mut monitor = match &args.metrics_log {
        Some(path) => LoadMonitor::with_log_file(path)?,
        None => LoadMonitor::new(),
    };
    monitor.set_algorithm(engine.algorithm().name());

    let pattern = args
        .pattern
        .map(|kind| LoadPattern::new(kind, args.seed.wrapping_add(1)));

    let mut terminal = ratatui::init();
    let mut app = App::new(
        engine,
        simulator,
        monitor,
        pattern,
        args.seed.wrapping_add(2),
    );

    let tick = Duration::from_millis(args.tick_ms);
    let mut last_tick = Instant::now();
    while app.running {
        let _ = terminal.draw(|frame| draw_app(frame, &app));

        let timeout = tick.saturating_sub(last_tick.elapsed());
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = crossterm::event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }
        if last_tick.elapsed() >= tick {
            app.on_tick();
            last_tick = Instant::now();
        }
    }

    if let Some(path) = &args.report {
        app.monitor.generate_report(path)?;
    }
    Ok(())
}
