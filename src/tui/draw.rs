use crate::health::state::HealthState;
use crate::tui::app::App;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::Color::White;
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Padding, Paragraph, Row, Table};

const BAR_WIDTH: usize = 24;

pub fn draw_app(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(build_header(app), chunks[0]);
    frame.render_widget(build_server_table(app), chunks[1]);
    frame.render_widget(build_stats(app), chunks[2]);
    frame.render_widget(build_help(), chunks[3]);
}

fn util_style(percentage: f64) -> Style {
    if percentage < 50.0 {
        Style::default().fg(Color::Green)
    } else if percentage < 80.0 {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Red)
    }
}

fn status_style(status: HealthState) -> Style {
    match status {
        HealthState::Healthy => Style::default().fg(Color::Green),
        HealthState::Degraded => Style::default().yellow(),
        HealthState::Critical => Style::default().light_red(),
        HealthState::Offline => Style::default().red().bold(),
    }
}

fn load_bar(percentage: f64) -> String {
    let filled = ((percentage / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "#".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}

fn build_header(app: &'_ App) -> Block<'_> {
    Block::new()
        .title(Line::from(vec![
            Span::raw(" Loadsim ").style(Style::default().bold().cyan()),
            Span::raw("—").style(Style::default().add_modifier(Modifier::DIM)),
            Span::raw(" Algorithm: ").style(Style::default().add_modifier(Modifier::DIM)),
            Span::raw(app.engine.algorithm().name()).style(Style::default().bold()),
            Span::raw("  Load/key: ").style(Style::default().add_modifier(Modifier::DIM)),
            Span::raw(format!("{}", app.engine.random_load_amount()))
                .style(Style::default().bold()),
            Span::raw(" "),
        ]))
        .title_alignment(Alignment::Center)
}

fn build_server_table(app: &'_ App) -> Table<'_> {
    Table::new(
        app.engine.servers().iter().map(|server| {
            let percentage = server.load_percentage();
            let health = app.simulator.health_score_of(server.id()).unwrap_or(1.0);
            Row::new(vec![
                Cell::from(format!("{:>3}", server.id())),
                Cell::from(server.status().label()).style(status_style(server.status())),
                Cell::from(format!("[{}]", load_bar(percentage))).style(util_style(percentage)),
                Cell::from(format!("{:>5.1}%", percentage)).style(util_style(percentage)),
                Cell::from(format!("{:>5}", server.current_load())),
                Cell::from(format!("{:>5}", server.capacity())),
                Cell::from(format!("{:>5.2}", server.performance_multiplier())),
                Cell::from(format!("{:>5.2}", health)),
            ])
        }),
        [
            Constraint::Length(4),
            Constraint::Length(9),
            Constraint::Length((BAR_WIDTH + 2) as u16),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(7),
        ],
    )
    .header(
        Row::new([
            Cell::from(" ID"),
            Cell::from("Status"),
            Cell::from("Load"),
            Cell::from("  Util"),
            Cell::from(" Load"),
            Cell::from("  Cap"),
            Cell::from(" Perf"),
            Cell::from("Health"),
        ])
        .style(Style::default().bg(Color::DarkGray).fg(White)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(Line::from(vec![
                Span::from(" Servers ").style(Style::default().bold()),
            ]))
            .padding(Padding::horizontal(1)),
    )
}

fn build_stats(app: &'_ App) -> Paragraph<'_> {
    let engine = &app.engine;
    let pool = engine.pool();
    let dropped_line = match app.last_placement() {
        Some(p) if p.dropped > 0 => {
            format!("Last operation: {} of {} units dropped", p.dropped, p.requested)
        }
        Some(p) => format!("Last operation: {} units placed", p.placed),
        None => String::new(),
    };

    let lines = vec![
        Line::from(format!(
            "System load: {}/{} ({:.1}%)",
            pool.total_load(),
            pool.total_online_capacity(),
            engine.system_utilization() * 100.0
        )),
        Line::from(format!(
            "Load variance: {:.2}   Online: {}/{}",
            engine.load_variance_percent(),
            pool.online_count(),
            pool.len()
        )),
        Line::from(format!("Metrics samples: {}", app.monitor.sample_count())),
        Line::from(dropped_line),
    ];

    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Line::from(vec![
                Span::from(" System ").style(Style::default().bold()),
            ]))
            .padding(Padding::horizontal(1)),
    )
}

fn build_help() -> Paragraph<'static> {
    Paragraph::new(Line::from(
        " a load  s add  d remove  r rebalance  m algorithm  f fail  p partition  l overload  1-9 target  +/- amount  q quit ",
    ))
    .style(Style::default().add_modifier(Modifier::DIM))
}
