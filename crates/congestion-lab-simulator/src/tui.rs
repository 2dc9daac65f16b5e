use std::{
    collections::VecDeque,
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::service::SimulationService;
use crate::traffic::TrafficAnimator;
use congestion_lab_abstract::{ClockState, LinkStatus, SimConfig, Snapshot};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use parking_lot::Mutex;
use ratatui::{
    prelude::*,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph},
};
use tracing::warn;

const LOG_LIMIT: usize = 1000;
const TRAFFIC_LANES: usize = 3;

/// A tracing writer that keeps the most recent lines for display inside the TUI
#[derive(Clone, Default)]
pub struct MemoryLogBuffer {
    logs: Arc<Mutex<VecDeque<String>>>,
}

impl MemoryLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: String) {
        let mut logs = self.logs.lock();
        logs.push_back(msg);
        while logs.len() > LOG_LIMIT {
            logs.pop_front();
        }
    }

    /// The newest `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let logs = self.logs.lock();
        logs.iter()
            .skip(logs.len().saturating_sub(n))
            .cloned()
            .collect()
    }
}

impl io::Write for MemoryLogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        for line in s.lines().filter(|l| !l.trim().is_empty()) {
            self.push(line.trim_end().to_string());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct TuiApp {
    service: SimulationService,
    logs: Option<MemoryLogBuffer>,
    traffic: TrafficAnimator,
}

impl TuiApp {
    pub fn new(service: SimulationService, logs: Option<MemoryLogBuffer>) -> Self {
        Self {
            service,
            logs,
            traffic: TrafficAnimator::new(TRAFFIC_LANES, 64, 0x5eed),
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let frame_rate = Duration::from_millis(100);
        let mut last_frame = Instant::now();

        loop {
            let snapshot = self.service.snapshot();
            terminal.draw(|f| self.ui(f, &snapshot))?;

            let timeout = frame_rate
                .checked_sub(last_frame.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            if crossterm::event::poll(timeout)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
                && !self.handle_key(key.code, &snapshot)
            {
                break;
            }

            if last_frame.elapsed() >= frame_rate {
                self.traffic.advance(snapshot.status);
                last_frame = Instant::now();
            }
        }

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    pub fn into_service(self) -> SimulationService {
        self.service
    }

    /// Returns false when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode, snapshot: &Snapshot) -> bool {
        let cfg = snapshot.config;
        match code {
            KeyCode::Char('q') => return false,
            KeyCode::Char(' ') => {
                if snapshot.clock == ClockState::Running {
                    self.service.pause();
                } else {
                    self.service.start();
                }
            }
            KeyCode::Char('s') => {
                if let Err(err) = self.service.step() {
                    warn!("Step failed: {}", err);
                }
            }
            KeyCode::Char('r') => {
                self.service.reset();
                self.traffic.clear();
            }
            KeyCode::Char('p') => self.reconfigure(SimConfig {
                protocol: cfg.protocol.toggled(),
                ..cfg
            }),
            KeyCode::Char('+') | KeyCode::Char('=') => self.adjust_rate(cfg, 1),
            KeyCode::Char('-') => self.adjust_rate(cfg, -1),
            KeyCode::Up => self.adjust_rate(cfg, 10),
            KeyCode::Down => self.adjust_rate(cfg, -10),
            KeyCode::Char(']') => self.adjust_capacity(cfg, 1),
            KeyCode::Char('[') => self.adjust_capacity(cfg, -1),
            KeyCode::PageUp => self.adjust_capacity(cfg, 10),
            KeyCode::PageDown => self.adjust_capacity(cfg, -10),
            _ => {}
        }
        true
    }

    fn adjust_rate(&self, cfg: SimConfig, delta: i64) {
        self.reconfigure(SimConfig {
            packet_rate: offset(cfg.packet_rate, delta),
            ..cfg
        });
    }

    fn adjust_capacity(&self, cfg: SimConfig, delta: i64) {
        self.reconfigure(SimConfig {
            network_capacity: offset(cfg.network_capacity, delta),
            ..cfg
        });
    }

    fn reconfigure(&self, cfg: SimConfig) {
        if let Err(err) = self.service.configure(cfg) {
            warn!("Configuration rejected: {}", err);
        }
    }

    fn ui(&self, f: &mut Frame, snapshot: &Snapshot) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Control bar
                Constraint::Min(12), // Dashboard + chart
                Constraint::Length(TRAFFIC_LANES as u16 + 2), // Traffic
                Constraint::Length(8), // Logs
            ])
            .split(f.area());

        self.render_control(f, rows[0], snapshot);

        let mid_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(rows[1]);
        self.render_dashboard(f, mid_chunks[0], snapshot);
        self.render_throughput_chart(f, mid_chunks[1], snapshot);

        self.render_traffic(f, rows[2], snapshot.status);
        self.render_logs(f, rows[3]);
    }

    fn render_control(&self, f: &mut Frame, area: Rect, snapshot: &Snapshot) {
        let status_text = format!(
            "Protocol: {} | Tick: {} | Clock: {} | (q)uit (space)start/pause (s)tep (r)eset (p)rotocol",
            snapshot.config.protocol, snapshot.ticks, snapshot.clock
        );
        let status_block = Paragraph::new(status_text)
            .block(Block::default().borders(Borders::ALL).title("Control"));
        f.render_widget(status_block, area);
    }

    fn render_dashboard(&self, f: &mut Frame, area: Rect, snapshot: &Snapshot) {
        let window = snapshot
            .window_size
            .map(|w| w.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let status_style = Style::default()
            .fg(status_color(snapshot.status))
            .add_modifier(Modifier::BOLD);

        let stats_text = vec![
            Line::from("Link:"),
            Line::from(format!(
                "  Packet rate:   {} pkt/interval",
                snapshot.config.packet_rate
            )),
            Line::from(format!(
                "  Capacity:      {} pkt/interval",
                snapshot.config.network_capacity
            )),
            Line::from(vec![
                Span::raw(format!("  Utilization:   {:.1}% ", snapshot.utilization)),
                Span::styled(snapshot.status.to_string(), status_style),
            ]),
            Line::from(""),
            Line::from("Totals:"),
            Line::from(format!("  Sent:          {}", snapshot.sent_total)),
            Line::from(format!("  Delivered:     {}", snapshot.delivered_total)),
            Line::from(format!(
                "  Dropped:       {} ({:.1}%)",
                snapshot.dropped_total,
                snapshot.loss_ratio() * 100.0
            )),
            Line::from(format!("  Window:        {}", window)),
            Line::from(""),
            Line::from("  +/-  Up/Down: rate    ]/[  PgUp/PgDn: capacity"),
        ];

        let stats_block = Paragraph::new(stats_text)
            .block(Block::default().borders(Borders::ALL).title("Dashboard"));
        f.render_widget(stats_block, area);
    }

    fn render_throughput_chart(&self, f: &mut Frame, area: Rect, snapshot: &Snapshot) {
        if snapshot.samples.is_empty() {
            let block = Paragraph::new("No samples yet")
                .block(Block::default().borders(Borders::ALL).title("Throughput / Loss"));
            f.render_widget(block, area);
            return;
        }

        let to_secs = |ms: u64| ms as f64 / 1000.0;
        let throughput: Vec<(f64, f64)> = snapshot
            .samples
            .iter()
            .map(|s| (to_secs(s.timestamp_ms), s.throughput as f64))
            .collect();
        let loss: Vec<(f64, f64)> = snapshot
            .samples
            .iter()
            .map(|s| (to_secs(s.timestamp_ms), s.loss as f64))
            .collect();

        let x_min = throughput.first().map(|p| p.0).unwrap_or(0.0);
        let mut x_max = throughput.last().map(|p| p.0).unwrap_or(1.0);
        if (x_max - x_min).abs() < f64::EPSILON {
            x_max += 1.0;
        }
        let y_max = throughput
            .iter()
            .chain(loss.iter())
            .map(|p| p.1)
            .fold(1.0, f64::max);

        let datasets = vec![
            Dataset::default()
                .name("throughput")
                .marker(symbols::Marker::Dot)
                .style(Style::default().fg(Color::Cyan))
                .graph_type(GraphType::Line)
                .data(&throughput),
            Dataset::default()
                .name("loss")
                .marker(symbols::Marker::Braille)
                .style(Style::default().fg(Color::Red))
                .graph_type(GraphType::Line)
                .data(&loss),
        ];

        let x_labels = vec![
            Span::raw(format!("{:.0}s", x_min)),
            Span::raw(""),
            Span::raw(format!("{:.0}s", x_max)),
        ];
        let y_labels = vec![
            Span::raw("0"),
            Span::raw(""),
            Span::raw(format!("{:.0}", y_max)),
        ];

        let chart = Chart::new(datasets)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Throughput / Loss"),
            )
            .x_axis(
                Axis::default()
                    .title("time")
                    .bounds([x_min, x_max])
                    .labels(x_labels),
            )
            .y_axis(
                Axis::default()
                    .title("packets")
                    .bounds([0.0, y_max])
                    .labels(y_labels),
            );

        f.render_widget(chart, area);
    }

    fn render_traffic(&self, f: &mut Frame, area: Rect, status: LinkStatus) {
        let style = Style::default().fg(status_color(status));
        let lines: Vec<Line> = self
            .traffic
            .render()
            .into_iter()
            .map(|row| Line::from(Span::styled(row, style)))
            .collect();
        let block = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Traffic"));
        f.render_widget(block, area);
    }

    fn render_logs(&self, f: &mut Frame, area: Rect) {
        let visible = (area.height as usize).saturating_sub(2);
        let lines = self
            .logs
            .as_ref()
            .map(|buf| buf.tail(visible))
            .unwrap_or_default();

        let items: Vec<ListItem> = lines
            .into_iter()
            .map(|line| {
                let style = if line.contains("WARN") || line.contains("ERROR") {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default().fg(Color::White)
                };
                ListItem::new(Line::from(Span::styled(line, style)))
            })
            .collect();

        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Log"));
        f.render_widget(list, area);
    }
}

fn status_color(status: LinkStatus) -> Color {
    match status {
        LinkStatus::Normal => Color::Green,
        LinkStatus::Warning => Color::Yellow,
        LinkStatus::Congested => Color::Red,
    }
}

fn offset(value: u32, delta: i64) -> u32 {
    let next = (i64::from(value) + delta).clamp(1, i64::from(u32::MAX));
    u32::try_from(next).unwrap_or(1)
}
