use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use methane_hotspots::{EmitterSummary, HotspotEvidence};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io;

pub struct App {
    pub emitters: Vec<EmitterSummary>,
    pub evidence: HashMap<String, Vec<HotspotEvidence>>,
    pub state: TableState,
    pub show_detail: bool,
    pub using_mock_data: bool,
}

impl App {
    pub fn new(
        emitters: Vec<EmitterSummary>,
        evidence: HashMap<String, Vec<HotspotEvidence>>,
        using_mock_data: bool,
    ) -> Self {
        let mut state = TableState::default();
        if !emitters.is_empty() {
            state.select(Some(0));
        }

        Self {
            emitters,
            evidence,
            state,
            show_detail: false,
            using_mock_data,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_emitter(&self) -> Option<&EmitterSummary> {
        self.state.selected().and_then(|i| self.emitters.get(i))
    }

    pub fn selected_evidence(&self) -> &[HotspotEvidence] {
        self.selected_emitter()
            .and_then(|e| self.evidence.get(&e.id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn next(&mut self) {
        let len = self.emitters.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.emitters.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Number of hotspots across all loaded emitters
    pub fn total_hotspots(&self) -> usize {
        self.evidence.values().map(Vec::len).sum()
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal before surfacing any error
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Home if !app.emitters.is_empty() => app.state.select(Some(0)),
                KeyCode::End if !app.emitters.is_empty() => app.state.select(Some(app.emitters.len() - 1)),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Emitters (+ detail)
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            "Methane Hotspot Map Dashboard",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(format!("Emitters: {}", app.emitters.len()), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled(format!("Hotspots: {}", app.total_hotspots()), Style::default().fg(Color::Red)),
    ];
    if app.using_mock_data {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled("placeholder data", Style::default().fg(Color::DarkGray)));
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn confidence_color(confidence: f64) -> Color {
    if confidence >= 0.8 {
        Color::Red
    } else if confidence >= 0.5 {
        Color::Yellow
    } else {
        Color::White
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Name", "Confidence", "Last Seen", "Detections"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));

    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray)).height(1);

    let rows = app.emitters.iter().map(|e| {
        let color = confidence_color(e.confidence);
        Row::new(vec![
            Cell::from(truncate(&e.name, 34)),
            Cell::from(format!("{:.2}", e.confidence)).style(Style::default().fg(color)),
            Cell::from(e.last_seen.clone()),
            Cell::from(e.detection_count.to_string()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(36),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Persistent Emitters "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let label = Style::default().fg(Color::Cyan);

    let lines = match app.selected_emitter() {
        None => vec![Line::from("No emitter selected")],
        Some(e) => {
            let mut lines = vec![
                Line::from(vec![Span::styled("ID:        ", label), Span::raw(e.id.clone())]),
                Line::from(vec![Span::styled("Name:      ", label), Span::raw(e.name.clone())]),
                Line::from(vec![
                    Span::styled("Location:  ", label),
                    Span::raw(format!("{:.4}, {:.4}", e.latitude, e.longitude)),
                ]),
                Line::from(""),
                Line::from(Span::styled(
                    "Hotspot evidence",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )),
            ];

            let evidence = app.selected_evidence();
            if evidence.is_empty() {
                lines.push(Line::from(Span::styled("  none recorded", Style::default().fg(Color::DarkGray))));
            }
            for h in evidence {
                lines.push(Line::from(format!(
                    "  {}  +{:.1} ppb  {} px  qa {:.2}",
                    h.observed_on, h.anomaly_score, h.pixel_count, h.qa_pass_ratio
                )));
            }
            lines
        }
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Details "),
    );

    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let spans = vec![
        Span::styled(format!(" Row: {}/{} ", selected, app.emitters.len()), Style::default().fg(Color::Cyan)),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
