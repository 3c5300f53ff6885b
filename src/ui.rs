use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use fin_insight::kpi::DASHBOARD_KPI_LIMIT;
use fin_insight::{
    benchmark_view, dashboard_view, db, kpi_view, metric_cards, BenchmarkComparison,
    CompanyContext, KpiProgress, MetricCard, SnapshotCache, Status, UploadRecord, UploadStatus,
};
use fin_insight::views::ChangeType;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Benchmarks,
    Kpis,
    Uploads,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Dashboard => Page::Benchmarks,
            Page::Benchmarks => Page::Kpis,
            Page::Kpis => Page::Uploads,
            Page::Uploads => Page::Dashboard,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Dashboard => Page::Uploads,
            Page::Benchmarks => Page::Dashboard,
            Page::Kpis => Page::Benchmarks,
            Page::Uploads => Page::Kpis,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Benchmarks => "Benchmarks",
            Page::Kpis => "KPIs",
            Page::Uploads => "Uploads",
        }
    }
}

pub struct App {
    pub ctx: CompanyContext,
    pub cards: Vec<MetricCard>,
    pub comparisons: Vec<BenchmarkComparison>,
    pub kpis: Vec<KpiProgress>,
    pub uploads: Vec<UploadRecord>,
    pub current_page: Page,
    pub state: TableState,
    pub show_detail: bool,
}

impl App {
    /// Every page reads from one cache, so the store is hit once per window
    pub fn load(conn: &Connection, ctx: CompanyContext) -> Result<Self> {
        let cache = SnapshotCache::new();

        let cards = dashboard_view(conn, &cache, &ctx)?
            .map(|metrics| metric_cards(&metrics))
            .unwrap_or_default();
        let comparisons = benchmark_view(conn, &cache, &ctx)?;
        let kpis = kpi_view(conn, &cache, &ctx, None)?;
        let uploads = db::list_uploads(conn, ctx.company_id)?;

        Ok(Self::new(ctx, cards, comparisons, kpis, uploads))
    }

    pub fn new(
        ctx: CompanyContext,
        cards: Vec<MetricCard>,
        comparisons: Vec<BenchmarkComparison>,
        kpis: Vec<KpiProgress>,
        uploads: Vec<UploadRecord>,
    ) -> Self {
        Self {
            ctx,
            cards,
            comparisons,
            kpis,
            uploads,
            current_page: Page::Dashboard,
            state: TableState::default(),
            show_detail: false,
        }
    }

    /// Rows of the current page's table
    fn row_count(&self) -> usize {
        match self.current_page {
            Page::Dashboard => 0,
            Page::Benchmarks => self.comparisons.len(),
            Page::Kpis => self.kpis.len(),
            Page::Uploads => self.uploads.len(),
        }
    }

    fn reset_selection(&mut self) {
        self.show_detail = false;
        self.state.select(if self.row_count() > 0 { Some(0) } else { None });
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.reset_selection();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
        self.reset_selection();
    }

    pub fn toggle_detail(&mut self) {
        if matches!(self.current_page, Page::Kpis | Page::Uploads) {
            self.show_detail = !self.show_detail;
        }
    }

    pub fn next(&mut self) {
        let len = self.row_count();
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
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn selected_kpi(&self) -> Option<&KpiProgress> {
        self.state.selected().and_then(|i| self.kpis.get(i))
    }

    pub fn selected_upload(&self) -> Option<&UploadRecord> {
        self.state.selected().and_then(|i| self.uploads.get(i))
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_page(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_page(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_page(f: &mut Frame, area: Rect, app: &mut App) {
    match app.current_page {
        Page::Dashboard => render_dashboard(f, area, app),
        Page::Benchmarks => render_benchmarks(f, area, app),
        Page::Kpis => render_kpis(f, area, app),
        Page::Uploads => render_uploads(f, area, app),
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::Dashboard, Page::Benchmarks, Page::Kpis, Page::Uploads];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        app.ctx.company_name.clone(),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn change_color(change_type: ChangeType) -> Color {
    match change_type {
        ChangeType::Positive => Color::Green,
        ChangeType::Negative => Color::Red,
        ChangeType::Neutral => Color::DarkGray,
    }
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Above => Color::Green,
        Status::Below => Color::Red,
        Status::Equal => Color::Yellow,
    }
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });

    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_dashboard(f: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)])
        .split(area);

    if app.cards.is_empty() {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from("  No income statement yet."),
            Line::from("  Run: fin-insight import <file.csv>"),
        ])
        .block(Block::default().borders(Borders::ALL).title(" Overview "));
        f.render_widget(empty, area);
        return;
    }

    let card_areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25); 4])
        .split(rows[0]);

    for (card, card_area) in app.cards.iter().zip(card_areas.iter()) {
        let content = vec![
            Line::from(Span::styled(
                card.value.clone(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("{} vs last period", card.change),
                Style::default().fg(change_color(card.change_type)),
            )),
        ];

        let widget = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", card.title)),
        );
        f.render_widget(widget, *card_area);
    }

    // Top KPIs as progress bars
    let kpis: Vec<&KpiProgress> = app.kpis.iter().take(DASHBOARD_KPI_LIMIT).collect();
    let kpi_block = Block::default().borders(Borders::ALL).title(" KPI Progress ");

    if kpis.is_empty() {
        f.render_widget(Paragraph::new("  No KPIs defined").block(kpi_block), rows[1]);
        return;
    }

    let inner = kpi_block.inner(rows[1]);
    f.render_widget(kpi_block, rows[1]);

    let gauge_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(3); kpis.len()])
        .split(inner);

    for (kpi, gauge_area) in kpis.iter().zip(gauge_areas.iter()) {
        let gauge = Gauge::default()
            .block(Block::default().title(format!(
                "{}  {} / {}",
                kpi.label, kpi.display_value, kpi.display_target
            )))
            .gauge_style(Style::default().fg(status_color(kpi.status)))
            .percent(kpi.bar_percent());
        f.render_widget(gauge, *gauge_area);
    }
}

fn render_benchmarks(f: &mut Frame, area: Rect, app: &mut App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(format!(" Benchmarks - sector #{} ", app.ctx.sector_id));

    if app.comparisons.is_empty() {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from("  Upload both an income statement and a balance sheet to compare."),
        ])
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    let rows = app.comparisons.iter().map(|row| {
        let color = status_color(row.status);
        Row::new(vec![
            Cell::from(row.label.clone()),
            Cell::from(row.your_value.clone()),
            Cell::from(row.industry_average.clone()),
            Cell::from(row.difference.clone()).style(Style::default().fg(color)),
            Cell::from(row.status.as_str()).style(Style::default().fg(color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(8),
        ],
    )
    .header(header_row(&["Metric", "You", "Industry", "Difference", "Status"]))
    .block(block)
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_kpis(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.kpis.iter().map(|kpi| {
        Row::new(vec![
            Cell::from(format!("#{}", kpi.kpi.kpi_id)),
            Cell::from(kpi.label.clone()),
            Cell::from(kpi.display_value.clone()),
            Cell::from(kpi.display_target.clone()),
            Cell::from(format!("{:.1}%", kpi.progress)).style(Style::default().fg(status_color(kpi.status))),
            Cell::from(kpi.kpi.target_date.to_string()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(34),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["ID", "Metric", "Current", "Target", "Progress", "Due"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" KPIs "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_uploads(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.uploads.iter().map(|upload| {
        let color = match upload.status {
            UploadStatus::Processed => Color::Green,
            UploadStatus::Processing => Color::Yellow,
            UploadStatus::Error => Color::Red,
        };

        Row::new(vec![
            Cell::from(upload.uploaded_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::from(truncate(&upload.filename, 30)),
            Cell::from(upload.status.as_str()).style(Style::default().fg(color)),
            Cell::from(upload.statement_kind.clone().unwrap_or_else(|| "-".to_string())),
            Cell::from(upload.row_count.to_string()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(18),
            Constraint::Length(32),
            Constraint::Length(12),
            Constraint::Length(18),
            Constraint::Length(6),
        ],
    )
    .header(header_row(&["Uploaded", "File", "Status", "Kind", "Rows"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Upload History "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn detail_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Details ");

    let content = match app.current_page {
        Page::Kpis => app.selected_kpi().map(|kpi| {
            vec![
                Line::from(""),
                detail_line("Metric", kpi.label.clone()),
                detail_line("Current", kpi.display_value.clone()),
                detail_line("Target", kpi.display_target.clone()),
                detail_line("Due", kpi.kpi.target_date.to_string()),
                detail_line("Status", kpi.status.as_str().to_string()),
                Line::from(""),
                detail_line("Description", kpi.kpi.description.clone()),
            ]
        }),
        Page::Uploads => app.selected_upload().map(|upload| {
            vec![
                Line::from(""),
                detail_line("File", upload.filename.clone()),
                detail_line("Status", upload.status.as_str().to_string()),
                detail_line("Rows", upload.row_count.to_string()),
                detail_line("SHA-256", truncate(&upload.content_hash, 16)),
                Line::from(""),
                detail_line("Error", upload.error_message.clone().unwrap_or_else(|| "-".to_string())),
            ]
        }),
        _ => None,
    };

    let widget = match content {
        Some(lines) => Paragraph::new(lines).block(block),
        None => Paragraph::new("Nothing selected").block(block),
    };

    f.render_widget(widget, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let status_spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, app.row_count()),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_app() -> App {
        let ctx = CompanyContext {
            client_id: 1,
            company_id: 1,
            company_name: "Acme".to_string(),
            sector_id: 1,
        };
        App::new(ctx, Vec::new(), Vec::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn test_page_cycle() {
        let mut app = empty_app();
        for _ in 0..4 {
            app.next_page();
        }
        assert_eq!(app.current_page, Page::Dashboard);
        app.previous_page();
        assert_eq!(app.current_page, Page::Uploads);
    }

    #[test]
    fn test_navigation_on_empty_page() {
        let mut app = empty_app();
        app.next_page();
        app.next();
        app.previous();
        assert_eq!(app.state.selected(), None);
        app.toggle_detail();
        assert!(!app.show_detail);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ingresos_año_fiscal.csv", 10), "ingreso...");
    }
}
