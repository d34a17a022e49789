use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;
use tracing::warn;

use stock_dashboard::{
    fix_hint, melt, resolve_selection, run, DashboardConfig, Dashboard, HeatmapTable,
    PipelineError, PriceColumn, PriceTable, RangePreset, RowSource, Section, DATE_FORMAT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    RawData,
    PriceChart,
    Heatmap,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::RawData => Page::PriceChart,
            Page::PriceChart => Page::Heatmap,
            Page::Heatmap => Page::RawData,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::RawData => Page::Heatmap,
            Page::PriceChart => Page::RawData,
            Page::Heatmap => Page::PriceChart,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::RawData => "Raw Data",
            Page::PriceChart => "Price Chart",
            Page::Heatmap => "Close Heatmap",
        }
    }
}

pub struct App {
    source: Box<dyn RowSource>,
    pub title: String,
    pub outcome: std::result::Result<Dashboard, PipelineError>,
    pub state: TableState,
    pub current_page: Page,
    pub selected: Vec<PriceColumn>,
    pub range: RangePreset,
    pub message: Option<String>,
}

impl App {
    pub fn new(source: Box<dyn RowSource>, config: &DashboardConfig) -> Result<Self> {
        let requested = config.selection()?;
        let outcome = run(source.as_ref())?;

        let mut app = Self {
            source,
            title: config.title.clone(),
            outcome,
            state: TableState::default(),
            current_page: Page::RawData,
            selected: Vec::new(),
            range: config.range,
            message: None,
        };
        app.selected = app
            .table()
            .map(|t| resolve_selection(t, requested.as_deref()))
            .unwrap_or_default();
        app.reset_selection();
        Ok(app)
    }

    /// Re-run the pipeline against the source. A source error keeps the
    /// previous data on screen and shows the error in the status bar.
    pub fn reload(&mut self) {
        match run(self.source.as_ref()) {
            Ok(outcome) => {
                self.outcome = outcome;
                let requested = self.selected.clone();
                self.selected = self
                    .table()
                    .map(|t| resolve_selection(t, Some(requested.as_slice())))
                    .unwrap_or_default();
                self.reset_selection();
                self.message = Some(format!("Reloaded {}", self.source.describe()));
            }
            Err(err) => {
                warn!(error = %err, "reload failed");
                self.message = Some(format!("Reload failed: {:#}", err));
            }
        }
    }

    pub fn table(&self) -> Option<&PriceTable> {
        self.outcome.as_ref().ok().and_then(|d| d.prices.ready())
    }

    fn row_count(&self) -> usize {
        self.table().map(|t| t.len()).unwrap_or(0)
    }

    fn reset_selection(&mut self) {
        if self.row_count() > 0 {
            self.state.select(Some(0));
        } else {
            self.state.select(None);
        }
    }

    /// Add or remove a series; the last remaining series stays
    pub fn toggle_series(&mut self, column: PriceColumn) {
        let available = match self.table() {
            Some(t) => t.has_column(column),
            None => false,
        };
        if !available {
            self.message = Some(format!("{} is not in the data", column));
            return;
        }

        if let Some(pos) = self.selected.iter().position(|c| *c == column) {
            if self.selected.len() > 1 {
                self.selected.remove(pos);
            }
        } else {
            self.selected.push(column);
            self.selected.sort_by_key(|c| c.index());
        }
        self.message = None;
    }

    pub fn cycle_range(&mut self) {
        self.range = self.range.next();
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => (i + 20).min(len - 1),
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = match self.state.selected() {
            Some(i) => i.saturating_sub(20),
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn last(&mut self) {
        let len = self.row_count();
        if len > 0 {
            self.state.select(Some(len - 1));
        }
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

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('1') => app.toggle_series(PriceColumn::Open),
                KeyCode::Char('2') => app.toggle_series(PriceColumn::High),
                KeyCode::Char('3') => app.toggle_series(PriceColumn::Low),
                KeyCode::Char('4') => app.toggle_series(PriceColumn::Close),
                KeyCode::Char('r') => app.cycle_range(),
                KeyCode::Char('R') => app.reload(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => app.last(),
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

    if let Err(err) = &app.outcome {
        render_message(f, chunks[1], " Error loading or parsing data ", &err.to_string(), Some(fix_hint(err)));
    } else {
        match app.current_page {
            Page::RawData => render_table(f, chunks[1], app),
            Page::PriceChart => render_chart(f, chunks[1], app),
            Page::Heatmap => render_heatmap(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::RawData, Page::PriceChart, Page::Heatmap];

    let mut tab_spans = vec![Span::styled(
        format!("{}  ", app.title),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )];
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

    if let Ok(dashboard) = &app.outcome {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            format!("Rows: {}", dashboard.report.kept_rows),
            Style::default().fg(Color::White),
        ));
        if dashboard.report.dropped_count() > 0 {
            tab_spans.push(Span::raw("  "));
            tab_spans.push(Span::styled(
                format!("dropped {}", dashboard.report.dropped_count()),
                Style::default().fg(Color::Red),
            ));
        }
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_message(f: &mut Frame, area: Rect, title: &str, text: &str, hint: Option<String>) {
    let mut lines = vec![Line::from(""), Line::from(Span::styled(
        format!("  {}", text),
        Style::default().fg(Color::Yellow),
    ))];
    if let Some(hint) = hint {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("  {}", hint)));
    }

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title.to_string()),
    );
    f.render_widget(paragraph, area);
}

fn render_no_data(f: &mut Frame, area: Rect, title: &str) {
    render_message(
        f,
        area,
        title,
        "No data available to plot. Please ensure your data is correctly loaded.",
        None,
    );
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(table) = app.outcome.as_ref().ok().and_then(|d| d.prices.ready()) else {
        render_no_data(f, area, " Raw Data Preview ");
        return;
    };

    let extras = table.extra_columns();
    let mut headers = vec!["Date".to_string()];
    headers.extend(table.columns.iter().map(|c| c.name().to_string()));
    headers.extend(extras.iter().cloned());

    let header_cells = headers.iter().map(|h| {
        Cell::from(h.clone()).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = table
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![Cell::from(row.timestamp.format(DATE_FORMAT).to_string())];
            for column in &table.columns {
                let cell = match row.price(*column) {
                    Some(v) => Cell::from(format!("{:.2}", v)),
                    None => Cell::from("").style(Style::default().fg(Color::DarkGray)),
                };
                cells.push(cell);
            }
            for name in &extras {
                cells.push(Cell::from(truncate(
                    &row.extras.get(name).map(|v| v.to_string()).unwrap_or_default(),
                    14,
                )));
            }
            Row::new(cells).height(1)
        })
        .collect();

    let mut widths = vec![Constraint::Length(21)];
    widths.extend(table.columns.iter().map(|_| Constraint::Length(11)));
    widths.extend(extras.iter().map(|_| Constraint::Length(15)));

    let widget = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Raw Data Preview "),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(widget, area, &mut app.state);
}

fn series_color(column: PriceColumn) -> Color {
    match column {
        PriceColumn::Open => Color::Cyan,
        PriceColumn::High => Color::Green,
        PriceColumn::Low => Color::Red,
        PriceColumn::Close => Color::Yellow,
    }
}

fn render_chart(f: &mut Frame, area: Rect, app: &App) {
    let title = format!(" Stock Price Over Time ({}) ", app.range.label());
    let Some(table) = app.table() else {
        render_no_data(f, area, &title);
        return;
    };

    let window = app.range.window(table);
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        render_no_data(f, area, &title);
        return;
    };
    let (start, end) = (first.timestamp, last.timestamp);

    // x = days since the first row in the window
    let points = melt(window, &app.selected);
    let series: Vec<(PriceColumn, Vec<(f64, f64)>)> = app
        .selected
        .iter()
        .map(|column| {
            let data = points
                .iter()
                .filter(|p| p.price_type == *column)
                .map(|p| ((p.timestamp - start).num_seconds() as f64 / 86_400.0, p.value))
                .collect();
            (*column, data)
        })
        .collect();

    let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        (lo.min(p.value), hi.max(p.value))
    });
    if !lo.is_finite() {
        render_message(f, area, &title, "No numeric values for the selected price types.", None);
        return;
    }
    let pad = ((hi - lo) * 0.05).max(0.01);
    let (y_min, y_max) = (lo - pad, hi + pad);
    let x_max = ((end - start).num_seconds() as f64 / 86_400.0).max(1.0);

    let datasets: Vec<Dataset> = series
        .iter()
        .map(|(column, data)| {
            Dataset::default()
                .name(column.name())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(series_color(*column)))
                .data(data)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .x_axis(
            Axis::default()
                .title("Date")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(vec![
                    Span::raw(start.format("%d/%m/%Y").to_string()),
                    Span::raw(end.format("%d/%m/%Y").to_string()),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("Price ($)")
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::raw(format!("{:.2}", y_min)),
                    Span::raw(format!("{:.2}", (y_min + y_max) / 2.0)),
                    Span::raw(format!("{:.2}", y_max)),
                ]),
        );

    f.render_widget(chart, area);
}

/// Five-step colour scale, low to high
fn heat_color(value: f64, lo: f64, hi: f64) -> Color {
    const SCALE: [Color; 5] = [Color::Blue, Color::Magenta, Color::Red, Color::LightRed, Color::Yellow];
    if hi <= lo {
        return SCALE[2];
    }
    let t = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
    SCALE[((t * 4.0).round() as usize).min(4)]
}

fn render_heatmap(f: &mut Frame, area: Rect, app: &App) {
    let title = " Average Close Price Heatmap (Year vs. Month) ";
    let section: Option<&Section<HeatmapTable>> = app.outcome.as_ref().ok().map(|d| &d.heatmap);

    let heatmap = match section {
        Some(Section::Ready(h)) => h,
        Some(Section::Failed(err)) => {
            render_message(f, area, title, &err.to_string(), Some(fix_hint(err)));
            return;
        }
        _ => {
            render_message(
                f,
                area,
                title,
                "No data available to plot the heatmap, or 'Close' column is missing/invalid.",
                None,
            );
            return;
        }
    };

    let (lo, hi) = heatmap.value_range().unwrap_or((0.0, 0.0));

    let mut header_cells = vec![Cell::from("Year")];
    header_cells.extend(heatmap.months().iter().map(|m| Cell::from(*m)));
    let header = Row::new(header_cells)
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .height(1);

    let rows = heatmap.rows.iter().map(|row| {
        let mut cells = vec![Cell::from(row.label())];
        for value in &row.cells {
            cells.push(match value {
                Some(v) => Cell::from(format!("{:.2}", v))
                    .style(Style::default().fg(Color::Black).bg(heat_color(*v, lo, hi))),
                None => Cell::from(""),
            });
        }
        Row::new(cells).height(1)
    });

    let mut widths = vec![Constraint::Length(6)];
    widths.extend(std::iter::repeat(Constraint::Length(9)).take(12));

    let widget = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    );

    f.render_widget(widget, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.row_count()),
        Style::default().fg(Color::Cyan),
    )];

    status_spans.push(Span::raw(" | Series: "));
    for column in &app.selected {
        status_spans.push(Span::styled(
            format!("{} ", column.name()),
            Style::default().fg(series_color(*column)),
        ));
    }
    status_spans.push(Span::raw("| Range: "));
    status_spans.push(Span::styled(app.range.label(), Style::default().fg(Color::Green)));

    if let Some(message) = &app.message {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(message.clone(), Style::default().fg(Color::Magenta)));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("1-4", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Series | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Range | "));
    status_spans.push(Span::styled("R", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Reload | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

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
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
