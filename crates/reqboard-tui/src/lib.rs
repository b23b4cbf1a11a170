// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod clipboard;

pub use clipboard::{
    ClipboardSink, CopyOutcome, Osc52Clipboard, SystemClipboard, copy_to_clipboard, copy_with,
    osc52_sequence,
};

use anyhow::{Context, Result, anyhow, bail};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row as TableRow, Table, TableState, Tabs};
use reqboard_app::{
    CacheEntry, CellView, ListCommand, ListEvent, RequestList, Row, SnapshotOrigin, StatusFilter,
    StatusKind, apply_filter,
};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;

pub const TITLE: &str = "HỆ THỐNG BẢO TRÌ";
pub const LOADING_TEXT: &str = "Loading data...";
pub const EMPTY_TEXT: &str = "No data available for the current filter.";
pub const DEFAULT_HIGHLIGHT_FIELDS: [&str; 2] = ["Chờ Xác Nhận", "Chờ Đóng"];

const TRUNCATION_MARK: &str = " ...";
const MIN_COLUMN_WIDTH: usize = 4;
const MAX_COLUMN_WIDTH: usize = 48;
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const HINTS: &str =
    "j/k/h/l move | enter expand | esc collapse | f/F a n p c o filter | y/Y copy | q quit";

/// Side effects the list view needs. Implementations own the network client,
/// the cache file, and the clipboard.
pub trait ListRuntime {
    fn load_cached(&mut self) -> Result<Option<CacheEntry>>;
    fn fetch_rows(&mut self) -> Result<Vec<Row>>;
    /// Runs the fetch and reports it on `tx`. The default blocks; runtimes
    /// backed by a network client move the work to a thread.
    fn spawn_fetch(&mut self, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.fetch_rows().map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::Fetched(result))
            .map_err(|_| anyhow!("fetch event channel closed"))?;
        Ok(())
    }
    fn store_cache(&mut self, entry: &CacheEntry) -> Result<()>;
    fn copy_text(&mut self, text: &str) -> CopyOutcome {
        copy_to_clipboard(text)
    }
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    Fetched(Result<Vec<Row>, String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    /// Columns rendered bold blue wherever they appear.
    pub highlight_fields: Vec<String>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            highlight_fields: DEFAULT_HIGHLIGHT_FIELDS
                .iter()
                .map(|field| (*field).to_owned())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    options: ViewOptions,
    selected_row: usize,
    selected_col: usize,
    status_line: Option<String>,
    status_token: u64,
}

impl ViewData {
    fn new(options: ViewOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }
}

/// Publishes the cached snapshot and starts the fetch. The fetch result
/// always arrives on `tx` as [`InternalEvent::Fetched`].
pub fn start_session<R: ListRuntime>(
    list: &mut RequestList,
    runtime: &mut R,
    tx: &Sender<InternalEvent>,
) -> Vec<ListEvent> {
    let cached = match runtime.load_cached() {
        Ok(entry) => entry,
        Err(error) => {
            tracing::warn!(error = %format!("{error:#}"), "cache unreadable; starting empty");
            None
        }
    };
    let events = list.publish_cache(cached, runtime.now());
    tracing::debug!(
        origin = list.origin().label(),
        rows = list.total_len(),
        "published cached snapshot"
    );

    if let Err(error) = runtime.spawn_fetch(tx.clone()) {
        let _ = tx.send(InternalEvent::Fetched(Err(format!("{error:#}"))));
    }
    events
}

/// Applies a fetch result and persists the snapshot when it changed.
pub fn finish_fetch<R: ListRuntime>(
    list: &mut RequestList,
    runtime: &mut R,
    result: Result<Vec<Row>, String>,
) -> Vec<ListEvent> {
    if let Err(error) = &result {
        tracing::warn!(error = %error, "fetch failed");
    }
    let outcome = list.apply_fetch(result, runtime.now());
    if let Some(entry) = &outcome.cache_write
        && let Err(error) = runtime.store_cache(entry)
    {
        tracing::warn!(error = %format!("{error:#}"), "cache write failed");
    }
    outcome.events
}

/// Runs the whole load sequence without a terminal and waits for the fetch.
pub fn initialize<R: ListRuntime>(
    list: &mut RequestList,
    runtime: &mut R,
) -> Result<Vec<ListEvent>> {
    let (tx, rx) = mpsc::channel();
    let mut events = start_session(list, runtime, &tx);
    drop(tx);

    loop {
        match rx.recv() {
            Ok(InternalEvent::Fetched(result)) => {
                events.extend(finish_fetch(list, runtime, result));
                return Ok(events);
            }
            Ok(InternalEvent::ClearStatus { .. }) => {}
            Err(_) => bail!("fetch ended without reporting a result"),
        }
    }
}

pub fn run_app<R: ListRuntime>(
    list: &mut RequestList,
    runtime: &mut R,
    options: ViewOptions,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(options);
    let (internal_tx, internal_rx) = mpsc::channel();

    let events = start_session(list, runtime, &internal_tx);
    report_events(list, &mut view_data, &internal_tx, &events);

    let mut result = Ok(());
    loop {
        process_internal_events(list, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, list, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event
            && let Event::Key(key) = event::read().context("read event")?
            && handle_key_event(list, runtime, &mut view_data, &internal_tx, key)
        {
            break;
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: ListRuntime>(
    list: &mut RequestList,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                view_data.status_line = None;
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Fetched(result) => {
                let events = finish_fetch(list, runtime, result);
                report_events(list, view_data, tx, &events);
            }
        }
    }
}

fn report_events(
    list: &RequestList,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: &[ListEvent],
) {
    for event in events {
        match event {
            ListEvent::FetchFailed(error) if list.total_len() > 0 => {
                emit_status(
                    view_data,
                    tx,
                    format!("refresh failed, showing saved data: {error}"),
                );
            }
            ListEvent::FetchFailed(error) => {
                emit_status(view_data, tx, format!("load failed: {error}"));
            }
            ListEvent::SnapshotReplaced {
                rows,
                origin: SnapshotOrigin::Network,
            } => {
                emit_status(view_data, tx, format!("loaded {rows} requests"));
            }
            _ => {}
        }
    }
    clamp_selection(list, view_data);
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    view_data.status_line = Some(message.into());
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: ListRuntime>(
    list: &mut RequestList,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            return true;
        }
        (KeyCode::Char('q'), KeyModifiers::NONE) => return true,
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => move_row(list, view_data, 1),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => move_row(list, view_data, -1),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => move_column(list, view_data, -1),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => move_column(list, view_data, 1),
        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => view_data.selected_row = 0,
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
            view_data.selected_row = list.displayed_len().saturating_sub(1);
        }
        (KeyCode::Enter, _) | (KeyCode::Char(' '), _) => {
            let events = list.dispatch(ListCommand::ToggleExpand {
                row: view_data.selected_row,
                field: view_data.selected_col,
            });
            for event in events {
                if let ListEvent::CellToggled { key, expanded } = event {
                    let verb = if expanded { "expanded" } else { "collapsed" };
                    emit_status(view_data, internal_tx, format!("{verb} {}", key.field));
                }
            }
        }
        (KeyCode::Esc, _) => {
            list.dispatch(ListCommand::CollapseAll);
        }
        (KeyCode::Char('f'), KeyModifiers::NONE) => {
            change_filter(list, view_data, internal_tx, ListCommand::NextFilter);
        }
        (KeyCode::Char('F'), _) => {
            change_filter(list, view_data, internal_tx, ListCommand::PrevFilter);
        }
        (KeyCode::Char(letter @ ('a' | 'n' | 'p' | 'c' | 'o')), KeyModifiers::NONE) => {
            let command = ListCommand::SetFilter(filter_for_key(letter));
            change_filter(list, view_data, internal_tx, command);
        }
        (KeyCode::Char('y'), KeyModifiers::NONE) => {
            if let Some(text) = selected_cell_text(list, view_data) {
                let outcome = runtime.copy_text(&text);
                emit_status(view_data, internal_tx, copy_status(outcome, "cell"));
            }
        }
        (KeyCode::Char('Y'), _) => {
            if let Some(text) = row_as_tsv(list, view_data.selected_row) {
                let outcome = runtime.copy_text(&text);
                emit_status(view_data, internal_tx, copy_status(outcome, "row"));
            }
        }
        _ => {}
    }
    false
}

fn filter_for_key(key: char) -> StatusFilter {
    match key {
        'n' => StatusFilter::New,
        'p' => StatusFilter::Pending,
        'c' => StatusFilter::Closed,
        'o' => StatusFilter::Other,
        _ => StatusFilter::All,
    }
}

fn change_filter(
    list: &mut RequestList,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: ListCommand,
) {
    for event in list.dispatch(command) {
        if let ListEvent::FilterChanged(filter) = event {
            view_data.selected_row = 0;
            emit_status(
                view_data,
                internal_tx,
                format!("filter: {} ({})", filter.label(), list.displayed_len()),
            );
        }
    }
    clamp_selection(list, view_data);
}

fn move_row(list: &RequestList, view_data: &mut ViewData, delta: isize) {
    view_data.selected_row = view_data.selected_row.saturating_add_signed(delta);
    clamp_selection(list, view_data);
}

fn move_column(list: &RequestList, view_data: &mut ViewData, delta: isize) {
    view_data.selected_col = view_data.selected_col.saturating_add_signed(delta);
    clamp_selection(list, view_data);
}

fn clamp_selection(list: &RequestList, view_data: &mut ViewData) {
    view_data.selected_row = view_data
        .selected_row
        .min(list.displayed_len().saturating_sub(1));
    view_data.selected_col = view_data
        .selected_col
        .min(list.columns().len().saturating_sub(1));
}

fn copy_status(outcome: CopyOutcome, what: &str) -> String {
    match outcome {
        CopyOutcome::Primary => format!("copied {what}"),
        CopyOutcome::Fallback => format!("copied {what} via terminal"),
        CopyOutcome::Failed => format!("copy {what} failed; see log"),
    }
}

/// The untruncated text of the selected cell.
fn selected_cell_text(list: &RequestList, view_data: &ViewData) -> Option<String> {
    let row = list.displayed_row(view_data.selected_row)?;
    let field = list.columns().get(view_data.selected_col)?;
    Some(row.get(field).map(|value| value.display()).unwrap_or_default())
}

fn row_as_tsv(list: &RequestList, index: usize) -> Option<String> {
    let row = list.displayed_row(index)?;
    let fields = list
        .columns()
        .iter()
        .map(|field| {
            row.get(field)
                .map(|value| value.display())
                .unwrap_or_default()
                .replace(['\t', '\n', '\r'], " ")
        })
        .collect::<Vec<_>>();
    Some(fields.join("\t"))
}

fn render(frame: &mut ratatui::Frame<'_>, list: &RequestList, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let selected = StatusFilter::ALL
        .iter()
        .position(|filter| *filter == list.filter())
        .unwrap_or(0);
    let filter_titles = StatusFilter::ALL
        .iter()
        .map(|filter| filter_tab_label(list, *filter))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(filter_titles)
        .block(Block::default().title(title_text(list)).borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    match body_message(list) {
        Some(message) => {
            let body = Paragraph::new(message).block(Block::default().borders(Borders::ALL));
            frame.render_widget(body, layout[1]);
        }
        None => render_table(frame, layout[1], list, view_data),
    }

    let status = Paragraph::new(status_text(list, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    list: &RequestList,
    view_data: &ViewData,
) {
    let widths = column_widths(list);
    let header = TableRow::new(list.columns().iter().map(|field| {
        Cell::from(field.as_str()).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let mut rows = Vec::with_capacity(list.displayed_len());
    for row_index in 0..list.displayed_len() {
        let selected_row = row_index == view_data.selected_row;
        let mut height = 1;
        let mut cells = Vec::with_capacity(widths.len());
        for (column_index, width) in widths.iter().enumerate() {
            let Some(view) = list.cell(row_index, column_index) else {
                cells.push(Cell::from(""));
                continue;
            };
            let lines = cell_lines(&view, *width);
            height = height.max(lines.len());

            let mut style = cell_style(&view, &view_data.options);
            if selected_row && view.status.is_none() {
                style = style.bg(Color::DarkGray);
            }
            if selected_row && column_index == view_data.selected_col {
                style = Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD);
            }
            let text = Text::from(lines.into_iter().map(Line::from).collect::<Vec<_>>());
            cells.push(Cell::from(text).style(style));
        }
        rows.push(TableRow::new(cells).height(u16::try_from(height).unwrap_or(u16::MAX)));
    }

    let constraints = widths
        .iter()
        .map(|width| Constraint::Length(u16::try_from(*width).unwrap_or(u16::MAX)))
        .collect::<Vec<_>>();
    let table = Table::new(rows, constraints)
        .header(header)
        .column_spacing(1)
        .block(Block::default().borders(Borders::ALL));
    let mut state = TableState::default().with_selected(Some(view_data.selected_row));
    frame.render_stateful_widget(table, area, &mut state);
}

fn title_text(list: &RequestList) -> String {
    let mut title = format!(
        "{TITLE} | showing {} of {} requests",
        list.displayed_len(),
        list.total_len()
    );
    if list.is_revalidating() {
        title.push_str(" | refreshing");
    }
    title
}

fn filter_tab_label(list: &RequestList, filter: StatusFilter) -> String {
    let count = apply_filter(list.snapshot(), filter).len();
    format!("{} {count}", filter.label())
}

fn body_message(list: &RequestList) -> Option<&'static str> {
    if list.is_loading() && list.total_len() == 0 {
        Some(LOADING_TEXT)
    } else if list.displayed_len() == 0 {
        Some(EMPTY_TEXT)
    } else {
        None
    }
}

fn status_text(list: &RequestList, view_data: &ViewData) -> String {
    let source = format!("source: {}", list.origin().label());
    match &view_data.status_line {
        Some(status) => format!("{status} | {source} | {HINTS}"),
        None => format!("{source} | {HINTS}"),
    }
}

/// Collapsed text as drawn: status values padded into a badge, truncated
/// values followed by the expand mark.
fn cell_display_text(view: &CellView) -> String {
    if view.status.is_some() && !view.text.is_empty() {
        format!(" {} ", view.text)
    } else if view.truncated {
        format!("{}{TRUNCATION_MARK}", view.text)
    } else {
        view.text.clone()
    }
}

fn cell_lines(view: &CellView, width: usize) -> Vec<String> {
    if view.expanded {
        wrap_chars(&view.text, width)
    } else {
        vec![cell_display_text(view)]
    }
}

fn wrap_chars(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for source_line in text.lines() {
        let chars = source_line.chars().collect::<Vec<_>>();
        if chars.is_empty() {
            lines.push(String::new());
            continue;
        }
        lines.extend(chars.chunks(width).map(|chunk| chunk.iter().collect::<String>()));
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn column_widths(list: &RequestList) -> Vec<usize> {
    (0..list.columns().len())
        .map(|column_index| {
            let header = list.columns()[column_index].chars().count();
            let widest = (0..list.displayed_len())
                .filter_map(|row_index| list.cell(row_index, column_index))
                .map(|view| cell_display_text(&view).chars().count())
                .max()
                .unwrap_or(0);
            header.max(widest).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
        })
        .collect()
}

fn badge_style(kind: StatusKind) -> Style {
    let (fg, bg) = match kind {
        StatusKind::New => (Color::White, Color::Red),
        StatusKind::Pending => (Color::Black, Color::Yellow),
        StatusKind::Closed => (Color::Black, Color::Green),
        StatusKind::Other => (Color::White, Color::DarkGray),
    };
    Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD)
}

fn cell_style(view: &CellView, options: &ViewOptions) -> Style {
    if let Some(kind) = view.status
        && !view.text.is_empty()
    {
        return badge_style(kind);
    }
    if options
        .highlight_fields
        .iter()
        .any(|field| field == &view.field)
    {
        return Style::default()
            .fg(Color::Blue)
            .add_modifier(Modifier::BOLD);
    }
    Style::default()
}
