// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ndms_app::{
    CommitTicket, Controller, DisasterType, FetchDisposition, FetchOutcome, FetchTicket,
    NdmsError, Record, ViewState, humanize_key, schema_for,
};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const EDIT_CURSOR: &str = "▏";

/// Backend access for the UI loop. Implementations may answer on another
/// thread; the default `spawn_*` methods answer inline.
pub trait AppRuntime {
    fn fetch_records(&mut self, ticket: &FetchTicket) -> FetchOutcome;
    fn commit_record(&mut self, ticket: &CommitTicket) -> Result<Record, NdmsError>;
    fn spawn_fetch(&mut self, ticket: FetchTicket, tx: Sender<InternalEvent>) -> Result<()> {
        let outcome = self.fetch_records(&ticket);
        tx.send(InternalEvent::FetchCompleted(outcome))
            .map_err(|_| anyhow!("fetch event channel closed"))?;
        Ok(())
    }
    fn spawn_commit(&mut self, ticket: CommitTicket, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.commit_record(&ticket);
        tx.send(InternalEvent::CommitCompleted { ticket, result })
            .map_err(|_| anyhow!("commit event channel closed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    FetchCompleted(FetchOutcome),
    CommitCompleted {
        ticket: CommitTicket,
        result: Result<Record, NdmsError>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UiMode {
    #[default]
    Nav,
    Filter,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ViewData {
    mode: UiMode,
    selected_row: usize,
    selected_col: usize,
    filter_field: usize,
    help_visible: bool,
    status_token: u64,
}

pub fn run_app<R: AppRuntime>(controller: &mut Controller, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let result = Terminal::new(CrosstermBackend::new(stdout))
        .context("create terminal")
        .and_then(|mut terminal| {
            drive(&mut terminal, controller, runtime, || {
                if event::poll(Duration::from_millis(120)).context("poll event")? {
                    event::read().map(Some).context("read event")
                } else {
                    Ok(None)
                }
            })
        });

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

/// Draw and dispatch until quit. Errors end the loop and are returned so
/// the caller can restore the terminal first.
fn drive<B, R, E>(
    terminal: &mut Terminal<B>,
    controller: &mut Controller,
    runtime: &mut R,
    mut next_event: E,
) -> Result<()>
where
    B: Backend,
    R: AppRuntime,
    E: FnMut() -> Result<Option<Event>>,
{
    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    let ticket = controller.start();
    request_fetch(controller, runtime, &mut view_data, &internal_tx, ticket);

    loop {
        process_internal_events(
            controller,
            runtime,
            &mut view_data,
            &internal_tx,
            &internal_rx,
        );

        terminal
            .draw(|frame| render(frame, controller, &view_data))
            .context("draw frame")?;

        if let Some(Event::Key(key)) = next_event()?
            && handle_key_event(controller, runtime, &mut view_data, &internal_tx, key)
        {
            return Ok(());
        }
    }
}

fn process_internal_events<R: AppRuntime>(
    controller: &mut Controller,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                controller.clear_status();
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::FetchCompleted(outcome) => {
                let failed = outcome.result.is_err();
                if controller.on_fetch_completed(outcome) == FetchDisposition::Applied {
                    clamp_selection(controller, view_data);
                    if failed {
                        schedule_status_clear(tx, view_data);
                    }
                }
            }
            InternalEvent::CommitCompleted { ticket, result } => {
                let refresh = controller.on_commit_completed(&ticket, result);
                schedule_status_clear(tx, view_data);
                if let Ok(Some(ticket)) = refresh {
                    request_fetch(controller, runtime, view_data, tx, ticket);
                }
                if view_data.mode == UiMode::Edit && !controller.edit_session().is_open() {
                    view_data.mode = UiMode::Nav;
                }
            }
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, view_data: &mut ViewData) {
    view_data.status_token = view_data.status_token.saturating_add(1);
    let token = view_data.status_token;
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    controller: &mut Controller,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    controller.set_status(message);
    schedule_status_clear(internal_tx, view_data);
}

fn request_fetch<R: AppRuntime>(
    controller: &mut Controller,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    ticket: FetchTicket,
) {
    if let Err(error) = runtime.spawn_fetch(ticket, internal_tx.clone()) {
        tracing::error!(error = %error, "could not dispatch fetch");
        emit_status(
            controller,
            view_data,
            internal_tx,
            format!("fetch not sent: {error}"),
        );
    }
}

fn handle_key_event<R: AppRuntime>(
    controller: &mut Controller,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    match view_data.mode {
        UiMode::Nav => handle_nav_key(controller, runtime, view_data, internal_tx, key),
        UiMode::Filter => {
            handle_filter_key(controller, runtime, view_data, internal_tx, key);
            false
        }
        UiMode::Edit => {
            handle_edit_key(controller, runtime, view_data, internal_tx, key);
            false
        }
    }
}

fn handle_nav_key<R: AppRuntime>(
    controller: &mut Controller,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let active = controller.active_type();
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Tab | KeyCode::Char(']') => {
            switch_type(controller, runtime, view_data, internal_tx, active.rotate(1));
        }
        KeyCode::BackTab | KeyCode::Char('[') => {
            switch_type(controller, runtime, view_data, internal_tx, active.rotate(-1));
        }
        KeyCode::Char(digit @ '1'..='3') => {
            let index = digit as usize - '1' as usize;
            switch_type(
                controller,
                runtime,
                view_data,
                internal_tx,
                DisasterType::ALL[index],
            );
        }
        KeyCode::Char('j') | KeyCode::Down => move_row(controller, view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_row(controller, view_data, -1),
        KeyCode::Char('h') | KeyCode::Left => move_col(controller, view_data, -1),
        KeyCode::Char('l') | KeyCode::Right => move_col(controller, view_data, 1),
        KeyCode::Char('/') => {
            view_data.mode = UiMode::Filter;
            view_data.filter_field = view_data
                .filter_field
                .min(schema_for(active).filterable.len().saturating_sub(1));
        }
        KeyCode::Char('r') => {
            let ticket = controller.apply_filters();
            request_fetch(controller, runtime, view_data, internal_tx, ticket);
        }
        KeyCode::Char('e') => begin_edit(controller, view_data, internal_tx),
        KeyCode::Char('?') => view_data.help_visible = true,
        _ => {}
    }
    false
}

fn handle_filter_key<R: AppRuntime>(
    controller: &mut Controller,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let filterable = schema_for(controller.active_type()).filterable;
    let Some(field) = filterable.get(view_data.filter_field).copied() else {
        view_data.mode = UiMode::Nav;
        return;
    };
    let current = controller
        .filters()
        .value(controller.active_type(), field)
        .unwrap_or_default()
        .to_owned();

    let updated = match key.code {
        KeyCode::Tab | KeyCode::Down => {
            view_data.filter_field = (view_data.filter_field + 1) % filterable.len();
            None
        }
        KeyCode::BackTab | KeyCode::Up => {
            view_data.filter_field =
                (view_data.filter_field + filterable.len() - 1) % filterable.len();
            None
        }
        KeyCode::Enter => {
            view_data.mode = UiMode::Nav;
            let ticket = controller.apply_filters();
            request_fetch(controller, runtime, view_data, internal_tx, ticket);
            None
        }
        KeyCode::Esc => {
            view_data.mode = UiMode::Nav;
            None
        }
        KeyCode::Backspace => {
            let mut value = current;
            value.pop();
            Some(value)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(String::new()),
        _ => typed_char(key).map(|ch| {
            let mut value = current;
            value.push(ch);
            value
        }),
    };

    if let Some(value) = updated
        && let Err(error) = controller.set_filter(field, value)
    {
        emit_status(controller, view_data, internal_tx, error.to_string());
    }
}

fn handle_edit_key<R: AppRuntime>(
    controller: &mut Controller,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(active) = controller.edit_session().active() else {
        view_data.mode = UiMode::Nav;
        return;
    };
    let schema = schema_for(active.kind);
    let Some(field) = schema
        .fields
        .get(view_data.selected_col)
        .filter(|field| field.editable)
    else {
        step_editable_col(controller, view_data, 1);
        return;
    };
    let current = active.live_value(field.key);

    let updated = match key.code {
        KeyCode::Tab | KeyCode::Right => {
            step_editable_col(controller, view_data, 1);
            None
        }
        KeyCode::BackTab | KeyCode::Left => {
            step_editable_col(controller, view_data, -1);
            None
        }
        KeyCode::Esc => {
            controller.cancel_edit();
            view_data.mode = UiMode::Nav;
            emit_status(controller, view_data, internal_tx, "edit cancelled");
            None
        }
        KeyCode::Enter => {
            match controller.commit_edit() {
                Ok(ticket) => {
                    emit_status(
                        controller,
                        view_data,
                        internal_tx,
                        format!("saving {} {}", ticket.kind, ticket.identity),
                    );
                    if let Err(error) = runtime.spawn_commit(ticket, internal_tx.clone()) {
                        emit_status(
                            controller,
                            view_data,
                            internal_tx,
                            format!("update not sent: {error}"),
                        );
                    }
                }
                Err(error) => emit_status(controller, view_data, internal_tx, error.to_string()),
            }
            None
        }
        KeyCode::Backspace => {
            let mut value = current;
            value.pop();
            Some(value)
        }
        _ => typed_char(key).map(|ch| {
            let mut value = current;
            value.push(ch);
            value
        }),
    };

    if let Some(value) = updated
        && let Err(error) = controller.set_edit_field(field.key, value)
    {
        emit_status(controller, view_data, internal_tx, error.to_string());
    }
}

fn typed_char(key: KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(ch)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            Some(ch)
        }
        _ => None,
    }
}

fn switch_type<R: AppRuntime>(
    controller: &mut Controller,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: DisasterType,
) {
    let abandoned = controller.edit_session().is_open();
    let ticket = controller.select_type(kind);
    view_data.mode = UiMode::Nav;
    view_data.selected_row = 0;
    view_data.selected_col = 0;
    view_data.filter_field = 0;
    if abandoned {
        emit_status(controller, view_data, internal_tx, "unsaved edit discarded");
    }
    request_fetch(controller, runtime, view_data, internal_tx, ticket);
}

fn begin_edit(
    controller: &mut Controller,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if let Err(error) = controller.begin_edit_at(view_data.selected_row) {
        emit_status(controller, view_data, internal_tx, error.to_string());
        return;
    }
    view_data.mode = UiMode::Edit;
    let on_editable = schema_for(controller.active_type())
        .fields
        .get(view_data.selected_col)
        .is_some_and(|field| field.editable);
    if !on_editable {
        step_editable_col(controller, view_data, 1);
    }
}

fn move_row(controller: &Controller, view_data: &mut ViewData, delta: isize) {
    let len = controller.displayed_records().len();
    if len == 0 {
        view_data.selected_row = 0;
        return;
    }
    let next = view_data.selected_row as isize + delta;
    view_data.selected_row = next.clamp(0, len as isize - 1) as usize;
}

fn move_col(controller: &Controller, view_data: &mut ViewData, delta: isize) {
    let len = schema_for(controller.active_type()).fields.len();
    let next = view_data.selected_col as isize + delta;
    view_data.selected_col = next.clamp(0, len as isize - 1) as usize;
}

/// Moves to the next editable column in `delta`'s direction, wrapping.
fn step_editable_col(controller: &Controller, view_data: &mut ViewData, delta: isize) {
    let editable = schema_for(controller.active_type()).editable_columns();
    if editable.is_empty() {
        return;
    }
    let position = editable
        .iter()
        .position(|column| *column == view_data.selected_col);
    let next = match position {
        Some(index) => (index as isize + delta).rem_euclid(editable.len() as isize) as usize,
        None if delta >= 0 => editable
            .iter()
            .position(|column| *column > view_data.selected_col)
            .unwrap_or(0),
        None => editable
            .iter()
            .rposition(|column| *column < view_data.selected_col)
            .unwrap_or(editable.len() - 1),
    };
    view_data.selected_col = editable[next];
}

fn clamp_selection(controller: &Controller, view_data: &mut ViewData) {
    let len = controller.displayed_records().len();
    view_data.selected_row = view_data.selected_row.min(len.saturating_sub(1));
}

fn render(frame: &mut ratatui::Frame<'_>, controller: &Controller, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let selected = DisasterType::ALL
        .iter()
        .position(|kind| *kind == controller.active_type())
        .unwrap_or(0);
    let titles = DisasterType::ALL
        .iter()
        .enumerate()
        .map(|(index, kind)| format!("{} {}", index + 1, kind.title()))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("ndms").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    render_filter_bar(frame, layout[1], controller, view_data);
    render_table(frame, layout[2], controller, view_data);

    let status = Paragraph::new(status_text(controller, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, layout[3]);

    if view_data.help_visible {
        let area = centered_rect(70, 50, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_filter_bar(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    controller: &Controller,
    view_data: &ViewData,
) {
    let kind = controller.active_type();
    let mut spans = Vec::new();
    for (index, field) in schema_for(kind).filterable.iter().enumerate() {
        if index > 0 {
            spans.push(Span::raw("  "));
        }
        let value = controller.filters().value(kind, field).unwrap_or_default();
        let focused = view_data.mode == UiMode::Filter && index == view_data.filter_field;
        let text = if value.is_empty() && !focused {
            humanize_key(field)
        } else {
            format!("{}={value}", humanize_key(field))
        };
        let style = if focused {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else if value.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(text, style));
    }
    let bar = Paragraph::new(Line::from(spans))
        .block(Block::default().title("filters").borders(Borders::ALL));
    frame.render_widget(bar, area);
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    controller: &Controller,
    view_data: &ViewData,
) {
    let block = Block::default()
        .title(table_title(controller))
        .borders(Borders::ALL);
    if let Some(message) = empty_table_message(controller) {
        let body = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(body, area);
        return;
    }

    let schema = schema_for(controller.active_type());
    let widths = vec![Constraint::Min(8); schema.fields.len()];
    let header = Row::new(schema.fields.iter().map(|field| {
        let mut style = Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD);
        if view_data.mode == UiMode::Edit && field.editable {
            style = style.fg(Color::Cyan);
        }
        Cell::from(field.label).style(style)
    }));

    let rows = controller
        .rows()
        .into_iter()
        .enumerate()
        .map(|(row_index, row)| {
            let selected_row = row_index == view_data.selected_row;
            let cells = row
                .cells
                .into_iter()
                .enumerate()
                .map(|(column_index, cell)| {
                    let selected_cell = selected_row && column_index == view_data.selected_col;
                    let text = match cell.live_value {
                        Some(live) if selected_cell => format!("{live}{EDIT_CURSOR}"),
                        Some(live) => live,
                        None => cell.display,
                    };
                    let mut style = Style::default();
                    if cell.editable {
                        style = style.fg(Color::Cyan);
                    }
                    if selected_row {
                        style = style.bg(Color::DarkGray);
                    }
                    if selected_cell {
                        style = Style::default()
                            .fg(Color::Black)
                            .bg(Color::Cyan)
                            .add_modifier(Modifier::BOLD);
                    }
                    Cell::from(text).style(style)
                })
                .collect::<Vec<_>>();
            Row::new(cells)
        });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(block);
    frame.render_widget(table, area);
}

fn table_title(controller: &Controller) -> String {
    let title = controller.active_type().title();
    match controller.view() {
        ViewState::Idle(_) => title.to_owned(),
        ViewState::Loading { .. } => format!("{title} (loading)"),
        ViewState::Loaded { records, .. } => format!("{title} ({})", records.len()),
        ViewState::Error { .. } => format!("{title} (error)"),
    }
}

fn empty_table_message(controller: &Controller) -> Option<String> {
    let plural = controller.active_type().title().to_lowercase();
    match controller.view() {
        ViewState::Idle(_) => Some(String::new()),
        ViewState::Loading { .. } => Some(format!("loading {plural}...")),
        ViewState::Error { cause, .. } => Some(format!("{cause} -- press r to retry")),
        ViewState::Loaded { records, .. } if records.is_empty() => Some(format!(
            "no {plural} match the current filters -- press / to change them"
        )),
        ViewState::Loaded { .. } => None,
    }
}

fn status_text(controller: &Controller, view_data: &ViewData) -> String {
    if view_data.help_visible {
        return String::new();
    }

    let (mode, hints) = match view_data.mode {
        UiMode::Nav => (
            "NAV",
            "tab/[/] 1-3 type | j/k/h/l move | / filter | r refresh | e edit | ? help | q quit",
        ),
        UiMode::Filter => (
            "FILTER",
            "tab/up/down field | type value | ctrl+u clear | enter apply | esc nav",
        ),
        UiMode::Edit => (
            "EDIT",
            "tab/left/right field | type value | enter save | esc cancel",
        ),
    };
    match controller.status_line() {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit\n\
nav: tab/] next type | shift+tab/[ previous type | 1/2/3 earthquakes/floods/firestorms\n\
nav: j/k rows | h/l columns | / filters | r apply filters | e edit row | ? help | q quit\n\
filter: tab/down next field | shift+tab/up previous | ctrl+u clear | enter apply | esc nav\n\
edit: tab/right next field | shift+tab/left previous | backspace delete | enter save | esc cancel"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, InternalEvent, UiMode, ViewData, drive, empty_table_message, handle_key_event,
        help_overlay_text, process_internal_events, request_fetch, status_text, table_title,
    };
    use anyhow::anyhow;
    use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
    use ndms_app::{
        CommitTicket, Controller, DisasterType, FetchOutcome, FetchTicket, Fetcher, Generation,
        NdmsError, Record, Transport, ViewState,
    };
    use ndms_testkit::{DisasterFaker, ScriptedTransport, TransportCall};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::mpsc;

    #[derive(Debug, Default)]
    struct TestRuntime {
        transport: ScriptedTransport,
    }

    impl AppRuntime for TestRuntime {
        fn fetch_records(&mut self, ticket: &FetchTicket) -> FetchOutcome {
            Fetcher::new(&self.transport).fetch(ticket)
        }

        fn commit_record(&mut self, ticket: &CommitTicket) -> Result<Record, NdmsError> {
            self.transport
                .update(ticket.kind, &ticket.identity, &ticket.payload)
        }
    }

    struct Harness {
        controller: Controller,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: mpsc::Sender<InternalEvent>,
        rx: mpsc::Receiver<InternalEvent>,
    }

    impl Harness {
        fn started(kind: DisasterType, records: Vec<Record>) -> Self {
            let (tx, rx) = mpsc::channel();
            let mut harness = Self {
                controller: Controller::new(kind),
                runtime: TestRuntime::default(),
                view_data: ViewData::default(),
                tx,
                rx,
            };
            harness.runtime.transport.push_fetch(Ok(records));
            let ticket = harness.controller.start();
            request_fetch(
                &mut harness.controller,
                &mut harness.runtime,
                &mut harness.view_data,
                &harness.tx,
                ticket,
            );
            harness.pump();
            harness
        }

        fn pump(&mut self) {
            process_internal_events(
                &mut self.controller,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
            );
        }

        fn press(&mut self, code: KeyCode) -> bool {
            self.press_with(code, KeyModifiers::NONE)
        }

        fn press_with(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
            let quit = handle_key_event(
                &mut self.controller,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                KeyEvent::new(code, modifiers),
            );
            self.pump();
            quit
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.press(KeyCode::Char(ch));
            }
        }
    }

    fn quakes(count: u64) -> Vec<Record> {
        DisasterFaker::new(8).records(DisasterType::Earthquake, count)
    }

    #[test]
    fn startup_loads_unfiltered_listing() {
        let harness = Harness::started(DisasterType::Earthquake, quakes(3));
        assert_eq!(harness.controller.displayed_records().len(), 3);
        assert_eq!(
            harness.runtime.transport.calls(),
            vec![TransportCall::FetchAll(DisasterType::Earthquake)]
        );
        assert_eq!(table_title(&harness.controller), "Earthquakes (3)");
    }

    #[test]
    fn tab_and_digit_keys_switch_types() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(2));
        harness.press(KeyCode::Tab);
        assert_eq!(harness.controller.active_type(), DisasterType::Flood);

        harness.press(KeyCode::BackTab);
        assert_eq!(harness.controller.active_type(), DisasterType::Earthquake);

        harness.press(KeyCode::Char('3'));
        assert_eq!(harness.controller.active_type(), DisasterType::Firestorm);

        harness.press(KeyCode::Char('['));
        assert_eq!(harness.controller.active_type(), DisasterType::Flood);

        assert_eq!(
            harness.runtime.transport.calls().last(),
            Some(&TransportCall::FetchAll(DisasterType::Flood))
        );
    }

    #[test]
    fn filter_mode_types_into_focused_field_and_enter_applies() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(1));
        harness.press(KeyCode::Char('/'));
        assert_eq!(harness.view_data.mode, UiMode::Filter);

        harness.type_text("5.q");
        harness.press(KeyCode::Backspace);
        harness.press(KeyCode::Down);
        harness.type_text("6");
        harness.press_with(KeyCode::Char('u'), KeyModifiers::CONTROL);
        harness.press(KeyCode::Enter);

        assert_eq!(harness.view_data.mode, UiMode::Nav);
        assert_eq!(
            harness.runtime.transport.calls().last(),
            Some(&TransportCall::FetchFiltered(
                DisasterType::Earthquake,
                vec![("richter_magnitude".to_owned(), "5.".to_owned())]
            ))
        );
    }

    #[test]
    fn q_is_text_in_filter_mode_but_quits_in_nav() {
        let mut harness = Harness::started(DisasterType::Firestorm, Vec::new());
        harness.press(KeyCode::Char('/'));
        assert!(!harness.press(KeyCode::Char('q')));
        harness.press(KeyCode::Esc);
        assert_eq!(harness.view_data.mode, UiMode::Nav);
        assert!(harness.press(KeyCode::Char('q')));
    }

    #[test]
    fn edit_commit_success_refreshes_and_returns_to_nav() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(2));
        harness.press(KeyCode::Char('j'));
        harness.press(KeyCode::Char('e'));
        assert_eq!(harness.view_data.mode, UiMode::Edit);
        assert_eq!(harness.view_data.selected_col, 1, "first editable column");

        for _ in 0..8 {
            harness.press(KeyCode::Backspace);
        }
        harness.type_text("7.25");
        harness.press(KeyCode::Enter);

        assert_eq!(harness.view_data.mode, UiMode::Nav);
        assert!(!harness.controller.edit_session().is_open());
        let calls = harness.runtime.transport.calls();
        assert!(matches!(
            &calls[1],
            TransportCall::Update(DisasterType::Earthquake, identity, payload)
                if identity.as_str() == "2"
                    && payload.get_path("richter_magnitude") == Some(&json!(7.25))
        ));
        assert!(matches!(
            &calls[2],
            TransportCall::FetchFiltered(DisasterType::Earthquake, query) if query.is_empty()
        ));
    }

    #[test]
    fn edit_commit_failure_keeps_edit_mode_and_reports() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(1));
        harness
            .runtime
            .transport
            .push_update(Err(NdmsError::CommitFailed {
                message: "server error (422): bad depth".to_owned(),
            }));
        harness.press(KeyCode::Char('e'));
        harness.press(KeyCode::Enter);

        assert_eq!(harness.view_data.mode, UiMode::Edit);
        assert!(harness.controller.edit_session().is_open());
        assert!(
            status_text(&harness.controller, &harness.view_data).contains("bad depth"),
            "status should carry the backend message"
        );
    }

    #[test]
    fn edit_tab_skips_read_only_columns_and_esc_cancels() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(1));
        harness.press(KeyCode::Char('e'));
        for _ in 0..4 {
            harness.press(KeyCode::Tab);
        }
        let epicenter = 5;
        assert!(harness.view_data.selected_col > epicenter);
        harness.press(KeyCode::BackTab);
        assert_eq!(harness.view_data.selected_col, 4);

        harness.press(KeyCode::Esc);
        assert_eq!(harness.view_data.mode, UiMode::Nav);
        assert!(!harness.controller.edit_session().is_open());
    }

    #[test]
    fn switching_type_discards_edit() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(1));
        harness.press(KeyCode::Char('e'));
        harness.type_text("9");
        harness.view_data.mode = UiMode::Nav;
        harness.press(KeyCode::Char('2'));
        assert!(!harness.controller.edit_session().is_open());
        assert_eq!(
            harness.controller.status_line(),
            Some("unsaved edit discarded")
        );
    }

    #[test]
    fn edit_on_empty_table_reports_error() {
        let mut harness = Harness::started(DisasterType::Flood, Vec::new());
        harness.press(KeyCode::Char('e'));
        assert_eq!(harness.view_data.mode, UiMode::Nav);
        assert!(
            harness
                .controller
                .status_line()
                .is_some_and(|line| line.contains("no displayed row"))
        );
        assert!(
            empty_table_message(&harness.controller)
                .is_some_and(|message| message.contains("no floods match"))
        );
    }

    #[test]
    fn stale_completion_from_channel_is_ignored() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(2));
        harness
            .tx
            .send(InternalEvent::FetchCompleted(FetchOutcome {
                generation: Generation::new(0),
                kind: DisasterType::Earthquake,
                result: Ok(Vec::new()),
            }))
            .expect("channel open");
        harness.pump();
        assert_eq!(harness.controller.displayed_records().len(), 2);
    }

    #[test]
    fn fetch_failure_renders_error_state() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(1));
        harness
            .runtime
            .transport
            .push_fetch(Err(NdmsError::FetchFailed("cannot reach backend".to_owned())));
        harness.press(KeyCode::Char('r'));
        assert!(matches!(harness.controller.view(), ViewState::Error { .. }));
        assert_eq!(table_title(&harness.controller), "Earthquakes (error)");
        assert!(
            empty_table_message(&harness.controller)
                .is_some_and(|message| message.contains("press r to retry"))
        );
    }

    #[test]
    fn clear_status_only_honours_latest_token() {
        let mut harness = Harness::started(DisasterType::Earthquake, Vec::new());
        harness.press(KeyCode::Char('e'));
        let token = harness.view_data.status_token;
        harness
            .tx
            .send(InternalEvent::ClearStatus { token: token - 1 })
            .expect("channel open");
        harness.pump();
        assert!(harness.controller.status_line().is_some());

        harness
            .tx
            .send(InternalEvent::ClearStatus { token })
            .expect("channel open");
        harness.pump();
        assert_eq!(harness.controller.status_line(), None);
    }

    #[test]
    fn help_overlay_swallows_keys_until_closed() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(1));
        harness.press(KeyCode::Char('?'));
        assert!(harness.view_data.help_visible);
        assert!(!harness.press(KeyCode::Char('q')));
        assert_eq!(status_text(&harness.controller, &harness.view_data), "");
        harness.press(KeyCode::Esc);
        assert!(!harness.view_data.help_visible);
        assert!(help_overlay_text().contains("ctrl+q quit"));
    }

    #[test]
    fn ctrl_q_quits_from_any_mode() {
        let mut harness = Harness::started(DisasterType::Earthquake, quakes(1));
        harness.press(KeyCode::Char('e'));
        assert!(harness.press_with(KeyCode::Char('q'), KeyModifiers::CONTROL));
    }

    fn scripted_events(
        events: Vec<anyhow::Result<Option<Event>>>,
    ) -> impl FnMut() -> anyhow::Result<Option<Event>> {
        let mut queue = VecDeque::from(events);
        move || {
            queue
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("event script exhausted")))
        }
    }

    #[test]
    fn drive_returns_input_errors_instead_of_exiting_early() {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("test terminal");
        let mut controller = Controller::new(DisasterType::Flood);
        let mut runtime = TestRuntime::default();

        let error = drive(
            &mut terminal,
            &mut controller,
            &mut runtime,
            scripted_events(vec![
                Ok(None),
                Ok(Some(Event::Key(KeyEvent::new(
                    KeyCode::Tab,
                    KeyModifiers::NONE,
                )))),
                Err(anyhow!("read event: device gone")),
            ]),
        )
        .expect_err("input failure ends the loop");

        assert!(error.to_string().contains("device gone"));
        assert_eq!(controller.active_type(), DisasterType::Firestorm);
    }

    #[test]
    fn drive_stops_cleanly_on_quit_key() {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("test terminal");
        let mut controller = Controller::new(DisasterType::Earthquake);
        let mut runtime = TestRuntime::default();

        drive(
            &mut terminal,
            &mut controller,
            &mut runtime,
            scripted_events(vec![Ok(Some(Event::Key(KeyEvent::new(
                KeyCode::Char('q'),
                KeyModifiers::NONE,
            ))))]),
        )
        .expect("quit is not an error");
        assert_eq!(
            runtime.transport.calls(),
            vec![TransportCall::FetchAll(DisasterType::Earthquake)]
        );
    }
}
