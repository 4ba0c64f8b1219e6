// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use gridsync_app::validation::parse_filter_input;
use gridsync_app::{
    ActionKind, ActionTargets, ActionToken, ColumnKey, CustomHandle, Effect, ExportOutcome,
    ExportRequest, ExportResponse, ExportToken, FilterKey, GridController, GridEvent, GridSlice,
    MutationRequest, MutationResponse, NavigationRequest, NavigationToken, PagePosition, Phrase,
    ScrollMetrics, SelectionTarget, SortDirection, SortSpec, ThemeMode, TimerToken,
    TransportError,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const SORT_ASC: &str = " ↑";
const SORT_DESC: &str = " ↓";
const STICKY_MARK: &str = "▍";
const SCROLLED_MARK: &str = "◀ ";
const MAX_COLUMN_WIDTH: usize = 32;
const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);

/// The side-effecting half of the shell. Blocking calls run on helper
/// threads through the `spawn_*` defaults; results come back over `tx`.
pub trait GridRuntime {
    fn navigate(&mut self, request: &NavigationRequest) -> Result<GridSlice>;
    fn mutate(&mut self, request: &MutationRequest) -> Result<MutationResponse>;
    fn submit_export(&mut self, request: &ExportRequest) -> Result<ExportResponse>;

    fn spawn_navigate(
        &mut self,
        request: NavigationRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self.navigate(&request).map_err(|error| failed(&error));
        tx.send(InternalEvent::NavigationSettled {
            token: request.token,
            result,
        })
        .map_err(|_| anyhow!("grid event channel closed"))
    }

    fn spawn_mutate(&mut self, request: MutationRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.mutate(&request).map_err(|error| failed(&error));
        tx.send(InternalEvent::MutationSettled {
            token: request.token,
            result,
        })
        .map_err(|_| anyhow!("grid event channel closed"))
    }

    fn spawn_export(&mut self, request: ExportRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.submit_export(&request).map_err(|error| failed(&error));
        tx.send(InternalEvent::ExportSettled {
            token: request.token,
            result,
        })
        .map_err(|_| anyhow!("grid event channel closed"))
    }

    fn schedule_timer(&mut self, token: TimerToken, delay: Duration, tx: Sender<InternalEvent>) {
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = tx.send(InternalEvent::TimerFired(token));
        });
    }

    /// Stops a superseded navigation early. A runtime that cannot abort
    /// lets it finish; the controller drops the stale result.
    fn cancel_navigation(&mut self, _token: NavigationToken) -> Result<()> {
        Ok(())
    }

    /// Runs the embedding application's handler for a custom action. The
    /// shell marks the action complete once this returns.
    fn run_custom(&mut self, handle: &CustomHandle) -> Result<()> {
        info!(action = %handle.action, token = %handle.token, "no handler for custom action");
        Ok(())
    }

    /// Hands a download or link to whatever opens urls on this machine.
    fn open(&mut self, url: &Url) -> Result<()> {
        info!(%url, "open requested");
        Ok(())
    }
}

fn failed(error: &anyhow::Error) -> TransportError {
    TransportError::failed(format!("{error:#}"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    TimerFired(TimerToken),
    NavigationSettled {
        token: NavigationToken,
        result: Result<GridSlice, TransportError>,
    },
    MutationSettled {
        token: ActionToken,
        result: Result<MutationResponse, TransportError>,
    },
    ExportSettled {
        token: ExportToken,
        result: Result<ExportResponse, TransportError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Search,
    FilterValue(FilterKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InputState {
    mode: InputMode,
    buffer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Dialog {
    Filters { cursor: usize },
    Exports,
    Message { title: String, body: String, error: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    location: String,
    selected_row: usize,
    selected_col: usize,
    /// Non-sticky columns scrolled out on the left.
    column_offset: usize,
    input: Option<InputState>,
    dialog: Option<Dialog>,
    help_visible: bool,
    status: Option<String>,
    status_token: u64,
}

impl ViewData {
    fn new(grid: &GridController) -> Self {
        Self {
            location: grid.location().to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    text: Color,
    accent: Color,
    muted: Color,
    cursor: Color,
    danger: Color,
}

impl Palette {
    const fn for_theme(theme: ThemeMode) -> Self {
        match theme {
            ThemeMode::Light => Self {
                text: Color::Black,
                accent: Color::Blue,
                muted: Color::Gray,
                cursor: Color::LightBlue,
                danger: Color::Red,
            },
            ThemeMode::Dark | ThemeMode::System => Self {
                text: Color::White,
                accent: Color::Cyan,
                muted: Color::DarkGray,
                cursor: Color::DarkGray,
                danger: Color::LightRed,
            },
        }
    }
}

pub fn run_app<R: GridRuntime>(grid: &mut GridController, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(grid);
    let (internal_tx, internal_rx) = mpsc::channel();
    grid.on_resize(&column_widths(grid));

    let mut result = Ok(());
    loop {
        process_internal_events(grid, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, grid, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(grid, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => grid.on_resize(&column_widths(grid)),
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: GridRuntime>(
    grid: &mut GridController,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        let effects = match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                view_data.status = None;
                continue;
            }
            InternalEvent::ClearStatus { .. } => continue,
            InternalEvent::TimerFired(token) => grid.on_timer(token),
            InternalEvent::NavigationSettled { token, result } => {
                grid.on_navigation_settled(token, result)
            }
            InternalEvent::MutationSettled { token, result } => {
                grid.on_mutation_settled(token, result)
            }
            InternalEvent::ExportSettled { token, result } => {
                grid.on_export_settled(token, result);
                Vec::new()
            }
        };
        perform(grid, runtime, view_data, tx, effects);
    }
}

/// Carries out controller effects, then reacts to whatever the controller
/// queued for the user.
fn perform<R: GridRuntime>(
    grid: &mut GridController,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    effects: Vec<Effect>,
) {
    let mut queue = VecDeque::from(effects);
    while let Some(effect) = queue.pop_front() {
        let outcome = match effect {
            Effect::Navigate(request) => {
                let token = request.token;
                if let Err(error) = runtime.spawn_navigate(request, tx.clone()) {
                    warn!(%token, error = %format!("{error:#}"), "navigation never started");
                    queue.extend(grid.on_navigation_settled(token, Err(failed(&error))));
                }
                Ok(())
            }
            Effect::AbortNavigation(token) => runtime.cancel_navigation(token),
            Effect::StartTimer { token, delay } => {
                runtime.schedule_timer(token, delay, tx.clone());
                Ok(())
            }
            Effect::ReplaceLocation(url) => {
                view_data.location = url.to_string();
                Ok(())
            }
            Effect::ResetHorizontalScroll => {
                view_data.column_offset = 0;
                Ok(())
            }
            Effect::Mutate(request) => {
                let token = request.token;
                if let Err(error) = runtime.spawn_mutate(request, tx.clone()) {
                    warn!(%token, error = %format!("{error:#}"), "mutation never started");
                    queue.extend(grid.on_mutation_settled(token, Err(failed(&error))));
                }
                Ok(())
            }
            Effect::SubmitExport(request) => {
                let token = request.token;
                if let Err(error) = runtime.spawn_export(request, tx.clone()) {
                    warn!(%token, error = %format!("{error:#}"), "export never started");
                    grid.on_export_settled(token, Err(failed(&error)));
                }
                Ok(())
            }
            Effect::Download(url) | Effect::OpenLink(url) => {
                let opened = runtime.open(&url);
                if opened.is_ok() {
                    emit_status(view_data, tx, format!("opened {url}"));
                }
                opened
            }
        };
        if let Err(error) = outcome {
            warn!(%error, "runtime effect failed");
            emit_status(view_data, tx, format!("{error:#}"));
        }
    }
    handle_grid_events(grid, runtime, view_data, tx);
}

fn handle_grid_events<R: GridRuntime>(
    grid: &mut GridController,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    for event in grid.drain_events() {
        match event {
            GridEvent::RowsLoaded => {
                view_data.location = grid.location().to_string();
                view_data.selected_row = view_data
                    .selected_row
                    .min(grid.rows().len().saturating_sub(1));
            }
            GridEvent::NavigationFailed(message) => {
                view_data.dialog = Some(Dialog::Message {
                    title: phrase(grid, Phrase::NavigationFailed),
                    body: message,
                    error: true,
                });
            }
            GridEvent::ConfirmationRequested(prompt) => {
                debug!(action = %prompt.action, "awaiting confirmation");
            }
            GridEvent::CustomActionStarted(handle) => {
                if let Err(error) = runtime.run_custom(&handle) {
                    emit_status(view_data, tx, format!("{} failed: {error:#}", handle.action));
                }
                grid.mark_complete(handle.token);
            }
            GridEvent::ActionSucceeded(success) => {
                let text = success.response.message.clone().unwrap_or_else(|| {
                    format!("{} done for {}", success.action, success.targets.describe())
                });
                if success.response.processing {
                    view_data.dialog = Some(Dialog::Message {
                        title: success.action.to_string(),
                        body: text,
                        error: false,
                    });
                } else {
                    emit_status(view_data, tx, text);
                }
            }
            GridEvent::ActionFailed(failure) => {
                view_data.dialog = Some(Dialog::Message {
                    title: phrase(grid, Phrase::ActionFailed),
                    body: format!("{}: {}", failure.action, failure.error),
                    error: true,
                });
            }
            GridEvent::ExportFinished { export, outcome } => match outcome {
                ExportOutcome::Redirect(target) => {
                    let opened = Url::parse(&target)
                        .context("parse export url")
                        .and_then(|url| runtime.open(&url));
                    match opened {
                        Ok(()) => emit_status(view_data, tx, format!("{export} ready: {target}")),
                        Err(error) => emit_status(view_data, tx, format!("{error:#}")),
                    }
                }
                ExportOutcome::Processing { message } => {
                    view_data.dialog = Some(Dialog::Message {
                        title: export.to_string(),
                        body: message,
                        error: false,
                    });
                }
            },
            GridEvent::ExportFailed { export, error } => {
                view_data.dialog = Some(Dialog::Message {
                    title: format!("export {export}"),
                    body: error,
                    error: true,
                });
            }
        }
    }
}

fn phrase(grid: &GridController, phrase: Phrase) -> String {
    grid.options().translations.get(phrase).to_owned()
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    view_data.status = Some(message.into());
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: GridRuntime>(
    grid: &mut GridController,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.input.is_some() {
        handle_input_key(grid, runtime, view_data, internal_tx, key);
        return false;
    }

    if grid.pending_confirmation().is_some() {
        let effects = match key.code {
            KeyCode::Char('y') | KeyCode::Enter => grid.confirm(),
            KeyCode::Char('n') | KeyCode::Esc => {
                grid.cancel_confirmation();
                emit_status(view_data, internal_tx, "cancelled");
                Vec::new()
            }
            _ => Vec::new(),
        };
        perform(grid, runtime, view_data, internal_tx, effects);
        return false;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            view_data.help_visible = false;
        }
        return false;
    }

    match view_data.dialog.clone() {
        Some(Dialog::Message { .. }) => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                view_data.dialog = None;
            }
            return false;
        }
        Some(Dialog::Filters { cursor }) => {
            handle_filter_editor_key(grid, runtime, view_data, internal_tx, cursor, key);
            return false;
        }
        Some(Dialog::Exports) => {
            handle_export_menu_key(grid, runtime, view_data, internal_tx, key);
            return false;
        }
        None => {}
    }

    let effects = match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            Vec::new()
        }
        KeyCode::Char('j') | KeyCode::Down => {
            let last = grid.rows().len().saturating_sub(1);
            view_data.selected_row = (view_data.selected_row + 1).min(last);
            report_scroll(grid, view_data);
            Vec::new()
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.selected_row = view_data.selected_row.saturating_sub(1);
            report_scroll(grid, view_data);
            Vec::new()
        }
        KeyCode::Char('h') | KeyCode::Left => {
            move_column(grid, view_data, -1);
            Vec::new()
        }
        KeyCode::Char('l') | KeyCode::Right => {
            move_column(grid, view_data, 1);
            Vec::new()
        }
        KeyCode::Char('H') => {
            scroll_columns(grid, view_data, -1);
            Vec::new()
        }
        KeyCode::Char('L') => {
            scroll_columns(grid, view_data, 1);
            Vec::new()
        }
        KeyCode::Char('/') => {
            view_data.input = Some(InputState {
                mode: InputMode::Search,
                buffer: grid.state().search.clone().unwrap_or_default(),
            });
            Vec::new()
        }
        KeyCode::Char('f') => {
            view_data.dialog = Some(Dialog::Filters { cursor: 0 });
            Vec::new()
        }
        KeyCode::Char('e') => {
            if grid.descriptor().exports.is_empty() {
                emit_status(view_data, internal_tx, "no exports on this grid");
            } else {
                view_data.dialog = Some(Dialog::Exports);
            }
            Vec::new()
        }
        KeyCode::Char('s') => match current_column(grid, view_data) {
            Some(column) => {
                let next = next_sort(&column, grid.is_sorted_by_column(&column));
                grid.set_sort(next)
            }
            None => Vec::new(),
        },
        KeyCode::Char('c') => match current_column(grid, view_data) {
            Some(column) => {
                let effects = grid.toggle_column(column.clone());
                if effects.is_empty() {
                    emit_status(view_data, internal_tx, format!("{column} cannot be hidden"));
                }
                clamp_column(grid, view_data);
                effects
            }
            None => Vec::new(),
        },
        KeyCode::Char('C') => show_hidden_column(grid),
        KeyCode::Char('p') => match current_column(grid, view_data) {
            Some(column) => grid.make_sticky(column),
            None => Vec::new(),
        },
        KeyCode::Char('P') => match current_column(grid, view_data) {
            Some(column) => grid.undo_sticky(column),
            None => Vec::new(),
        },
        KeyCode::Char('+') => step_per_page(grid, 1),
        KeyCode::Char('-') => step_per_page(grid, -1),
        KeyCode::Char('n') => next_page(grid),
        KeyCode::Char('b') => previous_page(grid),
        KeyCode::Char(' ') => {
            if grid.all_selected() {
                emit_status(
                    view_data,
                    internal_tx,
                    phrase(grid, Phrase::AllMatchingSelected),
                );
            } else if let Some(row) = grid.rows().get(view_data.selected_row) {
                let id = row.id;
                grid.toggle(SelectionTarget::Row(id));
            }
            Vec::new()
        }
        KeyCode::Char('*') => {
            grid.toggle(SelectionTarget::All);
            Vec::new()
        }
        KeyCode::Char('a') => {
            grid.toggle_page();
            Vec::new()
        }
        KeyCode::Char(digit @ '1'..='9') => {
            let index = digit as usize - '1' as usize;
            run_action(grid, view_data, internal_tx, index)
        }
        _ => Vec::new(),
    };
    perform(grid, runtime, view_data, internal_tx, effects);
    false
}

fn handle_input_key<R: GridRuntime>(
    grid: &mut GridController,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(input) = view_data.input.as_mut() else {
        return;
    };
    let mut effects = Vec::new();
    match key.code {
        KeyCode::Esc => view_data.input = None,
        KeyCode::Backspace => {
            input.buffer.pop();
            if input.mode == InputMode::Search {
                effects = grid.set_search(input.buffer.clone());
            }
        }
        KeyCode::Char(ch) => {
            input.buffer.push(ch);
            if input.mode == InputMode::Search {
                effects = grid.set_search(input.buffer.clone());
            }
        }
        KeyCode::Enter => match input.mode.clone() {
            InputMode::Search => view_data.input = None,
            InputMode::FilterValue(key) => {
                let buffer = input.buffer.clone();
                match apply_filter_input(grid, &key, &buffer) {
                    Ok(applied) => {
                        effects = applied;
                        view_data.input = None;
                    }
                    Err(error) => emit_status(view_data, internal_tx, format!("{error:#}")),
                }
            }
        },
        _ => {}
    }
    perform(grid, runtime, view_data, internal_tx, effects);
}

fn apply_filter_input(
    grid: &mut GridController,
    key: &FilterKey,
    input: &str,
) -> Result<Vec<Effect>> {
    let descriptor = grid
        .descriptor()
        .filter(key)
        .ok_or_else(|| anyhow!("unknown filter {key}"))?;
    let filter_type = descriptor.filter_type;
    let clause = grid
        .state()
        .filters
        .get(key)
        .map_or_else(|| descriptor.default_clause(), |filter| filter.clause);
    let value = parse_filter_input(filter_type, clause, input)
        .with_context(|| format!("invalid value for {}", descriptor.label))?;
    Ok(grid.set_filter(key.clone(), clause, value))
}

fn handle_filter_editor_key<R: GridRuntime>(
    grid: &mut GridController,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    cursor: usize,
    key: KeyEvent,
) {
    let filters = &grid.descriptor().filters;
    let last = filters.len().saturating_sub(1);
    let Some(filter) = filters.get(cursor).cloned() else {
        view_data.dialog = None;
        return;
    };
    let current = grid.state().filters.get(&filter.key).cloned();
    let enabled = current.as_ref().is_some_and(|state| state.enabled);

    let effects = match key.code {
        KeyCode::Esc | KeyCode::Char('f') | KeyCode::Char('q') => {
            view_data.dialog = None;
            Vec::new()
        }
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.dialog = Some(Dialog::Filters {
                cursor: (cursor + 1).min(last),
            });
            Vec::new()
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.dialog = Some(Dialog::Filters {
                cursor: cursor.saturating_sub(1),
            });
            Vec::new()
        }
        KeyCode::Enter | KeyCode::Char('a') => {
            let effects = if enabled {
                Vec::new()
            } else {
                grid.add_filter(filter.key.clone())
            };
            let clause = grid
                .state()
                .filters
                .get(&filter.key)
                .map(|state| state.clause);
            if clause.is_some_and(|clause| !clause.is_valueless()) {
                view_data.input = Some(InputState {
                    mode: InputMode::FilterValue(filter.key.clone()),
                    buffer: current
                        .map(|state| state.value.display())
                        .unwrap_or_default(),
                });
            }
            effects
        }
        KeyCode::Char('c') => match current {
            Some(state) if enabled => {
                let clauses = filter.legal_clauses();
                let position = clauses
                    .iter()
                    .position(|clause| *clause == state.clause)
                    .unwrap_or(0);
                let next = clauses[(position + 1) % clauses.len().max(1)];
                grid.set_filter(filter.key.clone(), next, state.value)
            }
            _ => {
                emit_status(view_data, internal_tx, format!("add {} first", filter.label));
                Vec::new()
            }
        },
        KeyCode::Char('d') => grid.remove_filter(filter.key.clone()),
        _ => Vec::new(),
    };
    perform(grid, runtime, view_data, internal_tx, effects);
}

fn handle_export_menu_key<R: GridRuntime>(
    grid: &mut GridController,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let effects = match key.code {
        KeyCode::Char(digit @ '1'..='9') => {
            let index = digit as usize - '1' as usize;
            let Some(export) = grid.descriptor().exports.get(index).map(|export| export.key.clone())
            else {
                return;
            };
            view_data.dialog = None;
            match grid.export(&export) {
                Ok(effects) => effects,
                Err(error) => {
                    emit_status(view_data, internal_tx, error.to_string());
                    Vec::new()
                }
            }
        }
        KeyCode::Esc | KeyCode::Char('e') | KeyCode::Char('q') => {
            view_data.dialog = None;
            Vec::new()
        }
        _ => Vec::new(),
    };
    perform(grid, runtime, view_data, internal_tx, effects);
}

/// Runs the nth authorized action (as numbered in the status line) against
/// the selection, or against the cursor row when nothing is selected.
fn run_action(
    grid: &mut GridController,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    index: usize,
) -> Vec<Effect> {
    let Some(action) = grid
        .descriptor()
        .actions
        .iter()
        .filter(|action| action.authorized)
        .nth(index)
        .cloned()
    else {
        return Vec::new();
    };
    let cursor_row = grid.rows().get(view_data.selected_row).map(|row| row.id);
    let nothing_selected = grid.selected_ids().is_empty() && !grid.all_selected();
    let targets = match (nothing_selected, cursor_row) {
        (true, Some(id)) if action.row => Some(ActionTargets::single(id)),
        _ if !action.bulk && !matches!(action.kind, ActionKind::Link { .. }) => {
            emit_status(view_data, internal_tx, format!("{} is a row action", action.label));
            return Vec::new();
        }
        _ => None,
    };
    match grid.execute(&action.key, targets) {
        Ok(effects) => effects,
        Err(error) => {
            emit_status(view_data, internal_tx, error.to_string());
            Vec::new()
        }
    }
}

fn next_sort(column: &ColumnKey, current: Option<SortDirection>) -> Option<SortSpec> {
    let direction = match current {
        None => SortDirection::Asc,
        Some(SortDirection::Asc) => SortDirection::Desc,
        Some(SortDirection::Desc) => return None,
    };
    Some(SortSpec {
        column: column.clone(),
        direction,
    })
}

fn step_per_page(grid: &mut GridController, delta: isize) -> Vec<Effect> {
    let options = &grid.descriptor().per_page_options;
    if options.is_empty() {
        return Vec::new();
    }
    let current = grid.state().per_page;
    let position = options
        .iter()
        .position(|option| *option == current)
        .unwrap_or(0);
    let next = position.saturating_add_signed(delta).min(options.len() - 1);
    let per_page = options[next];
    grid.set_per_page(per_page)
}

fn next_page(grid: &mut GridController) -> Vec<Effect> {
    let pagination = grid.pagination().clone();
    match grid.state().position.clone() {
        PagePosition::Page(page) => {
            let has_more = pagination.has_more_pages
                || pagination.last_page.is_some_and(|last| page < last);
            if has_more {
                grid.go_to_page(page + 1)
            } else {
                Vec::new()
            }
        }
        PagePosition::Cursor(_) => match pagination.next_cursor {
            Some(cursor) => grid.set_cursor(Some(cursor)),
            None => Vec::new(),
        },
    }
}

fn previous_page(grid: &mut GridController) -> Vec<Effect> {
    let pagination = grid.pagination().clone();
    match grid.state().position.clone() {
        PagePosition::Page(page) if page > 1 => grid.go_to_page(page - 1),
        PagePosition::Page(_) => Vec::new(),
        PagePosition::Cursor(current) => match (pagination.previous_cursor, current) {
            (Some(cursor), _) => grid.set_cursor(Some(cursor)),
            (None, Some(_)) => grid.set_cursor(None),
            (None, None) => Vec::new(),
        },
    }
}

fn show_hidden_column(grid: &mut GridController) -> Vec<Effect> {
    let hidden = grid
        .state()
        .columns
        .iter()
        .find(|(_, visible)| !**visible)
        .map(|(key, _)| key.clone());
    match hidden {
        Some(column) => grid.toggle_column(column),
        None => Vec::new(),
    }
}

fn current_column(grid: &GridController, view_data: &ViewData) -> Option<ColumnKey> {
    grid.visible_columns().get(view_data.selected_col).cloned()
}

fn clamp_column(grid: &GridController, view_data: &mut ViewData) {
    let count = grid.visible_columns().len();
    view_data.selected_col = view_data.selected_col.min(count.saturating_sub(1));
}

fn move_column(grid: &mut GridController, view_data: &mut ViewData, delta: isize) {
    let count = grid.visible_columns().len();
    if count == 0 {
        return;
    }
    view_data.selected_col = view_data
        .selected_col
        .saturating_add_signed(delta)
        .min(count - 1);

    let sticky = grid.state().sticky.len();
    if view_data.selected_col >= sticky && view_data.selected_col < sticky + view_data.column_offset
    {
        view_data.column_offset = view_data.selected_col - sticky;
        report_scroll(grid, view_data);
    }
}

fn scroll_columns(grid: &mut GridController, view_data: &mut ViewData, delta: isize) {
    let scrollable = grid
        .visible_columns()
        .len()
        .saturating_sub(grid.state().sticky.len());
    view_data.column_offset = view_data
        .column_offset
        .saturating_add_signed(delta)
        .min(scrollable.saturating_sub(1));
    report_scroll(grid, view_data);
}

fn report_scroll(grid: &mut GridController, view_data: &ViewData) {
    let widths = column_widths(grid);
    let sticky = grid.state().sticky.len();
    let scroll_left = widths
        .iter()
        .skip(sticky)
        .take(view_data.column_offset)
        .sum();
    grid.on_scroll(ScrollMetrics {
        scroll_left,
        scroll_top: u32::try_from(view_data.selected_row).unwrap_or(u32::MAX),
        table_top: 0,
    });
}

/// Character widths of the visible columns, sized to header and content.
fn column_widths(grid: &GridController) -> Vec<u32> {
    grid.visible_columns()
        .iter()
        .map(|key| {
            let label = grid
                .descriptor()
                .column(key)
                .map_or(0, |column| column.label.chars().count() + SORT_ASC.chars().count() + 1);
            let content = grid
                .rows()
                .iter()
                .map(|row| row.cell_text(key).chars().count())
                .max()
                .unwrap_or(0);
            u32::try_from(label.max(content).min(MAX_COLUMN_WIDTH)).unwrap_or(0)
        })
        .collect()
}

/// Sticky columns first, then the scrollable ones past the offset.
fn displayed_columns(grid: &GridController, column_offset: usize) -> Vec<ColumnKey> {
    let visible = grid.visible_columns();
    let sticky = grid.state().sticky.len().min(visible.len());
    visible[..sticky]
        .iter()
        .chain(visible[sticky..].iter().skip(column_offset))
        .cloned()
        .collect()
}

fn render(frame: &mut ratatui::Frame<'_>, grid: &GridController, view_data: &ViewData) {
    let palette = Palette::for_theme(grid.options().theme);
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let title = Paragraph::new(view_data.location.clone())
        .style(Style::default().fg(palette.muted))
        .block(
            Block::default()
                .title(format!("gridsync · {}", grid.descriptor().name))
                .borders(Borders::ALL)
                .style(Style::default().fg(palette.accent)),
        );
    frame.render_widget(title, layout[0]);

    render_table(frame, layout[1], grid, view_data, palette);

    let footer = Paragraph::new(status_text(grid, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title(footer_text(grid)));
    frame.render_widget(footer, layout[2]);

    if let Some(prompt) = grid.pending_confirmation() {
        let area = centered_rect(60, 30, frame.area());
        frame.render_widget(Clear, area);
        let dialog = Paragraph::new(confirmation_text(grid, prompt)).block(
            Block::default()
                .title(prompt.title.clone())
                .borders(Borders::ALL)
                .style(Style::default().fg(palette.danger)),
        );
        frame.render_widget(dialog, area);
        return;
    }

    match &view_data.dialog {
        Some(Dialog::Filters { cursor }) => {
            let area = centered_rect(64, 50, frame.area());
            frame.render_widget(Clear, area);
            let editor = Paragraph::new(filter_editor_text(grid, *cursor))
                .block(Block::default().title("filters").borders(Borders::ALL));
            frame.render_widget(editor, area);
        }
        Some(Dialog::Exports) => {
            let area = centered_rect(48, 30, frame.area());
            frame.render_widget(Clear, area);
            let menu = Paragraph::new(export_menu_text(grid))
                .block(Block::default().title("export").borders(Borders::ALL));
            frame.render_widget(menu, area);
        }
        Some(Dialog::Message { title, body, error }) => {
            let area = centered_rect(60, 30, frame.area());
            frame.render_widget(Clear, area);
            let color = if *error { palette.danger } else { palette.accent };
            let message = Paragraph::new(body.clone()).block(
                Block::default()
                    .title(title.clone())
                    .borders(Borders::ALL)
                    .style(Style::default().fg(color)),
            );
            frame.render_widget(message, area);
        }
        None => {}
    }

    if view_data.help_visible {
        let area = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    grid: &GridController,
    view_data: &ViewData,
    palette: Palette,
) {
    let visible = grid.visible_columns();
    let displayed = displayed_columns(grid, view_data.column_offset);
    let widths = column_widths(grid);
    let width_of = |key: &ColumnKey| {
        visible
            .iter()
            .position(|column| column == key)
            .and_then(|index| widths.get(index))
            .map_or(8, |width| u16::try_from(*width).unwrap_or(8).max(3))
    };
    let selected_key = visible.get(view_data.selected_col);

    let mut constraints = vec![Constraint::Length(3)];
    constraints.extend(displayed.iter().map(|key| Constraint::Length(width_of(key))));

    let mut header_cells = vec![Cell::from(selection_header(grid))];
    header_cells.extend(displayed.iter().map(|key| {
        Cell::from(header_label(grid, key)).style(
            Style::default()
                .fg(palette.text)
                .add_modifier(Modifier::BOLD),
        )
    }));
    let header = Row::new(header_cells);

    let rows = grid.rows().iter().enumerate().map(|(row_index, row)| {
        let cursor_row = row_index == view_data.selected_row;
        let marker = if grid.all_selected() {
            "[*]"
        } else if grid.selected_ids().contains(&row.id) {
            "[x]"
        } else {
            "[ ]"
        };
        let mut cells = vec![Cell::from(marker)];
        cells.extend(displayed.iter().map(|key| {
            let mut style = Style::default();
            if grid.state().sticky.contains(key) {
                style = style.add_modifier(Modifier::BOLD);
            }
            if cursor_row {
                style = style.bg(palette.cursor);
            }
            if cursor_row && selected_key == Some(key) {
                style = Style::default()
                    .fg(Color::Black)
                    .bg(palette.accent)
                    .add_modifier(Modifier::BOLD);
            }
            Cell::from(row.cell_text(key)).style(style)
        }));
        Row::new(cells)
    });

    let table = Table::new(rows, constraints)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(grid, view_data))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);

    if grid.rows().is_empty() {
        let inner = Rect {
            x: area.x.saturating_add(2),
            y: area.y.saturating_add(2),
            width: area.width.saturating_sub(4),
            height: 1.min(area.height),
        };
        frame.render_widget(
            Paragraph::new(phrase(grid, Phrase::NoRows)).style(Style::default().fg(palette.muted)),
            inner,
        );
    }
}

fn selection_header(grid: &GridController) -> &'static str {
    if grid.all_selected() { "[*]" } else { "[ ]" }
}

fn header_label(grid: &GridController, key: &ColumnKey) -> String {
    let mut label = grid
        .descriptor()
        .column(key)
        .map_or_else(|| key.to_string(), |column| column.label.clone());
    if grid.state().sticky.contains(key) {
        label.insert_str(0, STICKY_MARK);
    }
    match grid.is_sorted_by_column(key) {
        Some(SortDirection::Asc) => label.push_str(SORT_ASC),
        Some(SortDirection::Desc) => label.push_str(SORT_DESC),
        None => {}
    }
    label
}

fn table_title(grid: &GridController, view_data: &ViewData) -> String {
    let mut parts = Vec::new();
    if let Some(search) = &grid.state().search {
        parts.push(format!("{} {search:?}", phrase(grid, Phrase::Search)));
    }
    let filters: Vec<String> = grid
        .state()
        .active_filters()
        .map(|(key, filter)| {
            let value = filter.value.display();
            if value.is_empty() {
                format!("{key} {}", filter.clause.as_str())
            } else {
                format!("{key} {} {value}", filter.clause.as_str())
            }
        })
        .collect();
    if !filters.is_empty() {
        parts.push(format!("filters: {}", filters.join("; ")));
    }
    let scrolled = if grid.sticky_layout().horizontally_scrolled() && view_data.column_offset > 0 {
        SCROLLED_MARK
    } else {
        ""
    };
    if parts.is_empty() {
        format!("{scrolled}{}", grid.descriptor().name)
    } else {
        format!("{scrolled}{} · {}", grid.descriptor().name, parts.join(" · "))
    }
}

fn footer_text(grid: &GridController) -> String {
    let pagination = grid.pagination();
    let state = grid.state();
    let mut parts = Vec::new();

    match &state.position {
        PagePosition::Page(page) => match pagination.last_page {
            Some(last) => parts.push(format!("page {page}/{last}")),
            None => parts.push(format!("page {page}")),
        },
        PagePosition::Cursor(cursor) => {
            let more = if pagination.next_cursor.is_some() { "more" } else { "end" };
            let at = if cursor.is_some() { "cursor" } else { "first" };
            parts.push(format!("{at} · {more}"));
        }
    }
    if let Some(total) = pagination.total {
        parts.push(format!("{total} rows"));
    }
    parts.push(format!("{}/page", state.per_page));

    if grid.all_selected() {
        parts.push(phrase(grid, Phrase::AllMatchingSelected));
    } else if !grid.selected_ids().is_empty() {
        parts.push(format!("{} selected", grid.selected_ids().len()));
    }
    if grid.is_navigating() {
        parts.push(format!("{}…", phrase(grid, Phrase::Navigating)));
    }
    if grid.is_performing() {
        parts.push("working…".to_owned());
    }
    if grid.is_exporting() {
        parts.push("exporting…".to_owned());
    }
    format!(" {} ", parts.join(" · "))
}

fn status_text(grid: &GridController, view_data: &ViewData) -> String {
    if let Some(input) = &view_data.input {
        let prompt = match &input.mode {
            InputMode::Search => phrase(grid, Phrase::Search),
            InputMode::FilterValue(key) => {
                let clause = grid
                    .state()
                    .filters
                    .get(key)
                    .map(|filter| filter.clause.as_str())
                    .unwrap_or_default();
                format!("{key} {clause}")
            }
        };
        return format!("{prompt}: {}_", input.buffer);
    }
    if let Some(status) = &view_data.status {
        return status.clone();
    }
    let actions = grid
        .descriptor()
        .actions
        .iter()
        .filter(|action| action.authorized)
        .take(9)
        .enumerate()
        .map(|(index, action)| {
            let icon = action
                .icon
                .as_deref()
                .and_then(|name| grid.options().icons.resolve(name))
                .map(|glyph| format!("{glyph} "))
                .unwrap_or_default();
            format!("{} {icon}{}", index + 1, action.label)
        })
        .collect::<Vec<_>>();
    let mut hints = "/ search · f filters · s sort · c hide · p pin · n/b page · ? help".to_owned();
    if !actions.is_empty() {
        hints.push_str(" | ");
        hints.push_str(&actions.join(" · "));
    }
    hints
}

fn confirmation_text(grid: &GridController, prompt: &gridsync_app::ConfirmationPrompt) -> String {
    let confirm = prompt
        .confirm_label
        .clone()
        .unwrap_or_else(|| phrase(grid, Phrase::Confirm));
    let cancel = prompt
        .cancel_label
        .clone()
        .unwrap_or_else(|| phrase(grid, Phrase::Cancel));
    let message = if prompt.message.is_empty() {
        phrase(grid, Phrase::ConfirmTitle)
    } else {
        prompt.message.clone()
    };
    format!(
        "{message}\n\n{} will run on {}.\n\ny {confirm} · n {cancel}",
        prompt.action,
        prompt.targets.describe()
    )
}

fn filter_editor_text(grid: &GridController, cursor: usize) -> String {
    let mut lines = Vec::new();
    for (index, filter) in grid.descriptor().filters.iter().enumerate() {
        let pointer = if index == cursor { ">" } else { " " };
        let detail = match grid.state().filters.get(&filter.key) {
            Some(state) if state.enabled => {
                let value = state.value.display();
                if value.is_empty() {
                    state.clause.as_str().to_owned()
                } else {
                    format!("{} {value}", state.clause.as_str())
                }
            }
            _ => "-".to_owned(),
        };
        lines.push(format!("{pointer} {:<12} {detail}", filter.label));
    }
    lines.push(String::new());
    lines.push("enter add/edit · c clause · d remove · esc close".to_owned());
    lines.join("\n")
}

fn export_menu_text(grid: &GridController) -> String {
    grid.descriptor()
        .exports
        .iter()
        .enumerate()
        .map(|(index, export)| {
            let suffix = if export.queued { " (queued)" } else { "" };
            let locked = if export.authorized { "" } else { " [not allowed]" };
            format!("{} {}{suffix}{locked}", index + 1, export.label)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn help_overlay_text() -> &'static str {
    "j/k rows · h/l columns · H/L scroll\n\
/ search · f filters (enter edit, c clause, d remove)\n\
s sort column · c hide column · C show hidden\n\
p pin through column · P unpin from column\n\
+/- rows per page · n/b next/previous page\n\
space select row · a select page · * all matching\n\
1-9 run action · e export · y/n confirm\n\
q quit"
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
