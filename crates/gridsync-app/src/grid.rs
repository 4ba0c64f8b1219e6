// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeSet, VecDeque};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use url::Url;

use crate::actions::{
    ActionError, ActionExecutor, ActionFailure, ActionStep, ActionSuccess, ConfirmationPrompt,
    CustomHandle, MutationResponse,
};
use crate::export::{ExportError, ExportOutcome, ExportResponse, ExportStep, ExportTracker};
use crate::ids::{
    ActionKey, ActionToken, ColumnKey, ExportKey, ExportToken, FilterKey, NavigationToken, RowId,
    TimerToken,
};
use crate::model::{
    Clause, FilterValue, GridDescriptor, GridPage, GridSlice, PaginationMeta, Row, SortDirection,
    SortSpec, TransportError,
};
use crate::options::{GridOptions, Phrase};
use crate::scheduler::{Effect, NavigationScheduler};
use crate::selection::{ActionTargets, SelectionState, SelectionTarget};
use crate::state::{GridCommand, TableState};
use crate::sticky::{ScrollMetrics, StickyLayout};

/// Things the shell should tell the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    RowsLoaded,
    NavigationFailed(String),
    ConfirmationRequested(ConfirmationPrompt),
    CustomActionStarted(CustomHandle),
    ActionSucceeded(ActionSuccess),
    ActionFailed(ActionFailure),
    ExportFinished {
        export: ExportKey,
        outcome: ExportOutcome,
    },
    ExportFailed {
        export: ExportKey,
        error: String,
    },
}

/// One grid instance: table state, scheduling, selection, actions, exports
/// and sticky layout behind the API the shell drives.
#[derive(Debug, Clone)]
pub struct GridController {
    options: GridOptions,
    scheduler: NavigationScheduler,
    selection: SelectionState,
    actions: ActionExecutor,
    exports: ExportTracker,
    sticky: StickyLayout,
    rows: Vec<Row>,
    pagination: PaginationMeta,
    events: VecDeque<GridEvent>,
}

impl GridController {
    pub fn new(page: GridPage, options: GridOptions) -> Result<Self> {
        page.descriptor
            .validate()
            .with_context(|| format!("invalid descriptor for grid {}", page.descriptor.name))?;
        let location = Url::parse(&page.url)
            .with_context(|| format!("invalid grid location {}", page.url))?;
        let scheduler =
            NavigationScheduler::new(page.descriptor, location, options.max_overflow_corrections);
        let mut sticky = StickyLayout::default();
        sticky.add();
        Ok(Self {
            options,
            scheduler,
            selection: SelectionState::default(),
            actions: ActionExecutor::default(),
            exports: ExportTracker::default(),
            sticky,
            rows: page.slice.rows,
            pagination: page.slice.pagination,
            events: VecDeque::new(),
        })
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn descriptor(&self) -> &GridDescriptor {
        self.scheduler.descriptor()
    }

    pub fn state(&self) -> &TableState {
        self.scheduler.state()
    }

    pub fn location(&self) -> &Url {
        self.scheduler.location()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn pagination(&self) -> &PaginationMeta {
        &self.pagination
    }

    pub fn visible_columns(&self) -> Vec<ColumnKey> {
        self.state().visible_columns(self.descriptor())
    }

    pub fn sticky_layout(&self) -> &StickyLayout {
        &self.sticky
    }

    pub fn drain_events(&mut self) -> Vec<GridEvent> {
        self.events.drain(..).collect()
    }

    pub fn set_filter(&mut self, key: FilterKey, clause: Clause, value: FilterValue) -> Vec<Effect> {
        self.dispatch(GridCommand::SetFilter { key, clause, value })
    }

    pub fn add_filter(&mut self, key: FilterKey) -> Vec<Effect> {
        self.dispatch(GridCommand::AddFilter(key))
    }

    pub fn remove_filter(&mut self, key: FilterKey) -> Vec<Effect> {
        self.dispatch(GridCommand::RemoveFilter(key))
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) -> Vec<Effect> {
        self.dispatch(GridCommand::SetSort(sort))
    }

    pub fn set_search(&mut self, search: impl Into<String>) -> Vec<Effect> {
        self.dispatch(GridCommand::SetSearch(search.into()))
    }

    pub fn set_per_page(&mut self, per_page: u32) -> Vec<Effect> {
        self.dispatch(GridCommand::SetPerPage(per_page))
    }

    pub fn toggle_column(&mut self, column: ColumnKey) -> Vec<Effect> {
        self.dispatch(GridCommand::ToggleColumn(column))
    }

    pub fn make_sticky(&mut self, column: ColumnKey) -> Vec<Effect> {
        self.dispatch(GridCommand::MakeSticky(column))
    }

    pub fn undo_sticky(&mut self, column: ColumnKey) -> Vec<Effect> {
        self.dispatch(GridCommand::UndoSticky(column))
    }

    pub fn go_to_page(&mut self, page: u32) -> Vec<Effect> {
        self.dispatch(GridCommand::GoToPage(page))
    }

    pub fn set_cursor(&mut self, cursor: Option<String>) -> Vec<Effect> {
        self.dispatch(GridCommand::SetCursor(cursor))
    }

    pub fn is_navigating(&self) -> bool {
        self.scheduler.is_navigating()
    }

    pub fn is_sorted_by_column(&self, column: &ColumnKey) -> Option<SortDirection> {
        self.scheduler.is_sorted_by_column(column)
    }

    pub fn selected_ids(&self) -> &BTreeSet<RowId> {
        self.selection.selected_ids()
    }

    pub fn all_selected(&self) -> bool {
        self.selection.all_selected()
    }

    pub fn toggle(&mut self, target: SelectionTarget) {
        self.selection.toggle(target);
    }

    pub fn toggle_page(&mut self) {
        let page: Vec<RowId> = self.rows.iter().map(|row| row.id).collect();
        self.selection.toggle_page(&page);
    }

    pub fn is_performing(&self) -> bool {
        self.actions.is_performing()
    }

    pub fn is_exporting(&self) -> bool {
        self.exports.is_exporting()
    }

    pub fn pending_confirmation(&self) -> Option<&ConfirmationPrompt> {
        self.actions.pending_confirmation()
    }

    /// Runs an action against `targets`, or against the current selection
    /// when `targets` is `None`.
    pub fn execute(
        &mut self,
        key: &ActionKey,
        targets: Option<ActionTargets>,
    ) -> Result<Vec<Effect>, ActionError> {
        let action = self
            .descriptor()
            .action(key)
            .cloned()
            .ok_or_else(|| ActionError::UnknownAction(key.clone()))?;
        let targets = targets.unwrap_or_else(|| self.selection.targets());
        let query = self.scheduler.query().to_query_string(&self.descriptor().name);
        let step = self.actions.execute(&action, targets, &query)?;
        Ok(self.follow_step(step))
    }

    pub fn confirm(&mut self) -> Vec<Effect> {
        match self.actions.confirm() {
            Some(step) => self.follow_step(step),
            None => Vec::new(),
        }
    }

    pub fn cancel_confirmation(&mut self) -> bool {
        self.actions.cancel_confirmation()
    }

    pub fn mark_complete(&mut self, token: ActionToken) -> bool {
        self.actions.mark_complete(token, &mut self.selection)
    }

    pub fn export(&mut self, key: &ExportKey) -> Result<Vec<Effect>, ExportError> {
        let export = self
            .descriptor()
            .export(key)
            .cloned()
            .ok_or_else(|| ExportError::UnknownExport(key.clone()))?;
        let query = self.scheduler.query().to_query_string(&self.descriptor().name);
        Ok(match self.exports.start(&export, &query)? {
            ExportStep::Download(url) => self
                .resolve(&url)
                .map(Effect::Download)
                .into_iter()
                .collect(),
            ExportStep::Submit(request) => vec![Effect::SubmitExport(request)],
        })
    }

    pub fn on_timer(&mut self, token: TimerToken) -> Vec<Effect> {
        let effects = self.scheduler.on_timer(token);
        self.observe(effects)
    }

    pub fn on_navigation_settled(
        &mut self,
        token: NavigationToken,
        result: Result<GridSlice, TransportError>,
    ) -> Vec<Effect> {
        let Some(settle) = self.scheduler.on_navigation_settled(token, result) else {
            return Vec::new();
        };
        match settle.result {
            Ok(slice) => {
                self.rows = slice.rows;
                self.pagination = slice.pagination;
                self.events.push_back(GridEvent::RowsLoaded);
            }
            Err(message) => self.events.push_back(GridEvent::NavigationFailed(message)),
        }
        self.observe(settle.effects)
    }

    pub fn on_mutation_settled(
        &mut self,
        token: ActionToken,
        result: Result<MutationResponse, TransportError>,
    ) -> Vec<Effect> {
        let Some(outcome) = self
            .actions
            .on_mutation_settled(token, result, &mut self.selection)
        else {
            return Vec::new();
        };
        match outcome {
            Ok(success) => {
                let destination = success
                    .response
                    .redirect
                    .as_deref()
                    .and_then(|redirect| self.resolve(redirect))
                    .unwrap_or_else(|| self.location().clone());
                self.events.push_back(GridEvent::ActionSucceeded(success));
                let effects = self.scheduler.visit(destination);
                self.observe(effects)
            }
            Err(failure) => {
                self.events.push_back(GridEvent::ActionFailed(failure));
                Vec::new()
            }
        }
    }

    pub fn on_export_settled(
        &mut self,
        token: ExportToken,
        result: Result<ExportResponse, TransportError>,
    ) {
        let fallback = self.options.translations.get(Phrase::ExportProcessing).to_owned();
        let Some(settled) = self.exports.on_settled(token, result, &fallback) else {
            return;
        };
        let event = match settled.outcome {
            Ok(ExportOutcome::Redirect(url)) => GridEvent::ExportFinished {
                export: settled.export,
                outcome: ExportOutcome::Redirect(
                    self.resolve(&url).map_or(url, |resolved| resolved.to_string()),
                ),
            },
            Ok(outcome) => GridEvent::ExportFinished {
                export: settled.export,
                outcome,
            },
            Err(error) => GridEvent::ExportFailed {
                export: settled.export,
                error,
            },
        };
        self.events.push_back(event);
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) {
        self.sticky.on_scroll(metrics);
    }

    pub fn on_resize(&mut self, widths: &[u32]) {
        let sticky_count = self.state().sticky.len();
        self.sticky.on_resize(widths, sticky_count);
    }

    fn dispatch(&mut self, command: GridCommand) -> Vec<Effect> {
        let effects = self.scheduler.dispatch(command);
        self.observe(effects)
    }

    /// Applies the parts of `effects` the controller owns before handing
    /// them to the runtime.
    fn observe(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        for effect in &effects {
            match effect {
                Effect::Navigate(request) if request.changes_rows() => {
                    if !self.selection.is_empty() {
                        debug!(token = %request.token, "clearing selection for new round-trip");
                    }
                    self.selection.clear();
                }
                Effect::ResetHorizontalScroll => self.sticky.reset_horizontal_scroll(),
                _ => {}
            }
        }
        let sticky_count = self.state().sticky.len();
        self.sticky.set_sticky_count(sticky_count);
        effects
    }

    fn follow_step(&mut self, step: ActionStep) -> Vec<Effect> {
        match step {
            ActionStep::AwaitingConfirmation(prompt) => {
                self.events.push_back(GridEvent::ConfirmationRequested(prompt));
                Vec::new()
            }
            ActionStep::Custom(handle) => {
                self.events.push_back(GridEvent::CustomActionStarted(handle));
                Vec::new()
            }
            ActionStep::Mutate(mut request) => match self.resolve(&request.url) {
                Some(url) => {
                    request.url = url.to_string();
                    vec![Effect::Mutate(request)]
                }
                // The executor is already performing; settle it as failed.
                None => {
                    let error = format!("cannot resolve action url {:?}", request.url);
                    self.on_mutation_settled(request.token, Err(TransportError::failed(error)))
                }
            },
            ActionStep::Visit(url) => self
                .resolve(&url)
                .map(Effect::OpenLink)
                .into_iter()
                .collect(),
        }
    }

    fn resolve(&self, target: &str) -> Option<Url> {
        match self.location().join(target) {
            Ok(url) => Some(url),
            Err(error) => {
                warn!(target, %error, "cannot resolve url against grid location");
                None
            }
        }
    }
}
