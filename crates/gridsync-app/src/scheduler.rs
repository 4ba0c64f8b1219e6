// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::actions::MutationRequest;
use crate::export::ExportRequest;
use crate::ids::{ColumnKey, NavigationToken, TimerToken};
use crate::model::{GridDescriptor, GridSlice, PaginationType, ScrollPolicy, SortDirection, TransportError};
use crate::query::{QueryFragment, decode, encode, merge_into_url};
use crate::state::{ChangeKind, GridCommand, PagePosition, TableState};
use crate::validation::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    PendingDebounce,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationReason {
    StateChange,
    /// Only column visibility differs from the synced query; the same rows
    /// come back.
    LayoutChange,
    OverflowCorrection,
    Visit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub token: NavigationToken,
    pub url: Url,
    /// Props to reload; empty means the whole page.
    pub only: Vec<String>,
    pub preserve_state: bool,
    pub scroll: ScrollPolicy,
    pub reason: NavigationReason,
}

impl NavigationRequest {
    pub fn preserve_scroll(&self) -> bool {
        self.scroll == ScrollPolicy::Preserve
    }

    /// Whether the rows this request returns can differ from the ones on
    /// screen, which invalidates the selection.
    pub fn changes_rows(&self) -> bool {
        self.reason != NavigationReason::LayoutChange
    }
}

/// Work the runtime performs on the controller's behalf. Results come back
/// through the matching `on_*` entry point with the same token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Navigate(NavigationRequest),
    AbortNavigation(NavigationToken),
    StartTimer { token: TimerToken, delay: Duration },
    ReplaceLocation(Url),
    ResetHorizontalScroll,
    Mutate(MutationRequest),
    SubmitExport(ExportRequest),
    Download(Url),
    OpenLink(Url),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSettle {
    pub reason: NavigationReason,
    pub result: Result<GridSlice, String>,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight {
    token: NavigationToken,
    url: Url,
    fragment: QueryFragment,
    reason: NavigationReason,
}

#[derive(Debug, Clone)]
pub struct NavigationScheduler {
    descriptor: GridDescriptor,
    state: TableState,
    location: Url,
    synced: QueryFragment,
    debounce: Option<TimerToken>,
    in_flight: Option<InFlight>,
    last_timer: TimerToken,
    last_navigation: NavigationToken,
    overflow_corrections: u8,
    max_overflow_corrections: u8,
}

impl NavigationScheduler {
    /// `location` is the address the grid was mounted at; its query is the
    /// initial state and is assumed to match the rows already on screen.
    pub fn new(descriptor: GridDescriptor, location: Url, max_overflow_corrections: u8) -> Self {
        let fragment = QueryFragment::from_url(&location, &descriptor.name);
        let state = decode(&fragment, &descriptor);
        let synced = encode(&state, &descriptor);
        Self {
            descriptor,
            state,
            location,
            synced,
            debounce: None,
            in_flight: None,
            last_timer: TimerToken::default(),
            last_navigation: NavigationToken::default(),
            overflow_corrections: 0,
            max_overflow_corrections,
        }
    }

    pub fn descriptor(&self) -> &GridDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn query(&self) -> QueryFragment {
        encode(&self.state, &self.descriptor)
    }

    pub fn is_navigating(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight.is_some() {
            Phase::InFlight
        } else if self.debounce.is_some() {
            Phase::PendingDebounce
        } else {
            Phase::Idle
        }
    }

    pub fn in_flight_token(&self) -> Option<NavigationToken> {
        self.in_flight.as_ref().map(|in_flight| in_flight.token)
    }

    pub fn overflow_corrections(&self) -> u8 {
        self.overflow_corrections
    }

    /// Direction of the sort in force on `column`, default sort included.
    pub fn is_sorted_by_column(&self, column: &ColumnKey) -> Option<SortDirection> {
        self.state
            .effective_sort(&self.descriptor)
            .filter(|sort| &sort.column == column)
            .map(|sort| sort.direction)
    }

    pub fn dispatch(&mut self, command: GridCommand) -> Vec<Effect> {
        let Some(kind) = self.state.apply(&command, &self.descriptor) else {
            debug!(grid = %self.descriptor.name, command = command.name(), "no-op command");
            return Vec::new();
        };
        let coercions = normalize(&mut self.state, &self.descriptor);
        if !coercions.is_empty() {
            debug!(
                grid = %self.descriptor.name,
                command = command.name(),
                count = coercions.len(),
                "state coerced before scheduling"
            );
        }

        match kind {
            ChangeKind::ClientOnly => {
                self.location = merge_into_url(&self.location, &self.query(), &self.descriptor.name);
                debug!(grid = %self.descriptor.name, url = %self.location, "replacing location");
                let mut effects = Vec::new();
                if matches!(command, GridCommand::UndoSticky(_)) {
                    effects.push(Effect::ResetHorizontalScroll);
                }
                effects.push(Effect::ReplaceLocation(self.location.clone()));
                effects
            }
            ChangeKind::Immediate => {
                self.overflow_corrections = 0;
                self.debounce = None;
                self.navigate(NavigationReason::StateChange)
            }
            ChangeKind::Debounced => {
                self.overflow_corrections = 0;
                self.last_timer = self.last_timer.next();
                self.debounce = Some(self.last_timer);
                debug!(grid = %self.descriptor.name, token = %self.last_timer, "debouncing navigation");
                vec![Effect::StartTimer {
                    token: self.last_timer,
                    delay: self.descriptor.debounce(),
                }]
            }
        }
    }

    pub fn on_timer(&mut self, token: TimerToken) -> Vec<Effect> {
        if self.debounce != Some(token) {
            debug!(grid = %self.descriptor.name, %token, "ignoring stale timer");
            return Vec::new();
        }
        self.debounce = None;
        self.navigate(NavigationReason::StateChange)
    }

    /// Navigates to `url` (an action's follow-up) and adopts its query once
    /// the server answers.
    pub fn visit(&mut self, url: Url) -> Vec<Effect> {
        self.debounce = None;
        self.overflow_corrections = 0;
        let fragment = QueryFragment::from_url(&url, &self.descriptor.name);
        self.issue(url, fragment, NavigationReason::Visit, ScrollPolicy::Preserve)
    }

    /// `None` for stale or cancelled settles; neither changes anything.
    pub fn on_navigation_settled(
        &mut self,
        token: NavigationToken,
        result: Result<GridSlice, TransportError>,
    ) -> Option<NavigationSettle> {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.token == token => in_flight,
            other => {
                self.in_flight = other;
                debug!(grid = %self.descriptor.name, %token, "ignoring stale navigation settle");
                return None;
            }
        };

        let slice = match result {
            Ok(slice) => slice,
            Err(TransportError::Cancelled) => {
                debug!(grid = %self.descriptor.name, %token, "navigation cancelled");
                return None;
            }
            Err(TransportError::Failed(message)) => {
                warn!(grid = %self.descriptor.name, %token, error = %message, "navigation failed");
                return Some(NavigationSettle {
                    reason: in_flight.reason,
                    result: Err(message),
                    effects: Vec::new(),
                });
            }
        };

        self.location = slice
            .url
            .as_deref()
            .and_then(|reported| in_flight.url.join(reported).ok())
            .unwrap_or(in_flight.url);
        if in_flight.reason == NavigationReason::Visit {
            let fragment = QueryFragment::from_url(&self.location, &self.descriptor.name);
            self.state = decode(&fragment, &self.descriptor);
            self.synced = encode(&self.state, &self.descriptor);
        } else {
            self.synced = in_flight.fragment;
        }
        debug!(grid = %self.descriptor.name, %token, url = %self.location, "navigation settled");

        let effects = self.correct_overflow(&slice);
        Some(NavigationSettle {
            reason: in_flight.reason,
            result: Ok(slice),
            effects,
        })
    }

    fn correct_overflow(&mut self, slice: &GridSlice) -> Vec<Effect> {
        if self.descriptor.pagination_type != PaginationType::Full || self.in_flight.is_some() {
            return Vec::new();
        }
        let (Some(current), Some(last)) = (slice.pagination.current_page, slice.pagination.last_page)
        else {
            self.overflow_corrections = 0;
            return Vec::new();
        };
        let target = last.max(1);
        if current <= target {
            self.overflow_corrections = 0;
            return Vec::new();
        }
        if self.overflow_corrections >= self.max_overflow_corrections {
            warn!(
                grid = %self.descriptor.name,
                current,
                last,
                attempts = self.overflow_corrections,
                "server keeps reporting a page past the end; giving up"
            );
            return Vec::new();
        }

        self.overflow_corrections += 1;
        info!(grid = %self.descriptor.name, current, target, "page past the end, moving to last page");
        self.state.position = PagePosition::Page(target);
        let fragment = self.query();
        let url = merge_into_url(&self.location, &fragment, &self.descriptor.name);
        let scroll = self.descriptor.scroll_policy;
        self.issue(url, fragment, NavigationReason::OverflowCorrection, scroll)
    }

    fn navigate(&mut self, reason: NavigationReason) -> Vec<Effect> {
        let fragment = self.query();

        if let Some(in_flight) = &self.in_flight
            && in_flight.fragment.same_server_query(&fragment)
        {
            debug!(grid = %self.descriptor.name, token = %in_flight.token, "request in flight already covers this state");
            return Vec::new();
        }

        if fragment.same_server_query(&self.synced) {
            let mut effects = Vec::new();
            if let Some(in_flight) = self.in_flight.take() {
                effects.push(Effect::AbortNavigation(in_flight.token));
            }
            self.location = merge_into_url(&self.location, &fragment, &self.descriptor.name);
            debug!(grid = %self.descriptor.name, "state matches server, skipping request");
            effects.push(Effect::ReplaceLocation(self.location.clone()));
            return effects;
        }

        let reason = if reason == NavigationReason::StateChange && fragment.same_rows(&self.synced) {
            NavigationReason::LayoutChange
        } else {
            reason
        };
        let url = merge_into_url(&self.location, &fragment, &self.descriptor.name);
        self.issue(url, fragment, reason, ScrollPolicy::Preserve)
    }

    fn issue(
        &mut self,
        url: Url,
        fragment: QueryFragment,
        reason: NavigationReason,
        scroll: ScrollPolicy,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(previous) = self.in_flight.take() {
            debug!(grid = %self.descriptor.name, token = %previous.token, "aborting superseded navigation");
            effects.push(Effect::AbortNavigation(previous.token));
        }

        self.last_navigation = self.last_navigation.next();
        let token = self.last_navigation;
        info!(grid = %self.descriptor.name, %token, %url, ?reason, "navigating");
        self.in_flight = Some(InFlight {
            token,
            url: url.clone(),
            fragment,
            reason,
        });
        effects.push(Effect::Navigate(NavigationRequest {
            token,
            url,
            only: self.descriptor.partial_reload_keys(),
            preserve_state: true,
            scroll,
            reason,
        }));
        effects
    }
}
