// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use gridsync_app::{
    ActionToken, Effect, ExportRequest, GridController, GridDescriptor, GridOptions, GridPage,
    GridSlice, MutationRequest, MutationResponse, NavigationRequest, PaginationMeta, Row, RowId,
    TimerToken, TransportError,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;
use time::{Date, Month};
use url::Url;

const FIRST_NAMES: [&str; 16] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Elliot", "Robin", "Cameron", "Hayden", "Rowan",
];
const LAST_NAMES: [&str; 18] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Campbell", "Turner", "Flores", "Bennett", "Price", "Morris", "Foster", "Brooks",
];
const ROLES: [&str; 4] = ["admin", "editor", "viewer", "billing"];
const DOMAINS: [&str; 3] = ["example.test", "corp.example", "mail.example"];

const REFERENCE_YEAR: i32 = 2026;

pub const FIXTURE_LOCATION: &str = "https://example.test/admin/users";

/// Grid used across the workspace's tests: sortable name/age, a hidden
/// notes column, one filter of every type, and one action of every kind.
pub fn users_descriptor() -> GridDescriptor {
    serde_json::from_value(serde_json::json!({
        "name": "users",
        "columns": [
            {"key": "name", "label": "Name", "toggleable": false, "sortable": true},
            {"key": "email", "label": "Email", "sortable": true},
            {"key": "role", "label": "Role"},
            {"key": "age", "label": "Age", "sortable": true},
            {"key": "joined", "label": "Joined"},
            {"key": "notes", "label": "Notes", "visible_by_default": false, "stickable": false}
        ],
        "filters": [
            {"key": "name", "label": "Name", "type": "text"},
            {"key": "age", "label": "Age", "type": "numeric"},
            {"key": "role", "label": "Role", "type": "set", "options": [
                {"value": "admin", "label": "Admin"},
                {"value": "editor", "label": "Editor"},
                {"value": "viewer", "label": "Viewer"},
                {"value": "billing", "label": "Billing"}
            ]},
            {"key": "active", "label": "Active", "type": "boolean"},
            {"key": "joined", "label": "Joined", "type": "date"}
        ],
        "actions": [
            {"key": "delete", "label": "Delete", "url": "/admin/users/delete",
             "confirmation": {"title": "Delete users?", "message": "This cannot be undone."},
             "style": "danger"},
            {"key": "archive", "label": "Archive", "custom": true},
            {"key": "edit", "label": "Edit", "link": "/admin/users/{id}/edit", "bulk": false},
            {"key": "purge", "label": "Purge", "url": "/admin/users/purge", "authorized": false}
        ],
        "exports": [
            {"key": "csv", "label": "CSV", "url": "/admin/users/export.csv"},
            {"key": "xlsx", "label": "Excel", "url": "/admin/users/export", "format": "xlsx", "async": true}
        ],
        "default_sort": "name",
        "per_page_options": [15, 30, 50],
        "debounce_ms": 300
    }))
    .expect("users fixture descriptor is valid json")
}

pub fn users_page(location: &str, rows: Vec<Row>) -> GridPage {
    let total = rows.len() as u64;
    GridPage {
        descriptor: users_descriptor(),
        url: location.to_owned(),
        slice: GridSlice {
            url: None,
            rows,
            pagination: page_meta(1, 1, total),
        },
    }
}

pub fn page_meta(current_page: u32, last_page: u32, total: u64) -> PaginationMeta {
    PaginationMeta {
        current_page: Some(current_page),
        last_page: Some(last_page),
        per_page: None,
        total: Some(total),
        next_cursor: None,
        previous_cursor: None,
        has_more_pages: current_page < last_page,
    }
}

pub fn slice(rows: Vec<Row>, current_page: u32, last_page: u32) -> GridSlice {
    let total = rows.len() as u64;
    GridSlice {
        url: None,
        rows,
        pagination: page_meta(current_page, last_page, total),
    }
}

#[derive(Debug, Clone, Copy)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator for user rows; the same seed yields the same rows.
#[derive(Debug, Clone)]
pub struct UserFaker {
    rng: DeterministicRng,
    next_id: i64,
}

impl UserFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1,
        }
    }

    pub fn row(&mut self) -> Row {
        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        let domain = self.pick(&DOMAINS);
        let id = self.next_id;
        self.next_id += 1;

        let mut cells = BTreeMap::new();
        cells.insert("name".into(), serde_json::json!(format!("{first} {last}")));
        cells.insert(
            "email".into(),
            serde_json::json!(format!(
                "{}.{}@{domain}",
                first.to_ascii_lowercase(),
                last.to_ascii_lowercase()
            )),
        );
        cells.insert("role".into(), serde_json::json!(self.pick(&ROLES)));
        cells.insert("age".into(), serde_json::json!(self.int_range(18, 80)));
        cells.insert("joined".into(), serde_json::json!(self.joined()));
        cells.insert("active".into(), serde_json::json!(self.rng.int_n(4) != 0));
        Row {
            id: RowId::new(id),
            cells,
        }
    }

    pub fn rows(&mut self, count: usize) -> Vec<Row> {
        (0..count).map(|_| self.row()).collect()
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }

    fn joined(&mut self) -> String {
        let year = REFERENCE_YEAR - self.int_range(0, 5) as i32;
        let day = self.int_range(1, 28) as u8;
        let month = Month::try_from(self.int_range(1, 12) as u8).unwrap_or(Month::January);
        Date::from_calendar_date(year, month, day)
            .map(|date| date.to_string())
            .unwrap_or_else(|_| format!("{REFERENCE_YEAR}-01-01"))
    }
}

/// Drives a [`GridController`] the way a runtime would, but keeps every
/// outgoing request in a queue so tests decide when and how it settles.
#[derive(Debug)]
pub struct Harness {
    pub grid: GridController,
    pub timers: Vec<(TimerToken, Duration)>,
    pub navigations: VecDeque<NavigationRequest>,
    pub aborted: Vec<gridsync_app::NavigationToken>,
    pub mutations: VecDeque<MutationRequest>,
    pub exports: VecDeque<ExportRequest>,
    pub locations: Vec<Url>,
    pub downloads: Vec<Url>,
    pub links: Vec<Url>,
    pub horizontal_resets: usize,
    /// Every navigation ever issued, in order.
    pub history: Vec<NavigationRequest>,
}

impl Harness {
    pub fn new(page: GridPage) -> Result<Self> {
        Self::with_options(page, GridOptions::default())
    }

    pub fn with_options(page: GridPage, options: GridOptions) -> Result<Self> {
        let grid = GridController::new(page, options).context("mount fixture grid")?;
        Ok(Self {
            grid,
            timers: Vec::new(),
            navigations: VecDeque::new(),
            aborted: Vec::new(),
            mutations: VecDeque::new(),
            exports: VecDeque::new(),
            locations: Vec::new(),
            downloads: Vec::new(),
            links: Vec::new(),
            horizontal_resets: 0,
            history: Vec::new(),
        })
    }

    pub fn users(seed: u64, rows: usize) -> Result<Self> {
        Self::new(users_page(FIXTURE_LOCATION, UserFaker::new(seed).rows(rows)))
    }

    /// Records what the effects ask for. Aborted navigations leave the queue.
    pub fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Navigate(request) => {
                    self.history.push(request.clone());
                    self.navigations.push_back(request);
                }
                Effect::AbortNavigation(token) => {
                    self.aborted.push(token);
                    self.navigations.retain(|request| request.token != token);
                }
                Effect::StartTimer { token, delay } => self.timers.push((token, delay)),
                Effect::ReplaceLocation(url) => self.locations.push(url),
                Effect::ResetHorizontalScroll => self.horizontal_resets += 1,
                Effect::Mutate(request) => self.mutations.push_back(request),
                Effect::SubmitExport(request) => self.exports.push_back(request),
                Effect::Download(url) => self.downloads.push(url),
                Effect::OpenLink(url) => self.links.push(url),
            }
        }
    }

    /// Fires every recorded timer in order; stale ones are ignored by the grid.
    pub fn fire_timers(&mut self) {
        let timers = std::mem::take(&mut self.timers);
        for (token, _) in timers {
            let effects = self.grid.on_timer(token);
            self.run(effects);
        }
    }

    pub fn settle_navigation(
        &mut self,
        result: Result<GridSlice, TransportError>,
    ) -> Option<NavigationRequest> {
        let request = self.navigations.pop_front()?;
        let effects = self.grid.on_navigation_settled(request.token, result);
        self.run(effects);
        Some(request)
    }

    pub fn settle_mutation(
        &mut self,
        result: Result<MutationResponse, TransportError>,
    ) -> Option<ActionToken> {
        let request = self.mutations.pop_front()?;
        let effects = self.grid.on_mutation_settled(request.token, result);
        self.run(effects);
        Some(request.token)
    }
}

pub fn temp_config_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("config.toml");
    Ok((dir, path))
}

pub fn roles() -> &'static [&'static str] {
    &ROLES
}
