// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use gridsync_app::{
    ActionToken, ExportFormat, ExportPayload, ExportRequest, ExportToken, MutationPayload,
    MutationRequest, NavigationReason, NavigationRequest, NavigationToken, RowId, ScrollPolicy,
};
use gridsync_http::{HttpTransport, PARTIAL_HEADER, PRESERVE_STATE_HEADER};
use std::io::Read;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};
use url::Url;

fn json_response(body: &str, status: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body)
        .with_status_code(status)
        .with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
}

fn header(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str().to_owned())
}

fn start() -> Result<(Server, String)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());
    Ok((server, addr))
}

#[test]
fn unreachable_server_names_the_base_url() {
    let transport = HttpTransport::new("http://127.0.0.1:1", Duration::from_millis(50))
        .expect("transport should initialize");

    let error = transport
        .fetch_page("/admin/users")
        .expect_err("fetch should fail for unreachable endpoint");
    let message = error.to_string();
    assert!(message.contains("127.0.0.1:1"), "{message}");
}

#[test]
fn fetch_page_resolves_the_initial_location() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/admin/users");
        assert_eq!(header(&request, "Accept").as_deref(), Some("application/json"));
        let body = r#"{
            "descriptor": {"name": "users", "columns": [{"key": "name", "label": "Name"}]},
            "url": "/admin/users?users[search]=ann",
            "slice": {"rows": [{"id": 1, "cells": {"name": "Ann"}}],
                      "pagination": {"current_page": 1, "last_page": 1}}
        }"#;
        request
            .respond(json_response(body, 200))
            .expect("response should succeed");
    });

    let transport = HttpTransport::new(&addr, Duration::from_secs(1))?;
    let page = transport.fetch_page("/admin/users")?;
    assert!(page.url.starts_with(&addr));
    assert!(page.url.ends_with("/admin/users?users[search]=ann"));
    assert_eq!(page.descriptor.name.as_str(), "users");
    assert_eq!(page.slice.rows.len(), 1);
    assert_eq!(page.slice.rows[0].id, RowId::new(1));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn navigate_sends_partial_reload_headers() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(*request.method(), Method::Get);
        assert_eq!(request.url(), "/admin/users?users%5Bpage%5D=2");
        assert_eq!(
            header(&request, PARTIAL_HEADER).as_deref(),
            Some("users,stats")
        );
        assert_eq!(header(&request, PRESERVE_STATE_HEADER).as_deref(), Some("1"));
        let body = r#"{"rows": [{"id": 16, "cells": {}}], "pagination": {"current_page": 2, "last_page": 4}}"#;
        request
            .respond(json_response(body, 200))
            .expect("response should succeed");
    });

    let transport = HttpTransport::new(&addr, Duration::from_secs(1))?;
    let request = NavigationRequest {
        token: NavigationToken::new(3),
        url: Url::parse(&format!("{addr}/admin/users?users%5Bpage%5D=2"))?,
        only: vec!["users".to_owned(), "stats".to_owned()],
        preserve_state: true,
        scroll: ScrollPolicy::Preserve,
        reason: NavigationReason::StateChange,
    };
    let slice = transport.navigate(&request)?;
    assert_eq!(slice.pagination.current_page, Some(2));
    assert_eq!(slice.pagination.last_page, Some(4));
    assert_eq!(slice.rows[0].id, RowId::new(16));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn full_reload_omits_partial_header() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(header(&request, PARTIAL_HEADER), None);
        assert_eq!(header(&request, PRESERVE_STATE_HEADER), None);
        request
            .respond(json_response("{}", 200))
            .expect("response should succeed");
    });

    let transport = HttpTransport::new(&addr, Duration::from_secs(1))?;
    let request = NavigationRequest {
        token: NavigationToken::new(1),
        url: Url::parse(&format!("{addr}/admin/users"))?,
        only: Vec::new(),
        preserve_state: false,
        scroll: ScrollPolicy::TopOfGrid,
        reason: NavigationReason::Visit,
    };
    let slice = transport.navigate(&request)?;
    assert!(slice.rows.is_empty());

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn mutate_posts_targets_as_json() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        assert_eq!(*request.method(), Method::Post);
        assert_eq!(request.url(), "/admin/users/delete");
        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("read request body");
        let payload: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(payload, serde_json::json!({"ids": [3, 7], "all": false}));
        let response = r#"{"redirect": "/admin/users?deleted=2", "message": "Deleted 2 users"}"#;
        request
            .respond(json_response(response, 200))
            .expect("response should succeed");
    });

    let transport = HttpTransport::new(&addr, Duration::from_secs(1))?;
    let response = transport.mutate(&MutationRequest {
        token: ActionToken::new(1),
        url: "/admin/users/delete".to_owned(),
        payload: MutationPayload {
            ids: vec![RowId::new(3), RowId::new(7)],
            all: false,
            query: None,
        },
    })?;
    assert_eq!(response.redirect.as_deref(), Some("/admin/users?deleted=2"));
    assert_eq!(response.message.as_deref(), Some("Deleted 2 users"));
    assert!(!response.processing);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn mutation_failure_surfaces_server_message() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        request
            .respond(json_response(
                r#"{"message": "Users with open invoices cannot be deleted."}"#,
                422,
            ))
            .expect("response should succeed");
    });

    let transport = HttpTransport::new(&addr, Duration::from_secs(1))?;
    let error = transport
        .mutate(&MutationRequest {
            token: ActionToken::new(2),
            url: "/admin/users/delete".to_owned(),
            payload: MutationPayload {
                ids: Vec::new(),
                all: true,
                query: Some("users%5Bsearch%5D=ann".to_owned()),
            },
        })
        .expect_err("422 should fail");
    assert_eq!(
        error.to_string(),
        "server error (422): Users with open invoices cannot be deleted."
    );

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn export_submission_accepts_empty_body() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/admin/users/export");
        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("read request body");
        let payload: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(payload["format"], "xlsx");
        assert_eq!(payload["query"], "users%5Bsort%5D=-age");
        request
            .respond(Response::from_string("").with_status_code(202))
            .expect("response should succeed");
    });

    let transport = HttpTransport::new(&addr, Duration::from_secs(1))?;
    let response = transport.submit_export(&ExportRequest {
        token: ExportToken::new(1),
        url: "/admin/users/export".to_owned(),
        payload: ExportPayload {
            format: ExportFormat::Xlsx,
            query: "users%5Bsort%5D=-age".to_owned(),
        },
    })?;
    assert_eq!(response.redirect, None);
    assert_eq!(response.message, None);

    handle.join().expect("server thread should join");
    Ok(())
}
