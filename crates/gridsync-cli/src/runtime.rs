// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use gridsync_app::{
    CustomHandle, ExportRequest, ExportResponse, GridSlice, MutationRequest, MutationResponse,
    NavigationRequest, NavigationToken,
};
use gridsync_http::{HttpTransport, transport_error};
use gridsync_tui::InternalEvent;
use std::process::{Command, Stdio};
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{debug, info, warn};
use url::Url;

/// Runs grid effects against a live server. Requests go out on their own
/// threads and settle back through the shell's event channel.
pub struct HttpRuntime {
    transport: HttpTransport,
}

impl HttpRuntime {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

impl gridsync_tui::GridRuntime for HttpRuntime {
    fn navigate(&mut self, request: &NavigationRequest) -> Result<GridSlice> {
        self.transport.navigate(request)
    }

    fn mutate(&mut self, request: &MutationRequest) -> Result<MutationResponse> {
        self.transport.mutate(request)
    }

    fn submit_export(&mut self, request: &ExportRequest) -> Result<ExportResponse> {
        self.transport.submit_export(request)
    }

    fn spawn_navigate(
        &mut self,
        request: NavigationRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let transport = self.transport.clone();
        thread::Builder::new()
            .name(format!("navigate-{}", request.token.get()))
            .spawn(move || {
                let result = transport
                    .navigate(&request)
                    .map_err(|error| transport_error(&error));
                let _ = tx.send(InternalEvent::NavigationSettled {
                    token: request.token,
                    result,
                });
            })
            .context("spawn navigation thread")?;
        Ok(())
    }

    fn spawn_mutate(&mut self, request: MutationRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let transport = self.transport.clone();
        thread::Builder::new()
            .name(format!("mutate-{}", request.token.get()))
            .spawn(move || {
                let result = transport
                    .mutate(&request)
                    .map_err(|error| transport_error(&error));
                let _ = tx.send(InternalEvent::MutationSettled {
                    token: request.token,
                    result,
                });
            })
            .context("spawn mutation thread")?;
        Ok(())
    }

    fn spawn_export(&mut self, request: ExportRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let transport = self.transport.clone();
        thread::Builder::new()
            .name(format!("export-{}", request.token.get()))
            .spawn(move || {
                let result = transport
                    .submit_export(&request)
                    .map_err(|error| transport_error(&error));
                let _ = tx.send(InternalEvent::ExportSettled {
                    token: request.token,
                    result,
                });
            })
            .context("spawn export thread")?;
        Ok(())
    }

    // Blocking requests run to completion; the grid ignores the late result.
    fn cancel_navigation(&mut self, token: NavigationToken) -> Result<()> {
        debug!(%token, "navigation superseded");
        Ok(())
    }

    fn run_custom(&mut self, handle: &CustomHandle) -> Result<()> {
        info!(
            action = %handle.action,
            token = %handle.token,
            "custom actions are handled by the embedding application; nothing to run"
        );
        Ok(())
    }

    fn open(&mut self, url: &Url) -> Result<()> {
        let Some((program, args)) = opener() else {
            warn!(%url, "no opener for this platform");
            return Ok(());
        };
        info!(%url, program, "opening");
        Command::new(program)
            .args(args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("open {url} with {program}"))?;
        Ok(())
    }
}

fn opener() -> Option<(&'static str, &'static [&'static str])> {
    if cfg!(target_os = "macos") {
        Some(("open", &[]))
    } else if cfg!(target_os = "windows") {
        Some(("cmd", &["/C", "start", ""]))
    } else if cfg!(unix) {
        Some(("xdg-open", &[]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::HttpRuntime;
    use anyhow::{Result, anyhow};
    use gridsync_app::{
        ActionToken, MutationPayload, MutationRequest, NavigationReason, NavigationRequest,
        NavigationToken, RowId, ScrollPolicy,
    };
    use gridsync_http::HttpTransport;
    use gridsync_tui::{GridRuntime, InternalEvent};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tiny_http::{Header, Response, Server};
    use url::Url;

    fn serve_once(body: &'static str, status: u16) -> Result<(String, thread::JoinHandle<()>)> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}", server.server_addr());
        let handle = thread::spawn(move || {
            let request = server.recv().expect("request expected");
            let response = Response::from_string(body).with_status_code(status).with_header(
                Header::from_bytes("Content-Type", "application/json")
                    .expect("valid content type header"),
            );
            request.respond(response).expect("response should succeed");
        });
        Ok((addr, handle))
    }

    #[test]
    fn spawned_navigation_settles_over_channel() -> Result<()> {
        let (addr, server) = serve_once(
            r#"{"rows": [{"id": 4, "cells": {"name": "Drew"}}], "pagination": {"current_page": 1, "last_page": 1}}"#,
            200,
        )?;
        let mut runtime = HttpRuntime::new(HttpTransport::new(&addr, Duration::from_secs(2))?);
        let (tx, rx) = mpsc::channel();

        runtime.spawn_navigate(
            NavigationRequest {
                token: NavigationToken::new(9),
                url: Url::parse(&format!("{addr}/admin/users?page=1"))?,
                only: Vec::new(),
                preserve_state: true,
                scroll: ScrollPolicy::Preserve,
                reason: NavigationReason::StateChange,
            },
            tx,
        )?;

        match rx.recv_timeout(Duration::from_secs(5))? {
            InternalEvent::NavigationSettled { token, result } => {
                assert_eq!(token, NavigationToken::new(9));
                let slice = result.map_err(|error| anyhow!("{error}"))?;
                assert_eq!(slice.rows[0].id, RowId::new(4));
            }
            other => panic!("unexpected event {other:?}"),
        }
        server.join().map_err(|_| anyhow!("server thread panicked"))?;
        Ok(())
    }

    #[test]
    fn spawned_mutation_failure_carries_server_message() -> Result<()> {
        let (addr, server) = serve_once(r#"{"error": "row is locked"}"#, 409)?;
        let mut runtime = HttpRuntime::new(HttpTransport::new(&addr, Duration::from_secs(2))?);
        let (tx, rx) = mpsc::channel();

        runtime.spawn_mutate(
            MutationRequest {
                token: ActionToken::new(2),
                url: "/admin/users/delete".to_owned(),
                payload: MutationPayload {
                    ids: vec![RowId::new(1)],
                    all: false,
                    query: None,
                },
            },
            tx,
        )?;

        match rx.recv_timeout(Duration::from_secs(5))? {
            InternalEvent::MutationSettled { token, result } => {
                assert_eq!(token, ActionToken::new(2));
                let error = result.expect_err("409 should fail");
                assert!(error.to_string().contains("row is locked"), "{error}");
            }
            other => panic!("unexpected event {other:?}"),
        }
        server.join().map_err(|_| anyhow!("server thread panicked"))?;
        Ok(())
    }
}
