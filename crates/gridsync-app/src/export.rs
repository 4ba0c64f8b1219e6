// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ids::{ExportKey, ExportToken};
use crate::model::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
    Json,
}

impl ExportFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Json => "json",
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDescriptor {
    pub key: ExportKey,
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default = "default_true")]
    pub authorized: bool,
    /// Queued on the server; the response is a redirect or a "processing" note.
    #[serde(default, rename = "async")]
    pub queued: bool,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportPayload {
    pub format: ExportFormat,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub token: ExportToken,
    pub url: String,
    pub payload: ExportPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStep {
    /// Synchronous export: open the URL (query already appended).
    Download(String),
    Submit(ExportRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ExportResponse {
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Redirect(String),
    Processing { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettled {
    pub export: ExportKey,
    pub outcome: Result<ExportOutcome, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    UnknownExport(ExportKey),
    Unauthorized(ExportKey),
    AlreadyRunning(ExportKey),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownExport(key) => write!(f, "unknown export {key}"),
            Self::Unauthorized(key) => write!(f, "not authorized to export {key}"),
            Self::AlreadyRunning(key) => write!(f, "export {key} is already being submitted"),
        }
    }
}

impl std::error::Error for ExportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Submitted {
    token: ExportToken,
    export: ExportKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportTracker {
    last_token: ExportToken,
    submitted: Option<Submitted>,
}

impl ExportTracker {
    pub fn is_exporting(&self) -> bool {
        self.submitted.is_some()
    }

    pub fn start(&mut self, export: &ExportDescriptor, query: &str) -> Result<ExportStep, ExportError> {
        if !export.authorized {
            return Err(ExportError::Unauthorized(export.key.clone()));
        }

        if !export.queued {
            return Ok(ExportStep::Download(append_query(&export.url, query)));
        }

        if self.submitted.is_some() {
            return Err(ExportError::AlreadyRunning(export.key.clone()));
        }

        self.last_token = self.last_token.next();
        let token = self.last_token;
        info!(export = %export.key, %token, "export submitted");
        self.submitted = Some(Submitted {
            token,
            export: export.key.clone(),
        });
        Ok(ExportStep::Submit(ExportRequest {
            token,
            url: export.url.clone(),
            payload: ExportPayload {
                format: export.format,
                query: query.to_owned(),
            },
        }))
    }

    /// `fallback_message` is shown when the server acknowledges the job
    /// without saying anything.
    pub fn on_settled(
        &mut self,
        token: ExportToken,
        result: Result<ExportResponse, TransportError>,
        fallback_message: &str,
    ) -> Option<ExportSettled> {
        let submitted = match self.submitted.take() {
            Some(submitted) if submitted.token == token => submitted,
            other => {
                self.submitted = other;
                return None;
            }
        };

        let outcome = match result {
            Ok(ExportResponse {
                redirect: Some(url),
                ..
            }) => Ok(ExportOutcome::Redirect(url)),
            Ok(ExportResponse { message, .. }) => Ok(ExportOutcome::Processing {
                message: message.unwrap_or_else(|| fallback_message.to_owned()),
            }),
            Err(error) => {
                warn!(export = %submitted.export, %token, %error, "export failed");
                Err(error.to_string())
            }
        };

        Some(ExportSettled {
            export: submitted.export,
            outcome,
        })
    }
}

fn append_query(url: &str, query: &str) -> String {
    if query.is_empty() {
        return url.to_owned();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

#[cfg(test)]
mod tests {
    use super::{
        ExportDescriptor, ExportError, ExportFormat, ExportOutcome, ExportResponse, ExportStep,
        ExportSettled, ExportTracker,
    };
    use crate::ids::ExportKey;
    use crate::model::TransportError;

    fn export(queued: bool) -> ExportDescriptor {
        ExportDescriptor {
            key: ExportKey::new("csv"),
            label: "CSV".to_owned(),
            url: "/users/export".to_owned(),
            format: ExportFormat::Csv,
            authorized: true,
            queued,
            icon: None,
        }
    }

    #[test]
    fn synchronous_export_downloads_with_query() {
        let mut tracker = ExportTracker::default();
        let step = tracker.start(&export(false), "search=ann").expect("authorized");
        assert_eq!(
            step,
            ExportStep::Download("/users/export?search=ann".to_owned())
        );
        assert!(!tracker.is_exporting());
    }

    #[test]
    fn unauthorized_export_is_rejected() {
        let mut tracker = ExportTracker::default();
        let mut forbidden = export(true);
        forbidden.authorized = false;
        assert_eq!(
            tracker.start(&forbidden, ""),
            Err(ExportError::Unauthorized(ExportKey::new("csv")))
        );
        assert!(!tracker.is_exporting());
    }

    #[test]
    fn redirect_and_processing_are_both_terminal() {
        let mut tracker = ExportTracker::default();
        let ExportStep::Submit(request) = tracker.start(&export(true), "").expect("authorized")
        else {
            panic!("expected submit");
        };
        let settled = tracker
            .on_settled(
                request.token,
                Ok(ExportResponse {
                    redirect: Some("/files/users.csv".to_owned()),
                    message: None,
                }),
                "preparing",
            )
            .expect("current token");
        assert_eq!(
            settled.outcome,
            Ok(ExportOutcome::Redirect("/files/users.csv".to_owned()))
        );
        assert!(!tracker.is_exporting());

        let ExportStep::Submit(request) = tracker.start(&export(true), "").expect("authorized")
        else {
            panic!("expected submit");
        };
        let settled = tracker
            .on_settled(request.token, Ok(ExportResponse::default()), "preparing")
            .expect("current token");
        assert_eq!(
            settled.outcome,
            Ok(ExportOutcome::Processing {
                message: "preparing".to_owned()
            })
        );
    }

    #[test]
    fn failure_reports_export_key() {
        let mut tracker = ExportTracker::default();
        let ExportStep::Submit(request) = tracker.start(&export(true), "").expect("authorized")
        else {
            panic!("expected submit");
        };
        assert!(tracker.on_settled(request.token.next(), Ok(ExportResponse::default()), "").is_none());
        assert!(tracker.is_exporting());

        let settled = tracker
            .on_settled(request.token, Err(TransportError::failed("boom")), "")
            .expect("current token");
        assert_eq!(
            settled,
            ExportSettled {
                export: ExportKey::new("csv"),
                outcome: Err("boom".to_owned()),
            }
        );
    }
}
