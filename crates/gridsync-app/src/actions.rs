// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ids::{ActionKey, ActionToken, RowId};
use crate::model::TransportError;
use crate::selection::{ActionTargets, SelectionState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Plain navigation; `{id}` in the url is replaced for single-row targets.
    Link { url: String },
    /// Effect is owned by a caller-supplied handler.
    Custom,
    /// Server mutation posted to `url`.
    Mutation { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStyle {
    #[default]
    Default,
    Primary,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub confirm_label: Option<String>,
    #[serde(default)]
    pub cancel_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct ActionDescriptor {
    pub key: ActionKey,
    pub label: String,
    pub kind: ActionKind,
    pub authorized: bool,
    pub confirmation: Option<Confirmation>,
    pub bulk: bool,
    pub row: bool,
    pub icon: Option<String>,
    pub style: ActionStyle,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAction {
    key: ActionKey,
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link: Option<String>,
    #[serde(default)]
    custom: bool,
    #[serde(default = "default_true")]
    authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confirmation: Option<Confirmation>,
    #[serde(default = "default_true")]
    bulk: bool,
    #[serde(default = "default_true")]
    row: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(default)]
    style: ActionStyle,
}

impl TryFrom<RawAction> for ActionDescriptor {
    type Error = String;

    fn try_from(raw: RawAction) -> std::result::Result<Self, Self::Error> {
        let kind = match (raw.custom, raw.link, raw.url) {
            (true, _, _) => ActionKind::Custom,
            (false, Some(url), _) => ActionKind::Link { url },
            (false, None, Some(url)) => ActionKind::Mutation { url },
            (false, None, None) => {
                return Err(format!(
                    "action {} needs a url, a link, or custom = true",
                    raw.key
                ));
            }
        };
        Ok(Self {
            key: raw.key,
            label: raw.label,
            kind,
            authorized: raw.authorized,
            confirmation: raw.confirmation,
            bulk: raw.bulk,
            row: raw.row,
            icon: raw.icon,
            style: raw.style,
        })
    }
}

impl From<ActionDescriptor> for RawAction {
    fn from(action: ActionDescriptor) -> Self {
        let (url, link, custom) = match action.kind {
            ActionKind::Link { url } => (None, Some(url), false),
            ActionKind::Custom => (None, None, true),
            ActionKind::Mutation { url } => (Some(url), None, false),
        };
        Self {
            key: action.key,
            label: action.label,
            url,
            link,
            custom,
            authorized: action.authorized,
            confirmation: action.confirmation,
            bulk: action.bulk,
            row: action.row,
            icon: action.icon,
            style: action.style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationPayload {
    pub ids: Vec<RowId>,
    pub all: bool,
    /// Grid query the server resolves "all matching" against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl MutationPayload {
    pub fn for_targets(targets: &ActionTargets, query: &str) -> Self {
        Self {
            ids: targets.ids().to_vec(),
            all: targets.is_all_matching(),
            query: targets.is_all_matching().then(|| query.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub token: ActionToken,
    pub url: String,
    pub payload: MutationPayload,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub processing: bool,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    pub action: ActionKey,
    pub title: String,
    pub message: String,
    pub confirm_label: Option<String>,
    pub cancel_label: Option<String>,
    pub targets: ActionTargets,
}

/// Returned for custom actions; hand the token back to `mark_complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomHandle {
    pub token: ActionToken,
    pub action: ActionKey,
    pub targets: ActionTargets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStep {
    AwaitingConfirmation(ConfirmationPrompt),
    Mutate(MutationRequest),
    Custom(CustomHandle),
    Visit(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSuccess {
    pub action: ActionKey,
    pub targets: ActionTargets,
    pub response: MutationResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub action: ActionKey,
    pub targets: ActionTargets,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    UnknownAction(ActionKey),
    Unauthorized(ActionKey),
    Busy(ActionKey),
    NoTargets(ActionKey),
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAction(key) => write!(f, "unknown action {key}"),
            Self::Unauthorized(key) => write!(f, "not authorized to run {key}"),
            Self::Busy(key) => write!(f, "cannot run {key} while another action is running"),
            Self::NoTargets(key) => write!(f, "{key} needs at least one selected row"),
        }
    }
}

impl std::error::Error for ActionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Performing {
    token: ActionToken,
    action: ActionKey,
    targets: ActionTargets,
    custom: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingConfirmation {
    action: ActionDescriptor,
    prompt: ConfirmationPrompt,
    query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionExecutor {
    last_token: ActionToken,
    performing: Option<Performing>,
    pending: Option<PendingConfirmation>,
}

impl ActionExecutor {
    pub fn is_performing(&self) -> bool {
        self.performing.is_some()
    }

    pub fn pending_confirmation(&self) -> Option<&ConfirmationPrompt> {
        self.pending.as_ref().map(|pending| &pending.prompt)
    }

    /// `query` is the grid's encoded query string, sent along when the
    /// targets are all matching rows.
    pub fn execute(
        &mut self,
        action: &ActionDescriptor,
        targets: ActionTargets,
        query: &str,
    ) -> Result<ActionStep, ActionError> {
        if !action.authorized {
            warn!(action = %action.key, "rejected unauthorized action");
            return Err(ActionError::Unauthorized(action.key.clone()));
        }
        if let Some(performing) = &self.performing {
            debug!(action = %action.key, running = %performing.action, "action busy");
            return Err(ActionError::Busy(action.key.clone()));
        }
        if targets.is_empty() && !matches!(action.kind, ActionKind::Link { .. }) {
            return Err(ActionError::NoTargets(action.key.clone()));
        }

        if let Some(confirmation) = &action.confirmation {
            let prompt = ConfirmationPrompt {
                action: action.key.clone(),
                title: confirmation.title.clone(),
                message: confirmation.message.clone(),
                confirm_label: confirmation.confirm_label.clone(),
                cancel_label: confirmation.cancel_label.clone(),
                targets,
            };
            self.pending = Some(PendingConfirmation {
                action: action.clone(),
                prompt: prompt.clone(),
                query: query.to_owned(),
            });
            return Ok(ActionStep::AwaitingConfirmation(prompt));
        }

        Ok(self.start(action, targets, query))
    }

    /// Continues the action waiting on confirmation, if any.
    pub fn confirm(&mut self) -> Option<ActionStep> {
        let pending = self.pending.take()?;
        if self.performing.is_some() {
            warn!(action = %pending.action.key, "confirmation arrived while busy; dropped");
            return None;
        }
        Some(self.start(&pending.action, pending.prompt.targets, &pending.query))
    }

    pub fn cancel_confirmation(&mut self) -> bool {
        self.pending.take().is_some()
    }

    fn start(&mut self, action: &ActionDescriptor, targets: ActionTargets, query: &str) -> ActionStep {
        match &action.kind {
            ActionKind::Link { url } => {
                let url = match targets.ids() {
                    [id] => url.replace("{id}", &id.to_string()),
                    _ => url.clone(),
                };
                ActionStep::Visit(url)
            }
            ActionKind::Custom => {
                let token = self.next_token();
                info!(action = %action.key, %token, targets = %targets.describe(), "custom action started");
                self.performing = Some(Performing {
                    token,
                    action: action.key.clone(),
                    targets: targets.clone(),
                    custom: true,
                });
                ActionStep::Custom(CustomHandle {
                    token,
                    action: action.key.clone(),
                    targets,
                })
            }
            ActionKind::Mutation { url } => {
                let token = self.next_token();
                info!(action = %action.key, %token, targets = %targets.describe(), "mutation started");
                let payload = MutationPayload::for_targets(&targets, query);
                self.performing = Some(Performing {
                    token,
                    action: action.key.clone(),
                    targets,
                    custom: false,
                });
                ActionStep::Mutate(MutationRequest {
                    token,
                    url: url.clone(),
                    payload,
                })
            }
        }
    }

    /// Ends a custom action. Returns false for unknown or stale tokens.
    pub fn mark_complete(&mut self, token: ActionToken, selection: &mut SelectionState) -> bool {
        match &self.performing {
            Some(performing) if performing.custom && performing.token == token => {
                info!(action = %performing.action, %token, "custom action completed");
                self.performing = None;
                selection.clear();
                true
            }
            _ => false,
        }
    }

    /// `None` when the token does not belong to the running mutation.
    pub fn on_mutation_settled(
        &mut self,
        token: ActionToken,
        result: Result<MutationResponse, TransportError>,
        selection: &mut SelectionState,
    ) -> Option<Result<ActionSuccess, ActionFailure>> {
        let performing = match self.performing.take() {
            Some(performing) if !performing.custom && performing.token == token => performing,
            other => {
                self.performing = other;
                debug!(%token, "ignoring settle for stale mutation");
                return None;
            }
        };

        selection.clear();
        Some(match result {
            Ok(response) => {
                info!(action = %performing.action, %token, "mutation succeeded");
                Ok(ActionSuccess {
                    action: performing.action,
                    targets: performing.targets,
                    response,
                })
            }
            Err(error) => {
                warn!(action = %performing.action, %token, %error, "mutation failed");
                Err(ActionFailure {
                    action: performing.action,
                    targets: performing.targets,
                    error: error.to_string(),
                })
            }
        })
    }

    fn next_token(&mut self) -> ActionToken {
        self.last_token = self.last_token.next();
        self.last_token
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ActionDescriptor, ActionError, ActionExecutor, ActionKind, ActionStep, ActionStyle,
        Confirmation, MutationResponse,
    };
    use crate::ids::{ActionKey, RowId};
    use crate::model::TransportError;
    use crate::selection::{ActionTargets, SelectionState, SelectionTarget};

    fn action(key: &str, kind: ActionKind) -> ActionDescriptor {
        ActionDescriptor {
            key: ActionKey::new(key),
            label: key.to_owned(),
            kind,
            authorized: true,
            confirmation: None,
            bulk: true,
            row: true,
            icon: None,
            style: ActionStyle::Default,
        }
    }

    fn mutation(key: &str) -> ActionDescriptor {
        action(
            key,
            ActionKind::Mutation {
                url: format!("/users/{key}"),
            },
        )
    }

    fn targets(values: &[i64]) -> ActionTargets {
        ActionTargets::Ids(values.iter().copied().map(RowId::new).collect())
    }

    fn selected(values: &[i64]) -> SelectionState {
        let mut selection = SelectionState::default();
        for value in values {
            selection.toggle(SelectionTarget::Row(RowId::new(*value)));
        }
        selection
    }

    #[test]
    fn kind_is_resolved_when_deserializing() -> anyhow::Result<()> {
        let custom: ActionDescriptor =
            serde_json::from_str(r#"{"key":"archive","label":"Archive","custom":true,"url":"/x"}"#)?;
        assert_eq!(custom.kind, ActionKind::Custom);

        let link: ActionDescriptor =
            serde_json::from_str(r#"{"key":"edit","label":"Edit","link":"/users/{id}/edit"}"#)?;
        assert_eq!(
            link.kind,
            ActionKind::Link {
                url: "/users/{id}/edit".to_owned()
            }
        );

        let error = serde_json::from_str::<ActionDescriptor>(r#"{"key":"noop","label":"Noop"}"#)
            .expect_err("an action without a target must be rejected");
        assert!(error.to_string().contains("needs a url"));
        Ok(())
    }

    #[test]
    fn unauthorized_action_is_rejected_without_state_change() {
        let mut executor = ActionExecutor::default();
        let mut forbidden = mutation("delete");
        forbidden.authorized = false;

        let error = executor
            .execute(&forbidden, targets(&[1]), "")
            .expect_err("unauthorized");
        assert_eq!(error, ActionError::Unauthorized(ActionKey::new("delete")));
        assert!(!executor.is_performing());
        assert!(executor.pending_confirmation().is_none());
    }

    #[test]
    fn confirmation_defers_until_confirmed() {
        let mut executor = ActionExecutor::default();
        let mut delete = mutation("delete");
        delete.confirmation = Some(Confirmation {
            title: "Delete users?".to_owned(),
            message: String::new(),
            confirm_label: None,
            cancel_label: None,
        });

        let step = executor
            .execute(&delete, targets(&[1, 2]), "")
            .expect("authorized");
        assert!(matches!(step, ActionStep::AwaitingConfirmation(_)));
        assert!(!executor.is_performing());

        let step = executor.confirm().expect("pending confirmation");
        let ActionStep::Mutate(request) = step else {
            panic!("expected mutation, got {step:?}");
        };
        assert_eq!(request.url, "/users/delete");
        assert_eq!(request.payload.ids, vec![RowId::new(1), RowId::new(2)]);
        assert!(executor.is_performing());
    }

    #[test]
    fn cancelled_confirmation_changes_nothing() {
        let mut executor = ActionExecutor::default();
        let mut delete = mutation("delete");
        delete.confirmation = Some(Confirmation {
            title: "Delete?".to_owned(),
            message: String::new(),
            confirm_label: None,
            cancel_label: None,
        });
        executor
            .execute(&delete, targets(&[1]), "")
            .expect("authorized");

        assert!(executor.cancel_confirmation());
        assert!(executor.confirm().is_none());
        assert!(!executor.is_performing());
    }

    #[test]
    fn custom_action_performs_until_marked_complete() {
        let mut executor = ActionExecutor::default();
        let mut selection = selected(&[4]);
        let step = executor
            .execute(&action("archive", ActionKind::Custom), targets(&[4]), "")
            .expect("authorized");
        let ActionStep::Custom(handle) = step else {
            panic!("expected custom handle");
        };
        assert_eq!(handle.targets, targets(&[4]));
        assert!(executor.is_performing());

        assert!(executor.mark_complete(handle.token, &mut selection));
        assert!(!executor.is_performing());
        assert!(selection.is_empty());
        assert!(!executor.mark_complete(handle.token, &mut selection));
    }

    #[test]
    fn mutation_failure_still_clears_selection_and_performing() {
        let mut executor = ActionExecutor::default();
        let mut selection = selected(&[1, 2]);
        let ActionStep::Mutate(request) = executor
            .execute(&mutation("delete"), selection.targets(), "")
            .expect("authorized")
        else {
            panic!("expected mutation");
        };

        let outcome = executor
            .on_mutation_settled(
                request.token,
                Err(TransportError::failed("500 Internal Server Error")),
                &mut selection,
            )
            .expect("current token");
        let failure = outcome.expect_err("failed mutation");
        assert_eq!(failure.targets, targets(&[1, 2]));
        assert!(failure.error.contains("500"));
        assert!(selection.is_empty());
        assert!(!executor.is_performing());
    }

    #[test]
    fn stale_settle_is_ignored() {
        let mut executor = ActionExecutor::default();
        let mut selection = selected(&[1]);
        let ActionStep::Mutate(request) = executor
            .execute(&mutation("delete"), targets(&[1]), "")
            .expect("authorized")
        else {
            panic!("expected mutation");
        };

        let stale = executor.on_mutation_settled(
            request.token.next(),
            Ok(MutationResponse::default()),
            &mut selection,
        );
        assert!(stale.is_none());
        assert!(executor.is_performing());
        assert!(!selection.is_empty());
    }

    #[test]
    fn second_action_is_busy_while_first_runs() {
        let mut executor = ActionExecutor::default();
        executor
            .execute(&mutation("delete"), targets(&[1]), "")
            .expect("authorized");
        let error = executor
            .execute(&mutation("restore"), targets(&[1]), "")
            .expect_err("busy");
        assert_eq!(error, ActionError::Busy(ActionKey::new("restore")));
    }

    #[test]
    fn all_matching_payload_carries_query() {
        let mut executor = ActionExecutor::default();
        let ActionStep::Mutate(request) = executor
            .execute(
                &mutation("delete"),
                ActionTargets::AllMatching,
                "filters%5Brole%5D%5Bclause%5D=in",
            )
            .expect("authorized")
        else {
            panic!("expected mutation");
        };
        assert!(request.payload.all);
        assert!(request.payload.ids.is_empty());
        assert_eq!(
            request.payload.query.as_deref(),
            Some("filters%5Brole%5D%5Bclause%5D=in")
        );
    }

    #[test]
    fn link_action_substitutes_single_row_id() {
        let mut executor = ActionExecutor::default();
        let edit = action(
            "edit",
            ActionKind::Link {
                url: "/users/{id}/edit".to_owned(),
            },
        );
        let step = executor
            .execute(&edit, targets(&[12]), "")
            .expect("authorized");
        assert_eq!(step, ActionStep::Visit("/users/12/edit".to_owned()));
        assert!(!executor.is_performing());
    }

    #[test]
    fn empty_targets_are_rejected_for_mutations() {
        let mut executor = ActionExecutor::default();
        let error = executor
            .execute(&mutation("delete"), targets(&[]), "")
            .expect_err("no targets");
        assert_eq!(error, ActionError::NoTargets(ActionKey::new("delete")));
    }
}
