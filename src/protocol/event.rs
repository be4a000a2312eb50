//! Events streamed by the conference server

use super::request::HitlDecision;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parallel-execution metadata carried by progress events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParallelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_parallel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_nodes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_nodes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node: Option<String>,
}

/// A file produced by the conference that can be fetched over HTTP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Path (or absolute URL) the file can be retrieved from
    pub download_url: String,
}

/// Fields any event kind may carry
///
/// Keys this client does not model, and modelled keys whose value has an
/// unexpected shape, are kept in `extra` so an event serializes back to the
/// payload it was parsed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(flatten)]
    pub parallel: ParallelInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Event received from the conference server, keyed by its `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvent", into = "WireEvent")]
pub enum ConferenceEvent {
    /// The HITL server accepted a session
    HitlSessionStart {
        session_id: Option<String>,
        max_revisions: Option<u32>,
        fields: EventFields,
    },
    /// A proposal is ready and the server waits for a human decision
    HitlAwaitingInput {
        proposal: Option<String>,
        revision_count: Option<u32>,
        max_revisions: Option<u32>,
        fields: EventFields,
    },
    /// Local record of a decision the user submitted
    HitlUserDecision { fields: EventFields },
    ConferenceComplete { fields: EventFields },
    Error {
        error: Option<String>,
        fields: EventFields,
    },
    /// Any other progress event (agent turns, parallel groups, ...)
    Progress { kind: String, fields: EventFields },
}

impl ConferenceEvent {
    pub const HITL_SESSION_START: &'static str = "hitl_session_start";
    pub const HITL_AWAITING_INPUT: &'static str = "hitl_awaiting_input";
    pub const HITL_USER_DECISION: &'static str = "hitl_user_decision";
    pub const CONFERENCE_COMPLETE: &'static str = "conference_complete";
    pub const ERROR: &'static str = "error";

    /// Parse a text frame received from the server
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The wire `type` of this event
    pub fn kind(&self) -> &str {
        match self {
            Self::HitlSessionStart { .. } => Self::HITL_SESSION_START,
            Self::HitlAwaitingInput { .. } => Self::HITL_AWAITING_INPUT,
            Self::HitlUserDecision { .. } => Self::HITL_USER_DECISION,
            Self::ConferenceComplete { .. } => Self::CONFERENCE_COMPLETE,
            Self::Error { .. } => Self::ERROR,
            Self::Progress { kind, .. } => kind,
        }
    }

    pub fn fields(&self) -> &EventFields {
        match self {
            Self::HitlSessionStart { fields, .. }
            | Self::HitlAwaitingInput { fields, .. }
            | Self::HitlUserDecision { fields }
            | Self::ConferenceComplete { fields }
            | Self::Error { fields, .. }
            | Self::Progress { fields, .. } => fields,
        }
    }

    /// Completion and error events end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConferenceComplete { .. } | Self::Error { .. })
    }

    pub fn content(&self) -> Option<&str> {
        self.fields().content.as_deref()
    }

    pub fn file(&self) -> Option<&FileDescriptor> {
        self.fields().file.as_ref()
    }

    /// Synthetic error recorded when the connection itself fails
    pub fn transport_error(description: impl Into<String>) -> Self {
        Self::Error {
            error: Some(description.into()),
            fields: EventFields {
                status: Some("error".to_string()),
                ..EventFields::default()
            },
        }
    }

    /// Synthetic entry recording the user's side of a HITL turn
    pub fn user_decision(decision: &HitlDecision) -> Self {
        let mut content = format!(
            "**User decision:** {}",
            decision.decision.as_str().to_uppercase()
        );
        if !decision.feedback.is_empty() {
            content.push_str("\n\n**Feedback:** ");
            content.push_str(&decision.feedback);
        }
        Self::HitlUserDecision {
            fields: EventFields {
                content: Some(content),
                status: Some("user_input".to_string()),
                ..EventFields::default()
            },
        }
    }
}

/// Flat wire shape as received: the `type` tag plus everything else
#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Flat wire shape as sent back out
#[derive(Serialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: EventFields,
}

/// Remove `field` and decode it; a value of the wrong shape stays in `extra`
fn take_field<T: DeserializeOwned>(extra: &mut Map<String, Value>, field: &str) -> Option<T> {
    let value = extra.remove(field)?;
    if value.is_null() {
        return None;
    }
    match T::deserialize(&value) {
        Ok(typed) => Some(typed),
        Err(e) => {
            tracing::debug!(field, error = %e, "Keeping unexpected field value untyped");
            extra.insert(field.to_string(), value);
            None
        }
    }
}

fn put_field<T: Serialize>(extra: &mut Map<String, Value>, field: &str, value: Option<T>) {
    if let Some(value) = value.and_then(|v| serde_json::to_value(v).ok()) {
        extra.insert(field.to_string(), value);
    }
}

impl EventFields {
    fn from_map(mut extra: Map<String, Value>) -> Self {
        let parallel = ParallelInfo {
            is_parallel: take_field(&mut extra, "is_parallel"),
            parallel_index: take_field(&mut extra, "parallel_index"),
            parallel_total: take_field(&mut extra, "parallel_total"),
            parallel_nodes: take_field(&mut extra, "parallel_nodes"),
            group_title: take_field(&mut extra, "group_title"),
            group_description: take_field(&mut extra, "group_description"),
            topic: take_field(&mut extra, "topic"),
            completed_nodes: take_field(&mut extra, "completed_nodes"),
            next_node: take_field(&mut extra, "next_node"),
        };
        Self {
            node: take_field(&mut extra, "node"),
            content: take_field(&mut extra, "content"),
            status: take_field(&mut extra, "status"),
            pattern: take_field(&mut extra, "pattern"),
            parallel,
            file: take_field(&mut extra, "file"),
            extra,
        }
    }
}

impl From<RawEvent> for ConferenceEvent {
    fn from(raw: RawEvent) -> Self {
        let RawEvent { kind, mut rest } = raw;

        match kind.as_str() {
            Self::HITL_SESSION_START => {
                let session_id = take_field(&mut rest, "session_id");
                let max_revisions = take_field(&mut rest, "max_revisions");
                Self::HitlSessionStart {
                    session_id,
                    max_revisions,
                    fields: EventFields::from_map(rest),
                }
            }
            Self::HITL_AWAITING_INPUT => {
                let proposal = take_field(&mut rest, "proposal");
                let revision_count = take_field(&mut rest, "revision_count");
                let max_revisions = take_field(&mut rest, "max_revisions");
                Self::HitlAwaitingInput {
                    proposal,
                    revision_count,
                    max_revisions,
                    fields: EventFields::from_map(rest),
                }
            }
            Self::HITL_USER_DECISION => Self::HitlUserDecision {
                fields: EventFields::from_map(rest),
            },
            Self::CONFERENCE_COMPLETE => Self::ConferenceComplete {
                fields: EventFields::from_map(rest),
            },
            Self::ERROR => {
                let error = take_field(&mut rest, "error");
                Self::Error {
                    error,
                    fields: EventFields::from_map(rest),
                }
            }
            _ => Self::Progress {
                kind,
                fields: EventFields::from_map(rest),
            },
        }
    }
}

impl From<ConferenceEvent> for WireEvent {
    fn from(event: ConferenceEvent) -> Self {
        let kind = event.kind().to_string();
        let fields = match event {
            ConferenceEvent::HitlSessionStart {
                session_id,
                max_revisions,
                mut fields,
            } => {
                put_field(&mut fields.extra, "session_id", session_id);
                put_field(&mut fields.extra, "max_revisions", max_revisions);
                fields
            }
            ConferenceEvent::HitlAwaitingInput {
                proposal,
                revision_count,
                max_revisions,
                mut fields,
            } => {
                put_field(&mut fields.extra, "proposal", proposal);
                put_field(&mut fields.extra, "revision_count", revision_count);
                put_field(&mut fields.extra, "max_revisions", max_revisions);
                fields
            }
            ConferenceEvent::Error { error, mut fields } => {
                put_field(&mut fields.extra, "error", error);
                fields
            }
            ConferenceEvent::HitlUserDecision { fields }
            | ConferenceEvent::ConferenceComplete { fields }
            | ConferenceEvent::Progress { fields, .. } => fields,
        };
        WireEvent { kind, fields }
    }
}
