//! Messages sent to the conference server

use super::HITL_PATTERN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parameters of a conference run, sent verbatim to the standard endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub pattern: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_agents: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_revisions: Option<u32>,
}

impl SessionConfig {
    pub fn new(pattern: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            topic: topic.into(),
            max_rounds: None,
            num_agents: None,
            max_revisions: None,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    pub fn with_num_agents(mut self, num_agents: u32) -> Self {
        self.num_agents = Some(num_agents);
        self
    }

    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = Some(max_revisions);
        self
    }

    pub fn is_hitl(&self) -> bool {
        self.pattern == HITL_PATTERN
    }
}

/// The human's verdict on a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Revision,
    Reject,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Revision => "revision",
            Decision::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "a" => Ok(Decision::Approve),
            "revision" | "revise" | "r" => Ok(Decision::Revision),
            "reject" | "x" => Ok(Decision::Reject),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// A decision plus free-form feedback for the agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitlDecision {
    pub decision: Decision,
    #[serde(default)]
    pub feedback: String,
}

impl HitlDecision {
    pub fn new(decision: Decision, feedback: impl Into<String>) -> Self {
        Self {
            decision,
            feedback: feedback.into(),
        }
    }
}

/// Requests understood by the HITL endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HitlRequest {
    Start {
        topic: String,
        max_revisions: u32,
    },
    Decision {
        session_id: Option<String>,
        decision: Decision,
        feedback: String,
    },
}

/// Anything the client writes to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Session initiation on the standard endpoint
    Config(SessionConfig),
    Hitl(HitlRequest),
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            OutboundMessage::Config(config) => serde_json::to_string(config),
            OutboundMessage::Hitl(request) => serde_json::to_string(request),
        }
    }
}
