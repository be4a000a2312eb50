//! Plain-text rendering of conference events for the terminal front end

use crate::protocol::{ConferenceEvent, Decision, FileDescriptor, HitlDecision};

pub const DECISION_PROMPT: &str =
    "Decision? [a]pprove | [r]evision <feedback> | [x] reject <feedback>";

/// One event as transcript text (may span several lines)
pub fn format_event(event: &ConferenceEvent) -> String {
    let fields = event.fields();
    let mut out = String::new();

    if let Some(title) = &fields.parallel.group_title {
        out.push_str(&format!("== {title} ==\n"));
    }

    let body = match event {
        ConferenceEvent::HitlSessionStart {
            session_id,
            max_revisions,
            ..
        } => {
            let session = match session_id {
                Some(id) => format!("HITL session {id}"),
                None => "HITL session".to_string(),
            };
            match max_revisions {
                Some(max) => format!("{session} started (up to {max} revisions)"),
                None => format!("{session} started"),
            }
        }
        ConferenceEvent::HitlAwaitingInput {
            proposal,
            revision_count,
            max_revisions,
            ..
        } => {
            let revision = revision_count.unwrap_or(0);
            let header = match max_revisions {
                Some(max) => format!("Proposal (revision {revision}/{max}):"),
                None => format!("Proposal (revision {revision}):"),
            };
            format!(
                "{header}\n{}\n{DECISION_PROMPT}",
                proposal.as_deref().unwrap_or_default()
            )
        }
        ConferenceEvent::HitlUserDecision { .. } => fields.content.clone().unwrap_or_default(),
        ConferenceEvent::ConferenceComplete { .. } => match fields.content.as_deref() {
            Some(content) if !content.is_empty() => format!("Conference complete\n{content}"),
            _ => "Conference complete".to_string(),
        },
        ConferenceEvent::Error { error, .. } => {
            let detail = error
                .as_deref()
                .or(fields.content.as_deref())
                .unwrap_or("unknown error");
            format!("Error: {detail}")
        }
        ConferenceEvent::Progress { kind, .. } => format_progress(kind, event),
    };
    out.push_str(&body);

    if let Some(file) = &fields.file {
        out.push_str(&format!("\n{}", format_file(file)));
    }
    out
}

fn format_progress(kind: &str, event: &ConferenceEvent) -> String {
    let fields = event.fields();
    let parallel = &fields.parallel;

    let speaker = match (&fields.node, parallel.parallel_index, parallel.parallel_total) {
        (Some(node), Some(index), Some(total)) => format!("[{node} {}/{total}]", index + 1),
        (Some(node), _, _) => format!("[{node}]"),
        (None, _, _) => format!("<{kind}>"),
    };

    match fields.content.as_deref() {
        Some(content) => format!("{speaker} {content}"),
        None => match &parallel.next_node {
            Some(next) => format!("{speaker} -> {next}"),
            None => speaker,
        },
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_file(file: &FileDescriptor) -> String {
    match file.size {
        Some(size) => format!("[file] {} ({:.1} KB)", file.filename, size as f64 / 1024.0),
        None => format!("[file] {}", file.filename),
    }
}

/// Parse a typed decision such as `r tighten the budget`
pub fn parse_decision_line(line: &str) -> Result<HitlDecision, String> {
    let line = line.trim();
    let (word, feedback) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    if word.is_empty() {
        return Err("empty decision".to_string());
    }
    let decision: Decision = word.parse()?;
    Ok(HitlDecision::new(decision, feedback.trim()))
}
