use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::results::{FailureKind, InferenceResult};

/// Everything a session records, one variant per line type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        provider: String,
        model: String,
        soft_limit_bytes: u64,
    },
    ImageNormalized {
        name: String,
        width: u32,
        height: u32,
        bytes: usize,
        warning: Option<String>,
    },
    UploadRejected {
        name: String,
        error: String,
    },
    ActionRejected {
        action: Action,
        reason: String,
    },
    ActionStarted {
        action: Action,
        thinking_budget: u32,
        image_bytes: usize,
    },
    ActionFinished {
        action: Action,
        latency_ms: u64,
        outcome: Outcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chars: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<FailureKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl SessionEvent {
    /// Summarizes a finished call. Success text is reduced to its length.
    pub fn action_finished(action: Action, latency_ms: u64, result: &InferenceResult) -> Self {
        match result {
            InferenceResult::Success { text } => SessionEvent::ActionFinished {
                action,
                latency_ms,
                outcome: Outcome::Success,
                chars: Some(text.chars().count()),
                kind: None,
                message: None,
            },
            InferenceResult::Failure { kind, message } => SessionEvent::ActionFinished {
                action,
                latency_ms,
                outcome: Outcome::Failure,
                chars: None,
                kind: Some(*kind),
                message: Some(message.clone()),
            },
        }
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    session_id: &'a str,
    ts: String,
    #[serde(flatten)]
    event: &'a SessionEvent,
}

/// Append-only JSON-lines log of one session. Each line is the event
/// tagged with `type`, plus `session_id` and `ts`.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn emit(&self, event: &SessionEvent) -> anyhow::Result<()> {
        let record = EventRecord {
            session_id: &self.session_id,
            ts: now_utc_iso(),
            event,
        };
        let line = serde_json::to_string(&record)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed creating {}", parent.display()))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed opening {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
