use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified reason an inference call did not produce text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    AuthenticationError,
    QuotaOrRateLimitError,
    PayloadTooLargeError,
    ServiceUnavailableError,
    UnknownError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::AuthenticationError => "AuthenticationError",
            FailureKind::QuotaOrRateLimitError => "QuotaOrRateLimitError",
            FailureKind::PayloadTooLargeError => "PayloadTooLargeError",
            FailureKind::ServiceUnavailableError => "ServiceUnavailableError",
            FailureKind::UnknownError => "UnknownError",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one action. The text of a success is opaque prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InferenceResult {
    Success { text: String },
    Failure { kind: FailureKind, message: String },
}

impl InferenceResult {
    pub fn success(text: impl Into<String>) -> Self {
        InferenceResult::Success { text: text.into() }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        InferenceResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InferenceResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            InferenceResult::Success { .. } => None,
            InferenceResult::Failure { kind, .. } => Some(*kind),
        }
    }
}
