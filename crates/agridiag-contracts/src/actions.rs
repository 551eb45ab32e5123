use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A user-triggerable operation. Each action owns one result slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    FindDisease,
    #[serde(rename = "suggestions-advice")]
    ManagementAdvice,
    #[serde(rename = "custom")]
    CustomQuestion,
}

impl Action {
    pub const ALL: [Action; 3] = [
        Action::FindDisease,
        Action::ManagementAdvice,
        Action::CustomQuestion,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Action::FindDisease => "find-disease",
            Action::ManagementAdvice => "suggestions-advice",
            Action::CustomQuestion => "custom",
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            Action::FindDisease => "Likely disease(s) & diagnostic clues",
            Action::ManagementAdvice => "Practical suggestions & monitoring plan",
            Action::CustomQuestion => "Model answer to your question",
        }
    }

    /// Status line shown while the request for this action is in flight.
    pub fn pending_label(self) -> &'static str {
        match self {
            Action::FindDisease => "Analyzing image for likely disease...",
            Action::ManagementAdvice => {
                "Generating management suggestions and safety advice..."
            }
            Action::CustomQuestion => "Asking the model about your custom question...",
        }
    }

    /// Default thinking budget sent with the request. The two catalog
    /// prompts get more deliberation than a free-form question.
    pub fn default_thinking_budget(self) -> u32 {
        match self {
            Action::FindDisease => 500,
            Action::ManagementAdvice => 400,
            Action::CustomQuestion => 200,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}' (expected find-disease, suggestions-advice or custom)")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "find-disease" | "disease" => Ok(Action::FindDisease),
            "suggestions-advice" | "advice" | "suggestions" => Ok(Action::ManagementAdvice),
            "custom" | "ask" => Ok(Action::CustomQuestion),
            _ => Err(UnknownAction(raw.trim().to_string())),
        }
    }
}
