use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agridiag_contracts::actions::Action;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SECRETS_PATH: &str = ".agridiag/secrets.env";
/// Advisory ceiling for the canonical image, a little under the service's
/// ~20MB inline payload limit.
pub const DEFAULT_SOFT_LIMIT_BYTES: u64 = 18 * 1024 * 1024;

const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Gemini API key not set. Set GEMINI_API_KEY in the environment or in {}.",
        .secrets_path.display()
    )]
    MissingCredential { secrets_path: PathBuf },
    #[error("failed to read secrets file {}: {source}", .path.display())]
    Secrets {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Values supplied on the command line. Anything left unset falls back to
/// the environment, then to the built-in default.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: Option<f64>,
    pub soft_limit_mb: Option<f64>,
    pub thinking_budget: Option<u32>,
    pub secrets_path: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment(&'static str),
    SecretsFile,
}

#[derive(Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub credential_source: CredentialSource,
    pub api_base: String,
    pub model: String,
    pub request_timeout: Option<Duration>,
    pub soft_limit_bytes: u64,
    pub thinking_budget_override: Option<u32>,
    pub events_path: Option<PathBuf>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("credential_source", &self.credential_source)
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("soft_limit_bytes", &self.soft_limit_bytes)
            .field("thinking_budget_override", &self.thinking_budget_override)
            .field("events_path", &self.events_path)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub soft_limit_bytes: u64,
    pub thinking_budget_override: Option<u32>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            soft_limit_bytes: DEFAULT_SOFT_LIMIT_BYTES,
            thinking_budget_override: None,
        }
    }
}

impl SessionSettings {
    pub fn thinking_budget(&self, action: Action) -> u32 {
        self.thinking_budget_override
            .unwrap_or_else(|| action.default_thinking_budget())
    }
}

impl AppConfig {
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, &|key| env::var(key).ok())
    }

    pub fn resolve_with(
        overrides: ConfigOverrides,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let secrets_path = overrides
            .secrets_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_PATH));
        let (api_key, credential_source) = match API_KEY_VARS
            .iter()
            .find_map(|key| non_empty(*key).map(|value| (value, *key)))
        {
            Some((value, key)) => (value, CredentialSource::Environment(key)),
            None => {
                let explicit = overrides.secrets_path.is_some();
                match api_key_from_secrets(&secrets_path, explicit)? {
                    Some(value) => (value, CredentialSource::SecretsFile),
                    None => return Err(ConfigError::MissingCredential { secrets_path }),
                }
            }
        };

        let api_base = overrides
            .api_base
            .or_else(|| non_empty("GEMINI_API_BASE"))
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = overrides
            .model
            .or_else(|| non_empty("AGRIDIAG_MODEL"))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = match overrides.timeout_secs {
            Some(value) => Some(value),
            None => parse_env_f64(&non_empty, "AGRIDIAG_REQUEST_TIMEOUT_SECS")?,
        };
        let request_timeout = match timeout_secs {
            Some(secs) if !secs.is_finite() || secs <= 0.0 => {
                return Err(ConfigError::Invalid {
                    key: "request timeout",
                    value: secs.to_string(),
                    reason: "must be a positive number of seconds",
                });
            }
            Some(secs) => Some(Duration::try_from_secs_f64(secs).map_err(|_| {
                ConfigError::Invalid {
                    key: "request timeout",
                    value: secs.to_string(),
                    reason: "too large to represent as a duration",
                }
            })?),
            None => None,
        };

        let soft_limit_mb = match overrides.soft_limit_mb {
            Some(value) => Some(value),
            None => parse_env_f64(&non_empty, "AGRIDIAG_SOFT_LIMIT_MB")?,
        };
        let soft_limit_bytes = match soft_limit_mb {
            Some(mb) if !mb.is_finite() || mb <= 0.0 => {
                return Err(ConfigError::Invalid {
                    key: "soft size limit",
                    value: mb.to_string(),
                    reason: "must be a positive number of megabytes",
                });
            }
            Some(mb) => (mb * 1024.0 * 1024.0).round() as u64,
            None => DEFAULT_SOFT_LIMIT_BYTES,
        };

        let thinking_budget_override = match overrides.thinking_budget {
            Some(value) => Some(value),
            None => match non_empty("AGRIDIAG_THINKING_BUDGET") {
                Some(raw) => Some(raw.parse::<u32>().map_err(|_| ConfigError::Invalid {
                    key: "AGRIDIAG_THINKING_BUDGET",
                    value: raw.clone(),
                    reason: "must be a non-negative integer",
                })?),
                None => None,
            },
        };

        Ok(Self {
            api_key,
            credential_source,
            api_base,
            model,
            request_timeout,
            soft_limit_bytes,
            thinking_budget_override,
            events_path: overrides.events_path,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            soft_limit_bytes: self.soft_limit_bytes,
            thinking_budget_override: self.thinking_budget_override,
        }
    }
}

fn parse_env_f64(
    non_empty: &dyn Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<f64>, ConfigError> {
    let Some(raw) = non_empty(key) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be a number",
        })
}

/// Reads the API key from a dotenv-style secrets file without touching the
/// process environment. A missing file is only an error when the caller
/// named it explicitly.
fn api_key_from_secrets(path: &Path, explicit: bool) -> Result<Option<String>, ConfigError> {
    if !explicit && !path.exists() {
        return Ok(None);
    }
    let entries = dotenvy::from_path_iter(path).map_err(|source| ConfigError::Secrets {
        path: path.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let (key, value) = entry.map_err(|source| ConfigError::Secrets {
            path: path.to_path_buf(),
            source,
        })?;
        if API_KEY_VARS.contains(&key.as_str()) && !value.trim().is_empty() {
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}
