use std::time::Instant;

use agridiag_contracts::actions::Action;
use agridiag_contracts::events::{EventWriter, SessionEvent};
use agridiag_contracts::prompts::{self, EmptyQuestionError};
use agridiag_contracts::results::InferenceResult;

use crate::config::SessionSettings;
use crate::inference::{InferenceClient, InferenceRequest};
use crate::normalizer::{normalize, CanonicalImage, DecodeError, UploadedImage};
use crate::presenter::ResultPresenter;

/// Why an action was refused before any request went out. Stored results
/// are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionRejected {
    #[error("Please upload an image to get started.")]
    NoImage,
    #[error(transparent)]
    EmptyQuestion(#[from] EmptyQuestionError),
}

#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub canonical_bytes: usize,
    pub warning: Option<String>,
}

/// Everything one user's interaction owns: the current image, the per-action
/// results and the client used to answer them.
pub struct Session {
    id: String,
    settings: SessionSettings,
    client: Box<dyn InferenceClient>,
    image: Option<CanonicalImage>,
    presenter: ResultPresenter,
    events: Option<EventWriter>,
}

impl Session {
    pub fn new(settings: SessionSettings, client: Box<dyn InferenceClient>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            settings,
            client,
            image: None,
            presenter: ResultPresenter::new(),
            events: None,
        }
    }

    /// Attaches a JSON-lines event log and records the session start.
    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self.emit(&SessionEvent::SessionStarted {
            provider: self.client.name().to_string(),
            model: self.client.model().to_string(),
            soft_limit_bytes: self.settings.soft_limit_bytes,
        });
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn presenter(&self) -> &ResultPresenter {
        &self.presenter
    }

    pub fn image(&self) -> Option<&CanonicalImage> {
        self.image.as_ref()
    }

    /// Replaces the current image. A failed upload clears it, so no action
    /// can run until a good image arrives.
    pub fn upload(&mut self, upload: UploadedImage) -> Result<UploadSummary, DecodeError> {
        let normalized = match normalize(&upload, self.settings.soft_limit_bytes) {
            Ok(normalized) => normalized,
            Err(err) => {
                log::warn!("upload {} rejected: {err}", upload.name);
                self.image = None;
                self.emit(&SessionEvent::UploadRejected {
                    name: upload.name,
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let summary = UploadSummary {
            name: upload.name,
            width: normalized.image.width(),
            height: normalized.image.height(),
            canonical_bytes: normalized.image.len(),
            warning: normalized.warning,
        };
        log::info!(
            "uploaded {} ({}x{}, {} bytes canonical)",
            summary.name,
            summary.width,
            summary.height,
            summary.canonical_bytes
        );
        self.emit(&SessionEvent::ImageNormalized {
            name: summary.name.clone(),
            width: summary.width,
            height: summary.height,
            bytes: summary.canonical_bytes,
            warning: summary.warning.clone(),
        });

        self.image = Some(normalized.image);
        Ok(summary)
    }

    /// Runs one action against the current image: one request, no retry.
    pub fn press(
        &mut self,
        action: Action,
        question: Option<&str>,
    ) -> Result<&InferenceResult, ActionRejected> {
        let (image, prompt) = match check_action(self.image.as_ref(), action, question) {
            Ok(checked) => checked,
            Err(rejected) => {
                self.emit(&SessionEvent::ActionRejected {
                    action,
                    reason: rejected.to_string(),
                });
                return Err(rejected);
            }
        };

        let thinking_budget = self.settings.thinking_budget(action);
        let request = InferenceRequest {
            image,
            prompt,
            thinking_budget: Some(thinking_budget),
        };
        self.presenter.begin(action);
        emit_event(
            self.events.as_ref(),
            &SessionEvent::ActionStarted {
                action,
                thinking_budget,
                image_bytes: image.len(),
            },
        );
        log::info!("{}: {}", action, action.pending_label());

        let clock = Instant::now();
        let result = self.client.infer(&request);
        let elapsed_ms = clock.elapsed().as_millis() as u64;
        emit_event(
            self.events.as_ref(),
            &SessionEvent::action_finished(action, elapsed_ms, &result),
        );

        Ok(self.presenter.record(action, result))
    }

    pub fn render(&self) -> Option<String> {
        self.presenter.render()
    }

    fn emit(&self, event: &SessionEvent) {
        emit_event(self.events.as_ref(), event);
    }
}

fn check_action<'a>(
    image: Option<&'a CanonicalImage>,
    action: Action,
    question: Option<&str>,
) -> Result<(&'a CanonicalImage, String), ActionRejected> {
    let image = image.ok_or(ActionRejected::NoImage)?;
    Ok((image, prompts::resolve(action, question)?))
}

/// Event log failures are reported but never interrupt the session.
fn emit_event(events: Option<&EventWriter>, event: &SessionEvent) {
    let Some(events) = events else {
        return;
    };
    if let Err(err) = events.emit(event) {
        log::warn!("failed to append to {}: {err:#}", events.path().display());
    }
}
