use std::collections::BTreeMap;

use agridiag_contracts::actions::Action;
use agridiag_contracts::results::InferenceResult;

/// Lifecycle of one action's result slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Pending,
    DisplayedSuccess,
    DisplayedFailure,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    pending: bool,
    result: Option<InferenceResult>,
}

/// Last result per action plus the action currently on display.
#[derive(Debug, Clone, Default)]
pub struct ResultPresenter {
    slots: BTreeMap<Action, Slot>,
    active: Option<Action>,
}

impl ResultPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `action` as in flight. The previous result stays readable
    /// through `result` until `record` replaces it.
    pub fn begin(&mut self, action: Action) {
        self.slots.entry(action).or_default().pending = true;
    }

    /// Stores `result` for `action` and makes it the active one.
    pub fn record(&mut self, action: Action, result: InferenceResult) -> &InferenceResult {
        self.active = Some(action);
        let slot = self.slots.entry(action).or_default();
        slot.pending = false;
        slot.result.insert(result)
    }

    pub fn state(&self, action: Action) -> SlotState {
        match self.slots.get(&action) {
            Some(Slot { pending: true, .. }) => SlotState::Pending,
            Some(Slot {
                result: Some(result),
                ..
            }) if result.is_success() => SlotState::DisplayedSuccess,
            Some(Slot {
                result: Some(_), ..
            }) => SlotState::DisplayedFailure,
            _ => SlotState::Idle,
        }
    }

    pub fn result(&self, action: Action) -> Option<&InferenceResult> {
        self.slots.get(&action).and_then(|slot| slot.result.as_ref())
    }

    pub fn active(&self) -> Option<Action> {
        self.active
    }

    /// Renders only the active action.
    pub fn render(&self) -> Option<String> {
        self.render_action(self.active?)
    }

    pub fn render_action(&self, action: Action) -> Option<String> {
        let slot = self.slots.get(&action)?;
        if slot.pending {
            return Some(format!(
                "## {}\n\n{}",
                action.heading(),
                action.pending_label()
            ));
        }
        slot.result
            .as_ref()
            .map(|result| render_result(action, result))
    }
}

pub fn render_result(action: Action, result: &InferenceResult) -> String {
    match result {
        InferenceResult::Success { text } => format!("## {}\n\n{}", action.heading(), text),
        InferenceResult::Failure { kind, message } => {
            format!("## {}\n\n[{}] {}", action.heading(), kind, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use agridiag_contracts::actions::Action;
    use agridiag_contracts::results::{FailureKind, InferenceResult};

    use super::{ResultPresenter, SlotState};

    #[test]
    fn empty_presenter_renders_nothing() {
        let presenter = ResultPresenter::new();
        assert_eq!(presenter.render(), None);
        assert_eq!(presenter.active(), None);
        for action in Action::ALL {
            assert_eq!(presenter.state(action), SlotState::Idle);
            assert_eq!(presenter.result(action), None);
        }
    }

    #[test]
    fn record_sets_active_and_renders_heading_with_text() {
        let mut presenter = ResultPresenter::new();
        presenter.begin(Action::CustomQuestion);
        assert_eq!(presenter.state(Action::CustomQuestion), SlotState::Pending);
        presenter.record(
            Action::CustomQuestion,
            InferenceResult::success("Likely disease: Leaf Blight"),
        );
        assert_eq!(presenter.active(), Some(Action::CustomQuestion));
        assert_eq!(
            presenter.state(Action::CustomQuestion),
            SlotState::DisplayedSuccess
        );
        assert_eq!(
            presenter.render().as_deref(),
            Some("## Model answer to your question\n\nLikely disease: Leaf Blight")
        );
    }

    #[test]
    fn failure_renders_banner_with_kind_and_message() {
        let mut presenter = ResultPresenter::new();
        presenter.record(
            Action::FindDisease,
            InferenceResult::success("Early blight"),
        );
        presenter.record(
            Action::ManagementAdvice,
            InferenceResult::failure(FailureKind::QuotaOrRateLimitError, "Quota exceeded"),
        );
        assert_eq!(
            presenter.state(Action::ManagementAdvice),
            SlotState::DisplayedFailure
        );
        let rendered = presenter.render().unwrap_or_default();
        assert!(rendered.starts_with("## Practical suggestions & monitoring plan"));
        assert!(rendered.contains("[QuotaOrRateLimitError] Quota exceeded"));
        assert_eq!(
            presenter.result(Action::FindDisease),
            Some(&InferenceResult::success("Early blight"))
        );
    }

    #[test]
    fn rerunning_an_action_overwrites_only_its_slot() {
        let mut presenter = ResultPresenter::new();
        presenter.record(Action::FindDisease, InferenceResult::success("first"));
        presenter.record(Action::ManagementAdvice, InferenceResult::success("advice"));
        presenter.record(Action::FindDisease, InferenceResult::success("second"));

        assert_eq!(presenter.active(), Some(Action::FindDisease));
        assert_eq!(
            presenter.result(Action::FindDisease),
            Some(&InferenceResult::success("second"))
        );
        assert_eq!(
            presenter.result(Action::ManagementAdvice),
            Some(&InferenceResult::success("advice"))
        );
        assert_eq!(presenter.result(Action::CustomQuestion), None);
    }

    #[test]
    fn pending_slot_keeps_previous_result_until_recorded() {
        let mut presenter = ResultPresenter::new();
        presenter.record(Action::FindDisease, InferenceResult::success("first"));
        presenter.begin(Action::FindDisease);
        assert_eq!(presenter.state(Action::FindDisease), SlotState::Pending);
        assert_eq!(
            presenter.result(Action::FindDisease),
            Some(&InferenceResult::success("first"))
        );
        let rendered = presenter.render().unwrap_or_default();
        assert!(rendered.contains("Analyzing image for likely disease..."));
    }

    #[test]
    fn render_action_shows_inactive_slots() {
        let mut presenter = ResultPresenter::new();
        presenter.record(Action::FindDisease, InferenceResult::success("blight"));
        presenter.record(Action::CustomQuestion, InferenceResult::success("answer"));
        assert_eq!(
            presenter.render_action(Action::FindDisease).as_deref(),
            Some("## Likely disease(s) & diagnostic clues\n\nblight")
        );
        assert_eq!(presenter.render_action(Action::ManagementAdvice), None);
    }
}
