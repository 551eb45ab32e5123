//! Fixed instruction texts sent alongside the uploaded image.
//!
//! Every function here is pure: the same input always yields the same
//! string, so the texts can be pinned by tests.

use crate::actions::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Please enter a custom question before asking.")]
pub struct EmptyQuestionError;

const FIND_DISEASE_PROMPT: &str = "You are an expert plant pathologist and agronomist. Analyze the supplied image and:\n\
1) Name the most likely disease(s) or disorder(s) (be explicit about uncertainty).\n\
2) List the visible symptoms you see (e.g., leaf spots, lesions, discoloration, wilting) linked to the image.\n\
3) Suggest the most probable causal agent (fungus, bacteria, virus, nutrient deficiency, abiotic stress) and why.\n\
4) Provide a short confidence estimate (low/medium/high) and what additional observations or simple tests would increase confidence.\n\
Answer concisely in bullet points and prioritize actionable diagnostic clues.";

const MANAGEMENT_ADVICE_PROMPT: &str = "You are an experienced crop protection specialist. Based on the supplied image and likely disease/disorder, provide practical control and management advice in order:\n\
A) Immediate short-term actions (isolation, sanitation, removal of affected tissue).\n\
B) Cultural and non-chemical solutions (crop rotation, irrigation changes, pruning, resistant varieties).\n\
C) If chemical control is recommended: list pesticide types (active ingredient classes, never brand names), approximate application rates or guidance (give ranges), and safety/environmental precautions.\n\
D) Monitoring plan: what to watch for, when to re-check, and when to seek lab confirmation.\n\
End with a short list of low-cost confirmatory tests or photos to take for diagnosis.";

pub fn find_disease() -> &'static str {
    FIND_DISEASE_PROMPT
}

pub fn management_advice() -> &'static str {
    MANAGEMENT_ADVICE_PROMPT
}

/// Wraps a user question so the model answers from the image and states
/// its assumptions. The question is embedded verbatim.
pub fn custom(question: &str) -> Result<String, EmptyQuestionError> {
    if question.trim().is_empty() {
        return Err(EmptyQuestionError);
    }
    Ok(format!(
        "You are a helpful plant pathology assistant. Use the image to inform your answer.\n\n\
         User question: {question}\n\n\
         Provide a concise, practical answer and list any assumptions you made."
    ))
}

/// Prompt text for `action`. `question` is only read for the custom action.
pub fn resolve(action: Action, question: Option<&str>) -> Result<String, EmptyQuestionError> {
    match action {
        Action::FindDisease => Ok(find_disease().to_string()),
        Action::ManagementAdvice => Ok(management_advice().to_string()),
        Action::CustomQuestion => custom(question.unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::{custom, find_disease, management_advice, resolve, EmptyQuestionError};
    use crate::actions::Action;

    #[test]
    fn blank_custom_questions_are_rejected() {
        assert_eq!(custom(""), Err(EmptyQuestionError));
        assert_eq!(custom("   "), Err(EmptyQuestionError));
        assert_eq!(custom("\n\t "), Err(EmptyQuestionError));
    }

    #[test]
    fn custom_prompt_embeds_question_verbatim() {
        let prompt = custom("Is this fungal?").unwrap();
        assert!(prompt.contains("Is this fungal?"));
        assert!(prompt.contains("list any assumptions you made"));
        assert!(prompt.starts_with("You are a helpful plant pathology assistant."));
    }

    #[test]
    fn custom_prompt_keeps_surrounding_whitespace_of_question() {
        let prompt = custom("  why yellow?  ").unwrap();
        assert!(prompt.contains("User question:   why yellow?  \n"));
    }

    #[test]
    fn fixed_prompts_are_stable() {
        assert_eq!(find_disease(), find_disease());
        assert_eq!(management_advice(), management_advice());
        assert_ne!(find_disease(), management_advice());
    }

    #[test]
    fn find_disease_prompt_covers_diagnostic_sections() {
        let prompt = find_disease();
        assert!(prompt.starts_with("You are an expert plant pathologist and agronomist."));
        assert!(prompt.contains("be explicit about uncertainty"));
        assert!(prompt.contains("List the visible symptoms"));
        assert!(prompt.contains("fungus, bacteria, virus, nutrient deficiency, abiotic stress"));
        assert!(prompt.contains("(low/medium/high)"));
        assert!(prompt.contains("would increase confidence"));
    }

    #[test]
    fn management_prompt_lists_sections_in_order() {
        let prompt = management_advice();
        let positions: Vec<usize> = ["A) Immediate", "B) Cultural", "C) If chemical", "D) Monitoring"]
            .iter()
            .map(|marker| prompt.find(marker).expect("missing section"))
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(prompt.contains("never brand names"));
        assert!(prompt.contains("safety/environmental precautions"));
    }

    #[test]
    fn resolve_maps_actions_to_catalog() {
        assert_eq!(resolve(Action::FindDisease, None).unwrap(), find_disease());
        assert_eq!(
            resolve(Action::ManagementAdvice, Some("ignored")).unwrap(),
            management_advice()
        );
        assert_eq!(resolve(Action::CustomQuestion, None), Err(EmptyQuestionError));
        assert!(resolve(Action::CustomQuestion, Some("What disease is this?"))
            .unwrap()
            .contains("What disease is this?"));
    }
}
