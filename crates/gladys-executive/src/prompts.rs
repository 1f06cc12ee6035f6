//! Prompt text sent to the text-generation backend.
//!
//! Kept as plain constants rather than a templating engine — there's one
//! call site per prompt and the substitutions are simple string formatting.

pub const SYSTEM_PROMPT: &str = "You are GLADyS, an assistant observing events in a user's \
environment. When given an event, briefly acknowledge what happened and suggest any relevant \
action. Keep the response to one or two sentences. Prioritize high-threat events; for routine \
events a short acknowledgment is enough.";

pub fn build_event_prompt(event_context: &str, suggestion: Option<(&str, &str, f32)>, candidate_conditions: &[&str]) -> String {
    let mut prompt = format!("Event: {event_context}\n\n");
    if let Some((condition, suggested_action, confidence)) = suggestion {
        prompt.push_str(&format!(
            "A learned pattern matched this situation:\n- Pattern: \"{condition}\"\n- \
Suggested action: \"{suggested_action}\"\n- Confidence: {:.0}%\n\nConsider this suggestion in \
your response.\n\n",
            confidence * 100.0
        ));
    }
    if !candidate_conditions.is_empty() {
        prompt.push_str("Other patterns that matched this situation less strongly, for context only:\n");
        for condition in candidate_conditions {
            prompt.push_str(&format!("- \"{condition}\"\n"));
        }
        prompt.push('\n');
    }
    prompt.push_str("How should I respond?");
    prompt
}

pub fn build_prediction_prompt(event_context: &str, response: &str) -> String {
    format!(
        "Situation: {event_context}\nResponse: {response}\n\nPredict the probability this \
response succeeds (0.0-1.0) and your confidence in that prediction (0.0-1.0). Output only \
JSON with no other text: {{\"success\": 0.X, \"confidence\": 0.Y}}"
    )
}

pub fn build_extraction_prompt(context: &str, response: &str) -> String {
    format!(
        "You just helped with this situation:\n\nContext: {context}\nResponse: {response}\n\
User feedback: positive\n\n\
Extract a generalizable heuristic for similar future situations.\n\n\
Rules:\n\
- condition: describe a situation, not a person. 10 to 50 words. No proper nouns or specific \
numbers.\n\
- action.type: one of \"suggest\", \"remind\", \"warn\".\n\
- action.message: the advice to give, 10 to 50 words.\n\n\
Output valid JSON only: {{\"condition\": \"...\", \"action\": {{\"type\": \"...\", \"message\": \"...\"}}}}"
    )
}

/// Strips a leading/trailing markdown code fence a model sometimes wraps JSON in.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_removes_fences() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_passthrough_without_fence() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_build_event_prompt_includes_suggestion() {
        let prompt = build_event_prompt("[kitchen]: the oven timer expired", Some(("oven timer condition", "turn it off", 0.5)), &[]);
        assert!(prompt.contains("learned pattern"));
        assert!(prompt.contains("50%"));
    }

    #[test]
    fn test_build_event_prompt_includes_candidates() {
        let prompt = build_event_prompt("[kitchen]: the oven timer expired", None, &["stove left on condition"]);
        assert!(prompt.contains("Other patterns"));
        assert!(prompt.contains("stove left on condition"));
    }
}
