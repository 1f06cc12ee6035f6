//! The quality gate applied to a heuristic extracted from positive feedback,
//! before it is ever stored.

use gladys_common::word_count;

const MIN_WORDS: usize = 10;
const MAX_WORDS: usize = 50;
const VALID_ACTION_TYPES: [&str; 3] = ["suggest", "remind", "warn"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedHeuristic {
    pub condition: String,
    pub action_type: String,
    pub action_message: String,
}

/// Parses the `{condition, action: {type, message}}` JSON a backend returns.
pub fn parse_extracted(value: &serde_json::Value) -> Result<ExtractedHeuristic, String> {
    let condition = value.get("condition").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
    if condition.is_empty() {
        return Err("missing 'condition'".to_string());
    }
    let action = value.get("action").ok_or_else(|| "missing 'action'".to_string())?;
    let action_type = action.get("type").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let action_message = action.get("message").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
    Ok(ExtractedHeuristic { condition, action_type, action_message })
}

/// Returns an error message describing the first violated rule, or `Ok(())`.
pub fn check_heuristic_quality(heuristic: &ExtractedHeuristic) -> Result<(), String> {
    let condition_words = word_count(&heuristic.condition);
    if condition_words < MIN_WORDS {
        return Err(format!("condition too short ({condition_words} words, minimum {MIN_WORDS})"));
    }
    if condition_words > MAX_WORDS {
        return Err(format!("condition too long ({condition_words} words, maximum {MAX_WORDS})"));
    }

    if !VALID_ACTION_TYPES.contains(&heuristic.action_type.as_str()) {
        return Err(format!("action type must be suggest/remind/warn, got '{}'", heuristic.action_type));
    }

    if heuristic.action_message.is_empty() {
        return Err("action missing required field 'message'".to_string());
    }
    let message_words = word_count(&heuristic.action_message);
    if message_words < MIN_WORDS {
        return Err(format!("action message too short ({message_words} words, minimum {MIN_WORDS})"));
    }
    if message_words > MAX_WORDS {
        return Err(format!("action message too long ({message_words} words, maximum {MAX_WORDS})"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> ExtractedHeuristic {
        ExtractedHeuristic {
            condition: "When a player's health drops below a critical threshold during combat and items are available".to_string(),
            action_type: "suggest".to_string(),
            action_message: "Use a healing item before continuing the fight to avoid being defeated in combat".to_string(),
        }
    }

    #[test]
    fn test_parse_extracted_requires_condition() {
        let value = json!({"action": {"type": "suggest", "message": "do it"}});
        assert!(parse_extracted(&value).is_err());
    }

    #[test]
    fn test_parse_extracted_happy_path() {
        let value = json!({"condition": "c", "action": {"type": "warn", "message": "m"}});
        let parsed = parse_extracted(&value).unwrap();
        assert_eq!(parsed.condition, "c");
        assert_eq!(parsed.action_type, "warn");
    }

    #[test]
    fn test_quality_gate_accepts_well_formed_heuristic() {
        assert!(check_heuristic_quality(&valid()).is_ok());
    }

    #[test]
    fn test_quality_gate_rejects_short_condition() {
        let mut h = valid();
        h.condition = "too short".to_string();
        assert!(check_heuristic_quality(&h).is_err());
    }

    #[test]
    fn test_quality_gate_rejects_unknown_action_type() {
        let mut h = valid();
        h.action_type = "ignore".to_string();
        assert!(check_heuristic_quality(&h).is_err());
    }

    #[test]
    fn test_quality_gate_rejects_short_message() {
        let mut h = valid();
        h.action_message = "do it now".to_string();
        assert!(check_heuristic_quality(&h).is_err());
    }
}
