//! Salience evaluation and the max-salience rollup used for priority and
//! the emergency fast-path check.
//!
//! The fallback chain (client-supplied override first, evaluated salience
//! second) and the neutral-default behavior match the original routing
//! module; the evaluation itself is a lightweight keyword heuristic here
//! since this workspace does not own a standalone salience-model service.

use gladys_memory::domain::SalienceVector;
use gladys_proto::types::SalienceVector as ProtoSalienceVector;

const THREAT_KEYWORDS: &[&str] =
    &["smoke", "fire", "alarm", "emergency", "danger", "gas leak", "intruder", "flood"];
const OPPORTUNITY_KEYWORDS: &[&str] = &["sale", "discount", "available", "opening"];

pub fn from_proto(proto: &ProtoSalienceVector) -> SalienceVector {
    SalienceVector {
        threat: proto.threat,
        salience: proto.salience,
        habituation: proto.habituation,
        novelty: proto.novelty,
        goal_relevance: proto.goal_relevance,
        opportunity: proto.opportunity,
        actionability: proto.actionability,
        social: proto.social,
        model_id: proto.model_id.clone(),
    }
}

pub fn to_proto(v: &SalienceVector) -> ProtoSalienceVector {
    ProtoSalienceVector {
        threat: v.threat,
        salience: v.salience,
        habituation: v.habituation,
        novelty: v.novelty,
        goal_relevance: v.goal_relevance,
        opportunity: v.opportunity,
        actionability: v.actionability,
        social: v.social,
        model_id: v.model_id.clone(),
    }
}

/// Evaluates salience for event text when the caller did not supply one.
pub trait SalienceProvider: Send + Sync {
    fn evaluate(&self, event_text: &str) -> SalienceVector;
}

/// Neutral-by-default provider with a small keyword bump for threat and
/// opportunity, so the emergency fast path and priority ordering have
/// something to react to without depending on an external model. Any
/// dimension not targeted by a keyword stays at the neutral baseline.
pub struct DefaultSalienceProvider;

impl DefaultSalienceProvider {
    fn neutral() -> SalienceVector {
        SalienceVector {
            threat: 0.1,
            salience: 0.1,
            habituation: 0.0,
            novelty: 0.1,
            goal_relevance: 0.1,
            opportunity: 0.1,
            actionability: 0.1,
            social: 0.1,
            model_id: "keyword_default".to_string(),
        }
    }
}

impl SalienceProvider for DefaultSalienceProvider {
    fn evaluate(&self, event_text: &str) -> SalienceVector {
        let mut salience = Self::neutral();
        let text_lower = event_text.to_lowercase();
        if THREAT_KEYWORDS.iter().any(|kw| text_lower.contains(kw)) {
            salience.threat = 0.95;
            salience.salience = 0.9;
            salience.actionability = 0.8;
        }
        if OPPORTUNITY_KEYWORDS.iter().any(|kw| text_lower.contains(kw)) {
            salience.opportunity = 0.7;
            salience.salience = salience.salience.max(0.5);
        }
        salience
    }
}

/// Resolve salience for an incoming event: an explicit client override wins,
/// otherwise fall back to the provider's evaluation.
pub fn resolve_salience(
    provider: &dyn SalienceProvider,
    event_text: &str,
    client_override: Option<&ProtoSalienceVector>,
) -> SalienceVector {
    match client_override {
        Some(proto) => from_proto(proto),
        None => provider.evaluate(event_text),
    }
}

/// The maximum of every dimension except habituation (a habituated event
/// should not win priority purely by being salient in some other way that
/// repeated exposure has already dulled).
pub fn max_salience(v: &SalienceVector) -> f32 {
    [v.threat, v.salience, v.novelty, v.goal_relevance, v.opportunity, v.actionability, v.social]
        .into_iter()
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_default_has_low_salience() {
        let provider = DefaultSalienceProvider;
        let v = provider.evaluate("the dishwasher finished its cycle");
        assert!(max_salience(&v) < 0.5);
    }

    #[test]
    fn test_threat_keyword_drives_up_threat_and_salience() {
        let provider = DefaultSalienceProvider;
        let v = provider.evaluate("the smoke alarm is sounding loudly");
        assert!(v.threat >= 0.9);
        assert!(max_salience(&v) >= 0.9);
    }

    #[test]
    fn test_max_salience_excludes_habituation() {
        let v = SalienceVector {
            threat: 0.1,
            salience: 0.1,
            habituation: 0.99,
            novelty: 0.1,
            goal_relevance: 0.1,
            opportunity: 0.1,
            actionability: 0.1,
            social: 0.1,
            model_id: String::new(),
        };
        assert!((max_salience(&v) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_client_override_wins_over_provider() {
        let provider = DefaultSalienceProvider;
        let override_proto = ProtoSalienceVector {
            threat: 0.99,
            salience: 0.99,
            habituation: 0.0,
            novelty: 0.0,
            goal_relevance: 0.0,
            opportunity: 0.0,
            actionability: 0.0,
            social: 0.0,
            model_id: "client".to_string(),
        };
        let resolved = resolve_salience(&provider, "the dishwasher finished", Some(&override_proto));
        assert!((resolved.threat - 0.99).abs() < 1e-6);
    }
}
