//! Domain types for the Memory service, independent of the wire format.
//!
//! The gRPC server module converts between these and the generated proto
//! types; the persistent-store trait and the in-memory matching cache only
//! ever see these.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scalar + vector salience evaluated for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalienceVector {
    pub threat: f32,
    pub salience: f32,
    pub habituation: f32,
    pub novelty: f32,
    pub goal_relevance: f32,
    pub opportunity: f32,
    pub actionability: f32,
    pub social: f32,
    pub model_id: String,
}

impl Default for SalienceVector {
    fn default() -> Self {
        Self {
            threat: 0.5,
            salience: 0.5,
            habituation: 0.5,
            novelty: 0.5,
            goal_relevance: 0.5,
            opportunity: 0.5,
            actionability: 0.5,
            social: 0.5,
            model_id: String::new(),
        }
    }
}

/// The action a heuristic suggests or applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    #[serde(rename = "type")]
    pub action_type: String, // suggest | remind | warn
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionPath {
    Heuristic,
    Llm,
    NoExecutive,
}

impl DecisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPath::Heuristic => "heuristic",
            DecisionPath::Llm => "llm",
            DecisionPath::NoExecutive => "no_executive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heuristic" => Some(DecisionPath::Heuristic),
            "llm" => Some(DecisionPath::Llm),
            "no_executive" => Some(DecisionPath::NoExecutive),
            _ => None,
        }
    }
}

/// A persisted event plus the routing decision made for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEvent {
    pub id: Uuid,
    pub timestamp_ms: i64,
    pub source: String,
    pub raw_text: String,
    pub embedding: Vec<f32>,
    pub salience: Option<SalienceVector>,
    pub structured_json: String,
    pub entity_ids: Vec<Uuid>,
    pub decision_path: Option<String>,
    pub matched_heuristic_id: Option<String>,
    pub response_id: String,
    pub response_text: String,
    pub llm_prompt_text: String,
    pub predicted_success: f32,
    pub prediction_confidence: f32,
}

/// A learned condition -> action rule with a Beta(1,1) posterior confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heuristic {
    pub id: Uuid,
    pub name: String,
    pub condition_text: String,
    pub condition_embedding: Vec<f32>,
    pub effects: Effects,
    pub confidence: f32,
    pub origin: String, // built_in | pack | learned | user
    pub origin_id: String,
    pub fire_count: i64,
    pub success_count: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub frozen: bool,
}

impl Heuristic {
    /// Beta(1,1) posterior mean given the current fire/success counters.
    pub fn expected_confidence(&self) -> f32 {
        (1.0 + self.success_count as f32) / (2.0 + self.fire_count as f32)
    }
}

/// A heuristic paired with how well it matched a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicMatch {
    pub heuristic: Heuristic,
    pub similarity: f32,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireOutcome {
    Unknown,
    Success,
    Fail,
}

impl FireOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FireOutcome::Unknown => "unknown",
            FireOutcome::Success => "success",
            FireOutcome::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(FireOutcome::Unknown),
            "success" => Some(FireOutcome::Success),
            "fail" => Some(FireOutcome::Fail),
            _ => None,
        }
    }
}

/// A record that a heuristic was offered or applied in response to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicFire {
    pub id: Uuid,
    pub heuristic_id: Uuid,
    pub event_id: String,
    pub fired_at_ms: i64,
    pub outcome: FireOutcome,
    pub feedback_source: String,
    pub episodic_event_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_path_roundtrip() {
        for p in [DecisionPath::Heuristic, DecisionPath::Llm, DecisionPath::NoExecutive] {
            assert_eq!(DecisionPath::parse(p.as_str()), Some(p));
        }
    }

    #[test]
    fn test_expected_confidence_matches_formula() {
        let mut h = sample_heuristic();
        h.fire_count = 0;
        h.success_count = 0;
        assert!((h.expected_confidence() - 0.5).abs() < 1e-6);

        h.fire_count = 1;
        h.success_count = 1;
        assert!((h.expected_confidence() - (2.0 / 3.0)).abs() < 1e-6);

        h.fire_count = 2;
        h.success_count = 1;
        assert!((h.expected_confidence() - 0.5).abs() < 1e-6);
    }

    fn sample_heuristic() -> Heuristic {
        Heuristic {
            id: Uuid::new_v4(),
            name: "test".into(),
            condition_text: "the oven timer has expired and needs attention".into(),
            condition_embedding: vec![],
            effects: Effects { action_type: "suggest".into(), message: "turn off the oven soon please".into() },
            confidence: 0.5,
            origin: "learned".into(),
            origin_id: String::new(),
            fire_count: 0,
            success_count: 0,
            created_at_ms: 0,
            updated_at_ms: 0,
            frozen: false,
        }
    }
}
