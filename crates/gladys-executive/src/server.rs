//! gRPC server implementation for the Executive service.
//!
//! Wires the text-generation backend, the reasoning trace store, and the
//! Memory client together behind the `Executive` trait generated from
//! `executive.proto`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tonic::{Request, Response, Status};
use tracing::{info, warn};
use uuid::Uuid;

use gladys_common::now_ms;
use gladys_memory::client::MemoryClient;
use gladys_proto::executive::executive_server::Executive;
use gladys_proto::executive::{
    GetHealthRequest, HeuristicSuggestion, ProcessEventRequest, ProcessEventResponse,
    ProvideFeedbackRequest, ProvideFeedbackResponse,
};
use gladys_proto::types::{Effects, HealthStatus};

use crate::backend::{BackendError, TextGenerationBackend};
use crate::config::Config;
use crate::prompts::{build_event_prompt, build_extraction_prompt, build_prediction_prompt, SYSTEM_PROMPT};
use crate::quality::{check_heuristic_quality, parse_extracted};
use crate::reasoning_trace::TraceStore;

pub struct ExecutiveService {
    config: Config,
    backend: Arc<dyn TextGenerationBackend>,
    memory: Arc<Mutex<MemoryClient>>,
    traces: Arc<TraceStore>,
    events_received: AtomicU64,
    heuristics_created: AtomicU64,
}

impl ExecutiveService {
    pub fn new(config: Config, backend: Arc<dyn TextGenerationBackend>, memory: MemoryClient) -> Self {
        let traces = Arc::new(TraceStore::new(config.executive.trace_sweep_threshold));
        Self {
            config,
            backend,
            memory: Arc::new(Mutex::new(memory)),
            traces,
            events_received: AtomicU64::new(0),
            heuristics_created: AtomicU64::new(0),
        }
    }

    fn event_context(event: &gladys_proto::types::EpisodicEvent) -> String {
        let mut tags = Vec::new();
        if let Some(salience) = &event.salience {
            if salience.threat > 0.1 {
                tags.push(format!("threat={:.2}", salience.threat));
            }
            if salience.opportunity > 0.1 {
                tags.push(format!("opportunity={:.2}", salience.opportunity));
            }
            if salience.novelty > 0.1 {
                tags.push(format!("novelty={:.2}", salience.novelty));
            }
        }
        let tag_str = if tags.is_empty() { String::new() } else { format!(" [{}]", tags.join(", ")) };
        format!("[{}]{}: {}", event.source, tag_str, event.raw_text)
    }

    async fn process_via_llm(
        &self,
        event: &gladys_proto::types::EpisodicEvent,
        suggestion: Option<&HeuristicSuggestion>,
        candidates: &[HeuristicSuggestion],
    ) -> ProcessEventResponse {
        let context = Self::event_context(event);
        let suggestion_for_prompt = suggestion.map(|s| (s.condition_text.as_str(), render_effects(&s.suggested_action), s.confidence));
        let candidate_conditions: Vec<&str> = candidates.iter().map(|c| c.condition_text.as_str()).filter(|c| !c.is_empty()).collect();
        let prompt = build_event_prompt(
            &context,
            suggestion_for_prompt.as_ref().map(|(c, a, conf)| (*c, a.as_str(), *conf)),
            &candidate_conditions,
        );

        let response_text = match self.backend.generate(&prompt, Some(SYSTEM_PROMPT)).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "text generation backend unavailable");
                return ProcessEventResponse {
                    accepted: true,
                    response_id: String::new(),
                    response_text: String::new(),
                    predicted_success: 0.0,
                    prediction_confidence: 0.0,
                    prompt_text: prompt,
                    decision_path: "llm".to_string(),
                    matched_heuristic_id: suggestion.map(|s| s.heuristic_id.clone()).filter(|id| !id.is_empty()),
                };
            }
        };

        let (predicted_success, prediction_confidence) = self.predict_outcome(&context, &response_text).await;

        let matched_heuristic_id = suggestion.map(|s| s.heuristic_id.clone()).filter(|id| !id.is_empty());
        let response_id = self.traces.store(
            event.id.clone(),
            context,
            response_text.clone(),
            matched_heuristic_id.clone(),
            predicted_success,
            prediction_confidence,
            now_ms(),
        );

        ProcessEventResponse {
            accepted: true,
            response_id,
            response_text,
            predicted_success,
            prediction_confidence,
            prompt_text: prompt,
            decision_path: "llm".to_string(),
            matched_heuristic_id,
        }
    }

    async fn predict_outcome(&self, context: &str, response_text: &str) -> (f32, f32) {
        let prediction_prompt = build_prediction_prompt(context, response_text);
        match self.backend.extract_json(SYSTEM_PROMPT, &prediction_prompt).await {
            Ok(value) => {
                let success = value.get("success").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32;
                let confidence = value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32;
                (success, confidence)
            }
            Err(_) => (0.5, 0.5),
        }
    }
}

fn render_effects(effects: &Option<Effects>) -> String {
    effects.as_ref().map(|e| e.message.clone()).unwrap_or_default()
}

#[tonic::async_trait]
impl Executive for ExecutiveService {
    async fn process_event(&self, request: Request<ProcessEventRequest>) -> Result<Response<ProcessEventResponse>, Status> {
        let request = request.into_inner();
        let event = request.event.ok_or_else(|| Status::invalid_argument("event is required"))?;
        self.events_received.fetch_add(1, Ordering::Relaxed);

        info!(
            event_id = %event.id,
            source = %event.source,
            immediate = request.immediate,
            candidate_count = request.candidates.len(),
            "ProcessEvent received"
        );

        if request.has_suggestion {
            if let Some(suggestion) = &request.suggestion {
                if !suggestion.heuristic_id.is_empty() && suggestion.confidence >= self.config.executive.heuristic_confidence_threshold {
                    info!(event_id = %event.id, heuristic_id = %suggestion.heuristic_id, confidence = suggestion.confidence, "heuristic fast-path");
                    let response_text = render_effects(&suggestion.suggested_action);
                    let response_id = self.traces.store(
                        event.id.clone(),
                        event.raw_text.clone(),
                        response_text.clone(),
                        Some(suggestion.heuristic_id.clone()),
                        suggestion.confidence,
                        suggestion.confidence,
                        now_ms(),
                    );
                    return Ok(Response::new(ProcessEventResponse {
                        accepted: true,
                        response_id,
                        response_text,
                        predicted_success: suggestion.confidence,
                        prediction_confidence: suggestion.confidence,
                        prompt_text: String::new(),
                        decision_path: "heuristic".to_string(),
                        matched_heuristic_id: Some(suggestion.heuristic_id.clone()),
                    }));
                }
            }
        }

        if !request.immediate {
            return Ok(Response::new(ProcessEventResponse {
                accepted: true,
                response_id: String::new(),
                response_text: String::new(),
                predicted_success: 0.0,
                prediction_confidence: 0.0,
                prompt_text: String::new(),
                decision_path: String::new(),
                matched_heuristic_id: None,
            }));
        }

        let response = self.process_via_llm(&event, request.suggestion.as_ref(), &request.candidates).await;
        Ok(Response::new(response))
    }

    async fn provide_feedback(&self, request: Request<ProvideFeedbackRequest>) -> Result<Response<ProvideFeedbackResponse>, Status> {
        let request = request.into_inner();
        info!(response_id = %request.response_id, event_id = %request.event_id, positive = request.positive, "ProvideFeedback received");

        if !request.positive {
            let Some(trace) = self.traces.get(&request.response_id) else {
                return Ok(Response::new(ProvideFeedbackResponse {
                    accepted: false,
                    created_heuristic_id: String::new(),
                    error_message: "reasoning trace not found or expired".to_string(),
                }));
            };
            if let Some(heuristic_id) = &trace.matched_heuristic_id {
                if let Ok(id) = Uuid::parse_str(heuristic_id) {
                    let mut memory = self.memory.lock().await;
                    if let Err(e) = memory.update_heuristic_confidence(id, false, "explicit").await {
                        warn!(error = %e, heuristic_id = %heuristic_id, "failed to apply negative feedback");
                    }
                }
            }
            self.traces.remove(&request.response_id);
            return Ok(Response::new(ProvideFeedbackResponse { accepted: true, created_heuristic_id: String::new(), error_message: String::new() }));
        }

        let Some(trace) = self.traces.get(&request.response_id) else {
            return Ok(Response::new(ProvideFeedbackResponse {
                accepted: false,
                created_heuristic_id: String::new(),
                error_message: "reasoning trace not found or expired".to_string(),
            }));
        };

        let extraction_prompt = build_extraction_prompt(&trace.context, &trace.response);
        let extracted_json = match self.backend.extract_json(SYSTEM_PROMPT, &extraction_prompt).await {
            Ok(value) => value,
            Err(BackendError::NotConfigured) => {
                return Ok(Response::new(ProvideFeedbackResponse {
                    accepted: false,
                    created_heuristic_id: String::new(),
                    error_message: "no text generation backend available for pattern extraction".to_string(),
                }));
            }
            Err(e) => {
                return Ok(Response::new(ProvideFeedbackResponse {
                    accepted: false,
                    created_heuristic_id: String::new(),
                    error_message: format!("pattern extraction failed: {e}"),
                }));
            }
        };

        let extracted = match parse_extracted(&extracted_json) {
            Ok(e) => e,
            Err(msg) => {
                return Ok(Response::new(ProvideFeedbackResponse {
                    accepted: false,
                    created_heuristic_id: String::new(),
                    error_message: format!("pattern parsing failed: {msg}"),
                }));
            }
        };

        if let Err(gate_error) = check_heuristic_quality(&extracted) {
            warn!(reason = %gate_error, "quality gate rejected extracted heuristic");
            return Ok(Response::new(ProvideFeedbackResponse {
                accepted: false,
                created_heuristic_id: String::new(),
                error_message: format!("quality gate: {gate_error}"),
            }));
        }

        {
            let mut memory = self.memory.lock().await;
            match memory.query_matching_heuristics(&extracted.condition, 0.0, 1, None).await {
                Ok(matches) => {
                    if let Some(top) = matches.first() {
                        if top.similarity > 0.9 {
                            let existing_id = top.heuristic.as_ref().map(|h| h.id.clone()).unwrap_or_default();
                            warn!(similarity = top.similarity, existing_heuristic_id = %existing_id, "near-duplicate heuristic rejected");
                            return Ok(Response::new(ProvideFeedbackResponse {
                                accepted: false,
                                created_heuristic_id: String::new(),
                                error_message: format!("near-duplicate of existing heuristic (similarity={:.2})", top.similarity),
                            }));
                        }
                    }
                }
                Err(e) => warn!(error = %e, "dedup check failed, proceeding without it"),
            }

            if let Some(heuristic_id) = &trace.matched_heuristic_id {
                if let Ok(id) = Uuid::parse_str(heuristic_id) {
                    if let Err(e) = memory.update_heuristic_confidence(id, true, "explicit").await {
                        warn!(error = %e, heuristic_id = %heuristic_id, "failed to apply positive feedback to matched heuristic");
                    }
                }
            }
        }

        let heuristic_id = Uuid::new_v4();
        let name = if extracted.condition.chars().count() > 50 {
            format!("Learned: {}...", extracted.condition.chars().take(50).collect::<String>())
        } else {
            format!("Learned: {}", extracted.condition)
        };
        let heuristic = gladys_proto::types::Heuristic {
            id: heuristic_id.to_string(),
            name,
            condition_text: extracted.condition.clone(),
            condition_embedding: Vec::new(),
            effects: Some(Effects { r#type: extracted.action_type.clone(), message: extracted.action_message.clone() }),
            confidence: 0.3,
            origin: "learned".to_string(),
            origin_id: trace.response_id.clone(),
            fire_count: 0,
            success_count: 0,
            created_at_ms: now_ms(),
            updated_at_ms: now_ms(),
            frozen: false,
        };

        let stored_id = {
            let mut memory = self.memory.lock().await;
            match memory.store_heuristic(heuristic, true).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "failed to store learned heuristic");
                    return Ok(Response::new(ProvideFeedbackResponse {
                        accepted: false,
                        created_heuristic_id: String::new(),
                        error_message: format!("failed to store heuristic: {e}"),
                    }));
                }
            }
        };

        self.heuristics_created.fetch_add(1, Ordering::Relaxed);
        self.traces.remove(&request.response_id);

        Ok(Response::new(ProvideFeedbackResponse { accepted: true, created_heuristic_id: stored_id, error_message: String::new() }))
    }

    async fn get_health(&self, _request: Request<GetHealthRequest>) -> Result<Response<HealthStatus>, Status> {
        let mut details = std::collections::HashMap::new();
        details.insert("backend_configured".to_string(), self.config.backend.is_configured().to_string());
        details.insert("events_received".to_string(), self.events_received.load(Ordering::Relaxed).to_string());
        details.insert("heuristics_created".to_string(), self.heuristics_created.load(Ordering::Relaxed).to_string());
        details.insert("active_traces".to_string(), self.traces.len().to_string());

        Ok(Response::new(HealthStatus { status: "ok".to_string(), details }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_context_includes_salient_dimensions() {
        let event = gladys_proto::types::EpisodicEvent {
            id: "e1".into(),
            timestamp_ms: 0,
            source: "kitchen".into(),
            raw_text: "the oven timer expired".into(),
            embedding: vec![],
            salience: Some(gladys_proto::types::SalienceVector { threat: 0.8, salience: 0.5, habituation: 0.0, novelty: 0.0, goal_relevance: 0.0, opportunity: 0.0, actionability: 0.0, social: 0.0, model_id: String::new() }),
            structured_json: String::new(),
            entity_ids: vec![],
            decision_path: String::new(),
            matched_heuristic_id: None,
            response_id: String::new(),
            response_text: String::new(),
            llm_prompt_text: String::new(),
            predicted_success: 0.0,
            prediction_confidence: 0.0,
        };
        let context = ExecutiveService::event_context(&event);
        assert!(context.contains("threat=0.80"));
        assert!(context.contains("kitchen"));
    }
}
