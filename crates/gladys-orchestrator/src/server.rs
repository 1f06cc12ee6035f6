//! The Orchestrator's tonic service implementation and its background
//! tasks: the priority-queue worker, the timeout scanner, and the
//! outcome-cleanup loop.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{error, warn};
use uuid::Uuid;

use gladys_common::now_ms;
use gladys_memory::client::MemoryClient;
use gladys_proto::executive::HeuristicSuggestion;
use gladys_proto::orchestrator::orchestrator_server::Orchestrator;
use gladys_proto::orchestrator::{
    Event, EventAck, GetHealthRequest, GetQueueStatsRequest, ListQueuedEventsRequest,
    ListQueuedEventsResponse, QueueStats, Response as EventResponse, SubscribeEventsRequest,
    SubscribeResponsesRequest,
};
use gladys_proto::types::{EpisodicEvent, HealthStatus};

use crate::client::ExecutiveClient;
use crate::config::Config;
use crate::learning::LearningModule;
use crate::outcome_watcher::{parse_patterns, OutcomeWatcher};
use crate::queue::{EventQueue, QueuedEvent};
use crate::salience::{self, DefaultSalienceProvider, SalienceProvider};
use crate::subscribers::SubscriberRegistry;

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Status>> + Send>>;
type ResponseStream = Pin<Box<dyn Stream<Item = Result<EventResponse, Status>> + Send>>;

/// Shared state behind every RPC handler and background task. Cheap to
/// clone: every field is an `Arc` or plain config data, so each spawned
/// per-stream task gets its own handle onto the same shared state.
#[derive(Clone)]
pub struct OrchestratorService {
    config: Config,
    queue: Arc<EventQueue>,
    salience_provider: Arc<dyn SalienceProvider>,
    event_subscribers: Arc<SubscriberRegistry<Event>>,
    response_subscribers: Arc<SubscriberRegistry<EventResponse>>,
    memory: Arc<AsyncMutex<MemoryClient>>,
    learning: Arc<LearningModule>,
}

impl OrchestratorService {
    pub fn new(config: Config, memory: MemoryClient, executive: ExecutiveClient, outcome_watcher: Arc<OutcomeWatcher>, strategy: Box<dyn crate::learning::LearningStrategy>) -> Self {
        let memory = Arc::new(AsyncMutex::new(memory));
        let learning = Arc::new(LearningModule::new(strategy, memory.clone(), outcome_watcher));
        let service = Self {
            config,
            queue: Arc::new(EventQueue::new()),
            salience_provider: Arc::new(DefaultSalienceProvider),
            event_subscribers: Arc::new(SubscriberRegistry::new()),
            response_subscribers: Arc::new(SubscriberRegistry::new()),
            memory,
            learning,
        };
        service.spawn_background_tasks(executive);
        service
    }

    fn spawn_background_tasks(&self, executive: ExecutiveClient) {
        spawn_queue_worker(
            self.queue.clone(),
            Arc::new(AsyncMutex::new(executive)),
            self.memory.clone(),
            self.learning.clone(),
            self.response_subscribers.clone(),
            self.config.routing.max_evaluation_candidates,
        );
        spawn_timeout_scanner(self.queue.clone(), self.response_subscribers.clone(), self.config.queue.event_timeout_ms, self.config.queue.scan_interval());
        if self.config.outcome.enabled {
            spawn_outcome_cleanup(self.learning.clone(), self.config.outcome.cleanup_interval());
        }
    }

    async fn handle_event(&self, event: Event) -> EventAck {
        if event.raw_text.trim().is_empty() {
            return EventAck { event_id: event.id, accepted: false, ..Default::default() };
        }

        let now = now_ms();
        let client_override = if event.has_salience_override { event.salience_override.as_ref() } else { None };
        let salience = salience::resolve_salience(self.salience_provider.as_ref(), &event.raw_text, client_override);

        self.learning.check_event_for_outcomes(&event.raw_text, &event.source, now).await;

        // Emergency routing below only ever looks at the single best match;
        // the queue worker re-queries at full candidate width for Executive.
        let best_match = {
            let mut memory = self.memory.lock().await;
            memory
                .query_matching_heuristics(&event.raw_text, 0.0, 1, None)
                .await
                .ok()
                .and_then(|matches| matches.into_iter().next())
        };

        let max_salience = salience::max_salience(&salience);

        let matched_confidence = best_match.as_ref().and_then(|m| m.heuristic.as_ref()).map(|h| h.confidence).unwrap_or(0.0);
        let is_emergency = matched_confidence >= self.config.routing.emergency_confidence_threshold
            && salience.threat >= self.config.routing.emergency_threat_threshold;

        if is_emergency {
            if let Some(ref heuristic_match) = best_match {
                if let Some(ref heuristic) = heuristic_match.heuristic {
                    let heuristic_id = match Uuid::parse_str(&heuristic.id) {
                        Ok(id) => id,
                        Err(_) => Uuid::nil(),
                    };
                    let response_text = heuristic.effects.as_ref().map(|e| e.message.clone()).unwrap_or_default();

                    self.learning.on_fire(heuristic_id, &event.id, heuristic.confidence, &heuristic.condition_text, &event.source, now).await;
                    self.persist_episode(&event, &salience, Some(&heuristic.id), "heuristic", heuristic.confidence, Some(&response_text)).await;

                    self.response_subscribers.broadcast(&event.source, EventResponse {
                        event_id: event.id.clone(),
                        response_id: String::new(),
                        source: event.source.clone(),
                        text: response_text.clone(),
                        decision_path: "heuristic".to_string(),
                        is_emergency: true,
                        is_timeout: false,
                    });

                    return EventAck {
                        event_id: event.id,
                        accepted: true,
                        routed_to_llm: false,
                        matched_heuristic_id: heuristic.id.clone(),
                        queued: false,
                        response_text,
                        predicted_success: heuristic.confidence,
                        prediction_confidence: heuristic.confidence,
                    };
                }
            }
        }

        let matched_heuristic_id = best_match.as_ref().and_then(|m| m.heuristic.as_ref()).map(|h| h.id.clone());
        self.event_subscribers.broadcast(&event.source, event.clone());
        self.queue.enqueue(event.clone(), max_salience, now, matched_heuristic_id.clone());

        EventAck {
            event_id: event.id,
            accepted: true,
            routed_to_llm: true,
            matched_heuristic_id: matched_heuristic_id.unwrap_or_default(),
            queued: true,
            response_text: String::new(),
            predicted_success: 0.0,
            prediction_confidence: 0.0,
        }
    }

    async fn persist_episode(&self, event: &Event, salience: &gladys_memory::domain::SalienceVector, matched_heuristic_id: Option<&str>, decision_path: &str, predicted_success: f32, response_text: Option<&str>) {
        let mut memory = self.memory.lock().await;
        let episode = EpisodicEvent {
            id: event.id.clone(),
            timestamp_ms: event.timestamp_ms,
            source: event.source.clone(),
            raw_text: event.raw_text.clone(),
            embedding: Vec::new(),
            salience: Some(salience::to_proto(salience)),
            structured_json: "{}".to_string(),
            entity_ids: Vec::new(),
            decision_path: decision_path.to_string(),
            matched_heuristic_id: matched_heuristic_id.map(|s| s.to_string()),
            response_id: String::new(),
            response_text: response_text.unwrap_or_default().to_string(),
            llm_prompt_text: String::new(),
            predicted_success,
            prediction_confidence: predicted_success,
        };
        if let Err(e) = memory.store_event(episode).await {
            warn!(event_id = %event.id, error = %e, "failed to persist episode");
        }
    }
}

#[tonic::async_trait]
impl Orchestrator for OrchestratorService {
    type PublishEventsStream = Pin<Box<dyn Stream<Item = Result<EventAck, Status>> + Send>>;
    type SubscribeEventsStream = EventStream;
    type SubscribeResponsesStream = ResponseStream;

    async fn publish_events(&self, request: Request<Streaming<Event>>) -> Result<Response<Self::PublishEventsStream>, Status> {
        let mut incoming = request.into_inner();
        let (tx, rx) = mpsc::channel(64);
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = incoming.next().await {
                let event = match event {
                    Ok(e) => e,
                    Err(e) => {
                        error!(error = %e, "publish_events stream error");
                        break;
                    }
                };
                let ack = this.handle_event(event).await;
                if tx.send(Ok(ack)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn subscribe_events(&self, request: Request<SubscribeEventsRequest>) -> Result<Response<Self::SubscribeEventsStream>, Status> {
        let req = request.into_inner();
        let rx = self.event_subscribers.add(req.subscriber_id, req.source_filters);
        let stream = ReceiverStream::new(rx).map(Ok);
        Ok(Response::new(Box::pin(stream)))
    }

    async fn subscribe_responses(&self, request: Request<SubscribeResponsesRequest>) -> Result<Response<Self::SubscribeResponsesStream>, Status> {
        let req = request.into_inner();
        let rx = self.response_subscribers.add(req.subscriber_id, req.source_filters);
        let stream = ReceiverStream::new(rx).map(Ok);
        Ok(Response::new(Box::pin(stream)))
    }

    async fn get_queue_stats(&self, _request: Request<GetQueueStatsRequest>) -> Result<Response<QueueStats>, Status> {
        let stats = self.queue.stats();
        Ok(Response::new(QueueStats {
            queue_size: stats.queue_size,
            total_queued: stats.total_queued,
            total_processed: stats.total_processed,
            total_timed_out: stats.total_timed_out,
        }))
    }

    async fn list_queued_events(&self, request: Request<ListQueuedEventsRequest>) -> Result<Response<ListQueuedEventsResponse>, Status> {
        let limit = request.into_inner().limit.max(0) as usize;
        let limit = if limit == 0 { 100 } else { limit };
        Ok(Response::new(ListQueuedEventsResponse { items: self.queue.list(limit) }))
    }

    async fn get_health(&self, _request: Request<GetHealthRequest>) -> Result<Response<HealthStatus>, Status> {
        self.health_status().await
    }

    async fn get_health_details(&self, _request: Request<GetHealthRequest>) -> Result<Response<HealthStatus>, Status> {
        self.health_status().await
    }
}

impl OrchestratorService {
    async fn health_status(&self) -> Result<Response<HealthStatus>, Status> {
        let mut details = std::collections::HashMap::new();
        details.insert("queue_size".to_string(), self.queue.queue_size().to_string());
        details.insert("event_subscribers".to_string(), self.event_subscribers.subscriber_count().to_string());
        details.insert("response_subscribers".to_string(), self.response_subscribers.subscriber_count().to_string());
        Ok(Response::new(HealthStatus { status: "ok".to_string(), details }))
    }
}

fn spawn_queue_worker(
    queue: Arc<EventQueue>,
    executive: Arc<AsyncMutex<ExecutiveClient>>,
    memory: Arc<AsyncMutex<MemoryClient>>,
    learning: Arc<LearningModule>,
    response_subscribers: Arc<SubscriberRegistry<EventResponse>>,
    max_evaluation_candidates: i32,
) {
    tokio::spawn(async move {
        loop {
            let queued: QueuedEvent = queue.dequeue().await;
            process_queued_event(queued, &executive, &memory, &learning, &response_subscribers, max_evaluation_candidates).await;
        }
    });
}

fn to_suggestion(heuristic: gladys_proto::types::Heuristic) -> HeuristicSuggestion {
    HeuristicSuggestion {
        heuristic_id: heuristic.id,
        condition_text: heuristic.condition_text,
        suggested_action: heuristic.effects,
        confidence: heuristic.confidence,
    }
}

async fn process_queued_event(
    queued: QueuedEvent,
    executive: &Arc<AsyncMutex<ExecutiveClient>>,
    memory: &Arc<AsyncMutex<MemoryClient>>,
    learning: &Arc<LearningModule>,
    response_subscribers: &Arc<SubscriberRegistry<EventResponse>>,
    max_evaluation_candidates: i32,
) {
    let event = queued.event;
    let now = now_ms();

    let mut matches = {
        let mut memory_guard = memory.lock().await;
        memory_guard.query_matching_heuristics(&event.raw_text, 0.0, max_evaluation_candidates, None).await.unwrap_or_default()
    };
    let suggestion_proto: Option<HeuristicSuggestion> = matches.first().and_then(|m| m.heuristic.clone()).map(to_suggestion);
    let candidates: Vec<HeuristicSuggestion> = if matches.is_empty() {
        Vec::new()
    } else {
        matches.drain(1..).filter_map(|m| m.heuristic).map(to_suggestion).collect()
    };
    let primary_heuristic_id =
        suggestion_proto.as_ref().map(|s| s.heuristic_id.clone()).or_else(|| queued.matched_heuristic_id.clone());

    let episodic_event = EpisodicEvent {
        id: event.id.clone(),
        timestamp_ms: event.timestamp_ms,
        source: event.source.clone(),
        raw_text: event.raw_text.clone(),
        embedding: Vec::new(),
        salience: None,
        structured_json: "{}".to_string(),
        entity_ids: Vec::new(),
        decision_path: String::new(),
        matched_heuristic_id: primary_heuristic_id,
        response_id: String::new(),
        response_text: String::new(),
        llm_prompt_text: String::new(),
        predicted_success: 0.0,
        prediction_confidence: 0.0,
    };

    let mut executive_guard = executive.lock().await;
    let result = executive_guard.process_event(episodic_event.clone(), false, suggestion_proto, candidates).await;
    drop(executive_guard);

    let (decision_path, response_text, response_id, matched_heuristic_id) = match result {
        Ok(resp) => (resp.decision_path, resp.response_text, resp.response_id, resp.matched_heuristic_id),
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "executive unavailable");
            ("no_executive".to_string(), "Executive unavailable".to_string(), String::new(), queued.matched_heuristic_id.clone())
        }
    };

    if decision_path == "heuristic" {
        if let Some(id) = matched_heuristic_id.as_deref() {
            if let Ok(heuristic_id) = Uuid::parse_str(id) {
                learning.on_fire(heuristic_id, &event.id, 0.0, "", &event.source, now).await;
            }
        }
    }

    {
        let mut memory = memory.lock().await;
        let mut final_episode = episodic_event;
        final_episode.decision_path = decision_path.clone();
        final_episode.response_text = response_text.clone();
        final_episode.response_id = response_id.clone();
        final_episode.matched_heuristic_id = matched_heuristic_id.clone();
        if let Err(e) = memory.store_event(final_episode).await {
            warn!(event_id = %event.id, error = %e, "failed to persist queued episode");
        }
    }

    response_subscribers.broadcast(&event.source.clone(), EventResponse {
        event_id: event.id,
        response_id,
        source: event.source,
        text: response_text,
        decision_path,
        is_emergency: false,
        is_timeout: false,
    });
}

fn spawn_timeout_scanner(queue: Arc<EventQueue>, response_subscribers: Arc<SubscriberRegistry<EventResponse>>, timeout_ms: i64, scan_interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(scan_interval);
        loop {
            ticker.tick().await;
            let now = now_ms();
            for expired in queue.expire_older_than(now, timeout_ms) {
                warn!(event_id = %expired.event_id, "event timed out in queue");
                response_subscribers.broadcast(&expired.event.source.clone(), EventResponse {
                    event_id: expired.event_id,
                    response_id: String::new(),
                    source: expired.event.source,
                    text: "(Request timed out)".to_string(),
                    decision_path: "timeout".to_string(),
                    is_emergency: false,
                    is_timeout: true,
                });
            }
        }
    });
}

fn spawn_outcome_cleanup(learning: Arc<LearningModule>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            learning.cleanup_expired(now_ms()).await;
        }
    });
}

pub fn build_outcome_watcher(config: &Config) -> Arc<OutcomeWatcher> {
    let patterns = parse_patterns(&config.outcome.outcome_patterns_json);
    Arc::new(OutcomeWatcher::new(patterns, config.outcome.outcome_timeout_sec))
}

pub fn build_learning_strategy(config: &Config) -> Result<Box<dyn crate::learning::LearningStrategy>, crate::learning::LearningError> {
    crate::learning::create_learning_strategy(&config.learning.strategy, (&config.learning).into())
}
