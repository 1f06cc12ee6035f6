//! gRPC server implementation for the Memory service.
//!
//! Wires the persistent store, the warm-read matching cache, the confidence
//! update rule, and the embedding provider together behind the
//! `MemoryStorage` trait generated from `memory.proto`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::{info, warn};
use uuid::Uuid;

use gladys_common::{bytes_to_embedding, embedding_to_bytes, now_ms};
use gladys_proto::memory::memory_storage_server::MemoryStorage;
use gladys_proto::memory::{
    EvictFromCacheRequest, EvictFromCacheResponse, FlushCacheRequest, FlushCacheResponse,
    GenerateEmbeddingRequest, GenerateEmbeddingResponse, GetCacheStatsRequest, GetCacheStatsResponse,
    GetHealthRequest, GetHeuristicRequest, GetHeuristicResponse, GetPendingFiresRequest,
    GetPendingFiresResponse, ListCachedHeuristicsRequest, ListCachedHeuristicsResponse,
    QueryByTimeRequest, QueryBySimilarityRequest, QueryEventsResponse, QueryHeuristicsRequest,
    QueryHeuristicsResponse, QueryMatchingHeuristicsRequest, RecordHeuristicFireRequest,
    RecordHeuristicFireResponse, StoreEventRequest, StoreEventResponse, StoreHeuristicRequest,
    StoreHeuristicResponse, UpdateFireOutcomeRequest, UpdateFireOutcomeResponse,
    UpdateHeuristicConfidenceRequest, UpdateHeuristicConfidenceResponse,
};
use gladys_proto::types::HealthStatus;

use crate::cache::HeuristicCache;
use crate::confidence::apply_feedback;
use crate::config::Config;
use crate::domain::{Effects, EpisodicEvent, FireOutcome, Heuristic, HeuristicMatch, SalienceVector};
use crate::embedding_provider::EmbeddingProvider;
use crate::store::{PersistentStore, StoreError};

pub struct MemoryService {
    store: Arc<dyn PersistentStore>,
    cache: Arc<RwLock<HeuristicCache>>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: Config,
}

impl MemoryService {
    pub fn new(store: Arc<dyn PersistentStore>, embeddings: Arc<dyn EmbeddingProvider>, config: Config) -> Self {
        let cache = Arc::new(RwLock::new(HeuristicCache::new(&config.cache)));
        Self { store, cache, embeddings, config }
    }

    pub fn cache_handle(&self) -> Arc<RwLock<HeuristicCache>> {
        Arc::clone(&self.cache)
    }
}

fn to_proto_event(e: &EpisodicEvent) -> gladys_proto::types::EpisodicEvent {
    gladys_proto::types::EpisodicEvent {
        id: e.id.to_string(),
        timestamp_ms: e.timestamp_ms,
        source: e.source.clone(),
        raw_text: e.raw_text.clone(),
        embedding: embedding_to_bytes(&e.embedding),
        salience: e.salience.as_ref().map(to_proto_salience),
        structured_json: e.structured_json.clone(),
        entity_ids: e.entity_ids.iter().map(|id| id.to_string()).collect(),
        decision_path: e.decision_path.clone().unwrap_or_default(),
        matched_heuristic_id: e.matched_heuristic_id.clone(),
        response_id: e.response_id.clone(),
        response_text: e.response_text.clone(),
        llm_prompt_text: e.llm_prompt_text.clone(),
        predicted_success: e.predicted_success,
        prediction_confidence: e.prediction_confidence,
    }
}

fn to_proto_salience(s: &SalienceVector) -> gladys_proto::types::SalienceVector {
    gladys_proto::types::SalienceVector {
        threat: s.threat,
        salience: s.salience,
        habituation: s.habituation,
        novelty: s.novelty,
        goal_relevance: s.goal_relevance,
        opportunity: s.opportunity,
        actionability: s.actionability,
        social: s.social,
        model_id: s.model_id.clone(),
    }
}

fn from_proto_salience(s: gladys_proto::types::SalienceVector) -> SalienceVector {
    SalienceVector {
        threat: s.threat,
        salience: s.salience,
        habituation: s.habituation,
        novelty: s.novelty,
        goal_relevance: s.goal_relevance,
        opportunity: s.opportunity,
        actionability: s.actionability,
        social: s.social,
        model_id: s.model_id,
    }
}

fn from_proto_event(e: gladys_proto::types::EpisodicEvent) -> Result<EpisodicEvent, Status> {
    let id = if e.id.is_empty() { Uuid::new_v4() } else { parse_uuid(&e.id)? };
    let entity_ids = e.entity_ids.iter().map(|s| parse_uuid(s)).collect::<Result<Vec<_>, _>>()?;
    Ok(EpisodicEvent {
        id,
        timestamp_ms: if e.timestamp_ms > 0 { e.timestamp_ms } else { now_ms() },
        source: e.source,
        raw_text: e.raw_text,
        embedding: bytes_to_embedding(&e.embedding),
        salience: e.salience.map(from_proto_salience),
        structured_json: e.structured_json,
        entity_ids,
        decision_path: (!e.decision_path.is_empty()).then_some(e.decision_path),
        matched_heuristic_id: e.matched_heuristic_id,
        response_id: e.response_id,
        response_text: e.response_text,
        llm_prompt_text: e.llm_prompt_text,
        predicted_success: e.predicted_success,
        prediction_confidence: e.prediction_confidence,
    })
}

fn to_proto_heuristic(h: &Heuristic) -> gladys_proto::types::Heuristic {
    gladys_proto::types::Heuristic {
        id: h.id.to_string(),
        name: h.name.clone(),
        condition_text: h.condition_text.clone(),
        condition_embedding: embedding_to_bytes(&h.condition_embedding),
        effects: Some(gladys_proto::types::Effects { r#type: h.effects.action_type.clone(), message: h.effects.message.clone() }),
        confidence: h.confidence,
        origin: h.origin.clone(),
        origin_id: h.origin_id.clone(),
        fire_count: h.fire_count,
        success_count: h.success_count,
        created_at_ms: h.created_at_ms,
        updated_at_ms: h.updated_at_ms,
        frozen: h.frozen,
    }
}

fn from_proto_heuristic(h: gladys_proto::types::Heuristic) -> Result<Heuristic, Status> {
    let id = if h.id.is_empty() { Uuid::new_v4() } else { parse_uuid(&h.id)? };
    let effects = h
        .effects
        .map(|e| Effects { action_type: e.r#type, message: e.message })
        .unwrap_or(Effects { action_type: "suggest".into(), message: String::new() });
    let now = now_ms();
    Ok(Heuristic {
        id,
        name: h.name,
        condition_text: h.condition_text,
        condition_embedding: bytes_to_embedding(&h.condition_embedding),
        effects,
        confidence: if h.confidence > 0.0 { h.confidence } else { 0.5 },
        origin: if h.origin.is_empty() { "learned".into() } else { h.origin },
        origin_id: h.origin_id,
        fire_count: h.fire_count,
        success_count: h.success_count,
        created_at_ms: if h.created_at_ms > 0 { h.created_at_ms } else { now },
        updated_at_ms: now,
        frozen: h.frozen,
    })
}

fn to_proto_match(m: &HeuristicMatch) -> gladys_proto::types::HeuristicMatch {
    gladys_proto::types::HeuristicMatch { heuristic: Some(to_proto_heuristic(&m.heuristic)), similarity: m.similarity, score: m.score }
}

fn parse_uuid(s: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(s).map_err(|_| Status::invalid_argument(format!("invalid id: {s}")))
}

fn store_err(e: StoreError) -> Status {
    match e {
        StoreError::NotFound => Status::not_found("not found"),
        StoreError::Backend(msg) => Status::internal(msg),
    }
}

#[tonic::async_trait]
impl MemoryStorage for MemoryService {
    async fn store_event(&self, request: Request<StoreEventRequest>) -> Result<Response<StoreEventResponse>, Status> {
        let req = request.into_inner();
        let Some(proto_event) = req.event else {
            return Ok(Response::new(StoreEventResponse { success: false, error: "event is required".into() }));
        };
        let event = from_proto_event(proto_event)?;
        match self.store.store_event(&event).await {
            Ok(()) => Ok(Response::new(StoreEventResponse { success: true, error: String::new() })),
            Err(e) => Ok(Response::new(StoreEventResponse { success: false, error: e.to_string() })),
        }
    }

    async fn query_by_time(&self, request: Request<QueryByTimeRequest>) -> Result<Response<QueryEventsResponse>, Status> {
        let req = request.into_inner();
        let source_filter = (!req.source_filter.is_empty()).then_some(req.source_filter.as_str());
        let events = self
            .store
            .query_by_time(req.start_ms, req.end_ms, source_filter, req.limit)
            .await
            .map_err(store_err)?;
        Ok(Response::new(QueryEventsResponse {
            events: events.iter().map(to_proto_event).collect(),
            error: String::new(),
        }))
    }

    async fn query_by_similarity(
        &self,
        request: Request<QueryBySimilarityRequest>,
    ) -> Result<Response<QueryEventsResponse>, Status> {
        let req = request.into_inner();
        let embedding = bytes_to_embedding(&req.query_embedding);
        let threshold = if req.similarity_threshold > 0.0 { req.similarity_threshold } else { self.config.matching.min_similarity };
        let time_filter = (req.time_filter_hours > 0).then_some(req.time_filter_hours);
        let events = self
            .store
            .query_by_similarity(&embedding, threshold, time_filter, req.limit)
            .await
            .map_err(store_err)?;
        Ok(Response::new(QueryEventsResponse {
            events: events.iter().map(to_proto_event).collect(),
            error: String::new(),
        }))
    }

    async fn generate_embedding(
        &self,
        request: Request<GenerateEmbeddingRequest>,
    ) -> Result<Response<GenerateEmbeddingResponse>, Status> {
        let req = request.into_inner();
        match self.embeddings.embed(&req.text).await {
            Ok(embedding) => Ok(Response::new(GenerateEmbeddingResponse {
                embedding: embedding_to_bytes(&embedding),
                error: String::new(),
            })),
            Err(e) => {
                warn!(error = %e, "embedding provider failed");
                Ok(Response::new(GenerateEmbeddingResponse { embedding: vec![], error: e.to_string() }))
            }
        }
    }

    async fn store_heuristic(
        &self,
        request: Request<StoreHeuristicRequest>,
    ) -> Result<Response<StoreHeuristicResponse>, Status> {
        let req = request.into_inner();
        let Some(proto_heuristic) = req.heuristic else {
            return Ok(Response::new(StoreHeuristicResponse { success: false, heuristic_id: String::new(), error: "heuristic is required".into() }));
        };
        let mut heuristic = from_proto_heuristic(proto_heuristic)?;

        if req.generate_embedding || heuristic.condition_embedding.is_empty() {
            match self.embeddings.embed(&heuristic.condition_text).await {
                Ok(embedding) => heuristic.condition_embedding = embedding,
                Err(e) => warn!(error = %e, "embedding generation failed on store_heuristic, keeping existing embedding"),
            }
        }

        self.store.store_heuristic(&heuristic).await.map_err(store_err)?;
        self.cache.write().await.put(heuristic.clone());

        Ok(Response::new(StoreHeuristicResponse { success: true, heuristic_id: heuristic.id.to_string(), error: String::new() }))
    }

    async fn query_heuristics(
        &self,
        request: Request<QueryHeuristicsRequest>,
    ) -> Result<Response<QueryHeuristicsResponse>, Status> {
        let req = request.into_inner();
        let matches = self.store.query_heuristics(req.min_confidence, req.limit).await.map_err(store_err)?;
        Ok(Response::new(QueryHeuristicsResponse {
            matches: matches.iter().map(to_proto_match).collect(),
            error: String::new(),
        }))
    }

    async fn query_matching_heuristics(
        &self,
        request: Request<QueryMatchingHeuristicsRequest>,
    ) -> Result<Response<QueryHeuristicsResponse>, Status> {
        let req = request.into_inner();
        let min_confidence = req.min_confidence;
        let limit = req.limit;
        let source_filter = (!req.source_filter.is_empty()).then_some(req.source_filter.clone());

        let embedding = match self.embeddings.embed(&req.event_text).await {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "embedding provider failed, falling back to text-only matching");
                vec![]
            }
        };

        // Warm-read path: try the cache first.
        {
            let cache = self.cache.read().await;
            let cached = cache.find_matching(&embedding, self.config.matching.min_similarity, min_confidence, limit as usize);
            if !cached.is_empty() {
                let mut matches = Vec::with_capacity(cached.len());
                for (id, similarity) in cached {
                    if let Some(h) = cache.peek(&id) {
                        matches.push(gladys_proto::types::HeuristicMatch {
                            heuristic: Some(to_proto_heuristic(h)),
                            similarity,
                            score: similarity * h.confidence,
                        });
                    }
                }
                if !matches.is_empty() {
                    return Ok(Response::new(QueryHeuristicsResponse { matches, error: String::new() }));
                }
            }
        }

        let matches = self
            .store
            .query_matching_heuristics(
                &embedding,
                &req.event_text,
                min_confidence,
                self.config.matching.min_similarity,
                limit,
                source_filter.as_deref(),
            )
            .await
            .map_err(store_err)?;

        {
            let mut cache = self.cache.write().await;
            for m in &matches {
                cache.put(m.heuristic.clone());
            }
        }

        Ok(Response::new(QueryHeuristicsResponse { matches: matches.iter().map(to_proto_match).collect(), error: String::new() }))
    }

    async fn get_heuristic(&self, request: Request<GetHeuristicRequest>) -> Result<Response<GetHeuristicResponse>, Status> {
        let req = request.into_inner();
        let id = parse_uuid(&req.id)?;

        if let Some(h) = self.cache.write().await.get(&id) {
            return Ok(Response::new(GetHeuristicResponse { heuristic: Some(to_proto_heuristic(h)), error: String::new() }));
        }

        match self.store.get_heuristic(id).await {
            Ok(h) => {
                self.cache.write().await.put(h.clone());
                Ok(Response::new(GetHeuristicResponse { heuristic: Some(to_proto_heuristic(&h)), error: String::new() }))
            }
            Err(StoreError::NotFound) => Ok(Response::new(GetHeuristicResponse { heuristic: None, error: "not found".into() })),
            Err(e) => Err(store_err(e)),
        }
    }

    async fn update_heuristic_confidence(
        &self,
        request: Request<UpdateHeuristicConfidenceRequest>,
    ) -> Result<Response<UpdateHeuristicConfidenceResponse>, Status> {
        let req = request.into_inner();
        let id = parse_uuid(&req.heuristic_id)?;

        let heuristic = match self.store.get_heuristic(id).await {
            Ok(h) => h,
            Err(StoreError::NotFound) => {
                return Ok(Response::new(UpdateHeuristicConfidenceResponse {
                    success: false,
                    old_confidence: 0.0,
                    new_confidence: 0.0,
                    delta: 0.0,
                    td_error: 0.0,
                    error: "heuristic not found".into(),
                }));
            }
            Err(e) => return Err(store_err(e)),
        };

        let update = apply_feedback(heuristic.fire_count, heuristic.success_count, req.positive);

        self.store
            .update_heuristic_counters(id, update.fire_count, update.success_count, update.new_confidence)
            .await
            .map_err(store_err)?;

        if let Some(fire) = self.store.latest_unknown_fire(id).await.map_err(store_err)? {
            let outcome = if req.positive { FireOutcome::Success } else { FireOutcome::Fail };
            self.store.update_fire_outcome(fire.id, outcome, &req.feedback_source).await.map_err(store_err)?;
        }

        self.cache.write().await.remove(&id);

        info!(
            heuristic_id = %id,
            positive = req.positive,
            old_confidence = update.old_confidence,
            new_confidence = update.new_confidence,
            "heuristic confidence updated"
        );

        Ok(Response::new(UpdateHeuristicConfidenceResponse {
            success: true,
            old_confidence: update.old_confidence,
            new_confidence: update.new_confidence,
            delta: update.delta,
            td_error: 0.0,
            error: String::new(),
        }))
    }

    async fn record_heuristic_fire(
        &self,
        request: Request<RecordHeuristicFireRequest>,
    ) -> Result<Response<RecordHeuristicFireResponse>, Status> {
        let req = request.into_inner();
        let heuristic_id = parse_uuid(&req.heuristic_id)?;
        let episodic_event_id = (!req.episodic_event_id.is_empty()).then_some(req.episodic_event_id.as_str());

        match self.store.record_heuristic_fire(heuristic_id, &req.event_id, episodic_event_id).await {
            Ok(fire_id) => Ok(Response::new(RecordHeuristicFireResponse { fire_id: fire_id.to_string(), error: String::new() })),
            Err(e) => Ok(Response::new(RecordHeuristicFireResponse { fire_id: String::new(), error: store_err(e).message().to_string() })),
        }
    }

    async fn update_fire_outcome(
        &self,
        request: Request<UpdateFireOutcomeRequest>,
    ) -> Result<Response<UpdateFireOutcomeResponse>, Status> {
        let req = request.into_inner();
        let fire_id = parse_uuid(&req.fire_id)?;
        let outcome = FireOutcome::parse(&req.outcome).unwrap_or(FireOutcome::Unknown);

        self.store.update_fire_outcome(fire_id, outcome, &req.feedback_source).await.map_err(store_err)?;
        Ok(Response::new(UpdateFireOutcomeResponse { success: true, error: String::new() }))
    }

    async fn get_pending_fires(
        &self,
        request: Request<GetPendingFiresRequest>,
    ) -> Result<Response<GetPendingFiresResponse>, Status> {
        let req = request.into_inner();
        let heuristic_id = (!req.heuristic_id.is_empty()).then(|| parse_uuid(&req.heuristic_id)).transpose()?;
        let max_age_ms = if req.max_age_ms > 0 { req.max_age_ms } else { 24 * 3_600_000 };

        let fires = self.store.get_pending_fires(heuristic_id, max_age_ms).await.map_err(store_err)?;
        Ok(Response::new(GetPendingFiresResponse {
            fires: fires
                .iter()
                .map(|f| gladys_proto::types::HeuristicFire {
                    id: f.id.to_string(),
                    heuristic_id: f.heuristic_id.to_string(),
                    event_id: f.event_id.clone(),
                    fired_at_ms: f.fired_at_ms,
                    outcome: f.outcome.as_str().to_string(),
                    feedback_source: f.feedback_source.clone(),
                    episodic_event_id: f.episodic_event_id.clone().unwrap_or_default(),
                })
                .collect(),
            error: String::new(),
        }))
    }

    async fn get_health(&self, _request: Request<GetHealthRequest>) -> Result<Response<HealthStatus>, Status> {
        let cache_stats = self.cache.read().await.stats();
        let mut details = HashMap::new();
        details.insert("cached_heuristics".to_string(), cache_stats.heuristic_count.to_string());
        details.insert("cache_hit_rate".to_string(), format!("{:.3}", cache_stats.hit_rate()));

        Ok(Response::new(HealthStatus { status: "ok".into(), details }))
    }

    async fn get_cache_stats(&self, _request: Request<GetCacheStatsRequest>) -> Result<Response<GetCacheStatsResponse>, Status> {
        let stats = self.cache.read().await.stats();
        Ok(Response::new(GetCacheStatsResponse {
            heuristic_count: stats.heuristic_count as i64,
            max_heuristics: stats.max_heuristics as i64,
            total_hits: stats.total_hits as i64,
            total_misses: stats.total_misses as i64,
            hit_rate: stats.hit_rate(),
        }))
    }

    async fn list_cached_heuristics(&self, request: Request<ListCachedHeuristicsRequest>) -> Result<Response<ListCachedHeuristicsResponse>, Status> {
        let limit = request.into_inner().limit.max(0) as usize;
        let cache = self.cache.read().await;
        let heuristics = cache.list(limit).into_iter().map(to_proto_heuristic).collect();
        Ok(Response::new(ListCachedHeuristicsResponse { heuristics }))
    }

    async fn flush_cache(&self, _request: Request<FlushCacheRequest>) -> Result<Response<FlushCacheResponse>, Status> {
        let evicted = self.cache.write().await.flush();
        Ok(Response::new(FlushCacheResponse { evicted_count: evicted as i64 }))
    }

    async fn evict_from_cache(&self, request: Request<EvictFromCacheRequest>) -> Result<Response<EvictFromCacheResponse>, Status> {
        let id = Uuid::parse_str(&request.into_inner().heuristic_id).map_err(|_| Status::invalid_argument("invalid heuristic id"))?;
        let evicted = self.cache.write().await.remove(&id);
        Ok(Response::new(EvictFromCacheResponse { evicted }))
    }
}
