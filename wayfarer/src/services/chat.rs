//! Chat sessions: start turns, continuation turns and their synchronous
//! wrappers.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ContentCache;
use crate::config::ChatConfig;
use crate::db::DatabaseBackend;
use crate::embeddings::Embedder;
use crate::error::{Result, WayfarerError};
use crate::intelligence::command::find_matching_poi;
use crate::intelligence::{Command, DomainDetector, IntentClassifier};
use crate::llm::prompts::{self, PromptContext};
use crate::llm::TextGenerator;
use crate::models::{
    ChatSession, City, ConversationMessage, Domain, GeneratedItinerary, Location, MessageType,
    Navigation, PointOfInterest, SessionStatus, StreamEvent,
};
use crate::services::completion::{assemble_snapshot, single_poi_from, CompletionPipeline, PersistJob};
use crate::services::delivery::{DeadLetterQueue, EventDelivery, EventSink};
use crate::services::generation::{parts_for, GenerationOrchestrator, TurnScope, PART_POI_DETAIL};
use crate::services::recommendation::RecommendationEngine;

#[derive(Debug, Clone, Default)]
pub struct StartChatRequest {
    pub user_id: String,
    pub profile_id: Option<String>,
    pub city_name: String,
    pub message: String,
    pub location: Option<Location>,
    pub preferences: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContinueChatRequest {
    pub session_id: String,
    pub message: String,
    pub location: Option<Location>,
}

/// Outward event stream of one turn.
pub struct TurnStream {
    pub session_id: String,
    pub events: mpsc::Receiver<StreamEvent>,
}

/// Result of a drained turn: the last snapshot and the last non-empty message.
#[derive(Debug, Clone)]
pub struct ChatTurnResult {
    pub session_id: String,
    pub message: Option<String>,
    pub itinerary: Option<GeneratedItinerary>,
}

/// Outcome of dispatching one follow-up command against the itinerary.
struct Reply {
    text: String,
    message_type: MessageType,
    mutated: bool,
}

impl Reply {
    fn changed(text: String) -> Self {
        Self {
            text,
            message_type: MessageType::Response,
            mutated: true,
        }
    }

    fn unchanged(text: String, message_type: MessageType) -> Self {
        Self {
            text,
            message_type,
            mutated: false,
        }
    }
}

fn current_places(itinerary: &GeneratedItinerary) -> String {
    if itinerary.points_of_interest.is_empty() {
        "Your itinerary is currently empty.".to_string()
    } else {
        format!("Current places: {}.", itinerary.poi_names().join(", "))
    }
}

fn ready_message(domain: Domain, city: &str) -> String {
    match domain {
        Domain::Itinerary | Domain::General => format!("Your itinerary for {city} is ready."),
        Domain::Accommodation => format!("Here are places to stay in {city}."),
        Domain::Dining => format!("Here are places to eat in {city}."),
        Domain::Activities => format!("Here are things to do in {city}."),
    }
}

const ADVISORY: &str = "I can add, remove or replace places in your itinerary. \
Try \"add <place>\", \"remove <place>\" or \"replace <place> with <place>\".";

const REPLACE_CLARIFICATION: &str = "Which place should I replace, and with what? \
For example: \"replace Stadium with Arena\".";

struct ChatInner {
    db: Arc<dyn DatabaseBackend>,
    classifier: Arc<dyn IntentClassifier>,
    domains: DomainDetector,
    recommender: RecommendationEngine,
    orchestrator: GenerationOrchestrator,
    completion: CompletionPipeline,
    delivery: EventDelivery,
    config: ChatConfig,
}

#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ChatInner>,
}

impl ChatService {
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        classifier: Arc<dyn IntentClassifier>,
        dead_letters: DeadLetterQueue,
        config: ChatConfig,
    ) -> Self {
        let cache = ContentCache::new(config.content_cache_capacity);
        let inner = ChatInner {
            recommender: RecommendationEngine::new(
                db.clone(),
                embedder.clone(),
                config.recommendation_limit,
            ),
            orchestrator: GenerationOrchestrator::new(generator, cache, &config),
            completion: CompletionPipeline::new(db.clone(), embedder),
            delivery: EventDelivery::new(&config, dead_letters),
            domains: DomainDetector::new(),
            db,
            classifier,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn cached_parts(&self) -> usize {
        self.inner.orchestrator.cached_parts()
    }

    fn session_ttl(&self) -> ChronoDuration {
        let secs = self.inner.config.session_ttl_secs.min(i64::MAX as u64 / 1000);
        ChronoDuration::seconds(secs as i64)
    }

    /// Starts a new session and streams the first turn. Invalid requests fail
    /// before anything is streamed.
    pub fn start_chat_stream(
        &self,
        request: StartChatRequest,
        cancel: CancellationToken,
    ) -> Result<TurnStream> {
        self.spawn_start(request, cancel).map(|(stream, _)| stream)
    }

    /// Streams one continuation turn of an existing session.
    pub fn continue_chat_stream(
        &self,
        request: ContinueChatRequest,
        cancel: CancellationToken,
    ) -> Result<TurnStream> {
        self.spawn_continue(request, cancel).map(|(stream, _)| stream)
    }

    pub async fn start_chat(&self, request: StartChatRequest) -> Result<ChatTurnResult> {
        let (stream, handle) = self.spawn_start(request, CancellationToken::new())?;
        drain(stream, handle).await
    }

    pub async fn continue_chat(&self, request: ContinueChatRequest) -> Result<ChatTurnResult> {
        let (stream, handle) = self.spawn_continue(request, CancellationToken::new())?;
        drain(stream, handle).await
    }

    /// Loads a session, closing it first if it has expired.
    pub async fn get_session(&self, session_id: &str) -> Result<ChatSession> {
        let mut session = self
            .inner
            .db
            .get_session(session_id)
            .await?
            .ok_or_else(|| WayfarerError::NotFound(format!("session {session_id}")))?;

        if session.expire_if_due(Utc::now()) {
            info!(session_id, "Session expired");
            if let Err(e) = self.inner.db.update_session(&session).await {
                warn!(session_id, error = %e, "Failed to persist session expiry");
            }
        }
        Ok(session)
    }

    pub async fn close_session(&self, session_id: &str) -> Result<ChatSession> {
        let mut session = self.get_session(session_id).await?;
        if session.status != SessionStatus::Closed {
            session.status = SessionStatus::Closed;
            session.updated_at = Utc::now();
            self.inner.db.update_session(&session).await?;
            info!(session_id, "Session closed");
        }
        Ok(session)
    }

    fn spawn_start(
        &self,
        request: StartChatRequest,
        cancel: CancellationToken,
    ) -> Result<(TurnStream, JoinHandle<Result<()>>)> {
        if request.user_id.trim().is_empty() {
            return Err(WayfarerError::Validation("user_id is required".into()));
        }
        if request.city_name.trim().is_empty() {
            return Err(WayfarerError::Validation("city_name is required".into()));
        }
        if request.message.trim().is_empty() {
            return Err(WayfarerError::Validation("message is required".into()));
        }

        let session = ChatSession::new(
            request.user_id.clone(),
            request.profile_id.clone(),
            request.city_name.trim(),
            self.session_ttl(),
        );
        let session_id = session.id.clone();
        let (sink, events) = self.inner.delivery.open(cancel);

        let service = self.clone();
        let handle = tokio::spawn(async move {
            let result = service.run_start(request, session, &sink).await;
            if let Err(e) = &result {
                warn!(error = %e, "Start turn failed");
                sink.fail(e).await;
            }
            result
        });

        Ok((TurnStream { session_id, events }, handle))
    }

    fn spawn_continue(
        &self,
        request: ContinueChatRequest,
        cancel: CancellationToken,
    ) -> Result<(TurnStream, JoinHandle<Result<()>>)> {
        if request.session_id.trim().is_empty() {
            return Err(WayfarerError::Validation("session_id is required".into()));
        }
        if request.message.trim().is_empty() {
            return Err(WayfarerError::Validation("message is required".into()));
        }

        let session_id = request.session_id.clone();
        let (sink, events) = self.inner.delivery.open(cancel);

        let service = self.clone();
        let handle = tokio::spawn(async move {
            let result = service.run_continue(request, &sink).await;
            if let Err(e) = &result {
                warn!(error = %e, "Continue turn failed");
                sink.fail(e).await;
            }
            result
        });

        Ok((TurnStream { session_id, events }, handle))
    }

    async fn resolve_city(&self, name: &str, country: Option<&str>) -> Result<Option<City>> {
        if let Some(city) = self.inner.db.find_city_by_name(name, country).await? {
            return Ok(Some(city));
        }
        self.inner.db.find_city_fuzzy(name).await
    }

    async fn recommendations(
        &self,
        query: &str,
        city_id: &str,
        location: Option<Location>,
    ) -> Vec<PointOfInterest> {
        match self
            .inner
            .recommender
            .recommend(query, city_id, location, self.inner.config.semantic_weight)
            .await
        {
            Ok(pois) => pois,
            Err(e) => {
                warn!(city_id, error = %e, "Semantic recommendations unavailable");
                Vec::new()
            }
        }
    }

    async fn run_start(
        &self,
        request: StartChatRequest,
        mut session: ChatSession,
        sink: &EventSink,
    ) -> Result<()> {
        let domain = self.inner.domains.detect(&request.message);
        sink.send(StreamEvent::start(&session.id, Some(domain))).await;

        session.push_message(ConversationMessage::user(
            request.message.clone(),
            MessageType::Response,
        ));
        self.inner.db.create_session(&session).await?;
        info!(session_id = %session.id, city = %session.city_name, %domain, "Chat session started");

        let recommendations = match self.resolve_city(&session.city_name, None).await {
            Ok(Some(city)) => {
                self.recommendations(&request.message, &city.id, request.location)
                    .await
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(city = %session.city_name, error = %e, "City lookup failed");
                Vec::new()
            }
        };

        sink.send(StreamEvent::progress(format!(
            "Generating {} for {}",
            domain.route_type(),
            session.city_name
        )))
        .await;

        let ctx = PromptContext {
            city: &session.city_name,
            message: &request.message,
            preferences: &request.preferences,
            recommendations: &recommendations,
        };
        let parts = parts_for(domain, &ctx);
        let scope = TurnScope {
            user_id: request.user_id.clone(),
            profile_id: request.profile_id.clone(),
            city: session.city_name.clone(),
            message: request.message.clone(),
            domain,
            preferences: request.preferences.clone(),
        };
        let texts = self.inner.orchestrator.run(&scope, parts, sink).await?;

        let snapshot = assemble_snapshot(&session.id, domain, &session.city_name, &texts);
        let reply = ready_message(domain, &session.city_name);

        session.current_itinerary = Some(snapshot.clone());
        session.push_message(ConversationMessage::assistant(reply.clone(), MessageType::Response));
        session.touch(self.session_ttl());
        if let Err(e) = self.inner.db.update_session(&session).await {
            warn!(session_id = %session.id, error = %e, "Failed to persist session after start turn");
        }

        self.inner.completion.spawn(PersistJob {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            profile_id: session.profile_id.clone(),
            city_name: session.city_name.clone(),
            domain,
            prompt: request.message,
            texts,
            snapshot: snapshot.clone(),
        });

        let navigation = Navigation::for_domain(domain, &session.id, &session.city_name);
        sink.finish([
            StreamEvent::itinerary(&snapshot, Some(reply.clone())),
            StreamEvent::complete(reply, navigation),
        ])
        .await;
        Ok(())
    }

    async fn run_continue(&self, request: ContinueChatRequest, sink: &EventSink) -> Result<()> {
        let mut session = self
            .inner
            .db
            .get_session(&request.session_id)
            .await?
            .ok_or_else(|| WayfarerError::NotFound(format!("session {}", request.session_id)))?;

        let now = Utc::now();
        if session.expire_if_due(now) {
            if let Err(e) = self.inner.db.update_session(&session).await {
                warn!(session_id = %session.id, error = %e, "Failed to persist session expiry");
            }
        }
        if !session.accepts_turns(now) {
            return Err(WayfarerError::SessionInactive(session.id.clone()));
        }

        let country = session
            .current_itinerary
            .as_ref()
            .and_then(|itinerary| itinerary.city.as_ref())
            .map(|city| city.country.clone())
            .filter(|country| !country.trim().is_empty());
        let city = self
            .resolve_city(&session.city_name, country.as_deref())
            .await?
            .ok_or_else(|| WayfarerError::CityNotResolved(session.city_name.clone()))?;

        let mut itinerary = session
            .current_itinerary
            .clone()
            .unwrap_or_else(|| GeneratedItinerary::empty(&session.id, Domain::Itinerary));
        sink.send(StreamEvent::start(&session.id, Some(itinerary.domain)))
            .await;

        let user_message =
            ConversationMessage::user(request.message.clone(), MessageType::ModificationRequest);
        if let Err(e) = self.inner.db.add_message(&session.id, &user_message).await {
            warn!(session_id = %session.id, error = %e, "Failed to persist user message, continuing in memory");
        }
        session.push_message(user_message);

        let intent = self.inner.classifier.classify(&request.message).await?;
        debug!(session_id = %session.id, %intent, "Classified follow-up");

        let recommendations = self
            .recommendations(&request.message, &city.id, request.location)
            .await;

        let reply = match Command::parse(intent, &request.message) {
            Some(Command::AddPoi(name)) => {
                self.add_poi(&mut itinerary, &name, &recommendations, &city, &session, sink)
                    .await?
            }
            Some(Command::RemovePoi(name)) => remove_poi(&mut itinerary, &name),
            Some(Command::ReplacePoi { old, new }) => {
                self.replace_poi(&mut itinerary, &old, &new, &city, &session, sink)
                    .await?
            }
            Some(Command::AskQuestion) | Some(Command::ModifyItinerary) => {
                Reply::unchanged(ADVISORY.to_string(), MessageType::Response)
            }
            None => Reply::unchanged(REPLACE_CLARIFICATION.to_string(), MessageType::Clarification),
        };

        if reply.mutated {
            if let Some(location) = request.location {
                self.sort_by_distance(&mut itinerary, &city, location).await;
            }
        }

        session.push_message(ConversationMessage::assistant(reply.text.clone(), reply.message_type));
        session.current_itinerary = Some(itinerary.clone());
        session.touch(self.session_ttl());
        if let Err(e) = self.inner.db.update_session(&session).await {
            warn!(session_id = %session.id, error = %e, "Failed to persist session after continue turn");
        }

        let navigation = Navigation::for_domain(itinerary.domain, &session.id, &session.city_name);
        sink.finish([
            StreamEvent::itinerary(&itinerary, Some(reply.text.clone())),
            StreamEvent::complete(reply.text, navigation),
        ])
        .await;
        Ok(())
    }

    async fn add_poi(
        &self,
        itinerary: &mut GeneratedItinerary,
        name: &str,
        recommendations: &[PointOfInterest],
        city: &City,
        session: &ChatSession,
        sink: &EventSink,
    ) -> Result<Reply> {
        if let Some(candidate) = recommendations
            .iter()
            .find(|poi| !itinerary.contains_poi(&poi.name))
        {
            let mut poi = candidate.clone();
            if poi.id.is_none() {
                let id = self.inner.completion.assign_identity(&mut poi, &city.id).await;
                poi.id = Some(id);
            }
            let text = format!("I've added {} to your itinerary.", poi.name);
            itinerary.points_of_interest.push(poi);
            return Ok(Reply::changed(text));
        }

        if name.trim().is_empty() {
            return Ok(Reply::unchanged(
                "Which place would you like to add?".to_string(),
                MessageType::Clarification,
            ));
        }
        if itinerary.contains_poi(name) {
            return Ok(Reply::unchanged(
                format!("{name} is already in your itinerary."),
                MessageType::Response,
            ));
        }

        let text = self
            .generate_single_poi(session, &city.name, name, None, sink)
            .await?;
        let mut poi = single_poi_from(text.as_deref(), name, None);
        let id = self.inner.completion.assign_identity(&mut poi, &city.id).await;
        poi.id = Some(id);

        let text = format!("I've added {} to your itinerary.", poi.name);
        itinerary.points_of_interest.push(poi);
        Ok(Reply::changed(text))
    }

    async fn replace_poi(
        &self,
        itinerary: &mut GeneratedItinerary,
        old: &str,
        new: &str,
        city: &City,
        session: &ChatSession,
        sink: &EventSink,
    ) -> Result<Reply> {
        let Some(index) = find_matching_poi(&itinerary.points_of_interest, old) else {
            return Ok(Reply::unchanged(
                format!(
                    "I couldn't find \"{old}\" in your itinerary. Which place should I replace? {}",
                    current_places(itinerary)
                ),
                MessageType::Clarification,
            ));
        };

        let replaced = itinerary.points_of_interest[index].clone();
        let text = self
            .generate_single_poi(session, &city.name, new, Some(&replaced), sink)
            .await?;
        let mut poi = single_poi_from(text.as_deref(), new, Some(&replaced));
        let id = self.inner.completion.assign_identity(&mut poi, &city.id).await;
        poi.id = Some(id);

        let reply = format!(
            "I've replaced {} with {} in your itinerary.",
            replaced.name, poi.name
        );
        itinerary.points_of_interest[index] = poi;
        Ok(Reply::changed(reply))
    }

    /// Streams a single-place sub-response under the `poi_detail` part.
    async fn generate_single_poi(
        &self,
        session: &ChatSession,
        city_name: &str,
        name: &str,
        replaced: Option<&PointOfInterest>,
        sink: &EventSink,
    ) -> Result<Option<String>> {
        let prompt = prompts::single_poi_prompt(city_name, name, replaced);
        let key = single_poi_scope(session, name, replaced).cache_key(PART_POI_DETAIL);
        self.inner
            .orchestrator
            .stream_part(&key, PART_POI_DETAIL, &prompt, sink)
            .await
    }

    async fn sort_by_distance(
        &self,
        itinerary: &mut GeneratedItinerary,
        city: &City,
        location: Location,
    ) {
        self.inner
            .completion
            .ensure_identities(&mut itinerary.points_of_interest, &city.id)
            .await;

        let ids: Vec<String> = itinerary
            .points_of_interest
            .iter()
            .filter_map(|poi| poi.id.clone())
            .collect();
        let sorted = match self.inner.db.sort_pois_by_distance(&ids, location).await {
            Ok(sorted) => sorted,
            Err(e) => {
                warn!(error = %e, "Distance sort failed, keeping current order");
                return;
            }
        };

        let mut remaining = std::mem::take(&mut itinerary.points_of_interest);
        let mut ordered = Vec::with_capacity(remaining.len());
        for entry in sorted {
            if let Some(pos) = remaining
                .iter()
                .position(|poi| poi.id.as_deref() == Some(entry.id.as_str()))
            {
                let mut poi = remaining.remove(pos);
                poi.distance = Some(entry.distance_km);
                ordered.push(poi);
            }
        }
        ordered.append(&mut remaining);
        itinerary.points_of_interest = ordered;
    }
}

fn remove_poi(itinerary: &mut GeneratedItinerary, name: &str) -> Reply {
    match find_matching_poi(&itinerary.points_of_interest, name) {
        Some(index) => {
            let removed = itinerary.points_of_interest.remove(index);
            Reply::changed(format!("I've removed {} from your itinerary.", removed.name))
        }
        None => Reply::unchanged(
            format!(
                "I couldn't find \"{name}\" in your itinerary. {}",
                current_places(itinerary)
            ),
            MessageType::Response,
        ),
    }
}

/// Consumes a turn's events, then surfaces the turn's own error if it failed.
async fn drain(mut stream: TurnStream, handle: JoinHandle<Result<()>>) -> Result<ChatTurnResult> {
    let mut message = None;
    let mut itinerary = None;

    while let Some(event) = stream.events.recv().await {
        if let Some(snapshot) = event.itinerary_snapshot() {
            itinerary = Some(snapshot);
        }
        if let Some(text) = event.message.as_deref().filter(|m| !m.trim().is_empty()) {
            message = Some(text.to_string());
        }
    }

    handle
        .await
        .map_err(|e| WayfarerError::Internal(format!("chat turn panicked: {e}")))??;

    Ok(ChatTurnResult {
        session_id: stream.session_id,
        message,
        itinerary,
    })
}

/// Cache scope of a single-place sub-response. A replacement prompt carries
/// the replaced entry, so the replaced name is part of the key.
fn single_poi_scope(
    session: &ChatSession,
    name: &str,
    replaced: Option<&PointOfInterest>,
) -> TurnScope {
    let message = match replaced {
        Some(old) => format!("replace {} with {name}", old.name),
        None => format!("add {name}"),
    };
    TurnScope {
        user_id: session.user_id.clone(),
        profile_id: session.profile_id.clone(),
        city: session.city_name.clone(),
        message,
        domain: Domain::Itinerary,
        preferences: Vec::new(),
    }
}
