//! Per-tenant listening engine.
//!
//! One task per platform consumes that platform's keyword stream, filters and
//! classifies each post, and hands matches to the [`ApprovalGate`]. A failed
//! stream is reopened after a fixed interval without touching the other
//! platforms. Stopping is cooperative: a post already being processed is
//! finished before its task exits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use earshot_bus::{BusPublisher, EventBus};
use earshot_platforms::{PlatformAdapter, PlatformFactory};
use earshot_schema::{
    BusMessage, ListenerConfig, ListenerConfigPatch, ListenerFilters, ListenerStats, Platform,
    PlatformStatus, Post, ResponderCategory, Sentiment, SessionState, SuggestedAction,
    TriggerContext, TriggerStatus, WorkflowTrigger,
};
use earshot_store::{AuditStore, IntegrationStore};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audit::WorkflowAuditEntry;
use crate::classifier::{determine_action, determine_priority, PostClassifier, MIN_RELEVANCE};
use crate::gate::{ApprovalGate, GateServices};
use crate::stats::SessionStats;
use crate::ListenError;

/// Relevance above which an engage suggestion may be answered automatically.
const AUTO_ENGAGE_RELEVANCE: u8 = 70;

/// Everything an engine needs from the rest of the application.
#[derive(Clone)]
pub struct EngineDeps {
    pub integrations: Arc<dyn IntegrationStore>,
    pub factory: Arc<dyn PlatformFactory>,
    pub audit: Arc<dyn AuditStore>,
    pub gate: GateServices,
    pub classifier: PostClassifier,
    pub retry_interval: Duration,
    pub queue_capacity: usize,
}

type Statuses = Arc<RwLock<BTreeMap<Platform, PlatformStatus>>>;

#[derive(Default)]
struct Runtime {
    gate: Option<Arc<ApprovalGate>>,
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EngineStatus {
    pub state: SessionState,
    pub active: bool,
    pub stats: ListenerStats,
    pub platforms: BTreeMap<Platform, PlatformStatus>,
}

pub struct ListeningEngine {
    tenant_id: String,
    deps: EngineDeps,
    config: Arc<ArcSwap<ListenerConfig>>,
    state: RwLock<SessionState>,
    statuses: Statuses,
    stats: Arc<SessionStats>,
    bus: EventBus,
    runtime: Mutex<Runtime>,
}

impl ListeningEngine {
    pub fn new(tenant_id: impl Into<String>, config: ListenerConfig, deps: EngineDeps) -> Self {
        let bus = EventBus::new(deps.queue_capacity);
        Self {
            tenant_id: tenant_id.into(),
            deps,
            config: Arc::new(ArcSwap::from_pointee(config)),
            state: RwLock::new(SessionState::Uninitialized),
            statuses: Arc::new(RwLock::new(BTreeMap::new())),
            stats: Arc::new(SessionStats::default()),
            bus,
            runtime: Mutex::new(Runtime::default()),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> ListenerConfig {
        self.config.load().as_ref().clone()
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn is_active(&self) -> bool {
        matches!(
            self.state().await,
            SessionState::Initializing | SessionState::Listening
        )
    }

    /// Builds one adapter per connected integration on the configured
    /// platforms. Fails when none can be built.
    pub async fn initialize(&self) -> Result<(), ListenError> {
        *self.state.write().await = SessionState::Initializing;

        match self.build_adapters().await {
            Ok(adapters) => {
                let gate = ApprovalGate::new(
                    &self.tenant_id,
                    self.deps.gate.clone(),
                    adapters.clone(),
                    self.bus.publisher(),
                    self.stats.clone(),
                );
                let mut runtime = self.runtime.lock().await;
                runtime.adapters = adapters;
                runtime.gate = Some(Arc::new(gate));
                tracing::info!(
                    tenant_id = %self.tenant_id,
                    platforms = runtime.adapters.len(),
                    "listener initialized"
                );
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = SessionState::Uninitialized;
                Err(err)
            }
        }
    }

    async fn build_adapters(&self) -> Result<HashMap<Platform, Arc<dyn PlatformAdapter>>, ListenError> {
        let platforms = self.config.load().platforms.clone();
        let integrations = self
            .deps
            .integrations
            .connected_integrations(&self.tenant_id, &platforms)
            .await?;

        let mut adapters = HashMap::new();
        for integration in integrations {
            let platform = integration.platform;
            if adapters.contains_key(&platform) {
                tracing::debug!(tenant_id = %self.tenant_id, %platform, "extra integration ignored");
                continue;
            }
            match self.deps.factory.build(integration) {
                Ok(adapter) => {
                    adapters.insert(platform, adapter);
                }
                Err(e) => {
                    tracing::warn!(tenant_id = %self.tenant_id, %platform, error = %e, "adapter unavailable");
                }
            }
        }

        if adapters.is_empty() {
            return Err(ListenError::NoIntegrations {
                tenant_id: self.tenant_id.clone(),
            });
        }
        Ok(adapters)
    }

    /// Launches one listening task per initialized platform.
    pub async fn start_listening(&self) -> Result<(), ListenError> {
        if self.state().await == SessionState::Listening {
            return Err(ListenError::AlreadyActive {
                tenant_id: self.tenant_id.clone(),
            });
        }
        if self.config.load().keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ListenError::InvalidConfig(
                "at least one keyword is required".to_string(),
            ));
        }
        if self.runtime.lock().await.gate.is_none() {
            self.initialize().await?;
        }

        let mut runtime = self.runtime.lock().await;
        let Some(gate) = runtime.gate.clone() else {
            return Err(ListenError::NoIntegrations {
                tenant_id: self.tenant_id.clone(),
            });
        };
        runtime.cancel = CancellationToken::new();

        let mut statuses = self.statuses.write().await;
        statuses.clear();
        let mut tasks = Vec::with_capacity(runtime.adapters.len());
        for (platform, adapter) in &runtime.adapters {
            statuses.insert(*platform, PlatformStatus::Listening);
            let worker = PlatformWorker {
                tenant_id: self.tenant_id.clone(),
                platform: *platform,
                adapter: adapter.clone(),
                config: self.config.clone(),
                classifier: self.deps.classifier.clone(),
                audit: self.deps.audit.clone(),
                gate: gate.clone(),
                stats: self.stats.clone(),
                events: self.bus.publisher(),
                statuses: self.statuses.clone(),
                retry_interval: self.deps.retry_interval,
                cancel: runtime.cancel.clone(),
            };
            tasks.push(tokio::spawn(worker.run()));
        }
        drop(statuses);
        runtime.tasks = tasks;

        *self.state.write().await = SessionState::Listening;
        tracing::info!(
            tenant_id = %self.tenant_id,
            platforms = runtime.adapters.len(),
            "listening started"
        );
        Ok(())
    }

    /// Signals every platform task and waits for them to finish the post in
    /// hand. Returns the final counters.
    pub async fn stop_listening(&self) -> ListenerStats {
        let tasks = {
            let mut runtime = self.runtime.lock().await;
            runtime.cancel.cancel();
            std::mem::take(&mut runtime.tasks)
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(tenant_id = %self.tenant_id, error = %e, "platform task ended abnormally");
            }
        }

        *self.state.write().await = SessionState::Stopped;
        for status in self.statuses.write().await.values_mut() {
            *status = PlatformStatus::Stopped;
        }
        if let Err(e) = self
            .bus
            .publish(BusMessage::ListenerStopped {
                tenant_id: self.tenant_id.clone(),
            })
            .await
        {
            tracing::debug!(tenant_id = %self.tenant_id, error = %e, "stop event dropped");
        }

        let stats = self.stats.snapshot();
        tracing::info!(tenant_id = %self.tenant_id, ?stats, "listening stopped");
        stats
    }

    /// Shallow-merges `patch` into the live config. Running tasks see it on
    /// the next post they classify.
    pub fn update_config(&self, patch: ListenerConfigPatch) -> Result<ListenerConfig, ListenError> {
        if let Some(keywords) = &patch.keywords {
            if keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ListenError::InvalidConfig(
                    "at least one keyword is required".to_string(),
                ));
            }
        }
        self.config.rcu(|current| current.merged(patch.clone()));
        let config = self.config();
        tracing::info!(tenant_id = %self.tenant_id, keywords = config.keywords.len(), "listener config updated");
        Ok(config)
    }

    pub fn stats(&self) -> ListenerStats {
        self.stats.snapshot()
    }

    pub async fn status(&self) -> EngineStatus {
        let state = self.state().await;
        EngineStatus {
            state,
            active: matches!(state, SessionState::Initializing | SessionState::Listening),
            stats: self.stats.snapshot(),
            platforms: self.statuses.read().await.clone(),
        }
    }

    pub async fn gate(&self) -> Option<Arc<ApprovalGate>> {
        self.runtime.lock().await.gate.clone()
    }
}

/// Posts failing a filter never reach the classifier. Follower counts are
/// only checked when the platform reported one.
pub fn passes_filters(post: &Post, filters: &ListenerFilters) -> bool {
    if let (Some(min), Some(followers)) = (filters.min_followers, post.author.followers) {
        if followers < min {
            return false;
        }
    }
    if !filters.languages.is_empty() {
        if let Some(language) = &post.language {
            if !filters
                .languages
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(language))
            {
                return false;
            }
        }
    }
    if filters.exclude_replies && post.in_reply_to_id.is_some() {
        return false;
    }
    if filters.exclude_retweets && post.text.starts_with("RT @") {
        return false;
    }
    true
}

struct PlatformWorker {
    tenant_id: String,
    platform: Platform,
    adapter: Arc<dyn PlatformAdapter>,
    config: Arc<ArcSwap<ListenerConfig>>,
    classifier: PostClassifier,
    audit: Arc<dyn AuditStore>,
    gate: Arc<ApprovalGate>,
    stats: Arc<SessionStats>,
    events: BusPublisher,
    statuses: Statuses,
    retry_interval: Duration,
    cancel: CancellationToken,
}

impl PlatformWorker {
    async fn run(self) {
        let mut attempts: u32 = 0;

        while !self.cancel.is_cancelled() {
            let keywords = self.config.load().keywords.clone();
            let failure = match self.adapter.stream_keywords(&keywords).await {
                Ok(mut stream) => {
                    self.set_status(PlatformStatus::Listening).await;
                    attempts = 0;
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => {
                                self.set_status(PlatformStatus::Stopped).await;
                                return;
                            }
                            next = stream.next() => next,
                        };
                        match next {
                            Some(Ok(post)) => self.handle_post(post).await,
                            Some(Err(e)) => break ListenError::stream(self.platform, e),
                            None => {
                                break ListenError::StreamTransport {
                                    platform: self.platform,
                                    message: "stream closed by remote".to_string(),
                                }
                            }
                        }
                        if self.cancel.is_cancelled() {
                            self.set_status(PlatformStatus::Stopped).await;
                            return;
                        }
                    }
                }
                Err(e) => ListenError::stream(self.platform, e),
            };

            attempts = attempts.saturating_add(1);
            tracing::warn!(
                tenant_id = %self.tenant_id,
                platform = %self.platform,
                attempts,
                retry_in_secs = self.retry_interval.as_secs(),
                error = %failure,
                "platform stream failed"
            );
            self.set_status(PlatformStatus::Retrying { attempts }).await;
            self.publish(BusMessage::PlatformFailed {
                tenant_id: self.tenant_id.clone(),
                platform: self.platform,
                error: failure.to_string(),
                attempts,
            })
            .await;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }

        self.set_status(PlatformStatus::Stopped).await;
    }

    async fn handle_post(&self, post: Post) {
        self.stats.post_seen();
        let config = self.config.load_full();

        if !passes_filters(&post, &config.filters) {
            tracing::trace!(platform = %self.platform, post_id = %post.id, "post filtered");
            return;
        }

        let keyword_match = match self.classifier.classify(&post, &config.keywords) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(tenant_id = %self.tenant_id, platform = %self.platform, error = %e, "post skipped");
                return;
            }
        };
        if keyword_match.relevance_score < MIN_RELEVANCE {
            return;
        }

        self.stats.post_matched();
        if let Err(e) = self.audit.record_match(&self.tenant_id, &keyword_match).await {
            tracing::warn!(tenant_id = %self.tenant_id, post_id = %post.id, error = %e, "match not persisted");
        }
        WorkflowAuditEntry::matched(
            &self.tenant_id,
            self.platform,
            &post.id,
            keyword_match.relevance_score,
            &keyword_match.matched_keywords,
        )
        .emit();
        self.publish(BusMessage::MatchFound {
            tenant_id: self.tenant_id.clone(),
            platform: self.platform,
            post_id: post.id.clone(),
            relevance_score: keyword_match.relevance_score,
            suggested_action: keyword_match.suggested_action,
        })
        .await;

        let trigger = WorkflowTrigger {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id.clone(),
            category: keyword_match
                .suggested_category
                .unwrap_or(ResponderCategory::Sales),
            context: TriggerContext {
                matched_keywords: keyword_match.matched_keywords.clone(),
                relevance_score: keyword_match.relevance_score,
                sentiment: keyword_match.sentiment,
            },
            action: determine_action(&keyword_match),
            priority: determine_priority(keyword_match.relevance_score),
            status: TriggerStatus::Pending,
            created_at: Utc::now(),
            post,
        };

        let auto = keyword_match.suggested_action == SuggestedAction::Engage
            && keyword_match.relevance_score > AUTO_ENGAGE_RELEVANCE
            && keyword_match.sentiment != Sentiment::Negative
            && config.actions.auto_reply
            && config.actions.trigger_agent;

        if auto {
            self.stats.agent_triggered();
            self.publish(BusMessage::AgentTriggered {
                tenant_id: self.tenant_id.clone(),
                trigger_id: trigger.id,
                category: trigger.category,
                action: trigger.action,
            })
            .await;
            if let Err(e) = self.gate.auto_engage(trigger).await {
                tracing::warn!(tenant_id = %self.tenant_id, platform = %self.platform, error = %e, "auto engagement failed");
            }
        } else if config.actions.notify_human {
            let reason = format!(
                "{} match with relevance {}",
                keyword_match.suggested_action.as_str(),
                keyword_match.relevance_score
            );
            if let Err(e) = self.gate.request_review(trigger, reason).await {
                tracing::warn!(tenant_id = %self.tenant_id, platform = %self.platform, error = %e, "approval not filed");
            }
        }
    }

    async fn set_status(&self, status: PlatformStatus) {
        self.statuses.write().await.insert(self.platform, status);
    }

    /// Gives up on a full session queue once the session is cancelled.
    async fn publish(&self, msg: BusMessage) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(tenant_id = %self.tenant_id, "event abandoned at shutdown");
            }
            result = self.events.publish(msg) => {
                if let Err(e) = result {
                    tracing::debug!(tenant_id = %self.tenant_id, error = %e, "event dropped");
                }
            }
        }
    }
}
