use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use earshot_core::{
    BusinessContextStore, EngineDeps, GateServices, ListenError, PostClassifier,
    ResponseGenerator, SessionManager, SessionStatus,
};
use earshot_platforms::{PlatformAdapter, PlatformError, PlatformFactory, PostStream};
use earshot_provider::{LlmProvider, LlmRequest, LlmResponse};
use earshot_schema::{
    ApprovalDecision, ApprovalRequest, ApprovalStatus, Author, BusMessage, Credentials, EngagementCounters,
    Integration, IntegrationStatus, ListenerActions, ListenerConfig, ListenerConfigPatch,
    ListenerFilters, MessageResult, Platform, PlatformMetrics, PlatformStatus, Post, PostRequest,
    PostResult, SessionState, TriggerAction, TriggerStatus, UserProfile,
};
use earshot_store::{ApprovalStore, AuditStore, ExecutionStatus, IntegrationStore, SqliteStore};

const TENANT: &str = "t1";

const CONFIDENT: &str = r#"Here you go:
```json
{"content":"Thanks!","confidence":90,"reasoning":"ok","requiresApproval":false}
```"#;
const UNSURE: &str = r#"{"content":"Maybe try the trial?","confidence":60,"reasoning":"guess","requiresApproval":false}"#;

enum Step {
    Post(Post),
    Wait(u64),
    Fail,
    Expire,
    Hang,
}

struct ScriptedAdapter {
    platform: Platform,
    integration_id: String,
    scripts: Mutex<VecDeque<Vec<Step>>>,
    opened: AtomicUsize,
    replies: Mutex<Vec<(String, String)>>,
    likes: Mutex<Vec<String>>,
    fail_actions: bool,
}

impl ScriptedAdapter {
    fn new(platform: Platform, scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Self::build(platform, scripts, false)
    }

    fn failing(platform: Platform, scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Self::build(platform, scripts, true)
    }

    fn build(platform: Platform, scripts: Vec<Vec<Step>>, fail_actions: bool) -> Arc<Self> {
        Arc::new(Self {
            platform,
            integration_id: format!("{platform}-int"),
            scripts: Mutex::new(scripts.into()),
            opened: AtomicUsize::new(0),
            replies: Mutex::new(Vec::new()),
            likes: Mutex::new(Vec::new()),
            fail_actions,
        })
    }

    fn unsupported(&self, capability: &'static str) -> PlatformError {
        PlatformError::Unsupported {
            platform: self.platform,
            capability,
        }
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn integration_id(&self) -> &str {
        &self.integration_id
    }

    async fn stream_keywords(&self, _keywords: &[String]) -> Result<PostStream, PlatformError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Step::Hang]);
        Ok(Box::pin(async_stream::stream! {
            for step in script {
                match step {
                    Step::Post(post) => yield Ok(post),
                    Step::Wait(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                    Step::Fail => {
                        yield Err(PlatformError::Transport("connection reset".into()));
                        break;
                    }
                    Step::Expire => {
                        yield Err(PlatformError::AuthExpired("refresh rejected".into()));
                        break;
                    }
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
        }))
    }

    async fn create_post(&self, _request: &PostRequest) -> Result<PostResult, PlatformError> {
        Err(self.unsupported("create_post"))
    }

    async fn reply_to_post(
        &self,
        post_id: &str,
        content: &str,
    ) -> Result<PostResult, PlatformError> {
        if self.fail_actions {
            return Err(PlatformError::Api {
                status: 503,
                message: "over capacity".into(),
            });
        }
        self.replies
            .lock()
            .unwrap()
            .push((post_id.to_string(), content.to_string()));
        Ok(PostResult {
            id: format!("reply-{post_id}"),
            url: format!("https://social.test/status/reply-{post_id}"),
            created_at: Utc::now(),
            platform: self.platform,
        })
    }

    async fn like_post(&self, post_id: &str) -> Result<(), PlatformError> {
        self.likes.lock().unwrap().push(post_id.to_string());
        Ok(())
    }

    async fn send_direct_message(
        &self,
        _user_id: &str,
        _content: &str,
    ) -> Result<MessageResult, PlatformError> {
        Ok(MessageResult { id: "dm-1".into() })
    }

    async fn search_posts(&self, _query: &str, _limit: usize) -> Result<Vec<Post>, PlatformError> {
        Ok(Vec::new())
    }

    async fn get_user_profile(&self, _user_id: &str) -> Result<UserProfile, PlatformError> {
        Err(self.unsupported("get_user_profile"))
    }

    async fn get_metrics(&self) -> Result<PlatformMetrics, PlatformError> {
        Err(self.unsupported("get_metrics"))
    }
}

struct ScriptedFactory {
    adapters: HashMap<Platform, Arc<ScriptedAdapter>>,
}

impl PlatformFactory for ScriptedFactory {
    fn build(&self, integration: Integration) -> Result<Arc<dyn PlatformAdapter>, PlatformError> {
        self.adapters
            .get(&integration.platform)
            .cloned()
            .map(|adapter| adapter as Arc<dyn PlatformAdapter>)
            .ok_or(PlatformError::Unsupported {
                platform: integration.platform,
                capability: "scripted",
            })
    }
}

struct FixedProvider {
    text: String,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for FixedProvider {
    async fn chat(&self, _request: LlmRequest) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse::text(self.text.clone()))
    }
}

/// Yields after every read, so concurrent deciders both read a request
/// before either stores its decision.
struct YieldingApprovals {
    inner: Arc<SqliteStore>,
}

#[async_trait]
impl ApprovalStore for YieldingApprovals {
    async fn insert_approval(&self, request: &ApprovalRequest) -> Result<()> {
        self.inner.insert_approval(request).await
    }

    async fn get_approval(&self, id: uuid::Uuid) -> Result<Option<ApprovalRequest>> {
        let found = self.inner.get_approval(id).await?;
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn pending_approvals(&self, tenant_id: &str) -> Result<Vec<ApprovalRequest>> {
        self.inner.pending_approvals(tenant_id).await
    }

    async fn decide_approval(&self, request: &ApprovalRequest) -> Result<bool> {
        self.inner.decide_approval(request).await
    }
}

struct Harness {
    store: Arc<SqliteStore>,
    manager: SessionManager,
    provider: Arc<FixedProvider>,
}

async fn harness(adapters: Vec<Arc<ScriptedAdapter>>, reply: &str) -> Harness {
    harness_with(adapters, reply, |store| store as Arc<dyn ApprovalStore>).await
}

async fn harness_with(
    adapters: Vec<Arc<ScriptedAdapter>>,
    reply: &str,
    approvals: impl FnOnce(Arc<SqliteStore>) -> Arc<dyn ApprovalStore>,
) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    for adapter in &adapters {
        store
            .upsert_integration(&Integration {
                id: adapter.integration_id.clone(),
                tenant_id: TENANT.into(),
                platform: adapter.platform,
                status: IntegrationStatus::Connected,
                credentials: Credentials {
                    access_token: "tok".into(),
                    refresh_token: None,
                    expires_at: None,
                },
            })
            .await
            .unwrap();
    }

    let provider = Arc::new(FixedProvider {
        text: reply.to_string(),
        calls: AtomicUsize::new(0),
    });
    let factory = ScriptedFactory {
        adapters: adapters.into_iter().map(|a| (a.platform, a)).collect(),
    };
    let deps = EngineDeps {
        integrations: store.clone(),
        factory: Arc::new(factory),
        audit: store.clone(),
        gate: GateServices {
            context: Arc::new(BusinessContextStore::new(store.clone())),
            generator: Arc::new(ResponseGenerator::new(provider.clone(), "test-model")),
            audit: store.clone(),
            approvals: approvals(store.clone()),
        },
        classifier: PostClassifier::new(),
        retry_interval: Duration::from_secs(30),
        queue_capacity: 64,
    };

    Harness {
        store,
        manager: SessionManager::new(deps, ListenerConfig::default()),
        provider,
    }
}

fn listener(auto_reply: bool, platforms: Vec<Platform>) -> ListenerConfig {
    ListenerConfig {
        keywords: vec!["daw".into(), "pricing".into(), "music".into()],
        platforms,
        filters: ListenerFilters::default(),
        actions: ListenerActions {
            auto_reply,
            notify_human: true,
            trigger_agent: true,
        },
    }
}

fn post(platform: Platform, id: &str, text: &str, verified: bool, likes: u64, shares: u64) -> Post {
    Post {
        id: id.into(),
        platform,
        author: Author {
            id: "42".into(),
            handle: "alice".into(),
            display_name: "Alice".into(),
            verified,
            followers: Some(5_000),
            profile_image: None,
        },
        text: text.into(),
        media: Vec::new(),
        metrics: EngagementCounters {
            likes,
            shares,
            comments: 0,
            impressions: None,
        },
        created_at: Utc::now(),
        conversation_id: None,
        in_reply_to_id: None,
        language: Some("en".into()),
    }
}

/// Relevance 90, positive: engages and replies.
fn hot_post(id: &str) -> Post {
    post(
        Platform::Twitter,
        id,
        "Love this daw! pricing looks great for music",
        true,
        200,
        60,
    )
}

/// Relevance 60, positive: monitored only.
fn warm_post(id: &str) -> Post {
    post(
        Platform::Twitter,
        id,
        "Love this daw! pricing looks great",
        true,
        150,
        0,
    )
}

fn quiet_post(platform: Platform, id: &str) -> Post {
    post(platform, id, "hello world", false, 0, 0)
}

async fn wait_for(
    manager: &SessionManager,
    what: &str,
    pred: impl Fn(&SessionStatus) -> bool,
) -> SessionStatus {
    for _ in 0..10_000 {
        let status = manager.status(TENANT).await;
        if pred(&status) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{what} never happened: {:?}", manager.status(TENANT).await);
}

#[tokio::test(start_paused = true)]
async fn confident_reply_is_posted_automatically() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(hot_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter.clone()], CONFIDENT).await;

    h.manager
        .start(TENANT, Some(listener(true, vec![Platform::Twitter])))
        .await
        .unwrap();
    let status = wait_for(&h.manager, "auto reply", |s| s.stats.auto_replies == 1).await;

    assert_eq!(status.stats.total_posts, 1);
    assert_eq!(status.stats.matched_posts, 1);
    assert_eq!(status.stats.agents_triggered, 1);
    assert_eq!(status.stats.human_interventions, 0);
    assert_eq!(
        *twitter.replies.lock().unwrap(),
        vec![("p1".to_string(), "Thanks!".to_string())]
    );

    let completed = h
        .store
        .triggers_with_status(TENANT, TriggerStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].trigger.action, TriggerAction::Reply);
    let executions = h.store.executions_for(completed[0].trigger.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Success);
    assert_eq!(
        executions[0].result_url.as_deref(),
        Some("https://social.test/status/reply-p1")
    );
    assert_eq!(h.store.recent_matches(TENANT, 10).await.unwrap().len(), 1);

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unsure_reply_waits_for_approval_and_edited_text_is_posted() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(hot_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter.clone()], UNSURE).await;

    h.manager
        .start(TENANT, Some(listener(true, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "approval", |s| s.stats.human_interventions == 1).await;
    assert!(twitter.replies.lock().unwrap().is_empty());

    let pending = h.manager.pending_approvals(TENANT).await.unwrap();
    assert_eq!(pending.len(), 1);
    let candidate = pending[0].candidate.as_ref().unwrap();
    assert_eq!(candidate.confidence, 60);
    assert!(candidate.requires_approval);
    assert_eq!(pending[0].trigger.status, TriggerStatus::PendingApproval);

    let outcome = h
        .manager
        .decide(
            TENANT,
            pending[0].id,
            ApprovalDecision::Approved,
            Some("Edited reply".into()),
        )
        .await
        .unwrap();
    assert_eq!(outcome.approval.status, ApprovalStatus::Approved);
    assert!(outcome.error.is_none());
    assert!(outcome.executed.is_some());
    assert_eq!(
        *twitter.replies.lock().unwrap(),
        vec![("p1".to_string(), "Edited reply".to_string())]
    );
    assert!(h.manager.pending_approvals(TENANT).await.unwrap().is_empty());
    assert_eq!(h.manager.status(TENANT).await.stats.auto_replies, 1);

    let again = h
        .manager
        .decide(TENANT, pending[0].id, ApprovalDecision::Rejected, None)
        .await
        .unwrap_err();
    assert!(matches!(again, ListenError::ApprovalAlreadyDecided(_)));

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rejection_has_no_side_effects() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(hot_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter.clone()], UNSURE).await;

    h.manager
        .start(TENANT, Some(listener(true, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "approval", |s| s.stats.human_interventions == 1).await;
    let pending = h.manager.pending_approvals(TENANT).await.unwrap();

    let outcome = h
        .manager
        .decide(TENANT, pending[0].id, ApprovalDecision::Rejected, None)
        .await
        .unwrap();
    assert_eq!(outcome.approval.status, ApprovalStatus::Rejected);
    assert!(outcome.executed.is_none());
    assert!(twitter.replies.lock().unwrap().is_empty());
    assert!(h
        .store
        .executions_for(pending[0].trigger.id)
        .await
        .unwrap()
        .is_empty());

    let missing = h
        .manager
        .decide(TENANT, uuid::Uuid::new_v4(), ApprovalDecision::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, ListenError::ApprovalNotFound(_)));

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn monitored_match_is_filed_for_review_without_generation() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(warm_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter.clone()], CONFIDENT).await;

    h.manager
        .start(TENANT, Some(listener(true, vec![Platform::Twitter])))
        .await
        .unwrap();
    let status = wait_for(&h.manager, "review", |s| s.stats.human_interventions == 1).await;
    assert_eq!(status.stats.matched_posts, 1);
    assert_eq!(status.stats.agents_triggered, 0);

    let pending = h.manager.pending_approvals(TENANT).await.unwrap();
    assert_eq!(pending[0].trigger.action, TriggerAction::Monitor);
    assert!(pending[0].candidate.is_none());
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn filtered_and_irrelevant_posts_never_produce_triggers() {
    let retweet = post(
        Platform::Twitter,
        "p1",
        "RT @acme: Love this daw! pricing looks great for music",
        true,
        200,
        60,
    );
    let twitter = ScriptedAdapter::new(
        Platform::Twitter,
        vec![vec![
            Step::Post(retweet),
            Step::Post(quiet_post(Platform::Twitter, "p2")),
            Step::Hang,
        ]],
    );
    let h = harness(vec![twitter.clone()], CONFIDENT).await;

    let mut config = listener(true, vec![Platform::Twitter]);
    config.filters.exclude_retweets = true;
    h.manager.start(TENANT, Some(config)).await.unwrap();

    let status = wait_for(&h.manager, "both posts seen", |s| s.stats.total_posts == 2).await;
    assert_eq!(status.stats.matched_posts, 0);
    assert_eq!(status.stats.human_interventions, 0);
    assert!(h.store.recent_matches(TENANT, 10).await.unwrap().is_empty());
    assert!(h.manager.pending_approvals(TENANT).await.unwrap().is_empty());
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_and_first_session_keeps_counting() {
    let twitter = ScriptedAdapter::new(
        Platform::Twitter,
        vec![vec![
            Step::Post(quiet_post(Platform::Twitter, "p1")),
            Step::Wait(5),
            Step::Post(quiet_post(Platform::Twitter, "p2")),
            Step::Hang,
        ]],
    );
    let h = harness(vec![twitter.clone()], CONFIDENT).await;

    h.manager
        .start(TENANT, Some(listener(false, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "first post", |s| s.stats.total_posts == 1).await;

    let err = h
        .manager
        .start(TENANT, Some(listener(true, vec![Platform::Twitter])))
        .await
        .unwrap_err();
    assert!(matches!(err, ListenError::AlreadyActive { .. }));

    let status = wait_for(&h.manager, "second post", |s| s.stats.total_posts == 2).await;
    assert!(status.active);
    assert_eq!(twitter.opened.load(Ordering::SeqCst), 1);

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test]
async fn start_without_integrations_is_rejected() {
    let h = harness(vec![], CONFIDENT).await;
    let err = h
        .manager
        .start(TENANT, Some(listener(false, vec![Platform::Twitter])))
        .await
        .unwrap_err();
    assert!(matches!(err, ListenError::NoIntegrations { .. }));

    let status = h.manager.status(TENANT).await;
    assert!(!status.active);
    assert_eq!(status.state, SessionState::Uninitialized);
}

#[tokio::test]
async fn start_without_keywords_is_rejected() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![]);
    let h = harness(vec![twitter], CONFIDENT).await;
    let mut config = listener(false, vec![Platform::Twitter]);
    config.keywords.clear();

    let err = h.manager.start(TENANT, Some(config)).await.unwrap_err();
    assert!(matches!(err, ListenError::InvalidConfig(_)));
}

#[tokio::test(start_paused = true)]
async fn failing_platform_retries_without_disturbing_the_other() {
    let twitter = ScriptedAdapter::new(
        Platform::Twitter,
        vec![
            vec![
                Step::Post(quiet_post(Platform::Twitter, "t1")),
                Step::Post(quiet_post(Platform::Twitter, "t2")),
                Step::Fail,
            ],
            vec![Step::Post(quiet_post(Platform::Twitter, "t3")), Step::Hang],
        ],
    );
    let meta = ScriptedAdapter::new(
        Platform::Meta,
        vec![vec![
            Step::Post(quiet_post(Platform::Meta, "m1")),
            Step::Wait(10),
            Step::Post(quiet_post(Platform::Meta, "m2")),
            Step::Hang,
        ]],
    );
    let h = harness(vec![twitter.clone(), meta.clone()], CONFIDENT).await;
    let mut events = h.manager.subscribe_events(TENANT).await;

    h.manager
        .start(
            TENANT,
            Some(listener(false, vec![Platform::Twitter, Platform::Meta])),
        )
        .await
        .unwrap();

    let retrying = wait_for(&h.manager, "twitter retrying", |s| {
        s.platforms.get(&Platform::Twitter) == Some(&PlatformStatus::Retrying { attempts: 1 })
    })
    .await;
    assert_eq!(
        retrying.platforms.get(&Platform::Meta),
        Some(&PlatformStatus::Listening)
    );

    let status = wait_for(&h.manager, "all posts seen", |s| s.stats.total_posts == 5).await;
    assert_eq!(
        status.platforms.get(&Platform::Twitter),
        Some(&PlatformStatus::Listening)
    );
    assert_eq!(twitter.opened.load(Ordering::SeqCst), 2);
    assert_eq!(meta.opened.load(Ordering::SeqCst), 1);

    let failed = loop {
        match events.recv().await.unwrap() {
            BusMessage::PlatformFailed {
                platform, attempts, ..
            } => break (platform, attempts),
            _ => continue,
        }
    };
    assert_eq!(failed, (Platform::Twitter, 1));

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn config_update_applies_to_the_next_post() {
    let twitter = ScriptedAdapter::new(
        Platform::Twitter,
        vec![vec![
            Step::Post(post(Platform::Twitter, "p1", "my daw", false, 150, 0)),
            Step::Wait(60),
            Step::Post(post(Platform::Twitter, "p2", "my synth", false, 150, 0)),
            Step::Hang,
        ]],
    );
    let h = harness(vec![twitter], CONFIDENT).await;

    let mut config = listener(false, vec![Platform::Twitter]);
    config.keywords = vec!["daw".into()];
    h.manager.start(TENANT, Some(config)).await.unwrap();
    wait_for(&h.manager, "first match", |s| s.stats.matched_posts == 1).await;

    let updated = h
        .manager
        .update_config(
            TENANT,
            ListenerConfigPatch {
                keywords: Some(vec!["synth".into()]),
                ..ListenerConfigPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.keywords, vec!["synth".to_string()]);
    assert_eq!(updated.platforms, vec![Platform::Twitter]);

    let status = wait_for(&h.manager, "second match", |s| s.stats.total_posts == 2).await;
    assert_eq!(status.stats.matched_posts, 2);

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_session_and_announces_it() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(quiet_post(Platform::Twitter, "p1")), Step::Hang]]);
    let h = harness(vec![twitter], CONFIDENT).await;
    let mut events = h.manager.subscribe_events(TENANT).await;

    h.manager
        .start(TENANT, Some(listener(false, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "first post", |s| s.stats.total_posts == 1).await;

    let stats = h.manager.stop(TENANT).await.unwrap();
    assert_eq!(stats.total_posts, 1);
    assert!(!h.manager.status(TENANT).await.active);

    let err = h.manager.stop(TENANT).await.unwrap_err();
    assert!(matches!(err, ListenError::NotActive { .. }));
    let err = h
        .manager
        .update_config(TENANT, ListenerConfigPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ListenError::NotActive { .. }));

    let mut saw_stop = false;
    while let Ok(msg) = events.try_recv() {
        saw_stop |= matches!(msg, BusMessage::ListenerStopped { .. });
    }
    assert!(saw_stop);
}

#[tokio::test(start_paused = true)]
async fn approval_can_be_decided_after_the_session_stopped() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(hot_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter.clone()], UNSURE).await;

    h.manager
        .start(TENANT, Some(listener(true, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "approval", |s| s.stats.human_interventions == 1).await;
    h.manager.stop(TENANT).await.unwrap();

    let pending = h.manager.pending_approvals(TENANT).await.unwrap();
    let outcome = h
        .manager
        .decide(TENANT, pending[0].id, ApprovalDecision::Approved, None)
        .await
        .unwrap();
    assert!(outcome.executed.is_some());
    assert_eq!(
        *twitter.replies.lock().unwrap(),
        vec![("p1".to_string(), "Maybe try the trial?".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_execution_is_recorded_and_not_retried() {
    let twitter = ScriptedAdapter::failing(Platform::Twitter, vec![vec![Step::Post(hot_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter.clone()], CONFIDENT).await;

    h.manager
        .start(TENANT, Some(listener(true, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "agent triggered", |s| s.stats.agents_triggered == 1).await;

    let mut failed = Vec::new();
    for _ in 0..1_000 {
        failed = h
            .store
            .triggers_with_status(TENANT, TriggerStatus::Failed)
            .await
            .unwrap();
        if !failed.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("over capacity"));

    let executions = h.store.executions_for(failed[0].trigger.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert_eq!(h.manager.status(TENANT).await.stats.auto_replies, 0);

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn concurrent_approvals_execute_once() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(hot_post("p1")), Step::Hang]]);
    let h = harness_with(vec![twitter.clone()], UNSURE, |store| {
        Arc::new(YieldingApprovals { inner: store }) as Arc<dyn ApprovalStore>
    })
    .await;

    h.manager
        .start(TENANT, Some(listener(true, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "approval", |s| s.stats.human_interventions == 1).await;
    let id = h.manager.pending_approvals(TENANT).await.unwrap()[0].id;

    let (a, b) = tokio::join!(
        h.manager.decide(TENANT, id, ApprovalDecision::Approved, None),
        h.manager.decide(TENANT, id, ApprovalDecision::Approved, None),
    );
    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected one winner, got {a:?} and {b:?}"),
    };
    assert!(won.executed.is_some());
    assert!(matches!(lost, ListenError::ApprovalAlreadyDecided(found) if found == id));
    assert_eq!(twitter.replies.lock().unwrap().len(), 1);
    assert_eq!(h.manager.status(TENANT).await.stats.auto_replies, 1);

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stalled_observer_does_not_block_the_session() {
    let script: Vec<Step> = (0..300)
        .map(|i| Step::Post(warm_post(&format!("p{i}"))))
        .chain([Step::Hang])
        .collect();
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![script]);
    let h = harness(vec![twitter], CONFIDENT).await;
    let mut observer = h.manager.subscribe_events(TENANT).await;

    h.manager
        .start(TENANT, Some(listener(false, vec![Platform::Twitter])))
        .await
        .unwrap();
    let status = wait_for(&h.manager, "every post seen", |s| s.stats.total_posts == 300).await;
    assert_eq!(status.stats.human_interventions, 300);

    let stats = tokio::time::timeout(Duration::from_secs(5), h.manager.stop(TENANT))
        .await
        .expect("stop stalled behind a full observer queue")
        .unwrap();
    assert_eq!(stats.total_posts, 300);

    let mut buffered = 0;
    while observer.try_recv().is_ok() {
        buffered += 1;
    }
    assert_eq!(buffered, 64);
}

#[tokio::test(start_paused = true)]
async fn observers_only_see_their_own_tenant() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(warm_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter], CONFIDENT).await;
    let mut own = h.manager.subscribe_events(TENANT).await;
    let mut other = h.manager.subscribe_events("t2").await;

    h.manager
        .start(TENANT, Some(listener(false, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "review", |s| s.stats.human_interventions == 1).await;
    h.manager.stop(TENANT).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(msg) = own.try_recv() {
        assert_eq!(msg.tenant_id(), TENANT);
        seen.push(msg);
    }
    assert!(matches!(seen.first(), Some(BusMessage::MatchFound { .. })));
    assert!(matches!(seen.last(), Some(BusMessage::ListenerStopped { .. })));
    assert!(other.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn expired_credentials_are_retried_at_the_fixed_interval() {
    let twitter = ScriptedAdapter::new(
        Platform::Twitter,
        vec![
            vec![Step::Expire],
            vec![Step::Post(quiet_post(Platform::Twitter, "p1")), Step::Hang],
        ],
    );
    let h = harness(vec![twitter.clone()], CONFIDENT).await;
    let mut events = h.manager.subscribe_events(TENANT).await;
    let started = tokio::time::Instant::now();

    h.manager
        .start(TENANT, Some(listener(false, vec![Platform::Twitter])))
        .await
        .unwrap();
    wait_for(&h.manager, "twitter retrying", |s| {
        s.platforms.get(&Platform::Twitter) == Some(&PlatformStatus::Retrying { attempts: 1 })
    })
    .await;

    let error = loop {
        match events.recv().await.unwrap() {
            BusMessage::PlatformFailed { error, attempts, .. } => {
                assert_eq!(attempts, 1);
                break error;
            }
            _ => continue,
        }
    };
    assert!(error.contains("credentials expired"), "{error}");
    assert!(error.contains("refresh rejected"), "{error}");

    let status = wait_for(&h.manager, "reopened", |s| s.stats.total_posts == 1).await;
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(
        status.platforms.get(&Platform::Twitter),
        Some(&PlatformStatus::Listening)
    );
    assert_eq!(twitter.opened.load(Ordering::SeqCst), 2);

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn disabled_agent_trigger_files_confident_replies_for_review() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(hot_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter.clone()], CONFIDENT).await;

    let mut config = listener(true, vec![Platform::Twitter]);
    config.actions.trigger_agent = false;
    h.manager.start(TENANT, Some(config)).await.unwrap();

    let status = wait_for(&h.manager, "review", |s| s.stats.human_interventions == 1).await;
    assert_eq!(status.stats.agents_triggered, 0);
    assert_eq!(status.stats.auto_replies, 0);
    assert!(twitter.replies.lock().unwrap().is_empty());

    let pending = h.manager.pending_approvals(TENANT).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].trigger.action, TriggerAction::Reply);
    assert_eq!(pending[0].candidate.as_ref().unwrap().content, "Thanks!");

    h.manager.stop(TENANT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn disabled_human_notification_only_records_the_match() {
    let twitter = ScriptedAdapter::new(Platform::Twitter, vec![vec![Step::Post(warm_post("p1")), Step::Hang]]);
    let h = harness(vec![twitter.clone()], CONFIDENT).await;

    let mut config = listener(false, vec![Platform::Twitter]);
    config.actions.notify_human = false;
    h.manager.start(TENANT, Some(config)).await.unwrap();

    let status = wait_for(&h.manager, "match", |s| s.stats.matched_posts == 1).await;
    assert_eq!(status.stats.human_interventions, 0);
    assert_eq!(h.store.recent_matches(TENANT, 10).await.unwrap().len(), 1);
    assert!(h.manager.pending_approvals(TENANT).await.unwrap().is_empty());
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);

    h.manager.stop(TENANT).await.unwrap();
}
