use std::collections::HashMap;
use std::sync::Arc;

use earshot_bus::{BusPublisher, EventBus};
use earshot_schema::{
    ApprovalDecision, ApprovalRequest, BusMessage, ListenerConfig, ListenerConfigPatch,
    ListenerStats, Platform, PlatformStatus, SessionState,
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::context::BusinessContextStore;
use crate::engine::{EngineDeps, ListeningEngine};
use crate::gate::{ApprovalGate, DecisionOutcome};
use crate::stats::SessionStats;
use crate::ListenError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub tenant_id: String,
    pub state: SessionState,
    pub active: bool,
    pub stats: ListenerStats,
    pub platforms: std::collections::BTreeMap<Platform, PlatformStatus>,
}

struct ListenerSession {
    engine: Arc<ListeningEngine>,
    drain: JoinHandle<()>,
}

/// Owns every tenant's listener. At most one session per tenant is live;
/// a second start is rejected while the first one runs.
///
/// Each tenant has its own observer hub that outlives individual sessions.
/// Sessions forward into it with [`BusPublisher::try_publish`], so an
/// observer that stops reading misses events but never stalls a listener.
pub struct SessionManager {
    deps: EngineDeps,
    defaults: ListenerConfig,
    hubs: Mutex<HashMap<String, EventBus>>,
    sessions: Mutex<HashMap<String, ListenerSession>>,
}

impl SessionManager {
    pub fn new(deps: EngineDeps, defaults: ListenerConfig) -> Self {
        Self {
            deps,
            defaults,
            hubs: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> Arc<BusinessContextStore> {
        self.deps.gate.context.clone()
    }

    /// Receives the tenant's events, for streaming to observers.
    pub async fn subscribe_events(&self, tenant_id: &str) -> mpsc::Receiver<BusMessage> {
        let mut hubs = self.hubs.lock().await;
        hubs.entry(tenant_id.to_string())
            .or_insert_with(|| EventBus::new(self.deps.queue_capacity))
            .subscribe_all()
            .await
    }

    async fn hub(&self, tenant_id: &str) -> BusPublisher {
        let mut hubs = self.hubs.lock().await;
        hubs.entry(tenant_id.to_string())
            .or_insert_with(|| EventBus::new(self.deps.queue_capacity))
            .publisher()
    }

    pub async fn start(
        &self,
        tenant_id: &str,
        config: Option<ListenerConfig>,
    ) -> Result<SessionStatus, ListenError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(tenant_id) {
            if existing.engine.is_active().await {
                return Err(ListenError::AlreadyActive {
                    tenant_id: tenant_id.to_string(),
                });
            }
        }

        let config = config.unwrap_or_else(|| self.defaults.clone());
        let engine = Arc::new(ListeningEngine::new(tenant_id, config, self.deps.clone()));
        let events = engine.bus().subscribe_all().await;
        engine.start_listening().await?;

        let hub = self.hub(tenant_id).await;
        let drain = tokio::spawn(drain_events(tenant_id.to_string(), events, hub));
        let status = status_of(tenant_id, &engine).await;
        sessions.insert(
            tenant_id.to_string(),
            ListenerSession { engine, drain },
        );
        Ok(status)
    }

    /// Stops and discards the tenant's session, returning its final counters.
    pub async fn stop(&self, tenant_id: &str) -> Result<ListenerStats, ListenError> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(tenant_id)
            .ok_or_else(|| ListenError::NotActive {
                tenant_id: tenant_id.to_string(),
            })?;

        let stats = session.engine.stop_listening().await;
        if let Err(e) = session.drain.await {
            tracing::warn!(tenant_id, error = %e, "event drain ended abnormally");
        }
        Ok(stats)
    }

    pub async fn status(&self, tenant_id: &str) -> SessionStatus {
        let engine = self.engine(tenant_id).await;
        match engine {
            Some(engine) => status_of(tenant_id, &engine).await,
            None => SessionStatus {
                tenant_id: tenant_id.to_string(),
                state: SessionState::Uninitialized,
                active: false,
                stats: ListenerStats::default(),
                platforms: Default::default(),
            },
        }
    }

    pub async fn update_config(
        &self,
        tenant_id: &str,
        patch: ListenerConfigPatch,
    ) -> Result<ListenerConfig, ListenError> {
        let engine = self
            .engine(tenant_id)
            .await
            .ok_or_else(|| ListenError::NotActive {
                tenant_id: tenant_id.to_string(),
            })?;
        engine.update_config(patch)
    }

    pub async fn pending_approvals(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ApprovalRequest>, ListenError> {
        Ok(self
            .deps
            .gate
            .approvals
            .pending_approvals(tenant_id)
            .await?)
    }

    /// Decides an approval through the tenant's live session, or through a
    /// one-off gate over its connected integrations when none is running.
    pub async fn decide(
        &self,
        tenant_id: &str,
        approval_id: Uuid,
        decision: ApprovalDecision,
        edited_text: Option<String>,
    ) -> Result<DecisionOutcome, ListenError> {
        let live = match self.engine(tenant_id).await {
            Some(engine) => engine.gate().await,
            None => None,
        };
        let outcome = match live {
            Some(gate) => gate.decide(approval_id, decision, edited_text).await?,
            None => {
                let bus = EventBus::new(self.deps.queue_capacity);
                let events = bus.subscribe_all().await;
                let hub = self.hub(tenant_id).await;
                let forward = tokio::spawn(drain_events(tenant_id.to_string(), events, hub));
                let result = match self.detached_gate(tenant_id, bus.publisher()).await {
                    Ok(gate) => gate.decide(approval_id, decision, edited_text).await,
                    Err(e) => Err(e),
                };
                drop(bus);
                if let Err(e) = forward.await {
                    tracing::warn!(tenant_id, error = %e, "event drain ended abnormally");
                }
                result?
            }
        };
        tracing::info!(
            tenant_id,
            %approval_id,
            decision = outcome.approval.status.as_str(),
            executed = outcome.executed.is_some(),
            "approval decided"
        );
        Ok(outcome)
    }

    /// Stops every live session.
    pub async fn shutdown(&self) {
        let tenants: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        for tenant_id in tenants {
            if let Err(e) = self.stop(&tenant_id).await {
                tracing::debug!(%tenant_id, error = %e, "session already gone");
            }
        }
    }

    async fn engine(&self, tenant_id: &str) -> Option<Arc<ListeningEngine>> {
        self.sessions
            .lock()
            .await
            .get(tenant_id)
            .map(|s| s.engine.clone())
    }

    async fn detached_gate(
        &self,
        tenant_id: &str,
        events: BusPublisher,
    ) -> Result<ApprovalGate, ListenError> {
        let integrations = self
            .deps
            .integrations
            .connected_integrations(tenant_id, &Platform::ALL)
            .await?;
        let mut adapters = HashMap::new();
        for integration in integrations {
            let platform = integration.platform;
            if adapters.contains_key(&platform) {
                continue;
            }
            match self.deps.factory.build(integration) {
                Ok(adapter) => {
                    adapters.insert(platform, adapter);
                }
                Err(e) => tracing::warn!(tenant_id, %platform, error = %e, "adapter unavailable"),
            }
        }
        Ok(ApprovalGate::new(
            tenant_id,
            self.deps.gate.clone(),
            adapters,
            events,
            Arc::new(SessionStats::default()),
        ))
    }
}

async fn status_of(tenant_id: &str, engine: &ListeningEngine) -> SessionStatus {
    let status = engine.status().await;
    SessionStatus {
        tenant_id: tenant_id.to_string(),
        state: status.state,
        active: status.active,
        stats: status.stats,
        platforms: status.platforms,
    }
}

/// Logs a session's events and forwards them to the tenant hub until the
/// session reports that it stopped or its bus goes away.
async fn drain_events(tenant_id: String, mut events: mpsc::Receiver<BusMessage>, hub: BusPublisher) {
    while let Some(msg) = events.recv().await {
        let stopped = matches!(msg, BusMessage::ListenerStopped { .. });
        tracing::debug!(%tenant_id, event = ?msg, "session event");
        let missed = hub.try_publish(msg).await;
        if missed > 0 {
            tracing::warn!(%tenant_id, missed, "observer queue full, event dropped");
        }
        if stopped {
            break;
        }
    }
}
