//! Approval and execution of workflow triggers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use earshot_bus::BusPublisher;
use earshot_platforms::{PlatformAdapter, PlatformError};
use earshot_schema::{
    AgentReply, ApprovalDecision, ApprovalPolicy, ApprovalRequest, ApprovalStatus, BusMessage,
    Platform, TriggerAction, TriggerStatus, WorkflowTrigger,
};
use earshot_store::{ApprovalStore, AuditStore, ExecutionStatus, WorkflowExecution};
use serde::Serialize;
use uuid::Uuid;

use crate::audit::{WorkflowAuditEntry, WorkflowEvent};
use crate::context::BusinessContextStore;
use crate::generator::ResponseGenerator;
use crate::stats::SessionStats;
use crate::ListenError;

/// Collaborators shared by every tenant's gate.
#[derive(Clone)]
pub struct GateServices {
    pub context: Arc<BusinessContextStore>,
    pub generator: Arc<ResponseGenerator>,
    pub audit: Arc<dyn AuditStore>,
    pub approvals: Arc<dyn ApprovalStore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub result_id: Option<String>,
    pub result_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EngageOutcome {
    Executed(ExecutionOutcome),
    Filed { approval_id: Uuid },
}

/// Result of a human decision. An approved item whose execution fails keeps
/// its decision; the failure is reported in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionOutcome {
    pub approval: ApprovalRequest,
    pub executed: Option<ExecutionOutcome>,
    pub error: Option<String>,
}

pub struct ApprovalGate {
    tenant_id: String,
    services: GateServices,
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    events: BusPublisher,
    stats: Arc<SessionStats>,
}

impl ApprovalGate {
    pub fn new(
        tenant_id: impl Into<String>,
        services: GateServices,
        adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
        events: BusPublisher,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            services,
            adapters,
            events,
            stats,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Generates a reply and executes it unless the reply, the personality
    /// threshold or the tenant's approval policy calls for a human.
    pub async fn auto_engage(&self, trigger: WorkflowTrigger) -> Result<EngageOutcome, ListenError> {
        let context = &self.services.context;
        let personality = context
            .get_personality(&self.tenant_id, trigger.category)
            .await?;
        let profile = context.get_profile(&self.tenant_id).await?;

        let reply = match self.draft(&trigger).await {
            Ok(reply) => reply,
            Err(err) => {
                let reason = format!("reply generation failed: {err}");
                let approval = self.file_approval(trigger, None, reason).await?;
                return Ok(EngageOutcome::Filed {
                    approval_id: approval.id,
                });
            }
        };

        let reason = if reply.requires_approval {
            Some(format!("reply needs review (confidence {})", reply.confidence))
        } else if reply.confidence < personality.confidence_threshold {
            Some(format!(
                "confidence {} below threshold {}",
                reply.confidence, personality.confidence_threshold
            ))
        } else if profile.social_guidelines.approval_policy == ApprovalPolicy::Always {
            Some("tenant policy requires approval".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => {
                let approval = self.file_approval(trigger, Some(reply), reason).await?;
                Ok(EngageOutcome::Filed {
                    approval_id: approval.id,
                })
            }
            None => self
                .execute(trigger, Some(&reply))
                .await
                .map(EngageOutcome::Executed),
        }
    }

    /// Files a trigger for human review, drafting a candidate when the action
    /// carries text.
    pub async fn request_review(
        &self,
        trigger: WorkflowTrigger,
        reason: impl Into<String>,
    ) -> Result<ApprovalRequest, ListenError> {
        let candidate = if trigger.action.needs_content() {
            match self.draft(&trigger).await {
                Ok(reply) => Some(reply),
                Err(err) => {
                    tracing::warn!(trigger_id = %trigger.id, error = %err, "draft generation failed");
                    None
                }
            }
        } else {
            None
        };
        self.file_approval(trigger, candidate, reason.into()).await
    }

    pub async fn file_approval(
        &self,
        mut trigger: WorkflowTrigger,
        candidate: Option<AgentReply>,
        reason: String,
    ) -> Result<ApprovalRequest, ListenError> {
        trigger.status = TriggerStatus::PendingApproval;
        self.services.audit.save_trigger(&trigger, None).await?;

        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id.clone(),
            trigger,
            candidate,
            reason,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        };
        self.services.approvals.insert_approval(&request).await?;
        self.stats.human_intervention();

        WorkflowAuditEntry::new(
            &self.tenant_id,
            request.trigger.post.platform,
            &request.trigger.post.id,
            WorkflowEvent::ApprovalFiled {
                approval_id: request.id,
                reason: request.reason.clone(),
            },
        )
        .with_trigger(request.trigger.id)
        .emit();
        self.publish(BusMessage::ApprovalRequested {
            tenant_id: self.tenant_id.clone(),
            approval_id: request.id,
            reason: request.reason.clone(),
        })
        .await;
        Ok(request)
    }

    /// Performs the trigger's action once. Failures are recorded on the
    /// trigger and returned; nothing is retried.
    pub async fn execute(
        &self,
        mut trigger: WorkflowTrigger,
        reply: Option<&AgentReply>,
    ) -> Result<ExecutionOutcome, ListenError> {
        let platform = trigger.post.platform;
        let result = self.dispatch(&trigger, reply).await;

        let mut execution = WorkflowExecution {
            trigger_id: trigger.id,
            tenant_id: self.tenant_id.clone(),
            category: trigger.category,
            action: trigger.action,
            platform,
            post_id: trigger.post.id.clone(),
            status: ExecutionStatus::Success,
            content: reply.map(|r| r.content.clone()),
            confidence: reply.map(|r| r.confidence),
            reasoning: reply.map(|r| r.reasoning.clone()),
            result_id: None,
            result_url: None,
            error: None,
            at: Utc::now(),
        };
        let entry = |event: WorkflowEvent| {
            WorkflowAuditEntry::new(&self.tenant_id, platform, &trigger.post.id, event)
                .with_trigger(trigger.id)
        };

        match result {
            Ok(outcome) => {
                trigger.status = TriggerStatus::Completed;
                self.services.audit.save_trigger(&trigger, None).await?;
                execution.result_id = outcome.result_id.clone();
                execution.result_url = outcome.result_url.clone();
                self.services.audit.record_execution(&execution).await?;
                if trigger.action == TriggerAction::Reply {
                    self.stats.auto_reply_sent();
                }

                entry(WorkflowEvent::TriggerExecuted {
                    action: trigger.action,
                    result_url: outcome.result_url.clone(),
                })
                .emit();
                self.publish(BusMessage::ActionExecuted {
                    tenant_id: self.tenant_id.clone(),
                    trigger_id: trigger.id,
                    action: trigger.action,
                    result_url: outcome.result_url.clone(),
                })
                .await;
                Ok(outcome)
            }
            Err(err) => {
                let message = err.to_string();
                trigger.status = TriggerStatus::Failed;
                self.services
                    .audit
                    .save_trigger(&trigger, Some(&message))
                    .await?;
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(message.clone());
                self.services.audit.record_execution(&execution).await?;

                entry(WorkflowEvent::TriggerFailed {
                    action: trigger.action,
                    error: message.clone(),
                })
                .emit();
                self.publish(BusMessage::ActionFailed {
                    tenant_id: self.tenant_id.clone(),
                    trigger_id: trigger.id,
                    error: message,
                })
                .await;
                Err(err)
            }
        }
    }

    pub async fn pending(&self) -> Result<Vec<ApprovalRequest>, ListenError> {
        Ok(self
            .services
            .approvals
            .pending_approvals(&self.tenant_id)
            .await?)
    }

    /// Records a human decision. `edited_text` replaces the candidate reply
    /// before an approved item is executed.
    pub async fn decide(
        &self,
        approval_id: Uuid,
        decision: ApprovalDecision,
        edited_text: Option<String>,
    ) -> Result<DecisionOutcome, ListenError> {
        let mut approval = self
            .services
            .approvals
            .get_approval(approval_id)
            .await?
            .filter(|a| a.tenant_id == self.tenant_id)
            .ok_or(ListenError::ApprovalNotFound(approval_id))?;
        if approval.status != ApprovalStatus::Pending {
            return Err(ListenError::ApprovalAlreadyDecided(approval_id));
        }

        if let Some(text) = edited_text.filter(|t| !t.trim().is_empty()) {
            approval.candidate = Some(match approval.candidate.take() {
                Some(mut reply) => {
                    reply.content = text;
                    reply
                }
                None => AgentReply {
                    content: text,
                    confidence: 100,
                    reasoning: "written by reviewer".to_string(),
                    requires_approval: false,
                },
            });
        }
        approval.status = decision.into();
        approval.decided_at = Some(Utc::now());
        if !self.services.approvals.decide_approval(&approval).await? {
            return Err(ListenError::ApprovalAlreadyDecided(approval_id));
        }

        WorkflowAuditEntry::new(
            &self.tenant_id,
            approval.trigger.post.platform,
            &approval.trigger.post.id,
            WorkflowEvent::ApprovalDecided {
                approval_id,
                decision: approval.status.as_str().to_string(),
            },
        )
        .with_trigger(approval.trigger.id)
        .emit();

        if decision == ApprovalDecision::Rejected {
            return Ok(DecisionOutcome {
                approval,
                executed: None,
                error: None,
            });
        }

        let candidate = if let Some(reply) = approval.candidate.clone() {
            Some(reply)
        } else if approval.trigger.action.needs_content() {
            match self.draft(&approval.trigger).await {
                Ok(reply) => Some(reply),
                Err(err) => {
                    return Ok(DecisionOutcome {
                        approval,
                        executed: None,
                        error: Some(err.to_string()),
                    })
                }
            }
        } else {
            None
        };

        let result = self
            .execute(approval.trigger.clone(), candidate.as_ref())
            .await;
        let (executed, error) = match result {
            Ok(outcome) => (Some(outcome), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Ok(DecisionOutcome {
            approval,
            executed,
            error,
        })
    }

    async fn draft(&self, trigger: &WorkflowTrigger) -> Result<AgentReply, ListenError> {
        let context = &self.services.context;
        let system = context
            .build_system_prompt(&self.tenant_id, trigger.category)
            .await?;
        let knowledge = context
            .search_knowledge_base(&self.tenant_id, &trigger.post.text)
            .await?;
        self.services
            .generator
            .generate(trigger, &system, &knowledge)
            .await
    }

    async fn dispatch(
        &self,
        trigger: &WorkflowTrigger,
        reply: Option<&AgentReply>,
    ) -> Result<ExecutionOutcome, ListenError> {
        let platform = trigger.post.platform;
        let adapter = self.adapters.get(&platform).ok_or_else(|| {
            ListenError::Execution(format!("no {platform} integration in this session"))
        })?;
        let content = || {
            reply
                .map(|r| r.content.as_str())
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| ListenError::Execution(format!("{} needs reply text", trigger.action)))
        };
        let fail = |e: PlatformError| ListenError::execution(platform, e);

        match trigger.action {
            TriggerAction::Reply => {
                let result = adapter
                    .reply_to_post(&trigger.post.id, content()?)
                    .await
                    .map_err(fail)?;
                Ok(ExecutionOutcome {
                    result_id: Some(result.id),
                    result_url: Some(result.url),
                })
            }
            TriggerAction::Like => {
                adapter.like_post(&trigger.post.id).await.map_err(fail)?;
                Ok(ExecutionOutcome::default())
            }
            TriggerAction::Dm => {
                let result = adapter
                    .send_direct_message(&trigger.post.author.id, content()?)
                    .await
                    .map_err(fail)?;
                Ok(ExecutionOutcome {
                    result_id: Some(result.id),
                    result_url: None,
                })
            }
            TriggerAction::Follow => Err(fail(PlatformError::Unsupported {
                platform,
                capability: "follow",
            })),
            TriggerAction::Monitor => Ok(ExecutionOutcome::default()),
        }
    }

    async fn publish(&self, msg: BusMessage) {
        if let Err(e) = self.events.publish(msg).await {
            tracing::debug!(tenant_id = %self.tenant_id, error = %e, "event dropped");
        }
    }
}
