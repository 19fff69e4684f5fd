//! Audit logging for workflow decisions.
//!
//! Every recorded match, executed or failed trigger and filed or decided
//! approval is emitted as one structured entry under `earshot::audit`, next
//! to the row written to the store.

use chrono::{DateTime, Utc};
use earshot_schema::{Platform, TriggerAction};
use serde::Serialize;
use uuid::Uuid;

/// Audit log entry for one step of a listening workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowAuditEntry {
    /// When the step completed
    pub timestamp: DateTime<Utc>,
    /// Tenant that owns the session
    pub tenant_id: String,
    /// Network the post came from
    pub platform: Platform,
    /// Platform-native post identifier
    pub post_id: String,
    /// Trigger identifier, absent for plain matches
    pub trigger_id: Option<Uuid>,
    /// What happened
    pub event: WorkflowEvent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    MatchRecorded {
        relevance_score: u8,
        keywords: String,
    },
    TriggerExecuted {
        action: TriggerAction,
        result_url: Option<String>,
    },
    TriggerFailed {
        action: TriggerAction,
        error: String,
    },
    ApprovalFiled {
        approval_id: Uuid,
        reason: String,
    },
    ApprovalDecided {
        approval_id: Uuid,
        decision: String,
    },
}

impl WorkflowEvent {
    fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::MatchRecorded { .. } => "match_recorded",
            WorkflowEvent::TriggerExecuted { .. } => "trigger_executed",
            WorkflowEvent::TriggerFailed { .. } => "trigger_failed",
            WorkflowEvent::ApprovalFiled { .. } => "approval_filed",
            WorkflowEvent::ApprovalDecided { .. } => "approval_decided",
        }
    }
}

impl WorkflowAuditEntry {
    pub fn new(
        tenant_id: impl Into<String>,
        platform: Platform,
        post_id: impl Into<String>,
        event: WorkflowEvent,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            tenant_id: tenant_id.into(),
            platform,
            post_id: post_id.into(),
            trigger_id: None,
            event,
        }
    }

    pub fn matched(
        tenant_id: impl Into<String>,
        platform: Platform,
        post_id: impl Into<String>,
        relevance_score: u8,
        keywords: &[String],
    ) -> Self {
        Self::new(
            tenant_id,
            platform,
            post_id,
            WorkflowEvent::MatchRecorded {
                relevance_score,
                keywords: truncate_string(&keywords.join(","), 120),
            },
        )
    }

    pub fn with_trigger(mut self, trigger_id: Uuid) -> Self {
        self.trigger_id = Some(trigger_id);
        self
    }

    /// Emit this entry to the tracing log.
    pub fn emit(&self) {
        tracing::info!(
            target: "earshot::audit",
            tenant_id = %self.tenant_id,
            platform = %self.platform,
            post_id = %self.post_id,
            trigger_id = ?self.trigger_id,
            event = self.event.name(),
            detail = ?self.event,
            "workflow_step"
        );

        if let WorkflowEvent::TriggerFailed { action, error } = &self.event {
            tracing::warn!(
                target: "earshot::audit",
                tenant_id = %self.tenant_id,
                post_id = %self.post_id,
                action = %action,
                error = %truncate_string(error, 200),
                "workflow trigger failed"
            );
        }
    }
}

/// Truncate to at most `max_chars` characters, adding an ellipsis when cut.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
