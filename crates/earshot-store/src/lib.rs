//! Persistence seams for the listening pipeline.
//!
//! Each concern gets its own trait so callers can depend on the narrowest
//! capability they need. [`SqliteStore`] implements all of them.

mod migrations;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use earshot_schema::{
    ActivityRecord, ApprovalRequest, BusinessProfile, Credentials, Integration,
    IntegrationStatus, KeywordMatch, Platform, ResponderCategory, ResponderPersonality,
    TriggerAction, TriggerStatus, WorkflowTrigger,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }
}

/// One execution attempt of a workflow trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub trigger_id: Uuid,
    pub tenant_id: String,
    pub category: ResponderCategory,
    pub action: TriggerAction,
    pub platform: Platform,
    pub post_id: String,
    pub status: ExecutionStatus,
    pub content: Option<String>,
    pub confidence: Option<u8>,
    pub reasoning: Option<String>,
    pub result_id: Option<String>,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// A persisted classifier verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecord {
    pub tenant_id: String,
    pub platform: Platform,
    pub post_id: String,
    pub keyword_match: KeywordMatch,
    pub at: DateTime<Utc>,
}

/// Stored trigger plus its last error, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerRecord {
    pub trigger: WorkflowTrigger,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn upsert_integration(&self, integration: &Integration) -> Result<()>;
    async fn get_integration(&self, id: &str) -> Result<Option<Integration>>;
    /// Integrations of `tenant_id` with status `connected` on any of `platforms`.
    async fn connected_integrations(
        &self,
        tenant_id: &str,
        platforms: &[Platform],
    ) -> Result<Vec<Integration>>;
    async fn update_credentials(&self, id: &str, credentials: &Credentials) -> Result<()>;
    async fn set_integration_status(&self, id: &str, status: IntegrationStatus) -> Result<()>;
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record_activity(&self, record: &ActivityRecord) -> Result<()>;
    async fn recent_activity(&self, tenant_id: &str, limit: usize) -> Result<Vec<ActivityRecord>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_match(&self, tenant_id: &str, keyword_match: &KeywordMatch) -> Result<()>;
    async fn recent_matches(&self, tenant_id: &str, limit: usize) -> Result<Vec<MatchRecord>>;
    async fn save_trigger(&self, trigger: &WorkflowTrigger, error: Option<&str>) -> Result<()>;
    async fn get_trigger(&self, id: Uuid) -> Result<Option<TriggerRecord>>;
    async fn triggers_with_status(
        &self,
        tenant_id: &str,
        status: TriggerStatus,
    ) -> Result<Vec<TriggerRecord>>;
    async fn record_execution(&self, execution: &WorkflowExecution) -> Result<()>;
    async fn executions_for(&self, trigger_id: Uuid) -> Result<Vec<WorkflowExecution>>;
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn insert_approval(&self, request: &ApprovalRequest) -> Result<()>;
    async fn get_approval(&self, id: Uuid) -> Result<Option<ApprovalRequest>>;
    async fn pending_approvals(&self, tenant_id: &str) -> Result<Vec<ApprovalRequest>>;
    /// Stores a decided request only while the stored copy is still pending.
    /// Returns `false` when the request is unknown or was already decided.
    async fn decide_approval(&self, request: &ApprovalRequest) -> Result<bool>;
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn tenant_display_name(&self, tenant_id: &str) -> Result<Option<String>>;
    async fn set_tenant_display_name(&self, tenant_id: &str, name: &str) -> Result<()>;
    async fn load_profile(&self, tenant_id: &str) -> Result<Option<BusinessProfile>>;
    async fn save_profile(&self, profile: &BusinessProfile) -> Result<()>;
    async fn load_personality(
        &self,
        tenant_id: &str,
        category: ResponderCategory,
    ) -> Result<Option<ResponderPersonality>>;
    async fn save_personality(&self, personality: &ResponderPersonality) -> Result<()>;
}
