use std::sync::Arc;

use chrono::Utc;
use earshot_schema::{ActivityKind, ActivityRecord, Integration, Platform};
use earshot_store::ActivityLog;

/// Appends one activity row per mutating platform call.
#[derive(Clone)]
pub struct ActivityRecorder {
    tenant_id: String,
    integration_id: String,
    platform: Platform,
    log: Arc<dyn ActivityLog>,
}

impl ActivityRecorder {
    pub fn new(integration: &Integration, log: Arc<dyn ActivityLog>) -> Self {
        Self {
            tenant_id: integration.tenant_id.clone(),
            integration_id: integration.id.clone(),
            platform: integration.platform,
            log,
        }
    }

    /// The platform call already succeeded, so a logging failure is reported
    /// but not returned.
    pub async fn record(
        &self,
        kind: ActivityKind,
        post_id: Option<&str>,
        content: Option<&str>,
        metadata: serde_json::Value,
    ) {
        let record = ActivityRecord {
            tenant_id: self.tenant_id.clone(),
            integration_id: self.integration_id.clone(),
            platform: self.platform,
            kind,
            post_id: post_id.map(str::to_string),
            content: content.map(str::to_string),
            metadata,
            at: Utc::now(),
        };
        if let Err(e) = self.log.record_activity(&record).await {
            tracing::warn!(
                tenant_id = %self.tenant_id,
                platform = %self.platform,
                kind = kind.as_str(),
                error = %e,
                "failed to append activity record"
            );
        }
    }
}
