use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use earshot_schema::{
    ActivityRecord, ApprovalRequest, ApprovalStatus, BusinessProfile, Credentials, Integration,
    IntegrationStatus, KeywordMatch, Platform, ResponderCategory, ResponderPersonality,
    TriggerStatus, WorkflowTrigger,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::migrations::run_migrations;
use crate::{
    ActivityLog, ApprovalStore, AuditStore, ContextStore, IntegrationStore, MatchRecord,
    TriggerRecord, WorkflowExecution,
};

/// SQLite-backed implementation of every store trait.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parses a lowercase enum label stored as plain text.
fn parse_label<T: DeserializeOwned>(idx: usize, raw: String) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(raw))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn uuid_col(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_integration(row: &Row<'_>) -> rusqlite::Result<Integration> {
    Ok(Integration {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        platform: parse_label(2, row.get(2)?)?,
        status: parse_label::<IntegrationStatus>(3, row.get(3)?)?,
        credentials: Credentials {
            access_token: row.get(4)?,
            refresh_token: row.get(5)?,
            expires_at: parse_opt_ts(6, row.get(6)?)?,
        },
    })
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<WorkflowExecution> {
    Ok(WorkflowExecution {
        trigger_id: uuid_col(0, &row.get::<_, String>(0)?)?,
        tenant_id: row.get(1)?,
        category: parse_label(2, row.get(2)?)?,
        action: parse_label(3, row.get(3)?)?,
        platform: parse_label(4, row.get(4)?)?,
        post_id: row.get(5)?,
        status: parse_label(6, row.get(6)?)?,
        content: row.get(7)?,
        confidence: row.get::<_, Option<i64>>(8)?.map(|c| c.clamp(0, 100) as u8),
        reasoning: row.get(9)?,
        result_id: row.get(10)?,
        result_url: row.get(11)?,
        error: row.get(12)?,
        at: parse_ts(13, &row.get::<_, String>(13)?)?,
    })
}

fn row_to_trigger(row: &Row<'_>) -> rusqlite::Result<TriggerRecord> {
    Ok(TriggerRecord {
        trigger: parse_json(0, &row.get::<_, String>(0)?)?,
        error: row.get(1)?,
        updated_at: parse_ts(2, &row.get::<_, String>(2)?)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────
// Integrations
// ─────────────────────────────────────────────────────────────────────────

#[async_trait]
impl IntegrationStore for SqliteStore {
    async fn upsert_integration(&self, integration: &Integration) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO integrations
               (id, tenant_id, platform, status, access_token, refresh_token, expires_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                integration.id,
                integration.tenant_id,
                integration.platform.as_str(),
                integration.status.as_str(),
                integration.credentials.access_token,
                integration.credentials.refresh_token,
                integration.credentials.expires_at.as_ref().map(ts),
                ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    async fn get_integration(&self, id: &str) -> Result<Option<Integration>> {
        let conn = self.conn.lock().await;
        let integration = conn
            .query_row(
                r#"SELECT id, tenant_id, platform, status, access_token, refresh_token, expires_at
                   FROM integrations WHERE id = ?1"#,
                [id],
                row_to_integration,
            )
            .optional()?;
        Ok(integration)
    }

    async fn connected_integrations(
        &self,
        tenant_id: &str,
        platforms: &[Platform],
    ) -> Result<Vec<Integration>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT id, tenant_id, platform, status, access_token, refresh_token, expires_at
               FROM integrations
               WHERE tenant_id = ?1 AND status = 'connected'
               ORDER BY platform, id"#,
        )?;
        let rows = stmt.query_map([tenant_id], row_to_integration)?;

        let mut integrations = Vec::new();
        for row in rows {
            let integration = row?;
            if platforms.contains(&integration.platform) {
                integrations.push(integration);
            }
        }
        Ok(integrations)
    }

    async fn update_credentials(&self, id: &str, credentials: &Credentials) -> Result<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            r#"UPDATE integrations
               SET access_token = ?2, refresh_token = ?3, expires_at = ?4, updated_at = ?5
               WHERE id = ?1"#,
            params![
                id,
                credentials.access_token,
                credentials.refresh_token,
                credentials.expires_at.as_ref().map(ts),
                ts(&Utc::now()),
            ],
        )?;
        anyhow::ensure!(changed == 1, "integration not found: {id}");
        Ok(())
    }

    async fn set_integration_status(&self, id: &str, status: IntegrationStatus) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE integrations SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), ts(&Utc::now())],
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Activity log
// ─────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ActivityLog for SqliteStore {
    async fn record_activity(&self, record: &ActivityRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO social_activity
               (tenant_id, integration_id, platform, kind, post_id, content, metadata, at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                record.tenant_id,
                record.integration_id,
                record.platform.as_str(),
                record.kind.as_str(),
                record.post_id,
                record.content,
                record.metadata.to_string(),
                ts(&record.at),
            ],
        )?;
        Ok(())
    }

    async fn recent_activity(&self, tenant_id: &str, limit: usize) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT tenant_id, integration_id, platform, kind, post_id, content, metadata, at
               FROM social_activity
               WHERE tenant_id = ?1
               ORDER BY at DESC, id DESC
               LIMIT ?2"#,
        )?;
        let rows = stmt.query_map(params![tenant_id, limit as i64], |row| {
            Ok(ActivityRecord {
                tenant_id: row.get(0)?,
                integration_id: row.get(1)?,
                platform: parse_label(2, row.get(2)?)?,
                kind: parse_label(3, row.get(3)?)?,
                post_id: row.get(4)?,
                content: row.get(5)?,
                metadata: parse_json(6, &row.get::<_, String>(6)?)?,
                at: parse_ts(7, &row.get::<_, String>(7)?)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Audit: matches, triggers, execution log
// ─────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AuditStore for SqliteStore {
    async fn record_match(&self, tenant_id: &str, keyword_match: &KeywordMatch) -> Result<()> {
        let body = serde_json::to_string(keyword_match)?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO keyword_matches
               (tenant_id, platform, post_id, relevance_score, sentiment, suggested_action, body, at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                tenant_id,
                keyword_match.post.platform.as_str(),
                keyword_match.post.id,
                keyword_match.relevance_score as i64,
                keyword_match.sentiment.as_str(),
                keyword_match.suggested_action.as_str(),
                body,
                ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    async fn recent_matches(&self, tenant_id: &str, limit: usize) -> Result<Vec<MatchRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT tenant_id, platform, post_id, body, at
               FROM keyword_matches
               WHERE tenant_id = ?1
               ORDER BY at DESC, id DESC
               LIMIT ?2"#,
        )?;
        let rows = stmt.query_map(params![tenant_id, limit as i64], |row| {
            Ok(MatchRecord {
                tenant_id: row.get(0)?,
                platform: parse_label(1, row.get(1)?)?,
                post_id: row.get(2)?,
                keyword_match: parse_json(3, &row.get::<_, String>(3)?)?,
                at: parse_ts(4, &row.get::<_, String>(4)?)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    async fn save_trigger(&self, trigger: &WorkflowTrigger, error: Option<&str>) -> Result<()> {
        let body = serde_json::to_string(trigger)?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO workflow_triggers
               (id, tenant_id, status, body, error, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                trigger.id.to_string(),
                trigger.tenant_id,
                trigger.status.as_str(),
                body,
                error,
                ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    async fn get_trigger(&self, id: Uuid) -> Result<Option<TriggerRecord>> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                "SELECT body, error, updated_at FROM workflow_triggers WHERE id = ?1",
                [id.to_string()],
                row_to_trigger,
            )
            .optional()?;
        Ok(record)
    }

    async fn triggers_with_status(
        &self,
        tenant_id: &str,
        status: TriggerStatus,
    ) -> Result<Vec<TriggerRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT body, error, updated_at
               FROM workflow_triggers
               WHERE tenant_id = ?1 AND status = ?2
               ORDER BY updated_at"#,
        )?;
        let rows = stmt.query_map(params![tenant_id, status.as_str()], row_to_trigger)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    async fn record_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO agent_workflow_logs
               (trigger_id, tenant_id, category, action, platform, post_id, status, content,
                confidence, reasoning, result_id, result_url, error, at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
            params![
                execution.trigger_id.to_string(),
                execution.tenant_id,
                execution.category.as_str(),
                execution.action.as_str(),
                execution.platform.as_str(),
                execution.post_id,
                execution.status.as_str(),
                execution.content,
                execution.confidence.map(i64::from),
                execution.reasoning,
                execution.result_id,
                execution.result_url,
                execution.error,
                ts(&execution.at),
            ],
        )?;
        Ok(())
    }

    async fn executions_for(&self, trigger_id: Uuid) -> Result<Vec<WorkflowExecution>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT trigger_id, tenant_id, category, action, platform, post_id, status, content,
                      confidence, reasoning, result_id, result_url, error, at
               FROM agent_workflow_logs
               WHERE trigger_id = ?1
               ORDER BY id"#,
        )?;
        let rows = stmt.query_map([trigger_id.to_string()], row_to_execution)?;

        let mut executions = Vec::new();
        for row in rows {
            executions.push(row?);
        }
        Ok(executions)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Approvals
// ─────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ApprovalStore for SqliteStore {
    async fn insert_approval(&self, request: &ApprovalRequest) -> Result<()> {
        let body = serde_json::to_string(request)?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO approval_requests (id, tenant_id, status, body, created_at, decided_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                request.id.to_string(),
                request.tenant_id,
                request.status.as_str(),
                body,
                ts(&request.created_at),
                request.decided_at.as_ref().map(ts),
            ],
        )?;
        Ok(())
    }

    async fn get_approval(&self, id: Uuid) -> Result<Option<ApprovalRequest>> {
        let conn = self.conn.lock().await;
        let request = conn
            .query_row(
                "SELECT body FROM approval_requests WHERE id = ?1",
                [id.to_string()],
                |row| parse_json(0, &row.get::<_, String>(0)?),
            )
            .optional()?;
        Ok(request)
    }

    async fn pending_approvals(&self, tenant_id: &str) -> Result<Vec<ApprovalRequest>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT body FROM approval_requests
               WHERE tenant_id = ?1 AND status = ?2
               ORDER BY created_at, id"#,
        )?;
        let rows = stmt.query_map(
            params![tenant_id, ApprovalStatus::Pending.as_str()],
            |row| parse_json(0, &row.get::<_, String>(0)?),
        )?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    async fn decide_approval(&self, request: &ApprovalRequest) -> Result<bool> {
        let body = serde_json::to_string(request)?;
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            r#"UPDATE approval_requests SET status = ?2, body = ?3, decided_at = ?4
               WHERE id = ?1 AND status = ?5"#,
            params![
                request.id.to_string(),
                request.status.as_str(),
                body,
                request.decided_at.as_ref().map(ts),
                ApprovalStatus::Pending.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Business context
// ─────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ContextStore for SqliteStore {
    async fn tenant_display_name(&self, tenant_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let name = conn
            .query_row(
                "SELECT display_name FROM tenants WHERE tenant_id = ?1",
                [tenant_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    async fn set_tenant_display_name(&self, tenant_id: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO tenants (tenant_id, display_name) VALUES (?1, ?2)",
            params![tenant_id, name],
        )?;
        Ok(())
    }

    async fn load_profile(&self, tenant_id: &str) -> Result<Option<BusinessProfile>> {
        let conn = self.conn.lock().await;
        let profile = conn
            .query_row(
                "SELECT body FROM business_profiles WHERE tenant_id = ?1",
                [tenant_id],
                |row| parse_json(0, &row.get::<_, String>(0)?),
            )
            .optional()?;
        Ok(profile)
    }

    async fn save_profile(&self, profile: &BusinessProfile) -> Result<()> {
        let body = serde_json::to_string(profile)?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO business_profiles (tenant_id, body, updated_at)
               VALUES (?1, ?2, ?3)"#,
            params![profile.tenant_id, body, ts(&Utc::now())],
        )?;
        Ok(())
    }

    async fn load_personality(
        &self,
        tenant_id: &str,
        category: ResponderCategory,
    ) -> Result<Option<ResponderPersonality>> {
        let conn = self.conn.lock().await;
        let personality = conn
            .query_row(
                r#"SELECT body FROM responder_personalities
                   WHERE tenant_id = ?1 AND category = ?2"#,
                params![tenant_id, category.as_str()],
                |row| parse_json(0, &row.get::<_, String>(0)?),
            )
            .optional()?;
        Ok(personality)
    }

    async fn save_personality(&self, personality: &ResponderPersonality) -> Result<()> {
        let body = serde_json::to_string(personality)?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO responder_personalities (tenant_id, category, body, updated_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                personality.tenant_id,
                personality.category.as_str(),
                body,
                ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use earshot_schema::{
        ActivityKind, Author, EngagementCounters, Post, Priority, Sentiment, SuggestedAction,
        TriggerAction, TriggerContext,
    };

    fn integration(id: &str, platform: Platform, status: IntegrationStatus) -> Integration {
        Integration {
            id: id.into(),
            tenant_id: "t1".into(),
            platform,
            status,
            credentials: Credentials {
                access_token: format!("token-{id}"),
                refresh_token: Some("refresh".into()),
                expires_at: None,
            },
        }
    }

    fn post() -> Post {
        Post {
            id: "1790".into(),
            platform: Platform::Twitter,
            author: Author {
                id: "u1".into(),
                handle: "alice".into(),
                display_name: "Alice".into(),
                verified: true,
                followers: Some(10),
                profile_image: None,
            },
            text: "pricing question".into(),
            media: vec![],
            metrics: EngagementCounters::default(),
            created_at: Utc::now(),
            conversation_id: None,
            in_reply_to_id: None,
            language: Some("en".into()),
        }
    }

    fn trigger() -> WorkflowTrigger {
        WorkflowTrigger {
            id: Uuid::new_v4(),
            tenant_id: "t1".into(),
            category: ResponderCategory::Sales,
            post: post(),
            context: TriggerContext {
                matched_keywords: vec!["pricing".into()],
                relevance_score: 40,
                sentiment: Sentiment::Neutral,
            },
            action: TriggerAction::Reply,
            priority: Priority::Low,
            status: TriggerStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn approval(created_at: DateTime<Utc>) -> ApprovalRequest {
        ApprovalRequest {
            id: Uuid::new_v4(),
            tenant_id: "t1".into(),
            trigger: trigger(),
            candidate: None,
            reason: "low relevance".into(),
            status: ApprovalStatus::Pending,
            created_at,
            decided_at: None,
        }
    }

    #[tokio::test]
    async fn connected_integrations_filter_status_and_platform() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_integration(&integration("a", Platform::Twitter, IntegrationStatus::Connected))
            .await
            .unwrap();
        store
            .upsert_integration(&integration("b", Platform::Meta, IntegrationStatus::Connected))
            .await
            .unwrap();
        store
            .upsert_integration(&integration("c", Platform::Twitter, IntegrationStatus::Expired))
            .await
            .unwrap();

        let found = store
            .connected_integrations("t1", &[Platform::Twitter])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        let none = store
            .connected_integrations("other", &Platform::ALL)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn update_credentials_persists_expiry() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_integration(&integration("a", Platform::Twitter, IntegrationStatus::Connected))
            .await
            .unwrap();

        let expires_at = Utc::now() + Duration::hours(2);
        store
            .update_credentials(
                "a",
                &Credentials {
                    access_token: "fresh".into(),
                    refresh_token: Some("r2".into()),
                    expires_at: Some(expires_at),
                },
            )
            .await
            .unwrap();

        let loaded = store.get_integration("a").await.unwrap().unwrap();
        assert_eq!(loaded.credentials.access_token, "fresh");
        assert_eq!(
            loaded.credentials.expires_at.map(|t| t.timestamp_micros()),
            Some(expires_at.timestamp_micros())
        );
        assert!(store.update_credentials("missing", &loaded.credentials).await.is_err());
    }

    #[tokio::test]
    async fn pending_approvals_exclude_decided_and_keep_age_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let older = approval(Utc::now() - Duration::minutes(5));
        let newer = approval(Utc::now());
        store.insert_approval(&newer).await.unwrap();
        store.insert_approval(&older).await.unwrap();

        let pending = store.pending_approvals("t1").await.unwrap();
        assert_eq!(
            pending.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![older.id, newer.id]
        );

        let mut decided = older.clone();
        decided.status = ApprovalStatus::Rejected;
        decided.decided_at = Some(Utc::now());
        assert!(store.decide_approval(&decided).await.unwrap());

        let pending = store.pending_approvals("t1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, newer.id);
        let loaded = store.get_approval(older.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ApprovalStatus::Rejected);
    }

    #[tokio::test]
    async fn only_the_first_decision_is_stored() {
        let store = SqliteStore::open_in_memory().unwrap();
        let request = approval(Utc::now());
        store.insert_approval(&request).await.unwrap();

        let mut approved = request.clone();
        approved.status = ApprovalStatus::Approved;
        approved.decided_at = Some(Utc::now());
        let mut rejected = request.clone();
        rejected.status = ApprovalStatus::Rejected;
        rejected.decided_at = Some(Utc::now());

        assert!(store.decide_approval(&approved).await.unwrap());
        assert!(!store.decide_approval(&rejected).await.unwrap());
        let loaded = store.get_approval(request.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ApprovalStatus::Approved);

        let mut unknown = approved.clone();
        unknown.id = Uuid::new_v4();
        assert!(!store.decide_approval(&unknown).await.unwrap());
    }

    #[tokio::test]
    async fn trigger_status_and_error_are_queryable() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut trigger = trigger();
        store.save_trigger(&trigger, None).await.unwrap();

        trigger.status = TriggerStatus::Failed;
        store.save_trigger(&trigger, Some("rate limited")).await.unwrap();

        let failed = store
            .triggers_with_status("t1", TriggerStatus::Failed)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("rate limited"));
        assert!(store
            .triggers_with_status("t1", TriggerStatus::Pending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn execution_log_reads_back_in_insert_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let trigger = trigger();
        for (status, error) in [
            (crate::ExecutionStatus::Failed, Some("timeout".to_string())),
            (crate::ExecutionStatus::Success, None),
        ] {
            store
                .record_execution(&WorkflowExecution {
                    trigger_id: trigger.id,
                    tenant_id: "t1".into(),
                    category: trigger.category,
                    action: trigger.action,
                    platform: Platform::Twitter,
                    post_id: trigger.post.id.clone(),
                    status,
                    content: Some("Thanks!".into()),
                    confidence: Some(91),
                    reasoning: None,
                    result_id: None,
                    result_url: None,
                    error,
                    at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let log = store.executions_for(trigger.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].status, crate::ExecutionStatus::Failed);
        assert_eq!(log[1].status, crate::ExecutionStatus::Success);
        assert_eq!(log[1].confidence, Some(91));
    }

    #[tokio::test]
    async fn matches_and_activity_are_tenant_scoped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let keyword_match = KeywordMatch {
            post: post(),
            matched_keywords: vec!["pricing".into()],
            relevance_score: 40,
            sentiment: Sentiment::Neutral,
            suggested_action: SuggestedAction::Monitor,
            suggested_category: Some(ResponderCategory::Sales),
        };
        store.record_match("t1", &keyword_match).await.unwrap();
        store
            .record_activity(&ActivityRecord {
                tenant_id: "t1".into(),
                integration_id: "a".into(),
                platform: Platform::Twitter,
                kind: ActivityKind::Like,
                post_id: Some("1790".into()),
                content: None,
                metadata: serde_json::json!({"source": "test"}),
                at: Utc::now(),
            })
            .await
            .unwrap();

        let matches = store.recent_matches("t1", 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword_match, keyword_match);
        assert!(store.recent_matches("t2", 10).await.unwrap().is_empty());

        let activity = store.recent_activity("t1", 10).await.unwrap();
        assert_eq!(activity[0].kind, ActivityKind::Like);
        assert_eq!(activity[0].metadata["source"], "test");
    }

    #[tokio::test]
    async fn profiles_and_personalities_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("earshot.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            let profile = BusinessProfile::default_for("t1", Some("Acme"));
            store.save_profile(&profile).await.unwrap();
            store
                .save_personality(&ResponderPersonality::default_for(
                    &profile,
                    ResponderCategory::Support,
                ))
                .await
                .unwrap();
            store.set_tenant_display_name("t1", "Acme").await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let profile = store.load_profile("t1").await.unwrap().unwrap();
        assert_eq!(profile.business_name, "Acme");
        let support = store
            .load_personality("t1", ResponderCategory::Support)
            .await
            .unwrap()
            .unwrap();
        assert!(support.rules.include_emojis);
        assert!(store
            .load_personality("t1", ResponderCategory::Sales)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.tenant_display_name("t1").await.unwrap().as_deref(),
            Some("Acme")
        );
    }
}
