use anyhow::Result;
use rusqlite::Connection;
use std::collections::HashSet;

type Migration = (i64, &'static str);

fn migrations() -> Vec<Migration> {
    vec![
        (
            1,
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                tenant_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS integrations (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                status TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_integrations_tenant ON integrations(tenant_id, status);
            "#,
        ),
        (
            2,
            r#"
            CREATE TABLE IF NOT EXISTS social_activity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                integration_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                kind TEXT NOT NULL,
                post_id TEXT,
                content TEXT,
                metadata TEXT NOT NULL,
                at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activity_tenant_at ON social_activity(tenant_id, at DESC);
            "#,
        ),
        (
            3,
            r#"
            CREATE TABLE IF NOT EXISTS keyword_matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                post_id TEXT NOT NULL,
                relevance_score INTEGER NOT NULL,
                sentiment TEXT NOT NULL,
                suggested_action TEXT NOT NULL,
                body TEXT NOT NULL,
                at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_matches_tenant_at ON keyword_matches(tenant_id, at DESC);

            CREATE TABLE IF NOT EXISTS workflow_triggers (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                status TEXT NOT NULL,
                body TEXT NOT NULL,
                error TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_triggers_tenant_status ON workflow_triggers(tenant_id, status);

            CREATE TABLE IF NOT EXISTS agent_workflow_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trigger_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                category TEXT NOT NULL,
                action TEXT NOT NULL,
                platform TEXT NOT NULL,
                post_id TEXT NOT NULL,
                status TEXT NOT NULL,
                content TEXT,
                confidence INTEGER,
                reasoning TEXT,
                result_id TEXT,
                result_url TEXT,
                error TEXT,
                at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_workflow_logs_trigger ON agent_workflow_logs(trigger_id);
            "#,
        ),
        (
            4,
            r#"
            CREATE TABLE IF NOT EXISTS approval_requests (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                status TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                decided_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_approvals_tenant_status ON approval_requests(tenant_id, status, created_at);
            "#,
        ),
        (
            5,
            r#"
            CREATE TABLE IF NOT EXISTS business_profiles (
                tenant_id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS responder_personalities (
                tenant_id TEXT NOT NULL,
                category TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, category)
            );
            "#,
        ),
    ]
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS __schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )?;

    let mut stmt = conn.prepare("SELECT version FROM __schema_version")?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    let mut applied = HashSet::new();
    for row in rows {
        applied.insert(row?);
    }

    for (version, sql) in migrations() {
        if applied.contains(&version) {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO __schema_version(version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;
        tx.commit()?;
        tracing::debug!(version, "applied migration");
    }

    Ok(())
}
