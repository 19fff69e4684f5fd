pub mod anthropic;
pub mod types;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicProvider;
pub use types::*;

pub const DEFAULT_ANTHROPIC_BASE: &str = "https://api.anthropic.com";

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse>;
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// Provider Configuration
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    /// Offline provider that never produces an auto-approvable reply.
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.kind {
        ProviderKind::Anthropic => {
            let key = config
                .api_key
                .as_ref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| anyhow!("anthropic requires api_key"))?;
            let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_ANTHROPIC_BASE);
            Arc::new(AnthropicProvider::new(key.clone(), base_url))
        }
        ProviderKind::Stub => Arc::new(StubProvider),
    };
    tracing::info!(kind = ?config.kind, "language model provider ready");
    Ok(provider)
}

pub struct StubProvider;

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let user_text = request
            .messages
            .last()
            .map(|m| m.text())
            .unwrap_or_default();
        let body = serde_json::json!({
            "content": format!("[stub:{}] thanks for reaching out", request.model),
            "confidence": 0,
            "reasoning": format!("stub provider, prompt was {} chars", user_text.chars().count()),
            "requiresApproval": true,
        });
        Ok(LlmResponse::text(body.to_string()))
    }
}
