pub mod activity;
pub mod credentials;
pub mod linkedin;
pub mod meta;
pub mod twitter;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use earshot_schema::{
    Integration, MessageResult, Platform, PlatformMetrics, Post, PostRequest, PostResult,
    UserProfile,
};
use earshot_store::{ActivityLog, IntegrationStore};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

pub use activity::ActivityRecorder;
pub use credentials::{CredentialManager, TokenRefresher};
pub use linkedin::LinkedInAdapter;
pub use meta::MetaAdapter;
pub use twitter::{TwitterAdapter, TwitterRefresher};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("access token expired and could not be refreshed: {0}")]
    AuthExpired(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("platform api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("{platform} does not support {capability} yet")]
    Unsupported {
        platform: Platform,
        capability: &'static str,
    },
    #[error("unexpected response payload: {0}")]
    Decode(String),
    #[error("store error: {0}")]
    Store(String),
}

impl PlatformError {
    pub fn is_auth(&self) -> bool {
        matches!(self, PlatformError::AuthExpired(_))
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PlatformError::Decode(e.to_string())
        } else {
            PlatformError::Transport(e.to_string())
        }
    }
}

pub type PostStream = Pin<Box<dyn Stream<Item = Result<Post, PlatformError>> + Send>>;

/// Uniform capability set of one social network, bound to one integration.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;
    fn integration_id(&self) -> &str;

    /// Long-lived subscription yielding posts that match any keyword. Ends or
    /// errors on transport failure; the caller decides whether to reopen it.
    async fn stream_keywords(&self, keywords: &[String]) -> Result<PostStream, PlatformError>;
    async fn create_post(&self, request: &PostRequest) -> Result<PostResult, PlatformError>;
    async fn reply_to_post(&self, post_id: &str, content: &str)
        -> Result<PostResult, PlatformError>;
    async fn like_post(&self, post_id: &str) -> Result<(), PlatformError>;
    async fn send_direct_message(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<MessageResult, PlatformError>;
    async fn search_posts(&self, query: &str, limit: usize) -> Result<Vec<Post>, PlatformError>;
    async fn get_user_profile(&self, user_id: &str) -> Result<UserProfile, PlatformError>;
    async fn get_metrics(&self) -> Result<PlatformMetrics, PlatformError>;
}

// ============================================================
// Configuration and construction
// ============================================================

fn default_twitter_base() -> String {
    "https://api.twitter.com".to_string()
}

fn default_meta_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_linkedin_base() -> String {
    "https://api.linkedin.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TwitterConfig {
    #[serde(default = "default_twitter_base")]
    pub api_base: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            api_base: default_twitter_base(),
            client_id: None,
            client_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaConfig {
    #[serde(default = "default_meta_base")]
    pub api_base: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            api_base: default_meta_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkedInConfig {
    #[serde(default = "default_linkedin_base")]
    pub api_base: String,
}

impl Default for LinkedInConfig {
    fn default() -> Self {
        Self {
            api_base: default_linkedin_base(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub linkedin: LinkedInConfig,
}

/// Builds the adapter matching an integration's platform.
pub trait PlatformFactory: Send + Sync {
    fn build(&self, integration: Integration) -> Result<Arc<dyn PlatformAdapter>, PlatformError>;
}

pub struct DefaultPlatformFactory {
    config: PlatformsConfig,
    integrations: Arc<dyn IntegrationStore>,
    activity: Arc<dyn ActivityLog>,
}

impl DefaultPlatformFactory {
    pub fn new(
        config: PlatformsConfig,
        integrations: Arc<dyn IntegrationStore>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            config,
            integrations,
            activity,
        }
    }
}

impl PlatformFactory for DefaultPlatformFactory {
    fn build(&self, integration: Integration) -> Result<Arc<dyn PlatformAdapter>, PlatformError> {
        let recorder = ActivityRecorder::new(&integration, self.activity.clone());
        let adapter: Arc<dyn PlatformAdapter> = match integration.platform {
            Platform::Twitter => {
                let refresher = TwitterRefresher::new(&self.config.twitter);
                let credentials = CredentialManager::new(
                    &integration,
                    refresher.map(|r| Arc::new(r) as Arc<dyn TokenRefresher>),
                    self.integrations.clone(),
                );
                Arc::new(TwitterAdapter::new(
                    &self.config.twitter.api_base,
                    integration.id.clone(),
                    credentials,
                    recorder,
                ))
            }
            Platform::Meta => Arc::new(MetaAdapter::new(&self.config.meta, integration.id)),
            Platform::Linkedin => {
                Arc::new(LinkedInAdapter::new(&self.config.linkedin, integration.id))
            }
        };
        tracing::debug!(platform = %adapter.platform(), integration_id = adapter.integration_id(), "built platform adapter");
        Ok(adapter)
    }
}
