use async_trait::async_trait;
use earshot_schema::{MessageResult, Platform, PlatformMetrics, Post, PostRequest, PostResult, UserProfile};

use crate::{MetaConfig, PlatformAdapter, PlatformError, PostStream};

/// Facebook and Instagram Graph API adapter. Only the capability surface exists;
/// every network call reports [`PlatformError::Unsupported`].
pub struct MetaAdapter {
    api_base: String,
    integration_id: String,
}

impl MetaAdapter {
    pub fn new(config: &MetaConfig, integration_id: String) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            integration_id,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn unsupported(capability: &'static str) -> PlatformError {
        PlatformError::Unsupported {
            platform: Platform::Meta,
            capability,
        }
    }
}

#[async_trait]
impl PlatformAdapter for MetaAdapter {
    fn platform(&self) -> Platform {
        Platform::Meta
    }

    fn integration_id(&self) -> &str {
        &self.integration_id
    }

    async fn stream_keywords(&self, _keywords: &[String]) -> Result<PostStream, PlatformError> {
        Err(Self::unsupported("stream_keywords"))
    }

    async fn create_post(&self, _request: &PostRequest) -> Result<PostResult, PlatformError> {
        Err(Self::unsupported("create_post"))
    }

    async fn reply_to_post(
        &self,
        _post_id: &str,
        _content: &str,
    ) -> Result<PostResult, PlatformError> {
        Err(Self::unsupported("reply_to_post"))
    }

    async fn like_post(&self, _post_id: &str) -> Result<(), PlatformError> {
        Err(Self::unsupported("like_post"))
    }

    async fn send_direct_message(
        &self,
        _user_id: &str,
        _content: &str,
    ) -> Result<MessageResult, PlatformError> {
        Err(Self::unsupported("send_direct_message"))
    }

    async fn search_posts(&self, _query: &str, _limit: usize) -> Result<Vec<Post>, PlatformError> {
        Err(Self::unsupported("search_posts"))
    }

    async fn get_user_profile(&self, _user_id: &str) -> Result<UserProfile, PlatformError> {
        Err(Self::unsupported("get_user_profile"))
    }

    async fn get_metrics(&self) -> Result<PlatformMetrics, PlatformError> {
        Err(Self::unsupported("get_metrics"))
    }
}
